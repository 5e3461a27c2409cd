//! # Harness Errors
//!
//! - **Load-time**: [`LoadError`] fails the whole job before any request is served.
//! - **Request-time**: [`RequestError`] fails one request. The harness keeps serving.

use std::fmt;

use etlcode::EncodingError;
use etlcode::ReconstructionError;
use etlcode::ScriptError;
use etlcode::Shape;
use etlcode::StageError;
use etlcode::TemplateError;

use crate::phase::Phase;

/// The script could not be turned into a runnable pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Header, integrity line, binding order or epilogue is wrong.
    Script(ScriptError),
    /// A slot's payload is not valid text encoding.
    Encoding { slot: &'static str, error: EncodingError },
    /// A slot's payload does not rebuild into a callable.
    Reconstruction { slot: &'static str, error: ReconstructionError },
    /// A slot holds a callable of the wrong shape.
    WrongShape { slot: &'static str, expected: Shape, found: Shape },
    /// The script names a mode without a skeleton.
    Template(TemplateError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(e) => write!(f, "malformed script: {}", e),
            Self::Encoding { slot, error } => write!(f, "slot '{}': {}", slot, error),
            Self::Reconstruction { slot, error } => write!(f, "slot '{}': {}", slot, error),
            Self::WrongShape { slot, expected, found } => {
                write!(f, "slot '{}' expects a {} callable, found {}", slot, expected, found)
            }
            Self::Template(e) => write!(f, "template error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<ScriptError> for LoadError {
    fn from(e: ScriptError) -> Self { Self::Script(e) }
}

impl From<TemplateError> for LoadError {
    fn from(e: TemplateError) -> Self { Self::Template(e) }
}

/// The request state machine was asked to make a move it does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// A chunk source failed to deliver the next chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError(pub String);

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk source failed: {}", self.0)
    }
}

impl std::error::Error for SourceError {}

/// One request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// A user stage returned an error. `phase` is the terminal failure phase.
    Stage { phase: Phase, error: StageError },
    /// The request was driven out of order.
    Transition(TransitionError),
    /// The chunk source failed mid-request.
    Source(SourceError),
    /// The harness is shutting down.
    Closed,
}

impl RequestError {
    /// The terminal phase, if a stage failed.
    pub fn failed_phase(&self) -> Option<Phase> {
        match self {
            Self::Stage { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage { phase, error } => write!(f, "{}: {}", phase, error),
            Self::Transition(e) => write!(f, "{}", e),
            Self::Source(e) => write!(f, "{}", e),
            Self::Closed => write!(f, "harness is closed"),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<TransitionError> for RequestError {
    fn from(e: TransitionError) -> Self { Self::Transition(e) }
}

impl From<SourceError> for RequestError {
    fn from(e: SourceError) -> Self { Self::Source(e) }
}

/// An environment variable holds a value the harness cannot use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value for {}: '{}'", self.var, self.value)
    }
}

impl std::error::Error for ConfigError {}
