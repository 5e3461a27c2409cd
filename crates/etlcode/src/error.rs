//! # Error Definitions
//!
//! Every way packaging a transform can fail, on either side of the boundary.
//!
//! Client-side failures (`SerializationError`, `TemplateError`) abort the job
//! before anything touches the network. Sandbox-side failures (`EncodingError`,
//! `ReconstructionError`, `ScriptError`) fail the job at startup, before the
//! first request is served.

use std::fmt;

use crate::callable::Mode;
use crate::callable::Shape;
use crate::consts::Action;
use crate::consts::ArgType;
use crate::consts::Communication;

/// A callable does not satisfy the catalog entry it names.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// No function with this id and shape is registered.
    UnknownFunction { shape: Shape, id: String },
    /// A required captured value was not declared.
    MissingCapture { id: String, key: String },
    /// A captured value has the wrong kind.
    CaptureKind { id: String, key: String, expected: &'static str, found: &'static str },
    /// A captured value the function never declared.
    UndeclaredCapture { id: String, key: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFunction { shape, id } => write!(f, "no {} function named '{}'", shape, id),
            Self::MissingCapture { id, key } => write!(f, "'{}' requires captured value '{}'", id, key),
            Self::CaptureKind { id, key, expected, found } => {
                write!(f, "'{}' expects '{}' to be {}, found {}", id, key, expected, found)
            }
            Self::UndeclaredCapture { id, key } => write!(f, "'{}' does not capture '{}'", id, key),
        }
    }
}

impl std::error::Error for CatalogError {}

/// The callable cannot be turned into a portable byte form.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializationError {
    /// The callable cannot be reconstructed from the catalog.
    Catalog(CatalogError),
    /// Captured state could not be encoded (depth, size).
    Pack(etlpack::Error),
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(e) => write!(f, "callable is not reconstructible: {}", e),
            Self::Pack(e) => write!(f, "captured state cannot be encoded: {}", e),
        }
    }
}

impl std::error::Error for SerializationError {}

impl From<CatalogError> for SerializationError {
    fn from(e: CatalogError) -> Self { Self::Catalog(e) }
}

impl From<etlpack::Error> for SerializationError {
    fn from(e: etlpack::Error) -> Self { Self::Pack(e) }
}

/// A text payload is not valid text-safe encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A character outside the alphabet.
    InvalidSymbol { offset: usize, byte: u8 },
    /// The payload length cannot be produced by the encoder.
    InvalidLength,
    /// Padding is missing, misplaced, or excessive.
    InvalidPadding,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSymbol { offset, byte } => {
                write!(f, "invalid symbol {:#04x} at offset {}", byte, offset)
            }
            Self::InvalidLength => write!(f, "invalid encoded length"),
            Self::InvalidPadding => write!(f, "invalid padding"),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Decoded bytes do not yield a valid callable.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionError {
    /// The byte stream is truncated or corrupted.
    Corrupted(etlpack::Error),
    /// The top-level item is not a callable.
    NotACallable(String),
    /// A required field is absent.
    MissingField(&'static str),
    /// Produced by a serializer this runtime does not speak.
    VersionMismatch { expected: u32, found: u32 },
    /// The shape name is not one of the known shapes.
    UnknownShape(String),
    /// The local catalog cannot rebuild the callable.
    Catalog(CatalogError),
}

impl fmt::Display for ReconstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted(e) => write!(f, "corrupted callable: {}", e),
            Self::NotACallable(name) => write!(f, "expected a callable, found '{}'", name),
            Self::MissingField(field) => write!(f, "callable is missing '{}'", field),
            Self::VersionMismatch { expected, found } => {
                write!(f, "serializer version {} is not supported (expected {})", found, expected)
            }
            Self::UnknownShape(name) => write!(f, "unknown shape '{}'", name),
            Self::Catalog(e) => write!(f, "cannot reconstruct: {}", e),
        }
    }
}

impl std::error::Error for ReconstructionError {}

impl From<etlpack::Error> for ReconstructionError {
    fn from(e: etlpack::Error) -> Self { Self::Corrupted(e) }
}

impl From<CatalogError> for ReconstructionError {
    fn from(e: CatalogError) -> Self { Self::Catalog(e) }
}

/// Internal invariant violations while filling a skeleton.
///
/// These are programming defects and are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// No skeleton is registered for the mode.
    NoSkeleton(Mode),
    /// The skeleton has no slot with this name.
    UnknownSlot { mode: Mode, slot: &'static str },
    /// The slot was already filled.
    SlotFilled(&'static str),
    /// The slot was left empty.
    EmptySlot(&'static str),
    /// The callable's shape does not fit the slot.
    WrongShape { slot: &'static str, expected: Shape, found: Shape },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSkeleton(mode) => write!(f, "no skeleton for mode '{}'", mode),
            Self::UnknownSlot { mode, slot } => write!(f, "'{}' skeleton has no slot '{}'", mode, slot),
            Self::SlotFilled(slot) => write!(f, "slot '{}' filled twice", slot),
            Self::EmptySlot(slot) => write!(f, "slot '{}' left empty", slot),
            Self::WrongShape { slot, expected, found } => {
                write!(f, "slot '{}' takes a {} callable, got a {}", slot, expected, found)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Anything that stops a transform spec from rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    Serialization(SerializationError),
    Encoding(EncodingError),
    Template(TemplateError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "serialization error: {}", e),
            Self::Encoding(e) => write!(f, "encoding error: {}", e),
            Self::Template(e) => write!(f, "template error: {}", e),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<SerializationError> for RenderError {
    fn from(e: SerializationError) -> Self { Self::Serialization(e) }
}

impl From<EncodingError> for RenderError {
    fn from(e: EncodingError) -> Self { Self::Encoding(e) }
}

impl From<TemplateError> for RenderError {
    fn from(e: TemplateError) -> Self { Self::Template(e) }
}

/// A rendered script is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The first line is not a script header.
    BadHeader(String),
    /// The header names a format version this runtime does not speak.
    UnsupportedVersion(String),
    /// The `mode` line is missing or names an unknown mode.
    UnknownMode(String),
    /// The trailing `check` line is missing or malformed.
    MissingIntegrity,
    /// The body does not hash to the value in the `check` line.
    IntegrityMismatch { expected: String, found: String },
    /// A binding line is not `name = decode('payload')`.
    MalformedBinding { line: usize },
    /// A binding names the wrong slot for its position.
    SlotOrder { line: usize, expected: &'static str, found: String },
    /// The script ended before every slot was bound.
    MissingSlot(&'static str),
    /// The `serve` epilogue does not match the skeleton.
    BadEpilogue { expected: String, found: String },
    /// Extra content after the epilogue.
    UnexpectedLine { line: usize },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHeader(line) => write!(f, "not an etl script: '{}'", line),
            Self::UnsupportedVersion(v) => write!(f, "unsupported script version '{}'", v),
            Self::UnknownMode(m) => write!(f, "unknown mode '{}'", m),
            Self::MissingIntegrity => write!(f, "missing integrity line"),
            Self::IntegrityMismatch { expected, found } => {
                write!(f, "integrity mismatch: script says {}, body hashes to {}", expected, found)
            }
            Self::MalformedBinding { line } => write!(f, "line {}: malformed binding", line),
            Self::SlotOrder { line, expected, found } => {
                write!(f, "line {}: expected binding '{}', found '{}'", line, expected, found)
            }
            Self::MissingSlot(slot) => write!(f, "slot '{}' is never bound", slot),
            Self::BadEpilogue { expected, found } => {
                write!(f, "expected epilogue '{}', found '{}'", expected, found)
            }
            Self::UnexpectedLine { line } => write!(f, "line {}: unexpected content", line),
        }
    }
}

impl std::error::Error for ScriptError {}

/// An init message is invalid or cannot be (de)serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Names must be lowercase alphanumerics or `-`, start with a letter, and
    /// be at most 32 characters.
    InvalidName(String),
    /// The message carries no script.
    EmptyCode,
    /// The communication type cannot deliver this kind of argument.
    Incompatible { communication: Communication, arg_type: ArgType },
    /// The envelope carries an action other than `start`.
    UnexpectedAction(Action),
    /// JSON encoding or decoding failed.
    Json(String),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid etl name '{}'", name),
            Self::EmptyCode => write!(f, "init message carries no code"),
            Self::Incompatible { communication, arg_type } => {
                write!(f, "communication '{}' does not support arg type '{}'", communication, arg_type)
            }
            Self::UnexpectedAction(action) => write!(f, "expected action 'start', found '{}'", action),
            Self::Json(e) => write!(f, "json error: {}", e),
        }
    }
}

impl std::error::Error for MessageError {}

impl From<serde_json::Error> for MessageError {
    fn from(e: serde_json::Error) -> Self { Self::Json(e.to_string()) }
}
