//! # Request Lifecycle
//!
//! ```text
//! streaming:    Init ─▶ BeforeDone ─▶ Transforming* ─▶ AfterDone
//!                 │          │              │
//!                 ▼          ▼              ▼
//!           BeforeFailed  AfterFailed  TransformFailed / AfterFailed
//!
//! single-shot:  Init ─▶ Transforming ─▶ AfterDone | TransformFailed
//! ```
//!
//! Terminal phases accept no further moves.

use std::fmt;

use etlcode::Mode;

use crate::error::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    BeforeDone,
    Transforming,
    AfterDone,
    BeforeFailed,
    TransformFailed,
    AfterFailed,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::BeforeDone => "before-done",
            Phase::Transforming => "transforming",
            Phase::AfterDone => "after-done",
            Phase::BeforeFailed => "before-failed",
            Phase::TransformFailed => "transform-failed",
            Phase::AfterFailed => "after-failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::AfterDone | Phase::BeforeFailed | Phase::TransformFailed | Phase::AfterFailed
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Phase::BeforeFailed | Phase::TransformFailed | Phase::AfterFailed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The phase of one request, advanced only along legal edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    mode: Mode,
    phase: Phase,
}

impl Lifecycle {
    pub fn new(mode: Mode) -> Self {
        Self { mode, phase: Phase::Init }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn allows(&self, to: Phase) -> bool {
        use Phase::*;
        match self.mode {
            Mode::Streaming => matches!(
                (self.phase, to),
                (Init, BeforeDone | BeforeFailed)
                    | (BeforeDone, Transforming | AfterDone | AfterFailed)
                    | (Transforming, Transforming | TransformFailed | AfterDone | AfterFailed)
            ),
            Mode::SingleShot => matches!(
                (self.phase, to),
                (Init, Transforming) | (Transforming, AfterDone | TransformFailed)
            ),
        }
    }

    pub fn advance(&mut self, to: Phase) -> Result<(), TransitionError> {
        if !self.allows(to) {
            return Err(TransitionError { from: self.phase, to });
        }
        self.phase = to;
        Ok(())
    }
}
