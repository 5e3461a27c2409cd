//! # Script Skeletons
//!
//! The two fixed script layouts and the builder that fills them.
//!
//! ## Format
//!
//! ```text
//! # etl-script v1
//! mode streaming
//! before = decode('<payload>')
//! transform = decode('<payload>')
//! after = decode('<payload>')
//! serve before transform after
//! check <sha256 of every line above>
//! ```
//!
//! ## Invariants
//! - **Named slots**: Each skeleton lists its slots in order, with the shape each
//!   slot accepts. A slot is filled exactly once.
//! - **Self-validating**: The trailing `check` line hashes everything above it, so
//!   a truncated or edited script is rejected before any callable is rebuilt.

use sha2::Digest;
use sha2::Sha256;

use crate::callable::Mode;
use crate::callable::Shape;
use crate::error::ScriptError;
use crate::error::TemplateError;
use crate::render::EncodedCallable;
use crate::render::RenderedScript;

/// First line of every script this crate renders.
pub const SCRIPT_HEADER: &str = "# etl-script v1";
const HEADER_PREFIX: &str = "# etl-script ";
const CHECK_PREFIX: &str = "check ";

/// A named insertion point. The name is also the variable the harness reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Before,
    Transform,
    After,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::Before => "before",
            Slot::Transform => "transform",
            Slot::After => "after",
        }
    }
}

/// A fixed script layout for one mode.
#[derive(Debug)]
pub struct Skeleton {
    mode: Mode,
    slots: &'static [(Slot, Shape)],
}

static SKELETONS: [Skeleton; 2] = [
    Skeleton {
        mode: Mode::SingleShot,
        slots: &[(Slot::Transform, Shape::Transform)],
    },
    Skeleton {
        mode: Mode::Streaming,
        slots: &[
            (Slot::Before, Shape::Setup),
            (Slot::Transform, Shape::Chunk),
            (Slot::After, Shape::Teardown),
        ],
    },
];

impl Skeleton {
    pub fn for_mode(mode: Mode) -> Result<&'static Skeleton, TemplateError> {
        SKELETONS
            .iter()
            .find(|s| s.mode == mode)
            .ok_or(TemplateError::NoSkeleton(mode))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Slots in order, each with the shape it accepts.
    pub fn slots(&self) -> &'static [(Slot, Shape)] {
        self.slots
    }

    /// The line that wires the bound variables into the harness.
    pub fn epilogue(&self) -> String {
        let names: Vec<_> = self.slots.iter().map(|(slot, _)| slot.name()).collect();
        format!("serve {}", names.join(" "))
    }

    pub fn builder(&'static self) -> SkeletonBuilder {
        SkeletonBuilder {
            skeleton: self,
            filled: vec![None; self.slots.len()],
        }
    }
}

/// Fills a skeleton's slots, then renders the script text.
pub struct SkeletonBuilder {
    skeleton: &'static Skeleton,
    filled: Vec<Option<EncodedCallable>>,
}

impl SkeletonBuilder {
    /// Puts `encoded` into `slot` after checking the callable's shape fits it.
    pub fn fill(&mut self, slot: Slot, shape: Shape, encoded: EncodedCallable) -> Result<(), TemplateError> {
        let mode = self.skeleton.mode;
        let pos = self
            .skeleton
            .slots
            .iter()
            .position(|(s, _)| *s == slot)
            .ok_or(TemplateError::UnknownSlot { mode, slot: slot.name() })?;

        let expected = self.skeleton.slots[pos].1;
        if expected != shape {
            return Err(TemplateError::WrongShape { slot: slot.name(), expected, found: shape });
        }
        if self.filled[pos].is_some() {
            return Err(TemplateError::SlotFilled(slot.name()));
        }
        self.filled[pos] = Some(encoded);
        Ok(())
    }

    /// Renders the script. Every slot must be filled.
    pub fn finish(self) -> Result<RenderedScript, TemplateError> {
        let mut body = String::new();
        body.push_str(SCRIPT_HEADER);
        body.push('\n');
        body.push_str(&format!("mode {}\n", self.skeleton.mode));

        for ((slot, _), encoded) in self.skeleton.slots.iter().zip(self.filled) {
            let encoded = encoded.ok_or(TemplateError::EmptySlot(slot.name()))?;
            body.push_str(&format!("{} = decode('{}')\n", slot.name(), encoded.as_str()));
        }
        body.push_str(&self.skeleton.epilogue());
        body.push('\n');

        let check = digest(&body);
        body.push_str(CHECK_PREFIX);
        body.push_str(&check);
        body.push('\n');

        Ok(RenderedScript::new(self.skeleton.mode, body))
    }
}

/// A script that passed structural and integrity checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScript {
    pub mode: Mode,
    /// Bindings in slot order.
    pub bindings: Vec<(Slot, EncodedCallable)>,
}

/// Checks a script's header, integrity line, slot order and epilogue.
///
/// Payloads are not decoded here.
pub fn parse(text: &str) -> Result<ParsedScript, ScriptError> {
    let header = text.lines().next().unwrap_or_default();
    if header != SCRIPT_HEADER {
        return Err(match header.strip_prefix(HEADER_PREFIX) {
            Some(version) => ScriptError::UnsupportedVersion(version.to_string()),
            None => ScriptError::BadHeader(header.to_string()),
        });
    }

    let body = verify(text)?;
    let mut lines = body.lines().enumerate().map(|(i, l)| (i + 1, l)).skip(1);

    let mode_line = lines.next().map(|(_, l)| l).unwrap_or_default();
    let mode_name = mode_line
        .strip_prefix("mode ")
        .ok_or_else(|| ScriptError::UnknownMode(mode_line.to_string()))?;
    let mode = Mode::from_name(mode_name).ok_or_else(|| ScriptError::UnknownMode(mode_name.to_string()))?;
    let skeleton = Skeleton::for_mode(mode).map_err(|_| ScriptError::UnknownMode(mode_name.to_string()))?;

    let mut bindings = Vec::with_capacity(skeleton.slots.len());
    for (slot, _) in skeleton.slots {
        let (n, line) = lines.next().ok_or(ScriptError::MissingSlot(slot.name()))?;
        let (name, payload) = split_binding(line).ok_or(ScriptError::MalformedBinding { line: n })?;
        if name != slot.name() {
            return Err(ScriptError::SlotOrder { line: n, expected: slot.name(), found: name.to_string() });
        }
        bindings.push((*slot, EncodedCallable::from_raw(payload)));
    }

    let expected = skeleton.epilogue();
    let found = lines.next().map(|(_, l)| l).unwrap_or_default();
    if found != expected {
        return Err(ScriptError::BadEpilogue { expected, found: found.to_string() });
    }
    if let Some((n, _)) = lines.next() {
        return Err(ScriptError::UnexpectedLine { line: n });
    }

    Ok(ParsedScript { mode, bindings })
}

/// Splits off the `check` line and returns the body it vouches for.
fn verify(text: &str) -> Result<&str, ScriptError> {
    let trimmed = text.strip_suffix('\n').ok_or(ScriptError::MissingIntegrity)?;
    let split = trimmed.rfind('\n').ok_or(ScriptError::MissingIntegrity)? + 1;
    let (body, check_line) = trimmed.split_at(split);
    let expected = check_line.strip_prefix(CHECK_PREFIX).ok_or(ScriptError::MissingIntegrity)?;

    let found = digest(body);
    if expected != found {
        return Err(ScriptError::IntegrityMismatch { expected: expected.to_string(), found });
    }
    Ok(body)
}

fn split_binding(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = line.split_once(" = decode('")?;
    let payload = rest.strip_suffix("')")?;
    if payload.contains('\'') {
        return None;
    }
    Some((name, payload))
}

fn digest(body: &str) -> String {
    format!("{:x}", Sha256::digest(body.as_bytes()))
}
