//! # Callables and transform specs
//!
//! A callable is a catalog function id plus the state it captures, declared
//! explicitly as data. Nothing is captured implicitly, so whatever the
//! callable needs on the far side travels inside its [`Capture`].

use std::collections::BTreeMap;
use std::fmt;

use etlpack::Value;

/// The statically known signature of a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shape {
    /// `(object) -> object`
    Transform,
    /// `() -> state`
    Setup,
    /// `(chunk, &mut state) -> chunk`
    Chunk,
    /// `(state) -> finish`
    Teardown,
}

impl Shape {
    pub const ALL: [Shape; 4] = [Shape::Transform, Shape::Setup, Shape::Chunk, Shape::Teardown];

    pub fn name(self) -> &'static str {
        match self {
            Shape::Transform => "transform",
            Shape::Setup => "setup",
            Shape::Chunk => "chunk",
            Shape::Teardown => "teardown",
        }
    }

    pub fn from_name(name: &str) -> Option<Shape> {
        Shape::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Execution topology of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    SingleShot,
    Streaming,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::SingleShot => "single-shot",
            Mode::Streaming => "streaming",
        }
    }

    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "single-shot" => Some(Mode::SingleShot),
            "streaming" => Some(Mode::Streaming),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State a callable carries with it, declared as named values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Capture(BTreeMap<String, Value>);

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a captured value, replacing any previous value under `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn bytes(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_bytes)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Capture {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Capture> for Value {
    fn from(capture: Capture) -> Self {
        Value::Map(capture.0)
    }
}

/// A portable stand-in for a user function.
#[derive(Debug, Clone, PartialEq)]
pub struct Callable {
    shape: Shape,
    func: String,
    captured: Capture,
}

impl Callable {
    pub fn new(shape: Shape, func: impl Into<String>, captured: Capture) -> Self {
        Self { shape, func: func.into(), captured }
    }

    /// A single-shot `(object) -> object` function.
    pub fn transform(func: impl Into<String>) -> Self {
        Self::new(Shape::Transform, func, Capture::new())
    }

    /// A streaming setup function.
    pub fn setup(func: impl Into<String>) -> Self {
        Self::new(Shape::Setup, func, Capture::new())
    }

    /// A streaming per-chunk function.
    pub fn chunk(func: impl Into<String>) -> Self {
        Self::new(Shape::Chunk, func, Capture::new())
    }

    /// A streaming teardown function.
    pub fn teardown(func: impl Into<String>) -> Self {
        Self::new(Shape::Teardown, func, Capture::new())
    }

    /// Declares a captured value.
    pub fn capture(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.captured.insert(key, value);
        self
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn func(&self) -> &str {
        &self.func
    }

    pub fn captured(&self) -> &Capture {
        &self.captured
    }
}

/// What a job runs.
///
/// In `Streaming` mode all three stages are always present; use the catalog's
/// `noop` setup/teardown and `identity` chunk for stages you do not need.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformSpec {
    SingleShot { transform: Callable },
    Streaming { before: Callable, transform: Callable, after: Callable },
}

impl TransformSpec {
    pub fn single_shot(transform: Callable) -> Self {
        Self::SingleShot { transform }
    }

    pub fn streaming(before: Callable, transform: Callable, after: Callable) -> Self {
        Self::Streaming { before, transform, after }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::SingleShot { .. } => Mode::SingleShot,
            Self::Streaming { .. } => Mode::Streaming,
        }
    }

    /// Callables in slot order.
    pub fn callables(&self) -> Vec<&Callable> {
        match self {
            Self::SingleShot { transform } => vec![transform],
            Self::Streaming { before, transform, after } => vec![before, transform, after],
        }
    }
}
