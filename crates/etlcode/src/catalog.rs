//! # Function Catalog
//!
//! The registry of function shapes both sides of the boundary agree on.
//!
//! ## Philosophy
//!
//! - **No code on the wire**: A callable travels as `(shape, id, captured)`. The
//!   sandbox rebuilds it by looking the id up in its own catalog and binding the
//!   captured values to the function it finds.
//! - **Checked twice**: The client validates a callable against the catalog before
//!   serializing it, and the sandbox validates it again before binding. A job
//!   whose callables do not fit never starts serving.
//! - **Schema per entry**: Each entry declares the captured values it needs and
//!   their kinds. Undeclared values are rejected.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use etlpack::Value;

use crate::builtin;
use crate::callable::Callable;
use crate::callable::Capture;
use crate::callable::Shape;
use crate::error::CatalogError;
use crate::error::ReconstructionError;

/// A user stage failed while handling a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError(String);

impl StageError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StageError {}

pub type StageResult<T> = std::result::Result<T, StageError>;

/// What a teardown stage leaves behind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Finish {
    /// Bytes appended after the last transformed chunk.
    pub tail: Vec<u8>,
    /// The request state after teardown.
    pub state: Value,
}

/// Kind constraint on a captured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Any,
    Bool,
    U64,
    S64,
    F64,
    Str,
    Bytes,
    List,
    Map,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Any => "any",
            Kind::Bool => "bool",
            Kind::U64 => "u64",
            Kind::S64 => "s64",
            Kind::F64 => "f64",
            Kind::Str => "str",
            Kind::Bytes => "bytes",
            Kind::List => "list",
            Kind::Map => "map",
        }
    }

    pub fn admits(self, value: &Value) -> bool {
        self == Kind::Any || self.name() == value.kind()
    }
}

/// One declared captured value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub kind: Kind,
    pub optional: bool,
}

impl Requirement {
    pub fn required(key: impl Into<String>, kind: Kind) -> Self {
        Self { key: key.into(), kind, optional: false }
    }

    pub fn optional(key: impl Into<String>, kind: Kind) -> Self {
        Self { key: key.into(), kind, optional: true }
    }
}

type TransformFn = Arc<dyn Fn(&Capture, &[u8]) -> StageResult<Vec<u8>> + Send + Sync>;
type SetupFn = Arc<dyn Fn(&Capture) -> StageResult<Value> + Send + Sync>;
type ChunkFn = Arc<dyn Fn(&Capture, &[u8], &mut Value) -> StageResult<Vec<u8>> + Send + Sync>;
type TeardownFn = Arc<dyn Fn(&Capture, Value) -> StageResult<Finish> + Send + Sync>;

#[derive(Clone)]
enum Func {
    Transform(TransformFn),
    Setup(SetupFn),
    Chunk(ChunkFn),
    Teardown(TeardownFn),
}

impl Func {
    fn shape(&self) -> Shape {
        match self {
            Func::Transform(_) => Shape::Transform,
            Func::Setup(_) => Shape::Setup,
            Func::Chunk(_) => Shape::Chunk,
            Func::Teardown(_) => Shape::Teardown,
        }
    }
}

#[derive(Clone)]
struct Entry {
    requires: Vec<Requirement>,
    func: Func,
}

/// A reconstructed callable: a catalog function bound to its captured state.
#[derive(Clone)]
pub struct Stage {
    id: Arc<str>,
    func: Func,
    captured: Arc<Capture>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("shape", &self.func.shape())
            .field("id", &self.id)
            .field("captured", &self.captured)
            .finish()
    }
}

impl Stage {
    pub fn shape(&self) -> Shape {
        self.func.shape()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn mismatch(&self, wanted: Shape) -> StageError {
        StageError::new(format!("'{}' is a {} stage, not a {}", self.id, self.shape(), wanted))
    }

    pub fn transform(&self, object: &[u8]) -> StageResult<Vec<u8>> {
        match &self.func {
            Func::Transform(f) => f(&self.captured, object),
            _ => Err(self.mismatch(Shape::Transform)),
        }
    }

    pub fn setup(&self) -> StageResult<Value> {
        match &self.func {
            Func::Setup(f) => f(&self.captured),
            _ => Err(self.mismatch(Shape::Setup)),
        }
    }

    pub fn chunk(&self, chunk: &[u8], state: &mut Value) -> StageResult<Vec<u8>> {
        match &self.func {
            Func::Chunk(f) => f(&self.captured, chunk, state),
            _ => Err(self.mismatch(Shape::Chunk)),
        }
    }

    pub fn teardown(&self, state: Value) -> StageResult<Finish> {
        match &self.func {
            Func::Teardown(f) => f(&self.captured, state),
            _ => Err(self.mismatch(Shape::Teardown)),
        }
    }
}

/// Registry of reconstructible functions, keyed by shape and id.
#[derive(Clone, Default)]
pub struct Catalog {
    entries: HashMap<(Shape, String), Entry>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.entries.keys().map(|(s, id)| format!("{}:{}", s, id)).collect();
        ids.sort();
        f.debug_struct("Catalog").field("entries", &ids).finish()
    }
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every builtin function.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        builtin::install(&mut catalog);
        catalog
    }

    fn insert(&mut self, id: impl Into<String>, requires: Vec<Requirement>, func: Func) -> &mut Self {
        self.entries.insert((func.shape(), id.into()), Entry { requires, func });
        self
    }

    pub fn register_transform<F>(&mut self, id: impl Into<String>, requires: Vec<Requirement>, f: F) -> &mut Self
    where
        F: Fn(&Capture, &[u8]) -> StageResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.insert(id, requires, Func::Transform(Arc::new(f)))
    }

    pub fn register_setup<F>(&mut self, id: impl Into<String>, requires: Vec<Requirement>, f: F) -> &mut Self
    where
        F: Fn(&Capture) -> StageResult<Value> + Send + Sync + 'static,
    {
        self.insert(id, requires, Func::Setup(Arc::new(f)))
    }

    pub fn register_chunk<F>(&mut self, id: impl Into<String>, requires: Vec<Requirement>, f: F) -> &mut Self
    where
        F: Fn(&Capture, &[u8], &mut Value) -> StageResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.insert(id, requires, Func::Chunk(Arc::new(f)))
    }

    pub fn register_teardown<F>(&mut self, id: impl Into<String>, requires: Vec<Requirement>, f: F) -> &mut Self
    where
        F: Fn(&Capture, Value) -> StageResult<Finish> + Send + Sync + 'static,
    {
        self.insert(id, requires, Func::Teardown(Arc::new(f)))
    }

    pub fn contains(&self, shape: Shape, id: &str) -> bool {
        self.entries.contains_key(&(shape, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, callable: &Callable) -> Result<&Entry, CatalogError> {
        self.entries
            .get(&(callable.shape(), callable.func().to_string()))
            .ok_or_else(|| CatalogError::UnknownFunction {
                shape: callable.shape(),
                id: callable.func().to_string(),
            })
    }

    /// Checks that the catalog can rebuild `callable` from its id and captures.
    pub fn validate(&self, callable: &Callable) -> Result<(), CatalogError> {
        let entry = self.entry(callable)?;
        let id = callable.func();
        let captured = callable.captured();

        for req in &entry.requires {
            match captured.get(&req.key) {
                None if req.optional => {}
                None => {
                    return Err(CatalogError::MissingCapture { id: id.to_string(), key: req.key.clone() });
                }
                Some(value) if !req.kind.admits(value) => {
                    return Err(CatalogError::CaptureKind {
                        id: id.to_string(),
                        key: req.key.clone(),
                        expected: req.kind.name(),
                        found: value.kind(),
                    });
                }
                Some(_) => {}
            }
        }

        if let Some((key, _)) = captured.iter().find(|(k, _)| !entry.requires.iter().any(|r| &r.key == *k)) {
            return Err(CatalogError::UndeclaredCapture { id: id.to_string(), key: key.clone() });
        }
        Ok(())
    }

    /// Binds `callable` to the function registered under its id.
    pub fn reconstruct(&self, callable: &Callable) -> Result<Stage, ReconstructionError> {
        self.validate(callable)?;
        let entry = self.entry(callable)?;
        Ok(Stage {
            id: Arc::from(callable.func()),
            func: entry.func.clone(),
            captured: Arc::new(callable.captured().clone()),
        })
    }
}
