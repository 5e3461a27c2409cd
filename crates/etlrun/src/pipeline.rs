//! # Pipeline
//!
//! A loaded script: the reconstructed stages bound to their fixed names, and
//! the per-request driver that runs them.
//!
//! ## Contract
//!
//! - **Single-shot**: `transform(object)` once per request.
//! - **Streaming**: `before()` once, `transform(chunk, &mut state)` per chunk in
//!   arrival order, `after(state)` once. A failed `before` runs no chunk. A failed
//!   chunk stops the request and `after` never runs.
//! - **Load once**: Every slot is decoded, rebuilt and shape-checked in [`load`].
//!   Nothing is decoded per request.

use etlcode::Catalog;
use etlcode::Mode;
use etlcode::Shape;
use etlcode::Skeleton;
use etlcode::Stage;
use etlcode::StageError;
use etlcode::TemplateError;
use etlcode::Value;
use etlcode::template;

use crate::error::LoadError;
use crate::error::RequestError;
use crate::error::TransitionError;
use crate::phase::Lifecycle;
use crate::phase::Phase;

/// The outcome of one successful request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    /// Transformed chunks in order, followed by the teardown tail.
    pub body: Vec<u8>,
    /// Request state after teardown. Always `Unit` for single-shot requests.
    pub final_state: Value,
}

#[derive(Debug, Clone)]
enum Stages {
    SingleShot { transform: Stage },
    Streaming { before: Stage, transform: Stage, after: Stage },
}

/// Reconstructed stages, ready to serve requests.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Stages,
}

/// Parses, verifies and rebuilds every callable in `script`.
pub fn load(script: &str, catalog: &Catalog) -> Result<Pipeline, LoadError> {
    let parsed = template::parse(script)?;
    let skeleton = Skeleton::for_mode(parsed.mode)?;

    let mut stages = Vec::with_capacity(parsed.bindings.len());
    for ((slot, encoded), &(_, expected)) in parsed.bindings.iter().zip(skeleton.slots()) {
        let slot = slot.name();
        let bytes = encoded.to_bytes().map_err(|error| LoadError::Encoding { slot, error })?;
        let callable = etlcode::deserialize(&bytes).map_err(|error| LoadError::Reconstruction { slot, error })?;
        if callable.shape() != expected {
            return Err(LoadError::WrongShape { slot, expected, found: callable.shape() });
        }
        let stage = catalog.reconstruct(&callable).map_err(|error| LoadError::Reconstruction { slot, error })?;
        tracing::debug!(slot, func = stage.id(), "bound stage");
        stages.push(stage);
    }

    let pipeline = match (parsed.mode, stages.as_slice()) {
        (Mode::SingleShot, [transform]) => Pipeline::single_shot(transform.clone())?,
        (Mode::Streaming, [before, transform, after]) => {
            Pipeline::streaming(before.clone(), transform.clone(), after.clone())?
        }
        (_, _) => return Err(TemplateError::EmptySlot("transform").into()),
    };
    tracing::debug!(mode = %pipeline.mode(), "loaded script");
    Ok(pipeline)
}

fn expect_shape(slot: &'static str, stage: &Stage, expected: Shape) -> Result<(), LoadError> {
    if stage.shape() != expected {
        return Err(LoadError::WrongShape { slot, expected, found: stage.shape() });
    }
    Ok(())
}

impl Pipeline {
    pub fn single_shot(transform: Stage) -> Result<Self, LoadError> {
        expect_shape("transform", &transform, Shape::Transform)?;
        Ok(Self { stages: Stages::SingleShot { transform } })
    }

    pub fn streaming(before: Stage, transform: Stage, after: Stage) -> Result<Self, LoadError> {
        expect_shape("before", &before, Shape::Setup)?;
        expect_shape("transform", &transform, Shape::Chunk)?;
        expect_shape("after", &after, Shape::Teardown)?;
        Ok(Self { stages: Stages::Streaming { before, transform, after } })
    }

    pub fn mode(&self) -> Mode {
        match self.stages {
            Stages::SingleShot { .. } => Mode::SingleShot,
            Stages::Streaming { .. } => Mode::Streaming,
        }
    }

    /// Starts a request. Streaming pipelines run `before` here.
    pub fn start(&self) -> Result<Request<'_>, RequestError> {
        let mut request = Request {
            pipeline: self,
            lifecycle: Lifecycle::new(self.mode()),
            state: Value::Unit,
            body: Vec::new(),
        };

        if let Stages::Streaming { before, .. } = &self.stages {
            match before.setup() {
                Ok(state) => {
                    request.lifecycle.advance(Phase::BeforeDone)?;
                    request.state = state;
                }
                Err(error) => return Err(request.fail(Phase::BeforeFailed, error)),
            }
        }
        Ok(request)
    }

    /// Runs one whole object, split into `chunk_size` pieces for streaming.
    ///
    /// An empty object is a request with no chunks.
    pub fn run(&self, object: &[u8], chunk_size: usize) -> Result<Response, RequestError> {
        self.run_chunks(split(object, chunk_size))
    }

    /// Runs one request over already-chunked input.
    pub fn run_chunks<I>(&self, chunks: I) -> Result<Response, RequestError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut request = self.start()?;
        for chunk in chunks {
            request.push(chunk.as_ref())?;
        }
        request.finish()
    }
}

/// Splits `object` into pieces of at most `chunk_size` bytes. `0` means one piece.
pub fn split(object: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    let size = if chunk_size == 0 { object.len().max(1) } else { chunk_size };
    object.chunks(size)
}

/// One in-progress request.
#[derive(Debug)]
pub struct Request<'p> {
    pipeline: &'p Pipeline,
    lifecycle: Lifecycle,
    state: Value,
    body: Vec<u8>,
}

impl Request<'_> {
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    fn fail(&mut self, phase: Phase, error: StageError) -> RequestError {
        if let Err(e) = self.lifecycle.advance(phase) {
            return e.into();
        }
        RequestError::Stage { phase, error }
    }

    /// Feeds the next chunk. Single-shot requests buffer until [`Request::finish`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), RequestError> {
        let pipeline = self.pipeline;
        match &pipeline.stages {
            Stages::SingleShot { .. } => {
                if self.lifecycle.phase() != Phase::Init {
                    return Err(TransitionError { from: self.lifecycle.phase(), to: Phase::Transforming }.into());
                }
                self.body.extend_from_slice(chunk);
                Ok(())
            }
            Stages::Streaming { transform, .. } => {
                self.lifecycle.advance(Phase::Transforming)?;
                match transform.chunk(chunk, &mut self.state) {
                    Ok(out) => {
                        self.body.extend(out);
                        Ok(())
                    }
                    Err(error) => Err(self.fail(Phase::TransformFailed, error)),
                }
            }
        }
    }

    /// Completes the request. Streaming pipelines run `after` here.
    pub fn finish(mut self) -> Result<Response, RequestError> {
        let pipeline = self.pipeline;
        match &pipeline.stages {
            Stages::SingleShot { transform } => {
                self.lifecycle.advance(Phase::Transforming)?;
                match transform.transform(&self.body) {
                    Ok(body) => {
                        self.lifecycle.advance(Phase::AfterDone)?;
                        Ok(Response { body, final_state: Value::Unit })
                    }
                    Err(error) => Err(self.fail(Phase::TransformFailed, error)),
                }
            }
            Stages::Streaming { after, .. } => {
                if !self.lifecycle.allows(Phase::AfterDone) {
                    return Err(TransitionError { from: self.lifecycle.phase(), to: Phase::AfterDone }.into());
                }
                let state = std::mem::take(&mut self.state);
                match after.teardown(state) {
                    Ok(finish) => {
                        self.lifecycle.advance(Phase::AfterDone)?;
                        let mut body = std::mem::take(&mut self.body);
                        body.extend(finish.tail);
                        Ok(Response { body, final_state: finish.state })
                    }
                    Err(error) => Err(self.fail(Phase::AfterFailed, error)),
                }
            }
        }
    }
}
