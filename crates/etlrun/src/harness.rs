//! # Harness
//!
//! Serves a loaded [`Pipeline`] to many concurrent requests.
//!
//! ## Philosophy
//!
//! - **Isolated failures**: A failing request is logged, counted and returned to
//!   its caller. Other requests and the harness itself carry on.
//! - **Ordered chunks**: Each request runs in one task and pulls its chunks
//!   sequentially, so chunk order is arrival order.
//! - **Bounded**: A semaphore caps how many requests run at once; the rest wait.
//!
//! Uses DashMap for in-flight tracking so concurrent requests never contend on a
//! global lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::HarnessConfig;
use crate::error::RequestError;
use crate::phase::Phase;
use crate::pipeline::Pipeline;
use crate::pipeline::Response;
use crate::pipeline::split;
use crate::source::ChunkSource;

/// Reported by [`Harness::health`] while the harness accepts requests.
pub const HEALTHY: &str = "Running";

/// Strong type for request identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

/// Request counters since the harness started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub served: u64,
    pub failed: u64,
}

/// Removes a request from the in-flight table when it ends, however it ends.
struct InFlight<'h> {
    table: &'h DashMap<RequestId, Phase>,
    id: RequestId,
}

impl InFlight<'_> {
    fn record(&self, phase: Phase) {
        self.table.insert(self.id, phase);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

pub struct Harness {
    pipeline: Arc<Pipeline>,
    config: HarnessConfig,
    permits: Semaphore,
    in_flight: DashMap<RequestId, Phase>,
    next_request_id: AtomicU64,
    served: AtomicU64,
    failed: AtomicU64,
}

impl Harness {
    pub fn new(pipeline: Pipeline, config: HarnessConfig) -> Self {
        Self::with_shared(Arc::new(pipeline), config)
    }

    pub fn with_shared(pipeline: Arc<Pipeline>, config: HarnessConfig) -> Self {
        Self {
            pipeline,
            permits: Semaphore::new(config.max_concurrent_requests),
            config,
            in_flight: DashMap::new(),
            next_request_id: AtomicU64::new(1),
            served: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn health(&self) -> &'static str {
        HEALTHY
    }

    pub fn stats(&self) -> Stats {
        Stats {
            served: self.served.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Number of requests currently being served.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Snapshot of every in-flight request, oldest first.
    pub fn in_flight_requests(&self) -> Vec<(RequestId, Phase)> {
        let mut requests: Vec<_> = self.in_flight.iter().map(|entry| (*entry.key(), *entry.value())).collect();
        requests.sort_by_key(|(id, _)| *id);
        requests
    }

    /// Current phase of an in-flight request.
    pub fn phase(&self, id: RequestId) -> Option<Phase> {
        self.in_flight.get(&id).map(|entry| *entry.value())
    }

    /// Stops admitting requests. Waiting and future requests fail with [`RequestError::Closed`].
    pub fn close(&self) {
        self.permits.close();
    }

    fn track(&self) -> InFlight<'_> {
        let id = RequestId(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let guard = InFlight { table: &self.in_flight, id };
        guard.record(Phase::Init);
        guard
    }

    fn settle(&self, id: RequestId, result: Result<Response, RequestError>) -> Result<Response, RequestError> {
        match &result {
            Ok(response) => {
                self.served.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%id, bytes = response.body.len(), "request served");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%id, error = %e, "request failed");
            }
        }
        result
    }

    /// Serves one whole object, chunked by the configured chunk size.
    pub async fn serve(&self, object: &[u8]) -> Result<Response, RequestError> {
        let _permit = self.permits.acquire().await.map_err(|_| RequestError::Closed)?;
        let tracked = self.track();
        let result = self.drive(&tracked, object).await;
        self.settle(tracked.id, result)
    }

    async fn drive(&self, tracked: &InFlight<'_>, object: &[u8]) -> Result<Response, RequestError> {
        let mut request = self.pipeline.start()?;
        tracked.record(request.phase());
        for chunk in split(object, self.config.chunk_size) {
            request.push(chunk)?;
            tracked.record(request.phase());
            tokio::task::yield_now().await;
        }
        request.finish()
    }

    /// Serves one request whose chunks arrive from `source`, in arrival order.
    pub async fn serve_stream<S>(&self, source: &mut S) -> Result<Response, RequestError>
    where
        S: ChunkSource + ?Sized,
    {
        let _permit = self.permits.acquire().await.map_err(|_| RequestError::Closed)?;
        let tracked = self.track();
        let result = self.drive_stream(&tracked, source).await;
        self.settle(tracked.id, result)
    }

    async fn drive_stream<S>(&self, tracked: &InFlight<'_>, source: &mut S) -> Result<Response, RequestError>
    where
        S: ChunkSource + ?Sized,
    {
        let mut request = self.pipeline.start()?;
        tracked.record(request.phase());
        while let Some(chunk) = source.next_chunk().await? {
            request.push(&chunk)?;
            tracked.record(request.phase());
        }
        request.finish()
    }

    /// Serves `object` on its own task.
    pub fn spawn(self: &Arc<Self>, object: Vec<u8>) -> JoinHandle<Result<Response, RequestError>> {
        let harness = Arc::clone(self);
        tokio::spawn(async move { harness.serve(&object).await })
    }

    /// Serves a streamed request on its own task.
    pub fn spawn_stream<S>(self: &Arc<Self>, mut source: S) -> JoinHandle<Result<Response, RequestError>>
    where
        S: ChunkSource + 'static,
    {
        let harness = Arc::clone(self);
        tokio::spawn(async move { harness.serve_stream(&mut source).await })
    }
}
