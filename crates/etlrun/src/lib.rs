//! # Etlrun
//!
//! The sandbox side of an ETL job: load a rendered script once, then serve it.
//!
//! ## Architecture
//!
//! - **Load**: [`load`] verifies the script, decodes each slot and rebuilds its
//!   callable from the local [`Catalog`](etlcode::Catalog). Any failure here fails
//!   the job before the first request.
//! - **Pipeline**: Runs single-shot or streaming requests through a per-request
//!   [`Lifecycle`](phase::Lifecycle).
//! - **Harness**: Serves many requests at once on tokio, feeding streaming
//!   requests from any [`ChunkSource`].

pub mod config;
pub mod error;
pub mod harness;
pub mod phase;
pub mod pipeline;
pub mod source;

#[cfg(test)]
mod tests;

pub use config::HarnessConfig;
pub use error::ConfigError;
pub use error::LoadError;
pub use error::RequestError;
pub use error::SourceError;
pub use error::TransitionError;
pub use harness::Harness;
pub use harness::RequestId;
pub use harness::Stats;
pub use phase::Phase;
pub use pipeline::Pipeline;
pub use pipeline::Request;
pub use pipeline::Response;
pub use pipeline::load;
pub use source::ChunkSource;
pub use source::Chunks;
