//! # Chunk Sources
//!
//! Where a streaming request's chunks come from. The harness pulls chunks one at
//! a time and never reorders them.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::error::SourceError;

/// An ordered, async supply of chunks for one request.
///
/// This trait is designed to be object-safe (`&mut dyn ChunkSource`).
#[async_trait::async_trait]
pub trait ChunkSource: Send {
    /// The next chunk, or `None` once the request body is complete.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError>;
}

/// A channel closes the request when every sender is dropped.
#[async_trait::async_trait]
impl ChunkSource for mpsc::Receiver<Vec<u8>> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.recv().await)
    }
}

#[async_trait::async_trait]
impl ChunkSource for mpsc::UnboundedReceiver<Vec<u8>> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.recv().await)
    }
}

/// Chunks already held in memory.
#[derive(Debug, Clone, Default)]
pub struct Chunks(VecDeque<Vec<u8>>);

impl Chunks {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self(chunks.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait::async_trait]
impl ChunkSource for Chunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.0.pop_front())
    }
}
