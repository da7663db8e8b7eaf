use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::device::VideoStream;

/// Output of a QR decoding engine, emitted at the engine's own frame rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Decoded(String),
    /// Recoverable per-frame failure ("no code in this frame").
    FrameError(String),
}

#[async_trait]
pub trait QrDecoder: Send + Sync {
    /// Begin decoding `stream`. Dropping the receiver also ends the feed.
    async fn start(&self, stream: Arc<dyn VideoStream>) -> Result<mpsc::Receiver<DecodeEvent>>;

    /// Stop decoding. Must be a no-op when the decoder is not running.
    async fn stop(&self);
}
