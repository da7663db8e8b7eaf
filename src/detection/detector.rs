use anyhow::Result;
use async_trait::async_trait;

use crate::device::Frame;

use super::BoundingBox;

/// A face/person detector loaded asynchronously by the host.
///
/// `detect` is never invoked while `is_ready` reports false.
#[async_trait]
pub trait PresenceDetector: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>>;
}
