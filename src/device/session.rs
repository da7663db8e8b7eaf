use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};

use super::{CameraProvider, DeviceError, DeviceStatus, VideoStream};

/// Process-wide exclusivity for the camera. Every `DeviceSession` built from
/// clones of the same lease competes for a single permit.
#[derive(Clone)]
pub struct CameraLease {
    permit: Arc<Semaphore>,
}

impl CameraLease {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn is_free(&self) -> bool {
        self.permit.available_permits() == 1
    }

    fn try_take(&self) -> Result<OwnedSemaphorePermit, DeviceError> {
        self.permit
            .clone()
            .try_acquire_owned()
            .map_err(|_| DeviceError::Busy)
    }
}

impl Default for CameraLease {
    fn default() -> Self {
        Self::new()
    }
}

struct HeldStream {
    stream: Arc<dyn VideoStream>,
    _permit: OwnedSemaphorePermit,
}

/// Exclusive holder of one camera stream for a single owner.
///
/// `acquire` is idempotent: the lock is held across the device request, so a
/// duplicate call waits for the first and then gets the same stream back.
/// `release` may be called any number of times.
pub struct DeviceSession {
    provider: Arc<dyn CameraProvider>,
    lease: CameraLease,
    held: Mutex<Option<HeldStream>>,
    status: watch::Sender<DeviceStatus>,
}

impl DeviceSession {
    pub fn new(provider: Arc<dyn CameraProvider>, lease: CameraLease) -> Self {
        let (status, _) = watch::channel(DeviceStatus::Idle);
        Self {
            provider,
            lease,
            held: Mutex::new(None),
            status,
        }
    }

    pub async fn acquire(&self, camera_id: Option<&str>) -> Result<Arc<dyn VideoStream>, DeviceError> {
        let mut held = self.held.lock().await;
        if let Some(existing) = held.as_ref() {
            return Ok(existing.stream.clone());
        }

        let permit = match self.lease.try_take() {
            Ok(permit) => permit,
            Err(err) => {
                warn!("camera acquire refused: {err}");
                self.status.send_replace(DeviceStatus::Error { error: err.clone() });
                return Err(err);
            }
        };

        self.status.send_replace(DeviceStatus::Requesting);
        match self.provider.open(camera_id).await {
            Ok(stream) => {
                info!("camera stream {} acquired", stream.id());
                self.status.send_replace(DeviceStatus::Live {
                    camera_id: stream.id().to_string(),
                });
                *held = Some(HeldStream {
                    stream: stream.clone(),
                    _permit: permit,
                });
                Ok(stream)
            }
            Err(err) => {
                warn!("camera open failed: {err}");
                self.status.send_replace(DeviceStatus::Error { error: err.clone() });
                Err(err)
            }
        }
    }

    pub async fn release(&self) {
        let taken = self.held.lock().await.take();
        if let Some(held) = taken {
            held.stream.stop_tracks();
            info!("camera stream {} released", held.stream.id());
            self.status.send_replace(DeviceStatus::Released);
        }
    }

    pub async fn is_held(&self) -> bool {
        self.held.lock().await.is_some()
    }

    pub fn status(&self) -> watch::Receiver<DeviceStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> DeviceStatus {
        self.status.borrow().clone()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(held) = self.held.get_mut().take() {
            warn!("device session dropped while holding {}; stopping tracks", held.stream.id());
            held.stream.stop_tracks();
        }
    }
}
