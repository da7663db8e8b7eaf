use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::Frame;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    pub id: String,
    pub label: String,
}

/// Failures the screen turns into a visible "retry / enable camera" state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NotFound,
    #[error("camera is held by another session")]
    Busy,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

/// A live camera stream. Doubles as the frame source for detection and scanning.
pub trait VideoStream: Send + Sync {
    fn id(&self) -> &str;

    /// `None` while the source has not buffered a decodable frame yet.
    fn current_frame(&self) -> Option<Frame>;

    /// Stop every underlying track. Must tolerate repeated calls.
    fn stop_tracks(&self);
}

#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, DeviceError>;

    /// Open a stream on `camera_id`, or on the default camera when `None`.
    async fn open(&self, camera_id: Option<&str>) -> Result<Arc<dyn VideoStream>, DeviceError>;
}

/// Pick the camera whose label matches `pattern`, else the first one listed.
pub fn preferred_camera<'a>(cameras: &'a [CameraInfo], pattern: &Regex) -> Option<&'a CameraInfo> {
    cameras
        .iter()
        .find(|camera| pattern.is_match(&camera.label))
        .or_else(|| cameras.first())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DeviceStatus {
    #[default]
    Idle,
    Requesting,
    Live { camera_id: String },
    Released,
    Error { error: DeviceError },
}

impl DeviceStatus {
    pub fn needs_retry_affordance(&self) -> bool {
        matches!(self, DeviceStatus::Error { .. })
    }

    pub fn is_live(&self) -> bool {
        matches!(self, DeviceStatus::Live { .. })
    }

    pub fn label(&self) -> String {
        match self {
            DeviceStatus::Idle => "init".into(),
            DeviceStatus::Requesting => "requesting camera".into(),
            DeviceStatus::Live { .. } => "playing".into(),
            DeviceStatus::Released => "stopped".into(),
            DeviceStatus::Error {
                error: DeviceError::NotFound,
            } => "no-camera".into(),
            DeviceStatus::Error { error } => format!("error: {error}"),
        }
    }
}
