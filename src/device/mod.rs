pub mod camera;
pub mod frame;
pub mod session;

pub use camera::{preferred_camera, CameraInfo, CameraProvider, DeviceError, DeviceStatus, VideoStream};
pub use frame::Frame;
pub use session::{CameraLease, DeviceSession};
