pub mod controller;
pub mod detector;
pub mod geometry;
pub mod loop_worker;

pub use controller::{DetectionController, ReadingReceiver};
pub use detector::PresenceDetector;
pub use geometry::{BoundingBox, DetectedBox, ProximityReading};
