use std::{sync::Arc, time::Instant};

use image::RgbImage;

/// A decoded video frame shared between the detector and the scanner.
///
/// Cloning is cheap; the pixel buffer sits behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self::from_shared(Arc::new(image))
    }

    pub fn from_shared(image: Arc<RgbImage>) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn area(&self) -> f64 {
        f64::from(self.width()) * f64::from(self.height())
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}
