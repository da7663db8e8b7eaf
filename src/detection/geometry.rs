use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detector output in frame-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Share of the frame covered by this box; 0 for an empty frame.
    pub fn area_ratio(&self, frame_area: f64) -> f64 {
        if frame_area <= 0.0 {
            return 0.0;
        }
        self.area() / frame_area
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedBox {
    pub bbox: BoundingBox,
    pub area_ratio: f64,
    /// Whether this box alone clears the threshold (drawn as "arrive").
    pub close: bool,
}

/// What one applied detection tick tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityReading {
    pub seq: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub boxes: Vec<DetectedBox>,
    pub max_area_ratio: f64,
    pub close_enough: bool,
    /// Consecutive applied ticks (including this one) with `close_enough`.
    pub close_streak: u32,
    pub timestamp: DateTime<Utc>,
}

impl ProximityReading {
    pub fn evaluate(
        seq: u64,
        boxes: &[BoundingBox],
        frame_width: u32,
        frame_height: u32,
        threshold: f64,
    ) -> Self {
        let frame_area = f64::from(frame_width) * f64::from(frame_height);
        let boxes: Vec<DetectedBox> = boxes
            .iter()
            .map(|bbox| {
                let area_ratio = bbox.area_ratio(frame_area);
                DetectedBox {
                    bbox: *bbox,
                    area_ratio,
                    close: area_ratio >= threshold,
                }
            })
            .collect();

        let max_area_ratio = boxes
            .iter()
            .map(|detected| detected.area_ratio)
            .fold(0.0_f64, f64::max);
        let close_enough = !boxes.is_empty() && max_area_ratio >= threshold;

        Self {
            seq,
            frame_width,
            frame_height,
            boxes,
            max_area_ratio,
            close_enough,
            close_streak: u32::from(close_enough),
            timestamp: Utc::now(),
        }
    }

    pub fn confirmed(&self, confirm_ticks: u32) -> bool {
        self.close_enough && self.close_streak >= confirm_ticks.max(1)
    }
}
