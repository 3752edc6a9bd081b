use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Axis-aligned box in pixel coordinates, `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        let bbox = Self { x1, y1, x2, y2 };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x1 >= self.x2 || self.y1 >= self.y2 {
            return Err(anyhow!(
                "invalid bounding box ({}, {}, {}, {})",
                self.x1,
                self.y1,
                self.x2,
                self.y2
            ));
        }
        Ok(())
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// One detected object. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bbox,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.class_label.trim().is_empty() {
            return Err(anyhow!("detection class label must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "detection confidence {} outside [0, 1]",
                self.confidence
            ));
        }
        self.bbox.validate()
    }
}

/// Detections for one processed frame, in detector order.
#[derive(Debug)]
pub struct DetectionFrame {
    pub frame: Frame,
    pub captured_at: f64,
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(frame: Frame, detections: Vec<Detection>) -> Self {
        Self {
            captured_at: frame.captured_at,
            frame,
            detections,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_rejects_inverted_corners() {
        assert!(BoundingBox::new(10.0, 0.0, 5.0, 20.0).is_err());
        assert!(BoundingBox::new(0.0, 10.0, 5.0, 10.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, f32::NAN, 1.0).is_err());
    }

    #[test]
    fn bounding_box_geometry() {
        let bbox = BoundingBox::new(20.0, 10.0, 40.0, 30.0).unwrap();
        assert_eq!(bbox.width(), 20.0);
        assert_eq!(bbox.height(), 20.0);
        assert_eq!(bbox.area(), 400.0);
        assert_eq!(bbox.center(), (30.0, 20.0));
    }

    #[test]
    fn detection_validates_confidence_and_label() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(Detection::new("cup", 0.7, bbox).validate().is_ok());
        assert!(Detection::new("cup", 1.2, bbox).validate().is_err());
        assert!(Detection::new(" ", 0.7, bbox).validate().is_err());
    }
}
