use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Deterministic detector that replays a fixed list of scenes.
///
/// Scene `n` is reported for frames `n * frames_per_scene ..`, wrapping
/// around at the end of the list. Stands in for a real model in demos and
/// tests.
pub struct ScriptedBackend {
    scenes: Vec<Vec<Detection>>,
    frames_per_scene: u64,
}

impl ScriptedBackend {
    pub fn new(scenes: Vec<Vec<Detection>>, frames_per_scene: u64) -> Result<Self> {
        for detection in scenes.iter().flatten() {
            detection.validate()?;
        }
        Ok(Self {
            scenes,
            frames_per_scene: frames_per_scene.max(1),
        })
    }

    /// A desk scene: someone picks up a cup, puts it on the table, walks off.
    pub fn demo() -> Self {
        let person = |x1: f32| det("person", 0.91, x1, 60.0, x1 + 160.0, 460.0);
        let table = det("dining table", 0.84, 80.0, 320.0, 560.0, 400.0);
        let laptop = det("laptop", 0.77, 300.0, 250.0, 420.0, 322.0);
        let scenes = vec![
            vec![table.clone(), laptop.clone()],
            vec![
                person(20.0),
                table.clone(),
                laptop.clone(),
                det("cup", 0.68, 90.0, 150.0, 120.0, 190.0),
            ],
            vec![
                person(20.0),
                table.clone(),
                laptop.clone(),
                det("cup", 0.72, 200.0, 280.0, 230.0, 321.0),
            ],
            vec![
                table,
                laptop,
                det("cup", 0.74, 200.0, 280.0, 230.0, 321.0),
            ],
        ];
        Self {
            scenes,
            frames_per_scene: 6,
        }
    }

    fn scene_for(&self, frame_id: u64) -> &[Detection] {
        if self.scenes.is_empty() {
            return &[];
        }
        let index = (frame_id / self.frames_per_scene) % self.scenes.len() as u64;
        &self.scenes[index as usize]
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.scene_for(frame.id).to_vec())
    }
}

fn det(label: &str, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection::new(
        label,
        confidence,
        BoundingBox { x1, y1, x2, y2 },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_scenes_are_valid() {
        let demo = ScriptedBackend::demo();
        for detection in demo.scenes.iter().flatten() {
            detection.validate().unwrap();
        }
    }

    #[test]
    fn scenes_advance_and_wrap() {
        let a = vec![det("cup", 0.9, 0.0, 0.0, 1.0, 1.0)];
        let b = vec![det("book", 0.9, 0.0, 0.0, 1.0, 1.0)];
        let mut backend = ScriptedBackend::new(vec![a, b], 2).unwrap();

        let labels: Vec<String> = (0..6)
            .map(|id| {
                let frame = Frame::without_pixels(id, id as f64);
                backend.detect(&frame).unwrap()[0].class_label.clone()
            })
            .collect();
        assert_eq!(labels, vec!["cup", "cup", "book", "book", "cup", "cup"]);
    }

    #[test]
    fn invalid_scripted_detection_is_rejected() {
        let bad = vec![vec![det("cup", 0.9, 5.0, 0.0, 1.0, 1.0)]];
        assert!(ScriptedBackend::new(bad, 1).is_err());
    }
}
