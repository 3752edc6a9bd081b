use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

use scene_kernel::context::{build_relationships, RollingWindow, WindowEntry};
use scene_kernel::{
    BoundingBox, ContextConfig, ContextEngine, Detection, DetectionFrame, Frame, Predicate,
    RelationConfig, Relationship,
};

fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection::new(label, 0.9, BoundingBox::new(x1, y1, x2, y2).unwrap())
}

fn random_detection(rng: &mut StdRng) -> Detection {
    let labels = ["person", "cup", "table", "book", "laptop", "bottle", "chair"];
    let label = labels[rng.gen_range(0..labels.len())];
    let x1 = rng.gen_range(0.0..600.0f32);
    let y1 = rng.gen_range(0.0..440.0f32);
    let w = rng.gen_range(1.0..200.0f32);
    let h = rng.gen_range(1.0..200.0f32);
    det(label, x1, y1, x1 + w, y1 + h)
}

// ============================================================================
// Rolling window
// ============================================================================

#[test]
fn window_caps_hold_for_random_arrival_patterns() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let duration = rng.gen_range(0.5..5.0);
        let max_entries = rng.gen_range(1..12);
        let mut window = RollingWindow::new(duration, max_entries).unwrap();
        let mut t = 1_000.0;
        for frame_id in 0..300u64 {
            t += rng.gen_range(0.0..1.0);
            window.push(WindowEntry {
                frame_id,
                captured_at: t,
                detections: Vec::new(),
            });
            let newest = window.newest().unwrap().captured_at;
            assert!(window.len() <= max_entries);
            assert!(window.len() >= 1);
            for entry in window.iter() {
                assert!(newest - entry.captured_at <= duration);
            }
            let ids: Vec<u64> = window.iter().map(|e| e.frame_id).collect();
            assert!(ids.windows(2).all(|pair| pair[1] == pair[0] + 1));
        }
    }
}

#[test]
fn empty_window_has_empty_temporal_summary() {
    let engine = ContextEngine::new(&ContextConfig::default()).unwrap();
    assert!(engine.temporal_summary().is_empty());
}

// ============================================================================
// Relationships
// ============================================================================

#[test]
fn person_holding_cup_example() {
    let rels = build_relationships(
        &[
            det("person", 0.0, 0.0, 100.0, 200.0),
            det("cup", 20.0, 10.0, 40.0, 30.0),
        ],
        &RelationConfig::default(),
    );
    assert!(rels.contains(&Relationship::new("person", Predicate::Holding, "cup")));
}

#[test]
fn cup_on_table_example() {
    let rels = build_relationships(
        &[
            det("table", 0.0, 300.0, 400.0, 320.0),
            det("cup", 150.0, 260.0, 170.0, 300.0),
        ],
        &RelationConfig::default(),
    );
    assert!(rels.contains(&Relationship::new("cup", Predicate::On, "table")));
    assert!(!rels.contains(&Relationship::new("cup", Predicate::LeftOf, "table")));
    assert!(!rels.contains(&Relationship::new("cup", Predicate::Near, "table")));
}

#[test]
fn each_ordered_pair_yields_at_most_one_predicate() {
    let mut rng = StdRng::seed_from_u64(11);
    let config = RelationConfig::default();
    for _ in 0..50 {
        let detections: Vec<Detection> = (0..rng.gen_range(2..6))
            .map(|_| random_detection(&mut rng))
            .collect();
        let labels: BTreeSet<&str> = detections.iter().map(|d| d.class_label.as_str()).collect();
        if labels.len() != detections.len() {
            // Repeated labels legitimately produce several predicates per label pair.
            continue;
        }
        let rels = build_relationships(&detections, &config);
        let pairs: BTreeSet<(&str, &str)> = rels
            .iter()
            .map(|r| (r.subject.as_str(), r.object.as_str()))
            .collect();
        assert_eq!(pairs.len(), rels.len());
    }
}

#[test]
fn relationships_do_not_depend_on_input_order() {
    let mut rng = StdRng::seed_from_u64(23);
    let config = RelationConfig::default();
    for _ in 0..50 {
        let mut detections: Vec<Detection> = (0..rng.gen_range(0..7))
            .map(|_| random_detection(&mut rng))
            .collect();
        let expected = build_relationships(&detections, &config);
        for _ in 0..5 {
            detections.shuffle(&mut rng);
            assert_eq!(build_relationships(&detections, &config), expected);
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[test]
fn summaries_track_window_and_current_frame() {
    let config = ContextConfig {
        window_seconds: 2.0,
        max_window_entries: 10,
        ..ContextConfig::default()
    };
    let mut engine = ContextEngine::new(&config).unwrap();

    let frames = vec![
        (0.0, vec![det("person", 0.0, 0.0, 100.0, 200.0)]),
        (1.0, vec![det("person", 0.0, 0.0, 100.0, 200.0), det("cup", 20.0, 10.0, 40.0, 30.0)]),
        (2.0, vec![det("cup", 20.0, 10.0, 40.0, 30.0)]),
        (3.5, vec![]),
    ];
    let mut summaries = Vec::new();
    for (id, (at, detections)) in frames.into_iter().enumerate() {
        let frame = Frame::new(id as u64, at, 4, 4, vec![0; 48]);
        let update = engine.process(DetectionFrame::new(frame, detections));
        assert_eq!(update.frame.id, id as u64);
        summaries.push(update.summary);
    }

    assert_eq!(summaries[1].objects_visible, vec!["person", "cup"]);
    assert!(summaries[1]
        .relationships
        .contains(&Relationship::new("person", Predicate::Holding, "cup")));
    assert_eq!(summaries[2].temporal_counts.get("person"), Some(&2));
    assert_eq!(summaries[2].temporal_counts.get("cup"), Some(&2));
    assert_eq!(summaries[2].window_depth, 3);

    // At t=3.5 only frames from t>=1.5 remain: the cup frame and the empty one.
    let last = &summaries[3];
    assert_eq!(last.window_depth, 2);
    assert_eq!(last.temporal_counts.get("person"), None);
    assert_eq!(last.temporal_counts.get("cup"), Some(&1));
    assert!(last.objects_visible.is_empty());
    assert!(last.relationships.is_empty());
    assert!(last
        .rendered_prompt
        .contains("**Currently Visible:** No objects detected"));
    assert!(last
        .rendered_prompt
        .contains("- No clear spatial relationships detected"));
    assert!(last.rendered_prompt.contains("cup (1 frames)"));
}
