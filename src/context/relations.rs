//! Pairwise spatial relationships between detections in a single frame.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::detect::Detection;

/// Upper share of a person's box in which a held object's center must lie.
const HOLDING_UPPER_FRACTION: f32 = 0.7;

pub const DEFAULT_SURFACE_CLASSES: &[&str] = &[
    "table",
    "desk",
    "bed",
    "couch",
    "chair",
    "dining table",
    "counter",
    "shelf",
];

pub const DEFAULT_HOLDABLE_CLASSES: &[&str] = &[
    "cell phone",
    "bottle",
    "cup",
    "book",
    "remote",
    "fork",
    "knife",
    "spoon",
    "umbrella",
];

/// Spatial predicate, listed in evaluation priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    On,
    Holding,
    LeftOf,
    RightOf,
    Near,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::On => "on",
            Predicate::Holding => "holding",
            Predicate::LeftOf => "left_of",
            Predicate::RightOf => "right_of",
            Predicate::Near => "near",
        }
    }

    /// Human phrasing, underscores replaced by spaces.
    pub fn phrase(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(subject, predicate, object)` triple.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
}

impl Relationship {
    pub fn new(subject: impl Into<String>, predicate: Predicate, object: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {} {}",
            self.subject,
            self.predicate.phrase(),
            self.object
        )
    }
}

/// Thresholds and vocabularies for relationship inference.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationConfig {
    /// Max |A.bottom - B.top| in pixels for "on".
    pub vertical_tolerance: f32,
    /// Max |A.center_y - B.center_y| in pixels for "left_of"/"right_of".
    pub horizontal_tolerance: f32,
    /// Max center distance in pixels for "near".
    pub near_threshold: f32,
    pub surface_classes: BTreeSet<String>,
    pub holdable_classes: BTreeSet<String>,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            vertical_tolerance: 50.0,
            horizontal_tolerance: 50.0,
            near_threshold: 150.0,
            surface_classes: DEFAULT_SURFACE_CLASSES.iter().map(|s| s.to_string()).collect(),
            holdable_classes: DEFAULT_HOLDABLE_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Infer the relationship set for one frame.
///
/// Every ordered pair of distinct detections is evaluated, largest box first,
/// and contributes at most one relationship: the first of on, holding,
/// left_of/right_of, near that matches. Duplicates collapse.
pub fn build_relationships(
    detections: &[Detection],
    config: &RelationConfig,
) -> BTreeSet<Relationship> {
    let mut ordered: Vec<&Detection> = detections.iter().collect();
    ordered.sort_by(|a, b| b.bbox.area().total_cmp(&a.bbox.area()));

    let mut relationships = BTreeSet::new();
    for (i, a) in ordered.iter().enumerate() {
        for (j, b) in ordered.iter().enumerate() {
            if i == j {
                continue;
            }
            if let Some(predicate) = classify_pair(a, b, config) {
                relationships.insert(Relationship::new(
                    a.class_label.as_str(),
                    predicate,
                    b.class_label.as_str(),
                ));
            }
        }
    }
    relationships
}

/// First matching predicate for `a <predicate> b`, in priority order.
pub fn classify_pair(a: &Detection, b: &Detection, config: &RelationConfig) -> Option<Predicate> {
    if is_on(a, b, config) {
        return Some(Predicate::On);
    }
    if is_holding(a, b, config) {
        return Some(Predicate::Holding);
    }
    if let Some(side) = horizontal_relation(a, b, config) {
        return Some(side);
    }
    if center_distance(a, b) < config.near_threshold {
        return Some(Predicate::Near);
    }
    None
}

fn is_on(a: &Detection, b: &Detection, config: &RelationConfig) -> bool {
    if !config.surface_classes.contains(&b.class_label) {
        return false;
    }
    let vertically_aligned = (a.bbox.y2 - b.bbox.y1).abs() < config.vertical_tolerance;
    let (a_center_x, _) = a.bbox.center();
    let over_surface = b.bbox.x1 <= a_center_x && a_center_x <= b.bbox.x2;
    vertically_aligned && over_surface
}

fn is_holding(person: &Detection, object: &Detection, config: &RelationConfig) -> bool {
    if person.class_label != "person" || !config.holdable_classes.contains(&object.class_label) {
        return false;
    }
    let (cx, cy) = object.bbox.center();
    let within_span = person.bbox.x1 <= cx && cx <= person.bbox.x2;
    let upper_limit = person.bbox.y1 + person.bbox.height() * HOLDING_UPPER_FRACTION;
    within_span && cy <= upper_limit
}

fn horizontal_relation(a: &Detection, b: &Detection, config: &RelationConfig) -> Option<Predicate> {
    let (ax, ay) = a.bbox.center();
    let (bx, by) = b.bbox.center();
    if (ay - by).abs() >= config.horizontal_tolerance {
        return None;
    }
    // Equal x-centers fall through to right_of.
    if ax < bx {
        Some(Predicate::LeftOf)
    } else {
        Some(Predicate::RightOf)
    }
}

fn center_distance(a: &Detection, b: &Detection) -> f32 {
    let (ax, ay) = a.bbox.center();
    let (bx, by) = b.bbox.center();
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(x1, y1, x2, y2).unwrap())
    }

    #[test]
    fn person_holding_cup_in_upper_region() {
        let config = RelationConfig::default();
        let person = det("person", 0.0, 0.0, 100.0, 200.0);
        let cup = det("cup", 20.0, 10.0, 40.0, 30.0);
        assert_eq!(classify_pair(&person, &cup, &config), Some(Predicate::Holding));

        let rels = build_relationships(&[cup, person], &config);
        assert!(rels.contains(&Relationship::new("person", Predicate::Holding, "cup")));
        // The reverse pair has no holding rule and is 82.5px apart.
        assert!(rels.contains(&Relationship::new("cup", Predicate::Near, "person")));
        assert_eq!(rels.len(), 2);
    }

    #[test]
    fn object_below_upper_region_is_not_held() {
        let config = RelationConfig::default();
        let person = det("person", 0.0, 0.0, 100.0, 200.0);
        let cup = det("cup", 20.0, 170.0, 40.0, 190.0);
        assert_ne!(classify_pair(&person, &cup, &config), Some(Predicate::Holding));
    }

    #[test]
    fn object_resting_on_surface() {
        let config = RelationConfig::default();
        let table = det("table", 0.0, 300.0, 400.0, 320.0);
        let cup = det("cup", 150.0, 260.0, 170.0, 300.0);
        assert_eq!(classify_pair(&cup, &table, &config), Some(Predicate::On));

        let rels = build_relationships(&[table, cup], &config);
        assert!(rels.contains(&Relationship::new("cup", Predicate::On, "table")));
        // Centers are 30px apart vertically, table center x=200 > cup center x=160.
        assert!(rels.contains(&Relationship::new("table", Predicate::RightOf, "cup")));
    }

    #[test]
    fn on_outranks_horizontal_and_near() {
        let config = RelationConfig::default();
        let table = det("table", 0.0, 300.0, 400.0, 320.0);
        let cup = det("cup", 150.0, 260.0, 170.0, 300.0);
        // Centers are 30px apart vertically and cup center x < table center x,
        // so left_of and near would both match if "on" did not come first.
        let (cx, cy) = cup.bbox.center();
        let (tx, ty) = table.bbox.center();
        assert!((cy - ty).abs() < config.horizontal_tolerance && cx < tx);
        assert_eq!(classify_pair(&cup, &table, &config), Some(Predicate::On));
    }

    #[test]
    fn horizontal_relation_wins_over_near() {
        let config = RelationConfig::default();
        let book = det("book", 0.0, 0.0, 20.0, 20.0);
        let remote = det("remote", 40.0, 0.0, 60.0, 20.0);
        assert_eq!(classify_pair(&book, &remote, &config), Some(Predicate::LeftOf));
        assert_eq!(classify_pair(&remote, &book, &config), Some(Predicate::RightOf));
    }

    #[test]
    fn equal_centers_resolve_to_right_of() {
        let config = RelationConfig::default();
        let a = det("book", 0.0, 0.0, 20.0, 20.0);
        let b = det("bottle", 5.0, 5.0, 15.0, 15.0);
        assert_eq!(classify_pair(&a, &b, &config), Some(Predicate::RightOf));
        assert_eq!(classify_pair(&b, &a, &config), Some(Predicate::RightOf));
    }

    #[test]
    fn near_is_fallback_and_respects_threshold() {
        let config = RelationConfig::default();
        let a = det("dog", 0.0, 0.0, 10.0, 10.0);
        let close = det("cat", 60.0, 100.0, 70.0, 110.0);
        let far = det("cat", 300.0, 300.0, 310.0, 310.0);
        assert_eq!(classify_pair(&a, &close, &config), Some(Predicate::Near));
        assert_eq!(classify_pair(&a, &far, &config), None);
    }

    #[test]
    fn relationship_set_is_permutation_invariant() {
        let config = RelationConfig::default();
        let detections = vec![
            det("person", 0.0, 0.0, 100.0, 200.0),
            det("cup", 20.0, 10.0, 40.0, 30.0),
            det("table", 0.0, 190.0, 400.0, 260.0),
            det("book", 150.0, 150.0, 190.0, 195.0),
        ];
        let expected = build_relationships(&detections, &config);
        assert!(!expected.is_empty());

        let mut rotated = detections.clone();
        for _ in 0..detections.len() {
            rotated.rotate_left(1);
            assert_eq!(build_relationships(&rotated, &config), expected);
        }
        let mut reversed = detections;
        reversed.reverse();
        assert_eq!(build_relationships(&reversed, &config), expected);
    }

    #[test]
    fn duplicate_pairs_collapse() {
        let config = RelationConfig::default();
        let detections = vec![
            det("cup", 0.0, 0.0, 10.0, 10.0),
            det("cup", 0.0, 0.0, 10.0, 10.0),
            det("bottle", 30.0, 0.0, 40.0, 10.0),
        ];
        let rels = build_relationships(&detections, &config);
        let cup_left_of_bottle = rels
            .iter()
            .filter(|r| r.subject == "cup" && r.object == "bottle")
            .count();
        assert_eq!(cup_left_of_bottle, 1);
        assert!(rels.contains(&Relationship::new("cup", Predicate::RightOf, "cup")));
    }

    #[test]
    fn relationship_renders_with_spaces() {
        let rel = Relationship::new("book", Predicate::LeftOf, "lamp");
        assert_eq!(rel.to_string(), "book is left of lamp");
        assert_eq!(Predicate::RightOf.as_str(), "right_of");
    }
}
