use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::detect::Detection;

/// Pixel-free snapshot of one processed frame, as retained by the window.
#[derive(Clone, Debug)]
pub struct WindowEntry {
    pub frame_id: u64,
    pub captured_at: f64,
    pub detections: Vec<Detection>,
}

/// Time- and count-bounded FIFO of recent detection snapshots.
///
/// After every `push`, each retained entry is at most `duration_secs` older
/// than the newest entry and there are at most `max_entries` entries.
#[derive(Debug)]
pub struct RollingWindow {
    entries: VecDeque<WindowEntry>,
    duration_secs: f64,
    max_entries: usize,
}

impl RollingWindow {
    pub fn new(duration_secs: f64, max_entries: usize) -> Result<Self> {
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(anyhow!("window duration must be a positive number of seconds"));
        }
        if max_entries == 0 {
            return Err(anyhow!("window must hold at least one entry"));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(max_entries + 1),
            duration_secs,
            max_entries,
        })
    }

    /// Append an entry and evict from the oldest end. Returns the number of
    /// evicted entries.
    pub fn push(&mut self, entry: WindowEntry) -> usize {
        let newest = entry.captured_at;
        self.entries.push_back(entry);

        let mut evicted = 0;
        while let Some(oldest) = self.entries.front() {
            let too_old = newest - oldest.captured_at > self.duration_secs;
            if too_old || self.entries.len() > self.max_entries {
                self.entries.pop_front();
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }

    /// For each class label, the number of retained frames it appears in at
    /// least once. Empty window yields an empty map.
    pub fn temporal_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            let labels: BTreeSet<&str> = entry
                .detections
                .iter()
                .map(|d| d.class_label.as_str())
                .collect();
            for label in labels {
                *counts.entry(label.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn oldest(&self) -> Option<&WindowEntry> {
        self.entries.front()
    }

    pub fn newest(&self) -> Option<&WindowEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}
