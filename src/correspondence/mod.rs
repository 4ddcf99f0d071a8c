//! Ordered landmark bookkeeping for the two registration sides.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Which model a picked point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

/// One source landmark matched to one target landmark, both in original
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondencePair {
    pub source_point: Point3<f64>,
    pub target_point: Point3<f64>,
    pub confidence: Option<f64>,
    pub label: String,
}

#[derive(Debug, Clone)]
struct PickEntry {
    side: Side,
    point: Point3<f64>,
    confidence: Option<f64>,
}

/// Ordered, partially-paired landmark store.
///
/// Every pick lands on one stack in arrival order, so undo always removes
/// the literal most recent point regardless of how the operator interleaves
/// sides. Pairing is positional per side: the i-th source point matches the
/// i-th target point.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceStore {
    entries: Vec<PickEntry>,
}

impl CorrespondenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point to one side. Pairing is not required at add time.
    pub fn add_point(&mut self, side: Side, point: Point3<f64>) {
        self.entries.push(PickEntry {
            side,
            point,
            confidence: None,
        });
    }

    /// Append an already-matched pair, e.g. an accepted suggestion.
    pub fn add_pair(&mut self, source: Point3<f64>, target: Point3<f64>, confidence: Option<f64>) {
        self.entries.push(PickEntry {
            side: Side::Source,
            point: source,
            confidence,
        });
        self.entries.push(PickEntry {
            side: Side::Target,
            point: target,
            confidence,
        });
    }

    /// Remove the most recently added point.
    pub fn undo_last(&mut self) -> Option<(Side, Point3<f64>)> {
        self.entries.pop().map(|e| (e.side, e.point))
    }

    /// Empty both sides. The caller's last computed transform is
    /// unaffected; refine remains possible after a clear.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn source_count(&self) -> usize {
        self.count(Side::Source)
    }

    pub fn target_count(&self) -> usize {
        self.count(Side::Target)
    }

    fn count(&self, side: Side) -> usize {
        self.entries.iter().filter(|e| e.side == side).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Equal side counts and at least three pairs.
    pub fn ready_for_compute(&self) -> bool {
        let s = self.source_count();
        s == self.target_count() && s >= 3
    }

    /// Zip both sides in pick order up to the shorter length. Labels are
    /// 1-based pair indices.
    pub fn pairs(&self) -> Vec<CorrespondencePair> {
        let sources: Vec<&PickEntry> = self
            .entries
            .iter()
            .filter(|e| e.side == Side::Source)
            .collect();
        let targets: Vec<&PickEntry> = self
            .entries
            .iter()
            .filter(|e| e.side == Side::Target)
            .collect();

        sources
            .iter()
            .zip(targets.iter())
            .enumerate()
            .map(|(i, (s, t))| CorrespondencePair {
                source_point: s.point,
                target_point: t.point,
                confidence: match (s.confidence, t.confidence) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (one, other) => one.or(other),
                },
                label: format!("{}", i + 1),
            })
            .collect()
    }

    /// Points of one side in pick order.
    pub fn points(&self, side: Side) -> Vec<Point3<f64>> {
        self.entries
            .iter()
            .filter(|e| e.side == side)
            .map(|e| e.point)
            .collect()
    }
}
