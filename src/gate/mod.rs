//! Pass/fail gating for committing an alignment.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GateConfig;
use crate::solver::AlignmentResult;

/// One actionable hint for improving a failing or marginal alignment.
/// Exactly one is chosen per result, by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guidance {
    WidenPairSpread,
    AddFrontBackLandmark,
    ReplaceNoisyPair,
    AddOneMorePair,
}

impl Guidance {
    pub fn message(&self) -> &'static str {
        match self {
            Guidance::WidenPairSpread => "Add wider-spread pairs to increase surface overlap",
            Guidance::AddFrontBackLandmark => {
                "Add a front and a back landmark to anchor the model centers"
            }
            Guidance::ReplaceNoisyPair => "Replace the noisiest pair to bring the residual down",
            Guidance::AddOneMorePair => "Add one more pair and recompute",
        }
    }
}

/// Decides whether the latest alignment may be committed.
///
/// The verdict combines the solver's own gate with the confidence flag:
/// a result passes only when the solver says so AND it is not marked
/// low-confidence. Any selection change, swap, or new pair load forces the
/// gate shut until a fresh compute.
#[derive(Debug, Clone)]
pub struct QualityGate {
    thresholds: GateConfig,
    passed: bool,
    low_confidence: bool,
    metrics: Option<AlignmentResult>,
    context: String,
}

impl QualityGate {
    pub fn new(thresholds: GateConfig) -> Self {
        Self {
            thresholds,
            passed: false,
            low_confidence: false,
            metrics: None,
            context: "no alignment computed yet".to_string(),
        }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn low_confidence(&self) -> bool {
        self.low_confidence
    }

    pub fn metrics(&self) -> Option<&AlignmentResult> {
        self.metrics.as_ref()
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Absorb a fresh solver result and recompute the verdict.
    pub fn evaluate(&mut self, result: &AlignmentResult) {
        self.low_confidence = result.low_confidence;
        self.passed = result.quality_gate.passed && !result.low_confidence;
        self.metrics = Some(result.clone());
        self.context = if self.passed {
            result.quality_gate.reason.clone()
        } else if result.low_confidence {
            "solver flagged the result as low confidence".to_string()
        } else {
            result.quality_gate.reason.clone()
        };
        info!(
            passed = self.passed,
            low_confidence = self.low_confidence,
            rmse = result.rmse,
            overlap = result.overlap,
            "quality gate evaluated"
        );
    }

    /// Force the gate shut without a compute, e.g. on selection change or
    /// source/target swap. Metrics are dropped; only a fresh result can
    /// reopen the gate.
    pub fn invalidate(&mut self, reason: &str) {
        self.passed = false;
        self.low_confidence = false;
        self.metrics = None;
        self.context = reason.to_string();
        info!(reason = reason, "quality gate invalidated");
    }

    /// Pick the single most useful hint for this result. Pure: reads only
    /// the thresholds and the given result, never the gate state.
    pub fn guidance(&self, result: &AlignmentResult) -> Guidance {
        if result.overlap < self.thresholds.overlap_min {
            Guidance::WidenPairSpread
        } else if result.center_distance > self.thresholds.center_distance_max {
            Guidance::AddFrontBackLandmark
        } else if result.rmse > self.thresholds.rmse_max {
            Guidance::ReplaceNoisyPair
        } else {
            Guidance::AddOneMorePair
        }
    }

    /// Why Finish is disabled, or `None` when committing is allowed.
    pub fn finish_blocked_reason(&self) -> Option<String> {
        if self.passed {
            None
        } else {
            Some(self.context.clone())
        }
    }
}
