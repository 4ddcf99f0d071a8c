//! Suggested-correspondence workflow: request candidates from the external
//! suggester, let the operator keep or discard them, and track telemetry.

use chrono::{DateTime, Utc};
use instant::Instant;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SuggestionConfig;
use crate::error::RegistrationError;
use crate::model::Model;
use crate::solver::protocol::point_from_wire;
use crate::solver::{AlignmentClient, RoiHint, SuggestDiagnostics, SuggestRequest, SuggestedPair};

/// Per-request knobs forwarded to the suggester.
#[derive(Debug, Clone)]
pub struct SuggestionParams {
    pub num_pairs: usize,
    pub profile: String,
    pub device_profile: String,
    pub mode: String,
    pub roi_hint: Option<RoiHint>,
}

/// Telemetry counters for one suggestion session. Display only; nothing
/// here may influence correctness.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    pub started_at: DateTime<Utc>,
    pub suggest_count: u32,
    pub accepted_pairs: u32,
    pub edited_pairs: u32,
    pub reruns: u32,
    pub completed_count: u32,
    pub elapsed_seconds: f64,
}

/// What a suggestion round produced.
#[derive(Debug, Clone)]
pub enum SuggestionOutcome {
    /// Candidates ready for review, in solver-ranked order.
    Candidates(Vec<SuggestedPair>),
    /// The round cannot seed a registration (solver failure or fewer than
    /// three usable pairs). Recoverable: fall back to manual picking.
    Unusable { reason: String },
}

/// One operator-facing suggestion session.
pub struct SuggestionSession {
    started: Instant,
    started_at: DateTime<Utc>,
    suggest_count: u32,
    accepted_pairs: u32,
    edited_pairs: u32,
    reruns: u32,
    completed_count: u32,
    candidates: Vec<SuggestedPair>,
    last_diagnostics: Option<SuggestDiagnostics>,
}

impl Default for SuggestionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionSession {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            suggest_count: 0,
            accepted_pairs: 0,
            edited_pairs: 0,
            reruns: 0,
            completed_count: 0,
            candidates: Vec::new(),
            last_diagnostics: None,
        }
    }

    /// Ask the suggester for candidate pairs, addressing both models by
    /// their solver-side paths. Network and protocol failures are folded
    /// into [`SuggestionOutcome::Unusable`]; only genuinely unexpected
    /// local errors propagate.
    pub async fn request_suggestions(
        &mut self,
        client: &AlignmentClient,
        source_path: &str,
        target_path: &str,
        params: &SuggestionParams,
    ) -> Result<SuggestionOutcome, RegistrationError> {
        self.suggest_count += 1;
        if self.suggest_count > 1 {
            self.reruns += 1;
        }

        let request = SuggestRequest {
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
            num_pairs: params.num_pairs,
            profile: params.profile.clone(),
            suggestion_mode: params.mode.clone(),
            device_profile: params.device_profile.clone(),
            roi_hint: params.roi_hint.clone(),
        };

        let response = match client.suggest_points(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "suggestion request failed, falling back to manual picking");
                return Ok(SuggestionOutcome::Unusable {
                    reason: e.to_string(),
                });
            }
        };

        info!(
            pairs = response.pairs.len(),
            roi_mode = %response.diagnostics.roi_mode,
            attempts = response.diagnostics.attempt_count,
            "suggestions received"
        );
        self.last_diagnostics = Some(response.diagnostics.clone());

        if response.pairs.len() < 3 {
            return Ok(SuggestionOutcome::Unusable {
                reason: format!(
                    "suggester produced {} usable pairs, need at least 3",
                    response.pairs.len()
                ),
            });
        }

        self.candidates = response.pairs.clone();
        Ok(SuggestionOutcome::Candidates(response.pairs))
    }

    /// Replace a raw point with the nearest sample on the model's actual
    /// surface. `exact` scans every vertex and is required before a pair is
    /// committed; the subsampled search is for live preview only.
    pub fn snap_to_nearest_vertex(
        model: &Model,
        point: &Point3<f64>,
        exact: bool,
        config: &SuggestionConfig,
    ) -> Option<Point3<f64>> {
        model.nearest_vertex(point, exact, config.snap_subsample_stride)
    }

    /// Keep the candidates at `keep` (indices into the current candidate
    /// list). Every discarded candidate counts as an edit.
    pub fn accept_subset(&mut self, keep: &[usize]) -> Vec<SuggestedPair> {
        let kept: Vec<SuggestedPair> = keep
            .iter()
            .filter_map(|&i| self.candidates.get(i).cloned())
            .collect();

        let discarded = self.candidates.len().saturating_sub(kept.len());
        self.edited_pairs += discarded as u32;
        self.accepted_pairs = kept.len() as u32;

        info!(
            accepted = kept.len(),
            discarded, "suggestion subset accepted"
        );
        kept
    }

    /// An accepted pair was deleted afterwards, before any rerun.
    pub fn record_pair_removed(&mut self) {
        self.accepted_pairs = self.accepted_pairs.saturating_sub(1);
        self.edited_pairs += 1;
    }

    /// A registration seeded by this session reached Finish.
    pub fn record_completed(&mut self) {
        self.completed_count += 1;
    }

    pub fn candidates(&self) -> &[SuggestedPair] {
        &self.candidates
    }

    pub fn last_diagnostics(&self) -> Option<&SuggestDiagnostics> {
        self.last_diagnostics.as_ref()
    }

    pub fn session_metrics(&self) -> SessionMetrics {
        SessionMetrics {
            started_at: self.started_at,
            suggest_count: self.suggest_count,
            accepted_pairs: self.accepted_pairs,
            edited_pairs: self.edited_pairs,
            reruns: self.reruns,
            completed_count: self.completed_count,
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Candidate points ride the wire as triples; expose them as points for
/// store insertion.
pub fn candidate_points(pair: &SuggestedPair) -> (Point3<f64>, Point3<f64>) {
    (
        point_from_wire(&pair.source_point),
        point_from_wire(&pair.target_point),
    )
}
