//! Top-level registration session: one controller instance owns the
//! selected models, the landmark store, the latest transform/result, the
//! quality gate, and the request lifecycle for every solver call.

use nalgebra::Point3;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RegistrationConfig;
use crate::correspondence::{CorrespondenceStore, Side};
use crate::error::RegistrationError;
use crate::gate::QualityGate;
use crate::model::{Model, ModelPresentationAdapter, PickOutcome, Ray};
use crate::overlay::{OverlayComposer, OverlayScene};
use crate::solver::{
    AlignmentClient, AlignmentResult, CoarseFitResult, RefineParams, SolverMetrics, Transform,
    TransformProvenance,
};
use crate::suggestion::{
    candidate_points, SuggestionOutcome, SuggestionParams, SuggestionSession,
};

/// What the operator is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Selection,
    Split,
    PickMode,
    Overlay,
}

/// Lifecycle of one solver-bound action. UI enablement derives from this;
/// there is no separate disabled-button bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestLifecycle {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed,
}

/// Solver-bound actions the session can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverAction {
    CoarseFit,
    Refine,
    Suggest,
    Apply,
}

impl SolverAction {
    fn name(&self) -> &'static str {
        match self {
            SolverAction::CoarseFit => "coarse-fit",
            SolverAction::Refine => "refine",
            SolverAction::Suggest => "suggest",
            SolverAction::Apply => "apply",
        }
    }
}

/// Handle for an outstanding solver call. Carries the model-pair identity
/// the request was issued under; a response completing under a different
/// identity is discarded as stale.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    action: SolverAction,
    pair_identity: Uuid,
}

#[derive(Debug, Clone, Copy, Default)]
struct ActionStates {
    coarse: RequestLifecycle,
    refine: RequestLifecycle,
    suggest: RequestLifecycle,
    apply: RequestLifecycle,
}

impl ActionStates {
    fn get(&self, action: SolverAction) -> RequestLifecycle {
        match action {
            SolverAction::CoarseFit => self.coarse,
            SolverAction::Refine => self.refine,
            SolverAction::Suggest => self.suggest,
            SolverAction::Apply => self.apply,
        }
    }

    fn set(&mut self, action: SolverAction, state: RequestLifecycle) {
        match action {
            SolverAction::CoarseFit => self.coarse = state,
            SolverAction::Refine => self.refine = state,
            SolverAction::Suggest => self.suggest = state,
            SolverAction::Apply => self.apply = state,
        }
    }
}

/// Orchestrates the pick → compute → gate → overlay → finish workflow.
///
/// All session state lives here and is passed to collaborators explicitly.
/// Transform and AlignmentResult are replaced wholesale on each compute;
/// at most one solver call is in flight at a time, and every call is tagged
/// with the current model-pair identity so late responses for a previous
/// pair can never overwrite newer state.
pub struct RegistrationSessionController {
    config: RegistrationConfig,
    client: AlignmentClient,
    source: Option<Model>,
    target: Option<Model>,
    source_adapter: Option<ModelPresentationAdapter>,
    target_adapter: Option<ModelPresentationAdapter>,
    store: CorrespondenceStore,
    suggestion: SuggestionSession,
    gate: QualityGate,
    overlay: OverlayComposer,
    current_transform: Option<Transform>,
    latest_result: Option<AlignmentResult>,
    result_pair_identity: Option<Uuid>,
    pair_identity: Uuid,
    view_mode: ViewMode,
    inflight: Option<SolverAction>,
    actions: ActionStates,
    suggestion_seeded: bool,
    solver_metrics: Option<SolverMetrics>,
}

impl RegistrationSessionController {
    pub fn new(config: RegistrationConfig) -> crate::Result<Self> {
        let client = AlignmentClient::new(&config.solver)?;
        Ok(Self {
            gate: QualityGate::new(config.gate.clone()),
            config,
            client,
            source: None,
            target: None,
            source_adapter: None,
            target_adapter: None,
            store: CorrespondenceStore::new(),
            suggestion: SuggestionSession::new(),
            overlay: OverlayComposer::new(),
            current_transform: None,
            latest_result: None,
            result_pair_identity: None,
            pair_identity: Uuid::new_v4(),
            view_mode: ViewMode::Selection,
            inflight: None,
            actions: ActionStates::default(),
            suggestion_seeded: false,
            solver_metrics: None,
        })
    }

    // --- selection ---------------------------------------------------------

    pub fn select_source(&mut self, model: Model) -> Result<(), RegistrationError> {
        if let Some(target) = &self.target {
            if target.file_path == model.file_path {
                return Err(RegistrationError::Validation(
                    "source and target must be different models".into(),
                ));
            }
        }
        self.source_adapter = Some(ModelPresentationAdapter::for_model(&model));
        self.source = Some(model);
        self.on_pair_changed("source selection changed");
        Ok(())
    }

    pub fn select_target(&mut self, model: Model) -> Result<(), RegistrationError> {
        if let Some(source) = &self.source {
            if source.file_path == model.file_path {
                return Err(RegistrationError::Validation(
                    "source and target must be different models".into(),
                ));
            }
        }
        self.target_adapter = Some(ModelPresentationAdapter::for_model(&model));
        self.target = Some(model);
        self.on_pair_changed("target selection changed");
        Ok(())
    }

    /// Exchange the two roles. Picked points and the computed transform
    /// describe the old direction and are dropped with the gate.
    pub fn swap_models(&mut self) -> Result<(), RegistrationError> {
        let (mut source, mut target) = match (self.source.take(), self.target.take()) {
            (Some(s), Some(t)) => (s, t),
            (s, t) => {
                self.source = s;
                self.target = t;
                return Err(RegistrationError::GeometryMissing(
                    "both models must be selected before swapping".into(),
                ));
            }
        };
        std::mem::swap(&mut source.role, &mut target.role);
        self.source_adapter = Some(ModelPresentationAdapter::for_model(&target));
        self.target_adapter = Some(ModelPresentationAdapter::for_model(&source));
        self.source = Some(target);
        self.target = Some(source);
        self.on_pair_changed("source and target swapped");
        Ok(())
    }

    fn on_pair_changed(&mut self, reason: &str) {
        self.pair_identity = Uuid::new_v4();
        self.gate.invalidate(reason);
        self.store.clear();
        self.current_transform = None;
        self.overlay.clear();
        self.suggestion = SuggestionSession::new();
        self.suggestion_seeded = false;
        self.view_mode = ViewMode::Selection;
        info!(pair = %self.pair_identity, reason = reason, "model pair changed");
    }

    // --- picking -----------------------------------------------------------

    pub fn enter_pick_mode(&mut self) -> Result<(), RegistrationError> {
        if self.source.is_none() || self.target.is_none() {
            return Err(RegistrationError::GeometryMissing(
                "both models must be loaded before picking".into(),
            ));
        }
        self.view_mode = ViewMode::PickMode;
        Ok(())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) -> Result<(), RegistrationError> {
        match mode {
            ViewMode::PickMode => self.enter_pick_mode(),
            ViewMode::Split | ViewMode::Overlay if self.source.is_none() || self.target.is_none() => {
                Err(RegistrationError::GeometryMissing(
                    "both models must be loaded for this view".into(),
                ))
            }
            mode => {
                self.view_mode = mode;
                Ok(())
            }
        }
    }

    /// Resolve a display-space ray against one side and record the hit.
    /// A miss changes nothing and is reported as a plain outcome.
    pub fn add_pick(&mut self, side: Side, ray: &Ray) -> Result<PickOutcome, RegistrationError> {
        if self.view_mode != ViewMode::PickMode {
            return Err(RegistrationError::Validation(
                "picking requires pick mode".into(),
            ));
        }
        let (model, adapter) = self.side_refs(side)?;
        let outcome = adapter.pick(model, ray, self.config.display.pick_radius)?;
        if let PickOutcome::Hit(point) = &outcome {
            self.store.add_point(side, *point);
            self.suggestion_seeded = false;
            info!(?side, count = self.store.pairs().len(), "landmark picked");
        }
        Ok(outcome)
    }

    /// Record a landmark already expressed in original coordinates.
    pub fn add_point(&mut self, side: Side, point: Point3<f64>) -> Result<(), RegistrationError> {
        self.side_refs(side)?;
        self.store.add_point(side, point);
        self.suggestion_seeded = false;
        Ok(())
    }

    pub fn undo_last_pick(&mut self) -> Option<(Side, Point3<f64>)> {
        self.store.undo_last()
    }

    /// Empty both landmark lists. The last computed transform survives so
    /// refine remains possible after a clear.
    pub fn clear_picks(&mut self) {
        self.store.clear();
        self.suggestion_seeded = false;
    }

    fn side_refs(
        &self,
        side: Side,
    ) -> Result<(&Model, &ModelPresentationAdapter), RegistrationError> {
        let (model, adapter) = match side {
            Side::Source => (&self.source, &self.source_adapter),
            Side::Target => (&self.target, &self.target_adapter),
        };
        match (model, adapter) {
            (Some(m), Some(a)) => Ok((m, a)),
            _ => Err(RegistrationError::GeometryMissing(format!("{side:?} model"))),
        }
    }

    // --- request lifecycle -------------------------------------------------

    /// Reserve the session's single in-flight slot for `action`.
    pub fn begin_request(
        &mut self,
        action: SolverAction,
    ) -> Result<RequestTicket, RegistrationError> {
        if let Some(active) = self.inflight {
            return Err(RegistrationError::RequestInFlight(active.name()));
        }
        self.inflight = Some(action);
        self.actions.set(action, RequestLifecycle::InFlight);
        Ok(RequestTicket {
            action,
            pair_identity: self.pair_identity,
        })
    }

    /// Release the in-flight slot. When the response belongs to a model
    /// pair that is no longer selected it is discarded here: logged, the
    /// action returns to Idle, and `Err(StaleResponse)` tells the caller
    /// nothing was applied.
    fn settle(
        &mut self,
        ticket: &RequestTicket,
        succeeded: bool,
    ) -> Result<(), RegistrationError> {
        self.inflight = None;
        if ticket.pair_identity != self.pair_identity {
            self.actions.set(ticket.action, RequestLifecycle::Idle);
            warn!(
                action = ticket.action.name(),
                request_pair = %ticket.pair_identity,
                current_pair = %self.pair_identity,
                "discarding stale solver response"
            );
            return Err(RegistrationError::StaleResponse {
                request_pair: ticket.pair_identity,
                current_pair: self.pair_identity,
            });
        }
        self.actions.set(
            ticket.action,
            if succeeded {
                RequestLifecycle::Succeeded
            } else {
                RequestLifecycle::Failed
            },
        );
        Ok(())
    }

    pub fn lifecycle(&self, action: SolverAction) -> RequestLifecycle {
        self.actions.get(action)
    }

    pub fn request_in_flight(&self) -> bool {
        self.inflight.is_some()
    }

    // --- compute -----------------------------------------------------------

    /// Closed-form fit over the current pairs. On success the session's
    /// transform is replaced; on failure the prior transform and result
    /// stay untouched. Returns the caller's own copy: state is replaced
    /// wholesale on each compute, so previously returned values never
    /// change underneath their readers.
    pub async fn compute_coarse(&mut self) -> Result<Transform, RegistrationError> {
        if !self.store.ready_for_compute() {
            return Err(RegistrationError::Validation(format!(
                "need at least 3 matched pairs with equal counts, have {} source / {} target",
                self.store.source_count(),
                self.store.target_count()
            )));
        }
        self.side_refs(Side::Source)?;
        self.side_refs(Side::Target)?;

        let ticket = self.begin_request(SolverAction::CoarseFit)?;
        let pairs = self.store.pairs();
        let outcome = self.client.coarse_fit_pairs(&pairs).await;
        self.complete_coarse(ticket, outcome)
    }

    /// Apply a coarse-fit response. Separated from [`compute_coarse`] so a
    /// host driving its own event loop can deliver responses as discrete
    /// tasks.
    pub fn complete_coarse(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<CoarseFitResult, RegistrationError>,
    ) -> Result<Transform, RegistrationError> {
        match outcome {
            Ok(fit) => {
                self.settle(&ticket, true)?;
                let provenance = if self.suggestion_seeded {
                    TransformProvenance::SemiAuto
                } else {
                    TransformProvenance::ManualCoarse
                };
                info!(
                    rmse = fit.rmse,
                    inliers = fit.inlier_count,
                    total = fit.total_points,
                    ?provenance,
                    "coarse fit installed"
                );
                let transform = fit.into_transform(provenance);
                self.current_transform = Some(transform.clone());
                Ok(transform)
            }
            Err(e) => {
                self.settle(&ticket, false)?;
                Err(e)
            }
        }
    }

    /// ICP refinement seeded by the current transform. On success the
    /// refined transform and full alignment metrics replace the session's
    /// copies and the gate is re-evaluated.
    pub async fn refine(&mut self) -> Result<AlignmentResult, RegistrationError> {
        let seed = self
            .current_transform
            .clone()
            .ok_or_else(|| RegistrationError::Validation("compute a coarse fit first".into()))?;
        let (source_path, target_path) = {
            let (source, _) = self.side_refs(Side::Source)?;
            let (target, _) = self.side_refs(Side::Target)?;
            (source.file_path.clone(), target.file_path.clone())
        };

        let ticket = self.begin_request(SolverAction::Refine)?;
        let params = RefineParams::from_config(&self.config.solver, flow_tag(&seed.provenance));
        let outcome = self
            .client
            .refine_icp(&source_path, &target_path, &seed, &params)
            .await;
        self.complete_refine(ticket, outcome)
    }

    /// Apply a refine response; counterpart of [`complete_coarse`].
    pub fn complete_refine(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<AlignmentResult, RegistrationError>,
    ) -> Result<AlignmentResult, RegistrationError> {
        match outcome {
            Ok(result) => {
                self.settle(&ticket, true)?;
                self.gate.evaluate(&result);
                self.current_transform = Some(result.transform.clone());
                self.latest_result = Some(result.clone());
                self.result_pair_identity = Some(ticket.pair_identity);
                Ok(result)
            }
            Err(e) => {
                self.settle(&ticket, false)?;
                Err(e)
            }
        }
    }

    // --- suggestions -------------------------------------------------------

    /// One suggestion round with the configured defaults.
    pub async fn run_suggestions(
        &mut self,
        roi_hint: Option<crate::solver::RoiHint>,
    ) -> Result<SuggestionOutcome, RegistrationError> {
        let (source_path, target_path) = {
            let (source, _) = self.side_refs(Side::Source)?;
            let (target, _) = self.side_refs(Side::Target)?;
            (source.file_path.clone(), target.file_path.clone())
        };
        let params = SuggestionParams {
            num_pairs: self.config.suggestion.default_num_pairs,
            profile: self.config.solver.profile.clone(),
            device_profile: self.config.solver.device_profile.clone(),
            mode: self.config.suggestion.mode.clone(),
            roi_hint,
        };

        let ticket = self.begin_request(SolverAction::Suggest)?;
        let outcome = self
            .suggestion
            .request_suggestions(&self.client, &source_path, &target_path, &params)
            .await;
        match outcome {
            Ok(result) => {
                let usable = matches!(result, SuggestionOutcome::Candidates(_));
                self.settle(&ticket, usable)?;
                Ok(result)
            }
            Err(e) => {
                self.settle(&ticket, false)?;
                Err(e)
            }
        }
    }

    /// Keep a subset of the current candidates and commit them as pairs.
    /// Each point is snapped to its own model's surface with a full
    /// nearest-vertex scan before it enters the store.
    pub fn accept_suggestions(&mut self, keep: &[usize]) -> Result<usize, RegistrationError> {
        let kept = self.suggestion.accept_subset(keep);
        if kept.is_empty() {
            return Ok(0);
        }
        let (source, _) = self.side_refs(Side::Source)?;
        let (target, _) = self.side_refs(Side::Target)?;

        let mut committed = 0;
        let mut snapped_pairs = Vec::with_capacity(kept.len());
        for candidate in &kept {
            let (raw_source, raw_target) = candidate_points(candidate);
            let snapped_source = SuggestionSession::snap_to_nearest_vertex(
                source,
                &raw_source,
                true,
                &self.config.suggestion,
            );
            let snapped_target = SuggestionSession::snap_to_nearest_vertex(
                target,
                &raw_target,
                true,
                &self.config.suggestion,
            );
            if let (Some(s), Some(t)) = (snapped_source, snapped_target) {
                snapped_pairs.push((s, t, candidate.confidence));
            }
        }
        for (s, t, confidence) in snapped_pairs {
            self.store.add_pair(s, t, Some(confidence));
            committed += 1;
        }
        self.suggestion_seeded = committed > 0;
        info!(committed, "accepted suggestions committed to store");
        Ok(committed)
    }

    /// Remove the most recently committed pair again. Returns the removed
    /// (source, target) points; the telemetry counters follow.
    pub fn remove_accepted_pair(&mut self) -> Option<(Point3<f64>, Point3<f64>)> {
        // A committed pair occupies the top two stack entries, target last.
        let target = self.store.undo_last()?;
        let source = self.store.undo_last()?;
        self.suggestion.record_pair_removed();
        Some((source.1, target.1))
    }

    pub fn suggestion_session(&self) -> &SuggestionSession {
        &self.suggestion
    }

    // --- overlay -----------------------------------------------------------

    /// Rebuild the combined scene under the current transform and switch to
    /// the overlay view.
    pub fn compose_overlay(&mut self) -> Result<OverlayScene, RegistrationError> {
        let transform = self
            .current_transform
            .clone()
            .ok_or_else(|| RegistrationError::Validation("no transform computed yet".into()))?;
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| RegistrationError::GeometryMissing("source model".into()))?;
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| RegistrationError::GeometryMissing("target model".into()))?;

        let scene = self.overlay.compose(source, target, &transform)?.clone();
        self.view_mode = ViewMode::Overlay;
        Ok(scene)
    }

    /// The most recently composed scene, if any.
    pub fn overlay_scene(&self) -> Option<&OverlayScene> {
        self.overlay.scene()
    }

    // --- finish ------------------------------------------------------------

    /// Commit the refined transform. Allowed only while the gate passes and
    /// the result was computed for the currently selected model pair.
    pub async fn finish(&mut self) -> Result<(), RegistrationError> {
        if let Some(reason) = self.gate.finish_blocked_reason() {
            return Err(RegistrationError::Validation(reason));
        }
        let result = self
            .latest_result
            .clone()
            .ok_or_else(|| RegistrationError::Validation("no alignment to commit".into()))?;
        if self.result_pair_identity != Some(self.pair_identity) {
            return Err(RegistrationError::Validation(
                "alignment was computed for a different model pair".into(),
            ));
        }
        let (source_path, target_path) = {
            let (source, _) = self.side_refs(Side::Source)?;
            let (target, _) = self.side_refs(Side::Target)?;
            (source.file_path.clone(), target.file_path.clone())
        };

        let ticket = self.begin_request(SolverAction::Apply)?;
        let outcome = self
            .client
            .apply_transform(
                &source_path,
                &target_path,
                &result.transform,
                flow_tag(&result.transform.provenance),
            )
            .await;
        match outcome {
            Ok(()) => {
                self.settle(&ticket, true)?;
                self.suggestion.record_completed();
                info!("alignment committed");
                Ok(())
            }
            Err(e) => {
                self.settle(&ticket, false)?;
                Err(e)
            }
        }
    }

    // --- telemetry ---------------------------------------------------------

    /// Refresh the aggregate solver metrics shown next to the session.
    /// Best-effort: failures are logged inside the client and leave the
    /// previous snapshot in place.
    pub async fn refresh_solver_metrics(&mut self) -> Option<SolverMetrics> {
        if let Some(metrics) = self.client.fetch_metrics().await {
            self.solver_metrics = Some(metrics);
        }
        self.solver_metrics.clone()
    }

    // --- read access -------------------------------------------------------

    pub fn client(&self) -> &AlignmentClient {
        &self.client
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    pub fn current_transform(&self) -> Option<&Transform> {
        self.current_transform.as_ref()
    }

    pub fn latest_result(&self) -> Option<&AlignmentResult> {
        self.latest_result.as_ref()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn pair_identity(&self) -> Uuid {
        self.pair_identity
    }

    pub fn source(&self) -> Option<&Model> {
        self.source.as_ref()
    }

    pub fn target(&self) -> Option<&Model> {
        self.target.as_ref()
    }

    pub fn source_adapter(&self) -> Option<&ModelPresentationAdapter> {
        self.source_adapter.as_ref()
    }

    pub fn target_adapter(&self) -> Option<&ModelPresentationAdapter> {
        self.target_adapter.as_ref()
    }
}

fn flow_tag(provenance: &TransformProvenance) -> &'static str {
    match provenance {
        TransformProvenance::ManualCoarse | TransformProvenance::ManualRefine => "manual_refine",
        TransformProvenance::SemiAuto => "semi_auto",
        TransformProvenance::Auto => "auto",
        TransformProvenance::RefineIcp => "refine_icp",
    }
}
