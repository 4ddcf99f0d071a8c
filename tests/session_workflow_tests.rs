mod common;

use approx::assert_relative_eq;
use nalgebra::Point3;

use common::{grid_model, MockSolver, MockState, RefineBehavior};
use model_registration::config::RegistrationConfig;
use model_registration::correspondence::Side;
use model_registration::model::ModelRole;
use model_registration::session::{RegistrationSessionController, RequestLifecycle, SolverAction};
use model_registration::solver::TransformProvenance;
use model_registration::Guidance;

fn controller_for(mock: &MockSolver) -> RegistrationSessionController {
    let mut config = RegistrationConfig::default();
    config.solver.base_url = mock.base_url.clone();
    config.solver.request_timeout_secs = 5;
    RegistrationSessionController::new(config).unwrap()
}

fn load_pair(ctrl: &mut RegistrationSessionController) {
    ctrl.select_source(grid_model(ModelRole::Source, "patient-1/jaw.ply", 0.0))
        .unwrap();
    ctrl.select_target(grid_model(ModelRole::Target, "patient-1/face.stl", 5.0))
        .unwrap();
}

fn add_three_pairs(ctrl: &mut RegistrationSessionController) {
    // Target points are the source points shifted by (5, 0, 0), matching
    // the fixtures' vertex grids.
    for (s, t) in [
        (Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)),
        (Point3::new(10.0, 0.0, 0.0), Point3::new(15.0, 0.0, 0.0)),
        (Point3::new(0.0, 10.0, 0.0), Point3::new(5.0, 10.0, 0.0)),
    ] {
        ctrl.add_point(Side::Source, s).unwrap();
        ctrl.add_point(Side::Target, t).unwrap();
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_full_workflow_pick_compute_gate_overlay_finish() {
    let mock = MockSolver::spawn().await;
    let mut ctrl = controller_for(&mock);
    load_pair(&mut ctrl);
    add_three_pairs(&mut ctrl);
    assert!(ctrl.store().ready_for_compute());

    // Coarse fit installs a manual transform.
    let transform = ctrl.compute_coarse().await.unwrap();
    assert_relative_eq!(transform.translation.x, 5.0, epsilon = 1e-9);
    assert_eq!(transform.provenance, TransformProvenance::ManualCoarse);
    assert_eq!(
        ctrl.lifecycle(SolverAction::CoarseFit),
        RequestLifecycle::Succeeded
    );

    // Refine re-evaluates the gate.
    let result = ctrl.refine().await.unwrap();
    assert!(result.quality_gate.passed);
    assert!(ctrl.gate().passed());
    assert!(ctrl.gate().finish_blocked_reason().is_none());

    // Overlay under the refined transform, shared scale from the pair.
    let scene = ctrl.compose_overlay().unwrap();
    let source_scale = ctrl.source().unwrap().canonical_scale();
    let target_scale = ctrl.target().unwrap().canonical_scale();
    assert_relative_eq!(scene.shared_scale, source_scale.min(target_scale));

    // Commit; the solver's apply endpoint is hit exactly once.
    ctrl.finish().await.unwrap();
    assert_eq!(mock.apply_calls(), 1);
    assert_eq!(ctrl.lifecycle(SolverAction::Apply), RequestLifecycle::Succeeded);
}

#[tokio::test(flavor = "current_thread")]
async fn test_compute_requires_three_matched_pairs() {
    let mock = MockSolver::spawn().await;
    let mut ctrl = controller_for(&mock);
    load_pair(&mut ctrl);

    ctrl.add_point(Side::Source, Point3::new(0.0, 0.0, 0.0)).unwrap();
    ctrl.add_point(Side::Target, Point3::new(5.0, 0.0, 0.0)).unwrap();

    let err = ctrl.compute_coarse().await.unwrap_err();
    assert_eq!(err.class(), "validation");
    // Nothing went over the wire.
    assert_eq!(mock.state.lock().unwrap().coarse_calls, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn test_failed_refine_preserves_prior_result_and_reenables() {
    let mock = MockSolver::spawn().await;
    let mut ctrl = controller_for(&mock);
    load_pair(&mut ctrl);
    add_three_pairs(&mut ctrl);

    ctrl.compute_coarse().await.unwrap();
    ctrl.refine().await.unwrap();
    assert!(ctrl.gate().passed());
    let committed_translation = ctrl.latest_result().unwrap().transform.translation;

    mock.state.lock().unwrap().refine_behavior = RefineBehavior::ServerError;
    let err = ctrl.refine().await.unwrap_err();
    assert_eq!(err.class(), "network");

    // Prior result and gate verdict intact, action re-enabled.
    assert_eq!(
        ctrl.latest_result().unwrap().transform.translation,
        committed_translation
    );
    assert!(ctrl.gate().passed());
    assert_eq!(ctrl.lifecycle(SolverAction::Refine), RequestLifecycle::Failed);
    assert!(!ctrl.request_in_flight());

    // And a retry succeeds once the solver recovers.
    mock.state.lock().unwrap().refine_behavior = RefineBehavior::Success;
    ctrl.refine().await.unwrap();
    assert_eq!(
        ctrl.lifecycle(SolverAction::Refine),
        RequestLifecycle::Succeeded
    );
}

#[tokio::test(flavor = "current_thread")]
async fn test_low_confidence_result_blocks_finish_with_guidance() {
    let mock = MockSolver::spawn_with(MockState {
        refine_behavior: RefineBehavior::LowConfidence,
        ..MockState::default()
    })
    .await;
    let mut ctrl = controller_for(&mock);
    load_pair(&mut ctrl);
    add_three_pairs(&mut ctrl);

    ctrl.compute_coarse().await.unwrap();
    let result = ctrl.refine().await.unwrap();

    // A valid result, never dropped, but the gate holds Finish shut.
    assert!(result.low_confidence);
    assert!(!ctrl.gate().passed());
    let reason = ctrl.gate().finish_blocked_reason().unwrap();
    assert!(reason.contains("low confidence"));
    let err = ctrl.finish().await.unwrap_err();
    assert_eq!(err.class(), "validation");
    assert_eq!(mock.apply_calls(), 0);

    // Guidance stays actionable for the operator.
    let hint = ctrl.gate().guidance(&result);
    assert!(!hint.message().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn test_gate_failure_guidance_follows_priority() {
    let mock = MockSolver::spawn_with(MockState {
        refine_behavior: RefineBehavior::GateFailed,
        ..MockState::default()
    })
    .await;
    let mut ctrl = controller_for(&mock);
    load_pair(&mut ctrl);
    add_three_pairs(&mut ctrl);

    ctrl.compute_coarse().await.unwrap();
    let result = ctrl.refine().await.unwrap();
    assert!(!ctrl.gate().passed());
    // overlap 0.1 < 0.18 outranks the bad rmse and center distance
    assert_eq!(ctrl.gate().guidance(&result), Guidance::WidenPairSpread);
}

#[tokio::test(flavor = "current_thread")]
async fn test_selection_change_after_pass_disables_finish() {
    let mock = MockSolver::spawn().await;
    let mut ctrl = controller_for(&mock);
    load_pair(&mut ctrl);
    add_three_pairs(&mut ctrl);

    ctrl.compute_coarse().await.unwrap();
    ctrl.refine().await.unwrap();
    assert!(ctrl.gate().passed());

    // No recompute needed: changing the target closes the gate at once.
    ctrl.select_target(grid_model(ModelRole::Target, "patient-2/face.stl", 7.0))
        .unwrap();
    assert!(!ctrl.gate().passed());
    let err = ctrl.finish().await.unwrap_err();
    assert_eq!(err.class(), "validation");
    assert_eq!(mock.apply_calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn test_refine_after_clear_uses_preserved_transform() {
    let mock = MockSolver::spawn().await;
    let mut ctrl = controller_for(&mock);
    load_pair(&mut ctrl);
    add_three_pairs(&mut ctrl);

    ctrl.compute_coarse().await.unwrap();
    ctrl.clear_picks();
    assert!(ctrl.store().is_empty());

    // The coarse transform survived the clear and still seeds refine.
    ctrl.refine().await.unwrap();
    assert!(ctrl.gate().passed());
}

#[tokio::test(flavor = "current_thread")]
async fn test_solver_metrics_best_effort() {
    let mock = MockSolver::spawn_with(MockState {
        metrics_available: false,
        ..MockState::default()
    })
    .await;
    let mut ctrl = controller_for(&mock);

    assert!(ctrl.refresh_solver_metrics().await.is_none());

    mock.state.lock().unwrap().metrics_available = true;
    let metrics = ctrl.refresh_solver_metrics().await.unwrap();
    assert_relative_eq!(metrics.average_rmse, 1.4);

    // A later outage keeps the previous snapshot on display.
    mock.state.lock().unwrap().metrics_available = false;
    let metrics = ctrl.refresh_solver_metrics().await.unwrap();
    assert_relative_eq!(metrics.average_rmse, 1.4);
}
