//! In-process mock of the external alignment solver, serving the same
//! JSON/HTTP contract the production solver speaks.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use nalgebra::Point3;

use model_registration::model::{FileKind, Model, ModelRole};
use model_registration::solver::protocol::{
    CoarseFitRequest, CoarseFitResponse, GateVerdict, ModelEntry, RefineRequest, RefineResponse,
    SolverMetrics, SuggestDiagnostics, SuggestRequest, SuggestResponse, SuggestThresholds,
    SuggestedPair,
};

const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// How the mock answers `icp-refine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineBehavior {
    Success,
    LowConfidence,
    GateFailed,
    MalformedRotation,
    ServerError,
}

#[derive(Debug)]
pub struct MockState {
    pub refine_behavior: RefineBehavior,
    pub refine_translation: [f64; 3],
    pub suggest_pair_count: usize,
    pub suggest_server_error: bool,
    pub metrics_available: bool,
    pub apply_calls: usize,
    pub coarse_calls: usize,
    pub refine_calls: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            refine_behavior: RefineBehavior::Success,
            refine_translation: [5.0, 0.0, 0.0],
            suggest_pair_count: 3,
            suggest_server_error: false,
            metrics_available: true,
            apply_calls: 0,
            coarse_calls: 0,
            refine_calls: 0,
        }
    }
}

pub struct MockSolver {
    pub base_url: String,
    pub state: Arc<Mutex<MockState>>,
}

impl MockSolver {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockState::default()).await
    }

    pub async fn spawn_with(state: MockState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = Router::new()
            .route("/models", get(list_models))
            .route("/coarse-fit", post(coarse_fit))
            .route("/icp-refine", post(icp_refine))
            .route("/apply", post(apply))
            .route("/suggest-points", post(suggest_points))
            .route("/metrics", get(metrics))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn apply_calls(&self) -> usize {
        self.state.lock().unwrap().apply_calls
    }
}

async fn list_models() -> Json<Vec<ModelEntry>> {
    Json(vec![
        ModelEntry {
            id: "jaw".into(),
            display_name: "Upper jaw scan".into(),
            original_file_path: "patient-1/jaw.ply".into(),
            file_type: FileKind::MeshPly,
        },
        ModelEntry {
            id: "face".into(),
            display_name: "Face scan".into(),
            original_file_path: "patient-1/face.stl".into(),
            file_type: FileKind::MeshStl,
        },
        ModelEntry {
            id: "cbct".into(),
            display_name: "Pre-op CBCT".into(),
            original_file_path: "patient-1/cbct".into(),
            file_type: FileKind::DicomSeries,
        },
    ])
}

/// Centroid-difference fit: exact for translation-only point sets, which
/// is all the contract tests need.
async fn coarse_fit(
    State(state): State<Arc<Mutex<MockState>>>,
    Json(request): Json<CoarseFitRequest>,
) -> Result<Json<CoarseFitResponse>, StatusCode> {
    state.lock().unwrap().coarse_calls += 1;

    let n = request.source_points.len();
    if n < 3 || n != request.target_points.len() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let centroid = |points: &[[f64; 3]]| -> [f64; 3] {
        let mut c = [0.0; 3];
        for p in points {
            for axis in 0..3 {
                c[axis] += p[axis];
            }
        }
        c.map(|v| v / points.len() as f64)
    };

    let sc = centroid(&request.source_points);
    let tc = centroid(&request.target_points);
    let translation = [tc[0] - sc[0], tc[1] - sc[1], tc[2] - sc[2]];

    let mut sq_sum = 0.0;
    for (s, t) in request.source_points.iter().zip(&request.target_points) {
        let mut sq = 0.0;
        for axis in 0..3 {
            let d = s[axis] + translation[axis] - t[axis];
            sq += d * d;
        }
        sq_sum += sq;
    }
    let rmse = (sq_sum / n as f64).sqrt();

    Ok(Json(CoarseFitResponse {
        rotation: IDENTITY,
        translation,
        rmse,
        inlier_count: n,
        total_points: n,
    }))
}

async fn icp_refine(
    State(state): State<Arc<Mutex<MockState>>>,
    Json(_request): Json<RefineRequest>,
) -> Result<Json<RefineResponse>, StatusCode> {
    let (behavior, translation) = {
        let mut guard = state.lock().unwrap();
        guard.refine_calls += 1;
        (guard.refine_behavior, guard.refine_translation)
    };

    let response = match behavior {
        RefineBehavior::ServerError => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        RefineBehavior::MalformedRotation => RefineResponse {
            rotation: [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]],
            translation,
            rmse: 0.4,
            fitness: 0.9,
            overlap: 0.5,
            center_distance: 3.0,
            low_confidence: false,
            quality_gate: GateVerdict {
                passed: true,
                reason: "within thresholds".into(),
            },
        },
        RefineBehavior::LowConfidence => RefineResponse {
            rotation: IDENTITY,
            translation,
            rmse: 0.8,
            fitness: 0.6,
            overlap: 0.3,
            center_distance: 6.0,
            low_confidence: true,
            quality_gate: GateVerdict {
                passed: true,
                reason: "metrics pass but confidence is low".into(),
            },
        },
        RefineBehavior::GateFailed => RefineResponse {
            rotation: IDENTITY,
            translation,
            rmse: 7.5,
            fitness: 0.4,
            overlap: 0.1,
            center_distance: 55.0,
            low_confidence: false,
            quality_gate: GateVerdict {
                passed: false,
                reason: "rmse above threshold".into(),
            },
        },
        RefineBehavior::Success => RefineResponse {
            rotation: IDENTITY,
            translation,
            rmse: 0.3,
            fitness: 0.96,
            overlap: 0.62,
            center_distance: 2.1,
            low_confidence: false,
            quality_gate: GateVerdict {
                passed: true,
                reason: "within thresholds".into(),
            },
        },
    };
    Ok(Json(response))
}

async fn apply(
    State(state): State<Arc<Mutex<MockState>>>,
    Json(_request): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    state.lock().unwrap().apply_calls += 1;
    Json(serde_json::json!({"status": "ok"}))
}

async fn suggest_points(
    State(state): State<Arc<Mutex<MockState>>>,
    Json(request): Json<SuggestRequest>,
) -> Result<Json<SuggestResponse>, StatusCode> {
    let (count, error) = {
        let guard = state.lock().unwrap();
        (guard.suggest_pair_count, guard.suggest_server_error)
    };
    if error {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    // Candidates sit near the grid vertices the test fixtures use.
    let pairs: Vec<SuggestedPair> = (0..count)
        .map(|i| SuggestedPair {
            source_point: [i as f64 * 10.0 + 0.2, 0.1, 0.0],
            target_point: [i as f64 * 10.0 + 5.1, 0.0, 0.2],
            confidence: 0.9 - i as f64 * 0.1,
            reason_tags: vec!["curvature-peak".into()],
        })
        .collect();

    Ok(Json(SuggestResponse {
        pairs,
        coarse_init: None,
        diagnostics: SuggestDiagnostics {
            roi_mode: "full-surface".into(),
            attempt_count: 1,
            top_candidates: Vec::new(),
        },
        thresholds: SuggestThresholds {
            rmse_max: 3.0,
            overlap_min: 0.18,
        },
        profile: request.profile,
        device_profile: request.device_profile,
    }))
}

async fn metrics(State(state): State<Arc<Mutex<MockState>>>) -> axum::response::Response {
    if state.lock().unwrap().metrics_available {
        Json(SolverMetrics {
            pass_rate: 0.82,
            average_rmse: 1.4,
        })
        .into_response()
    } else {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Grid mesh with vertices at multiples of 10 on the x axis, matching the
/// candidate points the mock suggester emits.
pub fn grid_model(role: ModelRole, path: &str, offset: f64) -> Model {
    let vertices: Vec<Point3<f64>> = (0..5)
        .flat_map(|i| {
            [
                Point3::new(offset + i as f64 * 10.0, 0.0, 0.0),
                Point3::new(offset + i as f64 * 10.0, 10.0, 0.0),
                Point3::new(offset + i as f64 * 10.0, 0.0, 10.0),
            ]
        })
        .collect();
    Model::load(role, path, path, FileKind::MeshPly, vertices, 3.0).unwrap()
}
