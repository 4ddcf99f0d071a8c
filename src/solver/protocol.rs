//! Wire types for the solver contract and their validated domain forms.
//!
//! Every response crosses a validation boundary here: payloads with missing
//! fields fail deserialization, and rotations must be orthonormal with
//! determinant +1 before they become a [`Transform`]. Nothing downstream
//! ever sees an unchecked matrix.

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;
use crate::model::FileKind;

/// Tolerance for ‖RᵀR − I‖ and |det R − 1| at the response boundary.
const ROTATION_TOLERANCE: f64 = 1e-3;

/// Where a transform came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformProvenance {
    ManualCoarse,
    ManualRefine,
    SemiAuto,
    Auto,
    RefineIcp,
}

/// A rigid transform in the solver's original (unscaled) coordinates.
/// Replaced wholesale on every compute, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub provenance: TransformProvenance,
}

impl Transform {
    pub fn identity(provenance: TransformProvenance) -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
            provenance,
        }
    }

    /// `R·p + t`.
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }
}

/// One entry from `list models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub id: String,
    pub display_name: String,
    pub original_file_path: String,
    pub file_type: FileKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoarseFitRequest {
    pub source_points: Vec<[f64; 3]>,
    pub target_points: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoarseFitResponse {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
    pub rmse: f64,
    pub inlier_count: usize,
    pub total_points: usize,
}

/// Validated closed-form fit.
#[derive(Debug, Clone)]
pub struct CoarseFitResult {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub rmse: f64,
    pub inlier_count: usize,
    pub total_points: usize,
}

impl CoarseFitResult {
    pub fn into_transform(self, provenance: TransformProvenance) -> Transform {
        Transform {
            rotation: self.rotation,
            translation: self.translation,
            provenance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    pub source_path: String,
    pub target_path: String,
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
    pub profile: String,
    pub device_profile: String,
    pub flow_tag: String,
}

/// Solver-side pass/fail verdict attached to a refine result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateVerdict {
    pub passed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineResponse {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
    pub rmse: f64,
    pub fitness: f64,
    pub overlap: f64,
    pub center_distance: f64,
    pub low_confidence: bool,
    pub quality_gate: GateVerdict,
}

/// Validated refine outcome; the only producer of full alignment metrics.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    pub transform: Transform,
    pub rmse: f64,
    pub fitness: f64,
    pub overlap: f64,
    pub center_distance: f64,
    pub low_confidence: bool,
    pub quality_gate: GateVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub source_path: String,
    pub target_path: String,
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
    pub flow_tag: String,
}

/// Optional region-of-interest focus for the suggester.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiHint {
    pub center: [f64; 3],
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    pub source_path: String,
    pub target_path: String,
    pub num_pairs: usize,
    pub profile: String,
    pub suggestion_mode: String,
    pub device_profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi_hint: Option<RoiHint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedPair {
    pub source_point: [f64; 3],
    pub target_point: [f64; 3],
    pub confidence: f64,
    #[serde(default)]
    pub reason_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestDiagnostics {
    pub roi_mode: String,
    pub attempt_count: u32,
    #[serde(default)]
    pub top_candidates: Vec<SuggestedPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestThresholds {
    pub rmse_max: f64,
    pub overlap_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformPayload {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    pub pairs: Vec<SuggestedPair>,
    #[serde(default)]
    pub coarse_init: Option<TransformPayload>,
    pub diagnostics: SuggestDiagnostics,
    pub thresholds: SuggestThresholds,
    pub profile: String,
    pub device_profile: String,
}

/// Read-only aggregate telemetry; best-effort, display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverMetrics {
    pub pass_rate: f64,
    pub average_rmse: f64,
}

pub fn point_to_wire(p: &Point3<f64>) -> [f64; 3] {
    [p.x, p.y, p.z]
}

pub fn point_from_wire(p: &[f64; 3]) -> Point3<f64> {
    Point3::new(p[0], p[1], p[2])
}

pub fn rotation_to_wire(r: &Rotation3<f64>) -> [[f64; 3]; 3] {
    let m = r.matrix();
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

/// Accept a wire rotation only if it is orthonormal with det +1.
pub fn rotation_from_wire(rows: &[[f64; 3]; 3]) -> Result<Rotation3<f64>, RegistrationError> {
    let m = Matrix3::new(
        rows[0][0], rows[0][1], rows[0][2],
        rows[1][0], rows[1][1], rows[1][2],
        rows[2][0], rows[2][1], rows[2][2],
    );
    if !m.iter().all(|v| v.is_finite()) {
        return Err(RegistrationError::MalformedResponse(
            "rotation contains non-finite entries".into(),
        ));
    }
    let orthogonality = (m.transpose() * m - Matrix3::identity()).norm();
    if orthogonality > ROTATION_TOLERANCE {
        return Err(RegistrationError::MalformedResponse(format!(
            "rotation is not orthonormal (deviation {orthogonality:.2e})"
        )));
    }
    let det = m.determinant();
    if (det - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(RegistrationError::MalformedResponse(format!(
            "rotation determinant {det:.6} is not +1 (reflection or scaling)"
        )));
    }
    Ok(Rotation3::from_matrix_unchecked(m))
}

impl CoarseFitResponse {
    pub fn validate(self) -> Result<CoarseFitResult, RegistrationError> {
        let rotation = rotation_from_wire(&self.rotation)?;
        if !self.rmse.is_finite() || self.rmse < 0.0 {
            return Err(RegistrationError::MalformedResponse(format!(
                "rmse {} out of range",
                self.rmse
            )));
        }
        Ok(CoarseFitResult {
            rotation,
            translation: Vector3::from(self.translation),
            rmse: self.rmse,
            inlier_count: self.inlier_count,
            total_points: self.total_points,
        })
    }
}

impl RefineResponse {
    pub fn validate(self) -> Result<AlignmentResult, RegistrationError> {
        let rotation = rotation_from_wire(&self.rotation)?;
        for (name, value) in [
            ("rmse", self.rmse),
            ("fitness", self.fitness),
            ("overlap", self.overlap),
            ("centerDistance", self.center_distance),
        ] {
            if !value.is_finite() {
                return Err(RegistrationError::MalformedResponse(format!(
                    "{name} is not finite"
                )));
            }
        }
        Ok(AlignmentResult {
            transform: Transform {
                rotation,
                translation: Vector3::from(self.translation),
                provenance: TransformProvenance::RefineIcp,
            },
            rmse: self.rmse,
            fitness: self.fitness,
            overlap: self.overlap,
            center_distance: self.center_distance,
            low_confidence: self.low_confidence,
            quality_gate: self.quality_gate,
        })
    }
}
