//! Model bookkeeping: loaded geometry, display canonicalization, picking.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistrationError;

pub mod adapter;

pub use adapter::{ModelPresentationAdapter, PickOutcome, Ray};

/// Which end of the registration a model plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Source,
    Target,
}

/// File kinds the solver can list. Selection by capability lookup, not
/// string comparison on extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    MeshPly,
    MeshStl,
    DicomSeries,
}

impl FileKind {
    /// Only surface meshes can take landmark picks; a DICOM series is
    /// listable but cannot participate as a registration side.
    pub fn supports_surface_picking(&self) -> bool {
        matches!(self, FileKind::MeshPly | FileKind::MeshStl)
    }
}

/// A loaded model: stored geometry plus the centering/scaling facts fixed
/// at load time. The vertex buffer is in original (solver-side) coordinates
/// and is never rewritten; display mapping lives in the adapter.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: Uuid,
    pub role: ModelRole,
    pub display_name: String,
    /// Path the solver resolves this model by.
    pub file_path: String,
    pub kind: FileKind,
    vertices: Vec<Point3<f64>>,
    center_offset: Vector3<f64>,
    canonical_scale: f64,
}

impl Model {
    /// Build a model from its original vertex buffer. `canonical_size` is
    /// the edge of the fixed viewing volume every model is normalized into;
    /// center and scale are computed here, once, and never change.
    pub fn load(
        role: ModelRole,
        display_name: impl Into<String>,
        file_path: impl Into<String>,
        kind: FileKind,
        vertices: Vec<Point3<f64>>,
        canonical_size: f64,
    ) -> Result<Self, RegistrationError> {
        let display_name = display_name.into();
        if !kind.supports_surface_picking() {
            return Err(RegistrationError::Validation(format!(
                "{display_name}: {kind:?} cannot be registered; pick a surface mesh"
            )));
        }
        if vertices.is_empty() {
            return Err(RegistrationError::GeometryMissing(display_name));
        }

        let (min, max) = bounding_box(&vertices);
        let center = nalgebra::center(&min, &max);
        let extent = max - min;
        let max_extent = extent.x.max(extent.y).max(extent.z);
        let canonical_scale = if max_extent > 0.0 {
            canonical_size / max_extent
        } else {
            canonical_size
        };

        Ok(Self {
            id: Uuid::new_v4(),
            role,
            display_name,
            file_path: file_path.into(),
            kind,
            vertices,
            center_offset: center.coords,
            canonical_scale,
        })
    }

    /// Build a model from a solver listing entry plus its parsed vertex
    /// buffer. The entry's file kind decides eligibility, not its path
    /// extension.
    pub fn from_entry(
        role: ModelRole,
        entry: &crate::solver::ModelEntry,
        vertices: Vec<Point3<f64>>,
        canonical_size: f64,
    ) -> Result<Self, RegistrationError> {
        Self::load(
            role,
            entry.display_name.clone(),
            entry.original_file_path.clone(),
            entry.file_type,
            vertices,
            canonical_size,
        )
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Bounding-box center of the original geometry.
    pub fn center_offset(&self) -> Vector3<f64> {
        self.center_offset
    }

    /// canonical_size / max_extent of the original geometry.
    pub fn canonical_scale(&self) -> f64 {
        self.canonical_scale
    }

    /// Max bounding-box edge in original units.
    pub fn max_extent(&self) -> f64 {
        let (min, max) = bounding_box(&self.vertices);
        let extent = max - min;
        extent.x.max(extent.y).max(extent.z)
    }

    /// Nearest stored vertex to `point`, scanning every vertex when
    /// `exact`, or every `stride`-th vertex for a preview-quality answer.
    pub fn nearest_vertex(&self, point: &Point3<f64>, exact: bool, stride: usize) -> Option<Point3<f64>> {
        let stride = if exact { 1 } else { stride.max(1) };
        self.vertices
            .iter()
            .step_by(stride)
            .min_by(|a, b| {
                let da = nalgebra::distance_squared(*a, point);
                let db = nalgebra::distance_squared(*b, point);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()
    }

    /// True when the vertex buffer is present and non-empty.
    pub fn has_geometry(&self) -> bool {
        !self.vertices.is_empty()
    }
}

fn bounding_box(vertices: &[Point3<f64>]) -> (Point3<f64>, Point3<f64>) {
    let mut min = vertices[0];
    let mut max = vertices[0];
    for v in &vertices[1..] {
        min = Point3::new(min.x.min(v.x), min.y.min(v.y), min.z.min(v.z));
        max = Point3::new(max.x.max(v.x), max.y.max(v.y), max.z.max(v.z));
    }
    (min, max)
}
