//! Reconstruction of one shared-coordinate scene from two independently
//! displayed models.

use nalgebra::{Point3, Rotation3, Vector3};
use tracing::debug;
use uuid::Uuid;

use crate::error::RegistrationError;
use crate::model::Model;
use crate::solver::Transform;

/// Node placement for one model in the combined scene. Geometry stays in
/// original coordinates; the placement carries everything the scene graph
/// needs to position it.
#[derive(Debug, Clone)]
pub struct OverlayPlacement {
    pub model_id: Uuid,
    pub rotation: Rotation3<f64>,
    /// Translation already expressed in shared display units.
    pub translation: Vector3<f64>,
    pub scale: f64,
}

impl OverlayPlacement {
    /// Map an original-coordinate point into the shared display space.
    pub fn place(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((self.rotation * p).coords * self.scale + self.translation)
    }
}

/// The combined scene under one shared display scale.
#[derive(Debug, Clone)]
pub struct OverlayScene {
    pub shared_scale: f64,
    pub source: OverlayPlacement,
    pub target: OverlayPlacement,
}

impl OverlayScene {
    /// Max displayed bounding-box edge across both models, for camera fit.
    pub fn fit_extent(&self, source: &Model, target: &Model) -> f64 {
        let s = source.max_extent() * self.shared_scale;
        let t = target.max_extent() * self.shared_scale;
        s.max(t)
    }
}

/// Rebuilds the combined scene for the current transform.
///
/// Each model is first restored to its original-space placement (display
/// centering and per-model scaling undone), the transform is applied to the
/// source only in original coordinates, and then one shared scale maps both
/// into the viewing volume. The shared scale is the smaller of the two
/// canonical scales so the larger model is never clipped; the translation
/// scales with it, the rotation does not.
#[derive(Debug, Default)]
pub struct OverlayComposer {
    scene: Option<OverlayScene>,
}

impl OverlayComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(&self) -> Option<&OverlayScene> {
        self.scene.as_ref()
    }

    /// Drop any previously composed scene.
    pub fn clear(&mut self) {
        self.scene = None;
    }

    /// Compose the overlay. Prior content is always cleared first; a
    /// failure therefore leaves no stale scene behind.
    pub fn compose(
        &mut self,
        source: &Model,
        target: &Model,
        transform: &Transform,
    ) -> Result<&OverlayScene, RegistrationError> {
        self.scene = None;

        if !source.has_geometry() {
            return Err(RegistrationError::GeometryMissing(source.display_name.clone()));
        }
        if !target.has_geometry() {
            return Err(RegistrationError::GeometryMissing(target.display_name.clone()));
        }

        let shared_scale = source.canonical_scale().min(target.canonical_scale());

        let scene = OverlayScene {
            shared_scale,
            source: OverlayPlacement {
                model_id: source.id,
                rotation: transform.rotation,
                translation: transform.translation * shared_scale,
                scale: shared_scale,
            },
            target: OverlayPlacement {
                model_id: target.id,
                rotation: Rotation3::identity(),
                translation: Vector3::zeros(),
                scale: shared_scale,
            },
        };

        debug!(
            shared_scale,
            source_scale = source.canonical_scale(),
            target_scale = target.canonical_scale(),
            provenance = ?transform.provenance,
            "overlay composed"
        );

        Ok(self.scene.insert(scene))
    }
}
