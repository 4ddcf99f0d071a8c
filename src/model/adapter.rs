//! Per-model mapping between stored coordinates and the centered/scaled
//! display representation, plus ray picking back to original coordinates.

use nalgebra::{Point3, Rotation3, Unit, Vector3};
use uuid::Uuid;

use super::Model;
use crate::error::RegistrationError;

/// A picking ray in display space.
#[derive(Debug, Clone)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction: Unit::new_normalize(direction),
        }
    }
}

/// Result of a pick attempt. A miss is an ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    /// The hit mapped back to the model's original coordinates.
    Hit(Point3<f64>),
    Miss,
}

/// Display mapping for exactly one model.
///
/// `to_display(p) = (p - center) * scale` and `to_original(q) = q / scale + center`,
/// with `center` and `scale` frozen at model load. The adapter refuses to
/// operate on any other model's geometry: original coordinates are only
/// reachable through the adapter of the model they belong to.
#[derive(Debug, Clone)]
pub struct ModelPresentationAdapter {
    model_id: Uuid,
    center: Vector3<f64>,
    scale: f64,
    display_rotation: Rotation3<f64>,
}

impl ModelPresentationAdapter {
    pub fn for_model(model: &Model) -> Self {
        Self {
            model_id: model.id,
            center: model.center_offset(),
            scale: model.canonical_scale(),
            display_rotation: Rotation3::identity(),
        }
    }

    pub fn model_id(&self) -> Uuid {
        self.model_id
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Original → centered/scaled display coordinates (display pose not applied).
    pub fn to_display(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((p.coords - self.center) * self.scale)
    }

    /// Display → original coordinates. Inverse of [`to_display`](Self::to_display).
    pub fn to_original(&self, q: &Point3<f64>) -> Point3<f64> {
        Point3::from(q.coords / self.scale + self.center)
    }

    /// On-screen pose from the user spinning this model. Affects picking
    /// only; the stored geometry never rotates.
    pub fn set_display_rotation(&mut self, rotation: Rotation3<f64>) {
        self.display_rotation = rotation;
    }

    pub fn reset_display_rotation(&mut self) {
        self.display_rotation = Rotation3::identity();
    }

    pub fn display_rotation(&self) -> &Rotation3<f64> {
        &self.display_rotation
    }

    /// Intersect a display-space ray with the model's displayed vertices.
    ///
    /// The display pose rotation is removed from the ray first, then the
    /// nearest vertex within `pick_radius` (display units) of the ray is
    /// mapped back through `to_original`. Vertices behind the ray origin
    /// are ignored.
    pub fn pick(
        &self,
        model: &Model,
        ray: &Ray,
        pick_radius: f64,
    ) -> Result<PickOutcome, RegistrationError> {
        if model.id != self.model_id {
            return Err(RegistrationError::Validation(format!(
                "adapter for model {} cannot pick on model {}",
                self.model_id, model.id
            )));
        }

        let unrotate = self.display_rotation.inverse();
        let origin = unrotate * ray.origin;
        let direction = unrotate * ray.direction.into_inner();

        let mut best: Option<(f64, Point3<f64>)> = None;
        for vertex in model.vertices() {
            let displayed = self.to_display(vertex);
            let offset = displayed - origin;
            let along = offset.dot(&direction);
            if along < 0.0 {
                continue;
            }
            let perpendicular = (offset - direction * along).norm();
            if perpendicular > pick_radius {
                continue;
            }
            match best {
                Some((dist, _)) if dist <= perpendicular => {}
                _ => best = Some((perpendicular, *vertex)),
            }
        }

        Ok(match best {
            Some((_, vertex)) => PickOutcome::Hit(vertex),
            None => PickOutcome::Miss,
        })
    }
}
