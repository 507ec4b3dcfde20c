//! Observers (cameras) that drive level selection and bake prioritization.
//!
//! The host passes the active observers to the scheduler every frame. An
//! [`ObserverView`] caches the per-frame data the evaluation loop needs:
//! perspective positions, orthographic frustum heights and frustums.

use glam::{Mat4, Quat, Vec3};

use crate::frustum::{Aabb, Frustum};

/// Projection type for an observer.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width / height.
        aspect_ratio: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Half-width of the view volume in world units.
        half_width: f32,
        /// Half-height of the view volume in world units.
        half_height: f32,
    },
}

/// A camera as seen by the scheduler.
#[derive(Debug, Clone)]
pub struct Observer {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion; identity looks down -Z.
    pub rotation: Quat,
    /// Projection parameters.
    pub projection: Projection,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
    /// Disabled observers are ignored entirely.
    pub enabled: bool,
}

impl Observer {
    /// A perspective observer at `position` looking down -Z.
    pub fn perspective(position: Vec3, fov_y: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y,
                aspect_ratio: 16.0 / 9.0,
            },
            near: 0.1,
            far: 10_000.0,
            enabled: true,
        }
    }

    /// An orthographic observer at `position` looking down -Z, square view volume.
    pub fn orthographic(position: Vec3, half_height: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            projection: Projection::Orthographic {
                half_width: half_height,
                half_height,
            },
            near: 0.1,
            far: 10_000.0,
            enabled: true,
        }
    }

    /// Rotate the observer so it faces `target`.
    #[must_use]
    pub fn looking_at(mut self, target: Vec3) -> Self {
        let forward = (target - self.position).normalize_or_zero();
        if forward != Vec3::ZERO {
            let up = if forward.abs_diff_eq(Vec3::Y, 1e-4) || forward.abs_diff_eq(Vec3::NEG_Y, 1e-4)
            {
                Vec3::Z
            } else {
                Vec3::Y
            };
            let view = Mat4::look_to_rh(self.position, forward, up);
            self.rotation = Quat::from_mat4(&view.inverse());
        }
        self
    }

    /// Whether this observer uses a perspective projection.
    pub fn is_perspective(&self) -> bool {
        matches!(self.projection, Projection::Perspective { .. })
    }

    /// Vertical field of view, for perspective observers.
    pub fn fov_y(&self) -> Option<f32> {
        match self.projection {
            Projection::Perspective { fov_y, .. } => Some(fov_y),
            Projection::Orthographic { .. } => None,
        }
    }

    /// Full height of the orthographic view volume, for orthographic observers.
    pub fn frustum_height(&self) -> Option<f32> {
        match self.projection {
            Projection::Orthographic { half_height, .. } => Some(half_height * 2.0),
            Projection::Perspective { .. } => None,
        }
    }

    /// Compute the view matrix (inverse of the observer transform).
    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * Mat4::from_quat(self.rotation)).inverse()
    }

    /// Compute the projection matrix with reverse-Z.
    pub fn projection_matrix(&self) -> Mat4 {
        match &self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => Mat4::perspective_rh(*fov_y, *aspect_ratio, self.far, self.near),
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -*half_width,
                *half_width,
                -*half_height,
                *half_height,
                self.far,
                self.near,
            ),
        }
    }

    /// Compute the combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The observer's view frustum.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }
}

/// Per-frame snapshot of the enabled observers.
#[derive(Debug, Clone, Default)]
pub struct ObserverView {
    perspective_positions: Vec<Vec3>,
    orthographic_heights: Vec<f32>,
    frusta: Vec<(Vec3, Frustum)>,
    fov_y: Option<f32>,
}

impl ObserverView {
    /// Snapshot the enabled observers in `observers`.
    pub fn new(observers: &[Observer]) -> Self {
        let mut view = Self::default();
        for observer in observers.iter().filter(|o| o.enabled) {
            match observer.projection {
                Projection::Perspective { fov_y, .. } => {
                    view.perspective_positions.push(observer.position);
                    view.fov_y.get_or_insert(fov_y);
                }
                Projection::Orthographic { .. } => {
                    if let Some(height) = observer.frustum_height() {
                        view.orthographic_heights.push(height);
                    }
                }
            }
            view.frusta.push((observer.position, observer.frustum()));
        }
        view
    }

    /// Field of view of the first enabled perspective observer.
    pub fn fov_y(&self) -> Option<f32> {
        self.fov_y
    }

    /// Squared distance from `point` to the nearest perspective observer.
    pub fn nearest_perspective_distance_squared(&self, point: Vec3) -> Option<f32> {
        self.perspective_positions
            .iter()
            .map(|p| p.distance_squared(point))
            .reduce(f32::min)
    }

    /// Frustum heights of the enabled orthographic observers.
    pub fn orthographic_heights(&self) -> &[f32] {
        &self.orthographic_heights
    }

    /// Whether any enabled observer's frustum intersects `aabb`.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        self.frusta.iter().any(|(_, f)| f.intersects_aabb(aabb))
    }

    /// Squared distance from `aabb` to the nearest observer of any kind,
    /// or infinity if there are none.
    pub fn nearest_distance_squared(&self, aabb: &Aabb) -> f32 {
        self.frusta
            .iter()
            .map(|(p, _)| aabb.distance_squared_to(*p))
            .fold(f32::INFINITY, f32::min)
    }

    /// Whether no observer is enabled.
    pub fn is_empty(&self) -> bool {
        self.frusta.is_empty()
    }
}
