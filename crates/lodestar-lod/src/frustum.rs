//! World-space bounds and observer visibility.
//!
//! Entity and combiner bounds are boxes; an observer's view volume is six
//! planes pulled out of its reverse-Z view-projection matrix. Visibility only
//! feeds bake ordering, so the box test is allowed to be conservative.

use glam::{Mat4, Vec3, Vec4};

/// An axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box of full size `size` centered on `center`.
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size * 0.5;
        Self::new(center - half, center + half)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half of [`Aabb::size`].
    pub fn extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Mean edge length, used as an object's height when deriving switch
    /// distances.
    pub fn characteristic_size(&self) -> f32 {
        self.size().element_sum() / 3.0
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Squared distance from `point` to the nearest point of the box.
    /// Zero when `point` is inside.
    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        point.clamp(self.min, self.max).distance_squared(point)
    }
}

/// A plane `normal · p + offset = 0` whose normal points into the volume.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Plane {
    normal: Vec3,
    offset: f32,
}

impl Plane {
    fn from_row(row: Vec4) -> Self {
        let normal = row.truncate();
        let length = normal.length();
        if length > 0.0 {
            Self {
                normal: normal / length,
                offset: row.w / length,
            }
        } else {
            Self {
                normal,
                offset: row.w,
            }
        }
    }

    /// Whether any part of `aabb` lies on the inner side.
    ///
    /// Center/extent form: the box reaches the inner side iff its center is
    /// closer than its projected radius onto the normal.
    fn reaches(&self, aabb: &Aabb) -> bool {
        let radius = aabb.extents().dot(self.normal.abs());
        self.normal.dot(aabb.center()) + self.offset >= -radius
    }
}

/// The six bounding planes of an observer's view volume.
#[derive(Clone, Debug)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Gribb-Hartmann extraction from a reverse-Z view-projection matrix, the
    /// kind [`Observer`](crate::observer::Observer) builds for both projections.
    ///
    /// Clip space keeps `0 <= z <= w`, with `z = w` at the near plane.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let [x, y, z, w] = [0, 1, 2, 3].map(|i| view_projection.row(i));
        let planes = [w + x, w - x, w + y, w - y, w - z, z].map(Plane::from_row);
        Self { planes }
    }

    /// Whether `aabb` may overlap the view volume. Boxes near the volume's
    /// corners can be reported as visible when they are not.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| plane.reaches(aabb))
    }
}
