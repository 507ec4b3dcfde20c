//! Per-level descriptors and screen-size based switch distances.
//!
//! A level is shown while the entity covers at least `screen_percentage` of
//! a reference screen 100 units wide. For a perspective observer with
//! vertical field of view `fov`, an object of characteristic size `h`
//! covers exactly that fraction at
//!
//! ```text
//! d = 50 / tan(fov / 2)
//! switch_distance = h * d / (50 * screen_percentage)
//! ```

use crate::error::LevelSetError;
use crate::frustum::Aabb;
use crate::ids::ProxyHandle;
use crate::scene::SceneAccess;

/// Half-width of the reference screen the percentages are expressed against.
pub const REFERENCE_HALF_SCREEN: f32 = 50.0;

/// Largest allowed ratio between the biggest and smallest level sizes.
pub const MAX_SIZE_RATIO: f32 = 1.5;

/// Static data for one level of detail.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelDescriptor {
    /// Renderable shown while this level is active.
    pub proxy: ProxyHandle,
    /// Whether this level may be merged into a combiner. Non-participating
    /// levels are always shown and hidden directly.
    pub participates_in_combining: bool,
    /// Show this level by binding its mesh onto level 0's proxy instead of
    /// toggling visibility. Ignored on level 0 itself.
    pub share_proxy_with_level_zero: bool,
    /// Fraction of the reference screen below which the next level takes over.
    pub screen_percentage: f32,
    switch_distance_squared: f32,
}

impl LevelDescriptor {
    /// A combining-capable level with the given threshold.
    pub fn new(proxy: ProxyHandle, screen_percentage: f32) -> Self {
        Self {
            proxy,
            participates_in_combining: true,
            share_proxy_with_level_zero: false,
            screen_percentage,
            switch_distance_squared: 0.0,
        }
    }

    /// Set whether this level participates in combining.
    #[must_use]
    pub fn with_combining(mut self, participates: bool) -> Self {
        self.participates_in_combining = participates;
        self
    }

    /// Render this level through level 0's proxy.
    #[must_use]
    pub fn sharing_level_zero(mut self) -> Self {
        self.share_proxy_with_level_zero = true;
        self
    }

    /// Squared distance beyond which this level is no longer selected.
    /// Zero until switch distances have been computed.
    pub fn switch_distance_squared(&self) -> f32 {
        self.switch_distance_squared
    }
}

/// Whether level `index` of `levels` renders through level 0's proxy.
pub(crate) fn shares_level_zero(levels: &[LevelDescriptor], index: usize) -> bool {
    index != 0 && levels.get(index).is_some_and(|l| l.share_proxy_with_level_zero)
}

/// Distance at which the reference screen exactly fits the field of view.
pub fn reference_distance(fov_y: f32) -> f32 {
    REFERENCE_HALF_SCREEN / (fov_y * 0.5).tan()
}

/// Distance at which an object of size `size` covers `screen_percentage`
/// of the reference screen.
pub fn switch_distance(size: f32, screen_percentage: f32, fov_y: f32) -> f32 {
    size * reference_distance(fov_y) / (REFERENCE_HALF_SCREEN * screen_percentage)
}

/// Geometry measured from the scene for one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelGeometry {
    /// Characteristic size of each level.
    pub sizes: Vec<f32>,
    /// Union of all level bounds.
    pub bounds: Aabb,
}

/// Check that screen percentages are positive and strictly decreasing.
pub fn validate_screen_percentages(levels: &[LevelDescriptor]) -> Result<(), LevelSetError> {
    if levels.is_empty() {
        return Err(LevelSetError::NoLevels);
    }
    for (index, level) in levels.iter().enumerate() {
        let value = level.screen_percentage;
        if !(value > 0.0) {
            return Err(LevelSetError::NonPositiveScreenPercentage { index, value });
        }
        if index > 0 {
            let previous = levels[index - 1].screen_percentage;
            if value >= previous {
                return Err(LevelSetError::NonDecreasingScreenPercentage {
                    index,
                    value,
                    previous,
                });
            }
        }
    }
    Ok(())
}

/// Read level bounds from the scene and validate them.
pub fn measure_levels(
    levels: &[LevelDescriptor],
    scene: &dyn SceneAccess,
) -> Result<LevelGeometry, LevelSetError> {
    if levels.is_empty() {
        return Err(LevelSetError::NoLevels);
    }

    let level_zero_kind = scene.kind(levels[0].proxy);
    let mut sizes = Vec::with_capacity(levels.len());
    let mut union: Option<Aabb> = None;

    for (index, level) in levels.iter().enumerate() {
        let Some(bounds) = scene.bounds(level.proxy) else {
            return Err(LevelSetError::ZeroSize { index });
        };
        let size = bounds.characteristic_size();
        if !(size > 0.0) {
            return Err(LevelSetError::ZeroSize { index });
        }
        if shares_level_zero(levels, index) && scene.kind(level.proxy) != level_zero_kind {
            return Err(LevelSetError::SharedProxyKindMismatch { index });
        }
        sizes.push(size);
        union = Some(union.map_or(bounds, |u| u.union(&bounds)));
    }

    let min = sizes.iter().copied().fold(f32::INFINITY, f32::min);
    let max = sizes.iter().copied().fold(0.0, f32::max);
    let ratio = max / min;
    if ratio > MAX_SIZE_RATIO {
        return Err(LevelSetError::DivergentSizes { ratio, min, max });
    }

    match union {
        Some(bounds) => Ok(LevelGeometry { sizes, bounds }),
        None => Err(LevelSetError::NoLevels),
    }
}

/// Recompute every level's switch distance for the given field of view.
///
/// Callers validate first; `sizes` must have one entry per level.
pub fn compute_switch_distances(levels: &mut [LevelDescriptor], sizes: &[f32], fov_y: f32) {
    for (level, &size) in levels.iter_mut().zip(sizes) {
        let distance = switch_distance(size, level.screen_percentage, fov_y);
        level.switch_distance_squared = distance * distance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MemoryScene, ProxyKind};
    use glam::Vec3;

    fn scene_with_sizes(sizes: &[f32], percentages: &[f32]) -> (MemoryScene, Vec<LevelDescriptor>) {
        let mut scene = MemoryScene::new();
        let mut levels = Vec::new();
        for (&size, &pct) in sizes.iter().zip(percentages) {
            let mesh = scene.add_mesh(100);
            let proxy = scene.spawn_proxy(
                ProxyKind::Static,
                Aabb::from_center_size(Vec3::ZERO, Vec3::splat(size)),
                mesh,
            );
            levels.push(LevelDescriptor::new(proxy, pct));
        }
        (scene, levels)
    }

    /// At 60 degrees the reference distance is 50 / tan(30 degrees).
    #[test]
    fn test_reference_distance_at_sixty_degrees() {
        let d = reference_distance(60f32.to_radians());
        assert!((d - 86.602_54).abs() < 1e-3, "got {d}");
    }

    #[test]
    fn test_switch_distance_formula() {
        let fov = 60f32.to_radians();
        let d0 = switch_distance(1.0, 0.5, fov);
        let d1 = switch_distance(1.0, 0.2, fov);
        assert!((d0 - 3.464_101_6).abs() < 1e-4, "got {d0}");
        assert!((d1 - 8.660_254).abs() < 1e-4, "got {d1}");
    }

    /// Valid levels produce strictly increasing switch distances.
    #[test]
    fn test_switch_distances_strictly_increase() {
        let (scene, mut levels) = scene_with_sizes(&[1.0, 1.2, 0.9, 1.1], &[0.6, 0.3, 0.1, 0.02]);
        validate_screen_percentages(&levels).unwrap();
        let geometry = measure_levels(&levels, &scene).unwrap();
        compute_switch_distances(&mut levels, &geometry.sizes, 60f32.to_radians());
        for pair in levels.windows(2) {
            assert!(pair[0].switch_distance_squared() < pair[1].switch_distance_squared());
        }
    }

    #[test]
    fn test_empty_levels_rejected() {
        assert_eq!(validate_screen_percentages(&[]), Err(LevelSetError::NoLevels));
        let scene = MemoryScene::new();
        assert_eq!(measure_levels(&[], &scene), Err(LevelSetError::NoLevels));
    }

    #[test]
    fn test_non_decreasing_percentages_rejected() {
        let (_, levels) = scene_with_sizes(&[1.0, 1.0, 1.0], &[0.5, 0.5, 0.1]);
        assert!(matches!(
            validate_screen_percentages(&levels),
            Err(LevelSetError::NonDecreasingScreenPercentage { index: 1, .. })
        ));
    }

    #[test]
    fn test_non_positive_percentage_rejected() {
        let (_, levels) = scene_with_sizes(&[1.0, 1.0], &[0.5, 0.0]);
        assert!(matches!(
            validate_screen_percentages(&levels),
            Err(LevelSetError::NonPositiveScreenPercentage { index: 1, .. })
        ));
    }

    #[test]
    fn test_zero_size_rejected() {
        let (scene, levels) = scene_with_sizes(&[1.0, 0.0], &[0.5, 0.2]);
        assert_eq!(
            measure_levels(&levels, &scene),
            Err(LevelSetError::ZeroSize { index: 1 })
        );
    }

    #[test]
    fn test_divergent_sizes_rejected() {
        let (scene, levels) = scene_with_sizes(&[1.0, 1.6], &[0.5, 0.2]);
        assert!(matches!(
            measure_levels(&levels, &scene),
            Err(LevelSetError::DivergentSizes { .. })
        ));

        let (scene, levels) = scene_with_sizes(&[1.0, 1.5], &[0.5, 0.2]);
        assert!(measure_levels(&levels, &scene).is_ok());
    }

    #[test]
    fn test_shared_level_kind_mismatch_rejected() {
        let mut scene = MemoryScene::new();
        let mesh = scene.add_mesh(10);
        let bounds = Aabb::from_center_size(Vec3::ZERO, Vec3::ONE);
        let rig = scene.spawn_proxy(ProxyKind::Skinned, bounds, mesh);
        let prop = scene.spawn_proxy(ProxyKind::Static, bounds, mesh);
        let levels = vec![
            LevelDescriptor::new(rig, 0.5),
            LevelDescriptor::new(prop, 0.2).sharing_level_zero(),
        ];
        assert_eq!(
            measure_levels(&levels, &scene),
            Err(LevelSetError::SharedProxyKindMismatch { index: 1 })
        );
    }

    #[test]
    fn test_geometry_bounds_cover_all_levels() {
        let (scene, levels) = scene_with_sizes(&[1.0, 1.4], &[0.5, 0.2]);
        let geometry = measure_levels(&levels, &scene).unwrap();
        assert_eq!(geometry.bounds.size(), Vec3::splat(1.4));
        assert_eq!(geometry.sizes.len(), 2);
    }
}
