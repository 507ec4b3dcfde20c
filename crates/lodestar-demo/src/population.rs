//! Random scene population for the demo.

use glam::Vec3;
use lodestar_config::{CombinerPrototype, DemoConfig};
use lodestar_lod::{
    Aabb, EntityDesc, EntityId, LevelDescriptor, LodScheduler, MemoryScene, MergeKey, ProxyKind,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{info, warn};

/// Screen percentages of the three levels every prop gets.
const PROP_LEVELS: [f32; 3] = [0.4, 0.15, 0.04];

/// Vertex counts matching [`PROP_LEVELS`].
const PROP_VERTICES: [u32; 3] = [2400, 600, 80];

/// Number of distinct prop materials.
pub const MATERIAL_COUNT: u32 = 3;

/// The configured prototypes, plus a labelled one for every prop material
/// none of them covers.
pub fn prototypes_for(configured: &[CombinerPrototype]) -> Vec<CombinerPrototype> {
    let mut prototypes = configured.to_vec();
    for material in 0..MATERIAL_COUNT {
        if !prototypes.iter().any(|p| p.matches_materials(&[material])) {
            prototypes.push(CombinerPrototype {
                label: Some(format!("props-{material}")),
                materials: vec![material],
                ..CombinerPrototype::default()
            });
        }
    }
    prototypes
}

/// Scatter `config.entity_count` entities over a square of side `2 * spread`.
///
/// Every tenth entity is a skinned character whose middle level renders
/// through level 0's proxy; characters are never combined.
pub fn populate(
    scheduler: &mut LodScheduler,
    scene: &mut MemoryScene,
    config: &DemoConfig,
) -> Vec<EntityId> {
    let mut rng = Xoshiro256StarStar::seed_from_u64(config.seed);
    let spread = config.spread.max(1.0);
    let mut ids = Vec::with_capacity(config.entity_count as usize);

    for index in 0..config.entity_count {
        let center = Vec3::new(
            rng.gen_range(-spread..=spread),
            0.0,
            rng.gen_range(-spread..=spread),
        );
        let size = rng.gen_range(1.0..8.0_f32);
        let character = index % 10 == 9;
        let kind = if character {
            ProxyKind::Skinned
        } else {
            ProxyKind::Static
        };

        let levels = PROP_LEVELS
            .iter()
            .zip(PROP_VERTICES)
            .enumerate()
            .map(|(level, (&pct, vertices))| {
                // Coarser levels shrink a little, within the allowed ratio.
                let extent = size * (1.0 - 0.05 * level as f32);
                let mesh = scene.add_mesh(vertices);
                let bounds = Aabb::from_center_size(center, Vec3::splat(extent));
                let proxy = scene.spawn_proxy(kind, bounds, mesh);
                let descriptor = LevelDescriptor::new(proxy, pct);
                if character && level == 1 {
                    descriptor.sharing_level_zero()
                } else {
                    descriptor
                }
            })
            .collect();

        let desc = if character {
            EntityDesc::new(levels)
        } else {
            let material = rng.gen_range(0..MATERIAL_COUNT);
            EntityDesc::new(levels).with_merge_key(MergeKey::new([material]))
        };

        match scheduler.register_entity(desc, scene) {
            Ok(id) => ids.push(id),
            Err(e) => warn!("Failed to register entity {index}: {e}"),
        }
    }

    info!(
        "Populated {} entities over a {:.0} x {:.0} area, {} combiners",
        ids.len(),
        spread * 2.0,
        spread * 2.0,
        scheduler.combiner_count()
    );
    ids
}
