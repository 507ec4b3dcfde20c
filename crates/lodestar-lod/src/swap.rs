//! Visual swap between two levels of one entity.
//!
//! Levels normally swap by toggling proxy visibility. Levels flagged
//! `share_proxy_with_level_zero` instead bind their mesh onto level 0's
//! proxy, which then stays active the whole time so an animation driven
//! through it is never interrupted.

use crate::ids::MeshHandle;
use crate::level::{LevelDescriptor, shares_level_zero};
use crate::scene::SceneAccess;

/// Present level `to` in place of level `from`.
///
/// `levels.len()` stands for "no level". `saved_mesh` holds level 0's
/// original mesh while a sharing level is bound onto its proxy; it is
/// filled once on entry and restored on exit.
pub(crate) fn present(
    levels: &[LevelDescriptor],
    from: usize,
    to: usize,
    saved_mesh: &mut Option<MeshHandle>,
    scene: &mut dyn SceneAccess,
) {
    if from == to || levels.is_empty() {
        return;
    }
    let count = levels.len();
    let level_zero = levels[0].proxy;
    let from_shares = shares_level_zero(levels, from);
    let to_shares = shares_level_zero(levels, to);
    // The proxy that is actually visible for `from`.
    let from_proxy = if from_shares {
        Some(level_zero)
    } else {
        levels.get(from).map(|l| l.proxy)
    };

    if to_shares {
        if saved_mesh.is_none() {
            *saved_mesh = scene.mesh(level_zero);
        }
        let mesh = scene.mesh(levels[to].proxy);
        scene.set_mesh(level_zero, mesh);
        if from_proxy != Some(level_zero) {
            if let Some(proxy) = from_proxy {
                scene.deactivate(proxy);
            }
            scene.activate(level_zero);
        }
        return;
    }

    if from_shares && let Some(original) = saved_mesh.take() {
        scene.set_mesh(level_zero, Some(original));
    }

    let to_proxy = (to < count).then(|| levels[to].proxy);
    if from_proxy == to_proxy {
        return;
    }
    if let Some(proxy) = from_proxy {
        scene.deactivate(proxy);
    }
    if let Some(proxy) = to_proxy {
        scene.activate(proxy);
    }
}
