//! Stable handles for entities, combiners and scene resources.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to an entity registered with the scheduler.
    pub struct EntityId;

    /// Handle to a live combiner owned by the scheduler.
    pub struct CombinerId;
}

/// Opaque handle to a renderable in the host scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyHandle(pub u32);

/// Opaque handle to a mesh resource in the host scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);
