//! The scene-mutation boundary: everything the scheduler needs from the host
//! scene graph, plus an in-memory implementation.

use rustc_hash::FxHashMap;

use crate::frustum::Aabb;
use crate::ids::{MeshHandle, ProxyHandle};

/// Kind of renderable behind a proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    /// Static mesh renderer.
    Static,
    /// Skinned (animated) mesh renderer.
    Skinned,
}

/// Capability interface over the host scene.
///
/// The scheduler never owns proxies or meshes; it toggles and rebinds them
/// through this trait.
pub trait SceneAccess {
    /// Make the proxy visible.
    fn activate(&mut self, proxy: ProxyHandle);

    /// Hide the proxy.
    fn deactivate(&mut self, proxy: ProxyHandle);

    /// Mesh resource currently bound to the proxy.
    fn mesh(&self, proxy: ProxyHandle) -> Option<MeshHandle>;

    /// Bind a mesh resource to the proxy.
    fn set_mesh(&mut self, proxy: ProxyHandle, mesh: Option<MeshHandle>);

    /// World-space bounds of the proxy, if it has geometry.
    fn bounds(&self, proxy: ProxyHandle) -> Option<Aabb>;

    /// Renderer kind of the proxy.
    fn kind(&self, proxy: ProxyHandle) -> ProxyKind;

    /// Vertex count of the mesh bound to the proxy.
    fn vertex_count(&self, proxy: ProxyHandle) -> u32;
}

#[derive(Clone, Debug)]
struct ProxyRecord {
    kind: ProxyKind,
    active: bool,
    mesh: Option<MeshHandle>,
    bounds: Aabb,
}

/// In-memory [`SceneAccess`] implementation.
///
/// Records every visibility toggle so callers can assert on the number of
/// activations a transition caused.
#[derive(Debug, Default)]
pub struct MemoryScene {
    proxies: FxHashMap<ProxyHandle, ProxyRecord>,
    meshes: FxHashMap<MeshHandle, u32>,
    next_proxy: u32,
    next_mesh: u32,
    toggles: u64,
}

impl MemoryScene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh resource with the given vertex count.
    pub fn add_mesh(&mut self, vertex_count: u32) -> MeshHandle {
        let handle = MeshHandle(self.next_mesh);
        self.next_mesh += 1;
        self.meshes.insert(handle, vertex_count);
        handle
    }

    /// Spawn an active proxy bound to `mesh`.
    pub fn spawn_proxy(&mut self, kind: ProxyKind, bounds: Aabb, mesh: MeshHandle) -> ProxyHandle {
        let handle = ProxyHandle(self.next_proxy);
        self.next_proxy += 1;
        self.proxies.insert(
            handle,
            ProxyRecord {
                kind,
                active: true,
                mesh: Some(mesh),
                bounds,
            },
        );
        handle
    }

    /// Replace the bounds of a proxy (e.g. after its geometry changed).
    pub fn set_bounds(&mut self, proxy: ProxyHandle, bounds: Aabb) {
        if let Some(record) = self.proxies.get_mut(&proxy) {
            record.bounds = bounds;
        }
    }

    /// Whether the proxy is currently visible.
    pub fn is_active(&self, proxy: ProxyHandle) -> bool {
        self.proxies.get(&proxy).is_some_and(|r| r.active)
    }

    /// Number of activate/deactivate calls that changed a proxy's visibility.
    pub fn toggles(&self) -> u64 {
        self.toggles
    }

    /// Number of visible proxies.
    pub fn active_count(&self) -> usize {
        self.proxies.values().filter(|r| r.active).count()
    }

    fn set_active(&mut self, proxy: ProxyHandle, active: bool) {
        if let Some(record) = self.proxies.get_mut(&proxy)
            && record.active != active
        {
            record.active = active;
            self.toggles += 1;
        }
    }
}

impl SceneAccess for MemoryScene {
    fn activate(&mut self, proxy: ProxyHandle) {
        self.set_active(proxy, true);
    }

    fn deactivate(&mut self, proxy: ProxyHandle) {
        self.set_active(proxy, false);
    }

    fn mesh(&self, proxy: ProxyHandle) -> Option<MeshHandle> {
        self.proxies.get(&proxy).and_then(|r| r.mesh)
    }

    fn set_mesh(&mut self, proxy: ProxyHandle, mesh: Option<MeshHandle>) {
        if let Some(record) = self.proxies.get_mut(&proxy) {
            record.mesh = mesh;
        }
    }

    fn bounds(&self, proxy: ProxyHandle) -> Option<Aabb> {
        self.proxies.get(&proxy).map(|r| r.bounds)
    }

    fn kind(&self, proxy: ProxyHandle) -> ProxyKind {
        self.proxies
            .get(&proxy)
            .map_or(ProxyKind::Static, |r| r.kind)
    }

    fn vertex_count(&self, proxy: ProxyHandle) -> u32 {
        self.mesh(proxy)
            .and_then(|m| self.meshes.get(&m).copied())
            .unwrap_or(0)
    }
}
