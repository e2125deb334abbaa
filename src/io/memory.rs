use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use itertools::Itertools;
use log::warn;
use strewn_model::asset::{MaterialAsset, MeshAsset};

use crate::io::common::loader::{AssetServer, LoadState};

/// In-memory catalog server for tests and the built-in demo content.
///
/// With `hold_loads` active, asynchronous requests park in `Loading` until
/// `complete_pending` is called, which lets a test sit an element in its
/// load-waiting phase at a deterministic spot. Synchronous requests always
/// complete immediately, hold or not.
#[derive(Default)]
pub struct MemoryAssetServer {
    meshes: DashMap<String, Arc<MeshAsset>>,
    materials: DashMap<String, Arc<MaterialAsset>>,
    states: DashMap<String, LoadState>,
    hold_loads: AtomicBool,
}

impl MemoryAssetServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mesh(&self, asset: MeshAsset) {
        self.meshes.insert(asset.path.clone(), Arc::new(asset));
    }

    pub fn insert_material(&self, asset: MaterialAsset) {
        self.materials.insert(asset.path.clone(), Arc::new(asset));
    }

    pub fn hold_loads(&self, hold: bool) {
        self.hold_loads.store(hold, Ordering::SeqCst);
    }

    /// Completes every parked load against the catalog. Returns how many
    /// loads were completed.
    pub fn complete_pending(&self) -> usize {
        let pending = self
            .states
            .iter()
            .filter(|entry| *entry.value() == LoadState::Loading)
            .map(|entry| entry.key().clone())
            .collect_vec();
        for path in &pending {
            self.states.insert(path.clone(), self.terminal_state(path));
        }
        pending.len()
    }

    fn terminal_state(&self, path: &str) -> LoadState {
        if self.meshes.contains_key(path) || self.materials.contains_key(path) {
            LoadState::Loaded
        } else {
            LoadState::Failed("not in catalog".to_string())
        }
    }
}

impl AssetServer for MemoryAssetServer {
    fn request_load(&self, paths: &[String], asynchronous: bool) -> bool {
        let hold = asynchronous && self.hold_loads.load(Ordering::SeqCst);
        let mut all_terminal = true;
        for path in paths {
            if self.load_state(path).is_terminal() {
                continue;
            }
            if hold {
                self.states.insert(path.clone(), LoadState::Loading);
                all_terminal = false;
            } else {
                let state = self.terminal_state(path);
                if let LoadState::Failed(reason) = &state {
                    warn!("could not load {}: {}", path, reason);
                }
                self.states.insert(path.clone(), state);
            }
        }
        all_terminal
    }

    fn load_state(&self, path: &str) -> LoadState {
        self.states
            .get(path)
            .map(|state| state.value().clone())
            .unwrap_or(LoadState::Unrequested)
    }

    fn get_mesh(&self, path: &str) -> Option<Arc<MeshAsset>> {
        self.meshes.get(path).map(|entry| entry.value().clone())
    }

    fn get_material(&self, path: &str) -> Option<Arc<MaterialAsset>> {
        self.materials.get(path).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use strewn_model::asset::Aabb;

    use super::*;

    fn server_with_cube() -> MemoryAssetServer {
        let server = MemoryAssetServer::new();
        server.insert_mesh(MeshAsset {
            path: "meshes/cube".to_string(),
            local_bounds: Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
            material_slots: 1,
            streaming_lod: false,
            bank_count: 0,
        });
        server
    }

    #[test]
    pub fn sync_requests_complete_immediately() {
        let server = server_with_cube();
        let done = server.request_load(&["meshes/cube".to_string()], false);
        assert!(done);
        assert_eq!(server.load_state("meshes/cube"), LoadState::Loaded);
        assert!(server.get_mesh("meshes/cube").is_some());
    }

    #[test]
    pub fn held_async_requests_park_until_completed() {
        let server = server_with_cube();
        server.hold_loads(true);

        let done = server.request_load(&["meshes/cube".to_string()], true);
        assert!(!done);
        assert_eq!(server.load_state("meshes/cube"), LoadState::Loading);

        assert_eq!(server.complete_pending(), 1);
        assert_eq!(server.load_state("meshes/cube"), LoadState::Loaded);
    }

    #[test]
    pub fn unknown_paths_fail_terminally() {
        let server = server_with_cube();
        let done = server.request_load(&["meshes/missing".to_string()], false);
        // Failed is terminal, so the request still "completed".
        assert!(done);
        assert!(matches!(server.load_state("meshes/missing"), LoadState::Failed(_)));
        assert!(server.get_mesh("meshes/missing").is_none());
    }
}
