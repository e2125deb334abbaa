use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use glam::Vec3;
use log::{trace, warn};
use serde::Deserialize;
use strewn_model::asset::{Aabb, MaterialAsset, MeshAsset};
use tokio::runtime::Runtime;

use crate::io::common::loader::{AssetServer, LoadState};

/// Serves assets from RON manifests under a root directory: the asset path
/// `meshes/rock` maps to `<root>/meshes/rock.mesh.ron`, with
/// `<root>/meshes/rock.mat.ron` as the material fallback. Asynchronous
/// requests run on an owned runtime and publish results through the shared
/// state map.
pub struct FsAssetServer {
    root: PathBuf,
    runtime: Runtime,
    meshes: Arc<DashMap<String, Arc<MeshAsset>>>,
    materials: Arc<DashMap<String, Arc<MaterialAsset>>>,
    states: Arc<DashMap<String, LoadState>>,
}

#[derive(Debug, Deserialize)]
struct MeshManifest {
    bounds_min: [f32; 3],
    bounds_max: [f32; 3],
    #[serde(default)]
    material_slots: u32,
    #[serde(default)]
    streaming_lod: bool,
    #[serde(default)]
    bank_count: u32,
}

#[derive(Debug, Deserialize)]
struct MaterialManifest {
    #[serde(default)]
    two_sided: bool,
}

impl FsAssetServer {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        anyhow::ensure!(root.is_dir(), "asset root {} is not a directory", root.display());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("strewn-asset-io")
            .enable_all()
            .build()
            .context("building the asset io runtime")?;

        Ok(FsAssetServer {
            root,
            runtime,
            meshes: Arc::new(DashMap::new()),
            materials: Arc::new(DashMap::new()),
            states: Arc::new(DashMap::new()),
        })
    }
}

impl AssetServer for FsAssetServer {
    fn request_load(&self, paths: &[String], asynchronous: bool) -> bool {
        let mut all_terminal = true;
        for path in paths {
            let current = self.load_state(path);
            if current.is_terminal() {
                continue;
            }
            if current == LoadState::Loading && asynchronous {
                // Already in flight.
                all_terminal = false;
                continue;
            }

            self.states.insert(path.clone(), LoadState::Loading);
            let task = load_one(
                self.root.clone(),
                path.clone(),
                self.meshes.clone(),
                self.materials.clone(),
                self.states.clone(),
            );
            if asynchronous {
                self.runtime.spawn(task);
                all_terminal = false;
            } else {
                self.runtime.block_on(task);
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

async fn load_one(
    root: PathBuf,
    path: String,
    meshes: Arc<DashMap<String, Arc<MeshAsset>>>,
    materials: Arc<DashMap<String, Arc<MaterialAsset>>>,
    states: Arc<DashMap<String, LoadState>>,
) {
    let state = match try_load(&root, &path, &meshes, &materials).await {
        Ok(()) => LoadState::Loaded,
        Err(error) => {
            warn!("could not load {}: {:#}", path, error);
            LoadState::Failed(format!("{:#}", error))
        }
    };
    states.insert(path, state);
}

async fn try_load(
    root: &Path,
    path: &str,
    meshes: &DashMap<String, Arc<MeshAsset>>,
    materials: &DashMap<String, Arc<MaterialAsset>>,
) -> anyhow::Result<()> {
    let mesh_file = root.join(format!("{}.mesh.ron", path));
    if mesh_file.is_file() {
        let text = tokio::fs::read_to_string(&mesh_file)
            .await
            .with_context(|| format!("reading {}", mesh_file.display()))?;
        let manifest: MeshManifest = ron::from_str(&text).with_context(|| format!("parsing {}", mesh_file.display()))?;
        meshes.insert(
            path.to_string(),
            Arc::new(MeshAsset {
                path: path.to_string(),
                local_bounds: Aabb::new(Vec3::from_array(manifest.bounds_min), Vec3::from_array(manifest.bounds_max)),
                material_slots: manifest.material_slots,
                streaming_lod: manifest.streaming_lod,
                bank_count: manifest.bank_count,
            }),
        );
        trace!("loaded mesh {}", path);
        return Ok(());
    }

    let material_file = root.join(format!("{}.mat.ron", path));
    if material_file.is_file() {
        let text = tokio::fs::read_to_string(&material_file)
            .await
            .with_context(|| format!("reading {}", material_file.display()))?;
        let manifest: MaterialManifest =
            ron::from_str(&text).with_context(|| format!("parsing {}", material_file.display()))?;
        materials.insert(
            path.to_string(),
            Arc::new(MaterialAsset {
                path: path.to_string(),
                two_sided: manifest.two_sided,
            }),
        );
        trace!("loaded material {}", path);
        return Ok(());
    }

    anyhow::bail!("no manifest at {} or {}", mesh_file.display(), material_file.display())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn scratch_root(label: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("strewn-fs-{}-{}", label, std::process::id()));
        std::fs::create_dir_all(root.join("meshes")).unwrap();
        root
    }

    fn write_cube_manifest(root: &Path) {
        std::fs::write(
            root.join("meshes/cube.mesh.ron"),
            "(bounds_min: (-1.0, -1.0, -1.0), bounds_max: (1.0, 1.0, 1.0), material_slots: 1)",
        )
        .unwrap();
    }

    #[test]
    pub fn sync_load_parses_manifests() {
        let root = scratch_root("sync");
        write_cube_manifest(&root);

        let server = FsAssetServer::new(&root).unwrap();
        let done = server.request_load(&["meshes/cube".to_string()], false);
        assert!(done);

        let mesh = server.get_mesh("meshes/cube").unwrap();
        assert_eq!(mesh.material_slots, 1);
        assert_eq!(mesh.local_bounds.max, Vec3::splat(1.0));
        assert!(!mesh.streaming_lod);
    }

    #[test]
    pub fn async_load_publishes_eventually() {
        let root = scratch_root("async");
        write_cube_manifest(&root);

        let server = FsAssetServer::new(&root).unwrap();
        let done = server.request_load(&["meshes/cube".to_string()], true);
        assert!(!done);

        for _ in 0..200 {
            if server.load_state("meshes/cube").is_terminal() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(server.load_state("meshes/cube"), LoadState::Loaded);
    }

    #[test]
    pub fn missing_manifests_fail_terminally() {
        let root = scratch_root("missing");
        let server = FsAssetServer::new(&root).unwrap();

        let done = server.request_load(&["meshes/nothing".to_string()], false);
        assert!(done);
        assert!(matches!(server.load_state("meshes/nothing"), LoadState::Failed(_)));
    }
}
