#![allow(dead_code)]

use std::sync::atomic::AtomicBool;

use glam::{Affine3A, Vec3};
use itertools::Itertools;
use strewn::cache::ElementCache;
use strewn::generate::Generator;
use strewn::io::memory::MemoryAssetServer;
use strewn::scene::{Scene, SceneHandle};
use strewn::spawn::SpawnEnv;
use strewn::util::Budget;
use strewn_model::asset::{Aabb, MeshAsset};
use strewn_model::attributes::AttributeColumn;
use strewn_model::points::PointBatch;

/// Scene, generator and a served catalog, wired together the way the binary
/// wires them.
pub struct World {
    pub scene: Scene,
    pub generator: Generator,
    pub assets: MemoryAssetServer,
    pub cache: ElementCache,
    pub stop: AtomicBool,
}

impl World {
    pub fn new() -> Self {
        let mut scene = Scene::new();
        let owner = scene.create_owner("Root", Affine3A::IDENTITY);
        World {
            scene,
            generator: Generator::new("Gen", owner),
            assets: catalog(),
            cache: ElementCache::new(16),
            stop: AtomicBool::new(false),
        }
    }

    pub fn owner(&self) -> SceneHandle {
        self.generator.owner()
    }

    pub fn env(&mut self, budget: Budget) -> SpawnEnv<'_> {
        SpawnEnv {
            scene: &mut self.scene,
            generator: &mut self.generator,
            assets: &self.assets,
            cache: Some(&self.cache),
            stop: &self.stop,
            budget,
        }
    }
}

pub fn mesh(path: &str, bank_count: u32) -> MeshAsset {
    MeshAsset {
        path: path.to_string(),
        local_bounds: Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
        material_slots: 1,
        streaming_lod: false,
        bank_count,
    }
}

pub fn catalog() -> MemoryAssetServer {
    let server = MemoryAssetServer::new();
    for path in ["meshes/cube", "meshes/rock", "meshes/pine"] {
        server.insert_mesh(mesh(path, 0));
    }
    server.insert_mesh(mesh("meshes/walker", 3));
    for path in ["banks/idle", "banks/walk", "banks/run"] {
        server.insert_mesh(mesh(path, 0));
    }
    server
}

/// A row of points along X, seeded by index.
pub fn row_batch(count: usize) -> PointBatch {
    PointBatch::new(
        (0..count)
            .map(|i| Affine3A::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect(),
    )
}

/// A row batch with a "mesh" text column, one path per point.
pub fn meshed_batch(paths: &[&str]) -> PointBatch {
    let mut batch = row_batch(paths.len());
    batch.insert_column("mesh", AttributeColumn::Text(paths.iter().map(|p| p.to_string()).collect()));
    batch
}

/// Names of every live mesh component, sorted.
pub fn component_names(scene: &Scene) -> Vec<String> {
    scene
        .iter()
        .filter(|(_, object)| object.instances().is_some())
        .map(|(_, object)| object.name.clone())
        .sorted()
        .collect()
}

pub fn instance_count_of(scene: &Scene, name: &str) -> usize {
    let handle = scene.find_by_name(name).unwrap_or_else(|| panic!("no component {name}"));
    scene.object(handle).unwrap().instances().unwrap().instance_count()
}
