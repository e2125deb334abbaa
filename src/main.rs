use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{Affine3A, Quat, Vec3};
use itertools::Itertools;
use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strewn::cache::ElementCache;
use strewn::generate::{Generator, snapshot};
use strewn::io::common::loader::AssetServer;
use strewn::io::fs::loader::FsAssetServer;
use strewn::io::memory::MemoryAssetServer;
use strewn::scene::Scene;
use strewn::spawn::context::SpawnContext;
use strewn::spawn::selection::{MeshSelector, WeightedEntry};
use strewn::spawn::static_mesh::{StaticMeshSpawner, StaticMeshSpawnerSettings};
use strewn::spawn::{Element, SpawnEnv, SpawnPhase, StepOutcome, run_to_completion};
use strewn::util::Budget;
use strewn_model::asset::{Aabb, MaterialAsset, MeshAsset};
use strewn_model::attributes::AttributeColumn;
use strewn_model::descriptor::InstancedMeshDescriptor;
use strewn_model::points::PointBatch;

use crate::settings::{CliArgs, Extent, OperationMode};

mod settings;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let assets: Box<dyn AssetServer> = match &args.asset_dir {
        Some(dir) => Box::new(FsAssetServer::new(dir)?),
        None => Box::new(demo_catalog()),
    };

    match args.operation_mode {
        OperationMode::Scatter {
            area,
            points,
            passes,
            budget_ms,
            seed,
            churn,
            snapshot,
        } => run_scatter(
            assets.as_ref(),
            area,
            points,
            passes,
            budget_ms,
            seed,
            churn,
            snapshot.as_deref().map(Path::new),
        ),
        OperationMode::Soak { passes, points, seed } => run_soak(assets.as_ref(), passes, points, seed),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_scatter(
    assets: &dyn AssetServer,
    area: Extent,
    points: usize,
    passes: u32,
    budget_ms: u64,
    seed: u32,
    churn: f32,
    snapshot_path: Option<&Path>,
) -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let owner = scene.create_owner("ScatterRoot", Affine3A::IDENTITY);
    let mut generator = Generator::new("Scatter", owner);
    let cache = ElementCache::new(64);
    let stop = AtomicBool::new(false);

    let spawner = demo_spawner(seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    let mut batch = scatter_points(&mut rng, points, area);

    for pass in 1..=passes {
        if pass > 1 && rng.random::<f32>() < churn {
            info!("pass {}: churn, re-rolling {} points", pass, points);
            batch = scatter_points(&mut rng, points, area);
        }

        generator.begin_pass();
        let mut ctx = SpawnContext::new(vec![batch.clone()]);
        let quanta = {
            let mut env = SpawnEnv {
                scene: &mut scene,
                generator: &mut generator,
                assets,
                cache: Some(&cache),
                stop: &stop,
                budget: Budget::Unlimited,
            };
            drive(&spawner, &mut ctx, &mut env, budget_ms)
        };
        let swept = generator.end_pass(&mut scene);

        if !ctx.errors().is_empty() {
            warn!("pass {}: {} errors recorded", pass, ctx.errors().len());
        }
        info!(
            "pass {}: {} quanta, created {}, reused {}, swept {}, scene holds {} instances",
            pass,
            quanta,
            ctx.stats().components_created,
            ctx.stats().components_reused,
            swept,
            scene.instance_count()
        );
        report_mesh_histogram(&ctx);
    }

    if let Some(path) = snapshot_path {
        handover_through_snapshot(assets, &mut scene, generator, &batch, seed, path)?;
    }
    Ok(())
}

/// Saves the pool, then proves the round trip: a brand-new generator restores
/// the file and the next pass claims every live component back instead of
/// rebuilding it.
fn handover_through_snapshot(
    assets: &dyn AssetServer,
    scene: &mut Scene,
    generator: Generator,
    batch: &PointBatch,
    seed: u32,
    path: &Path,
) -> anyhow::Result<()> {
    let captured = generator.snapshot(scene);
    snapshot::save_ron(&captured, path)?;
    info!("saved {} pool entries to {}", captured.entries.len(), path.display());
    drop(generator);

    let owner = scene.find_by_name("ScatterRoot").expect("scatter root vanished");
    let mut revived = Generator::new("Scatter", owner);
    let restored = revived.restore(scene, snapshot::load_ron(path)?);

    let stop = AtomicBool::new(false);
    let spawner = demo_spawner(seed);
    revived.begin_pass();
    let mut ctx = SpawnContext::new(vec![batch.clone()]);
    {
        let mut env = SpawnEnv {
            scene: &mut *scene,
            generator: &mut revived,
            assets,
            cache: None,
            stop: &stop,
            budget: Budget::Unlimited,
        };
        run_to_completion(&spawner, &mut ctx, &mut env);
    }
    let swept = revived.end_pass(scene);
    info!(
        "handover pass: restored {}, reused {}, created {}, swept {}",
        restored,
        ctx.stats().components_reused,
        ctx.stats().components_created,
        swept
    );
    Ok(())
}

fn run_soak(assets: &dyn AssetServer, passes: u32, points: usize, seed: u32) -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let owner = scene.create_owner("SoakRoot", Affine3A::IDENTITY);
    let mut generator = Generator::new("Soak", owner);
    let cache = ElementCache::new(64);
    let stop = AtomicBool::new(false);

    let mut spawner_settings = demo_settings(seed);
    spawner_settings.synchronous_load = true;
    let spawner = StaticMeshSpawner::new(spawner_settings);

    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    let batch = scatter_points(&mut rng, points, Extent { x: 200.0, z: 200.0 });

    let started = Instant::now();
    let mut created = 0;
    let mut reused = 0;
    for _ in 0..passes {
        generator.begin_pass();
        let mut ctx = SpawnContext::new(vec![batch.clone()]);
        {
            let mut env = SpawnEnv {
                scene: &mut scene,
                generator: &mut generator,
                assets,
                cache: Some(&cache),
                stop: &stop,
                budget: Budget::Unlimited,
            };
            run_to_completion(&spawner, &mut ctx, &mut env);
        }
        generator.end_pass(&mut scene);
        created += ctx.stats().components_created;
        reused += ctx.stats().components_reused;
    }

    info!(
        "soak: {} passes over {} points in {:.2?}, created {}, reused {}, scene holds {} instances",
        passes,
        points,
        started.elapsed(),
        created,
        reused,
        scene.instance_count()
    );
    Ok(())
}

/// Frame-loop stand-in: re-arms a deadline budget every quantum and naps while
/// the element waits on asset loads.
fn drive(element: &dyn Element, ctx: &mut SpawnContext, env: &mut SpawnEnv, budget_ms: u64) -> usize {
    let mut quanta = 0;
    loop {
        env.budget = Budget::time_slice(Duration::from_millis(budget_ms));
        quanta += 1;
        if element.step(ctx, env) == StepOutcome::Finished {
            return quanta;
        }
        if ctx.phase() == SpawnPhase::AwaitingLoad {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

fn demo_settings(seed: u32) -> StaticMeshSpawnerSettings {
    let mut rock = InstancedMeshDescriptor::for_mesh("meshes/rock");
    rock.materials.push("materials/stone".to_string());
    let mut pine = InstancedMeshDescriptor::for_mesh("meshes/pine");
    pine.materials.push("materials/moss".to_string());
    let cube = InstancedMeshDescriptor::for_mesh("meshes/cube");

    StaticMeshSpawnerSettings {
        selector: MeshSelector::Weighted {
            entries: vec![
                WeightedEntry {
                    descriptor: rock,
                    weight: 3,
                },
                WeightedEntry {
                    descriptor: pine,
                    weight: 2,
                },
                WeightedEntry {
                    descriptor: cube,
                    weight: 1,
                },
            ],
        },
        instance_attributes: vec!["scale_jitter".to_string()],
        out_mesh_attribute: Some("spawned_mesh".to_string()),
        forward_points: true,
        extra_tags: "demo".to_string(),
        seed,
        ..Default::default()
    }
}

fn demo_spawner(seed: u32) -> StaticMeshSpawner {
    StaticMeshSpawner::new(demo_settings(seed))
}

/// The catalog the binary falls back to when no asset directory is given.
fn demo_catalog() -> MemoryAssetServer {
    let server = MemoryAssetServer::new();
    for (path, half_extent, slots) in [("meshes/rock", 1.5, 1), ("meshes/pine", 4.0, 2), ("meshes/cube", 1.0, 1)] {
        server.insert_mesh(MeshAsset {
            path: path.to_string(),
            local_bounds: Aabb::new(Vec3::splat(-half_extent), Vec3::splat(half_extent)),
            material_slots: slots,
            streaming_lod: false,
            bank_count: 0,
        });
    }
    server.insert_material(MaterialAsset {
        path: "materials/moss".to_string(),
        two_sided: true,
    });
    server.insert_material(MaterialAsset {
        path: "materials/stone".to_string(),
        two_sided: false,
    });
    server
}

fn scatter_points(rng: &mut ChaCha8Rng, count: usize, area: Extent) -> PointBatch {
    let mut transforms = Vec::with_capacity(count);
    let mut seeds = Vec::with_capacity(count);
    let mut jitter = Vec::with_capacity(count);
    for _ in 0..count {
        let position = Vec3::new(
            rng.random_range(-0.5 * area.x..=0.5 * area.x),
            0.0,
            rng.random_range(-0.5 * area.z..=0.5 * area.z),
        );
        let yaw = rng.random_range(0.0..std::f32::consts::TAU);
        transforms.push(Affine3A::from_rotation_translation(Quat::from_rotation_y(yaw), position));
        seeds.push(rng.random());
        jitter.push(rng.random_range(0.8..1.2f32));
    }

    let mut batch = PointBatch::with_seeds(transforms, seeds);
    batch.insert_column("scale_jitter", AttributeColumn::Float(jitter));
    batch
}

fn report_mesh_histogram(ctx: &SpawnContext) {
    let Some(column) = ctx.outputs().first().and_then(|batch| batch.column("spawned_mesh")) else {
        return;
    };
    let Ok(paths) = column.expect_text("spawned_mesh") else {
        return;
    };
    let histogram = paths.iter().counts();
    for (path, count) in histogram.iter().sorted() {
        info!("  {} x {}", count, path);
    }
}
