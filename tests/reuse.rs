use strewn::spawn::context::SpawnContext;
use strewn::spawn::static_mesh::{StaticMeshSpawner, StaticMeshSpawnerSettings};
use strewn::spawn::{SpawnEnv, run_to_completion};
use strewn::util::Budget;

use crate::common::{World, component_names, instance_count_of, meshed_batch};

mod common;

#[test]
fn unchanged_replay_takes_the_fast_path() {
    let mut world = World::new();
    let spawner = StaticMeshSpawner::new(StaticMeshSpawnerSettings::default());

    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(vec![meshed_batch(&["meshes/rock", "meshes/rock"])]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut ctx, &mut env);
    }
    world.generator.end_pass(&mut world.scene);
    assert_eq!(ctx.stats().components_created, 1);
    let component = world.scene.find_by_name("Gen.ism.0").unwrap();

    world.generator.begin_pass();
    let mut replay = SpawnContext::new(vec![meshed_batch(&["meshes/rock", "meshes/rock"])]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut replay, &mut env);
    }
    let swept = world.generator.end_pass(&mut world.scene);

    assert!(replay.is_done());
    assert_eq!(replay.stats().components_created, 0);
    assert_eq!(replay.stats().components_reused, 1);
    assert_eq!(replay.stats().inputs_skipped, 1);
    assert_eq!(swept, 0);

    // Same component, content carried over instead of rebuilt.
    assert_eq!(world.scene.find_by_name("Gen.ism.0"), Some(component));
    assert_eq!(instance_count_of(&world.scene, "Gen.ism.0"), 2);
}

#[test]
fn changed_settings_rebuild_and_sweep_stale_components() {
    let mut world = World::new();
    let spawner = StaticMeshSpawner::new(StaticMeshSpawnerSettings::default());

    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(vec![meshed_batch(&["meshes/rock"])]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut ctx, &mut env);
    }
    world.generator.end_pass(&mut world.scene);
    let old = world.scene.find_by_name("Gen.ism.0").unwrap();

    // A different seed is a different recipe; the parked component is stale.
    let reseeded = StaticMeshSpawner::new(StaticMeshSpawnerSettings {
        seed: 99,
        ..Default::default()
    });
    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(vec![meshed_batch(&["meshes/rock"])]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&reseeded, &mut ctx, &mut env);
    }
    let swept = world.generator.end_pass(&mut world.scene);

    assert_eq!(ctx.stats().inputs_skipped, 0);
    assert_eq!(ctx.stats().components_created, 1);
    assert_eq!(swept, 1);
    assert!(!world.scene.is_valid(old));
    assert_eq!(instance_count_of(&world.scene, "Gen.ism.1"), 1);
}

#[test]
fn only_the_unchanged_input_skips_its_work() {
    let mut world = World::new();
    let spawner = StaticMeshSpawner::new(StaticMeshSpawnerSettings::default());

    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(vec![
        meshed_batch(&["meshes/rock"]),
        meshed_batch(&["meshes/pine", "meshes/pine"]),
    ]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut ctx, &mut env);
    }
    world.generator.end_pass(&mut world.scene);
    assert_eq!(ctx.stats().components_created, 2);
    let rock = world.scene.find_by_name("Gen.ism.0").unwrap();

    // The pine input shrinks, the rock input stays word-for-word the same.
    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(vec![meshed_batch(&["meshes/rock"]), meshed_batch(&["meshes/pine"])]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut ctx, &mut env);
    }
    let swept = world.generator.end_pass(&mut world.scene);

    assert_eq!(ctx.stats().inputs_skipped, 1);
    assert_eq!(ctx.stats().components_reused, 1);
    assert_eq!(ctx.stats().components_created, 1);
    assert_eq!(swept, 1);

    assert_eq!(world.scene.find_by_name("Gen.ism.0"), Some(rock));
    assert_eq!(instance_count_of(&world.scene, "Gen.ism.0"), 1);
    assert!(world.scene.find_by_name("Gen.ism.1").is_none());
    assert_eq!(instance_count_of(&world.scene, "Gen.ism.2"), 1);
}

#[test]
fn identical_inputs_fold_onto_one_component() {
    let mut world = World::new();
    let spawner = StaticMeshSpawner::new(StaticMeshSpawnerSettings::default());
    let inputs = || vec![meshed_batch(&["meshes/rock"]), meshed_batch(&["meshes/rock"])];

    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(inputs());
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut ctx, &mut env);
    }
    world.generator.end_pass(&mut world.scene);

    // The second input lands in the component the first one acquired.
    assert_eq!(ctx.stats().components_created, 1);
    assert_eq!(world.generator.pool().len(), 1);
    assert_eq!(component_names(&world.scene), vec!["Gen.ism.0"]);
    assert_eq!(instance_count_of(&world.scene, "Gen.ism.0"), 2);

    world.generator.begin_pass();
    let mut replay = SpawnContext::new(inputs());
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut replay, &mut env);
    }
    world.generator.end_pass(&mut world.scene);

    assert_eq!(replay.stats().inputs_skipped, 2);
    assert_eq!(replay.stats().components_reused, 1);
    assert_eq!(instance_count_of(&world.scene, "Gen.ism.0"), 2);
}

#[test]
fn forwarding_replays_from_the_output_cache() {
    let mut world = World::new();
    let spawner = StaticMeshSpawner::new(StaticMeshSpawnerSettings {
        forward_points: true,
        out_mesh_attribute: Some("picked".to_string()),
        ..Default::default()
    });

    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(vec![meshed_batch(&["meshes/rock", "meshes/pine"])]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut ctx, &mut env);
    }
    world.generator.end_pass(&mut world.scene);
    let first_outputs = ctx.take_outputs();
    assert_eq!(first_outputs.len(), 1);

    world.generator.begin_pass();
    let mut replay = SpawnContext::new(vec![meshed_batch(&["meshes/rock", "meshes/pine"])]);
    {
        let mut env = world.env(Budget::Unlimited);
        run_to_completion(&spawner, &mut replay, &mut env);
    }
    world.generator.end_pass(&mut world.scene);

    assert_eq!(replay.stats().components_created, 0);
    assert_eq!(replay.stats().inputs_skipped, 1);
    let replayed = replay.take_outputs();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].len(), 2);
    assert_eq!(replayed[0].column("picked"), first_outputs[0].column("picked"));
}

#[test]
fn forwarding_without_a_cache_rebuilds_by_reclaiming() {
    let mut world = World::new();
    let spawner = StaticMeshSpawner::new(StaticMeshSpawnerSettings {
        forward_points: true,
        out_mesh_attribute: Some("picked".to_string()),
        ..Default::default()
    });

    let mut run = |world: &mut World, ctx: &mut SpawnContext| {
        let mut env = SpawnEnv {
            scene: &mut world.scene,
            generator: &mut world.generator,
            assets: &world.assets,
            cache: None,
            stop: &world.stop,
            budget: Budget::Unlimited,
        };
        run_to_completion(&spawner, ctx, &mut env);
    };

    world.generator.begin_pass();
    let mut ctx = SpawnContext::new(vec![meshed_batch(&["meshes/rock"])]);
    run(&mut world, &mut ctx);
    world.generator.end_pass(&mut world.scene);
    let component = world.scene.find_by_name("Gen.ism.0").unwrap();

    world.generator.begin_pass();
    let mut replay = SpawnContext::new(vec![meshed_batch(&["meshes/rock"])]);
    run(&mut world, &mut replay);
    world.generator.end_pass(&mut world.scene);

    // Nothing cached to replay, so the pass reruns and claims the parked
    // component through descriptor matching instead.
    assert_eq!(replay.stats().inputs_skipped, 0);
    assert_eq!(replay.stats().components_created, 0);
    assert_eq!(replay.stats().components_reused, 1);
    assert_eq!(world.scene.find_by_name("Gen.ism.0"), Some(component));
    assert_eq!(instance_count_of(&world.scene, "Gen.ism.0"), 1);

    let outputs = replay.take_outputs();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].column("picked").is_some());
}
