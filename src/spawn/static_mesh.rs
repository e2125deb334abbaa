use std::sync::atomic::Ordering;

use log::warn;
use strewn_model::SpawnError;
use strewn_model::crc::Crc;
use strewn_model::descriptor::InstancedMeshDescriptor;
use strewn_model::points::PointBatch;

use crate::generate::InstancedMeshRequest;
use crate::pool::managed::ResourceKind;
use crate::scene::SceneHandle;
use crate::spawn::context::{AcquireKey, PreparedInput, SpawnContext};
use crate::spawn::packing::pack_custom_floats;
use crate::spawn::selection::{InstanceList, ListDescriptor, MeshSelector, SelectionOutput, select_static};
use crate::spawn::{self, Element, PostSpawnHook, SpawnEnv, SpawnPhase, StepOutcome, TargetOwner};
use crate::util::split_tag_list;

/// Static-mesh spawner configuration. `compute_crc` covers everything here
/// except `synchronous_load`, which changes scheduling but never results.
pub struct StaticMeshSpawnerSettings {
    pub selector: MeshSelector,
    /// Float/int columns packed per instance, in this order. The spawned
    /// components' custom-float width is this list's length.
    pub instance_attributes: Vec<String>,
    /// When forwarding, name of the text column that reports each point's
    /// chosen mesh path on the output batches.
    pub out_mesh_attribute: Option<String>,
    pub forward_points: bool,
    pub target: TargetOwner,
    pub allow_descriptor_changes: bool,
    pub synchronous_load: bool,
    pub transient: bool,
    /// Comma-separated extra tags applied to every spawned component.
    pub extra_tags: String,
    pub seed: u32,
}

impl Default for StaticMeshSpawnerSettings {
    fn default() -> Self {
        StaticMeshSpawnerSettings {
            selector: MeshSelector::ByAttribute {
                attribute: "mesh".to_string(),
                template: InstancedMeshDescriptor::default(),
            },
            instance_attributes: Vec::new(),
            out_mesh_attribute: None,
            forward_points: false,
            target: TargetOwner::Generator,
            allow_descriptor_changes: true,
            synchronous_load: false,
            transient: false,
            extra_tags: String::new(),
            seed: 0,
        }
    }
}

impl StaticMeshSpawnerSettings {
    pub fn compute_crc(&self) -> Crc {
        let mut crc = Crc::INVALID.combine_str("static_mesh_spawner").combine_u32(self.seed);
        crc = self.selector.combine_into(crc);
        crc = crc.combine_u32(self.instance_attributes.len() as u32);
        for name in &self.instance_attributes {
            crc = crc.combine_str(name);
        }
        crc = match &self.out_mesh_attribute {
            Some(name) => crc.combine_bool(true).combine_str(name),
            None => crc.combine_bool(false),
        };
        crc = crc.combine_bool(self.forward_points);
        crc = match &self.target {
            TargetOwner::Generator => crc.combine_bytes(&[0]),
            TargetOwner::Named(name) => crc.combine_bytes(&[1]).combine_str(name),
        };
        crc = crc.combine_bool(self.allow_descriptor_changes);
        crc = crc.combine_bool(self.transient);
        crc.combine_str(&self.extra_tags)
    }
}

/// The static-mesh element. Holds no execution state of its own; everything
/// mutable lives in the context, so one element can drive many executions.
pub struct StaticMeshSpawner {
    settings: StaticMeshSpawnerSettings,
    hooks: Vec<PostSpawnHook>,
}

impl StaticMeshSpawner {
    pub fn new(settings: StaticMeshSpawnerSettings) -> Self {
        StaticMeshSpawner {
            settings,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: PostSpawnHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn settings(&self) -> &StaticMeshSpawnerSettings {
        &self.settings
    }

    fn prepare_one(&self, ctx: &mut SpawnContext, env: &mut SpawnEnv) {
        let index = ctx.prepare_cursor;
        ctx.prepare_cursor += 1;
        if ctx.skip_input[index] {
            return;
        }
        let outcome = {
            let batch = &ctx.inputs[index];
            if batch.is_empty() {
                warn!("input {} is empty, skipping", index);
                return;
            }
            prepare_input(&self.settings, env, batch)
        };
        match outcome {
            Ok((target, lists, chosen_paths)) => ctx.prepared.push(PreparedInput {
                input_index: index,
                target,
                lists,
                chosen_paths,
            }),
            Err(error) => ctx.record_error(Some(index), error),
        }
    }

    fn populate_done(&self, ctx: &SpawnContext) -> bool {
        ctx.populate_cursor.0 >= ctx.prepared.len()
    }

    fn populate_one(&self, ctx: &mut SpawnContext, env: &mut SpawnEnv) {
        // Step over inputs whose lists are all populated, emitting their
        // forwarded copies at the boundary.
        while ctx.populate_cursor.0 < ctx.prepared.len()
            && ctx.populate_cursor.1 >= ctx.prepared[ctx.populate_cursor.0].lists.len()
        {
            self.emit_forwarded(ctx);
            ctx.populate_cursor = (ctx.populate_cursor.0 + 1, 0);
        }
        let (input_slot, list_slot) = ctx.populate_cursor;
        if input_slot >= ctx.prepared.len() {
            return;
        }
        ctx.populate_cursor = (input_slot, list_slot + 1);

        let list = std::mem::take(&mut ctx.prepared[input_slot].lists[list_slot]);
        let target = ctx.prepared[input_slot].target;
        let input_index = ctx.prepared[input_slot].input_index;
        if let Err(error) = self.populate_list(ctx, env, list, target, input_index) {
            ctx.record_error(Some(input_index), error);
        }
    }

    fn emit_forwarded(&self, ctx: &mut SpawnContext) {
        if !self.settings.forward_points {
            return;
        }
        let prepared = &ctx.prepared[ctx.populate_cursor.0];
        let output = spawn::forwarded_output(
            &ctx.inputs[prepared.input_index],
            self.settings.out_mesh_attribute.as_deref(),
            &prepared.chosen_paths,
        );
        ctx.outputs.push(output);
    }

    /// Acquire (or re-find through the per-pass map) the component for one
    /// list and append its instances.
    fn populate_list(
        &self,
        ctx: &mut SpawnContext,
        env: &mut SpawnEnv,
        list: InstanceList,
        target: SceneHandle,
        input_index: usize,
    ) -> Result<(), SpawnError> {
        let InstanceList {
            descriptor,
            transforms,
            custom_floats,
            ..
        } = list;
        let ListDescriptor::Instanced(mut descriptor) = descriptor else {
            debug_assert!(false, "static spawner got a non-instanced list");
            return Ok(());
        };

        let path = descriptor.mesh.path().to_string();
        let Some(mesh) = env.assets.get_mesh(&path) else {
            let reason = spawn::load_failure_reason(env.assets.load_state(&path));
            return Err(SpawnError::LoadFailed { path, reason });
        };
        descriptor.mesh.resolve_with(mesh);
        if self.settings.allow_descriptor_changes {
            descriptor.normalize();
        }

        let data_crc = ctx.input_crcs[input_index];
        let key = AcquireKey {
            settings_crc: ctx.settings_crc.value(),
            data_crc: data_crc.value(),
            descriptor_crc: descriptor.compute_crc().value(),
        };
        let acquired = match ctx.acquired.get(&key) {
            Some(held) if env.scene.is_valid(held.component) => *held,
            _ => {
                let acquired = env.generator.get_or_create_instanced_mesh(
                    env.scene,
                    InstancedMeshRequest {
                        owner: target,
                        descriptor,
                        settings_crc: ctx.settings_crc,
                        data_crc,
                        allow_descriptor_changes: self.settings.allow_descriptor_changes,
                        transient: self.settings.transient,
                        extra_tags: &split_tag_list(&self.settings.extra_tags),
                    },
                )?;
                ctx.acquired.insert(key, acquired);
                ctx.touched.push(acquired.id);
                if acquired.created {
                    ctx.stats.components_created += 1;
                } else {
                    ctx.stats.components_reused += 1;
                }
                acquired
            }
        };

        let Some(instances) = env
            .scene
            .object_mut(acquired.component)
            .and_then(|object| object.instances_mut())
        else {
            debug_assert!(false, "acquired component has no instance payload");
            return Ok(());
        };
        instances.append(&transforms, &custom_floats, None);
        instances.refresh_bounds();
        ctx.stats.instances_spawned += transforms.len();
        Ok(())
    }
}

impl Element for StaticMeshSpawner {
    fn step(&self, ctx: &mut SpawnContext, env: &mut SpawnEnv) -> StepOutcome {
        ctx.stats.steps += 1;
        loop {
            if ctx.phase != SpawnPhase::Done && ctx.phase != SpawnPhase::Aborting && env.stop.load(Ordering::Relaxed) {
                ctx.phase = SpawnPhase::Aborting;
            }
            match ctx.phase {
                SpawnPhase::NotStarted => spawn::begin(ctx, self.settings.compute_crc()),
                SpawnPhase::ReuseCheck => {
                    spawn::reuse_check(ctx, env, ResourceKind::InstancedMesh, self.settings.forward_points)
                }
                SpawnPhase::Preparing => {
                    if ctx.prepare_cursor >= ctx.inputs.len() {
                        ctx.phase = SpawnPhase::AwaitingLoad;
                        continue;
                    }
                    self.prepare_one(ctx, env);
                    env.budget.consume(1);
                    if ctx.prepare_cursor < ctx.inputs.len() && env.budget.exhausted() {
                        return StepOutcome::Suspended;
                    }
                }
                SpawnPhase::AwaitingLoad => {
                    if spawn::await_loads(ctx, env, self.settings.synchronous_load) {
                        ctx.phase = SpawnPhase::Populating;
                    } else {
                        return StepOutcome::Suspended;
                    }
                }
                SpawnPhase::Populating => {
                    if self.populate_done(ctx) {
                        spawn::finish(ctx, env, &self.hooks, &self.settings.target, self.settings.forward_points);
                        continue;
                    }
                    self.populate_one(ctx, env);
                    env.budget.consume(1);
                    if !self.populate_done(ctx) && env.budget.exhausted() {
                        return StepOutcome::Suspended;
                    }
                }
                SpawnPhase::Aborting => spawn::abort(ctx, env),
                SpawnPhase::Done => return StepOutcome::Finished,
            }
        }
    }
}

/// Everything per-input up to packing. Any error skips the whole input.
fn prepare_input(
    settings: &StaticMeshSpawnerSettings,
    env: &SpawnEnv,
    batch: &PointBatch,
) -> Result<(SceneHandle, Vec<InstanceList>, Vec<String>), SpawnError> {
    batch.validate()?;
    let target = spawn::resolve_target(env, &settings.target)?;
    let SelectionOutput { mut lists, chosen_paths } = select_static(&settings.selector, batch, settings.seed)?;
    for list in &mut lists {
        pack_custom_floats(list, batch, &settings.instance_attributes)?;
    }
    Ok((target, lists, chosen_paths))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn settings_crc_ignores_scheduling_knobs() {
        let base = StaticMeshSpawnerSettings::default();
        let mut sync = StaticMeshSpawnerSettings::default();
        sync.synchronous_load = true;
        assert!(base.compute_crc().matches(sync.compute_crc()));

        let mut reseeded = StaticMeshSpawnerSettings::default();
        reseeded.seed = 1;
        assert!(!base.compute_crc().matches(reseeded.compute_crc()));

        let mut forwarding = StaticMeshSpawnerSettings::default();
        forwarding.forward_points = true;
        assert!(!base.compute_crc().matches(forwarding.compute_crc()));

        let mut retargeted = StaticMeshSpawnerSettings::default();
        retargeted.target = TargetOwner::Named("Elsewhere".to_string());
        assert!(!base.compute_crc().matches(retargeted.compute_crc()));
    }
}
