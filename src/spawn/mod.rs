use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use itertools::Itertools;
use log::{debug, info, trace};
use strewn_model::SpawnError;
use strewn_model::attributes::AttributeColumn;
use strewn_model::crc::Crc;
use strewn_model::points::PointBatch;

use crate::cache::ElementCache;
use crate::generate::Generator;
use crate::io::common::loader::{AssetServer, LoadState};
use crate::pool::managed::{PoolResource, ResourceKind};
use crate::scene::{Scene, SceneHandle};
use crate::spawn::context::SpawnContext;
use crate::util::Budget;

pub mod context;
pub mod packing;
pub mod selection;
pub mod skinned_mesh;
pub mod static_mesh;

/// What one scheduling quantum ended with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Out of budget or waiting on loads; call `step` again next quantum.
    Suspended,
    /// Terminal; the context is in `Done` and will not change further.
    Finished,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpawnPhase {
    NotStarted,
    ReuseCheck,
    Preparing,
    AwaitingLoad,
    Populating,
    Aborting,
    Done,
}

/// Where spawned components land: under the generator's own owner, or under a
/// scene object looked up by name at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetOwner {
    #[default]
    Generator,
    Named(String),
}

/// Runs against the target owner once the last list of the last input has been
/// populated. Not called on the reuse fast path or after an abort.
pub type PostSpawnHook = Box<dyn Fn(&mut Scene, SceneHandle) + Send>;

/// Everything external an element needs for one quantum. The budget is
/// per-quantum; callers re-arm it on every `step` call.
pub struct SpawnEnv<'a> {
    pub scene: &'a mut Scene,
    pub generator: &'a mut Generator,
    pub assets: &'a dyn AssetServer,
    pub cache: Option<&'a ElementCache>,
    pub stop: &'a AtomicBool,
    pub budget: Budget,
}

/// A time-sliced spawner. `step` advances the context by at most one budget's
/// worth of work; all progress lives in the context, never on a call stack, so
/// the element itself stays immutable and can drive many executions.
pub trait Element {
    fn step(&self, ctx: &mut SpawnContext, env: &mut SpawnEnv) -> StepOutcome;
}

/// Drives an element to completion in one call, re-arming the budget each
/// quantum. Returns the number of quanta spent. The caller must make sure
/// pending loads can complete without yielding to it (a served catalog or
/// synchronous loading); an element parked on held loads would spin here.
pub fn run_to_completion(element: &dyn Element, ctx: &mut SpawnContext, env: &mut SpawnEnv) -> usize {
    let budget = env.budget;
    let mut quanta = 0;
    loop {
        env.budget = budget;
        quanta += 1;
        debug_assert!(quanta < 100_000, "element makes no progress");
        if element.step(ctx, env) == StepOutcome::Finished {
            return quanta;
        }
    }
}

/// Computes the per-input and element-level identity CRCs and moves the
/// context into `ReuseCheck`. An invalid settings crc disables the element
/// cache outright; the per-input stamps it would gate never match anyway.
pub(crate) fn begin(ctx: &mut SpawnContext, settings_crc: Crc) {
    ctx.settings_crc = settings_crc;
    ctx.input_crcs = ctx.inputs.iter().map(|batch| batch.compute_crc()).collect();
    ctx.element_crc = if settings_crc.is_valid() {
        ctx.input_crcs
            .iter()
            .fold(settings_crc, |crc, input| crc.combine_u32(input.value()))
    } else {
        Crc::INVALID
    };
    ctx.stats.points_seen = ctx.inputs.iter().map(|batch| batch.len()).sum();
    ctx.phase = SpawnPhase::ReuseCheck;
    trace!(
        "spawn begins: {} inputs, settings {:08x}, element {:08x}",
        ctx.inputs.len(),
        ctx.settings_crc.value(),
        ctx.element_crc.value()
    );
}

/// The whole-element fast path plus per-input reuse skipping. All pool probes
/// run before any re-marking so duplicate inputs fold onto the same parked
/// resources instead of the first probe consuming them.
pub(crate) fn reuse_check(ctx: &mut SpawnContext, env: &mut SpawnEnv, kind: ResourceKind, forward: bool) {
    let matched = ctx
        .input_crcs
        .iter()
        .map(|input| env.generator.pool().has_matching(env.scene, kind, ctx.settings_crc, *input))
        .collect_vec();

    if matched.iter().all(|hit| *hit) {
        let cached = if forward {
            env.cache.and_then(|cache| cache.get(ctx.element_crc))
        } else {
            None
        };
        if !forward || cached.is_some() {
            let mut reused = 0;
            for input in &ctx.input_crcs {
                reused += env
                    .generator
                    .pool_mut()
                    .mark_matching_reused(env.scene, kind, ctx.settings_crc, *input);
            }
            ctx.stats.components_reused += reused;
            ctx.stats.inputs_skipped += ctx.inputs.len();
            if let Some(outputs) = cached {
                ctx.outputs = (*outputs).clone();
            }
            debug!("spawn unchanged since last pass, {} resources re-marked", reused);
            ctx.phase = SpawnPhase::Done;
            return;
        }
    } else if !forward {
        // Forwarding needs the per-point selection rebuilt, so individual
        // inputs are only skippable without it.
        for index in 0..ctx.inputs.len() {
            if matched[index] {
                let reused = env.generator.pool_mut().mark_matching_reused(
                    env.scene,
                    kind,
                    ctx.settings_crc,
                    ctx.input_crcs[index],
                );
                ctx.skip_input[index] = true;
                ctx.stats.components_reused += reused;
                ctx.stats.inputs_skipped += 1;
                debug!("input {} unchanged, {} resources re-marked", index, reused);
            }
        }
    }
    ctx.phase = SpawnPhase::Preparing;
}

/// First call gathers every asset path the prepared lists reference and
/// requests loading; later calls poll. Returns readiness. Failed loads are
/// terminal and count as ready; population skips the affected lists.
pub(crate) fn await_loads(ctx: &mut SpawnContext, env: &mut SpawnEnv, synchronous: bool) -> bool {
    if !ctx.loads_requested {
        ctx.pending_loads = ctx
            .prepared
            .iter()
            .flat_map(|input| input.lists.iter())
            .flat_map(|list| list.descriptor.asset_paths())
            .unique()
            .collect_vec();
        ctx.loads_requested = true;
        if ctx.pending_loads.is_empty() {
            return true;
        }
        trace!("requesting {} asset loads", ctx.pending_loads.len());
        return env.assets.request_load(&ctx.pending_loads, !synchronous);
    }
    ctx.pending_loads
        .iter()
        .all(|path| env.assets.load_state(path).is_terminal())
}

/// Soft-releases everything this run touched and terminates the context. Hard
/// releases are reserved for explicit cleanup passes, never for aborts.
pub(crate) fn abort(ctx: &mut SpawnContext, env: &mut SpawnEnv) {
    for id in ctx.touched.iter().copied() {
        if let Some(entry) = env.generator.pool_mut().get_mut(id) {
            entry.release(env.scene, false);
        }
    }
    info!("spawn aborted, {} touched resources parked", ctx.touched.len());
    ctx.acquired.clear();
    ctx.outputs.clear();
    ctx.cancelled = true;
    ctx.phase = SpawnPhase::Done;
}

/// Post-population epilogue: hooks against the resolved target, cache store
/// for forwarded outputs, terminal phase. A target that failed to resolve has
/// already been recorded against every input that needed it, so hooks skip
/// silently here.
pub(crate) fn finish(
    ctx: &mut SpawnContext,
    env: &mut SpawnEnv,
    hooks: &[PostSpawnHook],
    target: &TargetOwner,
    forward: bool,
) {
    if !hooks.is_empty() {
        if let Ok(owner) = resolve_target(env, target) {
            for hook in hooks {
                hook(env.scene, owner);
            }
        }
    }
    if forward && !ctx.outputs.is_empty() {
        if let Some(cache) = env.cache {
            cache.store(ctx.element_crc, Arc::new(ctx.outputs.clone()));
        }
    }
    ctx.phase = SpawnPhase::Done;
    debug!(
        "spawn done: {} created, {} reused, {} instances over {} points",
        ctx.stats.components_created, ctx.stats.components_reused, ctx.stats.instances_spawned, ctx.stats.points_seen
    );
}

/// The generator's own owner, or a named scene object.
pub(crate) fn resolve_target(env: &SpawnEnv, target: &TargetOwner) -> Result<SceneHandle, SpawnError> {
    match target {
        TargetOwner::Generator => Ok(env.generator.owner()),
        TargetOwner::Named(name) => env
            .scene
            .find_by_name(name)
            .ok_or_else(|| SpawnError::UnknownTarget { name: name.clone() }),
    }
}

/// Why a mesh is unavailable after the load phase said it was done.
pub(crate) fn load_failure_reason(state: LoadState) -> String {
    match state {
        LoadState::Failed(reason) => reason,
        LoadState::Unrequested => "never requested".to_string(),
        LoadState::Loading => "still loading".to_string(),
        LoadState::Loaded => "not a mesh".to_string(),
    }
}

/// The forwarded copy of one input: the batch itself plus, when configured, a
/// text column naming the mesh each point ended up with.
pub(crate) fn forwarded_output(batch: &PointBatch, out_attribute: Option<&str>, chosen_paths: &[String]) -> PointBatch {
    let mut output = batch.clone();
    if let Some(name) = out_attribute {
        debug_assert_eq!(chosen_paths.len(), batch.len());
        output.insert_column(name, AttributeColumn::Text(chosen_paths.to_vec()));
    }
    output
}
