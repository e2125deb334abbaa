use std::collections::HashMap;

use log::{error, warn};
use strewn_model::SpawnError;
use strewn_model::crc::Crc;
use strewn_model::points::PointBatch;

use crate::generate::Acquired;
use crate::pool::managed::ResourceId;
use crate::scene::SceneHandle;
use crate::spawn::SpawnPhase;
use crate::spawn::selection::InstanceList;

/// An error recorded during execution, attributed to the input batch it
/// occurred on (`None` for errors outside any single input).
#[derive(Debug)]
pub struct RecordedError {
    pub input: Option<usize>,
    pub error: SpawnError,
}

/// Counters accumulated over one full execution, for the completion log and
/// for assertions in tests.
#[derive(Debug, Default, Copy, Clone)]
pub struct SpawnStats {
    pub steps: usize,
    pub points_seen: usize,
    pub instances_spawned: usize,
    pub components_created: usize,
    pub components_reused: usize,
    pub inputs_skipped: usize,
}

/// One input batch after selection and packing, waiting to be populated.
pub(crate) struct PreparedInput {
    pub input_index: usize,
    pub target: SceneHandle,
    pub lists: Vec<InstanceList>,
    pub chosen_paths: Vec<String>,
}

/// Per-pass get-or-create key. Two lists carrying the same key must append
/// into the same component; the acquired map guarantees that, because a
/// resource claimed earlier in the pass no longer matches in the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AcquireKey {
    pub settings_crc: u32,
    pub data_crc: u32,
    pub descriptor_crc: u32,
}

/// All progress state of one element execution. A resumed `step` picks up
/// from the cursors kept here; nothing survives on a call stack across a
/// suspension.
pub struct SpawnContext {
    pub(crate) phase: SpawnPhase,
    pub(crate) inputs: Vec<PointBatch>,
    pub(crate) settings_crc: Crc,
    pub(crate) element_crc: Crc,
    pub(crate) input_crcs: Vec<Crc>,
    pub(crate) skip_input: Vec<bool>,
    pub(crate) prepared: Vec<PreparedInput>,
    pub(crate) prepare_cursor: usize,
    pub(crate) populate_cursor: (usize, usize),
    pub(crate) pending_loads: Vec<String>,
    pub(crate) loads_requested: bool,
    pub(crate) acquired: HashMap<AcquireKey, Acquired>,
    pub(crate) touched: Vec<ResourceId>,
    pub(crate) errors: Vec<RecordedError>,
    pub(crate) outputs: Vec<PointBatch>,
    pub(crate) cancelled: bool,
    pub(crate) stats: SpawnStats,
}

impl SpawnContext {
    pub fn new(inputs: Vec<PointBatch>) -> Self {
        let count = inputs.len();
        SpawnContext {
            phase: SpawnPhase::NotStarted,
            inputs,
            settings_crc: Crc::INVALID,
            element_crc: Crc::INVALID,
            input_crcs: Vec::new(),
            skip_input: vec![false; count],
            prepared: Vec::new(),
            prepare_cursor: 0,
            populate_cursor: (0, 0),
            pending_loads: Vec::new(),
            loads_requested: false,
            acquired: HashMap::new(),
            touched: Vec::new(),
            errors: Vec::new(),
            outputs: Vec::new(),
            cancelled: false,
            stats: SpawnStats::default(),
        }
    }

    pub fn phase(&self) -> SpawnPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == SpawnPhase::Done
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    /// Forwarded output batches, one per input, in input order. Empty unless
    /// the element was configured to forward points.
    pub fn outputs(&self) -> &[PointBatch] {
        &self.outputs
    }

    pub fn take_outputs(&mut self) -> Vec<PointBatch> {
        std::mem::take(&mut self.outputs)
    }

    pub fn stats(&self) -> SpawnStats {
        self.stats
    }

    /// Every resource id this execution acquired, in acquisition order. The
    /// abort path releases exactly these.
    pub fn touched(&self) -> &[ResourceId] {
        &self.touched
    }

    /// Errors are recorded here, never raised across a phase boundary.
    /// Structural errors and load failures hit the error register; plain
    /// misconfiguration is a warning, matching how both merely skip a unit.
    pub(crate) fn record_error(&mut self, input: Option<usize>, error: SpawnError) {
        let location = match input {
            Some(index) => format!("input {}", index),
            None => "element".to_string(),
        };
        if error.is_structural() || matches!(error, SpawnError::LoadFailed { .. }) {
            error!("{}: {}", location, error);
        } else {
            warn!("{}: {}", location, error);
        }
        self.errors.push(RecordedError { input, error });
    }
}
