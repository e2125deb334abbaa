use std::fmt::{Display, Formatter};

use log::trace;
use strewn_model::crc::Crc;
use strewn_model::descriptor::{InstancedMeshDescriptor, SkinnedMeshDescriptor, SplineMeshDescriptor};

use crate::pool::managed::{ManagedPayload, ManagedResource, PoolResource, ResourceId, ResourceKind, ResourceState};
use crate::scene::{Scene, SceneHandle};

pub mod managed;

/// Borrowed view over the concrete descriptor kinds so a match can be phrased
/// without cloning the descriptor.
#[derive(Copy, Clone)]
pub enum DescriptorRef<'a> {
    Instanced(&'a InstancedMeshDescriptor),
    Skinned(&'a SkinnedMeshDescriptor),
    Spline(&'a SplineMeshDescriptor),
}

impl DescriptorRef<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DescriptorRef::Instanced(_) => ResourceKind::InstancedMesh,
            DescriptorRef::Skinned(_) => ResourceKind::SkinnedMesh,
            DescriptorRef::Spline(_) => ResourceKind::SplineMesh,
        }
    }

    fn equals_payload(&self, payload: &ManagedPayload) -> bool {
        match (self, payload) {
            (DescriptorRef::Instanced(lhs), ManagedPayload::InstancedMesh { descriptor, .. }) => *lhs == descriptor,
            (DescriptorRef::Skinned(lhs), ManagedPayload::SkinnedMesh { descriptor, .. }) => *lhs == descriptor,
            (DescriptorRef::Spline(lhs), ManagedPayload::SplineMesh { descriptor, .. }) => *lhs == descriptor,
            _ => false,
        }
    }
}

/// Everything a caller must pin down for `find_match`. Owner, float width and
/// the transient flag all participate so a match is a drop-in replacement for
/// the component the caller would otherwise build.
pub struct MatchRequest<'a> {
    pub owner: SceneHandle,
    pub descriptor: DescriptorRef<'a>,
    pub settings_crc: Crc,
    pub data_crc: Crc,
    pub num_custom_floats: u32,
    pub transient: bool,
}

#[derive(Debug, Default, Copy, Clone)]
pub struct PoolStats {
    pub total: usize,
    pub used: usize,
    pub marked_unused: usize,
    pub instances: usize,
}

impl Display for PoolStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} resources ({} used, {} parked), {} instances",
            self.total, self.used, self.marked_unused, self.instances
        )
    }
}

/// Insertion-ordered registry of managed resources. Matching is a linear scan
/// and the first hit wins; removed entries are erased, not tombstoned, so the
/// pool never accumulates dead weight between passes.
#[derive(Default)]
pub struct ResourcePool {
    entries: Vec<ManagedResource>,
    next_id: u64,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, settings_crc: Crc, data_crc: Crc, payload: ManagedPayload) -> ResourceId {
        debug_assert!(
            payload
                .component()
                .map(|handle| !self.entries.iter().any(|entry| entry.is_managing(handle)))
                .unwrap_or(true),
            "scene object is already managed by another pool entry"
        );
        let id = ResourceId::new(self.next_id);
        self.next_id += 1;
        trace!("pool: registering {:?} as {:?}", id, payload.kind());
        self.entries.push(ManagedResource::new(id, settings_crc, data_crc, payload));
        id
    }

    /// Entries rebuilt from a snapshot start parked so the next pass can
    /// claim them through the regular matching path.
    pub(crate) fn register_restored(&mut self, settings_crc: Crc, data_crc: Crc, payload: ManagedPayload) -> ResourceId {
        let id = self.register(settings_crc, data_crc, payload);
        if let Some(entry) = self.get_mut(id) {
            entry.set_state(ResourceState::MarkedUnused);
        }
        id
    }

    pub fn get(&self, id: ResourceId) -> Option<&ManagedResource> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut ManagedResource> {
        self.entries.iter_mut().find(|entry| entry.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedResource> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First parked entry that could stand in for the requested component.
    /// Requests without a valid settings crc never match; a request with an
    /// invalid data crc accepts any stamp, a valid one narrows to it.
    pub fn find_match(&self, scene: &Scene, request: &MatchRequest) -> Option<ResourceId> {
        if !request.settings_crc.is_valid() {
            return None;
        }
        let kind = request.descriptor.kind();
        self.entries
            .iter()
            .find(|entry| {
                if !entry.can_be_used() || !entry.is_marked_unused() || entry.kind() != kind {
                    return false;
                }
                if !entry.settings_crc().matches(request.settings_crc) {
                    return false;
                }
                if request.data_crc.is_valid() && !entry.data_crc().matches(request.data_crc) {
                    return false;
                }
                if !request.descriptor.equals_payload(entry.payload()) {
                    return false;
                }
                let Some(component) = entry.payload().component() else {
                    return false;
                };
                let Some(object) = scene.object(component) else {
                    return false;
                };
                if scene.parent_of(component) != Some(request.owner) || object.transient != request.transient {
                    return false;
                }
                object
                    .instances()
                    .map(|instances| instances.num_custom_floats() == request.num_custom_floats)
                    .unwrap_or(false)
            })
            .map(|entry| entry.id())
    }

    pub fn has_matching(&self, scene: &Scene, kind: ResourceKind, settings_crc: Crc, data_crc: Crc) -> bool {
        self.entries
            .iter()
            .any(|entry| reusable(entry, scene, kind, settings_crc, data_crc))
    }

    /// Flips every parked entry stamped with the given crcs back to used
    /// without clearing its content. Returns how many were flipped.
    pub fn mark_matching_reused(
        &mut self,
        scene: &mut Scene,
        kind: ResourceKind,
        settings_crc: Crc,
        data_crc: Crc,
    ) -> usize {
        let mut marked = 0;
        for index in 0..self.entries.len() {
            if reusable(&self.entries[index], scene, kind, settings_crc, data_crc) {
                self.entries[index].mark_as_reused(scene);
                marked += 1;
            }
        }
        marked
    }

    /// Pass begin: everything currently used becomes a reuse candidate.
    pub fn mark_all_unused(&mut self) -> usize {
        let mut marked = 0;
        for entry in &mut self.entries {
            if entry.state() == ResourceState::Used {
                entry.set_state(ResourceState::MarkedUnused);
                marked += 1;
            }
        }
        marked
    }

    /// Pass end: destroy and erase everything still parked, externally gone or
    /// empty. Returns the number of entries reclaimed.
    pub fn sweep_unused(&mut self, scene: &mut Scene) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(|entry| !entry.release_if_unused(scene));
        before - self.entries.len()
    }

    pub fn release_all(&mut self, scene: &mut Scene) -> usize {
        let released = self.entries.len();
        for entry in &mut self.entries {
            entry.release(scene, true);
        }
        self.entries.clear();
        released
    }

    pub fn stats(&self, scene: &Scene) -> PoolStats {
        let mut stats = PoolStats::default();
        for entry in &self.entries {
            stats.total += 1;
            match entry.state() {
                ResourceState::Used => stats.used += 1,
                ResourceState::MarkedUnused => stats.marked_unused += 1,
                ResourceState::Released => {}
            }
            if let Some(instances) = entry
                .payload()
                .component()
                .and_then(|component| scene.object(component))
                .and_then(|object| object.instances())
            {
                stats.instances += instances.instance_count();
            }
        }
        stats
    }
}

fn reusable(entry: &ManagedResource, scene: &Scene, kind: ResourceKind, settings_crc: Crc, data_crc: Crc) -> bool {
    entry.can_be_used()
        && entry.is_marked_unused()
        && entry.kind() == kind
        && entry.settings_crc().matches(settings_crc)
        && entry.data_crc().matches(data_crc)
        && !entry.live_is_gone(scene)
}
