use log::{trace, warn};
use strewn_model::crc::Crc;
use strewn_model::descriptor::{InstancedMeshDescriptor, SkinnedMeshDescriptor, SplineMeshDescriptor};

use crate::scene::{Scene, SceneHandle};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn new(raw: u64) -> Self {
        ResourceId(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    InstancedMesh,
    SkinnedMesh,
    SplineMesh,
    Actors,
}

/// What a managed resource actually wraps. Each variant owns its descriptor
/// by value; the pool, not the scene, is the owner of record for the wrapper.
#[derive(Debug)]
pub enum ManagedPayload {
    InstancedMesh {
        descriptor: InstancedMeshDescriptor,
        component: SceneHandle,
    },
    SkinnedMesh {
        descriptor: SkinnedMeshDescriptor,
        component: SceneHandle,
    },
    SplineMesh {
        descriptor: SplineMeshDescriptor,
        component: SceneHandle,
    },
    Actors {
        actors: Vec<SceneHandle>,
    },
}

impl ManagedPayload {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedPayload::InstancedMesh { .. } => ResourceKind::InstancedMesh,
            ManagedPayload::SkinnedMesh { .. } => ResourceKind::SkinnedMesh,
            ManagedPayload::SplineMesh { .. } => ResourceKind::SplineMesh,
            ManagedPayload::Actors { .. } => ResourceKind::Actors,
        }
    }

    pub fn component(&self) -> Option<SceneHandle> {
        match self {
            ManagedPayload::InstancedMesh { component, .. }
            | ManagedPayload::SkinnedMesh { component, .. }
            | ManagedPayload::SplineMesh { component, .. } => Some(*component),
            ManagedPayload::Actors { .. } => None,
        }
    }

    fn num_custom_floats(&self) -> u32 {
        match self {
            ManagedPayload::InstancedMesh { descriptor, .. } => descriptor.num_custom_floats,
            ManagedPayload::SkinnedMesh { descriptor, .. } => descriptor.num_custom_floats,
            ManagedPayload::SplineMesh { .. } | ManagedPayload::Actors { .. } => 0,
        }
    }
}

/// `Used` → `MarkedUnused` → `Released` is the only forward direction;
/// marking used again is the one legal way back, and `Released` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceState {
    Used,
    MarkedUnused,
    Released,
}

/// The lifecycle surface the pool and the generator drive. Every resource
/// kind answers these uniformly; the payload decides what reactivation and
/// destruction mean for it.
pub trait PoolResource {
    fn can_be_used(&self) -> bool;
    fn is_marked_unused(&self) -> bool;
    fn mark_as_used(&mut self, scene: &mut Scene);
    fn mark_as_reused(&mut self, scene: &mut Scene);
    fn release(&mut self, scene: &mut Scene, hard: bool);
    fn release_if_unused(&mut self, scene: &mut Scene) -> bool;
    fn is_managing(&self, handle: SceneHandle) -> bool;
}

#[derive(Debug)]
pub struct ManagedResource {
    id: ResourceId,
    settings_crc: Crc,
    data_crc: Crc,
    state: ResourceState,
    can_be_used: bool,
    payload: ManagedPayload,
}

impl ManagedResource {
    pub(crate) fn new(id: ResourceId, settings_crc: Crc, data_crc: Crc, payload: ManagedPayload) -> Self {
        ManagedResource {
            id,
            settings_crc,
            data_crc,
            // Construction is use.
            state: ResourceState::Used,
            can_be_used: true,
            payload,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.payload.kind()
    }

    pub fn settings_crc(&self) -> Crc {
        self.settings_crc
    }

    pub fn data_crc(&self) -> Crc {
        self.data_crc
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn payload(&self) -> &ManagedPayload {
        &self.payload
    }

    /// Preview-loaded resources must not be handed out by the matcher; they
    /// are still swept like everything else.
    pub fn set_can_be_used(&mut self, can_be_used: bool) {
        self.can_be_used = can_be_used;
    }

    pub(crate) fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    pub fn is_used(&self) -> bool {
        self.state == ResourceState::Used
    }

    /// True when the wrapped scene objects hold no content (or are gone
    /// entirely). An empty component is dead weight even while "used".
    pub fn live_is_empty(&self, scene: &Scene) -> bool {
        match &self.payload {
            ManagedPayload::InstancedMesh { component, .. }
            | ManagedPayload::SkinnedMesh { component, .. }
            | ManagedPayload::SplineMesh { component, .. } => scene
                .object(*component)
                .and_then(|object| object.instances())
                .map(|instances| instances.is_empty())
                .unwrap_or(true),
            ManagedPayload::Actors { actors } => !actors.iter().any(|actor| scene.is_valid(*actor)),
        }
    }

    pub(crate) fn live_is_gone(&self, scene: &Scene) -> bool {
        match &self.payload {
            ManagedPayload::InstancedMesh { component, .. }
            | ManagedPayload::SkinnedMesh { component, .. }
            | ManagedPayload::SplineMesh { component, .. } => !scene.is_valid(*component),
            ManagedPayload::Actors { actors } => !actors.iter().any(|actor| scene.is_valid(*actor)),
        }
    }

    /// Reactivation: pull the component back onto the owner's current root.
    /// A missing owner is logged and tolerated; the component keeps its old
    /// anchor. On first use after a reuse match the stale content is cleared
    /// and the channel width re-applied; `mark_as_reused` skips that part.
    fn reactivate(&mut self, scene: &mut Scene, first_use_init: bool) {
        let Some(component) = self.payload.component() else {
            return;
        };
        if !scene.reanchor(component) {
            warn!("resource {:?} could not re-anchor, owner is gone", self.id);
        }
        if first_use_init {
            let floats = self.payload.num_custom_floats();
            if let Some(instances) = scene.object_mut(component).and_then(|object| object.instances_mut()) {
                instances.clear();
                instances.set_num_custom_floats(floats);
            }
        }
    }

    fn destroy(&mut self, scene: &mut Scene) {
        match &self.payload {
            ManagedPayload::InstancedMesh { component, .. }
            | ManagedPayload::SkinnedMesh { component, .. }
            | ManagedPayload::SplineMesh { component, .. } => {
                scene.destroy(*component);
            }
            ManagedPayload::Actors { actors } => {
                for actor in actors {
                    scene.destroy(*actor);
                }
            }
        }
        trace!("released resource {:?}", self.id);
        self.state = ResourceState::Released;
    }
}

impl PoolResource for ManagedResource {
    fn can_be_used(&self) -> bool {
        self.can_be_used
    }

    fn is_marked_unused(&self) -> bool {
        self.state == ResourceState::MarkedUnused
    }

    fn mark_as_used(&mut self, scene: &mut Scene) {
        if self.state != ResourceState::MarkedUnused {
            return;
        }
        self.state = ResourceState::Used;
        self.reactivate(scene, true);
    }

    fn mark_as_reused(&mut self, scene: &mut Scene) {
        if self.state != ResourceState::MarkedUnused {
            return;
        }
        self.state = ResourceState::Used;
        self.reactivate(scene, false);
    }

    fn release(&mut self, scene: &mut Scene, hard: bool) {
        if hard {
            self.destroy(scene);
        } else if self.state != ResourceState::Released {
            // Soft release parks the resource for a later match or sweep.
            self.state = ResourceState::MarkedUnused;
        }
    }

    fn release_if_unused(&mut self, scene: &mut Scene) -> bool {
        if self.is_marked_unused() || self.live_is_gone(scene) || self.live_is_empty(scene) {
            self.destroy(scene);
            return true;
        }
        false
    }

    fn is_managing(&self, handle: SceneHandle) -> bool {
        match &self.payload {
            ManagedPayload::InstancedMesh { component, .. }
            | ManagedPayload::SkinnedMesh { component, .. }
            | ManagedPayload::SplineMesh { component, .. } => *component == handle,
            ManagedPayload::Actors { actors } => actors.contains(&handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Affine3A, Vec3};
    use strewn_model::asset::{Aabb, MeshAsset};

    use super::*;
    use crate::scene::instances::{InstanceComponentKind, MeshInstances};

    fn cube() -> Arc<MeshAsset> {
        Arc::new(MeshAsset {
            path: "meshes/cube".to_string(),
            local_bounds: Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
            material_slots: 1,
            streaming_lod: false,
            bank_count: 0,
        })
    }

    fn resource_in(scene: &mut Scene) -> (ManagedResource, SceneHandle, SceneHandle) {
        let owner = scene.create_owner("Root", Affine3A::IDENTITY);
        let component = scene.register_component(
            "Root.ism.0",
            owner,
            false,
            MeshInstances::new(InstanceComponentKind::Instanced, cube(), vec![], 1),
        );
        let resource = ManagedResource::new(
            ResourceId::new(0),
            Crc::from_value(1),
            Crc::INVALID,
            ManagedPayload::InstancedMesh {
                descriptor: InstancedMeshDescriptor::for_mesh("meshes/cube"),
                component,
            },
        );
        (resource, owner, component)
    }

    fn populate(scene: &mut Scene, component: SceneHandle) {
        scene
            .object_mut(component)
            .unwrap()
            .instances_mut()
            .unwrap()
            .append(&[Affine3A::IDENTITY], &[0.5], None);
    }

    #[test]
    pub fn construction_counts_as_use() {
        let mut scene = Scene::new();
        let (resource, _, _) = resource_in(&mut scene);
        assert_eq!(resource.state(), ResourceState::Used);
        assert!(!resource.is_marked_unused());
    }

    #[test]
    pub fn mark_as_used_clears_stale_content() {
        let mut scene = Scene::new();
        let (mut resource, owner, component) = resource_in(&mut scene);
        populate(&mut scene, component);

        resource.release(&mut scene, false);
        assert!(resource.is_marked_unused());
        // Soft release keeps the live object and its content.
        assert_eq!(scene.object(component).unwrap().instances().unwrap().instance_count(), 1);

        scene.object_mut(owner).unwrap().transform = Affine3A::from_translation(Vec3::Y);
        resource.mark_as_used(&mut scene);
        assert_eq!(resource.state(), ResourceState::Used);

        let object = scene.object(component).unwrap();
        // Re-anchored and cleared for repopulation.
        assert_eq!(object.transform, Affine3A::from_translation(Vec3::Y));
        assert_eq!(object.instances().unwrap().instance_count(), 0);
    }

    #[test]
    pub fn mark_as_reused_keeps_content() {
        let mut scene = Scene::new();
        let (mut resource, _, component) = resource_in(&mut scene);
        populate(&mut scene, component);

        resource.release(&mut scene, false);
        resource.mark_as_reused(&mut scene);
        assert_eq!(resource.state(), ResourceState::Used);
        assert_eq!(scene.object(component).unwrap().instances().unwrap().instance_count(), 1);
    }

    #[test]
    pub fn marking_a_used_resource_is_a_no_op() {
        let mut scene = Scene::new();
        let (mut resource, _, component) = resource_in(&mut scene);
        populate(&mut scene, component);

        // Already used; no reactivation, no clearing.
        resource.mark_as_used(&mut scene);
        assert_eq!(scene.object(component).unwrap().instances().unwrap().instance_count(), 1);
    }

    #[test]
    pub fn release_if_unused_reclaims_marked_resources() {
        let mut scene = Scene::new();
        let (mut resource, _, component) = resource_in(&mut scene);
        populate(&mut scene, component);

        assert!(!resource.release_if_unused(&mut scene));

        resource.release(&mut scene, false);
        assert!(resource.release_if_unused(&mut scene));
        assert_eq!(resource.state(), ResourceState::Released);
        assert!(!scene.is_valid(component));
    }

    #[test]
    pub fn release_if_unused_reclaims_empty_components_even_while_used() {
        let mut scene = Scene::new();
        let (mut resource, _, component) = resource_in(&mut scene);

        assert_eq!(resource.state(), ResourceState::Used);
        assert!(resource.release_if_unused(&mut scene));
        assert!(!scene.is_valid(component));
    }

    #[test]
    pub fn hard_release_destroys_immediately() {
        let mut scene = Scene::new();
        let (mut resource, _, component) = resource_in(&mut scene);
        populate(&mut scene, component);

        resource.release(&mut scene, true);
        assert_eq!(resource.state(), ResourceState::Released);
        assert!(!scene.is_valid(component));

        // Terminal: soft release afterwards does not resurrect it.
        resource.release(&mut scene, false);
        assert_eq!(resource.state(), ResourceState::Released);
    }

    #[test]
    pub fn actors_payload_sweeps_with_its_actors() {
        let mut scene = Scene::new();
        let actor = scene.create_owner("Spawned", Affine3A::IDENTITY);
        let mut resource = ManagedResource::new(
            ResourceId::new(1),
            Crc::from_value(2),
            Crc::INVALID,
            ManagedPayload::Actors { actors: vec![actor] },
        );

        assert!(resource.is_managing(actor));
        assert!(!resource.release_if_unused(&mut scene));

        scene.destroy(actor);
        // All managed actors gone: the wrapper is reclaimable.
        assert!(resource.release_if_unused(&mut scene));
    }
}
