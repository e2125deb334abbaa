use glam::Affine3A;
use log::{debug, info};
use strewn_model::SpawnError;
use strewn_model::crc::Crc;
use strewn_model::descriptor::{
    ComponentClass, InstancedMeshDescriptor, SkinnedMeshDescriptor, SplineMeshDescriptor,
};

use crate::pool::managed::{ManagedPayload, PoolResource, ResourceId};
use crate::pool::{DescriptorRef, MatchRequest, ResourcePool};
use crate::scene::instances::{InstanceComponentKind, MeshInstances};
use crate::scene::{Scene, SceneHandle};

pub mod snapshot;

/// Every scene object the generator creates carries this tag.
pub const GENERATED_TAG: &str = "strewn.generated";

/// Outcome of a get-or-create: the component to append into and whether it
/// had to be built this pass.
#[derive(Debug, Copy, Clone)]
pub struct Acquired {
    pub id: ResourceId,
    pub component: SceneHandle,
    pub created: bool,
}

/// The owner is the scene object the component attaches to; it participates
/// in matching, so components never migrate between owners through reuse.
pub struct InstancedMeshRequest<'a> {
    pub owner: SceneHandle,
    pub descriptor: InstancedMeshDescriptor,
    pub settings_crc: Crc,
    pub data_crc: Crc,
    pub allow_descriptor_changes: bool,
    pub transient: bool,
    pub extra_tags: &'a [String],
}

pub struct SkinnedMeshRequest<'a> {
    pub owner: SceneHandle,
    pub descriptor: SkinnedMeshDescriptor,
    pub settings_crc: Crc,
    pub data_crc: Crc,
    pub transient: bool,
    pub extra_tags: &'a [String],
}

pub struct SplineMeshRequest<'a> {
    pub owner: SceneHandle,
    pub descriptor: SplineMeshDescriptor,
    pub settings_crc: Crc,
    pub data_crc: Crc,
    pub transient: bool,
    pub extra_tags: &'a [String],
}

/// Owns the resource pool for one spawning owner and drives the
/// mark-unused / reuse / sweep cycle across generation passes. Components it
/// creates are parented to the request's owner (usually its own owner actor)
/// and named `{generator}.{kind}.{seq}`, a stable identity that snapshots
/// rely on.
pub struct Generator {
    name: String,
    owner: SceneHandle,
    pool: ResourcePool,
    component_seq: u64,
    pass: u64,
}

impl Generator {
    pub fn new(name: impl Into<String>, owner: SceneHandle) -> Self {
        Generator {
            name: name.into(),
            owner,
            pool: ResourcePool::new(),
            component_seq: 0,
            pass: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> SceneHandle {
        self.owner
    }

    pub fn identity_tag(&self) -> String {
        format!("strewn.generator:{}", self.name)
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ResourcePool {
        &mut self.pool
    }

    /// Parks every resource of the previous pass as a reuse candidate.
    /// Returns the new pass number.
    pub fn begin_pass(&mut self) -> u64 {
        self.pass += 1;
        let parked = self.pool.mark_all_unused();
        debug!("{}: pass {} begins, {} resources parked", self.name, self.pass, parked);
        self.pass
    }

    /// Reclaims everything the pass did not claim back. Returns the number of
    /// resources swept.
    pub fn end_pass(&mut self, scene: &mut Scene) -> usize {
        let swept = self.pool.sweep_unused(scene);
        info!(
            "{}: pass {} done, swept {}, pool now {}",
            self.name,
            self.pass,
            swept,
            self.pool.stats(scene)
        );
        swept
    }

    /// Explicit cleanup: hard-releases the whole pool.
    pub fn teardown(&mut self, scene: &mut Scene) -> usize {
        let released = self.pool.release_all(scene);
        info!("{}: teardown released {} resources", self.name, released);
        released
    }

    /// Claims a resource the caller tracked across passes (target actors,
    /// mostly). Returns whether the resource is used afterwards.
    pub fn mark_used(&mut self, scene: &mut Scene, id: ResourceId) -> bool {
        match self.pool.get_mut(id) {
            Some(entry) => {
                entry.mark_as_used(scene);
                entry.is_used()
            }
            None => false,
        }
    }

    /// Get-or-create for instanced meshes: reuse a parked matching component
    /// if one exists, otherwise build one. A resource claimed earlier in the
    /// same pass never matches again; callers that can hit the same key twice
    /// per pass accumulate through the handle they got the first time.
    pub fn get_or_create_instanced_mesh(
        &mut self,
        scene: &mut Scene,
        mut request: InstancedMeshRequest,
    ) -> Result<Acquired, SpawnError> {
        let Some(mesh) = request.descriptor.mesh.resolved().cloned() else {
            return Err(SpawnError::MissingMesh);
        };
        if request.allow_descriptor_changes {
            request.descriptor.normalize();
        }
        let tags = self.collect_tags(&request.descriptor.tags, request.extra_tags);

        let matched = self.pool.find_match(
            scene,
            &MatchRequest {
                owner: request.owner,
                descriptor: DescriptorRef::Instanced(&request.descriptor),
                settings_crc: request.settings_crc,
                data_crc: request.data_crc,
                num_custom_floats: request.descriptor.num_custom_floats,
                transient: request.transient,
            },
        );
        if let Some(acquired) = self.reclaim(scene, matched, &tags) {
            return Ok(acquired);
        }

        let seq = self.next_seq();
        let name = format!("{}.ism.{}", self.name, seq);
        let kind = match request.descriptor.component_class {
            ComponentClass::Instanced => InstanceComponentKind::Instanced,
            ComponentClass::HierarchicalInstanced => InstanceComponentKind::HierarchicalInstanced,
        };
        let instances = MeshInstances::new(
            kind,
            mesh,
            request.descriptor.materials.clone(),
            request.descriptor.num_custom_floats,
        );
        let component = scene.register_component(&name, request.owner, request.transient, instances);
        scene.add_tags(component, &tags);
        let id = self.pool.register(
            request.settings_crc,
            request.data_crc,
            ManagedPayload::InstancedMesh {
                descriptor: request.descriptor,
                component,
            },
        );
        debug!("{}: created {} as {:?}", self.name, name, id);
        Ok(Acquired {
            id,
            component,
            created: true,
        })
    }

    pub fn get_or_create_skinned_mesh(
        &mut self,
        scene: &mut Scene,
        request: SkinnedMeshRequest,
    ) -> Result<Acquired, SpawnError> {
        let Some(mesh) = request.descriptor.mesh.resolved().cloned() else {
            return Err(SpawnError::MissingMesh);
        };
        let tags = self.collect_tags(&request.descriptor.tags, request.extra_tags);

        let matched = self.pool.find_match(
            scene,
            &MatchRequest {
                owner: request.owner,
                descriptor: DescriptorRef::Skinned(&request.descriptor),
                settings_crc: request.settings_crc,
                data_crc: request.data_crc,
                num_custom_floats: request.descriptor.num_custom_floats,
                transient: request.transient,
            },
        );
        if let Some(acquired) = self.reclaim(scene, matched, &tags) {
            return Ok(acquired);
        }

        let seq = self.next_seq();
        let name = format!("{}.skm.{}", self.name, seq);
        let instances = MeshInstances::new(
            InstanceComponentKind::Skinned,
            mesh,
            request.descriptor.materials.clone(),
            request.descriptor.num_custom_floats,
        );
        let component = scene.register_component(&name, request.owner, request.transient, instances);
        scene.add_tags(component, &tags);
        let id = self.pool.register(
            request.settings_crc,
            request.data_crc,
            ManagedPayload::SkinnedMesh {
                descriptor: request.descriptor,
                component,
            },
        );
        debug!("{}: created {} as {:?}", self.name, name, id);
        Ok(Acquired {
            id,
            component,
            created: true,
        })
    }

    /// Splines share the pool lifecycle but have no spawner element; callers
    /// drive this directly.
    pub fn get_or_create_spline_mesh(
        &mut self,
        scene: &mut Scene,
        request: SplineMeshRequest,
    ) -> Result<Acquired, SpawnError> {
        let Some(mesh) = request.descriptor.mesh.resolved().cloned() else {
            return Err(SpawnError::MissingMesh);
        };
        let tags = self.collect_tags(&request.descriptor.tags, request.extra_tags);

        let matched = self.pool.find_match(
            scene,
            &MatchRequest {
                owner: request.owner,
                descriptor: DescriptorRef::Spline(&request.descriptor),
                settings_crc: request.settings_crc,
                data_crc: request.data_crc,
                num_custom_floats: 0,
                transient: request.transient,
            },
        );
        if let Some(acquired) = self.reclaim(scene, matched, &tags) {
            return Ok(acquired);
        }

        let seq = self.next_seq();
        let name = format!("{}.spm.{}", self.name, seq);
        let instances = MeshInstances::new(InstanceComponentKind::Spline, mesh, Vec::new(), 0);
        let component = scene.register_component(&name, request.owner, request.transient, instances);
        scene.add_tags(component, &tags);
        let id = self.pool.register(
            request.settings_crc,
            request.data_crc,
            ManagedPayload::SplineMesh {
                descriptor: request.descriptor,
                component,
            },
        );
        debug!("{}: created {} as {:?}", self.name, name, id);
        Ok(Acquired {
            id,
            component,
            created: true,
        })
    }

    /// Spawns an owner actor that lives and dies with the pool, like the
    /// components do.
    pub fn create_target_actor(
        &mut self,
        scene: &mut Scene,
        name: impl Into<String>,
        transform: Affine3A,
    ) -> (ResourceId, SceneHandle) {
        let actor = scene.create_owner(name, transform);
        let id = self.adopt_actors(scene, vec![actor]);
        (id, actor)
    }

    /// Puts externally spawned actors under pool management. Actor resources
    /// carry no crc stamp and are never reuse-matched; they survive a pass
    /// only when explicitly claimed via `mark_used`.
    pub fn adopt_actors(&mut self, scene: &mut Scene, actors: Vec<SceneHandle>) -> ResourceId {
        let tags = self.collect_tags(&[], &[]);
        for actor in &actors {
            scene.add_tags(*actor, &tags);
        }
        self.pool.register(Crc::INVALID, Crc::INVALID, ManagedPayload::Actors { actors })
    }

    fn reclaim(&mut self, scene: &mut Scene, matched: Option<ResourceId>, tags: &[String]) -> Option<Acquired> {
        let id = matched?;
        let entry = self.pool.get_mut(id)?;
        entry.mark_as_used(scene);
        let component = entry.payload().component()?;
        scene.add_tags(component, tags);
        debug!("{}: reusing {:?}", self.name, id);
        Some(Acquired {
            id,
            component,
            created: false,
        })
    }

    fn collect_tags(&self, descriptor_tags: &[String], extra_tags: &[String]) -> Vec<String> {
        let mut tags = vec![GENERATED_TAG.to_string(), self.identity_tag()];
        tags.extend(descriptor_tags.iter().cloned());
        tags.extend(extra_tags.iter().cloned());
        tags
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.component_seq;
        self.component_seq += 1;
        seq
    }

    /// Restored components already occupy names up to `seq`; new ones must
    /// not collide with them.
    pub(crate) fn bump_seq_past(&mut self, seq: u64) {
        self.component_seq = self.component_seq.max(seq + 1);
    }
}
