use glam::Affine3A;
use log::trace;

pub mod arena;
pub mod instances;

use crate::scene::arena::{ArenaHandle, GenArena};
use crate::scene::instances::MeshInstances;

pub type SceneHandle = ArenaHandle;

#[derive(Debug)]
pub enum ScenePayload {
    /// Owners/actors and plain grouping nodes.
    Group,
    MeshInstances(MeshInstances),
}

#[derive(Debug)]
pub struct SceneObject {
    pub name: String,
    pub transform: Affine3A,
    pub parent: Option<SceneHandle>,
    pub tags: Vec<String>,
    pub transient: bool,
    pub payload: ScenePayload,
}

impl SceneObject {
    pub fn instances(&self) -> Option<&MeshInstances> {
        match &self.payload {
            ScenePayload::MeshInstances(instances) => Some(instances),
            ScenePayload::Group => None,
        }
    }

    pub fn instances_mut(&mut self) -> Option<&mut MeshInstances> {
        match &mut self.payload {
            ScenePayload::MeshInstances(instances) => Some(instances),
            ScenePayload::Group => None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Flat object store standing in for the engine scene. Single-writer by
/// construction (`&mut` everywhere); generational handles take the place of
/// weak object pointers, so "is this still alive" is a generation check
/// rather than a GC question.
#[derive(Debug, Default)]
pub struct Scene {
    objects: GenArena<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Scene::default()
    }

    pub fn create_owner(&mut self, name: impl Into<String>, transform: Affine3A) -> SceneHandle {
        let name = name.into();
        trace!("creating owner {}", name);
        self.objects.insert(SceneObject {
            name,
            transform,
            parent: None,
            tags: Vec::new(),
            transient: false,
            payload: ScenePayload::Group,
        })
    }

    /// Registers a live component under `parent`, anchored to the parent's
    /// current root transform. The parent must be alive.
    pub fn register_component(
        &mut self,
        name: impl Into<String>,
        parent: SceneHandle,
        transient: bool,
        instances: MeshInstances,
    ) -> SceneHandle {
        let transform = self
            .objects
            .get(parent)
            .map(|owner| owner.transform)
            .unwrap_or_else(|| {
                debug_assert!(false, "registering a component under a dead parent");
                Affine3A::IDENTITY
            });

        let name = name.into();
        trace!("registering component {}", name);
        self.objects.insert(SceneObject {
            name,
            transform,
            parent: Some(parent),
            tags: Vec::new(),
            transient,
            payload: ScenePayload::MeshInstances(instances),
        })
    }

    pub fn destroy(&mut self, handle: SceneHandle) -> bool {
        match self.objects.remove(handle) {
            Some(object) => {
                trace!("destroyed {}", object.name);
                true
            }
            None => false,
        }
    }

    pub fn is_valid(&self, handle: SceneHandle) -> bool {
        self.objects.contains(handle)
    }

    pub fn object(&self, handle: SceneHandle) -> Option<&SceneObject> {
        self.objects.get(handle)
    }

    pub fn object_mut(&mut self, handle: SceneHandle) -> Option<&mut SceneObject> {
        self.objects.get_mut(handle)
    }

    pub fn parent_of(&self, handle: SceneHandle) -> Option<SceneHandle> {
        self.objects.get(handle).and_then(|object| object.parent)
    }

    /// Linear lookup; names are the stable identity that survives a
    /// save/load round-trip, unlike handles.
    pub fn find_by_name(&self, name: &str) -> Option<SceneHandle> {
        self.objects
            .iter()
            .find(|(_, object)| object.name == name)
            .map(|(handle, _)| handle)
    }

    /// Re-reads the parent's root transform into the component, as part of
    /// reuse reactivation. Returns false when either side is gone.
    pub fn reanchor(&mut self, handle: SceneHandle) -> bool {
        let Some(parent) = self.parent_of(handle) else {
            return false;
        };
        let Some(anchor) = self.objects.get(parent).map(|owner| owner.transform) else {
            return false;
        };
        match self.objects.get_mut(handle) {
            Some(object) => {
                object.transform = anchor;
                true
            }
            None => false,
        }
    }

    /// Appends tags not already present, preserving order of first
    /// appearance.
    pub fn add_tags(&mut self, handle: SceneHandle, tags: &[String]) {
        if let Some(object) = self.objects.get_mut(handle) {
            for tag in tags {
                if !object.tags.iter().any(|t| t == tag) {
                    object.tags.push(tag.clone());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SceneHandle, &SceneObject)> {
        self.objects.iter()
    }

    /// Total instances across all live components, for pass summaries.
    pub fn instance_count(&self) -> usize {
        self.objects
            .iter()
            .filter_map(|(_, object)| object.instances())
            .map(|instances| instances.instance_count())
            .sum()
    }
}
