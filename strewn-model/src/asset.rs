use std::hash::{Hash, Hasher};
use std::sync::Arc;

use glam::{Affine3A, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    pub fn union(self, other: Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Axis-aligned bounds of the transformed box, taken over all eight
    /// corners. Conservative under rotation, exact otherwise.
    pub fn transformed(&self, transform: &Affine3A) -> Aabb {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut min = transform.transform_point3(corners[0]);
        let mut max = min;
        for corner in &corners[1..] {
            let point = transform.transform_point3(*corner);
            min = min.min(point);
            max = max.max(point);
        }
        Aabb { min, max }
    }
}

/// What the loader knows about a mesh once it is in memory. `streaming_lod`
/// marks meshes whose LODs stream in on demand, which rules out hierarchical
/// instancing. `bank_count` is zero for plain static meshes.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    pub path: String,
    pub local_bounds: Aabb,
    pub material_slots: u32,
    pub streaming_lod: bool,
    pub bank_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAsset {
    pub path: String,
    pub two_sided: bool,
}

/// Soft reference to a mesh: always carries the path, optionally the loaded
/// asset. Equality and hashing use the path alone, so two descriptors naming
/// the same unresolved path compare equal without any loading, and a resolved
/// copy stays equal to an unresolved one. An empty path is the null reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoftMeshRef {
    path: String,
    #[serde(skip)]
    resolved: Option<Arc<MeshAsset>>,
}

impl SoftMeshRef {
    pub fn new(path: impl Into<String>) -> Self {
        SoftMeshRef {
            path: path.into(),
            resolved: None,
        }
    }

    pub fn none() -> Self {
        SoftMeshRef::default()
    }

    pub fn is_none(&self) -> bool {
        self.path.is_empty()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resolved(&self) -> Option<&Arc<MeshAsset>> {
        self.resolved.as_ref()
    }

    /// Attaches the loaded asset. The loader is responsible for handing over
    /// the asset that actually lives at `path`.
    pub fn resolve_with(&mut self, asset: Arc<MeshAsset>) {
        debug_assert_eq!(asset.path, self.path);
        self.resolved = Some(asset);
    }
}

impl PartialEq for SoftMeshRef {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for SoftMeshRef {}

impl Hash for SoftMeshRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_asset() -> Arc<MeshAsset> {
        Arc::new(MeshAsset {
            path: "meshes/cube".to_string(),
            local_bounds: Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
            material_slots: 1,
            streaming_lod: false,
            bank_count: 0,
        })
    }

    #[test]
    pub fn resolution_does_not_affect_equality() {
        let unresolved = SoftMeshRef::new("meshes/cube");
        let mut resolved = SoftMeshRef::new("meshes/cube");
        resolved.resolve_with(cube_asset());

        assert_eq!(unresolved, resolved);
        assert_ne!(unresolved, SoftMeshRef::new("meshes/rock"));
        assert!(SoftMeshRef::none().is_none());
    }

    #[test]
    pub fn transformed_bounds_cover_translation() {
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = bounds.transformed(&Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(9.0, -1.0, -1.0));
        assert_eq!(moved.max, Vec3::new(11.0, 1.0, 1.0));
    }
}
