use std::sync::Arc;

use glam::Affine3A;
use log::error;
use strewn_model::asset::{Aabb, MeshAsset};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InstanceComponentKind {
    Instanced,
    HierarchicalInstanced,
    Skinned,
    Spline,
}

/// The live rendering object a managed resource wraps: per-instance
/// transforms, the packed custom-float channel and (for skinned components)
/// per-instance bank indices. Population happens exclusively through
/// `append`; `clear` is part of reuse reactivation.
#[derive(Debug)]
pub struct MeshInstances {
    pub kind: InstanceComponentKind,
    pub mesh: Arc<MeshAsset>,
    pub materials: Vec<String>,
    num_custom_floats: u32,
    transforms: Vec<Affine3A>,
    custom_floats: Vec<f32>,
    bank_indices: Vec<u32>,
    bounds: Option<Aabb>,
}

impl MeshInstances {
    pub fn new(kind: InstanceComponentKind, mesh: Arc<MeshAsset>, materials: Vec<String>, num_custom_floats: u32) -> Self {
        MeshInstances {
            kind,
            mesh,
            materials,
            num_custom_floats,
            transforms: Vec::new(),
            custom_floats: Vec::new(),
            bank_indices: Vec::new(),
            bounds: None,
        }
    }

    pub fn num_custom_floats(&self) -> u32 {
        self.num_custom_floats
    }

    /// Reuse reactivation re-applies the channel width after `clear`; doing
    /// so with instance data still present would desync the packed floats.
    pub fn set_num_custom_floats(&mut self, count: u32) {
        debug_assert!(self.transforms.is_empty());
        self.num_custom_floats = count;
    }

    pub fn instance_count(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn transforms(&self) -> &[Affine3A] {
        &self.transforms
    }

    pub fn custom_floats(&self) -> &[f32] {
        &self.custom_floats
    }

    pub fn bank_indices(&self) -> &[u32] {
        &self.bank_indices
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    /// Appends a batch of instances. The float slice must carry
    /// `num_custom_floats` values per transform; mismatches are a programmer
    /// error upstream, so they assert in debug builds and are clamped (pad
    /// with zeroes / truncate) in release builds.
    pub fn append(&mut self, transforms: &[Affine3A], custom_floats: &[f32], bank_indices: Option<&[u32]>) {
        let expected = transforms.len() * self.num_custom_floats as usize;
        debug_assert_eq!(custom_floats.len(), expected);

        self.transforms.extend_from_slice(transforms);
        if custom_floats.len() >= expected {
            self.custom_floats.extend_from_slice(&custom_floats[..expected]);
        } else {
            error!(
                "custom float underrun: got {}, expected {}, padding with zeroes",
                custom_floats.len(),
                expected
            );
            self.custom_floats.extend_from_slice(custom_floats);
            self.custom_floats.extend(std::iter::repeat(0.0).take(expected - custom_floats.len()));
        }

        if self.kind == InstanceComponentKind::Skinned {
            match bank_indices {
                Some(banks) => {
                    debug_assert_eq!(banks.len(), transforms.len());
                    self.bank_indices.extend_from_slice(banks);
                    self.bank_indices.resize(self.transforms.len(), 0);
                }
                None => {
                    debug_assert!(false, "skinned instances appended without bank indices");
                    self.bank_indices.resize(self.transforms.len(), 0);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.transforms.clear();
        self.custom_floats.clear();
        self.bank_indices.clear();
        self.bounds = None;
    }

    /// Recomputes world bounds as the union of every instance's transformed
    /// local box. Called after population, not per append batch.
    pub fn refresh_bounds(&mut self) {
        let local = self.mesh.local_bounds;
        self.bounds = self
            .transforms
            .iter()
            .map(|transform| local.transformed(transform))
            .reduce(Aabb::union);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn cube() -> Arc<MeshAsset> {
        Arc::new(MeshAsset {
            path: "meshes/cube".to_string(),
            local_bounds: Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
            material_slots: 1,
            streaming_lod: false,
            bank_count: 0,
        })
    }

    #[test]
    pub fn append_keeps_floats_parallel() {
        let mut instances = MeshInstances::new(InstanceComponentKind::Instanced, cube(), vec![], 2);
        instances.append(
            &[Affine3A::IDENTITY, Affine3A::from_translation(Vec3::X)],
            &[0.1, 0.2, 0.3, 0.4],
            None,
        );
        assert_eq!(instances.instance_count(), 2);
        assert_eq!(instances.custom_floats(), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    pub fn bounds_cover_all_instances() {
        let mut instances = MeshInstances::new(InstanceComponentKind::Instanced, cube(), vec![], 0);
        instances.append(
            &[
                Affine3A::from_translation(Vec3::new(-4.0, 0.0, 0.0)),
                Affine3A::from_translation(Vec3::new(4.0, 0.0, 0.0)),
            ],
            &[],
            None,
        );
        instances.refresh_bounds();

        let bounds = instances.bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(-5.0, -1.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(5.0, 1.0, 1.0));

        instances.clear();
        assert!(instances.bounds().is_none());
        assert!(instances.is_empty());
    }

    #[test]
    pub fn skinned_instances_carry_banks() {
        let mut instances = MeshInstances::new(InstanceComponentKind::Skinned, cube(), vec![], 0);
        instances.append(&[Affine3A::IDENTITY, Affine3A::IDENTITY], &[], Some(&[1, 3]));
        assert_eq!(instances.bank_indices(), &[1, 3]);
    }
}
