use std::collections::HashMap;

use glam::Affine3A;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strewn_model::SpawnError;
use strewn_model::asset::SoftMeshRef;
use strewn_model::crc::Crc;
use strewn_model::descriptor::{InstancedMeshDescriptor, SkinnedMeshDescriptor};
use strewn_model::points::PointBatch;

use crate::pool::managed::ResourceKind;

/// One selectable descriptor and its relative weight. Zero-weight entries are
/// legal and never drawn.
#[derive(Debug, Clone)]
pub struct WeightedEntry {
    pub descriptor: InstancedMeshDescriptor,
    pub weight: u32,
}

/// How the static-mesh element decides which mesh each point gets.
#[derive(Debug, Clone)]
pub enum MeshSelector {
    /// A per-point text column carries the mesh path; the template provides
    /// everything else (materials, flags, tags).
    ByAttribute {
        attribute: String,
        template: InstancedMeshDescriptor,
    },
    /// Deterministic weighted draw per point, keyed on the element seed and
    /// the point seed.
    Weighted { entries: Vec<WeightedEntry> },
}

impl MeshSelector {
    /// Folds the selector configuration into a running settings crc.
    pub(crate) fn combine_into(&self, crc: Crc) -> Crc {
        match self {
            MeshSelector::ByAttribute { attribute, template } => crc
                .combine_bytes(&[0])
                .combine_str(attribute)
                .combine_u32(template.compute_crc().value()),
            MeshSelector::Weighted { entries } => {
                let mut crc = crc.combine_bytes(&[1]).combine_u32(entries.len() as u32);
                for entry in entries {
                    crc = crc
                        .combine_u32(entry.descriptor.compute_crc().value())
                        .combine_u32(entry.weight);
                }
                crc
            }
        }
    }
}

/// Descriptor attached to an instance list. Wrapping both concrete kinds here
/// keeps the list, packing and population plumbing shared between the
/// elements.
#[derive(Debug, Clone)]
pub enum ListDescriptor {
    Instanced(InstancedMeshDescriptor),
    Skinned(SkinnedMeshDescriptor),
}

impl Default for ListDescriptor {
    fn default() -> Self {
        ListDescriptor::Instanced(InstancedMeshDescriptor::default())
    }
}

impl ListDescriptor {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ListDescriptor::Instanced(_) => ResourceKind::InstancedMesh,
            ListDescriptor::Skinned(_) => ResourceKind::SkinnedMesh,
        }
    }

    pub fn mesh_path(&self) -> &str {
        match self {
            ListDescriptor::Instanced(descriptor) => descriptor.mesh.path(),
            ListDescriptor::Skinned(descriptor) => descriptor.mesh.path(),
        }
    }

    /// Every asset path population will need loaded: the mesh, material
    /// overrides and, for skinned lists, the animation banks.
    pub fn asset_paths(&self) -> Vec<String> {
        let mut paths = vec![self.mesh_path().to_string()];
        match self {
            ListDescriptor::Instanced(descriptor) => {
                paths.extend(descriptor.materials.iter().cloned());
            }
            ListDescriptor::Skinned(descriptor) => {
                paths.extend(descriptor.materials.iter().cloned());
                paths.extend(descriptor.banks.iter().map(|bank| bank.path().to_string()));
            }
        }
        paths
    }

    pub fn num_custom_floats(&self) -> u32 {
        match self {
            ListDescriptor::Instanced(descriptor) => descriptor.num_custom_floats,
            ListDescriptor::Skinned(descriptor) => descriptor.num_custom_floats,
        }
    }

    pub fn set_num_custom_floats(&mut self, count: u32) {
        match self {
            ListDescriptor::Instanced(descriptor) => descriptor.num_custom_floats = count,
            ListDescriptor::Skinned(descriptor) => descriptor.num_custom_floats = count,
        }
    }
}

/// One descriptor's worth of instances, carved out of an input batch during
/// selection and finished by packing.
#[derive(Debug, Default)]
pub struct InstanceList {
    pub descriptor: ListDescriptor,
    pub point_indices: Vec<usize>,
    pub transforms: Vec<Affine3A>,
    pub custom_floats: Vec<f32>,
    pub bank_indices: Vec<u32>,
}

impl InstanceList {
    fn for_descriptor(descriptor: ListDescriptor) -> Self {
        InstanceList {
            descriptor,
            ..Default::default()
        }
    }

    fn push_point(&mut self, index: usize, transform: Affine3A) {
        self.point_indices.push(index);
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

/// Selection result: the partitioned lists plus the per-point mesh path in
/// point order, which output forwarding reports back upstream.
#[derive(Debug)]
pub(crate) struct SelectionOutput {
    pub lists: Vec<InstanceList>,
    pub chosen_paths: Vec<String>,
}

/// Partitions a batch into per-descriptor instance lists. List order follows
/// first appearance (by-attribute) or entry order (weighted), so repeated runs
/// over the same batch produce identical partitions.
pub(crate) fn select_static(
    selector: &MeshSelector,
    batch: &PointBatch,
    element_seed: u32,
) -> Result<SelectionOutput, SpawnError> {
    match selector {
        MeshSelector::ByAttribute { attribute, template } => select_by_attribute(attribute, template, batch),
        MeshSelector::Weighted { entries } => select_weighted(entries, batch, element_seed),
    }
}

fn select_by_attribute(
    attribute: &str,
    template: &InstancedMeshDescriptor,
    batch: &PointBatch,
) -> Result<SelectionOutput, SpawnError> {
    let column = batch.column(attribute).ok_or_else(|| SpawnError::MissingAttribute {
        name: attribute.to_string(),
    })?;
    let paths = column.expect_text(attribute)?;

    let mut lists: Vec<InstanceList> = Vec::new();
    let mut by_path: HashMap<&str, usize> = HashMap::new();
    let mut chosen_paths = Vec::with_capacity(batch.len());
    for (index, path) in paths.iter().enumerate() {
        let slot = *by_path.entry(path.as_str()).or_insert_with(|| {
            let mut descriptor = template.clone();
            descriptor.mesh = SoftMeshRef::new(path.clone());
            lists.push(InstanceList::for_descriptor(ListDescriptor::Instanced(descriptor)));
            lists.len() - 1
        });
        lists[slot].push_point(index, batch.transforms[index]);
        chosen_paths.push(path.clone());
    }
    Ok(SelectionOutput { lists, chosen_paths })
}

fn select_weighted(entries: &[WeightedEntry], batch: &PointBatch, element_seed: u32) -> Result<SelectionOutput, SpawnError> {
    let total: u64 = entries.iter().map(|entry| entry.weight as u64).sum();
    if entries.is_empty() || total == 0 {
        return Err(SpawnError::EmptySelector);
    }

    let mut lists: Vec<InstanceList> = entries
        .iter()
        .map(|entry| InstanceList::for_descriptor(ListDescriptor::Instanced(entry.descriptor.clone())))
        .collect();
    let mut chosen_paths = Vec::with_capacity(batch.len());
    for index in 0..batch.len() {
        let slot = draw(entries, total, element_seed, batch.seeds[index]);
        lists[slot].push_point(index, batch.transforms[index]);
        chosen_paths.push(entries[slot].descriptor.mesh.path().to_string());
    }
    lists.retain(|list| !list.is_empty());
    Ok(SelectionOutput { lists, chosen_paths })
}

/// One draw is one ChaCha stream keyed by (element seed, point seed), so a
/// point's choice depends on nothing but those two values, not on batch order
/// or on other points.
fn draw(entries: &[WeightedEntry], total: u64, element_seed: u32, point_seed: u32) -> usize {
    let mut rng = ChaCha8Rng::seed_from_u64(((element_seed as u64) << 32) | point_seed as u64);
    let mut roll = rng.random_range(0..total);
    for (slot, entry) in entries.iter().enumerate() {
        let weight = entry.weight as u64;
        if roll < weight {
            return slot;
        }
        roll -= weight;
    }
    entries.len() - 1
}

/// Skinned selection: a single list for the template, with each point's bank
/// index read from an integer column and validated against the bank count.
/// An out-of-range index fails the whole input.
pub(crate) fn select_skinned_banks(
    template: &SkinnedMeshDescriptor,
    bank_attribute: &str,
    batch: &PointBatch,
) -> Result<SelectionOutput, SpawnError> {
    let column = batch.column(bank_attribute).ok_or_else(|| SpawnError::MissingAttribute {
        name: bank_attribute.to_string(),
    })?;
    let indices = column.expect_int(bank_attribute)?;

    let banks = template.banks.len();
    let mut list = InstanceList::for_descriptor(ListDescriptor::Skinned(template.clone()));
    for (index, &bank) in indices.iter().enumerate() {
        if bank < 0 || bank as usize >= banks {
            return Err(SpawnError::BankOutOfRange { index: bank, banks });
        }
        list.push_point(index, batch.transforms[index]);
        list.bank_indices.push(bank as u32);
    }
    let chosen_paths = vec![template.mesh.path().to_string(); batch.len()];
    Ok(SelectionOutput {
        lists: vec![list],
        chosen_paths,
    })
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use strewn_model::attributes::AttributeColumn;

    use super::*;

    fn batch_of(count: usize) -> PointBatch {
        let transforms = (0..count)
            .map(|i| Affine3A::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        PointBatch::new(transforms)
    }

    fn weighted(weights: &[(&str, u32)]) -> MeshSelector {
        MeshSelector::Weighted {
            entries: weights
                .iter()
                .map(|(path, weight)| WeightedEntry {
                    descriptor: InstancedMeshDescriptor::for_mesh(*path),
                    weight: *weight,
                })
                .collect(),
        }
    }

    #[test]
    pub fn by_attribute_partitions_in_first_appearance_order() {
        let mut batch = batch_of(3);
        batch.insert_column(
            "mesh",
            AttributeColumn::Text(vec!["meshes/b".to_string(), "meshes/a".to_string(), "meshes/b".to_string()]),
        );
        let selector = MeshSelector::ByAttribute {
            attribute: "mesh".to_string(),
            template: InstancedMeshDescriptor::default(),
        };

        let output = select_static(&selector, &batch, 0).unwrap();
        assert_eq!(output.lists.len(), 2);
        assert_eq!(output.lists[0].descriptor.mesh_path(), "meshes/b");
        assert_eq!(output.lists[0].point_indices, vec![0, 2]);
        assert_eq!(output.lists[1].descriptor.mesh_path(), "meshes/a");
        assert_eq!(output.lists[1].point_indices, vec![1]);
        assert_eq!(output.chosen_paths, vec!["meshes/b", "meshes/a", "meshes/b"]);
    }

    #[test]
    pub fn missing_or_mistyped_selection_column_is_reported() {
        let selector = MeshSelector::ByAttribute {
            attribute: "mesh".to_string(),
            template: InstancedMeshDescriptor::default(),
        };

        let bare = batch_of(2);
        assert!(matches!(
            select_static(&selector, &bare, 0),
            Err(SpawnError::MissingAttribute { .. })
        ));

        let mut numeric = batch_of(2);
        numeric.insert_column("mesh", AttributeColumn::Int(vec![1, 2]));
        let err = select_static(&selector, &numeric, 0).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    pub fn weighted_draws_are_deterministic_and_seed_keyed() {
        let selector = weighted(&[("meshes/a", 3), ("meshes/b", 1)]);
        let batch = batch_of(32);

        let first = select_static(&selector, &batch, 7).unwrap();
        let second = select_static(&selector, &batch, 7).unwrap();
        assert_eq!(first.chosen_paths, second.chosen_paths);

        let lists_total: usize = first.lists.iter().map(|list| list.len()).sum();
        assert_eq!(lists_total, batch.len());

        // A point's draw depends only on (element seed, point seed), not on
        // where the point sits in the batch.
        let moved = PointBatch::with_seeds(vec![Affine3A::IDENTITY], vec![batch.seeds[9]]);
        let alone = select_static(&selector, &moved, 7).unwrap();
        assert_eq!(alone.chosen_paths[0], first.chosen_paths[9]);

        let reseeded = select_static(&selector, &batch, 8).unwrap();
        assert_ne!(reseeded.chosen_paths, first.chosen_paths);
    }

    #[test]
    pub fn zero_weight_entries_are_never_drawn() {
        let selector = weighted(&[("meshes/a", 0), ("meshes/b", 1)]);
        let output = select_static(&selector, &batch_of(16), 0).unwrap();
        assert_eq!(output.lists.len(), 1);
        assert_eq!(output.lists[0].descriptor.mesh_path(), "meshes/b");

        let empty = weighted(&[("meshes/a", 0)]);
        assert!(matches!(
            select_static(&empty, &batch_of(4), 0),
            Err(SpawnError::EmptySelector)
        ));
    }

    #[test]
    pub fn bank_selection_validates_the_range() {
        let mut template = SkinnedMeshDescriptor::for_mesh("meshes/walker");
        template.banks = vec![SoftMeshRef::new("banks/idle"), SoftMeshRef::new("banks/run")];

        let mut batch = batch_of(2);
        batch.insert_column("bank", AttributeColumn::Int(vec![1, 0]));
        let output = select_skinned_banks(&template, "bank", &batch).unwrap();
        assert_eq!(output.lists.len(), 1);
        assert_eq!(output.lists[0].bank_indices, vec![1, 0]);
        assert_eq!(output.chosen_paths, vec!["meshes/walker", "meshes/walker"]);

        let mut out_of_range = batch_of(2);
        out_of_range.insert_column("bank", AttributeColumn::Int(vec![0, 2]));
        let err = select_skinned_banks(&template, "bank", &out_of_range).unwrap_err();
        assert!(matches!(err, SpawnError::BankOutOfRange { index: 2, banks: 2 }));
        assert!(err.is_structural());
    }
}
