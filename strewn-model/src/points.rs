use std::collections::BTreeMap;

use glam::Affine3A;

use crate::SpawnError;
use crate::attributes::AttributeColumn;
use crate::crc::Crc;

/// One batch of points to spawn instances for: parallel transforms and
/// per-point seeds plus named attribute columns. Columns are kept in a
/// BTreeMap so every iteration (and therefore the content hash) sees them in
/// name order, independent of insertion order.
#[derive(Debug, Clone, Default)]
pub struct PointBatch {
    pub transforms: Vec<Affine3A>,
    pub seeds: Vec<u32>,
    attributes: BTreeMap<String, AttributeColumn>,
}

impl PointBatch {
    /// Seeds default to the point index; use [`PointBatch::with_seeds`] when
    /// the producer carries its own.
    pub fn new(transforms: Vec<Affine3A>) -> Self {
        let seeds = (0..transforms.len() as u32).collect();
        PointBatch {
            transforms,
            seeds,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_seeds(transforms: Vec<Affine3A>, seeds: Vec<u32>) -> Self {
        debug_assert_eq!(transforms.len(), seeds.len());
        PointBatch {
            transforms,
            seeds,
            attributes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn insert_column(&mut self, name: impl Into<String>, column: AttributeColumn) {
        self.attributes.insert(name.into(), column);
    }

    pub fn column(&self, name: &str) -> Option<&AttributeColumn> {
        self.attributes.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &AttributeColumn)> {
        self.attributes.iter()
    }

    /// Checks that every column carries exactly one value per point. Batches
    /// are validated lazily, right before selection, so producers can attach
    /// columns in any order without intermediate states erroring.
    pub fn validate(&self) -> Result<(), SpawnError> {
        if self.seeds.len() != self.transforms.len() {
            return Err(SpawnError::AttributeArity {
                name: "$seed".to_string(),
                len: self.seeds.len(),
                points: self.transforms.len(),
            });
        }
        for (name, column) in &self.attributes {
            if column.len() != self.transforms.len() {
                return Err(SpawnError::AttributeArity {
                    name: name.clone(),
                    len: column.len(),
                    points: self.transforms.len(),
                });
            }
        }
        Ok(())
    }

    /// Deterministic content hash over transforms, seeds and columns (in name
    /// order). Equal batches hash equal across runs and platforms.
    pub fn compute_crc(&self) -> Crc {
        let mut crc = Crc::INVALID.combine_u32(self.transforms.len() as u32);
        for transform in &self.transforms {
            crc = crc.combine_f32_slice(&transform.to_cols_array());
        }
        crc = crc.combine_u32_slice(&self.seeds);
        for (name, column) in &self.attributes {
            crc = column.combine_into(crc.combine_str(name));
        }
        crc
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn batch_of(count: usize) -> PointBatch {
        let transforms = (0..count)
            .map(|i| Affine3A::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        PointBatch::new(transforms)
    }

    #[test]
    pub fn crc_ignores_column_insertion_order() {
        let mut first = batch_of(4);
        first.insert_column("tint", AttributeColumn::Float(vec![0.0; 4]));
        first.insert_column("mesh", AttributeColumn::Text(vec!["meshes/rock".to_string(); 4]));

        let mut second = batch_of(4);
        second.insert_column("mesh", AttributeColumn::Text(vec!["meshes/rock".to_string(); 4]));
        second.insert_column("tint", AttributeColumn::Float(vec![0.0; 4]));

        assert_eq!(first.compute_crc(), second.compute_crc());
    }

    #[test]
    pub fn crc_tracks_content() {
        let base = batch_of(4);
        let mut moved = batch_of(4);
        moved.transforms[2] = Affine3A::from_translation(Vec3::new(9.0, 0.0, 0.0));
        assert_ne!(base.compute_crc(), moved.compute_crc());

        let mut reseeded = batch_of(4);
        reseeded.seeds[0] = 17;
        assert_ne!(base.compute_crc(), reseeded.compute_crc());
    }

    #[test]
    pub fn validate_catches_short_columns() {
        let mut batch = batch_of(4);
        batch.insert_column("tint", AttributeColumn::Float(vec![0.0; 3]));
        let err = batch.validate().unwrap_err();
        assert!(matches!(err, SpawnError::AttributeArity { len: 3, points: 4, .. }));
    }
}
