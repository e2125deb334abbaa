use strewn_model::SpawnError;
use strewn_model::attributes::{AttributeColumn, AttributeKind};
use strewn_model::points::PointBatch;

use crate::spawn::selection::InstanceList;

enum NumericColumn<'a> {
    Float(&'a [f32]),
    Int(&'a [i64]),
}

/// Packs the configured attributes into the list's custom-float buffer,
/// point-major: the floats for one instance are contiguous, attribute values
/// in configured order. The descriptor's float width becomes the attribute
/// count, so an empty configuration means no channel at all. Integer columns
/// are widened to f32; text columns are a structural error.
pub(crate) fn pack_custom_floats(
    list: &mut InstanceList,
    batch: &PointBatch,
    attributes: &[String],
) -> Result<(), SpawnError> {
    list.descriptor.set_num_custom_floats(attributes.len() as u32);
    if attributes.is_empty() {
        return Ok(());
    }

    // Resolve every column first so a bad name or type fails the input
    // before any floats are packed.
    let mut columns = Vec::with_capacity(attributes.len());
    for name in attributes {
        let column = batch
            .column(name)
            .ok_or_else(|| SpawnError::MissingAttribute { name: name.clone() })?;
        let numeric = match column {
            AttributeColumn::Float(values) => NumericColumn::Float(values.as_slice()),
            AttributeColumn::Int(values) => NumericColumn::Int(values.as_slice()),
            AttributeColumn::Text(_) => {
                return Err(SpawnError::AttributeType {
                    name: name.clone(),
                    expected: AttributeKind::Float,
                    found: AttributeKind::Text,
                });
            }
        };
        columns.push(numeric);
    }

    let InstanceList {
        point_indices,
        custom_floats,
        ..
    } = list;
    custom_floats.reserve(point_indices.len() * columns.len());
    for &point in point_indices.iter() {
        for column in &columns {
            custom_floats.push(match column {
                NumericColumn::Float(values) => values[point],
                NumericColumn::Int(values) => values[point] as f32,
            });
        }
    }
    Ok(())
}
