use std::fmt;

use crate::SpawnError;
use crate::crc::Crc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    Float,
    Int,
    Text,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Float => write!(f, "a float column"),
            AttributeKind::Int => write!(f, "an integer column"),
            AttributeKind::Text => write!(f, "a text column"),
        }
    }
}

/// Columnar per-point attribute storage. Keeping the values typed (rather
/// than stringly) lets the spawner distinguish a missing column from one of
/// the wrong type, which are reported differently.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeColumn {
    Float(Vec<f32>),
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl AttributeColumn {
    pub fn len(&self) -> usize {
        match self {
            AttributeColumn::Float(values) => values.len(),
            AttributeColumn::Int(values) => values.len(),
            AttributeColumn::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeColumn::Float(_) => AttributeKind::Float,
            AttributeColumn::Int(_) => AttributeKind::Int,
            AttributeColumn::Text(_) => AttributeKind::Text,
        }
    }

    /// Typed access, reporting a structural error naming the column when the
    /// stored kind differs.
    pub fn expect_float(&self, name: &str) -> Result<&[f32], SpawnError> {
        match self {
            AttributeColumn::Float(values) => Ok(values),
            other => Err(SpawnError::AttributeType {
                name: name.to_string(),
                expected: AttributeKind::Float,
                found: other.kind(),
            }),
        }
    }

    pub fn expect_int(&self, name: &str) -> Result<&[i64], SpawnError> {
        match self {
            AttributeColumn::Int(values) => Ok(values),
            other => Err(SpawnError::AttributeType {
                name: name.to_string(),
                expected: AttributeKind::Int,
                found: other.kind(),
            }),
        }
    }

    pub fn expect_text(&self, name: &str) -> Result<&[String], SpawnError> {
        match self {
            AttributeColumn::Text(values) => Ok(values),
            other => Err(SpawnError::AttributeType {
                name: name.to_string(),
                expected: AttributeKind::Text,
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn combine_into(&self, crc: Crc) -> Crc {
        match self {
            AttributeColumn::Float(values) => crc.combine_bytes(&[0]).combine_f32_slice(values),
            AttributeColumn::Int(values) => {
                let mut crc = crc.combine_bytes(&[1]);
                for value in values {
                    crc = crc.combine_u64(*value as u64);
                }
                crc
            }
            AttributeColumn::Text(values) => {
                let mut crc = crc.combine_bytes(&[2]);
                for value in values {
                    crc = crc.combine_str(value);
                }
                crc
            }
        }
    }
}
