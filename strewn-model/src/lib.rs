use thiserror::Error;

use crate::attributes::AttributeKind;

/// Errors raised while preparing or populating spawn resources. These are
/// recorded against the execution context and never unwound across a phase
/// boundary; the offending unit (input batch or descriptor) is skipped and
/// its siblings proceed.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("descriptor references no mesh")]
    MissingMesh,

    #[error("target owner '{name}' was not found in the scene")]
    UnknownTarget { name: String },

    #[error("attribute '{name}' is missing from the input batch")]
    MissingAttribute { name: String },

    #[error("attribute '{name}' is {found}, expected {expected}")]
    AttributeType {
        name: String,
        expected: AttributeKind,
        found: AttributeKind,
    },

    #[error("attribute '{name}' has {len} values for {points} points")]
    AttributeArity { name: String, len: usize, points: usize },

    #[error("asset '{path}' failed to load: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("bank index {index} is out of range for {banks} banks")]
    BankOutOfRange { index: i64, banks: usize },

    #[error("selector has no entries to choose from")]
    EmptySelector,
}

impl SpawnError {
    /// Structural errors mean the input data disagrees with the settings
    /// (wrong column type, impossible index), as opposed to plain
    /// misconfiguration. Both skip the affected unit; the distinction only
    /// matters for reporting.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SpawnError::AttributeType { .. } | SpawnError::AttributeArity { .. } | SpawnError::BankOutOfRange { .. }
        )
    }
}

pub mod asset;
pub mod attributes;
pub mod crc;
pub mod descriptor;
pub mod points;
