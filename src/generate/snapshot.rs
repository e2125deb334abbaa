use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strewn_model::crc::Crc;
use strewn_model::descriptor::{InstancedMeshDescriptor, SkinnedMeshDescriptor, SplineMeshDescriptor};

use crate::generate::Generator;
use crate::pool::managed::{ManagedPayload, PoolResource, ResourceState};
use crate::scene::Scene;

/// Serializable image of one pool: enough to re-link components by name and
/// resume reuse matching after a reload. Loaded assets are not persisted; the
/// soft refs re-resolve on first use.
#[derive(Debug, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub generator: String,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Scene object name, the identity that survives a save/load round-trip.
    pub component: String,
    pub settings_crc: Crc,
    pub data_crc: Crc,
    pub descriptor: SnapshotDescriptor,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum SnapshotDescriptor {
    Instanced(InstancedMeshDescriptor),
    Skinned(SkinnedMeshDescriptor),
    Spline(SplineMeshDescriptor),
}

impl Generator {
    /// Captures every persistent mesh resource. Actor resources and transient
    /// components are session-local and skipped.
    pub fn snapshot(&self, scene: &Scene) -> PoolSnapshot {
        let mut entries = Vec::new();
        for entry in self.pool.iter() {
            if entry.state() == ResourceState::Released {
                continue;
            }
            let Some(component) = entry.payload().component() else {
                continue;
            };
            let Some(object) = scene.object(component) else {
                continue;
            };
            if object.transient {
                continue;
            }
            let descriptor = match entry.payload() {
                ManagedPayload::InstancedMesh { descriptor, .. } => SnapshotDescriptor::Instanced(descriptor.clone()),
                ManagedPayload::SkinnedMesh { descriptor, .. } => SnapshotDescriptor::Skinned(descriptor.clone()),
                ManagedPayload::SplineMesh { descriptor, .. } => SnapshotDescriptor::Spline(descriptor.clone()),
                ManagedPayload::Actors { .. } => continue,
            };
            entries.push(SnapshotEntry {
                component: object.name.clone(),
                settings_crc: entry.settings_crc(),
                data_crc: entry.data_crc(),
                descriptor,
            });
        }
        debug!("{}: snapshot captured {} entries", self.name, entries.len());
        PoolSnapshot {
            generator: self.name.clone(),
            entries,
        }
    }

    /// Re-links snapshot entries to live scene objects by name and parks them
    /// so the next pass can claim them through regular matching. Entries whose
    /// object no longer exists (or is already managed) are dropped with a
    /// warning. Returns the number restored.
    pub fn restore(&mut self, scene: &mut Scene, snapshot: PoolSnapshot) -> usize {
        if snapshot.generator != self.name {
            warn!("restoring a snapshot taken by {} into {}", snapshot.generator, self.name);
        }
        let mut restored = 0;
        for entry in snapshot.entries {
            let Some(component) = scene.find_by_name(&entry.component) else {
                warn!("dropping snapshot entry {}, no such object", entry.component);
                continue;
            };
            if scene.object(component).and_then(|object| object.instances()).is_none() {
                warn!("dropping snapshot entry {}, object is not a mesh component", entry.component);
                continue;
            }
            if self.pool.iter().any(|existing| existing.is_managing(component)) {
                warn!("dropping snapshot entry {}, object is already managed", entry.component);
                continue;
            }
            if let Some(seq) = trailing_seq(&entry.component) {
                self.bump_seq_past(seq);
            }
            let payload = match entry.descriptor {
                SnapshotDescriptor::Instanced(descriptor) => ManagedPayload::InstancedMesh { descriptor, component },
                SnapshotDescriptor::Skinned(descriptor) => ManagedPayload::SkinnedMesh { descriptor, component },
                SnapshotDescriptor::Spline(descriptor) => ManagedPayload::SplineMesh { descriptor, component },
            };
            self.pool.register_restored(entry.settings_crc, entry.data_crc, payload);
            restored += 1;
        }
        debug!("{}: restored {} pool entries", self.name, restored);
        restored
    }
}

fn trailing_seq(name: &str) -> Option<u64> {
    name.rsplit('.').next().and_then(|tail| tail.parse().ok())
}

pub fn save_ron(snapshot: &PoolSnapshot, path: &Path) -> anyhow::Result<()> {
    let text = ron::ser::to_string_pretty(snapshot, ron::ser::PrettyConfig::default())?;
    std::fs::write(path, text)?;
    Ok(())
}

pub fn load_ron(path: &Path) -> anyhow::Result<PoolSnapshot> {
    Ok(ron::from_str(&std::fs::read_to_string(path)?)?)
}
