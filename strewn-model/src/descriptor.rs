use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::asset::SoftMeshRef;
use crate::crc::Crc;

bitflags! {
    /// Rendering feature toggles carried by a descriptor. Part of equality
    /// and the structural hash like every other field.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DescriptorFlags: u32 {
        const CAST_SHADOWS = 0x1;
        const COLLISION = 0x2;
        const DISTANCE_FIELD_LIGHTING = 0x4;
        const REVERSE_CULLING = 0x8;
    }
}

impl Default for DescriptorFlags {
    fn default() -> Self {
        DescriptorFlags::CAST_SHADOWS | DescriptorFlags::COLLISION
    }
}

impl Serialize for DescriptorFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for DescriptorFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(DescriptorFlags::from_bits_truncate(u32::deserialize(deserializer)?))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentClass {
    Instanced,
    HierarchicalInstanced,
}

/// Everything needed to construct (or find again) one instanced-mesh
/// component.
///
/// Equality is field-by-field; the resolved-asset cache inside the mesh ref
/// is excluded (see [`SoftMeshRef`]). The order of `materials` and `tags` is
/// significant for both equality and the hash: reordered overrides produce a
/// different resource. Callers that want order independence sort before
/// building the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancedMeshDescriptor {
    pub mesh: SoftMeshRef,
    pub materials: Vec<String>,
    pub component_class: ComponentClass,
    pub num_custom_floats: u32,
    pub flags: DescriptorFlags,
    pub tags: Vec<String>,
}

impl Default for InstancedMeshDescriptor {
    fn default() -> Self {
        InstancedMeshDescriptor {
            mesh: SoftMeshRef::none(),
            materials: Vec::new(),
            component_class: ComponentClass::Instanced,
            num_custom_floats: 0,
            flags: DescriptorFlags::default(),
            tags: Vec::new(),
        }
    }
}

impl InstancedMeshDescriptor {
    pub fn for_mesh(path: impl Into<String>) -> Self {
        InstancedMeshDescriptor {
            mesh: SoftMeshRef::new(path),
            ..Default::default()
        }
    }

    /// Structural hash over all comparison-relevant fields, in declaration
    /// order. Equal descriptors hash equal; the reverse is as good as CRC-32
    /// gets.
    pub fn compute_crc(&self) -> Crc {
        let mut crc = Crc::INVALID.combine_bytes(&[0]).combine_str(self.mesh.path());
        crc = crc.combine_u32(self.materials.len() as u32);
        for material in &self.materials {
            crc = crc.combine_str(material);
        }
        crc = crc.combine_u32(match self.component_class {
            ComponentClass::Instanced => 0,
            ComponentClass::HierarchicalInstanced => 1,
        });
        crc = crc.combine_u32(self.num_custom_floats);
        crc = crc.combine_u32(self.flags.bits());
        crc = crc.combine_u32(self.tags.len() as u32);
        for tag in &self.tags {
            crc = crc.combine_str(tag);
        }
        crc
    }

    /// Applies the descriptor changes a caller may opt into before matching:
    /// meshes that stream their LODs cannot be hierarchically instanced, so
    /// the component class decays to the flat one. Requires a resolved mesh
    /// (no-op otherwise) and is idempotent. Returns whether anything changed.
    pub fn normalize(&mut self) -> bool {
        let Some(mesh) = self.mesh.resolved() else {
            return false;
        };
        if mesh.streaming_lod && self.component_class == ComponentClass::HierarchicalInstanced {
            self.component_class = ComponentClass::Instanced;
            true
        } else {
            false
        }
    }
}

/// Skinned variant: instances additionally pick one of the animation banks,
/// per point. Bank order is significant, like every other list here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinnedMeshDescriptor {
    pub mesh: SoftMeshRef,
    pub materials: Vec<String>,
    pub banks: Vec<SoftMeshRef>,
    pub num_custom_floats: u32,
    pub flags: DescriptorFlags,
    pub tags: Vec<String>,
}

impl Default for SkinnedMeshDescriptor {
    fn default() -> Self {
        SkinnedMeshDescriptor {
            mesh: SoftMeshRef::none(),
            materials: Vec::new(),
            banks: Vec::new(),
            num_custom_floats: 0,
            flags: DescriptorFlags::default(),
            tags: Vec::new(),
        }
    }
}

impl SkinnedMeshDescriptor {
    pub fn for_mesh(path: impl Into<String>) -> Self {
        SkinnedMeshDescriptor {
            mesh: SoftMeshRef::new(path),
            ..Default::default()
        }
    }

    pub fn compute_crc(&self) -> Crc {
        let mut crc = Crc::INVALID.combine_bytes(&[1]).combine_str(self.mesh.path());
        crc = crc.combine_u32(self.materials.len() as u32);
        for material in &self.materials {
            crc = crc.combine_str(material);
        }
        crc = crc.combine_u32(self.banks.len() as u32);
        for bank in &self.banks {
            crc = crc.combine_str(bank.path());
        }
        crc = crc.combine_u32(self.num_custom_floats);
        crc = crc.combine_u32(self.flags.bits());
        crc = crc.combine_u32(self.tags.len() as u32);
        for tag in &self.tags {
            crc = crc.combine_str(tag);
        }
        crc
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplineAxis {
    X,
    Y,
    Z,
}

/// Deformed-mesh-along-spline resources share the pool lifecycle but have no
/// dedicated spawner element; they enter the pool through direct
/// get-or-create calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineMeshDescriptor {
    pub mesh: SoftMeshRef,
    pub forward_axis: SplineAxis,
    pub flags: DescriptorFlags,
    pub tags: Vec<String>,
}

impl SplineMeshDescriptor {
    pub fn compute_crc(&self) -> Crc {
        let mut crc = Crc::INVALID.combine_bytes(&[2]).combine_str(self.mesh.path());
        crc = crc.combine_u32(match self.forward_axis {
            SplineAxis::X => 0,
            SplineAxis::Y => 1,
            SplineAxis::Z => 2,
        });
        crc = crc.combine_u32(self.flags.bits());
        crc = crc.combine_u32(self.tags.len() as u32);
        for tag in &self.tags {
            crc = crc.combine_str(tag);
        }
        crc
    }
}
