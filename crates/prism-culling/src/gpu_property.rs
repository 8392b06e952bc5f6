//! Registry of per-instance GPU properties.
//!
//! Each property is a plain-old-data Rust type bound to a shader property
//! name. The binding is declared with [`gpu_property!`](crate::gpu_property),
//! which also checks the type's size at compile time; the registry then
//! assigns every property an id and a byte offset in the per-instance stride.

use std::any::TypeId;

use glam::Mat4;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::record::{ChunkCullingFlags, ChunkCullingRecord};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A type uploaded verbatim as one per-instance shader property.
pub trait GpuProperty: bytemuck::Pod {
    /// Shader property name.
    const NAME: &'static str;
    /// Size in bytes of one value.
    const SIZE: usize = std::mem::size_of::<Self>();
}

/// Bind a `Pod` type to a shader property name.
///
/// Fails to compile unless the type's size is a non-zero multiple of 4 bytes.
#[macro_export]
macro_rules! gpu_property {
    ($ty:ty, $name:literal) => {
        impl $crate::GpuProperty for $ty {
            const NAME: &'static str = $name;
        }
        const _: () = assert!(
            ::std::mem::size_of::<$ty>() > 0 && ::std::mem::size_of::<$ty>() % 4 == 0,
            concat!("GPU property `", $name, "` must be a non-zero multiple of 4 bytes"),
        );
    };
}

/// Dense registry index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuPropertyId(pub u16);

/// Registered property metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuPropertyDesc {
    pub name: &'static str,
    pub size: usize,
    /// Byte offset of the property inside one instance's data.
    pub offset: usize,
    type_id: TypeId,
}

/// Errors that can occur during property registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GpuPropertyError {
    /// Another type already uses this property name.
    #[error("duplicate GPU property name: {0}")]
    DuplicateName(&'static str),
    /// The type is already bound to a property.
    #[error("type already registered as GPU property {0}")]
    DuplicateType(&'static str),
    /// All 65 536 ids are in use.
    #[error("GPU property registry is full")]
    RegistryFull,
}

// ---------------------------------------------------------------------------
// Built-in properties
// ---------------------------------------------------------------------------

/// Object-to-world matrix as three rows of a 3x4 affine transform.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectToWorld(pub [f32; 12]);

/// Inverse of [`ObjectToWorld`], same packing.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct WorldToObject(pub [f32; 12]);

/// Per-instance bits the shaders need from the chunk record.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MotionFlags(pub u32);

gpu_property!(ObjectToWorld, "prism_ObjectToWorld");
gpu_property!(WorldToObject, "prism_WorldToObject");
gpu_property!(MotionFlags, "prism_MotionFlags");

fn pack_affine(matrix: &Mat4) -> [f32; 12] {
    let mut out = [0.0; 12];
    for row in 0..3 {
        matrix.row(row).write_to_slice(&mut out[row * 4..row * 4 + 4]);
    }
    out
}

impl ObjectToWorld {
    pub fn from_matrix(matrix: &Mat4) -> Self {
        Self(pack_affine(matrix))
    }
}

impl WorldToObject {
    pub fn from_matrix(local_to_world: &Mat4) -> Self {
        Self(pack_affine(&local_to_world.inverse()))
    }
}

impl MotionFlags {
    pub const FLIPPED_WINDING: u32 = 1 << 0;
    pub const PER_OBJECT_MOTION: u32 = 1 << 1;

    /// Flags for instance `slot` of the chunk owning `record`.
    pub fn for_instance(record: &ChunkCullingRecord, slot: usize) -> Self {
        let mut bits = 0;
        if record.flipped_winding.get(slot) {
            bits |= Self::FLIPPED_WINDING;
        }
        if record.flags.contains(ChunkCullingFlags::PER_OBJECT_MOTION) {
            bits |= Self::PER_OBJECT_MOTION;
        }
        Self(bits)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps property types to ids, names and instance-data offsets.
#[derive(Debug, Default)]
pub struct GpuPropertyRegistry {
    properties: Vec<GpuPropertyDesc>,
    by_name: FxHashMap<&'static str, GpuPropertyId>,
    by_type: FxHashMap<TypeId, GpuPropertyId>,
    stride: usize,
}

impl GpuPropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding [`ObjectToWorld`], [`WorldToObject`] and [`MotionFlags`].
    pub fn with_builtins() -> Result<Self, GpuPropertyError> {
        let mut registry = Self::new();
        registry.register::<ObjectToWorld>()?;
        registry.register::<WorldToObject>()?;
        registry.register::<MotionFlags>()?;
        Ok(registry)
    }

    /// Registers `T` and returns its id. Offsets are assigned in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`GpuPropertyError::DuplicateName`] if the name is taken,
    /// [`GpuPropertyError::DuplicateType`] if `T` is already registered, or
    /// [`GpuPropertyError::RegistryFull`] if no id is left.
    pub fn register<T: GpuProperty>(&mut self) -> Result<GpuPropertyId, GpuPropertyError> {
        let type_id = TypeId::of::<T>();
        if let Some(id) = self.by_type.get(&type_id) {
            return Err(GpuPropertyError::DuplicateType(self.get(*id).name));
        }
        if self.by_name.contains_key(T::NAME) {
            return Err(GpuPropertyError::DuplicateName(T::NAME));
        }
        let id = u16::try_from(self.properties.len())
            .map(GpuPropertyId)
            .map_err(|_| GpuPropertyError::RegistryFull)?;

        self.properties.push(GpuPropertyDesc {
            name: T::NAME,
            size: T::SIZE,
            offset: self.stride,
            type_id,
        });
        self.stride += T::SIZE;
        self.by_name.insert(T::NAME, id);
        self.by_type.insert(type_id, id);
        Ok(id)
    }

    /// Id of a registered type.
    pub fn id_of<T: GpuProperty>(&self) -> Option<GpuPropertyId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn find(&self, name: &str) -> Option<&GpuPropertyDesc> {
        self.by_name.get(name).map(|id| self.get(*id))
    }

    /// # Panics
    ///
    /// Panics if `id` was not produced by this registry.
    pub fn get(&self, id: GpuPropertyId) -> &GpuPropertyDesc {
        &self.properties[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GpuPropertyDesc> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Bytes of property data per instance.
    pub fn instance_stride(&self) -> usize {
        self.stride
    }

    /// Copy `value` into the slot of `instance` inside `buffer`.
    ///
    /// Returns `false` if `T` is not registered or the buffer is too short.
    pub fn write<T: GpuProperty>(&self, buffer: &mut [u8], instance: usize, value: &T) -> bool {
        let Some(id) = self.id_of::<T>() else {
            return false;
        };
        let desc = self.get(id);
        debug_assert_eq!(desc.type_id, TypeId::of::<T>());
        let start = instance * self.stride + desc.offset;
        match buffer.get_mut(start..start + desc.size) {
            Some(dst) => {
                dst.copy_from_slice(bytemuck::bytes_of(value));
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
