//! SPIR-V type representation.

use spirv::{Dim, ImageFormat, StorageClass};

use crate::arena::Id;

/// Scalar or opaque base kind of a [`Type`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BaseType {
    #[default]
    Unknown,
    Void,
    Boolean,
    Char,
    Int,
    UInt,
    Int64,
    UInt64,
    AtomicCounter,
    Float,
    Double,
    Struct,
    Image,
    SampledImage,
    Sampler,
}

impl BaseType {
    /// Returns `true` for the signed integer kinds.
    pub fn is_signed_int(self) -> bool {
        matches!(self, Self::Int | Self::Int64)
    }

    /// Returns `true` for the unsigned integer kinds.
    pub fn is_unsigned_int(self) -> bool {
        matches!(self, Self::UInt | Self::UInt64)
    }

    /// Returns `true` for any integer kind.
    pub fn is_integer(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Returns `true` for opaque handle kinds.
    pub fn is_opaque(self) -> bool {
        matches!(self, Self::Image | Self::SampledImage | Self::Sampler)
    }
}

/// Image-specific fields of a [`Type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    /// The sampled component type.
    pub sampled_type: Id,
    pub dim: Dim,
    pub depth: bool,
    pub arrayed: bool,
    pub ms: bool,
    /// 0 = unknown, 1 = used with a sampler, 2 = storage image.
    pub sampled: u32,
    pub format: ImageFormat,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            sampled_type: Id::default(),
            dim: Dim::Dim1D,
            depth: false,
            arrayed: false,
            ms: false,
            sampled: 0,
            format: ImageFormat::Unknown,
        }
    }
}

/// A declared type.
///
/// Composite types are derived by copying their base and mutating the
/// relevant fields. `self_id` follows the copy for vectors and matrices so
/// decorations on the base apply, but arrays and pointers keep the self ID
/// of their pointee so decorations are not smeared through indirection.
#[derive(Clone, Debug, PartialEq)]
pub struct Type {
    /// The ID decorations for this type are looked up under.
    pub self_id: Id,
    pub basetype: BaseType,
    /// Bit width of the scalar component.
    pub width: u32,
    pub vecsize: u32,
    pub columns: u32,
    /// Array dimensions, innermost last. A zero entry is a runtime array.
    pub array: Vec<u32>,
    /// Whether each entry in `array` is a literal length or a constant ID.
    pub array_size_literal: Vec<bool>,
    pub pointer: bool,
    pub storage: StorageClass,
    pub member_types: Vec<Id>,
    pub image: ImageInfo,
    /// A structurally identical struct declared earlier.
    pub type_alias: Option<Id>,
    /// The element type an array or pointer type was derived from.
    pub parent_type: Option<Id>,
}

impl Default for Type {
    fn default() -> Self {
        Self {
            self_id: Id::default(),
            basetype: BaseType::Unknown,
            width: 0,
            vecsize: 1,
            columns: 1,
            array: Vec::new(),
            array_size_literal: Vec::new(),
            pointer: false,
            storage: StorageClass::Generic,
            member_types: Vec::new(),
            image: ImageInfo::default(),
            type_alias: None,
            parent_type: None,
        }
    }
}

impl Type {
    /// A one-component, one-column value.
    pub fn is_scalar(&self) -> bool {
        self.vecsize == 1 && self.columns == 1
    }

    /// A multi-component, single-column value.
    pub fn is_vector(&self) -> bool {
        self.vecsize > 1 && self.columns == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.vecsize > 1 && self.columns > 1
    }

    pub fn is_array(&self) -> bool {
        !self.array.is_empty()
    }

    pub fn is_struct(&self) -> bool {
        self.basetype == BaseType::Struct
    }

    /// Returns `true` for image-typed values that are not combined with a sampler.
    pub fn is_image(&self) -> bool {
        self.basetype == BaseType::Image
    }

    /// Returns `true` for opaque values that cannot appear as l-values.
    pub fn is_opaque(&self) -> bool {
        self.basetype.is_opaque()
    }
}
