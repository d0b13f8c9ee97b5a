//! ID-indexed storage with kind-checked access.
//!
//! Every SPIR-V result ID indexes one slot in an [`IdStore`]. A slot holds a
//! [`Variant`], a closed sum over everything a module can declare. Accessors
//! are generic over [`Kind`] so callers ask for "the `Type` at this ID" and
//! get an error instead of a silent reinterpretation when the slot holds
//! something else.

use std::fmt;

use crate::error::IrError;
use crate::types::Type;
use crate::value::{
    Block, Constant, ConstantOp, Expression, ExtInstImport, Function, FunctionPrototype, Undef,
    Variable,
};

/// A SPIR-V result ID.
///
/// IDs are dense: the module header declares an upper bound and every ID in
/// `0..bound` owns a slot in the [`IdStore`]. ID 0 is never a valid result.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    /// Creates an ID from its raw word.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw SPIR-V word.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the zero-based slot index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminant of a [`Variant`], used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariantKind {
    None,
    Type,
    Variable,
    Constant,
    ConstantOp,
    Undef,
    Function,
    FunctionPrototype,
    Block,
    Expression,
    ExtInstImport,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Type => "type",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::ConstantOp => "constant op",
            Self::Undef => "undef",
            Self::Function => "function",
            Self::FunctionPrototype => "function prototype",
            Self::Block => "block",
            Self::Expression => "expression",
            Self::ExtInstImport => "extended instruction import",
        })
    }
}

/// The payload stored at one ID.
#[derive(Clone, Debug, Default)]
pub enum Variant {
    #[default]
    None,
    Type(Type),
    Variable(Variable),
    Constant(Constant),
    ConstantOp(ConstantOp),
    Undef(Undef),
    Function(Function),
    FunctionPrototype(FunctionPrototype),
    Block(Block),
    Expression(Expression),
    ExtInstImport(ExtInstImport),
}

impl Variant {
    /// Returns the discriminant of this variant.
    pub fn kind(&self) -> VariantKind {
        match self {
            Self::None => VariantKind::None,
            Self::Type(_) => VariantKind::Type,
            Self::Variable(_) => VariantKind::Variable,
            Self::Constant(_) => VariantKind::Constant,
            Self::ConstantOp(_) => VariantKind::ConstantOp,
            Self::Undef(_) => VariantKind::Undef,
            Self::Function(_) => VariantKind::Function,
            Self::FunctionPrototype(_) => VariantKind::FunctionPrototype,
            Self::Block(_) => VariantKind::Block,
            Self::Expression(_) => VariantKind::Expression,
            Self::ExtInstImport(_) => VariantKind::ExtInstImport,
        }
    }
}

/// A payload type that can live in an [`IdStore`] slot.
pub trait Kind: Sized {
    /// The discriminant matching this payload.
    const KIND: VariantKind;

    fn from_variant(variant: &Variant) -> Option<&Self>;
    fn from_variant_mut(variant: &mut Variant) -> Option<&mut Self>;
    fn into_variant(self) -> Variant;
}

macro_rules! impl_kind {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Kind for $ty {
                const KIND: VariantKind = VariantKind::$ty;

                fn from_variant(variant: &Variant) -> Option<&Self> {
                    match variant {
                        Variant::$ty(v) => Some(v),
                        _ => None,
                    }
                }

                fn from_variant_mut(variant: &mut Variant) -> Option<&mut Self> {
                    match variant {
                        Variant::$ty(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_variant(self) -> Variant {
                    Variant::$ty(self)
                }
            }
        )*
    };
}

impl_kind!(
    Type,
    Variable,
    Constant,
    ConstantOp,
    Undef,
    Function,
    FunctionPrototype,
    Block,
    Expression,
    ExtInstImport,
);

/// Dense storage of one [`Variant`] per ID.
#[derive(Clone, Debug, Default)]
pub struct IdStore {
    slots: Vec<Variant>,
}

impl IdStore {
    /// Creates a store with `bound` empty slots.
    pub fn with_bound(bound: u32) -> Self {
        Self {
            slots: vec![Variant::None; bound as usize],
        }
    }

    /// Returns the current ID bound (one past the largest valid ID).
    pub fn bound(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Returns the discriminant at `id`, or [`VariantKind::None`] if out of range.
    pub fn kind(&self, id: Id) -> VariantKind {
        self.slots
            .get(id.index())
            .map_or(VariantKind::None, Variant::kind)
    }

    /// Returns the raw variant at `id`.
    pub fn variant(&self, id: Id) -> Result<&Variant, IrError> {
        self.slots.get(id.index()).ok_or(IrError::BadId {
            id: id.raw(),
            bound: self.bound(),
        })
    }

    /// Returns the payload at `id`, failing if the slot holds another kind.
    pub fn get<T: Kind>(&self, id: Id) -> Result<&T, IrError> {
        let variant = self.variant(id)?;
        T::from_variant(variant).ok_or(IrError::KindMismatch {
            id: id.raw(),
            expected: T::KIND,
            found: variant.kind(),
        })
    }

    /// Mutable counterpart of [`IdStore::get`].
    pub fn get_mut<T: Kind>(&mut self, id: Id) -> Result<&mut T, IrError> {
        let bound = self.bound();
        let variant = self.slots.get_mut(id.index()).ok_or(IrError::BadId {
            id: id.raw(),
            bound,
        })?;
        let found = variant.kind();
        T::from_variant_mut(variant).ok_or(IrError::KindMismatch {
            id: id.raw(),
            expected: T::KIND,
            found,
        })
    }

    /// Returns the payload at `id` if the slot holds a `T`.
    pub fn maybe_get<T: Kind>(&self, id: Id) -> Option<&T> {
        self.slots.get(id.index()).and_then(T::from_variant)
    }

    /// Mutable counterpart of [`IdStore::maybe_get`].
    pub fn maybe_get_mut<T: Kind>(&mut self, id: Id) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(T::from_variant_mut)
    }

    /// Stores `value` at `id`, replacing whatever was there.
    pub fn set<T: Kind>(&mut self, id: Id, value: T) -> Result<&mut T, IrError> {
        let bound = self.bound();
        let slot = self.slots.get_mut(id.index()).ok_or(IrError::BadId {
            id: id.raw(),
            bound,
        })?;
        *slot = value.into_variant();
        T::from_variant_mut(slot).ok_or(IrError::KindMismatch {
            id: id.raw(),
            expected: T::KIND,
            found: VariantKind::None,
        })
    }

    /// Clears the slot at `id` back to [`Variant::None`].
    pub fn reset(&mut self, id: Id) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            *slot = Variant::None;
        }
    }

    /// Appends `count` empty slots and returns the first new ID.
    pub fn grow(&mut self, count: u32) -> Id {
        let first = self.bound();
        self.slots
            .resize(self.slots.len() + count as usize, Variant::None);
        Id::new(first)
    }

    /// Iterates over every ID holding a `T`, in ID order.
    pub fn iter<'a, T: Kind + 'a>(&'a self) -> impl Iterator<Item = (Id, &'a T)> + 'a {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| T::from_variant(v).map(|t| (Id::new(i as u32), t)))
    }

    /// Returns every ID holding a `T`, in ID order.
    pub fn ids_of<T: Kind>(&self) -> Vec<Id> {
        self.iter::<T>().map(|(id, _)| id).collect()
    }
}
