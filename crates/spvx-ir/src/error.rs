//! Error types for the spvx IR.

use std::fmt;

use crate::arena::VariantKind;

/// Coarse classification shared by every spvx error type.
///
/// Callers use this to tell a bad shader apart from a target that cannot
/// express it and from a bug in the transpiler itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The input module violates a structural invariant.
    MalformedInput,
    /// The input is valid but the selected target cannot express it.
    Unsupported,
    /// An invariant of the transpiler itself was violated.
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MalformedInput => "malformed input",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal error",
        })
    }
}

/// Errors raised while querying or mutating IR.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// An ID is not below the module's ID bound.
    #[error("id {id} out of bounds (bound: {bound})")]
    BadId { id: u32, bound: u32 },

    /// An ID holds a different kind of entity than the caller expected.
    #[error("id {id} is a {found}, expected a {expected}")]
    KindMismatch {
        id: u32,
        expected: VariantKind,
        found: VariantKind,
    },

    /// A struct member index is past the end of the struct.
    #[error("member index {index} out of range for struct {id}")]
    BadMember { id: u32, index: u32 },

    /// No entry point with the requested name exists.
    #[error("entry point '{0}' not found")]
    UnknownEntryPoint(String),

    /// A query that requires an entry point was made on a module without one.
    #[error("module has no entry point")]
    NoEntryPoint,

    /// The module is well-formed SPIR-V but lacks information a query needs.
    #[error("{0}")]
    Malformed(String),

    /// The module uses a construct the requested transformation cannot express.
    #[error("{0}")]
    Unsupported(String),

    /// A query could not be answered for the given entity.
    #[error("{0}")]
    Invalid(String),
}

impl IrError {
    /// Returns the error class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownEntryPoint(_) | Self::NoEntryPoint | Self::Malformed(_) => {
                ErrorClass::MalformedInput
            }
            Self::Unsupported(_) => ErrorClass::Unsupported,
            _ => ErrorClass::Internal,
        }
    }
}
