//! SPIR-V parser for spvx.
//!
//! Decodes a binary SPIR-V module into an [`spvx_ir::Module`] in a single
//! pass over the instruction stream. Any violated structural invariant
//! aborts the parse; there is no partial result.

mod lower;
pub mod reader;

use spvx_ir::{ErrorClass, IrError, Module};

pub use reader::{Header, SUPPORTED_VERSIONS};

/// Parses a module from native-endian (or byte-reversed) words.
pub fn parse(words: &[u32]) -> Result<Module, ParseError> {
    let (words, header) = reader::read_header(words)?;
    log::debug!(
        "parsing SPIR-V {:#x}, generator {:#x}, bound {}",
        header.version,
        header.generator,
        header.bound
    );

    // Decode every instruction header up front so bounds errors surface
    // before any of the module is interpreted.
    let instructions = reader::InstructionReader::new(&words).collect::<Result<Vec<_>, _>>()?;

    let mut ctx = lower::ParseCtx::new(header.bound);
    for inst in &instructions {
        ctx.handle(inst)?;
    }
    ctx.finish()
}

/// Parses a module from its on-disk byte representation.
pub fn parse_bytes(bytes: &[u8]) -> Result<Module, ParseError> {
    let words = reader::words_from_bytes(bytes)?;
    parse(&words)
}

/// Errors raised while decoding a module.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("SPIR-V module too small: {0} word(s), a header needs 5")]
    TooSmall(usize),
    #[error("SPIR-V byte length {0} is not a multiple of 4")]
    Misaligned(usize),
    #[error("invalid SPIR-V magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported SPIR-V version {0:#x}")]
    BadVersion(u32),
    #[error("ID bound {0} exceeds the limit of {max}", max = reader::MAX_BOUND)]
    BadBound(u32),
    #[error("instruction at word {offset} consumes 0 words")]
    ZeroWordCount { offset: usize },
    #[error("instruction at word {offset} runs past the end of the module")]
    OutOfBounds { offset: usize },
    #[error("opcode {opcode} needs at least {needed} operand word(s), found {found}")]
    MissingOperands {
        opcode: u16,
        needed: usize,
        found: usize,
    },
    #[error("opcode {opcode} has an unterminated string operand")]
    BadString { opcode: u16 },
    #[error("id {id} is out of bounds (bound: {bound})")]
    BadId { id: u32, bound: u32 },
    #[error("cannot make a pointer to pointer type (id {0})")]
    PointerToPointer(u32),
    #[error("{0}")]
    Structure(&'static str),
    #[error("composite constant {id} has {count} element(s); 1 to 4 are supported")]
    BadComposite { id: u32, count: usize },
    #[error("type {id} has {count} {what}; 1 to 4 are supported")]
    BadShape {
        id: u32,
        what: &'static str,
        count: u32,
    },
    #[error("unsupported capability {0:?}")]
    UnsupportedCapability(spirv::Capability),
    #[error("unsupported extended instruction set '{0}'")]
    UnsupportedExtInstSet(String),
    #[error(transparent)]
    Ir(#[from] IrError),
}

impl ParseError {
    /// Classifies this error; only legal-but-unsupported features are not
    /// malformed input.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedCapability(_) | Self::UnsupportedExtInstSet(_) => {
                ErrorClass::Unsupported
            }
            _ => ErrorClass::MalformedInput,
        }
    }
}
