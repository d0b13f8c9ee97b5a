//! Word-level decoding of a SPIR-V binary.

use std::borrow::Cow;

use crate::ParseError;

/// Version words accepted in the module header: the 0.99 provisional
/// format, 1.0 and 1.1.
pub const SUPPORTED_VERSIONS: [u32; 3] = [99, 0x0001_0000, 0x0001_0100];

/// Number of words in the module header.
pub const HEADER_WORDS: usize = 5;

/// Largest ID bound a module may declare, from the universal limits table.
pub const MAX_BOUND: u32 = 0x3F_FFFF;

/// The decoded module header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub generator: u32,
    pub bound: u32,
}

/// One instruction as it appears in the word stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawInstruction<'a> {
    pub opcode: u16,
    /// Word offset of the instruction header, for diagnostics.
    pub offset: usize,
    pub operands: &'a [u32],
}

/// Normalizes byte order and validates the header.
///
/// The returned words are native-endian; a byte-reversed magic number
/// causes the whole buffer to be swapped.
pub fn read_header(words: &[u32]) -> Result<(Cow<'_, [u32]>, Header), ParseError> {
    if words.len() < HEADER_WORDS {
        return Err(ParseError::TooSmall(words.len()));
    }

    let words: Cow<'_, [u32]> = if words[0] == spirv::MAGIC_NUMBER.swap_bytes() {
        log::debug!("byte-swapping big-endian module");
        Cow::Owned(words.iter().map(|w| w.swap_bytes()).collect())
    } else {
        Cow::Borrowed(words)
    };

    if words[0] != spirv::MAGIC_NUMBER {
        return Err(ParseError::BadMagic(words[0]));
    }
    if !SUPPORTED_VERSIONS.contains(&words[1]) {
        return Err(ParseError::BadVersion(words[1]));
    }

    if words[3] > MAX_BOUND {
        return Err(ParseError::BadBound(words[3]));
    }

    let header = Header {
        version: words[1],
        generator: words[2],
        bound: words[3],
    };
    Ok((words, header))
}

/// Iterator over the instructions following the header.
pub struct InstructionReader<'a> {
    words: &'a [u32],
    offset: usize,
}

impl<'a> InstructionReader<'a> {
    /// Creates a reader over a whole module, skipping the header.
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            offset: HEADER_WORDS.min(words.len()),
        }
    }
}

impl<'a> Iterator for InstructionReader<'a> {
    type Item = Result<RawInstruction<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.words.len() {
            return None;
        }

        let offset = self.offset;
        let word = self.words[offset];
        let opcode = (word & 0xffff) as u16;
        let count = (word >> 16) as usize;

        if count == 0 {
            self.offset = self.words.len();
            return Some(Err(ParseError::ZeroWordCount { offset }));
        }
        if offset + count > self.words.len() {
            self.offset = self.words.len();
            return Some(Err(ParseError::OutOfBounds { offset }));
        }

        self.offset += count;
        Some(Ok(RawInstruction {
            opcode,
            offset,
            operands: &self.words[offset + 1..offset + count],
        }))
    }
}

/// Decodes a nul-terminated literal string packed little-endian into words.
///
/// Returns the string and the number of words it occupies, including the
/// terminator.
pub fn read_string(words: &[u32]) -> Option<(String, usize)> {
    let mut bytes = Vec::new();
    for (i, word) in words.iter().enumerate() {
        for byte in word.to_le_bytes() {
            if byte == 0 {
                return Some((String::from_utf8_lossy(&bytes).into_owned(), i + 1));
            }
            bytes.push(byte);
        }
    }
    None
}

/// Packs a byte buffer into words, honoring the module's own byte order.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, ParseError> {
    if bytes.len() % 4 != 0 {
        return Err(ParseError::Misaligned(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
