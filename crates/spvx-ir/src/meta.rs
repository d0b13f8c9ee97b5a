//! Names and decorations attached to IDs and struct members.

use std::collections::HashSet;

use spirv::{BuiltIn, Decoration};

/// A 64-bit set indexed by small enum discriminants.
///
/// Decorations and execution modes with a discriminant of 64 or above are
/// not tracked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags64(u64);

impl Flags64 {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, bit: u32) -> bool {
        bit < 64 && self.0 & (1u64 << bit) != 0
    }

    pub fn insert(&mut self, bit: u32) {
        if bit < 64 {
            self.0 |= 1u64 << bit;
        }
    }

    pub fn remove(&mut self, bit: u32) {
        if bit < 64 {
            self.0 &= !(1u64 << bit);
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the set bit positions in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..64).filter(move |&bit| self.contains(bit))
    }
}

/// The decoration bag of one ID or one struct member.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decorations {
    /// The sanitized display name.
    pub alias: String,
    /// A fully-qualified access path used by targets that move the entity.
    pub qualified_alias: String,
    pub flags: Flags64,
    pub builtin: Option<BuiltIn>,
    pub location: u32,
    pub component: u32,
    pub set: u32,
    pub binding: u32,
    pub offset: u32,
    pub array_stride: u32,
    pub matrix_stride: u32,
    pub input_attachment: u32,
    pub spec_id: u32,
    /// Vertex-attribute step rate, set by target remapping.
    pub per_instance: bool,
}

impl Decorations {
    pub const fn new() -> Self {
        Self {
            alias: String::new(),
            qualified_alias: String::new(),
            flags: Flags64::empty(),
            builtin: None,
            location: 0,
            component: 0,
            set: 0,
            binding: 0,
            offset: 0,
            array_stride: 0,
            matrix_stride: 0,
            input_attachment: 0,
            spec_id: 0,
            per_instance: false,
        }
    }

    pub fn has(&self, decoration: Decoration) -> bool {
        self.flags.contains(decoration as u32)
    }

    /// Records `decoration` and its literal argument.
    pub fn set(&mut self, decoration: Decoration, argument: u32) {
        self.flags.insert(decoration as u32);
        match decoration {
            Decoration::BuiltIn => self.builtin = BuiltIn::from_u32(argument),
            Decoration::Location => self.location = argument,
            Decoration::Component => self.component = argument,
            Decoration::Offset => self.offset = argument,
            Decoration::ArrayStride => self.array_stride = argument,
            Decoration::MatrixStride => self.matrix_stride = argument,
            Decoration::Binding => self.binding = argument,
            Decoration::DescriptorSet => self.set = argument,
            Decoration::InputAttachmentIndex => self.input_attachment = argument,
            Decoration::SpecId => self.spec_id = argument,
            _ => {}
        }
    }

    /// Returns the literal argument of `decoration`, or 0 when it is absent.
    pub fn get(&self, decoration: Decoration) -> u32 {
        if !self.has(decoration) {
            return 0;
        }
        match decoration {
            Decoration::BuiltIn => self.builtin.map_or(0, |b| b as u32),
            Decoration::Location => self.location,
            Decoration::Component => self.component,
            Decoration::Offset => self.offset,
            Decoration::ArrayStride => self.array_stride,
            Decoration::MatrixStride => self.matrix_stride,
            Decoration::Binding => self.binding,
            Decoration::DescriptorSet => self.set,
            Decoration::InputAttachmentIndex => self.input_attachment,
            Decoration::SpecId => self.spec_id,
            _ => 0,
        }
    }

    pub fn unset(&mut self, decoration: Decoration) {
        self.flags.remove(decoration as u32);
        match decoration {
            Decoration::BuiltIn => self.builtin = None,
            Decoration::Location => self.location = 0,
            Decoration::Component => self.component = 0,
            Decoration::Offset => self.offset = 0,
            Decoration::ArrayStride => self.array_stride = 0,
            Decoration::MatrixStride => self.matrix_stride = 0,
            Decoration::Binding => self.binding = 0,
            Decoration::DescriptorSet => self.set = 0,
            Decoration::InputAttachmentIndex => self.input_attachment = 0,
            Decoration::SpecId => self.spec_id = 0,
            _ => {}
        }
    }
}

/// All metadata recorded for one ID.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Meta {
    pub decoration: Decorations,
    pub members: Vec<Decorations>,
    /// The sampler paired with an image by `OpSampledImage`, for targets
    /// with separate texture and sampler arguments.
    pub sampler: Option<crate::Id>,
}

impl Meta {
    pub const fn new() -> Self {
        Self {
            decoration: Decorations::new(),
            members: Vec::new(),
            sampler: None,
        }
    }

    /// Returns the member bag, growing the member list as needed.
    pub fn member_mut(&mut self, index: u32) -> &mut Decorations {
        let index = index as usize;
        if self.members.len() <= index {
            self.members.resize(index + 1, Decorations::default());
        }
        &mut self.members[index]
    }

    pub fn member(&self, index: u32) -> Option<&Decorations> {
        self.members.get(index as usize)
    }
}

/// Turns an externally supplied name into a valid identifier.
///
/// Returns an empty string for names of the form `_<digit>...`, which are
/// reserved for compiler temporaries. Anything from the first `(` on is
/// dropped, since some front ends mangle function names that way.
pub fn sanitize_name(name: &str) -> String {
    let bytes = name.as_bytes();
    if bytes.is_empty() || (bytes[0] == b'_' && bytes.len() >= 2 && bytes[1].is_ascii_digit()) {
        return String::new();
    }

    let trimmed = name.split('(').next().unwrap_or_default();
    // A non-alphabetic first byte becomes '_', so the second byte must not be a digit.
    let leading_underscore = trimmed
        .bytes()
        .next()
        .is_some_and(|c| !c.is_ascii_alphabetic());
    trimmed
        .bytes()
        .enumerate()
        .map(|(i, c)| {
            let head = i == 0 || (leading_underscore && i == 1);
            let ok = if head {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            };
            if ok {
                char::from(c)
            } else {
                '_'
            }
        })
        .collect()
}

/// Makes `name` unique within `cache` by appending `_1`, `_2`, ... and records it.
pub fn update_name_cache(cache: &mut HashSet<String>, name: &mut String) {
    if name.is_empty() {
        return;
    }
    if cache.insert(name.clone()) {
        return;
    }

    let base = name.clone();
    let mut counter = 0u32;
    loop {
        counter += 1;
        let candidate = format!("{base}_{counter}");
        if !cache.contains(&candidate) {
            *name = candidate;
            break;
        }
    }
    cache.insert(name.clone());
}
