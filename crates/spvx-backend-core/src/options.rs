//! Compiler options shared by every emission target.

use std::fmt;
use std::str::FromStr;

use spirv::ExecutionModel;
use spvx_ir::BaseType;

/// Default precision of an ES fragment shader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    /// No precision statement is emitted.
    DontCare,
    /// `lowp`.
    Lowp,
    /// `mediump`.
    #[default]
    Mediump,
    /// `highp`.
    Highp,
}

impl Precision {
    /// The GLSL keyword, or `None` for [`Precision::DontCare`].
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Self::DontCare => None,
            Self::Lowp => Some("lowp"),
            Self::Mediump => Some("mediump"),
            Self::Highp => Some("highp"),
        }
    }
}

/// Vertex stage options.
#[derive(Clone, Debug, Default)]
pub struct VertexOptions {
    /// Remap clip-space Z from [-w, w] to [0, w] at the end of the entry point.
    pub fixup_clipspace: bool,
}

/// Fragment stage options.
#[derive(Clone, Debug)]
pub struct FragmentOptions {
    /// Precision statement for `float` in ES fragment shaders.
    pub default_float_precision: Precision,
    /// Precision statement for `int` in ES fragment shaders.
    pub default_int_precision: Precision,
}

impl Default for FragmentOptions {
    fn default() -> Self {
        Self {
            default_float_precision: Precision::Mediump,
            default_int_precision: Precision::Highp,
        }
    }
}

/// Renames a resource before emission so it binds to an externally fixed name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRename {
    /// Name as declared in the module.
    pub from: String,
    /// Name to emit instead.
    pub to: String,
}

/// Packed pixel formats usable for pixel local storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlsFormat {
    /// Packed 11/11/10-bit float.
    R11FG11FB10F,
    /// One 32-bit float.
    R32F,
    /// Two 16-bit floats.
    RG16F,
    /// 10/10/10/2-bit unsigned normalized.
    RGB10A2,
    /// Four 8-bit unsigned normalized.
    RGBA8,
    /// Two 16-bit unsigned normalized.
    RG16,
    /// Four 8-bit signed integers.
    RGBA8I,
    /// Two 16-bit signed integers.
    RG16I,
    /// 10/10/10/2-bit unsigned integers.
    RGB10A2UI,
    /// Four 8-bit unsigned integers.
    RGBA8UI,
    /// Two 16-bit unsigned integers.
    RG16UI,
    /// One 32-bit unsigned integer.
    R32UI,
}

impl PlsFormat {
    const ALL: [Self; 12] = [
        Self::R11FG11FB10F,
        Self::R32F,
        Self::RG16F,
        Self::RGB10A2,
        Self::RGBA8,
        Self::RG16,
        Self::RGBA8I,
        Self::RG16I,
        Self::RGB10A2UI,
        Self::RGBA8UI,
        Self::RG16UI,
        Self::R32UI,
    ];

    /// The `layout()` qualifier spelling.
    pub fn layout_name(self) -> &'static str {
        match self {
            Self::R11FG11FB10F => "r11f_g11f_b10f",
            Self::R32F => "r32f",
            Self::RG16F => "rg16f",
            Self::RGB10A2 => "rgb10_a2",
            Self::RGBA8 => "rgba8",
            Self::RG16 => "rg16",
            Self::RGBA8I => "rgba8i",
            Self::RG16I => "rg16i",
            Self::RGB10A2UI => "rgb10_a2ui",
            Self::RGBA8UI => "rgba8ui",
            Self::RG16UI => "rg16ui",
            Self::R32UI => "r32ui",
        }
    }

    /// Number of vector components the format holds.
    pub fn components(self) -> u32 {
        match self {
            Self::R32F | Self::R32UI => 1,
            Self::RG16F | Self::RG16 | Self::RG16I | Self::RG16UI => 2,
            Self::R11FG11FB10F => 3,
            Self::RGB10A2 | Self::RGBA8 | Self::RGBA8I | Self::RGB10A2UI | Self::RGBA8UI => 4,
        }
    }

    /// Scalar type a shader reads the format as.
    pub fn basetype(self) -> BaseType {
        match self {
            Self::R11FG11FB10F | Self::R32F | Self::RG16F | Self::RGB10A2 | Self::RGBA8 | Self::RG16 => {
                BaseType::Float
            }
            Self::RGBA8I | Self::RG16I => BaseType::Int,
            Self::RGB10A2UI | Self::RGBA8UI | Self::RG16UI | Self::R32UI => BaseType::UInt,
        }
    }
}

impl fmt::Display for PlsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layout_name())
    }
}

/// Error returned when parsing an unknown [`PlsFormat`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown pixel local storage format '{0}'")]
pub struct UnknownPlsFormat(pub String);

impl FromStr for PlsFormat {
    type Err = UnknownPlsFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.layout_name() == lower || f.layout_name().replace('_', "") == lower)
            .ok_or_else(|| UnknownPlsFormat(s.to_string()))
    }
}

/// Maps a shader variable onto a pixel local storage slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlsRemap {
    /// Name of the variable to remap.
    pub name: String,
    /// Storage format of the slot.
    pub format: PlsFormat,
}

/// Descriptor set that addresses the push constant block in a
/// [`MslResourceBinding`]; its binding is always 0.
pub const PUSH_CONSTANT_DESC_SET: u32 = u32::MAX;

/// Assigns Metal argument-table indices to one descriptor binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MslResourceBinding {
    /// Stage the binding applies to.
    pub stage: ExecutionModel,
    /// Descriptor set, or [`PUSH_CONSTANT_DESC_SET`].
    pub desc_set: u32,
    /// Binding within the set.
    pub binding: u32,
    /// `[[buffer(n)]]` index.
    pub msl_buffer: u32,
    /// `[[texture(n)]]` index.
    pub msl_texture: u32,
    /// `[[sampler(n)]]` index.
    pub msl_sampler: u32,
}

/// Places a vertex attribute in a Metal vertex buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MslVertexAttr {
    /// Vertex input location.
    pub location: u32,
    /// Vertex buffer the attribute is read from.
    pub msl_buffer: u32,
    /// Byte offset within each element.
    pub msl_offset: u32,
    /// Byte stride between elements.
    pub msl_stride: u32,
    /// Advance per instance instead of per vertex.
    pub per_instance: bool,
}

/// Options specific to Metal output.
#[derive(Clone, Debug, Default)]
pub struct MslOptions {
    /// Negate `gl_Position.y` before returning from a vertex entry point.
    pub flip_vert_y: bool,
    /// Flip the Y texture coordinate of 2D samples in fragment entry points.
    pub flip_frag_y: bool,
    /// Emit `[[point_size]]`, which Metal only accepts when drawing points.
    pub is_rendering_points: bool,
    /// The vertex buffer fed through `[[stage_in]]`; attributes remapped
    /// to other buffers are read by index instead.
    pub vertex_buffer_index: u32,
    /// Explicit argument-table placement of resources.
    pub resource_bindings: Vec<MslResourceBinding>,
    /// Vertex attributes read from explicit buffers.
    pub vertex_attributes: Vec<MslVertexAttr>,
}

/// Options recognized by every emission target.
///
/// Targets ignore what does not apply to them; the MSL and C++ backends
/// pin the language version they need.
#[derive(Clone, Debug, Default)]
pub struct CompilerOptions {
    /// Shading-language version. `None` uses the module's `OpSource`
    /// version, or 450 when the source language is unknown.
    pub version: Option<u32>,
    /// Target OpenGL ES.
    pub es: bool,
    /// Emit Vulkan GLSL, keeping separate images and samplers.
    pub vulkan_semantics: bool,
    /// Never forward expressions; every value becomes a temporary.
    pub force_temporary: bool,
    /// Vertex stage options.
    pub vertex: VertexOptions,
    /// Fragment stage options.
    pub fragment: FragmentOptions,
    /// Active entry point by name; the first declared one when unset.
    pub entry_point: Option<String>,
    /// Resource renames applied before emission.
    pub renames: Vec<ResourceRename>,
    /// Extra extensions to require in the output.
    pub extensions: Vec<String>,
    /// Fragment inputs remapped to pixel local storage.
    pub pls_inputs: Vec<PlsRemap>,
    /// Fragment outputs remapped to pixel local storage.
    pub pls_outputs: Vec<PlsRemap>,
    /// Metal options.
    pub msl: MslOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pls_format_parses_both_spellings() {
        assert_eq!("rgba8".parse::<PlsFormat>().unwrap(), PlsFormat::RGBA8);
        assert_eq!("RGB10A2UI".parse::<PlsFormat>().unwrap(), PlsFormat::RGB10A2UI);
        assert_eq!(
            "r11f_g11f_b10f".parse::<PlsFormat>().unwrap(),
            PlsFormat::R11FG11FB10F
        );
        assert!("bgra8".parse::<PlsFormat>().is_err());
    }

    #[test]
    fn pls_format_shapes() {
        assert_eq!(PlsFormat::R11FG11FB10F.components(), 3);
        assert_eq!(PlsFormat::RG16UI.components(), 2);
        assert_eq!(PlsFormat::RG16I.basetype(), BaseType::Int);
        assert_eq!(PlsFormat::RGB10A2.to_string(), "rgb10_a2");
    }

    #[test]
    fn defaults() {
        let opts = CompilerOptions::default();
        assert_eq!(opts.version, None);
        assert_eq!(opts.fragment.default_float_precision, Precision::Mediump);
        assert_eq!(opts.fragment.default_int_precision, Precision::Highp);
        assert_eq!(Precision::DontCare.keyword(), None);
    }
}
