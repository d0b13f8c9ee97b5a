//! Per-target hooks of the shared emission engine.

use spirv::BuiltIn;
use spvx_ir::{Constant, Id, Instruction, Module, Parameter, Type};

use super::Emitter;
use crate::BackendError;
use crate::options::CompilerOptions;

/// Spelling and capability switches that differ between targets but need
/// no code of their own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialectTraits {
    /// Statement that discards a fragment.
    pub discard_literal: &'static str,
    /// `float` literals carry an `f` suffix.
    pub float_literal_suffix: bool,
    /// `double` literals carry an `lf` suffix.
    pub double_literal_suffix: bool,
    /// `uint` literals carry a `u` suffix.
    pub uint32_literal_suffix: bool,
    /// 64-bit literals are spelled with `ll` instead of `l`.
    pub long_long_literal_suffix: bool,
    /// Spelling of a 32-bit signed scalar.
    pub basic_int_type: &'static str,
    /// Spelling of a 32-bit unsigned scalar.
    pub basic_uint_type: &'static str,
    /// Swizzles are spelled `v.xy()` instead of `v.xy`.
    pub swizzle_is_function: bool,
    /// Workgroup variables need no `shared` keyword.
    pub shared_is_implied: bool,
    /// A runtime array may be declared as `T name[]`.
    pub flexible_member_array_supported: bool,
    /// Struct types are spelled `struct Name`.
    pub explicit_struct_type: bool,
    /// Composites are constructed with `{ ... }` instead of `Type(...)`.
    pub use_initializer_list: bool,
    /// Row-major matrices can be used without a transpose.
    pub native_row_major_matrix: bool,
    /// `mix()` accepts a boolean selector when the language version allows it.
    pub boolean_mix_support: bool,
}

impl Default for DialectTraits {
    fn default() -> Self {
        Self {
            discard_literal: "discard",
            float_literal_suffix: false,
            double_literal_suffix: true,
            uint32_literal_suffix: true,
            long_long_literal_suffix: false,
            basic_int_type: "int",
            basic_uint_type: "uint",
            swizzle_is_function: false,
            shared_is_implied: false,
            flexible_member_array_supported: true,
            explicit_struct_type: false,
            use_initializer_list: false,
            native_row_major_matrix: true,
            boolean_mix_support: true,
        }
    }
}

/// A target language driven by the shared [`Emitter`].
///
/// Hooks are associated functions that receive the whole emitter, so an
/// override can call back into the engine, and into the default it
/// replaces through the matching `default_*` method.
pub trait Dialect: Sized + Clone {
    /// Spelling switches for this target.
    fn traits(&self) -> DialectTraits {
        DialectTraits::default()
    }

    /// Rewrites the module once before the first pass.
    fn prepare(&mut self, _module: &mut Module, _options: &CompilerOptions) -> Result<(), BackendError> {
        Ok(())
    }

    /// Adjusts the `(version, es)` pair the engine checks features against.
    fn language_version(&self, version: u32, es: bool) -> (u32, bool) {
        (version, es)
    }

    /// Emits the version line, extensions and stage layouts.
    fn emit_header(em: &mut Emitter<'_, Self>) -> Result<(), BackendError>;

    /// Declares structs, interface variables and resources.
    fn emit_resources(em: &mut Emitter<'_, Self>) -> Result<(), BackendError>;

    /// Emits the whole translation unit.
    fn emit_source(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        em.default_emit_source()
    }

    /// Emits the signature line of `func`.
    fn emit_function_prototype(em: &mut Emitter<'_, Self>, func: Id) -> Result<(), BackendError> {
        em.default_emit_function_prototype(func)
    }

    /// Declares one function parameter.
    fn argument_decl(em: &mut Emitter<'_, Self>, arg: &Parameter) -> Result<String, BackendError> {
        em.default_argument_decl(arg)
    }

    /// Whether a parameter is dropped from prototypes and call sites.
    fn skip_argument(em: &Emitter<'_, Self>, id: Id) -> Result<bool, BackendError> {
        em.default_skip_argument(id)
    }

    /// Spells `id` as a call argument.
    fn to_func_call_arg(em: &mut Emitter<'_, Self>, id: Id) -> Result<String, BackendError> {
        em.to_expression(id)
    }

    /// The identifier `id` is emitted under.
    fn to_name(em: &Emitter<'_, Self>, id: Id, allow_alias: bool) -> String {
        em.module.to_name(id, allow_alias)
    }

    /// Spells a type.
    fn type_to_glsl(em: &mut Emitter<'_, Self>, ty: &Type) -> Result<String, BackendError> {
        em.default_type_to_glsl(ty)
    }

    /// Spells an image, sampler or combined image type.
    fn image_type(em: &mut Emitter<'_, Self>, ty: &Type) -> Result<String, BackendError> {
        em.default_image_type(ty)
    }

    /// Spells a builtin variable.
    fn builtin_to_glsl(em: &mut Emitter<'_, Self>, builtin: BuiltIn) -> Result<String, BackendError> {
        em.default_builtin_to_glsl(builtin)
    }

    /// Declares member `index` of struct `ty`, without the trailing `;`.
    fn member_decl(em: &mut Emitter<'_, Self>, ty: &Type, index: u32) -> Result<String, BackendError> {
        em.default_member_decl(ty, index)
    }

    /// Spells a constant.
    fn constant_expression(em: &mut Emitter<'_, Self>, c: &Constant) -> Result<String, BackendError> {
        em.default_constant_expression(c)
    }

    /// Names the function reinterpreting `input` bits as `output`, or an
    /// empty string when no cast is needed.
    fn bitcast_glsl_op(
        em: &mut Emitter<'_, Self>,
        output: &Type,
        input: &Type,
    ) -> Result<String, BackendError> {
        em.default_bitcast_glsl_op(output, input)
    }

    /// Lowers one block instruction.
    fn emit_instruction(em: &mut Emitter<'_, Self>, inst: &Instruction) -> Result<(), BackendError> {
        em.default_emit_instruction(inst)
    }

    /// Lowers one `GLSL.std.450` instruction.
    fn emit_glsl_op(
        em: &mut Emitter<'_, Self>,
        result_type: Id,
        id: Id,
        eop: u32,
        args: &[u32],
    ) -> Result<(), BackendError> {
        em.default_emit_glsl_op(result_type, id, eop, args)
    }

    /// Lowers a sample, fetch or gather.
    fn emit_texture_op(em: &mut Emitter<'_, Self>, inst: &Instruction) -> Result<(), BackendError> {
        em.default_emit_texture_op(inst)
    }

    /// Lowers `OpSampledImage` pairing `image` with `sampler`.
    fn emit_sampled_image_op(
        em: &mut Emitter<'_, Self>,
        result_type: Id,
        id: Id,
        image: Id,
        sampler: Id,
    ) -> Result<(), BackendError> {
        em.default_emit_sampled_image_op(result_type, id, image, sampler)
    }

    /// Statements appended before every return of the entry point.
    fn emit_fixup(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        em.default_emit_fixup()
    }
}
