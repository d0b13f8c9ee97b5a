//! The Metal Shading Language dialect of the shared emitter.

use std::collections::HashSet;

use log::debug;
use spirv::{BuiltIn, Decoration, Dim, ExecutionMode, ExecutionModel, GLOp, Op, StorageClass};
use spvx_backend_core::BackendError;
use spvx_backend_core::emit::constant::opcode_is_sign_invariant;
use spvx_backend_core::emit::instr::Operands;
use spvx_backend_core::emit::{Dialect, DialectTraits, Emitter};
use spvx_backend_core::options::CompilerOptions;
use spvx_ir::{
    BaseType, Constant, Function, Id, Instruction, Module, Parameter, Type, Variable, VariantKind,
};

use crate::interface::{
    InterfaceLayout, add_interface_structs, add_vertex_index_builtins, extract_global_parameters,
    localize_private_variables,
};
use crate::names::{builtin_name, builtin_qualifier, clean_entry_name, clean_func_name};
use crate::resources::{ResourceCounters, buffer_address_space, entry_point_args};
use crate::texture;

/// Metal dialect state. Everything here is derived once in
/// [`Dialect::prepare`]; the counters restart with every pass because
/// each pass works on its own clone.
#[derive(Clone, Debug, Default)]
pub struct Msl {
    pub(crate) entry_name: String,
    pub(crate) layout: InterfaceLayout,
    pub(crate) counters: ResourceCounters,
}

impl Msl {
    /// Name the entry point function is emitted under.
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }
}

fn scalar_name(ty: &Type) -> Result<&'static str, BackendError> {
    Ok(match (ty.basetype, ty.width) {
        (BaseType::Boolean, _) => "bool",
        (BaseType::Char, _) => "char",
        (BaseType::Int, 16) => "short",
        (BaseType::UInt, 16) => "ushort",
        (BaseType::Int, _) => "int",
        (BaseType::UInt, _) => "uint",
        (BaseType::Int64, _) => "long",
        (BaseType::UInt64, _) => "ulong",
        (BaseType::AtomicCounter, _) => "atomic_uint",
        (BaseType::Float, 16) => "half",
        (BaseType::Float, _) => "float",
        (BaseType::Double, _) => "double",
        (other, _) => {
            return Err(BackendError::Unsupported(format!("{other:?} has no Metal spelling")));
        }
    })
}

fn comparison(op: Op) -> Option<(&'static str, Option<BaseType>)> {
    Some(match op {
        Op::IEqual => ("==", Some(BaseType::Int)),
        Op::INotEqual => ("!=", Some(BaseType::Int)),
        Op::LogicalEqual | Op::FOrdEqual => ("==", None),
        Op::LogicalNotEqual | Op::FOrdNotEqual => ("!=", None),
        Op::UGreaterThan => (">", Some(BaseType::UInt)),
        Op::SGreaterThan => (">", Some(BaseType::Int)),
        Op::FOrdGreaterThan => (">", None),
        Op::UGreaterThanEqual => (">=", Some(BaseType::UInt)),
        Op::SGreaterThanEqual => (">=", Some(BaseType::Int)),
        Op::FOrdGreaterThanEqual => (">=", None),
        Op::ULessThan => ("<", Some(BaseType::UInt)),
        Op::SLessThan => ("<", Some(BaseType::Int)),
        Op::FOrdLessThan => ("<", None),
        Op::ULessThanEqual => ("<=", Some(BaseType::UInt)),
        Op::SLessThanEqual => ("<=", Some(BaseType::Int)),
        Op::FOrdLessThanEqual => ("<=", None),
        _ => return None,
    })
}

/// Block types that only describe stage inputs and outputs. Their members
/// are flattened into the interface structs instead.
fn interface_block_types(em: &Emitter<'_, Msl>) -> Result<HashSet<Id>, BackendError> {
    let mut types = HashSet::new();
    for (_, var) in em.module.ids.iter::<Variable>() {
        if matches!(var.storage, StorageClass::Input | StorageClass::Output) {
            types.insert(em.module.get::<Type>(var.basetype)?.self_id);
        }
    }
    Ok(types)
}

fn emit_specialization_constant(em: &mut Emitter<'_, Msl>, c: &Constant) -> Result<(), BackendError> {
    let ty = em.type_of(c.constant_type)?;
    let name = em.to_name(c.self_id);
    let decl = em.variable_decl_typed(&ty, &name)?;
    let value = em.constant_expression(c)?;
    em.statement(&format!("constant {decl} = {value};"));
    Ok(())
}

/// The `[[...]]` attribute of an interface struct member, if any.
fn member_attribute(em: &Emitter<'_, Msl>, ty: &Type, index: u32) -> Result<String, BackendError> {
    let layout = &em.dialect.layout;
    if !layout.struct_types.contains(&ty.self_id) || layout.indexed_types.contains(&ty.self_id) {
        return Ok(String::new());
    }
    let model = em.execution_model()?;
    let storage = ty.storage;

    if let Some(builtin) = em.module.member_builtin(ty, index) {
        let depth = if em.execution()?.has_mode(ExecutionMode::DepthGreater) {
            Some("greater")
        } else if em.execution()?.has_mode(ExecutionMode::DepthLess) {
            Some("less")
        } else {
            None
        };
        let rendering_points = em.options.msl.is_rendering_points;
        return Ok(builtin_qualifier(builtin, model, storage, depth, rendering_points).unwrap_or_default());
    }

    let location = em.module.member_decoration(ty.self_id, index, Decoration::Location);
    Ok(match (model, storage) {
        (ExecutionModel::Vertex, StorageClass::Input) => format!("attribute({location})"),
        (ExecutionModel::Vertex, StorageClass::Output) | (ExecutionModel::Fragment, StorageClass::Input) => {
            format!("user(locn{location})")
        }
        (ExecutionModel::Fragment, StorageClass::Output) => format!("color({location})"),
        _ => String::new(),
    })
}

fn emit_entry_prototype(em: &mut Emitter<'_, Msl>) -> Result<(), BackendError> {
    let entry = em.execution()?;
    let stage = match entry.model {
        ExecutionModel::Vertex => "vertex",
        ExecutionModel::Fragment if entry.has_mode(ExecutionMode::EarlyFragmentTests) => {
            "[[early_fragment_tests]] fragment"
        }
        ExecutionModel::Fragment => "fragment",
        ExecutionModel::GLCompute => "kernel",
        other => {
            return Err(BackendError::Unsupported(format!("Metal has no {other:?} stage")));
        }
    };
    let ret = match em.dialect.layout.stage_out {
        Some(out) => {
            let ty = em.type_of(em.module.get::<Variable>(out)?.basetype)?;
            em.type_to_glsl(&ty)?
        }
        None => "void".to_string(),
    };
    let args = entry_point_args(em)?;
    let name = em.dialect.entry_name.clone();
    em.statement(&format!("{stage} {ret} {name}({args})"));
    Ok(())
}

impl Dialect for Msl {
    fn traits(&self) -> DialectTraits {
        DialectTraits {
            discard_literal: "discard_fragment()",
            float_literal_suffix: false,
            double_literal_suffix: false,
            flexible_member_array_supported: false,
            native_row_major_matrix: false,
            boolean_mix_support: false,
            ..DialectTraits::default()
        }
    }

    fn prepare(&mut self, module: &mut Module, options: &CompilerOptions) -> Result<(), BackendError> {
        let entry = module.entry_point()?;
        let model = entry.model;
        if !matches!(
            model,
            ExecutionModel::Vertex | ExecutionModel::Fragment | ExecutionModel::GLCompute
        ) {
            return Err(BackendError::Unsupported(format!("Metal has no {model:?} stage")));
        }
        self.entry_name = clean_entry_name(&entry.name);

        add_vertex_index_builtins(module)?;
        localize_private_variables(module)?;
        self.layout = add_interface_structs(module, &options.msl, &self.entry_name)?;
        extract_global_parameters(module)?;

        if model == ExecutionModel::Vertex {
            for attr in &options.msl.vertex_attributes {
                self.counters.reserve_buffer(attr.msl_buffer);
            }
        }
        debug!(
            "prepared {} for Metal with {} stage input struct(s)",
            self.entry_name,
            self.layout.stage_in.len()
        );
        Ok(())
    }

    /// Metal has no language version the engine's legacy paths key off.
    fn language_version(&self, _version: u32, _es: bool) -> (u32, bool) {
        (450, false)
    }

    fn emit_header(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        em.statement("#include <metal_stdlib>");
        em.statement("#include <simd/simd.h>");
        em.statement("");
        em.statement("using namespace metal;");
        em.statement("");
        Ok(())
    }

    fn emit_resources(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        let mut emitted = false;
        for id in em.module.ids.ids_of::<Constant>() {
            let c = em.module.get::<Constant>(id)?.clone();
            if c.specialization {
                emit_specialization_constant(em, &c)?;
                emitted = true;
            }
        }
        if emitted {
            em.statement("");
        }

        let interface_blocks = interface_block_types(em)?;
        for id in em.module.ids.ids_of::<Type>() {
            let ty = em.type_of(id)?;
            let declarable = ty.basetype == BaseType::Struct
                && ty.self_id == id
                && ty.array.is_empty()
                && !ty.pointer;
            if !declarable
                || em.dialect.layout.struct_types.contains(&id)
                || (em.is_block(&ty) && interface_blocks.contains(&id))
            {
                continue;
            }
            em.emit_struct(&ty)?;
        }

        let mut interface_vars = em.dialect.layout.stage_in.clone();
        interface_vars.extend(em.dialect.layout.stage_out);
        for var in interface_vars {
            let basetype = em.module.get::<Variable>(var)?.basetype;
            let ty = em.type_of(basetype)?;
            em.emit_struct(&ty)?;
        }
        Ok(())
    }

    fn emit_function_prototype(em: &mut Emitter<'_, Self>, func_id: Id) -> Result<(), BackendError> {
        em.local_variable_names = em.resource_names.clone();
        if em.processing_entry_point {
            return emit_entry_prototype(em);
        }

        let func = em.module.get::<Function>(func_id)?.clone();
        let ret = em.type_of(func.return_type)?;
        let mut decl = format!("{} {}", em.type_to_glsl(&ret)?, em.to_name(func_id));

        let mut args = Vec::with_capacity(func.arguments.len());
        for arg in &func.arguments {
            em.add_local_variable_name(arg.id);
            args.push(Self::argument_decl(em, arg)?);
            if em.expression_type(arg.id)?.basetype == BaseType::SampledImage {
                args.push(format!("thread const sampler& {}Smplr", em.to_name(arg.id)));
            }
        }
        decl.push_str(&format!("({})", args.join(", ")));
        em.statement(&decl);
        Ok(())
    }

    fn argument_decl(em: &mut Emitter<'_, Self>, arg: &Parameter) -> Result<String, BackendError> {
        let ty = em.expression_type(arg.id)?;
        let name = em.to_name(arg.id);
        let spelled = em.type_to_glsl(&ty)?;
        let array = em.type_to_array_glsl(&ty)?;
        if !ty.pointer {
            return Ok(format!("{spelled} {name}{array}"));
        }

        let var = em.module.get::<Variable>(arg.id)?.clone();
        let global = Variable {
            storage: ty.storage,
            ..var
        };
        let space = match ty.storage {
            StorageClass::Uniform | StorageClass::PushConstant | StorageClass::StorageBuffer => {
                buffer_address_space(&em.module, &global)
            }
            _ => "thread",
        };
        let constness = if arg.write_count == 0 && space == "thread" { "const " } else { "" };
        if array.is_empty() {
            Ok(format!("{space} {constness}{spelled}& {name}"))
        } else {
            Ok(format!("{space} {constness}{spelled} (&{name}){array}"))
        }
    }

    fn skip_argument(_em: &Emitter<'_, Self>, _id: Id) -> Result<bool, BackendError> {
        Ok(false)
    }

    fn to_func_call_arg(em: &mut Emitter<'_, Self>, id: Id) -> Result<String, BackendError> {
        let arg = em.to_expression(id)?;
        if em.expression_type(id)?.basetype == BaseType::SampledImage {
            let sampler = texture::sampler_expression(em, id)?;
            Ok(format!("{arg}, {sampler}"))
        } else {
            Ok(arg)
        }
    }

    fn to_name(em: &Emitter<'_, Self>, id: Id, allow_alias: bool) -> String {
        if em.in_entry_function() {
            let qualified = &em.module.meta(id).decoration.qualified_alias;
            if !qualified.is_empty() {
                return qualified.clone();
            }
        }
        let name = em.module.to_name(id, allow_alias);
        if em.module.kind(id) == VariantKind::Function {
            clean_func_name(name)
        } else {
            name
        }
    }

    fn type_to_glsl(em: &mut Emitter<'_, Self>, ty: &Type) -> Result<String, BackendError> {
        match ty.basetype {
            BaseType::Struct => return Ok(em.to_name(ty.self_id)),
            BaseType::Image | BaseType::SampledImage => return Self::image_type(em, ty),
            BaseType::Sampler => return Ok("sampler".into()),
            BaseType::Void => return Ok("void".into()),
            _ => {}
        }
        let scalar = scalar_name(ty)?;
        Ok(if ty.columns > 1 {
            format!("{scalar}{}x{}", ty.columns, ty.vecsize)
        } else if ty.vecsize > 1 {
            format!("{scalar}{}", ty.vecsize)
        } else {
            scalar.to_string()
        })
    }

    fn image_type(em: &mut Emitter<'_, Self>, ty: &Type) -> Result<String, BackendError> {
        let info = &ty.image;
        let kind = match (info.depth, info.dim) {
            (true, Dim::Dim2D) if info.ms => "depth2d_ms",
            (true, Dim::Dim2D) if info.arrayed => "depth2d_array",
            (true, Dim::Dim2D) => "depth2d",
            (true, Dim::DimCube) if info.arrayed => "depthcube_array",
            (true, Dim::DimCube) => "depthcube",
            (false, Dim::Dim1D) if info.arrayed => "texture1d_array",
            (false, Dim::Dim1D) => "texture1d",
            (false, Dim::Dim2D | Dim::DimBuffer) if info.ms => "texture2d_ms",
            (false, Dim::Dim2D | Dim::DimBuffer) if info.arrayed => "texture2d_array",
            (false, Dim::Dim2D | Dim::DimBuffer) => "texture2d",
            (false, Dim::Dim3D) => "texture3d",
            (false, Dim::DimCube) if info.arrayed => "texturecube_array",
            (false, Dim::DimCube) => "texturecube",
            (depth, dim) => {
                return Err(BackendError::Unsupported(format!(
                    "{}image dimension {dim:?} has no Metal texture type",
                    if depth { "depth " } else { "" }
                )));
            }
        };
        let texel = em.type_of(info.sampled_type)?;
        let texel = em.type_to_glsl(&texel)?;
        if ty.basetype == BaseType::Image && info.sampled == 2 {
            Ok(format!("{kind}<{texel}, access::read_write>"))
        } else {
            Ok(format!("{kind}<{texel}>"))
        }
    }

    fn builtin_to_glsl(em: &mut Emitter<'_, Self>, builtin: BuiltIn) -> Result<String, BackendError> {
        if em.in_entry_function() {
            let alias = em.dialect.layout.builtin_aliases.iter().find(|(b, _)| *b == builtin);
            if let Some((_, alias)) = alias {
                return Ok(alias.clone());
            }
        }
        Ok(builtin_name(builtin).to_string())
    }

    fn member_decl(em: &mut Emitter<'_, Self>, ty: &Type, index: u32) -> Result<String, BackendError> {
        let member_type = em.member_type(ty, index)?;
        let name = em.to_member_name(ty, index);
        let decl = em.variable_decl_typed(&member_type, &name)?;
        let attr = member_attribute(em, ty, index)?;
        if attr.is_empty() {
            Ok(decl)
        } else {
            Ok(format!("{decl} [[{attr}]]"))
        }
    }

    fn constant_expression(em: &mut Emitter<'_, Self>, c: &Constant) -> Result<String, BackendError> {
        let ty = em.type_of(c.constant_type)?;
        if !c.subconstants.is_empty() && (ty.is_struct() || ty.is_array()) {
            let mut elems = Vec::with_capacity(c.subconstants.len());
            for &elem in &c.subconstants {
                elems.push(em.constant_reference(elem)?);
            }
            return Ok(format!("{{{}}}", elems.join(", ")));
        }
        em.default_constant_expression(c)
    }

    fn bitcast_glsl_op(em: &mut Emitter<'_, Self>, output: &Type, input: &Type) -> Result<String, BackendError> {
        if output.basetype == input.basetype {
            return Ok(String::new());
        }
        let same_width_ints = output.basetype.is_integer() && input.basetype.is_integer() && output.width == input.width;
        let spelled = em.type_to_glsl(output)?;
        if same_width_ints {
            Ok(spelled)
        } else {
            Ok(format!("as_type<{spelled}>"))
        }
    }

    fn emit_instruction(em: &mut Emitter<'_, Self>, inst: &Instruction) -> Result<(), BackendError> {
        let Some(op) = inst.op() else {
            return em.default_emit_instruction(inst);
        };
        let ops = Operands::new(inst)?;
        if let Some((operator, input)) = comparison(op) {
            let (result_type, id, a, b) = (ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?);
            return match input {
                Some(input) => {
                    let skip = opcode_is_sign_invariant(op);
                    em.emit_binary_op_cast(result_type, id, a, b, operator, input, skip)
                }
                None => em.emit_binary_op(result_type, id, a, b, operator),
            };
        }

        match op {
            Op::FMod => em.emit_binary_func_op(ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?, "fmod"),
            Op::DPdx => em.emit_unary_func_op(ops.id(0)?, ops.id(1)?, ops.id(2)?, "dfdx"),
            Op::DPdy => em.emit_unary_func_op(ops.id(0)?, ops.id(1)?, ops.id(2)?, "dfdy"),

            Op::ImageRead => texture::emit_image_read(em, &ops),
            Op::ImageWrite => texture::emit_image_write(em, &ops),
            Op::ImageQuerySize | Op::ImageQuerySizeLod => texture::emit_image_query_size(em, &ops),
            Op::ImageQueryLevels | Op::ImageQuerySamples => {
                let (result_type, id, image) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
                let query = if op == Op::ImageQueryLevels { "get_num_mip_levels" } else { "get_num_samples" };
                let result = em.type_of(result_type)?;
                let ctor = em.type_to_glsl_constructor(&result)?;
                let expr = format!("{ctor}({}.{query}())", em.to_enclosed_expression(image)?);
                em.emit_op(result_type, id, &expr, true, false)
            }

            Op::ControlBarrier => {
                em.flush_all_active_variables()?;
                em.statement("threadgroup_barrier(mem_flags::mem_threadgroup);");
                Ok(())
            }
            Op::MemoryBarrier => {
                em.flush_all_active_variables()?;
                em.statement("threadgroup_barrier(mem_flags::mem_device);");
                Ok(())
            }

            Op::AtomicExchange
            | Op::AtomicCompareExchange
            | Op::AtomicLoad
            | Op::AtomicStore
            | Op::AtomicIIncrement
            | Op::AtomicIDecrement
            | Op::AtomicIAdd
            | Op::AtomicISub
            | Op::AtomicSMin
            | Op::AtomicUMin
            | Op::AtomicSMax
            | Op::AtomicUMax
            | Op::AtomicAnd
            | Op::AtomicOr
            | Op::AtomicXor => Err(BackendError::Unsupported(format!("{op:?} is not supported for Metal"))),

            _ => em.default_emit_instruction(inst),
        }
    }

    fn emit_glsl_op(
        em: &mut Emitter<'_, Self>,
        result_type: Id,
        id: Id,
        eop: u32,
        args: &[u32],
    ) -> Result<(), BackendError> {
        let arg = |index: usize| -> Result<Id, BackendError> {
            args.get(index).map(|&w| Id::new(w)).ok_or_else(|| {
                BackendError::Malformed(format!("GLSL.std.450 op {eop} is missing operand {index}"))
            })
        };
        match GLOp::from_u32(eop) {
            Some(GLOp::Atan2) => em.emit_binary_func_op(result_type, id, arg(0)?, arg(1)?, "atan2"),
            Some(GLOp::InverseSqrt) => em.emit_unary_func_op(result_type, id, arg(0)?, "rsqrt"),
            Some(GLOp::RoundEven) => em.emit_unary_func_op(result_type, id, arg(0)?, "rint"),
            Some(GLOp::MatrixInverse) => Err(BackendError::Unsupported(
                "Metal has no matrix inverse builtin".into(),
            )),
            _ => em.default_emit_glsl_op(result_type, id, eop, args),
        }
    }

    fn emit_texture_op(em: &mut Emitter<'_, Self>, inst: &Instruction) -> Result<(), BackendError> {
        texture::emit_texture_op(em, inst)
    }

    fn emit_sampled_image_op(
        em: &mut Emitter<'_, Self>,
        result_type: Id,
        id: Id,
        image: Id,
        sampler: Id,
    ) -> Result<(), BackendError> {
        texture::emit_sampled_image_op(em, result_type, id, image, sampler)
    }

    fn emit_fixup(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        if em.execution_model()? != ExecutionModel::Vertex {
            return Ok(());
        }
        let Some(position) = em
            .dialect
            .layout
            .builtin_aliases
            .iter()
            .find(|(b, _)| *b == BuiltIn::Position)
            .map(|(_, alias)| alias.clone())
        else {
            return Ok(());
        };
        if em.options.vertex.fixup_clipspace {
            em.statement(&format!(
                "{position}.z = 2.0 * {position}.z - {position}.w;    // Adjust clip-space for Metal"
            ));
        }
        if em.options.msl.flip_vert_y {
            em.statement(&format!("{position}.y = -({position}.y);    // Invert Y-axis for Metal"));
        }
        Ok(())
    }
}
