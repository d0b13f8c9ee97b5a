//! The GLSL dialect: headers, extensions and global declarations.
//!
//! Function bodies are produced entirely by the shared engine's defaults;
//! this module only decides what goes above the first function.

use std::collections::HashSet;

use log::debug;
use spirv::{BuiltIn, Decoration, Dim, ExecutionMode, ExecutionModel, StorageClass};
use spvx_analysis::build_combined_image_samplers;
use spvx_backend_core::emit::{Dialect, Emitter};
use spvx_backend_core::options::{PlsFormat, PlsRemap};
use spvx_backend_core::{BackendError, CompilerOptions};
use spvx_ir::{BaseType, Constant, EntryPoint, Id, Module, Type, Variable};

use crate::layout::layout_for_variable;

/// A variable remapped onto a pixel local storage slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlsSlot {
    pub var: Id,
    pub format: PlsFormat,
}

/// GLSL, GLSL ES and Vulkan GLSL.
#[derive(Clone, Debug, Default)]
pub struct Glsl {
    pls_inputs: Vec<PlsSlot>,
    pls_outputs: Vec<PlsSlot>,
}

impl Glsl {
    pub fn pls_inputs(&self) -> &[PlsSlot] {
        &self.pls_inputs
    }

    pub fn pls_outputs(&self) -> &[PlsSlot] {
        &self.pls_outputs
    }
}

fn find_variable(module: &Module, name: &str) -> Result<Id, BackendError> {
    module
        .ids
        .ids_of::<Variable>()
        .into_iter()
        .find(|&id| module.name(id) == name)
        .ok_or_else(|| {
            BackendError::Unsupported(format!(
                "no variable named '{name}' to remap to pixel local storage"
            ))
        })
}

fn resolve_pls(module: &mut Module, remaps: &[PlsRemap], input: bool) -> Result<Vec<PlsSlot>, BackendError> {
    let mut slots = Vec::with_capacity(remaps.len());
    for remap in remaps {
        let id = find_variable(module, &remap.name)?;
        let var = module.get::<Variable>(id)?;
        let is_target = var.storage == StorageClass::UniformConstant
            && module.get::<Type>(var.basetype)?.image.dim == Dim::DimSubpassData;
        let valid = if input {
            var.storage == StorageClass::Input || is_target
        } else {
            var.storage == StorageClass::Output
        };
        if !valid {
            return Err(BackendError::Unsupported(format!(
                "'{}' cannot be a pixel local storage {}; only {} variables can",
                remap.name,
                if input { "input" } else { "output" },
                if input { "in and subpass input" } else { "out" },
            )));
        }
        module.get_mut::<Variable>(id)?.remapped_variable = true;
        slots.push(PlsSlot {
            var: id,
            format: remap.format,
        });
    }
    Ok(slots)
}

/// Extensions implied by the module itself, independent of what the
/// function bodies turn out to need.
fn static_extensions(em: &Emitter<'_, Glsl>, execution: &EntryPoint) -> Result<Vec<&'static str>, BackendError> {
    let (version, es) = (em.version, em.es);
    let mut exts = Vec::new();

    for (_, ty) in em.module.ids.iter::<Type>() {
        match ty.basetype {
            BaseType::Double => {
                if es {
                    return Err(BackendError::Unsupported("FP64 is not supported in the ES profile".into()));
                }
                if version < 400 {
                    exts.push("GL_ARB_gpu_shader_fp64");
                }
            }
            BaseType::Int64 | BaseType::UInt64 => {
                if es {
                    return Err(BackendError::Unsupported(
                        "64-bit integers are not supported in the ES profile".into(),
                    ));
                }
                exts.push("GL_ARB_gpu_shader_int64");
            }
            _ => {}
        }
    }

    match execution.model {
        ExecutionModel::GLCompute => {
            if es && version < 310 {
                return Err(BackendError::Unsupported(
                    "compute shaders require at least ESSL 310".into(),
                ));
            }
            if !es && version < 430 {
                exts.push("GL_ARB_compute_shader");
            }
        }
        ExecutionModel::Geometry => {
            if version < 320 {
                exts.push(if es { "GL_EXT_geometry_shader" } else { "GL_ARB_geometry_shader4" });
            }
            let instanced = execution.has_mode(ExecutionMode::Invocations) && execution.invocations != 1;
            if instanced && !es && version < 400 {
                exts.push("GL_ARB_gpu_shader5");
            }
        }
        ExecutionModel::TessellationControl | ExecutionModel::TessellationEvaluation => {
            if es && version < 320 {
                exts.push("GL_EXT_tessellation_shader");
            }
            if !es && version < 400 {
                exts.push("GL_ARB_tessellation_shader");
            }
        }
        _ => {}
    }

    if !em.dialect.pls_inputs.is_empty() || !em.dialect.pls_outputs.is_empty() {
        exts.push("GL_EXT_shader_pixel_local_storage");
    }
    Ok(exts)
}

/// `layout(...) in;` and `layout(...) out;` qualifiers of the stage.
fn stage_layouts(execution: &EntryPoint) -> (Vec<String>, Vec<String>) {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let has = |mode| execution.has_mode(mode);
    let mut push_if = |list: &mut Vec<String>, mode, text: &str| {
        if has(mode) {
            list.push(text.to_string());
        }
    };

    match execution.model {
        ExecutionModel::Geometry => {
            outputs.push(format!("max_vertices={}", execution.output_vertices));
            if has(ExecutionMode::Invocations) && execution.invocations != 1 {
                inputs.push(format!("invocations={}", execution.invocations));
            }
            push_if(&mut inputs, ExecutionMode::InputPoints, "points");
            push_if(&mut inputs, ExecutionMode::InputLines, "lines");
            push_if(&mut inputs, ExecutionMode::InputLinesAdjacency, "lines_adjacency");
            push_if(&mut inputs, ExecutionMode::Triangles, "triangles");
            push_if(&mut inputs, ExecutionMode::InputTrianglesAdjacency, "triangles_adjacency");
            push_if(&mut outputs, ExecutionMode::OutputTriangleStrip, "triangle_strip");
            push_if(&mut outputs, ExecutionMode::OutputPoints, "points");
            push_if(&mut outputs, ExecutionMode::OutputLineStrip, "line_strip");
        }
        ExecutionModel::TessellationControl => {
            if has(ExecutionMode::OutputVertices) {
                outputs.push(format!("vertices={}", execution.output_vertices));
            }
        }
        ExecutionModel::TessellationEvaluation => {
            push_if(&mut inputs, ExecutionMode::Quads, "quads");
            push_if(&mut inputs, ExecutionMode::Triangles, "triangles");
            push_if(&mut inputs, ExecutionMode::Isolines, "isolines");
            push_if(&mut inputs, ExecutionMode::PointMode, "point_mode");
            // Isolines have no winding.
            if !has(ExecutionMode::Isolines) {
                push_if(&mut inputs, ExecutionMode::VertexOrderCw, "cw");
                push_if(&mut inputs, ExecutionMode::VertexOrderCcw, "ccw");
            }
            push_if(&mut inputs, ExecutionMode::SpacingFractionalEven, "fractional_even_spacing");
            push_if(&mut inputs, ExecutionMode::SpacingFractionalOdd, "fractional_odd_spacing");
            push_if(&mut inputs, ExecutionMode::SpacingEqual, "equal_spacing");
        }
        ExecutionModel::GLCompute => {
            let size = execution.workgroup_size;
            inputs.push(format!("local_size_x={}", size.x));
            inputs.push(format!("local_size_y={}", size.y));
            inputs.push(format!("local_size_z={}", size.z));
        }
        ExecutionModel::Fragment => {
            push_if(&mut inputs, ExecutionMode::EarlyFragmentTests, "early_fragment_tests");
            push_if(&mut inputs, ExecutionMode::DepthGreater, "depth_greater");
            push_if(&mut inputs, ExecutionMode::DepthLess, "depth_less");
        }
        _ => {}
    }
    (inputs, outputs)
}

/// Legacy targets write fragment outputs through `gl_FragData`.
fn replace_fragment_outputs(em: &mut Emitter<'_, Glsl>) -> Result<(), BackendError> {
    for id in em.module.ids.ids_of::<Variable>() {
        let var = em.module.get::<Variable>(id)?;
        let ty = em.module.get::<Type>(var.basetype)?;
        if em.module.is_builtin_variable(var)
            || var.remapped_variable
            || !ty.pointer
            || var.storage != StorageClass::Output
        {
            continue;
        }

        let location = em.module.decoration(id, Decoration::Location);
        let alias = match ty.array.len() {
            0 => {
                if em.is_legacy_es() && location != 0 {
                    em.require_extension("GL_EXT_draw_buffers");
                }
                format!("gl_FragData[{location}]")
            }
            1 => {
                if location != 0 {
                    return Err(BackendError::Unsupported(
                        "arrayed fragment output at a nonzero location on a legacy target".into(),
                    ));
                }
                if em.is_legacy_es() {
                    em.require_extension("GL_EXT_draw_buffers");
                }
                "gl_FragData".to_string()
            }
            _ => {
                return Err(BackendError::Unsupported(
                    "array-of-array fragment outputs cannot be expressed in legacy GLSL".into(),
                ));
            }
        };

        em.module.meta_mut(id).decoration.alias = alias;
        em.module.get_mut::<Variable>(id)?.compat_builtin = true;
    }
    Ok(())
}

fn pls_decl(em: &mut Emitter<'_, Glsl>, slot: PlsSlot) -> Result<String, BackendError> {
    let precision = if em.module.has_decoration(slot.var, Decoration::RelaxedPrecision) {
        "mediump"
    } else {
        "highp"
    };
    let ty = Type {
        basetype: slot.format.basetype(),
        width: 32,
        vecsize: slot.format.components(),
        ..Type::default()
    };
    let spelled = em.type_to_glsl(&ty)?;
    Ok(format!(
        "layout({}) {precision} {spelled} {}",
        slot.format.layout_name(),
        em.to_name(slot.var)
    ))
}

fn emit_pls(em: &mut Emitter<'_, Glsl>) -> Result<(), BackendError> {
    if em.execution_model()? != ExecutionModel::Fragment {
        return Err(BackendError::Unsupported(
            "pixel local storage is only supported in fragment shaders".into(),
        ));
    }
    if !em.es || em.version < 300 {
        return Err(BackendError::Unsupported(
            "pixel local storage requires ESSL 300 or later".into(),
        ));
    }

    let blocks = [
        ("__pixel_local_inEXT _PLSIn", em.dialect.pls_inputs.clone()),
        ("__pixel_local_outEXT _PLSOut", em.dialect.pls_outputs.clone()),
    ];
    for (header, slots) in blocks {
        if slots.is_empty() {
            continue;
        }
        em.statement(header);
        em.begin_scope();
        for slot in slots {
            let decl = pls_decl(em, slot)?;
            em.statement(&format!("{decl};"));
        }
        em.end_scope_decl("")?;
        em.statement("");
    }
    Ok(())
}

/// Declares a `Block` or `BufferBlock` variable as a named interface block.
fn emit_block(em: &mut Emitter<'_, Glsl>, var: &Variable, qualifier: &str) -> Result<(), BackendError> {
    let ty = em.type_of(var.basetype)?;
    let layout = layout_for_variable(em, var)?;
    em.add_resource_name(var.self_id);

    // The block name is never referenced, so a clash only needs a fallback.
    let mut block_name = em.to_name_no_alias(ty.self_id);
    if em.resource_names.contains(&block_name) {
        block_name = format!("_{}", ty.self_id);
    } else {
        em.resource_names.insert(block_name.clone());
    }

    em.statement(&format!("{layout}{qualifier}{block_name}"));
    em.begin_scope();
    let mut member_names = HashSet::new();
    for index in 0..ty.member_types.len() as u32 {
        em.add_member_name(ty.self_id, index, &mut member_names);
        let decl = em.member_decl(&ty, index)?;
        em.statement(&format!("{decl};"));
    }
    let instance = format!("{}{}", em.to_name(var.self_id), em.type_to_array_glsl(&ty)?);
    em.end_scope_decl(&instance)?;
    em.statement("");
    Ok(())
}

fn emit_buffer_block(em: &mut Emitter<'_, Glsl>, var: &Variable) -> Result<(), BackendError> {
    let ty = em.type_of(var.basetype)?;
    let ssbo = var.storage == StorageClass::StorageBuffer
        || em.module.has_decoration(ty.self_id, Decoration::BufferBlock);
    let restrict = if em.module.has_decoration(var.self_id, Decoration::Restrict) {
        "restrict "
    } else {
        ""
    };
    let keyword = if ssbo { "buffer " } else { "uniform " };
    emit_block(em, var, &format!("{restrict}{keyword}"))
}

fn emit_uniform(em: &mut Emitter<'_, Glsl>, var: &Variable) -> Result<(), BackendError> {
    let ty = em.type_of(var.basetype)?;
    if ty.basetype == BaseType::Image && ty.image.sampled == 2 {
        if em.es && em.version < 310 {
            return Err(BackendError::Unsupported(
                "image load/store requires at least ESSL 310".into(),
            ));
        }
        if !em.es && em.version < 420 {
            em.require_extension("GL_ARB_shader_image_load_store");
        }
    }

    let layout = layout_for_variable(em, var)?;
    em.add_resource_name(var.self_id);
    let decl = em.variable_decl(var)?;
    em.statement(&format!("{layout}uniform {decl};"));
    Ok(())
}

/// Push constants are a `push_constant` block in Vulkan GLSL and a plain
/// uniform struct everywhere else.
fn emit_push_constant_block(em: &mut Emitter<'_, Glsl>, var: &Variable) -> Result<(), BackendError> {
    if em.options.vulkan_semantics {
        return emit_block(em, var, "uniform ");
    }

    let ty = em.type_of(var.basetype)?;
    em.module.unset_decoration(var.self_id, Decoration::Binding);
    em.module.unset_decoration(var.self_id, Decoration::DescriptorSet);

    // Layouts are illegal on a naked struct, so the struct is declared
    // without its Block decoration.
    let was_block = em.module.has_decoration(ty.self_id, Decoration::Block);
    em.module.unset_decoration(ty.self_id, Decoration::Block);
    let result = em.emit_struct(&ty);
    if was_block {
        em.module.set_decoration(ty.self_id, Decoration::Block, 0);
    }
    result?;

    emit_uniform(em, var)?;
    em.statement("");
    Ok(())
}

fn emit_interface_block(em: &mut Emitter<'_, Glsl>, var: &Variable) -> Result<(), BackendError> {
    let ty = em.type_of(var.basetype)?;
    let model = em.execution_model()?;
    let input = var.storage == StorageClass::Input;

    let qualifier = match model {
        ExecutionModel::Vertex if em.is_legacy() => {
            if input { "attribute " } else { "varying " }
        }
        // Legacy fragment outputs were redirected to gl_FragData.
        ExecutionModel::Fragment if em.is_legacy() => "varying ",
        _ if input => "in ",
        _ => "out ",
    };

    if em.module.has_decoration(ty.self_id, Decoration::Block) {
        return emit_block(em, var, qualifier);
    }

    let layout = layout_for_variable(em, var)?;
    em.add_resource_name(var.self_id);
    let decl = em.variable_decl(var)?;
    em.statement(&format!("{layout}{qualifier}{decl};"));
    Ok(())
}

fn emit_specialization_constant(em: &mut Emitter<'_, Glsl>, c: &Constant) -> Result<(), BackendError> {
    let ty = em.type_of(c.constant_type)?;
    let name = em.to_name(c.self_id);
    let decl = em.variable_decl_typed(&ty, &name)?;
    let value = em.constant_expression(c)?;
    if em.options.vulkan_semantics {
        let spec_id = em.module.decoration(c.self_id, Decoration::SpecId);
        em.statement(&format!("layout(constant_id = {spec_id}) const {decl} = {value};"));
    } else {
        em.statement(&format!("const {decl} = {value};"));
    }
    Ok(())
}

fn is_buffer_storage(storage: StorageClass) -> bool {
    matches!(storage, StorageClass::Uniform | StorageClass::StorageBuffer)
}

impl Dialect for Glsl {
    fn prepare(&mut self, module: &mut Module, options: &CompilerOptions) -> Result<(), BackendError> {
        self.pls_inputs = resolve_pls(module, &options.pls_inputs, true)?;
        self.pls_outputs = resolve_pls(module, &options.pls_outputs, false)?;
        // Separate images and samplers only exist in Vulkan GLSL.
        if !options.vulkan_semantics {
            build_combined_image_samplers(module)?;
        }
        Ok(())
    }

    fn language_version(&self, version: u32, es: bool) -> (u32, bool) {
        if es && version > 320 {
            debug!("GLSL {version} has no ES counterpart, emitting ESSL 310");
            return (310, true);
        }
        (version, es)
    }

    fn emit_header(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        let execution = em.execution()?.clone();
        let suffix = if em.es && em.version > 100 { " es" } else { "" };
        em.statement(&format!("#version {}{suffix}", em.version));

        // Needed for binding = N on older desktop versions.
        if !em.es && em.version < 420 {
            em.statement("#ifdef GL_ARB_shading_language_420pack");
            em.statement("#extension GL_ARB_shading_language_420pack : require");
            em.statement("#endif");
        }

        let mut extensions: Vec<String> = static_extensions(em, &execution)?
            .into_iter()
            .map(str::to_string)
            .collect();
        for ext in em.options.extensions.iter().chain(&em.legal.extensions) {
            if !extensions.contains(ext) {
                extensions.push(ext.clone());
            }
        }
        let mut seen = HashSet::new();
        for ext in extensions {
            if seen.insert(ext.clone()) {
                em.statement(&format!("#extension {ext} : require"));
            }
        }

        if execution.model == ExecutionModel::Fragment && em.es {
            let fragment = em.options.fragment.clone();
            if let Some(p) = fragment.default_float_precision.keyword() {
                em.statement(&format!("precision {p} float;"));
            }
            if let Some(p) = fragment.default_int_precision.keyword() {
                em.statement(&format!("precision {p} int;"));
            }
        }

        let (inputs, outputs) = stage_layouts(&execution);
        if !inputs.is_empty() {
            em.statement(&format!("layout({}) in;", inputs.join(", ")));
        }
        if !outputs.is_empty() {
            em.statement(&format!("layout({}) out;", outputs.join(", ")));
        }
        em.statement("");
        Ok(())
    }

    fn emit_resources(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        let model = em.execution_model()?;
        em.replace_illegal_names();
        if model == ExecutionModel::Fragment && em.is_legacy() {
            replace_fragment_outputs(em)?;
        }

        if !em.dialect.pls_inputs.is_empty() || !em.dialect.pls_outputs.is_empty() {
            emit_pls(em)?;
        }

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

        // Blocks are declared in place with their variables.
        for id in em.module.ids.ids_of::<Type>() {
            let ty = em.type_of(id)?;
            if ty.basetype == BaseType::Struct
                && ty.self_id == id
                && ty.array.is_empty()
                && !ty.pointer
                && !em.is_block(&ty)
            {
                em.emit_struct(&ty)?;
            }
        }

        let variables = em.module.ids.ids_of::<Variable>();
        let globals: Vec<(Variable, Type)> = variables
            .iter()
            .map(|&id| -> Result<(Variable, Type), BackendError> {
                let var = em.module.get::<Variable>(id)?.clone();
                let ty = em.type_of(var.basetype)?;
                Ok((var, ty))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(var, ty)| var.storage != StorageClass::Function && ty.pointer)
            .collect();

        for (var, ty) in &globals {
            if is_buffer_storage(ty.storage) && !em.module.is_hidden_variable(var, false) && em.is_block(ty) {
                emit_buffer_block(em, var)?;
            }
        }

        for (var, ty) in &globals {
            if ty.storage == StorageClass::PushConstant && !em.module.is_hidden_variable(var, false) {
                emit_push_constant_block(em, var)?;
            }
        }

        let skip_separate =
            !em.module.combined_image_samplers.is_empty() || !em.options.vulkan_semantics;
        let mut emitted = false;
        for (var, ty) in &globals {
            let separate = (ty.basetype == BaseType::Image && ty.image.sampled == 1)
                || ty.basetype == BaseType::Sampler;
            if skip_separate && separate {
                continue;
            }
            if matches!(ty.storage, StorageClass::UniformConstant | StorageClass::AtomicCounter)
                && !em.module.is_hidden_variable(var, false)
            {
                emit_uniform(em, var)?;
                emitted = true;
            }
        }
        if emitted {
            em.statement("");
        }

        let mut emitted = false;
        for (var, _) in &globals {
            // Legacy fragment outputs may have become builtins above.
            let var = em.module.get::<Variable>(var.self_id)?.clone();
            let interface = matches!(var.storage, StorageClass::Input | StorageClass::Output);
            if interface
                && em.module.interface_variable_exists_in_entry_point(var.self_id)
                && !em.module.is_hidden_variable(&var, false)
            {
                emit_interface_block(em, &var)?;
                emitted = true;
            } else if em.module.is_builtin_variable(&var)
                && em.module.meta(var.self_id).decoration.builtin == Some(BuiltIn::InstanceIndex)
                && !em.options.vulkan_semantics
            {
                // The application supplies the base instance itself.
                em.statement("uniform int spvx_BaseInstance;");
                emitted = true;
            }
        }

        for id in em.module.global_variables.clone() {
            let var = em.module.get::<Variable>(id)?.clone();
            if var.storage != StorageClass::Output {
                em.add_resource_name(id);
                let decl = em.variable_decl(&var)?;
                em.statement(&format!("{decl};"));
                emitted = true;
            }
        }
        if emitted {
            em.statement("");
        }
        Ok(())
    }
}
