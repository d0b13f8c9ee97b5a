//! The C++ dialect: GLSL expressions over glm types, wrapped in a shader
//! class that registers its resources with a host runtime.

use log::debug;
use spirv::{Decoration, ExecutionModel, StorageClass};
use spvx_backend_core::BackendError;
use spvx_backend_core::emit::{Dialect, DialectTraits, Emitter};
use spvx_ir::{BaseType, Constant, EntryPoint, Function, Id, Parameter, Type, Variable};

/// C++ dialect state. Registrations are collected while resources are
/// declared and flushed into `init()` once the `Resources` struct closes.
#[derive(Clone, Debug, Default)]
pub struct Cpp {
    registrations: Vec<String>,
}

/// Base class of the `Resources` struct, which supplies the stage's builtins.
fn resource_type(model: ExecutionModel) -> Result<&'static str, BackendError> {
    Ok(match model {
        ExecutionModel::Vertex => "VertexResources",
        ExecutionModel::Fragment => "FragmentResources",
        ExecutionModel::GLCompute => "ComputeResources",
        ExecutionModel::Geometry => "GeometryResources",
        ExecutionModel::TessellationControl => "TessControlResources",
        ExecutionModel::TessellationEvaluation => "TessEvaluationResources",
        other => {
            return Err(BackendError::Unsupported(format!("no C++ runtime for {other:?} shaders")));
        }
    })
}

/// The runtime template instantiated around `Impl::Shader`.
fn impl_type(entry: &EntryPoint) -> Result<String, BackendError> {
    Ok(match entry.model {
        ExecutionModel::GLCompute => {
            let size = entry.workgroup_size;
            format!("ComputeShader<Impl::Shader, {}, {}, {}>", size.x, size.y, size.z)
        }
        ExecutionModel::Vertex => "VertexShader<Impl::Shader>".into(),
        ExecutionModel::Fragment => "FragmentShader<Impl::Shader>".into(),
        ExecutionModel::Geometry => "GeometryShader<Impl::Shader>".into(),
        ExecutionModel::TessellationControl => "TessControlShader<Impl::Shader>".into(),
        ExecutionModel::TessellationEvaluation => "TessEvaluationShader<Impl::Shader>".into(),
        other => {
            return Err(BackendError::Unsupported(format!("no C++ runtime for {other:?} shaders")));
        }
    })
}

/// Declares `name__` inside the `Resources` struct and a macro so the
/// shader body can keep using `name`.
fn emit_wrapped(
    em: &mut Emitter<'_, Cpp>,
    wrapper: &str,
    spelled: &str,
    name: &str,
    registration: String,
) {
    em.statement(&format!("internal::{wrapper}<{spelled}> {name}__;"));
    em.statement_no_indent(&format!("#define {name} __res->{name}__.get()"));
    em.dialect.registrations.push(registration);
    em.statement("");
}

fn emit_buffer_block(em: &mut Emitter<'_, Cpp>, var: &Variable) -> Result<(), BackendError> {
    em.add_resource_name(var.self_id);
    let ty = em.type_of(var.basetype)?;
    let name = em.to_name(var.self_id);
    let set = em.module.decoration(var.self_id, Decoration::DescriptorSet);
    let binding = em.module.decoration(var.self_id, Decoration::Binding);

    em.emit_struct(&ty)?;
    let spelled = format!("{}{}", em.to_name(ty.self_id), em.type_to_array_glsl(&ty)?);
    let registration = format!("s.register_resource({name}__, {set}, {binding});");
    emit_wrapped(em, "Resource", &spelled, &name, registration);
    Ok(())
}

fn emit_push_constant_block(em: &mut Emitter<'_, Cpp>, var: &Variable) -> Result<(), BackendError> {
    em.add_resource_name(var.self_id);
    let ty = em.type_of(var.basetype)?;
    let name = em.to_name(var.self_id);

    em.emit_struct(&ty)?;
    let spelled = format!("{}{}", em.to_name(ty.self_id), em.type_to_array_glsl(&ty)?);
    let registration = format!("s.register_push_constant({name}__);");
    emit_wrapped(em, "PushConstant", &spelled, &name, registration);
    Ok(())
}

fn emit_interface_block(em: &mut Emitter<'_, Cpp>, var: &Variable) -> Result<(), BackendError> {
    em.add_resource_name(var.self_id);
    let ty = em.type_of(var.basetype)?;
    let name = em.to_name(var.self_id);
    let location = em.module.decoration(var.self_id, Decoration::Location);
    let (wrapper, register) = if var.storage == StorageClass::Input {
        ("StageInput", "stage_input")
    } else {
        ("StageOutput", "stage_output")
    };

    let base = if em.is_block(&ty) {
        em.emit_struct(&ty)?;
        em.to_name(ty.self_id)
    } else {
        em.type_to_glsl(&ty)?
    };
    let spelled = format!("{base}{}", em.type_to_array_glsl(&ty)?);
    let registration = format!("s.register_{register}({name}__, {location});");
    emit_wrapped(em, wrapper, &spelled, &name, registration);
    Ok(())
}

fn emit_uniform(em: &mut Emitter<'_, Cpp>, var: &Variable) -> Result<(), BackendError> {
    em.add_resource_name(var.self_id);
    let ty = em.type_of(var.basetype)?;
    let name = em.to_name(var.self_id);
    let spelled = format!("{}{}", em.type_to_glsl(&ty)?, em.type_to_array_glsl(&ty)?);

    let opaque = matches!(
        ty.basetype,
        BaseType::Image | BaseType::SampledImage | BaseType::Sampler | BaseType::AtomicCounter
    );
    if opaque {
        let set = em.module.decoration(var.self_id, Decoration::DescriptorSet);
        let binding = em.module.decoration(var.self_id, Decoration::Binding);
        let registration = format!("s.register_resource({name}__, {set}, {binding});");
        emit_wrapped(em, "Resource", &spelled, &name, registration);
    } else {
        let location = em.module.decoration(var.self_id, Decoration::Location);
        let registration = format!("s.register_uniform_constant({name}__, {location});");
        emit_wrapped(em, "UniformConstant", &spelled, &name, registration);
    }
    Ok(())
}

/// Workgroup memory lives in the shared `Resources` object.
fn emit_shared(em: &mut Emitter<'_, Cpp>, var: &Variable) -> Result<(), BackendError> {
    em.add_resource_name(var.self_id);
    let name = em.to_name(var.self_id);
    let decl = em.variable_decl(var)?;
    em.statement(&format!("{decl};"));
    em.statement_no_indent(&format!("#define {name} __res->{name}"));
    Ok(())
}

fn emit_c_linkage(em: &mut Emitter<'_, Cpp>) -> Result<(), BackendError> {
    let impl_type = impl_type(em.execution()?)?;

    em.statement("");
    em.statement("spvx_shader_t *spvx_construct(void)");
    em.begin_scope();
    em.statement(&format!("return new {impl_type}();"));
    em.end_scope()?;
    em.statement("");

    em.statement("void spvx_destruct(spvx_shader_t *shader)");
    em.begin_scope();
    em.statement(&format!("delete static_cast<{impl_type}*>(shader);"));
    em.end_scope()?;
    em.statement("");

    em.statement("void spvx_invoke(spvx_shader_t *shader)");
    em.begin_scope();
    em.statement(&format!("static_cast<{impl_type}*>(shader)->invoke();"));
    em.end_scope()?;
    em.statement("");

    em.statement("static const struct spvx_interface vtable =");
    em.begin_scope();
    em.statement("spvx_construct,");
    em.statement("spvx_destruct,");
    em.statement("spvx_invoke,");
    em.end_scope_decl("")?;
    em.statement("");

    em.statement("const struct spvx_interface *spvx_get_interface(void)");
    em.begin_scope();
    em.statement("return &vtable;");
    em.end_scope()
}

impl Dialect for Cpp {
    fn traits(&self) -> DialectTraits {
        DialectTraits {
            float_literal_suffix: true,
            double_literal_suffix: false,
            long_long_literal_suffix: true,
            basic_int_type: "int32_t",
            basic_uint_type: "uint32_t",
            swizzle_is_function: true,
            shared_is_implied: true,
            flexible_member_array_supported: false,
            explicit_struct_type: true,
            use_initializer_list: true,
            ..DialectTraits::default()
        }
    }

    /// The runtime evaluates GLSL 450 semantics through glm.
    fn language_version(&self, _version: u32, _es: bool) -> (u32, bool) {
        (450, false)
    }

    fn emit_header(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        // Reject stages the runtime has no base class for before writing anything.
        resource_type(em.execution_model()?)?;

        em.statement("// This C++ shader is generated by spvx.");
        em.statement("#include \"spvx/internal_interface.hpp\"");
        em.statement("#include \"spvx/external_interface.h\"");
        em.statement("#include <array>");
        em.statement("#include <stdint.h>");
        em.statement("");
        em.statement("using namespace spvx;");
        em.statement("using namespace glm;");
        em.statement("");
        em.statement("namespace Impl");
        em.begin_scope();
        em.statement("struct Shader");
        em.begin_scope();
        Ok(())
    }

    fn emit_resources(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        em.dialect.registrations.clear();
        let model = em.execution_model()?;
        let resources = resource_type(model)?;

        let mut emitted = false;
        for id in em.module.ids.ids_of::<Constant>() {
            let c = em.module.get::<Constant>(id)?.clone();
            if c.specialization {
                let ty = em.type_of(c.constant_type)?;
                let name = em.to_name(id);
                let decl = em.variable_decl_typed(&ty, &name)?;
                let value = em.constant_expression(&c)?;
                em.statement(&format!("static constexpr {decl} = {value};"));
                emitted = true;
            }
        }
        if emitted {
            em.statement("");
        }

        // Blocks are declared inside `Resources` next to their instance.
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

        em.statement(&format!("struct Resources : {resources}"));
        em.begin_scope();

        let mut globals = Vec::new();
        for id in em.module.ids.ids_of::<Variable>() {
            let var = em.module.get::<Variable>(id)?.clone();
            let ty = em.type_of(var.basetype)?;
            if var.storage != StorageClass::Function && ty.pointer && var.parameter.is_none() {
                globals.push((var, ty));
            }
        }

        for (var, ty) in &globals {
            if matches!(ty.storage, StorageClass::Uniform | StorageClass::StorageBuffer)
                && em.is_block(ty)
                && !em.module.is_hidden_variable(var, false)
            {
                emit_buffer_block(em, var)?;
            }
        }
        for (var, ty) in &globals {
            if ty.storage == StorageClass::PushConstant && !em.module.is_hidden_variable(var, false) {
                emit_push_constant_block(em, var)?;
            }
        }
        for (var, ty) in &globals {
            if matches!(ty.storage, StorageClass::Input | StorageClass::Output)
                && em.module.interface_variable_exists_in_entry_point(var.self_id)
                && !em.module.is_hidden_variable(var, false)
            {
                emit_interface_block(em, var)?;
            }
        }
        for (var, ty) in &globals {
            if matches!(ty.storage, StorageClass::UniformConstant | StorageClass::AtomicCounter)
                && !em.module.is_hidden_variable(var, false)
            {
                emit_uniform(em, var)?;
            }
        }
        for (var, ty) in &globals {
            if ty.storage == StorageClass::Workgroup && !em.module.is_hidden_variable(var, false) {
                emit_shared(em, var)?;
            }
        }

        em.statement("inline void init(spvx_shader& s)");
        em.begin_scope();
        em.statement(&format!("{resources}::init(s);"));
        let registrations = std::mem::take(&mut em.dialect.registrations);
        debug!("registering {} resource(s) with {resources}", registrations.len());
        for registration in registrations {
            em.statement(&registration);
        }
        em.end_scope()?;
        em.end_scope_decl("")?;
        em.statement("");

        em.statement("Resources* __res;");
        if model == ExecutionModel::GLCompute {
            em.statement("ComputePrivateResources __priv_res;");
        }
        em.statement("");

        // Private globals are per invocation, so they are members of the shader.
        let mut emitted = false;
        for id in em.module.global_variables.clone() {
            let var = em.module.get::<Variable>(id)?.clone();
            if var.storage == StorageClass::Private {
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

    /// Closes `Shader` and `Impl` after the entry point, then exports the
    /// C interface the runtime loads.
    fn emit_source(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
        em.default_emit_source()?;
        em.end_scope_decl("")?;
        em.end_scope()?;
        emit_c_linkage(em)
    }

    fn emit_function_prototype(em: &mut Emitter<'_, Self>, func_id: Id) -> Result<(), BackendError> {
        em.local_variable_names = em.resource_names.clone();

        let func = em.module.get::<Function>(func_id)?.clone();
        let ret = em.type_of(func.return_type)?;
        let name = if em.processing_entry_point {
            "main".to_string()
        } else {
            em.to_name(func_id)
        };

        let mut args = Vec::with_capacity(func.arguments.len());
        for arg in &func.arguments {
            em.add_local_variable_name(arg.id);
            args.push(Self::argument_decl(em, arg)?);
        }
        let decl = format!("inline {} {name}({})", em.type_to_glsl(&ret)?, args.join(", "));
        em.statement(&decl);
        Ok(())
    }

    /// Arguments are references; only pointers that are written lose `const`.
    fn argument_decl(em: &mut Emitter<'_, Self>, arg: &Parameter) -> Result<String, BackendError> {
        let ty = em.expression_type(arg.id)?;
        let constref = !ty.pointer || arg.write_count == 0;
        let mut base = em.type_to_glsl(&ty)?;
        for index in 0..ty.array.len() {
            let size = em.to_array_size(&ty, index)?;
            base = format!("std::array<{base}, {size}>");
        }
        let name = em.to_name(arg.id);
        Ok(format!("{}{base} &{name}", if constref { "const " } else { "" }))
    }

    fn member_decl(em: &mut Emitter<'_, Self>, ty: &Type, index: u32) -> Result<String, BackendError> {
        let member_type = em.member_type(ty, index)?;
        let name = em.to_member_name(ty, index);
        em.variable_decl_typed(&member_type, &name)
    }

    /// Separate images and samplers stay registered on their own bindings
    /// and are paired at the use site.
    fn emit_sampled_image_op(
        em: &mut Emitter<'_, Self>,
        result_type: Id,
        id: Id,
        image: Id,
        sampler: Id,
    ) -> Result<(), BackendError> {
        let ty = em.type_of(result_type)?;
        let ctor = em.type_to_glsl(&ty)?;
        em.emit_binary_func_op(result_type, id, image, sampler, &ctor)
    }
}
