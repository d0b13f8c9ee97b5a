//! Argument-table indices and the entry point's argument list.

use std::collections::BTreeSet;

use spirv::{Decoration, ExecutionMode, StorageClass};
use spvx_backend_core::BackendError;
use spvx_backend_core::emit::Emitter;
use spvx_backend_core::options::{MslOptions, PUSH_CONSTANT_DESC_SET};
use spvx_ir::{BaseType, Id, Module, Type, Variable};

use crate::dialect::Msl;
use crate::names::{builtin_name, builtin_qualifier};

/// The three Metal argument tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
}

/// Next free index per argument table.
#[derive(Clone, Debug, Default)]
pub struct ResourceCounters {
    buffer: u32,
    texture: u32,
    sampler: u32,
    /// Buffer indices already taken by vertex buffers.
    reserved_buffers: BTreeSet<u32>,
}

impl ResourceCounters {
    pub fn reserve_buffer(&mut self, index: u32) {
        self.reserved_buffers.insert(index);
    }

    pub fn next(&mut self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Buffer => {
                while self.reserved_buffers.contains(&self.buffer) {
                    self.buffer += 1;
                }
                let index = self.buffer;
                self.buffer += 1;
                index
            }
            ResourceKind::Texture => {
                let index = self.texture;
                self.texture += 1;
                index
            }
            ResourceKind::Sampler => {
                let index = self.sampler;
                self.sampler += 1;
                index
            }
        }
    }
}

/// The index `var` takes in the `kind` table: the remapped one when the
/// options name its set and binding for this stage, else the next free one.
pub fn resource_index(
    module: &Module,
    options: &MslOptions,
    counters: &mut ResourceCounters,
    var: Id,
    kind: ResourceKind,
) -> Result<u32, BackendError> {
    let model = module.entry_point()?.model;
    let storage = module.get::<Variable>(var)?.storage;
    let (set, binding) = if storage == StorageClass::PushConstant {
        (PUSH_CONSTANT_DESC_SET, 0)
    } else {
        (
            module.decoration(var, Decoration::DescriptorSet),
            module.decoration(var, Decoration::Binding),
        )
    };

    let remap = options
        .resource_bindings
        .iter()
        .find(|b| b.stage == model && b.desc_set == set && b.binding == binding);
    Ok(match (remap, kind) {
        (Some(r), ResourceKind::Buffer) => r.msl_buffer,
        (Some(r), ResourceKind::Texture) => r.msl_texture,
        (Some(r), ResourceKind::Sampler) => r.msl_sampler,
        (None, kind) => counters.next(kind),
    })
}

/// Address space of a buffer argument or parameter.
pub fn buffer_address_space(module: &Module, var: &Variable) -> &'static str {
    let buffer_block = module.has_decoration(
        module
            .maybe_get::<Type>(var.basetype)
            .map_or(var.basetype, |t| t.self_id),
        Decoration::BufferBlock,
    );
    if var.storage == StorageClass::StorageBuffer || buffer_block {
        "device"
    } else {
        "constant"
    }
}

fn is_resource_storage(storage: StorageClass) -> bool {
    matches!(
        storage,
        StorageClass::Uniform
            | StorageClass::UniformConstant
            | StorageClass::PushConstant
            | StorageClass::StorageBuffer
    )
}

fn depth_mode(module: &Module) -> Result<Option<&'static str>, BackendError> {
    let entry = module.entry_point()?;
    Ok(if entry.has_mode(ExecutionMode::DepthGreater) {
        Some("greater")
    } else if entry.has_mode(ExecutionMode::DepthLess) {
        Some("less")
    } else {
        None
    })
}

fn next_index(em: &mut Emitter<'_, Msl>, var: Id, kind: ResourceKind) -> Result<u32, BackendError> {
    let options = em.options;
    resource_index(&em.module, &options.msl, &mut em.dialect.counters, var, kind)
}

fn resource_args(em: &mut Emitter<'_, Msl>, var: &Variable, ty: &Type) -> Result<Vec<String>, BackendError> {
    let name = em.to_name(var.self_id);
    let index = |em: &mut Emitter<'_, Msl>, kind| next_index(em, var.self_id, kind);

    let args = match ty.basetype {
        BaseType::Struct => {
            let space = buffer_address_space(&em.module, var);
            let spelled = em.type_to_glsl(ty)?;
            let i = index(em, ResourceKind::Buffer)?;
            vec![format!("{space} {spelled}& {name} [[buffer({i})]]")]
        }
        BaseType::Sampler => {
            let i = index(em, ResourceKind::Sampler)?;
            vec![format!("sampler {name} [[sampler({i})]]")]
        }
        BaseType::Image => {
            let spelled = em.type_to_glsl(ty)?;
            let i = index(em, ResourceKind::Texture)?;
            vec![format!("{spelled} {name} [[texture({i})]]")]
        }
        BaseType::SampledImage => {
            let spelled = em.type_to_glsl(ty)?;
            let t = index(em, ResourceKind::Texture)?;
            let s = index(em, ResourceKind::Sampler)?;
            vec![
                format!("{spelled} {name} [[texture({t})]]"),
                format!("sampler {name}Smplr [[sampler({s})]]"),
            ]
        }
        _ => Vec::new(),
    };
    Ok(args)
}

/// Arguments of the entry point: stage inputs first, then resources and
/// input builtins in declaration order.
pub fn entry_point_args(em: &mut Emitter<'_, Msl>) -> Result<String, BackendError> {
    let model = em.execution_model()?;
    let mut args = Vec::new();

    for var_id in em.dialect.layout.stage_in.clone() {
        let var = em.module.get::<Variable>(var_id)?.clone();
        let ty = em.type_of(var.basetype)?;
        let spelled = em.type_to_glsl(&ty)?;
        let name = em.to_name(var_id);
        if em.dialect.layout.indexed_types.contains(&ty.self_id) {
            let buffer = em.module.decoration(var_id, Decoration::Binding);
            args.push(format!("device {spelled}* {name} [[buffer({buffer})]]"));
        } else {
            args.push(format!("{spelled} {name} [[stage_in]]"));
        }
    }

    let depth = depth_mode(&em.module)?;
    for var_id in em.module.ids.ids_of::<Variable>() {
        let var = em.module.get::<Variable>(var_id)?.clone();
        if var.parameter.is_some() {
            continue;
        }
        let ty = em.type_of(var.basetype)?;
        if !ty.pointer {
            continue;
        }

        if is_resource_storage(var.storage) && !em.module.is_hidden_variable(&var, false) {
            args.extend(resource_args(em, &var, &ty)?);
            continue;
        }

        let builtin = em.module.meta(var_id).decoration.builtin;
        if let (StorageClass::Input, Some(builtin)) = (var.storage, builtin) {
            if !em.module.interface_variable_exists_in_entry_point(var_id) {
                continue;
            }
            let Some(attr) = builtin_qualifier(builtin, model, var.storage, depth, false) else {
                continue;
            };
            let spelled = em.type_to_glsl(&ty)?;
            let name = builtin_name(builtin);
            args.push(format!("{spelled} {name} [[{attr}]]"));
        }
    }
    Ok(args.join(", "))
}
