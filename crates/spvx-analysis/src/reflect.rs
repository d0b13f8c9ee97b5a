//! Resource reflection: the externally visible interface of a shader.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;

use spirv::{Decoration, Dim, Op, StorageClass};
use spvx_ir::{BaseType, Constant, Id, IrError, Module, Type, Variable, storage_is_interface};

use crate::traverse::{OpcodeHandler, arg_id, traverse_all_reachable_opcodes};

/// One reflected resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// The variable.
    pub id: Id,
    /// The variable's pointer type.
    pub type_id: Id,
    /// The type decorations are attached to (the struct for blocks).
    pub base_type_id: Id,
    /// Block name for interface blocks, the variable name otherwise.
    pub name: String,
}

/// Every resource of a module, partitioned by class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderResources {
    pub uniform_buffers: Vec<Resource>,
    pub storage_buffers: Vec<Resource>,
    pub stage_inputs: Vec<Resource>,
    pub stage_outputs: Vec<Resource>,
    pub subpass_inputs: Vec<Resource>,
    pub storage_images: Vec<Resource>,
    pub sampled_images: Vec<Resource>,
    pub atomic_counters: Vec<Resource>,
    pub push_constant_buffers: Vec<Resource>,
    pub separate_images: Vec<Resource>,
    pub separate_samplers: Vec<Resource>,
}

impl ShaderResources {
    /// Resource classes with their display labels, in a fixed order.
    pub fn classes(&self) -> [(&'static str, &[Resource]); 11] {
        [
            ("uniform buffers", &self.uniform_buffers),
            ("storage buffers", &self.storage_buffers),
            ("stage inputs", &self.stage_inputs),
            ("stage outputs", &self.stage_outputs),
            ("subpass inputs", &self.subpass_inputs),
            ("storage images", &self.storage_images),
            ("sampled images", &self.sampled_images),
            ("atomic counters", &self.atomic_counters),
            ("push constant buffers", &self.push_constant_buffers),
            ("separate images", &self.separate_images),
            ("separate samplers", &self.separate_samplers),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.classes().iter().all(|(_, r)| r.is_empty())
    }
}

/// A `(offset, size)` range of a buffer block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRange {
    /// Member index in the block.
    pub index: u32,
    pub offset: u32,
    pub range: u32,
}

/// A specialization constant and its `SpecId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecializationConstant {
    pub id: Id,
    pub constant_id: u32,
}

/// Partitions the module's resource variables by class.
///
/// Builtins, function-scope variables and non-pointer values are skipped.
/// When `active_variables` is given, variables outside it are skipped too.
pub fn get_shader_resources(module: &Module, active_variables: Option<&HashSet<Id>>) -> ShaderResources {
    let mut res = ShaderResources::default();

    for (id, var) in module.ids.iter::<Variable>() {
        let Some(ty) = module.maybe_get::<Type>(var.basetype) else {
            continue;
        };
        if var.storage == StorageClass::Function || !ty.pointer || module.is_builtin_variable(var) {
            continue;
        }
        if active_variables.is_some_and(|active| !active.contains(&id)) {
            continue;
        }

        let is_block = module.has_decoration(ty.self_id, Decoration::Block);
        let resource = |block_name: bool| Resource {
            id,
            type_id: var.basetype,
            base_type_id: ty.self_id,
            name: if block_name {
                module.name(ty.self_id).to_string()
            } else {
                module.name(id).to_string()
            },
        };

        if var.storage == StorageClass::Input && module.interface_variable_exists_in_entry_point(id) {
            res.stage_inputs.push(resource(is_block));
        } else if var.storage == StorageClass::UniformConstant && ty.image.dim == Dim::DimSubpassData
            && ty.basetype == BaseType::Image
        {
            res.subpass_inputs.push(resource(false));
        } else if var.storage == StorageClass::Output
            && module.interface_variable_exists_in_entry_point(id)
        {
            res.stage_outputs.push(resource(is_block));
        } else if ty.storage == StorageClass::Uniform && is_block {
            res.uniform_buffers.push(resource(true));
        } else if ty.storage == StorageClass::Uniform
            && module.has_decoration(ty.self_id, Decoration::BufferBlock)
        {
            res.storage_buffers.push(resource(true));
        } else if ty.storage == StorageClass::PushConstant {
            res.push_constant_buffers.push(resource(false));
        } else if ty.storage == StorageClass::UniformConstant {
            match (ty.basetype, ty.image.sampled) {
                (BaseType::Image, 2) => res.storage_images.push(resource(false)),
                (BaseType::Image, 1) => res.separate_images.push(resource(false)),
                (BaseType::Sampler, _) => res.separate_samplers.push(resource(false)),
                (BaseType::SampledImage, _) => res.sampled_images.push(resource(false)),
                _ => {}
            }
        } else if ty.storage == StorageClass::AtomicCounter {
            res.atomic_counters.push(resource(false));
        }
    }

    res
}

/// Collects interface variables an entry point actually touches.
struct InterfaceVariableAccessHandler {
    variables: HashSet<Id>,
}

impl InterfaceVariableAccessHandler {
    fn note(&mut self, module: &Module, id: Id) {
        if module
            .maybe_get::<Variable>(id)
            .is_some_and(|v| storage_is_interface(v.storage))
        {
            self.variables.insert(id);
        }
    }
}

impl OpcodeHandler for InterfaceVariableAccessHandler {
    fn handle(&mut self, module: &Module, op: Op, args: &[u32]) -> Result<bool, IrError> {
        match op {
            Op::FunctionCall => {
                for &arg in args.iter().skip(3) {
                    self.note(module, Id::new(arg));
                }
            }
            Op::Store | Op::AtomicStore => self.note(module, arg_id(args, 0, op)?),
            Op::CopyMemory => {
                self.note(module, arg_id(args, 0, op)?);
                self.note(module, arg_id(args, 1, op)?);
            }
            Op::AccessChain
            | Op::InBoundsAccessChain
            | Op::Load
            | Op::CopyObject
            | Op::ImageTexelPointer
            | Op::AtomicLoad
            | Op::AtomicExchange
            | Op::AtomicCompareExchange
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
            | Op::AtomicXor => self.note(module, arg_id(args, 2, op)?),
            _ => {}
        }
        Ok(true)
    }
}

/// Interface variables statically reachable from the function `entry`,
/// following calls.
pub fn get_active_interface_variables(module: &Module, entry: Id) -> Result<HashSet<Id>, IrError> {
    let mut handler = InterfaceVariableAccessHandler {
        variables: HashSet::new(),
    };
    traverse_all_reachable_opcodes(module, entry, &mut handler)?;
    Ok(handler.variables)
}

fn member_offset(module: &Module, ty: &Type, index: u32) -> Result<u32, IrError> {
    if !module.has_member_decoration(ty.self_id, index, Decoration::Offset) {
        return Err(IrError::Malformed(format!(
            "member {index} of struct {} does not have Offset set",
            ty.self_id
        )));
    }
    Ok(module.member_decoration(ty.self_id, index, Decoration::Offset))
}

fn member_array_stride(module: &Module, ty: &Type, index: u32) -> Result<u32, IrError> {
    let member = member_type_id(ty, index)?;
    // ArrayStride decorates the array type itself.
    if !module.has_decoration(member, Decoration::ArrayStride) {
        return Err(IrError::Malformed(format!(
            "member {index} of struct {} does not have ArrayStride set",
            ty.self_id
        )));
    }
    Ok(module.decoration(member, Decoration::ArrayStride))
}

fn member_type_id(ty: &Type, index: u32) -> Result<Id, IrError> {
    ty.member_types
        .get(index as usize)
        .copied()
        .ok_or(IrError::BadMember {
            id: ty.self_id.raw(),
            index,
        })
}

/// Declared byte size of a buffer block: the offset of its last member plus
/// that member's size.
pub fn get_declared_struct_size(module: &Module, ty: &Type) -> Result<u32, IrError> {
    let Some(last) = (ty.member_types.len() as u32).checked_sub(1) else {
        return Ok(0);
    };
    let offset = member_offset(module, ty, last)?;
    let size = get_declared_struct_member_size(module, ty, last)?;
    Ok(offset + size)
}

/// Declared byte size of member `index` of `struct_type`.
///
/// Matrices are padded the way std140 and std430 lay out three-component
/// columns or rows. Arrays use their `ArrayStride`.
pub fn get_declared_struct_member_size(
    module: &Module,
    struct_type: &Type,
    index: u32,
) -> Result<u32, IrError> {
    let ty = module.get::<Type>(member_type_id(struct_type, index)?)?;

    if ty.is_array() {
        let stride = member_array_stride(module, struct_type, index)?;
        return Ok(stride * ty.array.last().copied().unwrap_or(0));
    }

    match ty.basetype {
        BaseType::Struct => get_declared_struct_size(module, ty),
        BaseType::Unknown
        | BaseType::Void
        | BaseType::Boolean
        | BaseType::AtomicCounter
        | BaseType::Image
        | BaseType::SampledImage
        | BaseType::Sampler => Err(IrError::Invalid(format!(
            "cannot query the size of opaque or logical type {}",
            ty.basetype
        ))),
        _ => {
            let component = ty.width / 8;
            let mut vecsize = ty.vecsize;
            let mut columns = ty.columns;
            if columns > 1 {
                let row_major =
                    module.has_member_decoration(struct_type.self_id, index, Decoration::RowMajor);
                let col_major =
                    module.has_member_decoration(struct_type.self_id, index, Decoration::ColMajor);
                if row_major && columns == 3 {
                    columns = 4;
                } else if col_major && vecsize == 3 {
                    vecsize = 4;
                }
            }
            Ok(vecsize * columns * component)
        }
    }
}

/// Records the struct members of one buffer that are indexed.
struct BufferAccessHandler {
    var: Id,
    seen: BTreeSet<u32>,
    ranges: Vec<BufferRange>,
}

impl OpcodeHandler for BufferAccessHandler {
    fn handle(&mut self, module: &Module, op: Op, args: &[u32]) -> Result<bool, IrError> {
        if !matches!(op, Op::AccessChain | Op::InBoundsAccessChain) {
            return Ok(true);
        }
        if arg_id(args, 2, op)? != self.var {
            return Ok(true);
        }

        let index_id = arg_id(args, 3, op)?;
        let index = module
            .maybe_get::<Constant>(index_id)
            .map(|c| c.scalar(0, 0))
            .ok_or_else(|| {
                IrError::Malformed(format!("buffer block index {index_id} is not a constant"))
            })?;
        if !self.seen.insert(index) {
            return Ok(true);
        }

        let ty = module.expression_type(self.var)?;
        let offset = member_offset(module, ty, index)?;
        // Offsets increase monotonically, so the next member bounds this one.
        let range = if (index as usize) + 1 < ty.member_types.len() {
            member_offset(module, ty, index + 1)?.saturating_sub(offset)
        } else {
            get_declared_struct_member_size(module, ty, index)?
        };
        self.ranges.push(BufferRange {
            index,
            offset,
            range,
        });
        Ok(true)
    }
}

/// The members of buffer variable `var` that entry function `entry` indexes.
pub fn get_active_buffer_ranges(
    module: &Module,
    var: Id,
    entry: Id,
) -> Result<Vec<BufferRange>, IrError> {
    let mut handler = BufferAccessHandler {
        var,
        seen: BTreeSet::new(),
        ranges: Vec::new(),
    };
    traverse_all_reachable_opcodes(module, entry, &mut handler)?;
    Ok(handler.ranges)
}

pub fn get_specialization_constants(module: &Module) -> Vec<SpecializationConstant> {
    module
        .ids
        .iter::<Constant>()
        .filter(|(_, c)| c.specialization)
        .map(|(id, _)| SpecializationConstant {
            id,
            constant_id: module.decoration(id, Decoration::SpecId),
        })
        .collect()
}

/// Entry point names in declaration order.
pub fn get_entry_points(module: &Module) -> Vec<String> {
    module.entry_points.iter().map(|e| e.name.clone()).collect()
}

/// Renders the reflection of `res` as indented text, one resource per line.
pub fn describe_resources(module: &Module, res: &ShaderResources) -> String {
    let mut out = String::new();
    for (label, resources) in res.classes() {
        if resources.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{label}:");
        for r in resources {
            let name = if r.name.is_empty() {
                module.to_name(r.id, false)
            } else {
                r.name.clone()
            };
            let _ = write!(out, "  %{} {name}", r.id);
            let dec = &module.meta(r.id).decoration;
            if dec.has(Decoration::DescriptorSet) || dec.has(Decoration::Binding) {
                let _ = write!(out, " (set = {}, binding = {})", dec.set, dec.binding);
            }
            if dec.has(Decoration::Location) {
                let _ = write!(out, " (location = {})", dec.location);
            }
            if let Ok(ty) = module.get::<Type>(r.base_type_id) {
                if ty.is_struct() && !ty.pointer {
                    if let Ok(size) = get_declared_struct_size(module, ty) {
                        let _ = write!(out, " [{size} bytes]");
                    }
                }
            }
            out.push('\n');
        }
    }
    for spec in get_specialization_constants(module) {
        let _ = writeln!(out, "spec constant %{} id = {}", spec.id, spec.constant_id);
    }
    out
}
