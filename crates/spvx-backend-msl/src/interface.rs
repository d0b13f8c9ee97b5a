//! Module rewrites that give a shader the shape Metal expects.
//!
//! Metal has no global inputs or outputs: stage inputs arrive as one
//! `[[stage_in]]` struct argument, outputs are returned as a struct, and
//! helper functions can only reach resources through parameters. These
//! passes run once before emission and record the new structure in the
//! module itself, through qualified aliases on the original variables.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;
use spirv::{BuiltIn, Decoration, ExecutionModel, Op, StorageClass};
use spvx_backend_core::BackendError;
use spvx_backend_core::options::MslOptions;
use spvx_ir::{BaseType, Block, Function, Id, Module, Terminator, Type, Variable};

use crate::names::{builtin_name, ensure_valid_name};

/// Name of the stage input struct argument.
pub const STAGE_IN: &str = "in";
/// Name of the stage output struct local.
pub const STAGE_OUT: &str = "out";

/// The interface structs synthesized for the entry point.
#[derive(Clone, Debug, Default)]
pub struct InterfaceLayout {
    /// Stage input variables, one per vertex buffer when attributes are
    /// remapped.
    pub stage_in: Vec<Id>,
    pub stage_out: Option<Id>,
    /// Every synthesized struct type.
    pub struct_types: HashSet<Id>,
    /// Input struct types read by index from a device buffer instead of
    /// through `[[stage_in]]`.
    pub indexed_types: HashSet<Id>,
    /// Where each builtin ended up inside an interface struct.
    pub builtin_aliases: Vec<(BuiltIn, String)>,
}

fn builtin_variables(module: &Module) -> HashMap<BuiltIn, Id> {
    module
        .ids
        .iter::<Variable>()
        .filter_map(|(id, _)| module.meta(id).decoration.builtin.map(|b| (b, id)))
        .collect()
}

fn add_builtin(module: &mut Module, builtin: BuiltIn) -> Result<Id, BackendError> {
    let type_id = module.increase_bound_by(2);
    let var_id = Id::new(type_id.raw() + 1);
    module.set(
        type_id,
        Type {
            self_id: type_id,
            basetype: BaseType::UInt,
            width: 32,
            pointer: true,
            storage: StorageClass::Input,
            ..Type::default()
        },
    )?;
    module.set(var_id, Variable::new(var_id, type_id, StorageClass::Input, None))?;
    module.set_decoration(var_id, Decoration::BuiltIn, builtin as u32);
    module.set_name(var_id, builtin_name(builtin));
    module.entry_point_mut()?.interface_variables.push(var_id);
    Ok(var_id)
}

/// Vertex functions always receive the vertex and instance index, which
/// indexed vertex buffers are read with.
pub fn add_vertex_index_builtins(module: &mut Module) -> Result<(), BackendError> {
    if module.entry_point()?.model != ExecutionModel::Vertex {
        return Ok(());
    }
    let existing = builtin_variables(module);
    if !existing.contains_key(&BuiltIn::VertexIndex) && !existing.contains_key(&BuiltIn::VertexId) {
        add_builtin(module, BuiltIn::VertexIndex)?;
    }
    if !existing.contains_key(&BuiltIn::InstanceIndex) && !existing.contains_key(&BuiltIn::InstanceId) {
        add_builtin(module, BuiltIn::InstanceIndex)?;
    }
    Ok(())
}

/// Non-constant variables cannot have program scope in Metal, so private
/// globals become locals of the entry point.
pub fn localize_private_variables(module: &mut Module) -> Result<(), BackendError> {
    let entry = module.entry_point()?.self_id;
    let mut kept = Vec::new();
    let mut moved = Vec::new();
    for id in std::mem::take(&mut module.global_variables) {
        if module.get::<Variable>(id)?.storage == StorageClass::Private {
            moved.push(id);
        } else {
            kept.push(id);
        }
    }
    module.global_variables = kept;
    let func = module.get_mut::<Function>(entry)?;
    for id in moved {
        func.add_local_variable(id);
    }
    Ok(())
}

fn vertex_index_name(module: &Module, per_instance: bool) -> &'static str {
    let builtins = builtin_variables(module);
    let (modern, legacy) = if per_instance {
        (BuiltIn::InstanceIndex, BuiltIn::InstanceId)
    } else {
        (BuiltIn::VertexIndex, BuiltIn::VertexId)
    };
    if builtins.contains_key(&modern) {
        builtin_name(modern)
    } else {
        builtin_name(legacy)
    }
}

fn scalar_size(ty: &Type) -> u32 {
    (ty.width / 8) * ty.vecsize * ty.columns
}

fn is_interface_candidate(module: &Module, var: &Variable, storage: StorageClass) -> Result<bool, BackendError> {
    let include_builtins = storage == StorageClass::Output;
    Ok(var.storage == storage
        && module.interface_variable_exists_in_entry_point(var.self_id)
        && !module.is_hidden_variable(var, include_builtins)
        && module.get::<Type>(var.basetype)?.pointer)
}

/// Copies the remapped buffer placement onto each vertex input and
/// returns the buffers in use.
fn bind_vertex_attributes(module: &mut Module, options: &MslOptions) -> Result<BTreeSet<u32>, BackendError> {
    let mut buffers = BTreeSet::new();
    for id in module.ids.ids_of::<Variable>() {
        let var = module.get::<Variable>(id)?;
        if !is_interface_candidate(module, var, StorageClass::Input)? {
            continue;
        }
        let location = module.decoration(id, Decoration::Location);
        match options.vertex_attributes.iter().find(|a| a.location == location) {
            Some(attr) => {
                module.set_decoration(id, Decoration::Binding, attr.msl_buffer);
                module.set_decoration(id, Decoration::Offset, attr.msl_offset);
                module.set_decoration(id, Decoration::ArrayStride, attr.msl_stride);
                module.meta_mut(id).decoration.per_instance = attr.per_instance;
                buffers.insert(attr.msl_buffer);
            }
            None => {
                module.set_decoration(id, Decoration::Binding, options.vertex_buffer_index);
                buffers.insert(options.vertex_buffer_index);
            }
        }
    }
    Ok(buffers)
}

/// A struct member prefixed with its struct's name, except for builtins,
/// whose names are already unique.
fn qualified_member_name(module: &Module, ty: &Type, index: u32) -> String {
    let member = module.member_name(ty.self_id, index);
    let member = if member.is_empty() {
        format!("_{index}")
    } else {
        member.to_string()
    };
    if module.member_builtin(ty, index).is_some() {
        return member;
    }
    let stripped = member.trim_start_matches('_');
    format!("{}_{stripped}", module.to_name(ty.self_id, true))
}

struct StructBuilder {
    type_id: Id,
    members: Vec<Id>,
    size: u32,
    indexed: bool,
    pad_types: HashMap<u32, Id>,
}

impl StructBuilder {
    /// Pads an indexed vertex struct up to `offset`.
    fn pad_to(&mut self, module: &mut Module, offset: u32) -> Result<(), BackendError> {
        if !self.indexed || offset <= self.size {
            return Ok(());
        }
        let len = offset - self.size;
        let pad = match self.pad_types.get(&len) {
            Some(&pad) => pad,
            None => {
                let pad = module.increase_bound_by(1);
                module.set(
                    pad,
                    Type {
                        self_id: pad,
                        basetype: BaseType::Char,
                        width: 8,
                        array: vec![len],
                        array_size_literal: vec![true],
                        ..Type::default()
                    },
                )?;
                module.set_decoration(pad, Decoration::ArrayStride, len);
                self.pad_types.insert(len, pad);
                pad
            }
        };
        let index = self.members.len() as u32;
        self.members.push(pad);
        module.set_member_name(self.type_id, index, &format!("pad{index}"));
        module.set_member_decoration(self.type_id, index, Decoration::Offset, self.size);
        self.size = offset;
        Ok(())
    }

    fn push(
        &mut self,
        module: &mut Module,
        member_type: Id,
        name: &str,
        location: u32,
        builtin: Option<BuiltIn>,
    ) -> Result<(), BackendError> {
        let index = self.members.len() as u32;
        self.members.push(member_type);
        module.set_member_name(self.type_id, index, name);
        module.set_member_decoration(self.type_id, index, Decoration::Offset, self.size);
        module.set_member_decoration(self.type_id, index, Decoration::Location, location);
        if let Some(builtin) = builtin {
            module.set_member_decoration(self.type_id, index, Decoration::BuiltIn, builtin as u32);
        }
        let ty = module.get::<Type>(member_type)?;
        let count: u32 = ty.array.iter().product();
        self.size += scalar_size(ty) * count.max(1);
        Ok(())
    }
}

/// Orders interface members by location, or by offset for indexed vertex
/// structs, with builtins last.
fn sort_members(module: &mut Module, type_id: Id, by_offset: bool) -> Result<(), BackendError> {
    let member_types = module.get::<Type>(type_id)?.member_types.clone();
    if member_types.is_empty() {
        return Ok(());
    }
    module.meta_mut(type_id).member_mut(member_types.len() as u32 - 1);
    let members = module.meta(type_id).members.clone();

    let mut order: Vec<usize> = (0..member_types.len()).collect();
    order.sort_by_key(|&i| {
        let m = &members[i];
        let key = if by_offset {
            m.offset
        } else if m.has(Decoration::Location) {
            m.location
        } else {
            i as u32
        };
        (m.builtin.is_some(), key)
    });

    let ty = module.get_mut::<Type>(type_id)?;
    ty.member_types = order.iter().map(|&i| member_types[i]).collect();
    module.meta_mut(type_id).members = order.iter().map(|&i| members[i].clone()).collect();
    Ok(())
}

fn add_interface_struct(
    module: &mut Module,
    layout: &mut InterfaceLayout,
    storage: StorageClass,
    binding: Option<u32>,
    options: &MslOptions,
    entry_name: &str,
) -> Result<Option<Id>, BackendError> {
    let model = module.entry_point()?.model;
    let mut vars = Vec::new();
    for id in module.ids.ids_of::<Variable>() {
        let var = module.get::<Variable>(id)?;
        let binding_matches = binding.is_none_or(|b| module.decoration(id, Decoration::Binding) == b);
        if is_interface_candidate(module, var, storage)? && binding_matches {
            vars.push(id);
        }
    }
    if vars.is_empty() {
        return Ok(None);
    }

    let type_id = module.increase_bound_by(3);
    let var_id = Id::new(type_id.raw() + 1);
    let init_id = Id::new(type_id.raw() + 2);
    module.set(
        type_id,
        Type {
            self_id: type_id,
            basetype: BaseType::Struct,
            storage,
            ..Type::default()
        },
    )?;
    module.set_decoration(type_id, Decoration::Block, 0);
    let mut var = Variable::new(var_id, type_id, storage, None);

    let base = if storage == StorageClass::Input { STAGE_IN } else { STAGE_OUT };
    let var_name = match binding {
        Some(b) => format!("{base}{b}"),
        None => base.to_string(),
    };
    let indexed = model == ExecutionModel::Vertex
        && storage == StorageClass::Input
        && binding.is_some_and(|b| b != options.vertex_buffer_index);
    if let Some(b) = binding {
        module.set_decoration(var_id, Decoration::Binding, b);
    }

    let mut reference = var_name.clone();
    if indexed {
        let first = vars[0];
        let dec = module.meta(first).decoration.clone();
        module.set_decoration(var_id, Decoration::ArrayStride, dec.array_stride);
        module.meta_mut(var_id).decoration.per_instance = dec.per_instance;
        reference = format!("{reference}[{}]", vertex_index_name(module, dec.per_instance));
        layout.indexed_types.insert(type_id);
    }

    if storage == StorageClass::Output {
        // Every return of the entry point hands back the output struct.
        var.initializer = Some(init_id);
        module.set(init_id, spvx_ir::Expression::new(init_id, "{}".into(), type_id, true))?;
        let entry = module.entry_point()?.self_id;
        let func = module.get_mut::<Function>(entry)?;
        func.add_local_variable(var_id);
        let blocks = func.blocks.clone();
        for block in blocks {
            let block = module.get_mut::<Block>(block)?;
            if block.terminator == Terminator::Return {
                block.return_value = Some(var_id);
            }
        }
    }
    module.set(var_id, var)?;
    module.set_name(type_id, &format!("{entry_name}_{var_name}"));
    module.set_name(var_id, &var_name);

    let mut builder = StructBuilder {
        type_id,
        members: Vec::new(),
        size: 0,
        indexed,
        pad_types: HashMap::new(),
    };
    let base_offset = module.decoration(var_id, Decoration::Offset);

    for id in vars {
        let var = module.get::<Variable>(id)?.clone();
        let ty = module.get::<Type>(var.basetype)?.clone();
        let dec = module.meta(id).decoration.clone();

        if ty.basetype == BaseType::Struct {
            for (i, &member) in ty.member_types.iter().enumerate() {
                let i = i as u32;
                let offset = module.member_decoration(ty.self_id, i, Decoration::Offset);
                builder.pad_to(module, dec.offset + offset)?;
                let name = ensure_valid_name(qualified_member_name(module, &ty, i), "m");
                let qualified = format!("{reference}.{name}");
                module.set_member_qualified_name(ty.self_id, i, &qualified);
                let location = module.member_decoration(ty.self_id, i, Decoration::Location);
                let builtin = module.member_builtin(&ty, i);
                if let Some(builtin) = builtin {
                    layout.builtin_aliases.push((builtin, qualified));
                }
                builder.push(module, member, &name, location, builtin)?;
            }
        } else {
            builder.pad_to(module, base_offset + dec.offset)?;
            let name = ensure_valid_name(module.to_name(id, true), "m");
            let qualified = format!("{reference}.{name}");
            module.meta_mut(id).decoration.qualified_alias = qualified.clone();
            if let Some(builtin) = dec.builtin {
                layout.builtin_aliases.push((builtin, qualified));
            }
            let member_type = ty.parent_type.unwrap_or(ty.self_id);
            builder.push(module, member_type, &name, dec.location, dec.builtin)?;
        }
    }

    module.get_mut::<Type>(type_id)?.member_types = builder.members;
    sort_members(module, type_id, indexed)?;
    layout.struct_types.insert(type_id);
    debug!("synthesized interface struct {entry_name}_{var_name}");
    Ok(Some(var_id))
}

/// Gathers stage inputs and outputs into interface structs.
pub fn add_interface_structs(
    module: &mut Module,
    options: &MslOptions,
    entry_name: &str,
) -> Result<InterfaceLayout, BackendError> {
    let mut layout = InterfaceLayout::default();
    let model = module.entry_point()?.model;

    if model == ExecutionModel::Vertex && !options.vertex_attributes.is_empty() {
        for buffer in bind_vertex_attributes(module, options)? {
            let var = add_interface_struct(
                module,
                &mut layout,
                StorageClass::Input,
                Some(buffer),
                options,
                entry_name,
            )?;
            layout.stage_in.extend(var);
        }
    } else {
        let var = add_interface_struct(module, &mut layout, StorageClass::Input, None, options, entry_name)?;
        layout.stage_in.extend(var);
    }
    layout.stage_out =
        add_interface_struct(module, &mut layout, StorageClass::Output, None, options, entry_name)?;
    Ok(layout)
}

fn is_extractable(storage: StorageClass) -> bool {
    matches!(
        storage,
        StorageClass::Input
            | StorageClass::Output
            | StorageClass::Uniform
            | StorageClass::UniformConstant
            | StorageClass::PushConstant
            | StorageClass::StorageBuffer
            | StorageClass::Private
    )
}

/// Globals each function reaches, directly or through its callees.
fn collect_globals(
    module: &Module,
    func: Id,
    globals: &HashSet<Id>,
    cache: &mut HashMap<Id, BTreeSet<Id>>,
) -> Result<BTreeSet<Id>, BackendError> {
    if let Some(found) = cache.get(&func) {
        return Ok(found.clone());
    }
    // Recursion is invalid SPIR-V, but must not hang.
    cache.insert(func, BTreeSet::new());

    let mut found = BTreeSet::new();
    let blocks = module.get::<Function>(func)?.blocks.clone();
    for block in blocks {
        for inst in &module.get::<Block>(block)?.ops {
            let word = |i: usize| inst.words.get(i).map(|&w| Id::new(w));
            let operands: Vec<Option<Id>> = match inst.op() {
                Some(
                    Op::Load
                    | Op::AccessChain
                    | Op::InBoundsAccessChain
                    | Op::ImageTexelPointer
                    | Op::AtomicLoad
                    | Op::AtomicIAdd
                    | Op::AtomicExchange,
                ) => vec![word(2)],
                Some(Op::Store | Op::AtomicStore) => vec![word(0)],
                Some(Op::CopyMemory) => vec![word(0), word(1)],
                Some(Op::FunctionCall) => {
                    if let Some(callee) = word(2) {
                        found.extend(collect_globals(module, callee, globals, cache)?);
                    }
                    // Globals passed as call arguments.
                    (3..inst.words.len()).map(word).collect()
                }
                _ => Vec::new(),
            };
            found.extend(operands.into_iter().flatten().filter(|id| globals.contains(id)));
        }
    }
    cache.insert(func, found.clone());
    Ok(found)
}

/// Appends a parameter to every helper function for each global it uses.
///
/// The parameter takes the global's name, so the helper body can keep
/// referring to the global and the call site passes the global through.
pub fn extract_global_parameters(module: &mut Module) -> Result<(), BackendError> {
    let entry = module.entry_point()?.self_id;
    let globals: HashSet<Id> = module
        .ids
        .iter::<Variable>()
        .filter(|(_, v)| is_extractable(v.storage) && v.parameter.is_none())
        .map(|(id, _)| id)
        .collect();

    let mut cache = HashMap::new();
    collect_globals(module, entry, &globals, &mut cache)?;

    let mut funcs: Vec<(Id, BTreeSet<Id>)> = cache.into_iter().filter(|(f, g)| *f != entry && !g.is_empty()).collect();
    funcs.sort_by_key(|(f, _)| *f);

    for (func, used) in funcs {
        let first = module.increase_bound_by(used.len() as u32);
        for (offset, global) in used.into_iter().enumerate() {
            let param = Id::new(first.raw() + offset as u32);
            let var = module.get::<Variable>(global)?.clone();

            let name = match module.meta(global).decoration.builtin {
                Some(builtin) => builtin_name(builtin).to_string(),
                None => ensure_valid_name(module.to_name(global, true), "v"),
            };
            module.set_name(global, &name);
            module.set_name(param, &name);
            let qualified = module.meta(global).decoration.qualified_alias.clone();
            module.meta_mut(param).decoration.qualified_alias = qualified;

            let mut param_var = Variable::new(param, var.basetype, StorageClass::Function, None);
            param_var.parameter = Some(func);
            module.set(param, param_var)?;

            let writable = matches!(
                var.storage,
                StorageClass::Output | StorageClass::Private | StorageClass::StorageBuffer
            );
            let f = module.get_mut::<Function>(func)?;
            f.add_parameter(var.basetype, param);
            if let Some(p) = f.arguments.last_mut() {
                p.read_count = 1;
                p.write_count = u32::from(writable);
            }
            debug!("global {global} passed to function {func} as {name}");
        }
    }
    Ok(())
}
