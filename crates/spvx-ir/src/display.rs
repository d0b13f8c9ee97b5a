//! Display implementations and text dump for debugging.

use std::fmt;
use std::fmt::Write as _;

use crate::types::{BaseType, Type};
use crate::value::{Block, Function, Merge, Terminator};
use crate::{Id, Module, Variable};

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Void => "void",
            Self::Boolean => "bool",
            Self::Char => "char",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::AtomicCounter => "atomic_counter",
            Self::Float => "float",
            Self::Double => "double",
            Self::Struct => "struct",
            Self::Image => "image",
            Self::SampledImage => "sampled_image",
            Self::Sampler => "sampler",
        })
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Direct => "direct",
            Self::Select => "select",
            Self::MultiSelect => "multi_select",
            Self::Return => "return",
            Self::Unreachable => "unreachable",
            Self::Kill => "kill",
        })
    }
}

/// Formats a type as a compact, language-neutral string.
pub fn format_type(ty: &Type, module: &Module) -> String {
    let mut out = match ty.basetype {
        BaseType::Struct => format!("struct {}", module.to_name(ty.self_id, true)),
        BaseType::Image | BaseType::SampledImage => format!(
            "{}<{:?}{}{}{}>",
            ty.basetype,
            ty.image.dim,
            if ty.image.arrayed { ", array" } else { "" },
            if ty.image.depth { ", depth" } else { "" },
            if ty.image.ms { ", ms" } else { "" },
        ),
        base if ty.is_matrix() => format!("mat{}x{}<{base}>", ty.columns, ty.vecsize),
        base if ty.is_vector() => format!("vec{}<{base}>", ty.vecsize),
        base => base.to_string(),
    };
    for &len in ty.array.iter().rev() {
        if len == 0 {
            out.push_str("[]");
        } else {
            let _ = write!(out, "[{len}]");
        }
    }
    if ty.pointer {
        out = format!("ptr<{:?}, {out}>", ty.storage);
    }
    out
}

fn id_list(ids: &[Id]) -> String {
    ids.iter()
        .map(|id| format!("%{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Produces a human-readable text dump of a [`Module`] for debugging.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();

    out.push_str("Types:\n");
    for (id, ty) in module.ids.iter::<Type>() {
        let _ = writeln!(out, "  %{id} {}", format_type(ty, module));
        if ty.is_struct() && !ty.pointer && ty.array.is_empty() {
            for (i, member) in ty.member_types.iter().enumerate() {
                let name = module.member_name(ty.self_id, i as u32);
                let _ = writeln!(out, "    .{i} {name}: %{member}");
            }
        }
    }

    let variables: Vec<_> = module.ids.iter::<Variable>().collect();
    if !variables.is_empty() {
        out.push_str("\nVariables:\n");
        for (id, var) in variables {
            let name = module.to_name(id, false);
            let init = var
                .initializer
                .map(|i| format!(" = %{i}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  %{id} var<{:?}> {name}: %{}{init}",
                var.storage, var.basetype
            );
        }
    }

    let constants: Vec<_> = module.ids.iter::<crate::Constant>().collect();
    if !constants.is_empty() {
        out.push_str("\nConstants:\n");
        for (id, c) in constants {
            let spec = if c.specialization { "spec " } else { "" };
            if c.subconstants.is_empty() {
                let lanes: Vec<_> = (0..c.column_count as usize)
                    .flat_map(|col| {
                        (0..c.columns[col].vecsize as usize)
                            .map(move |row| format!("{:#x}", c.scalar_u64(col, row)))
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  %{id} {spec}const %{} [{}]",
                    c.constant_type,
                    lanes.join(", ")
                );
            } else {
                let _ = writeln!(
                    out,
                    "  %{id} {spec}const %{} {{{}}}",
                    c.constant_type,
                    id_list(&c.subconstants)
                );
            }
        }
    }

    let functions: Vec<_> = module.ids.iter::<Function>().collect();
    if !functions.is_empty() {
        out.push_str("\nFunctions:\n");
        for (id, func) in functions {
            dump_function(&mut out, module, id, func);
        }
    }

    if !module.entry_points.is_empty() {
        out.push_str("\nEntry Points:\n");
        for ep in &module.entry_points {
            let active = if module.entry_point == Some(ep.self_id) {
                " (active)"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "  {:?} {} -> %{}{active} [{}]",
                ep.model,
                ep.name,
                ep.self_id,
                id_list(&ep.interface_variables)
            );
        }
    }

    out
}

fn dump_function(out: &mut String, module: &Module, id: Id, func: &Function) {
    let args: Vec<_> = func
        .arguments
        .iter()
        .map(|p| format!("{}: %{}", module.to_name(p.id, false), p.ty))
        .collect();
    let _ = writeln!(
        out,
        "  fn {}({}) -> %{} {{",
        module.to_name(id, false),
        args.join(", "),
        func.return_type
    );
    for &var in &func.local_variables {
        let _ = writeln!(out, "    local %{var}");
    }
    for &block_id in &func.blocks {
        if let Some(block) = module.maybe_get::<Block>(block_id) {
            dump_block(out, block);
        }
    }
    out.push_str("  }\n");
}

fn dump_block(out: &mut String, block: &Block) {
    let merge = match block.merge {
        Merge::None => String::new(),
        Merge::Loop => format!(
            " loop(merge: {:?}, continue: {:?})",
            block.merge_block, block.continue_block
        ),
        Merge::Selection => format!(" selection(merge: {:?})", block.next_block),
    };
    let _ = writeln!(out, "    %{}:{merge}", block.self_id);
    for phi in &block.phi_variables {
        let _ = writeln!(
            out,
            "      phi %{} <- %{} from %{}",
            phi.function_variable, phi.local_variable, phi.parent
        );
    }
    for inst in &block.ops {
        let op = inst
            .op()
            .map_or_else(|| format!("Op{}", inst.opcode), |op| format!("{op:?}"));
        let words: Vec<_> = inst.words.iter().map(u32::to_string).collect();
        let _ = writeln!(out, "      {op} {}", words.join(" "));
    }
    let target = match block.terminator {
        Terminator::Direct => format!(" -> {:?}", block.next_block),
        Terminator::Select => format!(
            " {:?} ? {:?} : {:?}",
            block.condition, block.true_block, block.false_block
        ),
        Terminator::MultiSelect => format!(
            " {:?} default {:?}, {} case(s)",
            block.condition,
            block.default_block,
            block.cases.len()
        ),
        Terminator::Return => block
            .return_value
            .map(|v| format!(" {v:?}"))
            .unwrap_or_default(),
        _ => String::new(),
    };
    let _ = writeln!(out, "      {}{target}", block.terminator);
}
