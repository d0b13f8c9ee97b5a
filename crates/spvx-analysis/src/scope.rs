//! Declaration sites of function-local variables and loop-variable detection.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use spirv::{Op, StorageClass};
use spvx_ir::{Block, Function, Id, IrError, Module, Terminator, Variable};

use crate::cfg::{Cfg, DominatorBuilder};
use crate::traverse::{OpcodeHandler, arg_id, traverse_all_reachable_opcodes};

/// Records which blocks touch each function-storage variable.
#[derive(Default)]
struct AccessHandler {
    accessed: BTreeMap<Id, BTreeSet<Id>>,
    current_block: Id,
}

impl AccessHandler {
    fn touch(&mut self, module: &Module, ptr: Id) {
        let Some(var) = module
            .maybe_get_backing_variable(ptr)
            .and_then(|v| module.maybe_get::<Variable>(v))
        else {
            return;
        };
        if var.storage == StorageClass::Function {
            self.accessed
                .entry(var.self_id)
                .or_default()
                .insert(self.current_block);
        }
    }
}

impl OpcodeHandler for AccessHandler {
    fn follow_function_call(&self, _callee: Id) -> bool {
        false
    }

    fn set_current_block(&mut self, module: &Module, block: &Block) -> Result<(), IrError> {
        self.current_block = block.self_id;

        // Branching into a block with φ nodes writes their variables on this edge.
        let mut targets = Vec::new();
        match block.terminator {
            Terminator::Direct => targets.extend(block.next_block),
            Terminator::Select => {
                targets.extend(block.true_block);
                targets.extend(block.false_block);
            }
            Terminator::MultiSelect => {
                targets.extend(block.cases.iter().map(|c| c.block));
                targets.extend(block.default_block);
            }
            _ => {}
        }
        for target in targets {
            let next = module.get::<Block>(target)?;
            for phi in &next.phi_variables {
                if phi.parent == block.self_id {
                    self.accessed
                        .entry(phi.function_variable)
                        .or_default()
                        .insert(block.self_id);
                }
            }
        }
        Ok(())
    }

    fn handle(&mut self, module: &Module, op: Op, args: &[u32]) -> Result<bool, IrError> {
        match op {
            Op::Store => self.touch(module, arg_id(args, 0, op)?),
            Op::AccessChain | Op::InBoundsAccessChain => {
                let base = arg_id(args, 2, op)?;
                if module
                    .maybe_get::<Variable>(base)
                    .is_some_and(|v| v.storage == StorageClass::Function)
                {
                    self.accessed
                        .entry(base)
                        .or_default()
                        .insert(self.current_block);
                }
            }
            Op::CopyMemory => {
                self.touch(module, arg_id(args, 0, op)?);
                self.touch(module, arg_id(args, 1, op)?);
            }
            Op::CopyObject | Op::Load => self.touch(module, arg_id(args, 2, op)?),
            Op::FunctionCall => {
                for &arg in args.iter().skip(3) {
                    self.touch(module, Id::new(arg));
                }
            }
            Op::Phi => {
                let result = arg_id(args, 1, op)?;
                self.accessed
                    .entry(result)
                    .or_default()
                    .insert(self.current_block);
            }
            _ => {}
        }
        Ok(true)
    }
}

/// Decides where every local variable of `func` is declared.
///
/// Each variable lands in `dominated_variables` of the block dominating all
/// of its accesses; variables only touched by dead code are never declared.
/// Scalars updated in exactly one continue block, initialized on a
/// straight-line path into the header and dead after the loop become
/// `for`-header loop variables.
///
/// Returns the declaration block chosen for each variable.
pub fn analyze_variable_scope(module: &mut Module, func: Id) -> Result<HashMap<Id, Id>, IrError> {
    let mut handler = AccessHandler::default();
    traverse_all_reachable_opcodes(module, func, &mut handler)?;
    let cfg = Cfg::new(module, func)?;

    let mut dominators: HashMap<Id, Id> = HashMap::new();
    // `None` marks a variable touched in several continue blocks.
    let mut potential_loop_variables: BTreeMap<Id, Option<Id>> = BTreeMap::new();

    for (&var, blocks) in &handler.accessed {
        let ty = module.expression_type(var)?;
        let scalar = ty.vecsize == 1 && ty.columns == 1;
        let mut builder = DominatorBuilder::new(&cfg);

        for &block in blocks {
            if module.is_continue(block) && scalar {
                potential_loop_variables
                    .entry(var)
                    .and_modify(|slot| *slot = None)
                    .or_insert(Some(block));
            }
            builder.add_block(block);
        }

        builder.lift_continue_block_dominator(module)?;
        if let Some(dominator) = builder.dominator() {
            module
                .get_mut::<Block>(dominator)?
                .dominated_variables
                .push(var);
            dominators.insert(var, dominator);
        } else {
            log::trace!("variable {var} is only accessed by dead code");
        }
    }

    let mut headers_with_loop_variables = BTreeSet::new();
    for (&var, &continue_block) in &potential_loop_variables {
        let Some(continue_block) = continue_block else {
            continue;
        };
        let Some(&dominator) = dominators.get(&var) else {
            continue;
        };
        let Some(header) = crate::flow::loop_header_of_continue(module, continue_block) else {
            continue;
        };

        if !has_static_initializer(&cfg, dominator, header) {
            continue;
        }

        let merge = module.get::<Block>(header)?.merge_block;
        let accesses = &handler.accessed[&var];
        let mut leaks = false;
        if let Some(merge) = merge {
            let mut seen = HashSet::new();
            cfg.walk_from(&mut seen, merge, &mut |b| {
                if accesses.contains(&b) {
                    leaks = true;
                }
            });
        }
        if leaks {
            continue;
        }

        let header_block = module.get_mut::<Block>(header)?;
        header_block.loop_variables.push(var);
        header_block.loop_variables.sort();
        module.get_mut::<Variable>(var)?.loop_variable = true;
        headers_with_loop_variables.insert(header);
        log::trace!("variable {var} is a loop variable of header {header}");
    }

    for header in headers_with_loop_variables {
        demote_mixed_loop_variables(module, header)?;
    }

    if let Ok(function) = module.get_mut::<Function>(func) {
        function.analyzed_variable_scope = true;
    }
    Ok(dominators)
}

/// A `for` initializer is only known statically if the declaration block
/// reaches the header along a chain of single edges.
fn has_static_initializer(cfg: &Cfg, mut dominator: Id, header: Id) -> bool {
    let mut steps = 0usize;
    while dominator != header {
        let succ = cfg.succeeding_edges(dominator);
        if succ.len() != 1 {
            return false;
        }
        let next = succ[0];
        if cfg.preceding_edges(next) != [dominator] {
            return false;
        }
        dominator = next;
        steps += 1;
        if steps > cfg.post_order().len() {
            return false;
        }
    }
    true
}

/// One `for` header can only declare variables sharing a type and
/// qualifiers, so mixed sets fall back to ordinary locals.
fn demote_mixed_loop_variables(module: &mut Module, header: Id) -> Result<(), IrError> {
    let vars = module.get::<Block>(header)?.loop_variables.clone();
    if vars.len() < 2 {
        return Ok(());
    }

    let first = vars[0];
    let first_type = module.get::<Variable>(first)?.basetype;
    let first_flags = module.decoration_flags(first);
    let mut mixed = false;
    for &var in &vars[1..] {
        let ty = module.get::<Variable>(var)?.basetype;
        if ty != first_type || module.decoration_flags(var) != first_flags {
            mixed = true;
            break;
        }
    }

    if mixed {
        log::debug!("loop header {header} has mixed loop variables; declaring them as locals");
        for &var in &vars {
            module.get_mut::<Variable>(var)?.loop_variable = false;
        }
        module.get_mut::<Block>(header)?.loop_variables.clear();
    }
    Ok(())
}
