//! Structural queries used to rebuild `for`, `while` and `do-while` loops.

use std::collections::HashSet;

use spvx_ir::{
    Block, ContinueBlockType, Id, IrError, LoopDominator, LoopMethod, Merge, Module, Terminator,
};

/// Checks whether loop header `block` has the shape `method` can emit as a
/// structured `for`/`while` loop.
///
/// φ nodes fed from the header itself (or from its condition block) need a
/// flush on the exit edge, which a plain loop condition cannot express.
pub fn block_is_loop_candidate(
    module: &Module,
    block: &Block,
    method: LoopMethod,
) -> Result<bool, IrError> {
    if block.disable_block_optimization || block.complex_continue {
        return Ok(false);
    }

    match method {
        LoopMethod::MergeToSelectForLoop => {
            let candidate = block.terminator == Terminator::Select
                && block.merge == Merge::Loop
                && block.true_block != block.merge_block
                && block.true_block != Some(block.self_id)
                && block.false_block == block.merge_block;
            if !candidate {
                return Ok(false);
            }

            if block.phi_variables.iter().any(|phi| phi.parent == block.self_id) {
                return Ok(false);
            }
            if let Some(merge) = block.merge_block.and_then(|m| module.maybe_get::<Block>(m)) {
                if merge.phi_variables.iter().any(|phi| phi.parent == block.self_id) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        LoopMethod::MergeToDirectForLoop => {
            let header = block.terminator == Terminator::Direct
                && block.merge == Merge::Loop
                && block.ops.is_empty();
            if !header {
                return Ok(false);
            }

            let child_id = block
                .next_block
                .ok_or_else(|| IrError::Malformed(format!("block {} has no successor", block.self_id)))?;
            let child = module.get::<Block>(child_id)?;
            let candidate = child.terminator == Terminator::Select
                && child.merge == Merge::None
                && child.false_block == block.merge_block
                && child.true_block != block.merge_block
                && child.true_block != Some(block.self_id);
            if !candidate {
                return Ok(false);
            }

            if block
                .phi_variables
                .iter()
                .any(|phi| phi.parent == block.self_id || phi.parent == child.self_id)
            {
                return Ok(false);
            }
            if child.phi_variables.iter().any(|phi| phi.parent == block.self_id) {
                return Ok(false);
            }
            if let Some(merge) = block.merge_block.and_then(|m| module.maybe_get::<Block>(m)) {
                if merge.phi_variables.iter().any(|phi| {
                    phi.parent == block.self_id || Some(phi.parent) == child.false_block
                }) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

/// Returns `true` if control starting at `from` reaches `to` without
/// entering a structured construct first.
///
/// Unmerged selections count as straight-line code, since each arm must
/// end in a `break` or `continue` anyway.
pub fn block_is_outside_flow_control_from_block(
    module: &Module,
    from: Id,
    to: Id,
) -> Result<bool, IrError> {
    let mut seen = HashSet::new();
    outside_flow_control(module, from, to, &mut seen)
}

fn outside_flow_control(
    module: &Module,
    from: Id,
    to: Id,
    seen: &mut HashSet<Id>,
) -> Result<bool, IrError> {
    if from == to {
        return Ok(true);
    }
    // Continue blocks close the cycle back to the header.
    if module.is_continue(from) || !seen.insert(from) {
        return Ok(false);
    }

    let start = module.get::<Block>(from)?;
    if start.terminator == Terminator::Select && start.merge == Merge::None {
        for arm in [start.true_block, start.false_block].into_iter().flatten() {
            if outside_flow_control(module, arm, to, seen)? {
                return Ok(true);
            }
        }
    }
    if let Some(merge) = start.merge_block {
        if outside_flow_control(module, merge, to, seen)? {
            return Ok(true);
        }
    }
    if let Some(next) = start.next_block {
        if outside_flow_control(module, next, to, seen)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Returns `true` if `from` reaches `to` through unconditional branches only.
pub fn execution_is_branchless(module: &Module, from: Id, to: Id) -> Result<bool, IrError> {
    Ok(straight_line_path(module, from, to)?.is_some())
}

/// Returns `true` if `from` reaches `to` through unconditional branches
/// without executing any instruction.
pub fn execution_is_noop(module: &Module, from: Id, to: Id) -> Result<bool, IrError> {
    let Some(path) = straight_line_path(module, from, to)? else {
        return Ok(false);
    };
    for id in path {
        if !module.get::<Block>(id)?.ops.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The blocks passed on the unconditional path from `from` to `to`,
/// excluding `to`, or `None` if the path branches or cycles.
fn straight_line_path(module: &Module, from: Id, to: Id) -> Result<Option<Vec<Id>>, IrError> {
    let mut path = Vec::new();
    let mut cursor = from;
    while cursor != to {
        if path.contains(&cursor) {
            return Ok(None);
        }
        let block = module.get::<Block>(cursor)?;
        match (block.terminator, block.merge, block.next_block) {
            (Terminator::Direct, Merge::None, Some(next)) => {
                path.push(cursor);
                cursor = next;
            }
            _ => return Ok(None),
        }
    }
    Ok(Some(path))
}

/// Finds the loop header whose continue target is `block`.
pub fn loop_header_of_continue(module: &Module, block: Id) -> Option<Id> {
    let mut headers: Vec<Id> = module
        .loop_blocks
        .iter()
        .copied()
        .filter(|&h| {
            module
                .maybe_get::<Block>(h)
                .is_some_and(|b| b.continue_block == Some(block))
        })
        .collect();
    headers.sort();
    headers.first().copied()
}

/// Classifies continue block `block` relative to its loop header.
pub fn continue_block_type(module: &Module, block: &Block) -> Result<ContinueBlockType, IrError> {
    if block.complex_continue {
        return Ok(ContinueBlockType::ComplexLoop);
    }
    // Older front ends make the header its own continue block.
    if block.merge == Merge::Loop {
        return Ok(ContinueBlockType::WhileLoop);
    }

    let header_id = match block.loop_dominator {
        LoopDominator::Header(id) => id,
        _ => loop_header_of_continue(module, block.self_id).ok_or_else(|| {
            IrError::Malformed(format!(
                "continue block {} has no loop header",
                block.self_id
            ))
        })?,
    };
    let header = module.get::<Block>(header_id)?;

    if execution_is_noop(module, block.self_id, header_id)? {
        Ok(ContinueBlockType::WhileLoop)
    } else if execution_is_branchless(module, block.self_id, header_id)? {
        Ok(ContinueBlockType::ForLoop)
    } else if block.merge == Merge::None
        && block.terminator == Terminator::Select
        && block.true_block == Some(header_id)
        && block.false_block == header.merge_block
    {
        Ok(ContinueBlockType::DoWhileLoop)
    } else {
        Ok(ContinueBlockType::ComplexLoop)
    }
}
