//! Control-flow graph and dominator tree of one function.
//!
//! The graph only holds forward and cross edges: a branch back to a block
//! that is still being visited is a loop back edge and is left out, so the
//! graph is acyclic and post-order numbers increase towards the entry.

use std::collections::{HashMap, HashSet};

use spvx_ir::{Block, Function, Id, IrError, Module, Terminator};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done(u32),
}

/// The acyclic control-flow graph of a function.
#[derive(Debug, Clone)]
pub struct Cfg {
    function: Id,
    entry: Id,
    preceding_edges: HashMap<Id, Vec<Id>>,
    succeeding_edges: HashMap<Id, Vec<Id>>,
    immediate_dominators: HashMap<Id, Id>,
    visit_order: HashMap<Id, u32>,
    post_order: Vec<Id>,
}

impl Cfg {
    /// Builds the graph and dominator tree of `func`.
    pub fn new(module: &Module, func: Id) -> Result<Self, IrError> {
        let function = module.get::<Function>(func)?;
        let entry = function
            .entry_block
            .ok_or_else(|| IrError::Malformed(format!("function {func} has no blocks")))?;

        let mut cfg = Self {
            function: func,
            entry,
            preceding_edges: HashMap::new(),
            succeeding_edges: HashMap::new(),
            immediate_dominators: HashMap::new(),
            visit_order: HashMap::new(),
            post_order: Vec::new(),
        };
        cfg.build_post_order(module)?;
        cfg.build_immediate_dominators();
        log::trace!(
            "cfg of function {func}: {} reachable block(s)",
            cfg.post_order.len()
        );
        Ok(cfg)
    }

    pub fn function(&self) -> Id {
        self.function
    }

    pub fn entry_block(&self) -> Id {
        self.entry
    }

    /// Reachable blocks in post order.
    pub fn post_order(&self) -> &[Id] {
        &self.post_order
    }

    pub fn is_reachable(&self, block: Id) -> bool {
        self.visit_order.contains_key(&block)
    }

    /// Post-order index of `block`, starting at 1. Unreachable blocks have none.
    pub fn visit_order(&self, block: Id) -> Option<u32> {
        self.visit_order.get(&block).copied()
    }

    pub fn immediate_dominator(&self, block: Id) -> Option<Id> {
        self.immediate_dominators.get(&block).copied()
    }

    pub fn preceding_edges(&self, block: Id) -> &[Id] {
        self.preceding_edges.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn succeeding_edges(&self, block: Id) -> &[Id] {
        self.succeeding_edges.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if every path from the entry to `b` passes through `a`.
    pub fn dominates(&self, a: Id, b: Id) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut cursor = b;
        loop {
            if cursor == a {
                return true;
            }
            match self.immediate_dominator(cursor) {
                Some(next) if next != cursor => cursor = next,
                _ => return false,
            }
        }
    }

    /// Nearest block dominating both `a` and `b`.
    ///
    /// Both blocks must be reachable.
    pub fn find_common_dominator(&self, mut a: Id, mut b: Id) -> Id {
        while a != b {
            let (Some(oa), Some(ob)) = (self.visit_order(a), self.visit_order(b)) else {
                return self.entry;
            };
            // The block with the lower post-order index sits deeper in the tree.
            let (lower, higher) = if oa < ob { (&mut a, b) } else { (&mut b, a) };
            match self.immediate_dominator(*lower) {
                Some(idom) if idom != *lower => *lower = idom,
                _ => return higher,
            }
        }
        a
    }

    /// Calls `op` for `block` and every block reachable from it, once each.
    pub fn walk_from(&self, seen: &mut HashSet<Id>, block: Id, op: &mut impl FnMut(Id)) {
        let mut stack = vec![block];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            op(next);
            stack.extend(self.succeeding_edges(next).iter().rev());
        }
    }

    fn add_branch(&mut self, from: Id, to: Id) {
        let succ = self.succeeding_edges.entry(from).or_default();
        if !succ.contains(&to) {
            succ.push(to);
        }
        let pred = self.preceding_edges.entry(to).or_default();
        if !pred.contains(&from) {
            pred.push(from);
        }
    }

    fn build_post_order(&mut self, module: &Module) -> Result<(), IrError> {
        let mut state: HashMap<Id, Visit> = HashMap::new();
        let mut counter = 0u32;

        // Each frame holds a block and the successors still to visit.
        let mut stack: Vec<(Id, Vec<Id>)> = vec![(self.entry, targets(module, self.entry)?)];
        state.insert(self.entry, Visit::InProgress);

        while let Some((block, pending)) = stack.last_mut() {
            let block = *block;
            if pending.is_empty() {
                counter += 1;
                state.insert(block, Visit::Done(counter));
                self.visit_order.insert(block, counter);
                self.post_order.push(block);
                stack.pop();
                continue;
            }

            let target = pending.remove(0);
            match state.get(&target) {
                Some(Visit::InProgress) => {}
                Some(Visit::Done(_)) => self.add_branch(block, target),
                None => {
                    self.add_branch(block, target);
                    state.insert(target, Visit::InProgress);
                    let next = targets(module, target)?;
                    stack.push((target, next));
                }
            }
        }
        Ok(())
    }

    // Cooper, Harvey and Kennedy, "A Simple, Fast Dominance Algorithm".
    fn build_immediate_dominators(&mut self) {
        self.immediate_dominators.clear();
        self.immediate_dominators.insert(self.entry, self.entry);

        let order: Vec<Id> = self.post_order.iter().rev().copied().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &block in &order {
                if block == self.entry {
                    continue;
                }
                let mut new_idom: Option<Id> = None;
                for &pred in self.preceding_edges(block) {
                    if !self.immediate_dominators.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => self.intersect(current, pred),
                    });
                }
                if let Some(idom) = new_idom {
                    if self.immediate_dominators.get(&block) != Some(&idom) {
                        self.immediate_dominators.insert(block, idom);
                        changed = true;
                    }
                }
            }
        }
    }

    fn intersect(&self, mut a: Id, mut b: Id) -> Id {
        while a != b {
            while self.visit_order(a) < self.visit_order(b) {
                match self.immediate_dominator(a) {
                    Some(next) if next != a => a = next,
                    _ => return self.entry,
                }
            }
            while self.visit_order(b) < self.visit_order(a) {
                match self.immediate_dominator(b) {
                    Some(next) if next != b => b = next,
                    _ => return self.entry,
                }
            }
        }
        a
    }
}

/// Branch targets of a block's terminator, in emission order.
fn targets(module: &Module, id: Id) -> Result<Vec<Id>, IrError> {
    let block = module.get::<Block>(id)?;
    let mut out = Vec::new();
    match block.terminator {
        Terminator::Direct => out.extend(block.next_block),
        Terminator::Select => {
            out.extend(block.true_block);
            out.extend(block.false_block);
        }
        Terminator::MultiSelect => {
            out.extend(block.cases.iter().map(|c| c.block));
            out.extend(block.default_block);
        }
        _ => {}
    }
    for &target in &out {
        module.get::<Block>(target)?;
    }
    Ok(out)
}

/// Folds blocks into their common dominator one at a time.
pub struct DominatorBuilder<'a> {
    cfg: &'a Cfg,
    dominator: Option<Id>,
}

impl<'a> DominatorBuilder<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        Self {
            cfg,
            dominator: None,
        }
    }

    /// Adds a block; unreachable blocks are ignored.
    pub fn add_block(&mut self, block: Id) {
        if !self.cfg.is_reachable(block) {
            return;
        }
        self.dominator = Some(match self.dominator {
            None => block,
            Some(current) if current == block => current,
            Some(current) => self.cfg.find_common_dominator(current, block),
        });
    }

    /// Hoists the dominator to the function entry if it sits inside a loop.
    ///
    /// A dominator with a successor earlier in post order has a loop back
    /// edge running through it (the continue path), and a variable declared
    /// there would be reset on every iteration.
    pub fn lift_continue_block_dominator(&mut self, module: &Module) -> Result<(), IrError> {
        let Some(dominator) = self.dominator else {
            return Ok(());
        };
        let Some(order) = self.cfg.visit_order(dominator) else {
            return Ok(());
        };

        let back_edge = targets(module, dominator)?
            .into_iter()
            .any(|succ| self.cfg.visit_order(succ).is_some_and(|o| o >= order));
        if back_edge {
            log::trace!("lifting dominator {dominator} to the function entry");
            self.dominator = Some(self.cfg.entry_block());
        }
        Ok(())
    }

    /// The common dominator, or `None` if every added block was unreachable.
    pub fn dominator(&self) -> Option<Id> {
        self.dominator
    }
}
