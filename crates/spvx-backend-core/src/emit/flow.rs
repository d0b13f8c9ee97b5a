//! Functions and structured control flow.
//!
//! Blocks are emitted as a chain: each block prints its instructions, then
//! its terminator decides whether the chain continues into a successor,
//! opens a nested construct, or stops at a `break`/`continue`. Loop shapes
//! are chosen optimistically; a header that turns out to need statements
//! before its condition falls back to `for (;;)` in the next pass.

use log::debug;
use spirv::{ExecutionModel, Op};
use spvx_analysis::{
    analyze_variable_scope, block_is_loop_candidate, block_is_outside_flow_control_from_block,
    continue_block_type,
};
use spvx_ir::{
    BaseType, Block, ContinueBlockType, Function, Id, LoopDominator, LoopMethod, Merge, Terminator,
    Variable, VariantKind,
};

use super::{Dialect, Emitter};
use crate::BackendError;

impl<D: Dialect> Emitter<'_, D> {
    /// Emits `func` after every function it calls.
    pub fn emit_function(&mut self, func_id: Id) -> Result<(), BackendError> {
        let func = self.module.get_mut::<Function>(func_id)?;
        if func.active {
            return Ok(());
        }
        func.active = true;
        let blocks = func.blocks.clone();

        for &block in &blocks {
            let callees: Vec<Id> = self
                .module
                .get::<Block>(block)?
                .ops
                .iter()
                .filter(|i| i.op() == Some(Op::FunctionCall))
                .filter_map(|i| i.words.get(2).map(|&w| Id::new(w)))
                .collect();
            for callee in callees {
                self.emit_function(callee)?;
            }
        }

        self.processing_entry_point = Some(func_id) == self.module.entry_point;
        D::emit_function_prototype(self, func_id)?;
        self.begin_scope();
        self.current_function = Some(func_id);

        if !self.module.get::<Function>(func_id)?.analyzed_variable_scope {
            analyze_variable_scope(&mut self.module, func_id)?;
            self.apply_loop_variable_demotions(&blocks)?;
            self.module.get_mut::<Function>(func_id)?.analyzed_variable_scope = true;
        }

        let locals = self.module.get::<Function>(func_id)?.local_variables.clone();
        for v in locals {
            if self.module.expression_is_lvalue(v)? {
                self.add_local_variable_name(v);
                let var = self.module.get::<Variable>(v)?.clone();
                if var.initializer.is_some() {
                    let decl = self.variable_decl(&var)?;
                    self.statement(&format!("{decl};"));
                } else {
                    // Declared at first use, or at the block dominating all uses.
                    self.module.get_mut::<Variable>(v)?.deferred_declaration = true;
                }
            } else {
                // Images and samplers cannot be assigned in GLSL; a store
                // rebinds the name to the stored expression instead.
                self.module.get_mut::<Variable>(v)?.statically_assigned = true;
            }

            let var = self.module.get_mut::<Variable>(v)?;
            var.loop_variable_enable = false;
            if var.loop_variable {
                var.deferred_declaration = false;
            }
        }

        let entry = self
            .module
            .get::<Function>(func_id)?
            .entry_block
            .ok_or_else(|| BackendError::Malformed(format!("function {func_id} has no blocks")))?;
        self.module.get_mut::<Block>(entry)?.loop_dominator = LoopDominator::NoDominator;
        self.emit_block_chain(entry)?;

        self.end_scope()?;
        self.processing_entry_point = false;
        self.statement("");
        Ok(())
    }

    /// Loop variables that failed to land in a `for` header in an earlier
    /// pass are declared like any other local.
    fn apply_loop_variable_demotions(&mut self, blocks: &[Id]) -> Result<(), BackendError> {
        for &block in blocks {
            if !self.legal.demoted_loop_headers.contains(&block) {
                continue;
            }
            let vars = std::mem::take(&mut self.module.get_mut::<Block>(block)?.loop_variables);
            for var in vars {
                self.module.get_mut::<Variable>(var)?.loop_variable = false;
            }
        }
        Ok(())
    }

    /// Emits `ret name(args)`; the entry point is always called `main`.
    pub fn default_emit_function_prototype(&mut self, func_id: Id) -> Result<(), BackendError> {
        // Locals must not shadow globals.
        self.local_variable_names = self.resource_names.clone();

        let func = self.module.get::<Function>(func_id)?.clone();
        let ret = self.type_of(func.return_type)?;
        let flags = self.module.decoration_flags(func_id);
        let mut decl = format!("{}{} ", self.flags_to_precision(&ret, flags)?, self.type_to_glsl(&ret)?);
        if self.processing_entry_point {
            decl.push_str("main");
        } else {
            decl.push_str(&self.to_name(func_id));
        }

        let mut args = Vec::with_capacity(func.arguments.len() + func.shadow_arguments.len());
        for arg in &func.arguments {
            if D::skip_argument(self, arg.id)? {
                continue;
            }
            self.add_local_variable_name(arg.id);
            args.push(D::argument_decl(self, arg)?);
        }
        for arg in &func.shadow_arguments {
            self.add_local_variable_name(arg.id);
            args.push(D::argument_decl(self, arg)?);
        }

        self.statement(&format!("{decl}({})", args.join(", ")));
        Ok(())
    }

    /// Clip-space fixup for vertex shaders targeting a [0, w] depth range.
    pub fn default_emit_fixup(&mut self) -> Result<(), BackendError> {
        if self.execution_model()? == ExecutionModel::Vertex && self.options.vertex.fixup_clipspace {
            let suffix = if self.traits.float_literal_suffix { "f" } else { "" };
            self.statement(&format!("gl_Position.z = 2.0{suffix} * gl_Position.z - gl_Position.w;"));
        }
        Ok(())
    }

    // ---- phi and branches ----

    fn flush_phi_required(&self, from: Id, to: Id) -> Result<bool, BackendError> {
        let child = self.module.get::<Block>(to)?;
        Ok(child.phi_variables.iter().any(|phi| phi.parent == from))
    }

    /// Assigns the φ values `to` receives along the edge from `from`.
    fn flush_phi(&mut self, from: Id, to: Id) -> Result<(), BackendError> {
        let phis: Vec<_> = self
            .module
            .get::<Block>(to)?
            .phi_variables
            .iter()
            .filter(|phi| phi.parent == from)
            .copied()
            .collect();
        for phi in phis {
            let lhs = self.to_expression(phi.function_variable)?;
            let rhs = self.to_expression(phi.local_variable)?;
            self.statement(&format!("{lhs} = {rhs};"));
        }
        Ok(())
    }

    fn branch(&mut self, from: Id, to: Id) -> Result<(), BackendError> {
        self.flush_phi(from, to)?;
        self.flush_all_active_variables()?;

        let from_dominator = self.module.get::<Block>(from)?.loop_dominator;
        if self.module.loop_blocks.contains(&to) && from_dominator == LoopDominator::Header(to) {
            // Only reached from a complex continue block branching back.
            self.statement("continue;");
        } else if self.module.is_continue(to) {
            if self.module.get::<Block>(to)?.complex_continue {
                // The continue block is printed at every continue site; its
                // reads must not count against the surrounding code.
                let usage_counts = self.usage_counts.clone();
                let invalid = self.invalid_expressions.clone();
                self.emit_block_chain(to)?;
                self.usage_counts = usage_counts;
                self.invalid_expressions = invalid;
            } else {
                let needs_continue = match from_dominator {
                    LoopDominator::Header(header) => {
                        !block_is_outside_flow_control_from_block(&self.module, header, from)?
                    }
                    _ => true,
                };
                if needs_continue {
                    self.statement("continue;");
                }
            }
        } else if self.module.is_break(to) {
            self.statement("break;");
        } else if !self.module.is_conditional(to) {
            self.emit_block_chain(to)?;
        }
        Ok(())
    }

    fn branch_conditional(
        &mut self,
        from: Id,
        cond: Id,
        true_block: Id,
        false_block: Id,
    ) -> Result<(), BackendError> {
        // Branching straight to the selection merge needs no code path.
        let true_sub = !self.module.is_conditional(true_block);
        let false_sub = !self.module.is_conditional(false_block);

        if true_sub {
            let cond = self.to_expression(cond)?;
            self.statement(&format!("if ({cond})"));
            self.begin_scope();
            self.branch(from, true_block)?;
            self.end_scope()?;

            if false_sub {
                self.statement("else");
                self.begin_scope();
                self.branch(from, false_block)?;
                self.end_scope()?;
            } else if self.flush_phi_required(from, false_block)? {
                self.statement("else");
                self.begin_scope();
                self.flush_phi(from, false_block)?;
                self.end_scope()?;
            }
        } else if false_sub {
            let cond = self.to_enclosed_expression(cond)?;
            self.statement(&format!("if (!{cond})"));
            self.begin_scope();
            self.branch(from, false_block)?;
            self.end_scope()?;

            if self.flush_phi_required(from, true_block)? {
                self.statement("else");
                self.begin_scope();
                self.flush_phi(from, true_block)?;
                self.end_scope()?;
            }
        }
        Ok(())
    }

    /// Hands the innermost loop header down to the successors of `id`.
    fn propagate_loop_dominators(&mut self, id: Id) -> Result<(), BackendError> {
        let block = self.module.get::<Block>(id)?.clone();
        if block.merge != Merge::Loop && block.loop_dominator == LoopDominator::Unset {
            return Ok(());
        }
        let dominator = if block.merge == Merge::Loop {
            LoopDominator::Header(id)
        } else {
            block.loop_dominator
        };

        // A block keeps the first dominator it receives; later ones come
        // from edges breaking out to merge targets.
        let mut set = |target: Id, value: LoopDominator| -> Result<(), BackendError> {
            let child = self.module.get_mut::<Block>(target)?;
            if child.loop_dominator == LoopDominator::Unset {
                child.loop_dominator = value;
            }
            Ok(())
        };

        if let Some(merge) = block.merge_block {
            set(merge, block.loop_dominator)?;
        }
        for target in [block.true_block, block.false_block, block.next_block].into_iter().flatten() {
            set(target, dominator)?;
        }
        for case in &block.cases {
            set(case.block, dominator)?;
        }
        if let Some(cont) = block.continue_block.filter(|&c| c != id) {
            set(cont, dominator)?;
        }
        Ok(())
    }

    // ---- loops ----

    /// The continue block as a comma-separated expression list for a
    /// `for` header.
    fn emit_continue_block(&mut self, continue_block: Id) -> Result<String, BackendError> {
        let saved = self.begin_redirect();
        self.current_continue_block = Some(continue_block);
        let result = self.emit_continue_block_chain(continue_block);
        self.current_continue_block = None;
        let statements = self.end_redirect(saved);
        result?;

        let statements: Vec<&str> = statements
            .iter()
            .map(|s| s.strip_suffix(';').unwrap_or(s))
            .collect();
        Ok(statements.join(", "))
    }

    fn emit_continue_block_chain(&mut self, continue_block: Id) -> Result<(), BackendError> {
        let mut id = continue_block;
        let mut remaining = self.module.bound();
        while !self.module.loop_blocks.contains(&id) {
            remaining = remaining.checked_sub(1).ok_or_else(|| {
                BackendError::Malformed(format!("continue block {continue_block} never reaches its loop header"))
            })?;
            self.propagate_loop_dominators(id)?;
            let block = self.module.get::<Block>(id)?.clone();
            for inst in &block.ops {
                self.emit_instruction(inst)?;
            }

            // A do-while continue block ends in the selection back to the header.
            let next = block.next_block.or(block.true_block).ok_or_else(|| {
                BackendError::Malformed(format!("continue block {id} has no successor"))
            })?;
            self.flush_phi(id, next)?;
            id = next;
        }
        Ok(())
    }

    fn emit_for_loop_initializers(&mut self, header: Id) -> Result<String, BackendError> {
        let vars = self.module.get::<Block>(header)?.loop_variables.clone();
        match vars.as_slice() {
            [] => Ok(String::new()),
            [single] => {
                let var = self.module.get::<Variable>(*single)?.clone();
                self.variable_decl(&var)
            }
            [first, ..] => {
                // Every loop variable shares the first one's type and qualifiers.
                let basetype = self.module.get::<Variable>(*first)?.basetype;
                let ty = self.type_of(basetype)?;
                let mut expr = format!("{}{} ", self.to_qualifiers(*first)?, self.type_to_glsl(&ty)?);
                let mut inits = Vec::with_capacity(vars.len());
                for &var in &vars {
                    let init = self.module.get::<Variable>(var)?.static_expression.ok_or_else(|| {
                        BackendError::Internal(format!("loop variable {var} has no initial value"))
                    })?;
                    inits.push(format!("{} = {}", self.to_name(var), self.to_expression(init)?));
                }
                expr.push_str(&inits.join(", "));
                Ok(expr)
            }
        }
    }

    /// Tries to open `block` as a `for` or `while` loop. On failure the
    /// header is disabled for the next pass and a plain scope is opened.
    fn attempt_emit_loop_header(&mut self, id: Id, method: LoopMethod) -> Result<bool, BackendError> {
        let block = self.module.get::<Block>(id)?.clone();
        let continue_block = block
            .continue_block
            .ok_or_else(|| BackendError::Malformed(format!("loop header {id} has no continue block")))?;
        let continue_type = continue_block_type(&self.module, self.module.get::<Block>(continue_block)?)?;

        let condition_block = match method {
            LoopMethod::MergeToSelectForLoop => block.clone(),
            LoopMethod::MergeToDirectForLoop => {
                let child = block.next_block.ok_or_else(|| {
                    BackendError::Malformed(format!("loop header {id} has no successor"))
                })?;
                self.flush_undeclared_variables(child)?;
                self.module.get::<Block>(child)?.clone()
            }
        };

        // The header only works if nothing before the condition needed a statement.
        let count = self.statement_count;
        for inst in &condition_block.ops {
            self.emit_instruction(inst)?;
        }
        let condition = condition_block
            .condition
            .ok_or_else(|| BackendError::Malformed(format!("loop condition block {} has no condition", condition_block.self_id)))?;
        let condition_forwarded = !self.legal.forced_temporaries.contains(&condition);

        if count != self.statement_count || !condition_forwarded {
            debug!("loop header {id} needs statements before its condition, falling back to for (;;)");
            self.module.get_mut::<Block>(id)?.disable_block_optimization = true;
            self.legal.disabled_loop_headers.insert(id);
            self.force_recompile(format!("loop header {id} cannot be structured"));
            // Balanced by the end of the loop.
            self.begin_scope();
            return Ok(false);
        }

        if method == LoopMethod::MergeToDirectForLoop {
            self.propagate_loop_dominators(condition_block.self_id)?;
        }

        match continue_type {
            ContinueBlockType::ForLoop => {
                let init = self.emit_for_loop_initializers(id)?;
                let cond = self.to_expression(condition)?;
                let cont = self.emit_continue_block(continue_block)?;
                self.statement(&format!("for ({init}; {cond}; {cont})"));
            }
            ContinueBlockType::WhileLoop => {
                let cond = self.to_expression(condition)?;
                self.statement(&format!("while ({cond})"));
            }
            other => {
                return Err(BackendError::Internal(format!(
                    "loop header {id} matched a for/while shape but its continue block is {other:?}"
                )));
            }
        }
        self.begin_scope();

        if method == LoopMethod::MergeToDirectForLoop {
            let body = condition_block.true_block.ok_or_else(|| {
                BackendError::Malformed(format!("loop condition block {} has no body", condition_block.self_id))
            })?;
            self.branch(condition_block.self_id, body)?;
        }
        Ok(true)
    }

    /// Declares the deferred variables whose scope is `id`.
    fn flush_undeclared_variables(&mut self, id: Id) -> Result<(), BackendError> {
        let vars = self.module.get::<Block>(id)?.dominated_variables.clone();
        for v in vars {
            self.flush_variable_declaration(v)?;
        }
        Ok(())
    }

    fn emit_block_ops(&mut self, block: &Block) -> Result<(), BackendError> {
        for inst in &block.ops {
            self.emit_instruction(inst)?;
        }
        Ok(())
    }

    /// Emits `id` and every block it flows into up to the next merge point.
    pub fn emit_block_chain(&mut self, id: Id) -> Result<(), BackendError> {
        self.propagate_loop_dominators(id)?;
        let block = self.module.get::<Block>(id)?.clone();

        let mut select_branch_to_true_block = false;
        let mut skip_direct_branch = false;
        let mut emitted_loop_header = false;

        for &(ty, tmp) in &block.declare_temporary {
            let ty = self.type_of(ty)?;
            let flags = self.module.decoration_flags(tmp);
            let precision = self.flags_to_precision(&ty, flags)?;
            let name = self.to_name(tmp);
            let decl = self.variable_decl_typed(&ty, &name)?;
            self.statement(&format!("{precision}{decl};"));
        }

        let mut continue_type = match block.continue_block {
            Some(cont) => continue_block_type(&self.module, self.module.get::<Block>(cont)?)?,
            None => ContinueBlockType::ContinueNone,
        };

        for &var in &block.loop_variables {
            self.module.get_mut::<Variable>(var)?.loop_variable_enable = true;
        }

        if block_is_loop_candidate(&self.module, &block, LoopMethod::MergeToSelectForLoop)? {
            self.flush_undeclared_variables(id)?;
            if self.attempt_emit_loop_header(id, LoopMethod::MergeToSelectForLoop)? {
                // The body of the loop is the true block.
                select_branch_to_true_block = true;
                emitted_loop_header = true;
            }
        } else if block_is_loop_candidate(&self.module, &block, LoopMethod::MergeToDirectForLoop)? {
            self.flush_undeclared_variables(id)?;
            if self.attempt_emit_loop_header(id, LoopMethod::MergeToDirectForLoop)? {
                skip_direct_branch = true;
                emitted_loop_header = true;
            }
        } else if continue_type == ContinueBlockType::DoWhileLoop {
            self.statement("do");
            self.begin_scope();
            self.emit_block_ops(&block)?;
        } else if block.merge == Merge::Loop {
            self.flush_undeclared_variables(id)?;
            // No recognizable shape; the continue block is inlined at each
            // continue site.
            if let Some(cont) = block.continue_block {
                self.module.get_mut::<Block>(cont)?.complex_continue = true;
            }
            continue_type = ContinueBlockType::ComplexLoop;
            self.statement("for (;;)");
            self.begin_scope();
            self.emit_block_ops(&block)?;
        } else {
            self.emit_block_ops(&block)?;
        }

        // Stores to loop variables were masked until the header; without
        // one they are lost.
        if !emitted_loop_header && !block.loop_variables.is_empty() {
            debug!("loop variables of {id} could not be declared in a for header");
            for &var in &block.loop_variables {
                self.module.get_mut::<Variable>(var)?.loop_variable = false;
            }
            self.module.get_mut::<Block>(id)?.loop_variables.clear();
            self.legal.demoted_loop_headers.insert(id);
            self.force_recompile(format!("loop variables of {id} demoted"));
        }

        self.flush_undeclared_variables(id)?;
        let mut emit_next_block = true;
        let block = self.module.get::<Block>(id)?.clone();

        match block.terminator {
            Terminator::Direct => {
                let next = block.next_block.ok_or_else(|| {
                    BackendError::Malformed(format!("block {id} branches nowhere"))
                })?;
                if block.loop_dominator == LoopDominator::Header(next) {
                    // A complex continue block branching back to its header.
                    self.branch(id, next)?;
                    emit_next_block = false;
                } else if skip_direct_branch {
                    emit_next_block = false;
                } else if self.module.is_continue(next)
                    || self.module.is_break(next)
                    || self.module.is_conditional(next)
                {
                    self.branch(id, next)?;
                    emit_next_block = false;
                }
            }
            Terminator::Select => {
                let (t, f) = block
                    .true_block
                    .zip(block.false_block)
                    .ok_or_else(|| BackendError::Malformed(format!("selection in {id} lacks a target")))?;
                if select_branch_to_true_block {
                    self.branch(id, t)?;
                } else {
                    let cond = block.condition.ok_or_else(|| {
                        BackendError::Malformed(format!("selection in {id} has no condition"))
                    })?;
                    self.branch_conditional(id, cond, t, f)?;
                }
            }
            Terminator::MultiSelect => self.emit_switch(&block)?,
            Terminator::Return => {
                if self.processing_entry_point {
                    D::emit_fixup(self)?;
                }
                if let Some(value) = block.return_value {
                    // Returning an undefined value needs no statement.
                    if self.module.kind(value) != VariantKind::Undef {
                        let value = self.to_expression(value)?;
                        self.statement(&format!("return {value};"));
                    }
                } else {
                    let entry = self
                        .current_function
                        .map(|f| self.module.get::<Function>(f).map(|f| f.entry_block))
                        .transpose()?
                        .flatten();
                    let trailing = match entry {
                        Some(entry) => block_is_outside_flow_control_from_block(&self.module, entry, id)?,
                        None => false,
                    };
                    // A return at the end of the function body is implicit.
                    if !trailing || block.loop_dominator != LoopDominator::NoDominator {
                        self.statement("return;");
                    }
                }
            }
            Terminator::Kill => {
                let discard = self.traits.discard_literal;
                self.statement(&format!("{discard};"));
            }
            Terminator::Unreachable => {}
            Terminator::Unknown => {
                return Err(BackendError::Malformed(format!("block {id} has no terminator")));
            }
        }

        if let (Some(next), true) = (block.next_block, emit_next_block) {
            // A selection merge already flushed its φ values on each arm.
            if block.merge != Merge::Selection {
                self.flush_phi(id, next)?;
            }
            self.emit_block_chain(next)?;
        }

        if block.merge == Merge::Loop {
            let cont = block
                .continue_block
                .ok_or_else(|| BackendError::Malformed(format!("loop header {id} has no continue block")))?;
            if continue_type == ContinueBlockType::DoWhileLoop {
                // Evaluate the continue block for its condition; any
                // statement it needs forces the generic loop next pass.
                let statements = self.emit_continue_block(cont)?;
                if !statements.is_empty() {
                    debug!("do-while continue block {cont} has side effects");
                    self.module.get_mut::<Block>(cont)?.complex_continue = true;
                    self.legal.complex_continues.insert(cont);
                    self.force_recompile(format!("continue block {cont} is complex"));
                }
                let cond = self.module.get::<Block>(cont)?.condition.ok_or_else(|| {
                    BackendError::Malformed(format!("do-while continue block {cont} has no condition"))
                })?;
                let cond = self.to_expression(cond)?;
                self.end_scope_decl(&format!("while ({cond})"))?;
            } else {
                self.end_scope()?;
            }

            let merge = block
                .merge_block
                .ok_or_else(|| BackendError::Malformed(format!("loop header {id} has no merge block")))?;
            self.flush_phi(id, merge)?;
            self.emit_block_chain(merge)?;
        }
        Ok(())
    }

    fn emit_switch(&mut self, block: &Block) -> Result<(), BackendError> {
        let id = block.self_id;
        let cond = block
            .condition
            .ok_or_else(|| BackendError::Malformed(format!("switch in {id} has no selector")))?;
        let unsigned = self.expression_type(cond)?.basetype == BaseType::UInt;
        let selector = self.to_expression(cond)?;
        self.statement(&format!("switch ({selector})"));
        self.begin_scope();

        for case in &block.cases {
            let label = if unsigned {
                case.value.to_string()
            } else {
                (case.value as i32).to_string()
            };
            self.statement(&format!("case {label}:"));
            self.begin_scope();
            self.branch(id, case.block)?;
            self.end_scope()?;
        }

        let default = block
            .default_block
            .ok_or_else(|| BackendError::Malformed(format!("switch in {id} has no default target")))?;
        if Some(default) != block.next_block {
            if self.module.is_break(default) && !self.module.multiselect_merge_targets.contains(&default) {
                return Err(BackendError::Unsupported(
                    "a switch default cannot break out of an enclosing loop".into(),
                ));
            }
            self.statement("default:");
            self.begin_scope();
            self.branch(id, default)?;
            self.end_scope()?;
        } else if let Some(next) = block.next_block {
            if self.flush_phi_required(id, next)? {
                self.statement("default:");
                self.begin_scope();
                self.flush_phi(id, next)?;
                self.statement("break;");
                self.end_scope()?;
            }
        }

        self.end_scope()
    }
}
