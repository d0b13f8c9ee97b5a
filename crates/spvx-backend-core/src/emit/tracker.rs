//! Expression forwarding, invalidation and temporaries.
//!
//! A result is *forwarded* when its text is kept and substituted into every
//! use instead of being bound to a temporary. Forwarding is speculative: a
//! later store may change what the text would evaluate to, and a second
//! read would duplicate work. Both cases are detected here and recorded in
//! [`Legalization`](super::Legalization) so the next pass emits a temporary.

use spvx_ir::{BaseType, Constant, ConstantOp, Expression, Id, Type, Variable, VariantKind};

use super::access::index_to_swizzle;
use super::{Dialect, Emitter};
use crate::BackendError;

impl<D: Dialect> Emitter<'_, D> {
    /// The text of a value, recording the read.
    pub fn to_expression(&mut self, id: Id) -> Result<String, BackendError> {
        if self.invalid_expressions.contains(&id) {
            self.handle_invalid_expression(id)?;
        }

        if let Some(expr) = self.module.maybe_get::<Expression>(id) {
            let invalid_deps: Vec<Id> = expr
                .expression_dependencies
                .iter()
                .copied()
                .filter(|dep| self.invalid_expressions.contains(dep))
                .collect();
            for dep in invalid_deps {
                self.handle_invalid_expression(dep)?;
            }
        }

        self.track_expression_read(id);

        match self.module.kind(id) {
            VariantKind::Expression => {
                let expr = self.module.get::<Expression>(id)?;
                let (base, text) = (expr.base_expression, expr.text.clone());
                match base {
                    Some(base) => Ok(self.to_enclosed_expression(base)? + &text),
                    None => Ok(text),
                }
            }
            VariantKind::Constant => self.constant_reference(id),
            VariantKind::ConstantOp => {
                let cop = self.module.get::<ConstantOp>(id)?.clone();
                self.constant_op_expression(&cop)
            }
            VariantKind::Variable => {
                let var = self.module.get::<Variable>(id)?;
                if var.statically_assigned || (var.loop_variable && !var.loop_variable_enable) {
                    let value = var.static_expression.ok_or_else(|| {
                        BackendError::Internal(format!("variable {id} has no static expression"))
                    })?;
                    return self.to_expression(value);
                }
                if var.deferred_declaration {
                    let mut var = var.clone();
                    var.deferred_declaration = false;
                    self.module.get_mut::<Variable>(id)?.deferred_declaration = false;
                    return self.variable_decl(&var);
                }
                match self.module.meta(id).decoration.builtin {
                    Some(builtin) => self.builtin_to_glsl(builtin),
                    None => Ok(self.to_name(id)),
                }
            }
            _ => Ok(self.to_name(id)),
        }
    }

    /// Like [`Emitter::to_expression`], parenthesized when the text has a
    /// top-level space.
    pub fn to_enclosed_expression(&mut self, id: Id) -> Result<String, BackendError> {
        let expr = self.to_expression(id)?;
        Ok(enclose_expression(expr))
    }

    /// Reading an expression that a store invalidated: make it a temporary
    /// next pass.
    pub fn handle_invalid_expression(&mut self, id: Id) -> Result<(), BackendError> {
        if let Some(expr) = self.module.maybe_get_mut::<Expression>(id) {
            expr.used_while_invalidated = true;
        }
        self.legal.forced_temporaries.insert(id);
        self.force_recompile(format!("expression {id} read after invalidation"));
        Ok(())
    }

    /// A forwarded temporary read twice is bound to a temporary next pass.
    pub fn track_expression_read(&mut self, id: Id) {
        if !self.forwarded_temporaries.contains(&id) || self.suppressed_usage_tracking.contains(&id) {
            return;
        }
        let count = self.usage_counts.entry(id).or_insert(0);
        *count += 1;
        if *count >= 2 && self.legal.forced_temporaries.insert(id) {
            self.force_recompile(format!("forwarded expression {id} read more than once"));
        }
    }

    /// Whether `id` was forwarded instead of stored.
    pub fn expression_is_forwarded(&self, id: Id) -> bool {
        self.forwarded_temporaries.contains(&id)
    }

    /// Whether reading `id` can be deferred to its use.
    pub fn should_forward(&self, id: Id) -> Result<bool, BackendError> {
        if self.options.force_temporary {
            return Ok(false);
        }
        let forwardable = self
            .module
            .maybe_get::<Variable>(id)
            .is_some_and(|v| v.forwardable);
        Ok(forwardable || self.module.is_immutable(id)?)
    }

    /// Whether the result of a call with these arguments can be forwarded.
    pub fn args_will_forward(&self, id: Id, args: &[Id], pure: bool) -> Result<bool, BackendError> {
        if self.legal.forced_temporaries.contains(&id) {
            return Ok(false);
        }
        for &arg in args {
            if !self.should_forward(arg)? {
                return Ok(false);
            }
        }
        if !pure {
            let globals = self.module.global_variables.iter();
            for &global in globals.chain(self.module.aliased_variables.iter()) {
                if !self.should_forward(global)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Records that `expr` was read through `chain`.
    pub fn register_read(&mut self, expr: Id, chain: Id, forwarded: bool) -> Result<(), BackendError> {
        let Some(var_id) = self.module.maybe_get_backing_variable(chain) else {
            return Ok(());
        };
        let immutable = self.module.is_immutable(var_id)?;
        self.module.get_mut::<Expression>(expr)?.loaded_from = Some(var_id);
        let var = self.module.get_mut::<Variable>(var_id)?;
        if forwarded && !immutable {
            var.dependees.push(expr);
        }
        if var.parameter.is_some() {
            self.legal.read_parameters.insert(var_id);
        }
        Ok(())
    }

    /// Records a store through `chain`, invalidating forwarded reads.
    pub fn register_write(&mut self, chain: Id) -> Result<(), BackendError> {
        let Some(var_id) = self.module.maybe_get_backing_variable(chain) else {
            return Ok(());
        };
        let var = self.module.get::<Variable>(var_id)?;
        let is_parameter = var.parameter.is_some();
        if self.module.variable_storage_is_aliased(var)? {
            self.flush_all_aliased_variables()?;
        } else {
            self.flush_dependees(var_id)?;
        }

        if is_parameter && self.legal.written_parameters.insert(var_id) {
            self.force_recompile(format!("parameter {var_id} is written"));
        }
        Ok(())
    }

    /// Invalidates every forwarded expression that read `var`.
    pub fn flush_dependees(&mut self, var: Id) -> Result<(), BackendError> {
        let dependees = std::mem::take(&mut self.module.get_mut::<Variable>(var)?.dependees);
        self.invalid_expressions.extend(dependees);
        Ok(())
    }

    /// Invalidates expressions reading any aliased variable.
    pub fn flush_all_aliased_variables(&mut self) -> Result<(), BackendError> {
        for var in self.module.aliased_variables.clone() {
            self.flush_dependees(var)?;
        }
        Ok(())
    }

    /// Atomics can touch any global.
    pub fn flush_all_atomic_capable_variables(&mut self) -> Result<(), BackendError> {
        for var in self.module.global_variables.clone() {
            self.flush_dependees(var)?;
        }
        self.flush_all_aliased_variables()
    }

    /// Invalidates every forwarded read in the current function, as a
    /// barrier or an impure call requires.
    pub fn flush_all_active_variables(&mut self) -> Result<(), BackendError> {
        if let Some(func) = self.current_function {
            let func = self.module.get::<spvx_ir::Function>(func)?;
            let vars: Vec<Id> = func
                .local_variables
                .iter()
                .copied()
                .chain(func.arguments.iter().map(|a| a.id))
                .collect();
            for var in vars {
                if self.module.maybe_get::<Variable>(var).is_some() {
                    self.flush_dependees(var)?;
                }
            }
        }
        self.flush_all_atomic_capable_variables()
    }

    /// A call to a function with side effects invalidates globals.
    pub fn register_impure_function_call(&mut self) -> Result<(), BackendError> {
        self.flush_all_atomic_capable_variables()
    }

    /// Records that a call may write through `id`.
    pub fn register_call_out_argument(&mut self, id: Id) -> Result<(), BackendError> {
        self.register_write(id)?;
        if self.module.maybe_get::<Variable>(id).is_some() {
            self.flush_variable_declaration(id)?;
        }
        Ok(())
    }

    /// Emits a declaration that was deferred to its first use.
    pub fn flush_variable_declaration(&mut self, id: Id) -> Result<(), BackendError> {
        let Some(var) = self.module.maybe_get_mut::<Variable>(id) else {
            return Ok(());
        };
        if !var.deferred_declaration {
            return Ok(());
        }
        var.deferred_declaration = false;
        let var = var.clone();
        let decl = self.variable_decl(&var)?;
        self.statement(&format!("{decl};"));
        Ok(())
    }

    /// `dst` depends on `source` and everything `source` depends on.
    pub fn inherit_expression_dependencies(&mut self, dst: Id, source: Id) -> Result<(), BackendError> {
        let Some(src) = self.module.maybe_get::<Expression>(source) else {
            return Ok(());
        };
        let inherited = src.expression_dependencies.clone();
        let deps = &mut self.module.get_mut::<Expression>(dst)?.expression_dependencies;
        for dep in std::iter::once(source).chain(inherited) {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        Ok(())
    }

    /// The left-hand side of a temporary declaration, `type name = `.
    ///
    /// Inside a continue block the temporary is hoisted into the loop
    /// header so the block itself stays a list of expressions.
    pub fn declare_temporary(&mut self, result_type: Id, id: Id) -> Result<String, BackendError> {
        if let Some(block) = self.current_continue_block {
            let header = self.continue_block_header(block)?;
            let hoisted = self.legal.hoisted_temporaries.entry(header).or_default();
            if !hoisted.contains(&(result_type, id)) {
                hoisted.push((result_type, id));
                self.force_recompile(format!("temporary {id} hoisted out of a continue block"));
            }
            return Ok(format!("{} = ", self.to_name(id)));
        }

        let ty = self.type_of(result_type)?;
        let flags = self.module.decoration_flags(id);
        let precision = self.flags_to_precision(&ty, flags)?;
        let name = self.to_name(id);
        let decl = self.variable_decl_typed(&ty, &name)?;
        Ok(format!("{precision}{decl} = "))
    }

    fn continue_block_header(&self, block: Id) -> Result<Id, BackendError> {
        match self.module.get::<spvx_ir::Block>(block)?.loop_dominator {
            spvx_ir::LoopDominator::Header(header) => Ok(header),
            _ => spvx_analysis::loop_header_of_continue(&self.module, block).ok_or_else(|| {
                BackendError::Internal(format!("continue block {block} has no loop header"))
            }),
        }
    }

    /// Binds `rhs` to `id`, either as forwarded text or through a
    /// temporary statement.
    pub fn emit_op(
        &mut self,
        result_type: Id,
        id: Id,
        rhs: &str,
        forwarding: bool,
        suppress_usage_tracking: bool,
    ) -> Result<(), BackendError> {
        if forwarding && !self.legal.forced_temporaries.contains(&id) {
            if suppress_usage_tracking {
                self.suppressed_usage_tracking.insert(id);
            } else {
                self.forwarded_temporaries.insert(id);
            }
            self.module
                .set(id, Expression::new(id, rhs.to_string(), result_type, true))?;
        } else {
            let decl = self.declare_temporary(result_type, id)?;
            self.statement(&format!("{decl}{rhs};"));
            let name = self.to_name(id);
            self.module.set(id, Expression::new(id, name, result_type, true))?;
        }
        Ok(())
    }

    fn will_forward(&self, id: Id, forward: bool) -> bool {
        forward && !self.legal.forced_temporaries.contains(&id)
    }

    fn forward_all(&self, ops: &[Id]) -> Result<bool, BackendError> {
        for &op in ops {
            if !self.should_forward(op)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn inherit_all(&mut self, id: Id, ops: &[Id]) -> Result<(), BackendError> {
        for &op in ops {
            self.inherit_expression_dependencies(id, op)?;
        }
        Ok(())
    }

    /// `op operand`, as in `-x`.
    pub fn emit_unary_op(&mut self, result_type: Id, id: Id, op0: Id, op: &str) -> Result<(), BackendError> {
        let forward = self.should_forward(op0)?;
        let rhs = format!("{op}{}", self.to_enclosed_expression(op0)?);
        self.emit_op(result_type, id, &rhs, forward, false)?;
        if self.will_forward(id, forward) {
            self.inherit_expression_dependencies(id, op0)?;
        }
        Ok(())
    }

    /// `a op b`.
    pub fn emit_binary_op(
        &mut self,
        result_type: Id,
        id: Id,
        op0: Id,
        op1: Id,
        op: &str,
    ) -> Result<(), BackendError> {
        let forward = self.forward_all(&[op0, op1])?;
        let rhs = format!(
            "{} {op} {}",
            self.to_enclosed_expression(op0)?,
            self.to_enclosed_expression(op1)?
        );
        self.emit_op(result_type, id, &rhs, forward, false)?;
        if self.will_forward(id, forward) {
            self.inherit_all(id, &[op0, op1])?;
        }
        Ok(())
    }

    /// Spells both operands as `input_type`, bitcasting when the operand
    /// types disagree with each other or with the expected input.
    ///
    /// Returns the operand texts, the type they were cast to, and the
    /// input type actually used.
    pub fn binary_op_bitcast_helper(
        &mut self,
        input_type: BaseType,
        op0: Id,
        op1: Id,
        skip_cast_if_equal_type: bool,
    ) -> Result<(String, String, Type, BaseType), BackendError> {
        let type0 = self.expression_type(op0)?;
        let type1 = self.expression_type(op1)?;
        let cast = type0.basetype != type1.basetype
            || (!skip_cast_if_equal_type && type0.basetype != input_type);

        let expected = Type {
            basetype: input_type,
            vecsize: type0.vecsize,
            columns: type0.columns,
            width: type0.width,
            ..Type::default()
        };

        if cast {
            let a = self.bitcast_glsl(&expected, op0)?;
            let b = self.bitcast_glsl(&expected, op1)?;
            Ok((a, b, expected, input_type))
        } else {
            let a = self.to_enclosed_expression(op0)?;
            let b = self.to_enclosed_expression(op1)?;
            Ok((a, b, expected, type0.basetype))
        }
    }

    /// A binary operator whose operands must be of `input_type`, such as
    /// a signed comparison on unsigned values.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_binary_op_cast(
        &mut self,
        result_type: Id,
        id: Id,
        op0: Id,
        op1: Id,
        op: &str,
        input_type: BaseType,
        skip_cast_if_equal_type: bool,
    ) -> Result<(), BackendError> {
        let (a, b, mut expected, input) =
            self.binary_op_bitcast_helper(input_type, op0, op1, skip_cast_if_equal_type)?;
        let out_type = self.type_of(result_type)?;
        let expr = if out_type.basetype != input && out_type.basetype != BaseType::Boolean {
            expected.basetype = input;
            let cast = self.bitcast_glsl_op(&out_type, &expected)?;
            format!("{cast}({a} {op} {b})")
        } else {
            format!("{a} {op} {b}")
        };
        let forward = self.forward_all(&[op0, op1])?;
        self.emit_op(result_type, id, &expr, forward, false)
    }

    /// `func(a)`.
    pub fn emit_unary_func_op(&mut self, result_type: Id, id: Id, op0: Id, func: &str) -> Result<(), BackendError> {
        let forward = self.should_forward(op0)?;
        let rhs = format!("{func}({})", self.to_expression(op0)?);
        self.emit_op(result_type, id, &rhs, forward, false)?;
        if self.will_forward(id, forward) {
            self.inherit_expression_dependencies(id, op0)?;
        }
        Ok(())
    }

    /// `func(a, b)`.
    pub fn emit_binary_func_op(
        &mut self,
        result_type: Id,
        id: Id,
        op0: Id,
        op1: Id,
        func: &str,
    ) -> Result<(), BackendError> {
        self.emit_func_op(result_type, id, &[op0, op1], func)
    }

    /// Emits `func(a, b)`, bitcasting operands to `input_type` and the result
    /// back when the signedness differs.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_binary_func_op_cast(
        &mut self,
        result_type: Id,
        id: Id,
        op0: Id,
        op1: Id,
        func: &str,
        input_type: BaseType,
        skip_cast_if_equal_type: bool,
    ) -> Result<(), BackendError> {
        let (a, b, mut expected, input) =
            self.binary_op_bitcast_helper(input_type, op0, op1, skip_cast_if_equal_type)?;
        let out_type = self.type_of(result_type)?;
        let expr = if out_type.basetype != input && out_type.basetype != BaseType::Boolean {
            expected.basetype = input;
            let cast = self.bitcast_glsl_op(&out_type, &expected)?;
            format!("{cast}({func}({a}, {b}))")
        } else {
            format!("{func}({a}, {b})")
        };
        let forward = self.forward_all(&[op0, op1])?;
        self.emit_op(result_type, id, &expr, forward, false)
    }

    /// `func(a, b, c)`.
    pub fn emit_trinary_func_op(
        &mut self,
        result_type: Id,
        id: Id,
        ops: [Id; 3],
        func: &str,
    ) -> Result<(), BackendError> {
        self.emit_func_op(result_type, id, &ops, func)
    }

    /// `func(a, b, c, d)`.
    pub fn emit_quaternary_func_op(
        &mut self,
        result_type: Id,
        id: Id,
        ops: [Id; 4],
        func: &str,
    ) -> Result<(), BackendError> {
        self.emit_func_op(result_type, id, &ops, func)
    }

    /// A call with any number of value operands.
    pub fn emit_func_op(&mut self, result_type: Id, id: Id, ops: &[Id], func: &str) -> Result<(), BackendError> {
        let forward = self.forward_all(ops)?;
        let mut args = Vec::with_capacity(ops.len());
        for &op in ops {
            args.push(self.to_expression(op)?);
        }
        let rhs = format!("{func}({})", args.join(", "));
        self.emit_op(result_type, id, &rhs, forward, false)?;
        if self.will_forward(id, forward) {
            self.inherit_all(id, ops)?;
        }
        Ok(())
    }

    /// `OpSelect` and `FMix`: a cast from bool, a ternary when the target
    /// lacks boolean `mix`, or `mix`.
    pub fn emit_mix_op(
        &mut self,
        result_type: Id,
        id: Id,
        left: Id,
        right: Id,
        lerp: Id,
    ) -> Result<(), BackendError> {
        let lerp_type = self.expression_type(lerp)?;
        let res_type = self.type_of(result_type)?;
        let has_boolean_mix = self.traits.boolean_mix_support
            && ((self.es && self.version >= 310) || (!self.es && self.version >= 450));

        if let Some(ctor) = self.to_trivial_mix_op(&res_type, left, right, lerp)? {
            return self.emit_unary_func_op(result_type, id, lerp, &ctor);
        }

        if !has_boolean_mix && lerp_type.basetype == BaseType::Boolean {
            let expr = if lerp_type.vecsize == 1 {
                format!(
                    "{} ? {} : {}",
                    self.to_enclosed_expression(lerp)?,
                    self.to_enclosed_expression(right)?,
                    self.to_enclosed_expression(left)?
                )
            } else {
                let mut lanes = Vec::with_capacity(res_type.vecsize as usize);
                for i in 0..res_type.vecsize {
                    let swizzle = index_to_swizzle(i)?;
                    lanes.push(format!(
                        "{}.{swizzle} ? {}.{swizzle} : {}.{swizzle}",
                        self.to_enclosed_expression(lerp)?,
                        self.to_enclosed_expression(right)?,
                        self.to_enclosed_expression(left)?
                    ));
                }
                format!("{}({})", self.type_to_glsl_constructor(&res_type)?, lanes.join(", "))
            };
            let forward = self.forward_all(&[left, right, lerp])?;
            self.emit_op(result_type, id, &expr, forward, false)?;
            if self.will_forward(id, forward) {
                self.inherit_all(id, &[left, right, lerp])?;
            }
            return Ok(());
        }

        self.emit_trinary_func_op(result_type, id, [left, right, lerp], "mix")
    }

    /// The value of a constant lane, by ID, as a `u32`.
    pub fn constant_u32(&self, id: Id) -> Result<u32, BackendError> {
        Ok(self.module.get::<Constant>(id)?.scalar(0, 0))
    }
}

/// Parenthesizes `expr` unless it is a single term.
pub fn enclose_expression(expr: String) -> String {
    let mut depth = 0u32;
    let mut need_parens = false;
    for c in expr.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ' ' if depth == 0 => {
                need_parens = true;
                break;
            }
            _ => {}
        }
    }
    if need_parens { format!("({expr})") } else { expr }
}

#[cfg(test)]
mod tests {
    use spirv::StorageClass;
    use spvx_ir::Module;

    use super::*;
    use crate::emit::testing::{pointer, scalar, variable, with_emitter};

    fn float_module() -> (Module, Id) {
        let mut module = Module::with_bound(32);
        let f = scalar(&mut module, 1, BaseType::Float);
        (module, f)
    }

    #[test]
    fn enclosing_only_adds_parens_for_top_level_spaces() {
        assert_eq!(enclose_expression("a".into()), "a");
        assert_eq!(enclose_expression("f(a, b)".into()), "f(a, b)");
        assert_eq!(enclose_expression("a + b".into()), "(a + b)");
        assert_eq!(enclose_expression("v[i + 1]".into()), "v[i + 1]");
    }

    #[test]
    fn forwarded_expression_is_substituted() {
        let (mut module, f) = float_module();
        module
            .set(Id::new(2), Expression::new(Id::new(2), "a".into(), f, true))
            .unwrap();
        module
            .set(Id::new(3), Expression::new(Id::new(3), "b".into(), f, true))
            .unwrap();
        with_emitter(module, |em| {
            em.emit_binary_op(f, Id::new(4), Id::new(2), Id::new(3), "+").unwrap();
            em.emit_unary_op(f, Id::new(5), Id::new(4), "-").unwrap();
            assert_eq!(em.to_expression(Id::new(5)).unwrap(), "-(a + b)");
            assert!(!em.recompile_requested());
        });
    }

    #[test]
    fn second_read_forces_a_temporary() {
        let (mut module, f) = float_module();
        module
            .set(Id::new(2), Expression::new(Id::new(2), "a".into(), f, true))
            .unwrap();
        with_emitter(module, |em| {
            em.emit_unary_func_op(f, Id::new(3), Id::new(2), "sqrt").unwrap();
            em.to_expression(Id::new(3)).unwrap();
            assert!(!em.recompile_requested());
            em.to_expression(Id::new(3)).unwrap();
            assert!(em.recompile_requested());
            assert!(em.legal.forced_temporaries.contains(&Id::new(3)));
        });
    }

    #[test]
    fn forced_temporary_is_declared() {
        let (mut module, f) = float_module();
        module
            .set(Id::new(2), Expression::new(Id::new(2), "a".into(), f, true))
            .unwrap();
        module.set_name(Id::new(3), "len");
        with_emitter(module, |em| {
            em.legal.forced_temporaries.insert(Id::new(3));
            em.emit_unary_func_op(f, Id::new(3), Id::new(2), "sqrt").unwrap();
            assert_eq!(crate::emit::testing::output(em), "float len = sqrt(a);\n");
            assert_eq!(em.to_expression(Id::new(3)).unwrap(), "len");
        });
    }

    #[test]
    fn store_invalidates_forwarded_load() {
        let (mut module, f) = float_module();
        let ptr = pointer(&mut module, 2, f, StorageClass::Function);
        let var = variable(&mut module, 3, ptr, StorageClass::Function, "x");
        with_emitter(module, |em| {
            let load = Id::new(4);
            em.emit_op(f, load, "x", true, false).unwrap();
            em.register_read(load, var, true).unwrap();
            em.register_write(var).unwrap();
            assert!(em.invalid_expressions.contains(&load));
            em.to_expression(load).unwrap();
            assert!(em.recompile_requested());
            assert!(em.legal.forced_temporaries.contains(&load));
        });
    }

    #[test]
    fn bool_select_without_mix_becomes_ternary() {
        let mut module = Module::with_bound(32);
        let f = scalar(&mut module, 1, BaseType::Float);
        let b = scalar(&mut module, 2, BaseType::Boolean);
        for (raw, text, ty) in [(3, "a", f), (4, "b", f), (5, "c", b)] {
            module
                .set(Id::new(raw), Expression::new(Id::new(raw), text.into(), ty, true))
                .unwrap();
        }
        with_emitter(module, |em| {
            em.version = 330;
            em.emit_mix_op(f, Id::new(6), Id::new(3), Id::new(4), Id::new(5)).unwrap();
            assert_eq!(em.to_expression(Id::new(6)).unwrap(), "c ? b : a");
        });
    }
}
