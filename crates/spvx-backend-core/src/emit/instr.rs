//! Per-opcode lowering of block instructions.

use std::collections::HashSet;

use log::warn;
use spirv::{Decoration, Dim, ExecutionModel, ImageOperands, MemorySemantics, Op, StorageClass};
use spvx_ir::{BaseType, Block, Expression, Function, Id, Instruction, Variable};

use super::access::index_to_swizzle;
use super::constant::opcode_is_sign_invariant;
use super::{Dialect, Emitter};
use crate::BackendError;

/// Operand words of one instruction with checked access.
#[derive(Clone, Copy)]
pub struct Operands<'i> {
    /// The decoded opcode.
    pub op: Op,
    /// Operand words, without the instruction header.
    pub words: &'i [u32],
}

impl<'i> Operands<'i> {
    /// Wraps `inst`, failing on an opcode `spirv` does not know.
    pub fn new(inst: &'i Instruction) -> Result<Self, BackendError> {
        let op = inst
            .op()
            .ok_or_else(|| BackendError::Malformed(format!("unknown opcode {}", inst.opcode)))?;
        Ok(Self { op, words: &inst.words })
    }

    /// Operand `index`, or a malformed-module error.
    pub fn word(&self, index: usize) -> Result<u32, BackendError> {
        self.words.get(index).copied().ok_or_else(|| {
            BackendError::Malformed(format!("{:?} is missing operand {index}", self.op))
        })
    }

    /// Operand `index` as an id.
    pub fn id(&self, index: usize) -> Result<Id, BackendError> {
        self.word(index).map(Id::new)
    }

    /// Operands from `index` on.
    pub fn rest(&self, index: usize) -> &'i [u32] {
        self.words.get(index..).unwrap_or(&[])
    }

    /// Operands from `index` on, as ids.
    pub fn ids_from(&self, index: usize) -> Vec<Id> {
        self.rest(index).iter().map(|&w| Id::new(w)).collect()
    }
}

impl<D: Dialect> Emitter<'_, D> {
    /// Lowers `inst` through the dialect.
    pub fn emit_instruction(&mut self, inst: &Instruction) -> Result<(), BackendError> {
        D::emit_instruction(self, inst)
    }

    /// Lowers one instruction; unknown opcodes leave a comment behind.
    pub fn default_emit_instruction(&mut self, inst: &Instruction) -> Result<(), BackendError> {
        let Some(op) = inst.op() else {
            warn!("unimplemented opcode {}", inst.opcode);
            self.statement(&format!("// unimplemented op {}", inst.opcode));
            return Ok(());
        };
        let ops = Operands::new(inst)?;

        match op {
            Op::Load => self.emit_load(ops)?,
            Op::AccessChain | Op::InBoundsAccessChain => {
                let base = ops.id(2)?;
                if self.module.maybe_get::<Variable>(base).is_some() {
                    self.flush_variable_declaration(base)?;
                }
                let chain = self.access_chain(base, ops.rest(3), false, false)?;
                let immutable = self.should_forward(base)?;
                let (result_type, id) = (ops.id(0)?, ops.id(1)?);
                let loaded_from = self.module.maybe_get_backing_variable(base).or(Some(base));
                let expr = self.module.set(id, Expression::new(id, chain, result_type, immutable))?;
                expr.loaded_from = loaded_from;
            }
            Op::Store => self.emit_store(ops.id(0)?, ops.id(1)?)?,
            Op::ArrayLength => {
                let chain = self.access_chain(ops.id(2)?, ops.rest(3), true, false)?;
                let (result_type, id) = (ops.id(0)?, ops.id(1)?);
                self.module
                    .set(id, Expression::new(id, format!("{chain}.length()"), result_type, true))?;
            }
            Op::FunctionCall => self.emit_function_call(ops)?,

            Op::CompositeConstruct => self.emit_composite_construct(ops)?,
            Op::VectorInsertDynamic => {
                let (result_type, id, vec, comp, index) =
                    (ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?, ops.word(4)?);
                self.flush_variable_declaration(vec)?;
                let decl = self.declare_temporary(result_type, id)?;
                let value = self.to_expression(vec)?;
                self.statement(&format!("{decl}{value};"));
                let name = self.to_name(id);
                self.module.set(id, Expression::new(id, name, result_type, true))?;
                let chain = self.access_chain(id, &[index], false, false)?;
                let comp = self.to_expression(comp)?;
                self.statement(&format!("{chain} = {comp};"));
            }
            Op::VectorExtractDynamic => {
                let base = ops.id(2)?;
                let chain = self.access_chain(base, &[ops.word(3)?], false, false)?;
                let forward = self.should_forward(base)?;
                self.emit_op(ops.id(0)?, ops.id(1)?, &chain, forward, false)?;
            }
            Op::CompositeExtract => self.emit_composite_extract(ops)?,
            Op::CompositeInsert => self.emit_composite_insert(ops)?,
            Op::CopyMemory => {
                let (lhs, rhs) = (ops.id(0)?, ops.id(1)?);
                if lhs != rhs {
                    self.flush_variable_declaration(lhs)?;
                    self.flush_variable_declaration(rhs)?;
                    let (l, r) = (self.to_expression(lhs)?, self.to_expression(rhs)?);
                    self.statement(&format!("{l} = {r};"));
                    self.register_write(lhs)?;
                }
            }
            Op::CopyObject => {
                let (result_type, id, rhs) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
                let pointer = self.type_of(result_type)?.pointer;
                if self.module.expression_is_lvalue(rhs)? && !pointer {
                    let decl = self.declare_temporary(result_type, id)?;
                    let value = self.to_expression(rhs)?;
                    self.statement(&format!("{decl}{value};"));
                    let name = self.to_name(id);
                    self.module.set(id, Expression::new(id, name, result_type, true))?;
                } else {
                    let value = self.to_expression(rhs)?;
                    let loaded_from = self.module.maybe_get_backing_variable(rhs);
                    let expr = self.module.set(id, Expression::new(id, value, result_type, true))?;
                    if pointer {
                        expr.loaded_from = loaded_from;
                    }
                }
            }
            Op::VectorShuffle => self.emit_vector_shuffle(ops)?,

            Op::IsNan => self.ufop(ops, "isnan")?,
            Op::IsInf => self.ufop(ops, "isinf")?,
            Op::SNegate | Op::FNegate => self.uop(ops, "-")?,
            Op::IAdd => self.bop_cast_result(ops, "+")?,
            Op::FAdd => self.bop(ops, "+")?,
            Op::ISub => self.bop_cast_result(ops, "-")?,
            Op::FSub => self.bop(ops, "-")?,
            Op::IMul => self.bop_cast_result(ops, "*")?,
            Op::FMul
            | Op::MatrixTimesVector
            | Op::MatrixTimesScalar
            | Op::VectorTimesScalar
            | Op::VectorTimesMatrix
            | Op::MatrixTimesMatrix => self.bop(ops, "*")?,
            Op::OuterProduct => self.bfop(ops, "outerProduct")?,
            Op::Dot => self.bfop(ops, "dot")?,
            Op::Transpose => self.ufop(ops, "transpose")?,
            Op::SDiv => self.bop_cast(ops, "/", BaseType::Int)?,
            Op::UDiv => self.bop_cast(ops, "/", BaseType::UInt)?,
            Op::FDiv => self.bop(ops, "/")?,
            Op::ShiftRightLogical => self.bop_cast(ops, ">>", BaseType::UInt)?,
            Op::ShiftRightArithmetic => self.bop_cast(ops, ">>", BaseType::Int)?,
            Op::ShiftLeftLogical => self.bop_cast_result(ops, "<<")?,
            Op::BitwiseOr => self.bop_cast_result(ops, "|")?,
            Op::BitwiseXor => self.bop_cast_result(ops, "^")?,
            Op::BitwiseAnd => self.bop_cast_result(ops, "&")?,
            Op::Not => self.uop(ops, "~")?,
            Op::UMod => self.bop_cast(ops, "%", BaseType::UInt)?,
            Op::SMod => self.bop_cast(ops, "%", BaseType::Int)?,
            Op::FMod => self.bfop(ops, "mod")?,

            Op::Any => self.ufop(ops, "any")?,
            Op::All => self.ufop(ops, "all")?,
            Op::Select => self.emit_mix_op(ops.id(0)?, ops.id(1)?, ops.id(4)?, ops.id(3)?, ops.id(2)?)?,
            Op::LogicalOr => self.bop(ops, "||")?,
            Op::LogicalAnd => self.bop(ops, "&&")?,
            Op::LogicalNot => self.uop(ops, "!")?,
            Op::IEqual => self.compare(ops, "==", "equal", Some(BaseType::Int))?,
            Op::LogicalEqual | Op::FOrdEqual => self.compare(ops, "==", "equal", None)?,
            Op::INotEqual => self.compare(ops, "!=", "notEqual", Some(BaseType::Int))?,
            Op::LogicalNotEqual | Op::FOrdNotEqual => self.compare(ops, "!=", "notEqual", None)?,
            Op::UGreaterThan => self.compare(ops, ">", "greaterThan", Some(BaseType::UInt))?,
            Op::SGreaterThan => self.compare(ops, ">", "greaterThan", Some(BaseType::Int))?,
            Op::FOrdGreaterThan => self.compare(ops, ">", "greaterThan", None)?,
            Op::UGreaterThanEqual => self.compare(ops, ">=", "greaterThanEqual", Some(BaseType::UInt))?,
            Op::SGreaterThanEqual => self.compare(ops, ">=", "greaterThanEqual", Some(BaseType::Int))?,
            Op::FOrdGreaterThanEqual => self.compare(ops, ">=", "greaterThanEqual", None)?,
            Op::ULessThan => self.compare(ops, "<", "lessThan", Some(BaseType::UInt))?,
            Op::SLessThan => self.compare(ops, "<", "lessThan", Some(BaseType::Int))?,
            Op::FOrdLessThan => self.compare(ops, "<", "lessThan", None)?,
            Op::ULessThanEqual => self.compare(ops, "<=", "lessThanEqual", Some(BaseType::UInt))?,
            Op::SLessThanEqual => self.compare(ops, "<=", "lessThanEqual", Some(BaseType::Int))?,
            Op::FOrdLessThanEqual => self.compare(ops, "<=", "lessThanEqual", None)?,

            Op::ConvertFToU
            | Op::ConvertFToS
            | Op::ConvertSToF
            | Op::ConvertUToF
            | Op::UConvert
            | Op::SConvert
            | Op::FConvert => {
                let result_type = ops.id(0)?;
                let ty = self.type_of(result_type)?;
                let ctor = self.type_to_glsl_constructor(&ty)?;
                self.emit_unary_func_op(result_type, ops.id(1)?, ops.id(2)?, &ctor)?;
            }
            Op::Bitcast => {
                let (result_type, arg) = (ops.id(0)?, ops.id(2)?);
                let out = self.type_of(result_type)?;
                let input = self.expression_type(arg)?;
                let func = self.bitcast_glsl_op(&out, &input)?;
                self.emit_unary_func_op(result_type, ops.id(1)?, arg, &func)?;
            }
            Op::QuantizeToF16 => self.emit_quantize_f16(ops)?,

            Op::DPdx => self.derivative(ops, "dFdx")?,
            Op::DPdy => self.derivative(ops, "dFdy")?,
            Op::Fwidth => self.derivative(ops, "fwidth")?,

            Op::BitFieldInsert => {
                let args = [ops.id(2)?, ops.id(3)?, ops.id(4)?, ops.id(5)?];
                self.emit_quaternary_func_op(ops.id(0)?, ops.id(1)?, args, "bitfieldInsert")?;
            }
            Op::BitFieldSExtract | Op::BitFieldUExtract => {
                let args = [ops.id(2)?, ops.id(3)?, ops.id(4)?];
                self.emit_trinary_func_op(ops.id(0)?, ops.id(1)?, args, "bitfieldExtract")?;
            }
            Op::BitReverse => self.ufop(ops, "bitfieldReverse")?,
            Op::BitCount => self.ufop(ops, "bitCount")?,

            Op::AtomicExchange
            | Op::AtomicCompareExchange
            | Op::AtomicLoad
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
            | Op::AtomicXor => self.emit_atomic(ops)?,

            Op::EmitVertex => self.statement("EmitVertex();"),
            Op::EndPrimitive => self.statement("EndPrimitive();"),
            Op::EmitStreamVertex => self.statement("EmitStreamVertex();"),
            Op::EndStreamPrimitive => self.statement("EndStreamPrimitive();"),

            Op::ImageSampleExplicitLod
            | Op::ImageSampleProjExplicitLod
            | Op::ImageSampleDrefExplicitLod
            | Op::ImageSampleProjDrefExplicitLod
            | Op::ImageSampleImplicitLod
            | Op::ImageSampleProjImplicitLod
            | Op::ImageSampleDrefImplicitLod
            | Op::ImageSampleProjDrefImplicitLod
            | Op::ImageFetch
            | Op::ImageGather
            | Op::ImageDrefGather => D::emit_texture_op(self, inst)?,

            Op::Image => {
                let (result_type, id, image) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
                let expr = self.to_expression(image)?;
                self.emit_op(result_type, id, &expr, true, false)?;
                let loaded_from = self.module.maybe_get_backing_variable(image);
                self.module.get_mut::<Expression>(id)?.loaded_from = loaded_from;
            }
            Op::ImageQueryLod => {
                if self.es {
                    return Err(BackendError::Unsupported(
                        "textureQueryLod is not available in ES profiles".into(),
                    ));
                }
                if self.version < 400 {
                    self.require_extension("GL_ARB_texture_query_lod");
                    self.bfop(ops, "textureQueryLOD")?;
                } else {
                    self.bfop(ops, "textureQueryLod")?;
                }
            }
            Op::ImageQueryLevels => {
                if self.es {
                    return Err(BackendError::Unsupported(
                        "textureQueryLevels is not available in ES profiles".into(),
                    ));
                }
                if self.version < 430 {
                    self.require_extension("GL_ARB_texture_query_levels");
                }
                self.ufop(ops, "textureQueryLevels")?;
            }
            Op::ImageQuerySamples => {
                let image = ops.id(2)?;
                let var = self.module.maybe_get_backing_variable(image).ok_or_else(|| {
                    BackendError::Internal(format!("image {image} queried for samples has no backing variable"))
                })?;
                let basetype = self.module.get::<Variable>(var)?.basetype;
                let storage_image = self.type_of(basetype)?.image.sampled == 2;
                self.ufop(ops, if storage_image { "imageSamples" } else { "textureSamples" })?;
            }
            Op::SampledImage => {
                D::emit_sampled_image_op(self, ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?)?;
            }
            Op::ImageQuerySizeLod => self.bfop(ops, "textureSize")?,
            Op::ImageRead => self.emit_image_read(ops)?,
            Op::ImageTexelPointer => {
                let (result_type, id, image) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
                let text = format!("{}, {}", self.to_expression(image)?, self.to_expression(ops.id(3)?)?);
                let loaded_from = self.module.maybe_get_backing_variable(image);
                let expr = self.module.set(id, Expression::new(id, text, result_type, true))?;
                expr.loaded_from = loaded_from;
            }
            Op::ImageWrite => self.emit_image_write(ops)?,
            Op::ImageQuerySize => {
                let image = ops.id(2)?;
                if self.expression_type(image)?.basetype != BaseType::Image {
                    return Err(BackendError::Malformed(format!(
                        "OpImageQuerySize on {image}, which is not a storage image"
                    )));
                }
                let expr = format!("imageSize({})", self.to_expression(image)?);
                self.emit_op(ops.id(0)?, ops.id(1)?, &expr, true, false)?;
            }

            Op::ControlBarrier => {
                self.flush_all_active_variables()?;
                if self.execution_model()? == ExecutionModel::GLCompute {
                    let semantics = self.constant_u32(ops.id(2)?)?;
                    self.emit_memory_barrier(semantics)?;
                }
                self.statement("barrier();");
            }
            Op::MemoryBarrier => {
                let semantics = self.constant_u32(ops.id(1)?)?;
                if semantics != 0 {
                    self.flush_all_active_variables()?;
                }
                self.emit_memory_barrier(semantics)?;
            }

            Op::ExtInst => {
                self.module.get::<spvx_ir::ExtInstImport>(ops.id(2)?)?;
                let eop = ops.word(3)?;
                D::emit_glsl_op(self, ops.id(0)?, ops.id(1)?, eop, ops.rest(4))?;
            }

            Op::Nop | Op::Line | Op::NoLine => {}

            other => {
                warn!("unimplemented op {other:?} ({})", inst.opcode);
                self.statement(&format!("// unimplemented op {}", inst.opcode));
            }
        }
        Ok(())
    }

    fn emit_memory_barrier(&mut self, semantics: u32) -> Result<(), BackendError> {
        if semantics == MemorySemantics::WORKGROUP_MEMORY.bits() {
            self.statement("memoryBarrierShared();");
        } else if semantics != 0 {
            self.statement("memoryBarrier();");
        }
        Ok(())
    }

    // ---- operator shapes ----

    fn uop(&mut self, ops: Operands<'_>, op: &str) -> Result<(), BackendError> {
        self.emit_unary_op(ops.id(0)?, ops.id(1)?, ops.id(2)?, op)
    }

    fn ufop(&mut self, ops: Operands<'_>, func: &str) -> Result<(), BackendError> {
        self.emit_unary_func_op(ops.id(0)?, ops.id(1)?, ops.id(2)?, func)
    }

    fn bop(&mut self, ops: Operands<'_>, op: &str) -> Result<(), BackendError> {
        self.emit_binary_op(ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?, op)
    }

    fn bfop(&mut self, ops: Operands<'_>, func: &str) -> Result<(), BackendError> {
        self.emit_binary_func_op(ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?, func)
    }

    fn bop_cast(&mut self, ops: Operands<'_>, op: &str, input: BaseType) -> Result<(), BackendError> {
        let skip = opcode_is_sign_invariant(ops.op);
        self.emit_binary_op_cast(ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?, op, input, skip)
    }

    /// Sign-agnostic arithmetic takes the result's signedness, which
    /// avoids casting the result back.
    fn bop_cast_result(&mut self, ops: Operands<'_>, op: &str) -> Result<(), BackendError> {
        let input = self.type_of(ops.id(0)?)?.basetype;
        self.bop_cast(ops, op, input)
    }

    /// Scalar comparisons use operators, vector ones the builtin functions.
    fn compare(
        &mut self,
        ops: Operands<'_>,
        op: &str,
        func: &str,
        input: Option<BaseType>,
    ) -> Result<(), BackendError> {
        let vector = self.expression_type(ops.id(2)?)?.vecsize > 1;
        let skip = opcode_is_sign_invariant(ops.op);
        let (result_type, id, a, b) = (ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?);
        match (input, vector) {
            (Some(input), true) => self.emit_binary_func_op_cast(result_type, id, a, b, func, input, skip),
            (Some(input), false) => self.emit_binary_op_cast(result_type, id, a, b, op, input, skip),
            (None, true) => self.emit_binary_func_op(result_type, id, a, b, func),
            (None, false) => self.emit_binary_op(result_type, id, a, b, op),
        }
    }

    fn derivative(&mut self, ops: Operands<'_>, func: &str) -> Result<(), BackendError> {
        self.ufop(ops, func)?;
        if self.is_legacy_es() {
            self.require_extension("GL_OES_standard_derivatives");
        }
        Ok(())
    }

    // ---- memory ----

    fn emit_load(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, ptr) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
        self.flush_variable_declaration(ptr)?;

        let forward = self.should_forward(ptr)? && !self.legal.forced_temporaries.contains(&id);
        let mut expr = self.to_expression(ptr)?;
        if self.is_non_native_row_major_matrix(ptr)? {
            expr = self.convert_row_major_matrix(&expr);
        }

        // Reading the same loaded value twice costs nothing extra.
        self.emit_op(result_type, id, &expr, forward, true)?;
        self.register_read(id, ptr, forward)
    }

    /// Stores `value` through `ptr`, invalidating whatever read the old value.
    pub fn emit_store(&mut self, ptr: Id, value: Id) -> Result<(), BackendError> {
        if let Some(var) = self.module.maybe_get_mut::<Variable>(ptr) {
            if var.statically_assigned || (var.loop_variable && !var.loop_variable_enable) {
                var.static_expression = Some(value);
                return Ok(());
            }
        }

        let lhs = self.to_expression(ptr)?;
        let rhs = self.to_expression(value)?;
        // OpLoad, OpCompositeInsert, OpStore sequences can store a value onto itself.
        if lhs != rhs {
            if !self.optimize_read_modify_write(&lhs, &rhs) {
                self.statement(&format!("{lhs} = {rhs};"));
            }
            self.register_write(ptr)?;
        }
        Ok(())
    }

    // ---- calls ----

    fn emit_function_call(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, func_id) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
        let args = ops.ids_from(3);
        let callee = self.module.get::<Function>(func_id)?.clone();
        let pure = self.purity.function_is_pure(&self.module, func_id)?;

        let mut has_out_arguments = false;
        for (i, &arg) in args.iter().enumerate() {
            let writes = callee
                .arguments
                .get(i)
                .is_some_and(|p| p.write_count > 0 || self.legal.written_parameters.contains(&p.id));
            if writes {
                self.register_call_out_argument(arg)?;
                has_out_arguments = true;
            }
            self.flush_variable_declaration(arg)?;
        }
        if !pure {
            self.register_impure_function_call()?;
        }

        let mut arglist = Vec::with_capacity(args.len());
        for &arg in &args {
            if D::skip_argument(self, arg)? {
                continue;
            }
            arglist.push(D::to_func_call_arg(self, arg)?);
        }

        for combined in &callee.combined_parameters {
            let resolve = |global: bool, id: Id| -> Result<Id, BackendError> {
                if global {
                    return Ok(id);
                }
                args.get(id.index()).copied().ok_or_else(|| {
                    BackendError::Internal(format!(
                        "combined parameter of {func_id} refers to missing argument {}",
                        id.raw()
                    ))
                })
            };
            let image = resolve(combined.global_image, combined.image_id)?;
            let sampler = resolve(combined.global_sampler, combined.sampler_id)?;
            arglist.push(self.to_combined_image_sampler(image, sampler)?);
        }

        // Parameters appended for globals the callee reads are passed by name.
        for param in callee.arguments.iter().skip(args.len()) {
            arglist.push(D::to_func_call_arg(self, param.id)?);
        }

        self.check_function_call_constraints(&args)?;

        let call = format!("{}({})", self.to_name(func_id), arglist.join(", "));
        if self.type_of(result_type)?.basetype == BaseType::Void {
            self.statement(&format!("{call};"));
            return Ok(());
        }

        let forward = self.args_will_forward(id, &args, pure)? && !has_out_arguments && pure;
        self.emit_op(result_type, id, &call, forward, false)?;
        for &arg in &args {
            self.register_read(id, arg, forward)?;
        }
        if forward {
            let mut seen = HashSet::new();
            self.register_global_read_dependencies(func_id, id, &mut seen)?;
        }
        Ok(())
    }

    /// A forwarded call result depends on every global the callee loads.
    fn register_global_read_dependencies(
        &mut self,
        func: Id,
        id: Id,
        seen: &mut HashSet<Id>,
    ) -> Result<(), BackendError> {
        if !seen.insert(func) {
            return Ok(());
        }
        let blocks = self.module.get::<Function>(func)?.blocks.clone();
        for block in blocks {
            let insts = self.module.get::<Block>(block)?.ops.clone();
            for inst in &insts {
                let ops = Operands::new(inst)?;
                match ops.op {
                    Op::FunctionCall => {
                        self.register_global_read_dependencies(ops.id(2)?, id, seen)?;
                    }
                    Op::Load | Op::ImageRead => {
                        let Some(var) = self.module.maybe_get_backing_variable(ops.id(2)?) else {
                            continue;
                        };
                        let v = self.module.get::<Variable>(var)?;
                        if v.storage == StorageClass::Function {
                            continue;
                        }
                        let ty = self.type_of(v.basetype)?;
                        // Input attachments never change.
                        if ty.basetype != BaseType::Image && ty.image.dim != Dim::DimSubpassData {
                            self.module.get_mut::<Variable>(var)?.dependees.push(id);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn check_function_call_constraints(&self, args: &[Id]) -> Result<(), BackendError> {
        for &arg in args {
            let Some(var) = self.module.maybe_get::<Variable>(arg) else {
                continue;
            };
            if !var.remapped_variable {
                continue;
            }
            let ty = self.module.get::<spvx_ir::Type>(var.basetype)?;
            if ty.basetype == BaseType::Image && ty.image.dim == Dim::DimSubpassData {
                return Err(BackendError::Unsupported(
                    "a remapped subpass input cannot be passed to a function".into(),
                ));
            }
        }
        Ok(())
    }

    // ---- composites ----

    fn emit_composite_construct(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id) = (ops.id(0)?, ops.id(1)?);
        let elems = ops.ids_from(2);
        let Some(&first) = elems.first() else {
            return Err(BackendError::Malformed(format!(
                "OpCompositeConstruct {id} has no constituents"
            )));
        };

        let mut forward = true;
        for &elem in &elems {
            forward = forward && self.should_forward(elem)?;
        }

        let in_type = self.expression_type(first)?;
        let out_type = self.type_of(result_type)?;
        let composite = !out_type.array.is_empty() || out_type.basetype == BaseType::Struct;
        let splat = in_type.vecsize == 1
            && in_type.columns == 1
            && !composite
            && elems.iter().all(|&e| e == first);

        let inner = if splat {
            self.to_expression(first)?
        } else {
            self.build_composite_combiner(&elems)?
        };
        let expr = if self.traits.use_initializer_list && composite {
            format!("{{ {inner} }}")
        } else {
            format!("{}({inner})", self.type_to_glsl_constructor(&out_type)?)
        };
        self.emit_op(result_type, id, &expr, forward, false)
    }

    fn emit_composite_extract(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, base) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
        let indices = ops.rest(3);
        let ty = self.type_of(result_type)?;
        let allow_base_expression = !self.legal.forced_temporaries.contains(&id);
        let suppress = !self.expression_is_forwarded(base);

        if allow_base_expression
            && self.should_forward(base)?
            && ty.vecsize == 1
            && ty.columns == 1
            && indices.len() == 1
        {
            // Keeping the lane separate from its base lets a later
            // constructor merge lanes back into one swizzle.
            let chain = self.access_chain(base, indices, true, true)?;
            self.emit_op(result_type, id, &chain, true, suppress)?;
            self.module.get_mut::<Expression>(id)?.base_expression = Some(base);
        } else {
            let chain = self.access_chain(base, indices, true, false)?;
            let forward = self.should_forward(base)?;
            self.emit_op(result_type, id, &chain, forward, suppress)?;
        }
        Ok(())
    }

    fn emit_composite_insert(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, object, composite) = (ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?);
        let indices = ops.rest(4);
        self.flush_variable_declaration(composite)?;

        let used_while_invalidated = self.legal.forced_temporaries.contains(&id)
            || self
                .module
                .maybe_get::<Expression>(id)
                .is_some_and(|e| e.used_while_invalidated);

        if used_while_invalidated || !self.should_forward(composite)? {
            let decl = self.declare_temporary(result_type, id)?;
            let value = self.to_expression(composite)?;
            self.statement(&format!("{decl}{value};"));
            let name = self.to_name(id);
            self.module.set(id, Expression::new(id, name, result_type, true))?;
            let chain = self.access_chain(id, indices, true, false)?;
            let object = self.to_expression(object)?;
            self.statement(&format!("{chain} = {object};"));
        } else {
            let chain = self.access_chain(composite, indices, true, false)?;
            let object = self.to_expression(object)?;
            self.statement(&format!("{chain} = {object};"));
            let value = self.to_expression(composite)?;
            self.module.set(id, Expression::new(id, value, result_type, true))?;
            self.register_write(composite)?;
            self.register_read(id, composite, true)?;
            // The composite no longer holds its old value.
            self.invalid_expressions.insert(composite);
        }
        Ok(())
    }

    fn emit_vector_shuffle(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, vec0, vec1) = (ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?);
        let elems = ops.rest(4);
        let size0 = self.expression_type(vec0)?.vecsize;
        let shuffle = elems.iter().any(|&e| e >= size0);

        let (expr, trivial_forward) = if shuffle {
            let trivial = !self.expression_is_forwarded(vec0) && !self.expression_is_forwarded(vec1);
            let mut args = Vec::with_capacity(elems.len());
            for &e in elems {
                let (src, lane) = if e >= size0 { (vec1, e - size0) } else { (vec0, e) };
                args.push(format!("{}.{}", self.to_enclosed_expression(src)?, index_to_swizzle(lane)?));
            }
            let ty = self.type_of(result_type)?;
            (format!("{}({})", self.type_to_glsl_constructor(&ty)?, args.join(", ")), trivial)
        } else {
            let trivial = !self.expression_is_forwarded(vec0);
            let mut expr = format!("{}.", self.to_enclosed_expression(vec0)?);
            for &e in elems {
                expr.push_str(index_to_swizzle(e)?);
            }
            if self.traits.swizzle_is_function && elems.len() > 1 {
                expr.push_str("()");
            }
            (expr, trivial)
        };

        // A shuffle does no work of its own, so it keeps its inputs' forwarding.
        let forward = self.should_forward(vec0)? && self.should_forward(vec1)?;
        self.emit_op(result_type, id, &expr, forward, trivial_forward)
    }

    fn emit_quantize_f16(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, arg) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
        let value = self.to_expression(arg)?;
        let expr = match self.type_of(result_type)?.vecsize {
            1 => format!("unpackHalf2x16(packHalf2x16(vec2({value}))).x"),
            2 => format!("unpackHalf2x16(packHalf2x16({value}))"),
            3 => format!(
                "vec3(unpackHalf2x16(packHalf2x16({value}.xy)), unpackHalf2x16(packHalf2x16({value}.zz)).x)"
            ),
            4 => format!(
                "vec4(unpackHalf2x16(packHalf2x16({value}.xy)), unpackHalf2x16(packHalf2x16({value}.zw)))"
            ),
            n => {
                return Err(BackendError::Malformed(format!(
                    "OpQuantizeToF16 on a {n}-component vector"
                )));
            }
        };
        let forward = self.should_forward(arg)?;
        self.emit_op(result_type, id, &expr, forward, false)
    }

    // ---- atomics ----

    /// Storage-image atomics use the `imageAtomic*` family and lose any
    /// speculative `readonly`/`writeonly` qualifier.
    fn check_atomic_image(&mut self, ptr: Id) -> Result<bool, BackendError> {
        if self.expression_type(ptr)?.storage != StorageClass::Image {
            return Ok(false);
        }
        if self.es && self.version < 320 {
            self.require_extension("GL_OES_shader_image_atomic");
        }
        if let Some(var) = self.module.maybe_get_backing_variable(ptr) {
            self.clear_speculative_decoration(var, Decoration::NonWritable);
            self.clear_speculative_decoration(var, Decoration::NonReadable);
        }
        Ok(true)
    }

    /// Drops an access qualifier that turned out to be wrong and restarts.
    pub fn clear_speculative_decoration(&mut self, var: Id, decoration: Decoration) {
        if self.module.has_decoration(var, decoration) {
            self.module.unset_decoration(var, decoration);
            self.legal.cleared_decorations.insert((var, decoration as u32));
            self.force_recompile(format!("{decoration:?} removed from {var}"));
        }
    }

    fn emit_atomic(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, ptr) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
        // Atomic results are never re-evaluated.
        self.legal.forced_temporaries.insert(id);

        let image = |op: Op| -> (&'static str, &'static str) {
            match op {
                Op::AtomicExchange => ("imageAtomicExchange", "atomicExchange"),
                Op::AtomicCompareExchange => ("imageAtomicCompSwap", "atomicCompSwap"),
                Op::AtomicIAdd | Op::AtomicISub => ("imageAtomicAdd", "atomicAdd"),
                Op::AtomicSMin | Op::AtomicUMin => ("imageAtomicMin", "atomicMin"),
                Op::AtomicSMax | Op::AtomicUMax => ("imageAtomicMax", "atomicMax"),
                Op::AtomicAnd => ("imageAtomicAnd", "atomicAnd"),
                Op::AtomicOr => ("imageAtomicOr", "atomicOr"),
                _ => ("imageAtomicXor", "atomicXor"),
            }
        };

        match ops.op {
            Op::AtomicLoad | Op::AtomicIIncrement | Op::AtomicIDecrement => {
                let func = match ops.op {
                    Op::AtomicLoad => "atomicCounter",
                    Op::AtomicIIncrement => "atomicCounterIncrement",
                    _ => "atomicCounterDecrement",
                };
                if ops.op == Op::AtomicLoad {
                    self.flush_all_atomic_capable_variables()?;
                }
                self.emit_unary_func_op(result_type, id, ptr, func)?;
                if ops.op != Op::AtomicLoad {
                    self.flush_all_atomic_capable_variables()?;
                }
            }
            Op::AtomicCompareExchange => {
                let func = if self.check_atomic_image(ptr)? { image(ops.op).0 } else { image(ops.op).1 };
                let (value, comparator) = (ops.id(6)?, ops.id(7)?);
                self.emit_trinary_func_op(result_type, id, [ptr, comparator, value], func)?;
                self.flush_all_atomic_capable_variables()?;
                return Ok(());
            }
            Op::AtomicISub => {
                let func = if self.check_atomic_image(ptr)? { image(ops.op).0 } else { image(ops.op).1 };
                let value = ops.id(5)?;
                let expr = format!(
                    "{func}({}, -{})",
                    self.to_expression(ptr)?,
                    self.to_enclosed_expression(value)?
                );
                let forward = self.should_forward(ptr)? && self.should_forward(value)?;
                self.emit_op(result_type, id, &expr, forward, false)?;
                self.flush_all_atomic_capable_variables()?;
            }
            _ => {
                let func = if self.check_atomic_image(ptr)? { image(ops.op).0 } else { image(ops.op).1 };
                self.emit_binary_func_op(result_type, id, ptr, ops.id(5)?, func)?;
                self.flush_all_atomic_capable_variables()?;
                if ops.op == Op::AtomicExchange {
                    return Ok(());
                }
            }
        }
        let forward = self.should_forward(ptr)?;
        self.register_read(id, ptr, forward)
    }

    // ---- storage images ----

    /// Reads `components` lanes of `expr` as a value of `result_type`,
    /// repeating the last lane when the result is wider.
    pub fn remap_swizzle(&mut self, result_type: Id, components: u32, expr: Id) -> Result<String, BackendError> {
        let out = self.type_of(result_type)?;
        if out.vecsize == components {
            return self.to_expression(expr);
        }
        if components == 1 {
            return Ok(format!("{}({})", self.type_to_glsl(&out)?, self.to_expression(expr)?));
        }
        let mut e = format!("{}.", self.to_enclosed_expression(expr)?);
        for c in 0..out.vecsize {
            e.push_str(index_to_swizzle(c.min(components.saturating_sub(1)))?);
        }
        if self.traits.swizzle_is_function && out.vecsize > 1 {
            e.push_str("()");
        }
        Ok(e)
    }

    fn sample_operand(&self, ops: Operands<'_>, mask_index: usize, len: usize) -> Result<Id, BackendError> {
        let mask = ops.word(mask_index)?;
        if mask != ImageOperands::SAMPLE.bits() || ops.words.len() != len {
            return Err(BackendError::Unsupported(format!(
                "multisampled {:?} with image operands {mask:#x}",
                ops.op
            )));
        }
        ops.id(mask_index + 1)
    }

    fn emit_image_read(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (result_type, id, image) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
        let var = self.module.maybe_get_backing_variable(image);
        if let Some(var) = var {
            self.clear_speculative_decoration(var, Decoration::NonReadable);
        }

        let ty = self.expression_type(image)?;
        let remapped = var.and_then(|v| self.module.maybe_get::<Variable>(v)).filter(|v| v.remapped_variable);

        let (expr, pure) = if let Some(v) = remapped {
            if ty.image.ms {
                return Err(BackendError::Unsupported(
                    "a multisampled image cannot be remapped to a variable".into(),
                ));
            }
            let name = self.module.name(v.self_id).to_string();
            let remapped_components = v.remapped_components;
            let components = match self.options.pls_inputs.iter().find(|p| p.name == name) {
                Some(pls) => pls.format.components(),
                None if remapped_components == 0 => {
                    return Err(BackendError::Internal(format!(
                        "subpass input {name} was remapped without a component count"
                    )));
                }
                None => remapped_components,
            };
            (self.remap_swizzle(result_type, components, image)?, true)
        } else if ty.image.dim == Dim::DimSubpassData {
            let img = self.to_expression(image)?;
            let expr = match (self.options.vulkan_semantics, ty.image.ms) {
                (true, true) => {
                    let samples = self.sample_operand(ops, 4, 6)?;
                    format!("subpassLoad({img}, {})", self.to_expression(samples)?)
                }
                (true, false) => format!("subpassLoad({img})"),
                (false, true) => {
                    let samples = self.sample_operand(ops, 4, 6)?;
                    format!("texelFetch({img}, ivec2(gl_FragCoord.xy), {})", self.to_expression(samples)?)
                }
                (false, false) => format!("texelFetch({img}, ivec2(gl_FragCoord.xy), 0)"),
            };
            (expr, true)
        } else {
            let img = self.to_expression(image)?;
            let coord = self.to_expression(ops.id(3)?)?;
            let expr = if ty.image.ms {
                let samples = self.sample_operand(ops, 4, 6)?;
                format!("imageLoad({img}, {coord}, {})", self.to_expression(samples)?)
            } else {
                format!("imageLoad({img}, {coord})")
            };
            (expr, false)
        };

        let forwardable = var
            .and_then(|v| self.module.maybe_get::<Variable>(v))
            .is_some_and(|v| v.forwardable);
        if forwardable {
            self.emit_op(result_type, id, &expr, true, false)?;
            if !pure {
                if let Some(var) = var {
                    self.module.get_mut::<Expression>(id)?.loaded_from = Some(var);
                    self.module.get_mut::<Variable>(var)?.dependees.push(id);
                }
            }
        } else {
            self.emit_op(result_type, id, &expr, false, false)?;
        }
        Ok(())
    }

    fn emit_image_write(&mut self, ops: Operands<'_>) -> Result<(), BackendError> {
        let (image, coord, texel) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
        let var = self.module.maybe_get_backing_variable(image);
        if let Some(var) = var {
            self.clear_speculative_decoration(var, Decoration::NonWritable);
        }

        let img = self.to_expression(image)?;
        let coord = self.to_expression(coord)?;
        let texel = self.to_expression(texel)?;
        if self.expression_type(image)?.image.ms {
            let samples = self.sample_operand(ops, 3, 5)?;
            let samples = self.to_expression(samples)?;
            self.statement(&format!("imageStore({img}, {coord}, {samples}, {texel});"));
        } else {
            self.statement(&format!("imageStore({img}, {coord}, {texel});"));
        }

        if let Some(var) = var {
            let v = self.module.get::<Variable>(var)?;
            if self.module.variable_storage_is_aliased(v)? {
                self.flush_all_aliased_variables()?;
            }
        }
        Ok(())
    }
}
