//! Literal and specialization-constant expressions.

use spirv::Op;
use spvx_ir::{BaseType, Constant, ConstantOp, Id, Type};

use super::{Dialect, Emitter};
use crate::BackendError;

/// Spells a float literal so it always parses as floating point.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "(0.0 / 0.0)".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "(1.0 / 0.0)" } else { "(-1.0 / 0.0)" }.into();
    }
    let mut text = value.to_string();
    if !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }
    text
}

fn format_f32(value: f32) -> String {
    if value.is_finite() {
        // Shortest round-trip text of the single-precision value.
        let mut text = value.to_string();
        if !text.contains(['.', 'e', 'E']) {
            text.push_str(".0");
        }
        text
    } else {
        format_float(f64::from(value))
    }
}

impl<D: Dialect> Emitter<'_, D> {
    /// Spells `c` through the dialect.
    pub fn constant_expression(&mut self, c: &Constant) -> Result<String, BackendError> {
        D::constant_expression(self, c)
    }

    /// A constant referenced from another expression. Specialization
    /// constants are always referenced by name.
    pub fn constant_reference(&mut self, id: Id) -> Result<String, BackendError> {
        let c = self.module.get::<Constant>(id)?.clone();
        if c.specialization {
            Ok(self.to_name(id))
        } else {
            self.constant_expression(&c)
        }
    }

    /// Spells a scalar literal, vector, matrix or composite constructor.
    pub fn default_constant_expression(&mut self, c: &Constant) -> Result<String, BackendError> {
        let ty = self.type_of(c.constant_type)?;
        if !c.subconstants.is_empty() || ty.is_struct() || ty.is_array() {
            let mut res = if self.traits.use_initializer_list {
                "{ ".to_string()
            } else {
                format!("{}(", self.type_to_glsl_constructor(&ty)?)
            };
            let mut elems = Vec::with_capacity(c.subconstants.len());
            for &elem in &c.subconstants {
                elems.push(self.constant_reference(elem)?);
            }
            res.push_str(&elems.join(", "));
            res.push_str(if self.traits.use_initializer_list { " }" } else { ")" });
            return Ok(res);
        }

        if c.column_count <= 1 {
            return self.constant_expression_vector(c, 0);
        }

        let mut columns = Vec::with_capacity(c.column_count as usize);
        for col in 0..c.column_count as usize {
            match c.column_ids[col] {
                Some(id) => columns.push(self.to_expression(id)?),
                None => columns.push(self.constant_expression_vector(c, col)?),
            }
        }
        Ok(format!("{}({})", self.type_to_glsl(&ty)?, columns.join(", ")))
    }

    /// One column of a constant as a literal, a splat constructor, or a
    /// full constructor.
    pub fn constant_expression_vector(&mut self, c: &Constant, col: usize) -> Result<String, BackendError> {
        let mut ty: Type = self.type_of(c.constant_type)?;
        ty.columns = 1;
        let vector = c.columns[col];
        let size = vector.vecsize.max(1) as usize;

        let mut lanes = Vec::with_capacity(size);
        for row in 0..size {
            if let Some(id) = vector.ids[row] {
                lanes.push(self.to_expression(id)?);
                continue;
            }
            lanes.push(self.scalar_literal(&ty, c, col, row)?);
        }

        if size == 1 {
            return Ok(lanes.swap_remove(0));
        }
        let splat = vector.ids.iter().all(Option::is_none) && lanes.iter().all(|l| *l == lanes[0]);
        let ctor = self.type_to_glsl(&ty)?;
        if splat {
            Ok(format!("{ctor}({})", lanes[0]))
        } else {
            Ok(format!("{ctor}({})", lanes.join(", ")))
        }
    }

    fn scalar_literal(&self, ty: &Type, c: &Constant, col: usize, row: usize) -> Result<String, BackendError> {
        let t = &self.traits;
        let text = match ty.basetype {
            BaseType::Float => {
                let mut s = format_f32(c.scalar_f32(col, row));
                if t.float_literal_suffix && c.scalar_f32(col, row).is_finite() {
                    s.push('f');
                }
                s
            }
            BaseType::Double => {
                let mut s = format_float(c.scalar_f64(col, row));
                if t.double_literal_suffix && c.scalar_f64(col, row).is_finite() {
                    s.push_str("lf");
                }
                s
            }
            BaseType::Int64 => {
                let suffix = if t.long_long_literal_suffix { "ll" } else { "l" };
                format!("{}{suffix}", c.scalar_i64(col, row))
            }
            BaseType::UInt64 => {
                let suffix = if t.long_long_literal_suffix { "ull" } else { "ul" };
                format!("{}{suffix}", c.scalar_u64(col, row))
            }
            BaseType::UInt => {
                let suffix = if t.uint32_literal_suffix { "u" } else { "" };
                format!("{}{suffix}", c.scalar(col, row))
            }
            BaseType::Int => c.scalar_i32(col, row).to_string(),
            BaseType::Boolean => {
                if c.scalar(col, row) != 0 { "true" } else { "false" }.to_string()
            }
            other => {
                return Err(BackendError::Internal(format!(
                    "constant {} has non-scalar base type {other:?}",
                    c.self_id
                )));
            }
        };
        Ok(text)
    }

    /// Recognizes `select(b, 1, 0)`-style selects that are really a cast
    /// from bool, returning the constructor to cast with.
    pub fn to_trivial_mix_op(
        &mut self,
        ty: &Type,
        left: Id,
        right: Id,
        lerp: Id,
    ) -> Result<Option<String>, BackendError> {
        let (Some(cleft), Some(cright)) = (
            self.module.maybe_get::<Constant>(left),
            self.module.maybe_get::<Constant>(right),
        ) else {
            return Ok(None);
        };
        if cleft.specialization || cright.specialization {
            return Ok(None);
        }
        let lerp_type = self.module.expression_type(lerp)?;
        if lerp_type.basetype != BaseType::Boolean || lerp_type.vecsize > 1 {
            return Ok(None);
        }

        let trivial = match ty.basetype {
            BaseType::Int | BaseType::UInt => cleft.scalar(0, 0) == 0 && cright.scalar(0, 0) == 1,
            BaseType::Float => cleft.scalar_f32(0, 0) == 0.0 && cright.scalar_f32(0, 0) == 1.0,
            BaseType::Double => cleft.scalar_f64(0, 0) == 0.0 && cright.scalar_f64(0, 0) == 1.0,
            BaseType::Int64 | BaseType::UInt64 => {
                cleft.scalar_u64(0, 0) == 0 && cright.scalar_u64(0, 0) == 1
            }
            _ => false,
        };
        if trivial {
            Ok(Some(self.type_to_glsl_constructor(ty)?))
        } else {
            Ok(None)
        }
    }

    /// An `OpSpecConstantOp` spelled as an expression over its operands.
    pub fn constant_op_expression(&mut self, cop: &ConstantOp) -> Result<String, BackendError> {
        let ty = self.type_of(cop.basetype)?;
        let op = Op::from_u32(cop.opcode).ok_or_else(|| {
            BackendError::Malformed(format!("unknown opcode {} in OpSpecConstantOp", cop.opcode))
        })?;
        let arg = |i: usize| -> Result<Id, BackendError> {
            cop.arguments.get(i).map(|&w| Id::new(w)).ok_or_else(|| {
                BackendError::Malformed(format!("not enough arguments to OpSpecConstantOp {op:?}"))
            })
        };

        enum Shape {
            Unary(&'static str),
            Binary(&'static str),
            Call(String),
        }

        let shape = match op {
            Op::SConvert | Op::UConvert | Op::FConvert => Shape::Call(self.type_to_glsl_constructor(&ty)?),
            Op::SNegate => Shape::Unary("-"),
            Op::Not => Shape::Unary("~"),
            Op::LogicalNot => Shape::Unary("!"),
            Op::IAdd => Shape::Binary("+"),
            Op::ISub => Shape::Binary("-"),
            Op::IMul => Shape::Binary("*"),
            Op::SDiv | Op::UDiv => Shape::Binary("/"),
            Op::UMod | Op::SMod => Shape::Binary("%"),
            Op::ShiftRightLogical | Op::ShiftRightArithmetic => Shape::Binary(">>"),
            Op::ShiftLeftLogical => Shape::Binary("<<"),
            Op::BitwiseOr => Shape::Binary("|"),
            Op::BitwiseXor => Shape::Binary("^"),
            Op::BitwiseAnd => Shape::Binary("&"),
            Op::LogicalOr => Shape::Binary("||"),
            Op::LogicalAnd => Shape::Binary("&&"),
            Op::LogicalEqual | Op::IEqual => Shape::Binary("=="),
            Op::LogicalNotEqual | Op::INotEqual => Shape::Binary("!="),
            Op::ULessThan | Op::SLessThan => Shape::Binary("<"),
            Op::ULessThanEqual | Op::SLessThanEqual => Shape::Binary("<="),
            Op::UGreaterThan | Op::SGreaterThan => Shape::Binary(">"),
            Op::UGreaterThanEqual | Op::SGreaterThanEqual => Shape::Binary(">="),
            Op::Select => {
                let (cond, a, b) = (arg(0)?, arg(1)?, arg(2)?);
                match self.to_trivial_mix_op(&ty, b, a, cond)? {
                    Some(ctor) => Shape::Call(ctor),
                    None => {
                        return Err(BackendError::Unsupported(
                            "specialization constant OpSelect that is not a cast from bool".into(),
                        ));
                    }
                }
            }
            other => {
                return Err(BackendError::Unsupported(format!(
                    "specialization constant op {other:?}"
                )));
            }
        };

        let input_type = match op {
            Op::IEqual | Op::INotEqual => BaseType::Int,
            _ => ty.basetype,
        };

        match shape {
            Shape::Binary(symbol) => {
                let (a, b) = (arg(0)?, arg(1)?);
                let skip = opcode_is_sign_invariant(op);
                let (cast_a, cast_b, mut expected, input) =
                    self.binary_op_bitcast_helper(input_type, a, b, skip)?;
                if ty.basetype != input && ty.basetype != BaseType::Boolean {
                    expected.basetype = input;
                    let cast = self.bitcast_glsl_op(&ty, &expected)?;
                    Ok(format!("{cast}({cast_a} {symbol} {cast_b})"))
                } else {
                    Ok(format!("({cast_a} {symbol} {cast_b})"))
                }
            }
            Shape::Unary(symbol) => {
                let operand = self.bitcast_glsl(&ty, arg(0)?)?;
                Ok(format!("({symbol}{operand})"))
            }
            // Conversions take their operand first, and a trivial select
            // casts its condition, which is also first.
            Shape::Call(func) => Ok(format!("{func}({})", self.to_expression(arg(0)?)?)),
        }
    }
}

/// Opcodes whose result does not depend on operand signedness.
pub fn opcode_is_sign_invariant(op: Op) -> bool {
    matches!(
        op,
        Op::IEqual
            | Op::INotEqual
            | Op::ISub
            | Op::IAdd
            | Op::IMul
            | Op::ShiftLeftLogical
            | Op::BitwiseOr
            | Op::BitwiseXor
            | Op::BitwiseAnd
    )
}
