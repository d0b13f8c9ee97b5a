//! Lowering of `GLSL.std.450` extended instructions.

use log::warn;
use spirv::GLOp;
use spvx_ir::Id;

use super::{Dialect, Emitter};
use crate::BackendError;

/// How an extended instruction maps onto a builtin call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdCall {
    /// `f(a)`.
    Unary(&'static str),
    /// `f(a, b)`.
    Binary(&'static str),
    /// `f(a, b, c)`.
    Trinary(&'static str),
    /// Writes its second operand, so the result is never forwarded.
    BinaryOut(&'static str),
    /// `mix(a, b, t)`, with a boolean selector when it is one.
    Mix,
}

/// The GLSL builtin implementing `op`, if there is a direct one.
pub fn std450_call(op: GLOp) -> Option<StdCall> {
    use StdCall::*;
    let call = match op {
        GLOp::Round => Unary("round"),
        GLOp::RoundEven => Unary("roundEven"),
        GLOp::Trunc => Unary("trunc"),
        GLOp::SAbs | GLOp::FAbs => Unary("abs"),
        GLOp::SSign | GLOp::FSign => Unary("sign"),
        GLOp::Floor => Unary("floor"),
        GLOp::Ceil => Unary("ceil"),
        GLOp::Fract => Unary("fract"),
        GLOp::Radians => Unary("radians"),
        GLOp::Degrees => Unary("degrees"),
        GLOp::Fma => Trinary("fma"),
        GLOp::Modf => BinaryOut("modf"),

        GLOp::FMin | GLOp::UMin | GLOp::SMin => Binary("min"),
        GLOp::FMax | GLOp::UMax | GLOp::SMax => Binary("max"),
        GLOp::FClamp | GLOp::UClamp | GLOp::SClamp => Trinary("clamp"),

        GLOp::Sin => Unary("sin"),
        GLOp::Cos => Unary("cos"),
        GLOp::Tan => Unary("tan"),
        GLOp::Asin => Unary("asin"),
        GLOp::Acos => Unary("acos"),
        GLOp::Atan => Unary("atan"),
        GLOp::Sinh => Unary("sinh"),
        GLOp::Cosh => Unary("cosh"),
        GLOp::Tanh => Unary("tanh"),
        GLOp::Asinh => Unary("asinh"),
        GLOp::Acosh => Unary("acosh"),
        GLOp::Atanh => Unary("atanh"),
        GLOp::Atan2 => Binary("atan"),

        GLOp::Pow => Binary("pow"),
        GLOp::Exp => Unary("exp"),
        GLOp::Log => Unary("log"),
        GLOp::Exp2 => Unary("exp2"),
        GLOp::Log2 => Unary("log2"),
        GLOp::Sqrt => Unary("sqrt"),
        GLOp::InverseSqrt => Unary("inversesqrt"),

        GLOp::Determinant => Unary("determinant"),
        GLOp::MatrixInverse => Unary("inverse"),

        GLOp::FMix | GLOp::IMix => Mix,
        GLOp::Step => Binary("step"),
        GLOp::SmoothStep => Trinary("smoothstep"),

        GLOp::Frexp => BinaryOut("frexp"),
        GLOp::Ldexp => Binary("ldexp"),
        GLOp::PackSnorm4x8 => Unary("packSnorm4x8"),
        GLOp::PackUnorm4x8 => Unary("packUnorm4x8"),
        GLOp::PackSnorm2x16 => Unary("packSnorm2x16"),
        GLOp::PackUnorm2x16 => Unary("packUnorm2x16"),
        GLOp::PackHalf2x16 => Unary("packHalf2x16"),
        GLOp::UnpackSnorm4x8 => Unary("unpackSnorm4x8"),
        GLOp::UnpackUnorm4x8 => Unary("unpackUnorm4x8"),
        GLOp::UnpackSnorm2x16 => Unary("unpackSnorm2x16"),
        GLOp::UnpackUnorm2x16 => Unary("unpackUnorm2x16"),
        GLOp::UnpackHalf2x16 => Unary("unpackHalf2x16"),
        GLOp::PackDouble2x32 => Unary("packDouble2x32"),
        GLOp::UnpackDouble2x32 => Unary("unpackDouble2x32"),

        GLOp::Length => Unary("length"),
        GLOp::Distance => Binary("distance"),
        GLOp::Cross => Binary("cross"),
        GLOp::Normalize => Unary("normalize"),
        GLOp::FaceForward => Trinary("faceforward"),
        GLOp::Reflect => Binary("reflect"),
        GLOp::Refract => Trinary("refract"),

        GLOp::FindILsb => Unary("findLSB"),
        GLOp::FindSMsb | GLOp::FindUMsb => Unary("findMSB"),

        GLOp::InterpolateAtCentroid => Unary("interpolateAtCentroid"),
        GLOp::InterpolateAtSample => Binary("interpolateAtSample"),
        GLOp::InterpolateAtOffset => Binary("interpolateAtOffset"),
        _ => return None,
    };
    Some(call)
}

impl<D: Dialect> Emitter<'_, D> {
    /// Lowers a `GLSL.std.450` instruction to its builtin, or leaves a comment
    /// when there is none.
    pub fn default_emit_glsl_op(
        &mut self,
        result_type: Id,
        id: Id,
        eop: u32,
        args: &[u32],
    ) -> Result<(), BackendError> {
        let call = GLOp::from_u32(eop).and_then(std450_call);
        let Some(call) = call else {
            warn!("unimplemented GLSL.std.450 op {eop}");
            self.statement(&format!("// unimplemented GLSL op {eop}"));
            return Ok(());
        };

        if GLOp::from_u32(eop) == Some(GLOp::RoundEven) && self.is_legacy() {
            return Err(BackendError::Unsupported(
                "roundEven requires ESSL 300 or GLSL 130".into(),
            ));
        }

        let arg = |index: usize| -> Result<Id, BackendError> {
            args.get(index).map(|&w| Id::new(w)).ok_or_else(|| {
                BackendError::Malformed(format!("GLSL.std.450 op {eop} is missing operand {index}"))
            })
        };

        match call {
            StdCall::Unary(func) => self.emit_unary_func_op(result_type, id, arg(0)?, func),
            StdCall::Binary(func) => self.emit_binary_func_op(result_type, id, arg(0)?, arg(1)?, func),
            StdCall::Trinary(func) => {
                self.emit_trinary_func_op(result_type, id, [arg(0)?, arg(1)?, arg(2)?], func)
            }
            StdCall::BinaryOut(func) => {
                self.register_call_out_argument(arg(1)?)?;
                self.legal.forced_temporaries.insert(id);
                self.emit_binary_func_op(result_type, id, arg(0)?, arg(1)?, func)
            }
            StdCall::Mix => self.emit_mix_op(result_type, id, arg(0)?, arg(1)?, arg(2)?),
        }
    }
}
