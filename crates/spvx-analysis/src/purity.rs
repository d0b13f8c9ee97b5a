//! Side-effect analysis of blocks and functions.
//!
//! A pure block writes no memory outside function scope, touches no images
//! or atomics and emits no geometry or barriers. Emitters use this to decide
//! whether a loop body may be folded into a `for` header.

use std::collections::{HashMap, HashSet};

use spirv::{Op, StorageClass};
use spvx_ir::{Block, Function, Id, IrError, Module, Variable};

use crate::traverse::{arg_id, call_target};

/// Memoized purity of the functions of one module.
#[derive(Debug, Default)]
pub struct Purity {
    functions: HashMap<Id, bool>,
    in_progress: HashSet<Id>,
    /// Pointer results derived from another pointer, to that pointer.
    derived: HashMap<Id, Id>,
}

impl Purity {
    pub fn new(module: &Module) -> Self {
        let mut derived = HashMap::new();
        for (_, block) in module.ids.iter::<Block>() {
            for inst in &block.ops {
                let derives = matches!(
                    inst.op(),
                    Some(
                        Op::AccessChain
                            | Op::InBoundsAccessChain
                            | Op::PtrAccessChain
                            | Op::CopyObject
                    )
                );
                if let (true, Some(&result), Some(&base)) =
                    (derives, inst.words.get(1), inst.words.get(2))
                {
                    derived.insert(Id::new(result), Id::new(base));
                }
            }
        }
        Self {
            derived,
            ..Self::default()
        }
    }

    /// Storage class of the variable behind `ptr`, if it can be resolved.
    fn pointer_storage(&self, module: &Module, mut ptr: Id) -> Option<StorageClass> {
        // Bounded by the number of derived pointers, so cycles terminate.
        for _ in 0..=self.derived.len() {
            if let Some(var) = module.maybe_get::<Variable>(ptr) {
                return Some(var.storage);
            }
            ptr = *self.derived.get(&ptr)?;
        }
        None
    }

    pub fn function_is_pure(&mut self, module: &Module, func: Id) -> Result<bool, IrError> {
        if let Some(&pure) = self.functions.get(&func) {
            return Ok(pure);
        }
        // Recursion is rejected elsewhere; treat it as impure here.
        if !self.in_progress.insert(func) {
            return Ok(false);
        }

        let mut pure = true;
        for &block in &module.get::<Function>(func)?.blocks {
            if !self.block_is_pure(module, block)? {
                pure = false;
                break;
            }
        }

        self.in_progress.remove(&func);
        self.functions.insert(func, pure);
        Ok(pure)
    }

    pub fn block_is_pure(&mut self, module: &Module, block: Id) -> Result<bool, IrError> {
        let block = module.get::<Block>(block)?;
        for inst in &block.ops {
            let Some(op) = inst.op() else { continue };
            let args = inst.words.as_slice();
            let pure = match op {
                Op::FunctionCall => self.function_is_pure(module, call_target(args)?)?,
                Op::Store => {
                    self.pointer_storage(module, arg_id(args, 0, op)?)
                        == Some(StorageClass::Function)
                }
                Op::CopyMemory => {
                    self.pointer_storage(module, arg_id(args, 0, op)?)
                        == Some(StorageClass::Function)
                }
                Op::ImageWrite
                | Op::AtomicLoad
                | Op::AtomicStore
                | Op::AtomicExchange
                | Op::AtomicCompareExchange
                | Op::AtomicCompareExchangeWeak
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
                | Op::AtomicXor
                | Op::EmitVertex
                | Op::EndPrimitive
                | Op::EmitStreamVertex
                | Op::EndStreamPrimitive
                | Op::ControlBarrier
                | Op::MemoryBarrier => false,
                _ => true,
            };
            if !pure {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
