//! Opcode traversal over a function and the functions it calls.

use std::collections::HashSet;

use spirv::Op;
use spvx_ir::{Block, Function, Id, IrError, Module};

/// A visitor driven by [`traverse_all_reachable_opcodes`].
///
/// Every callback returns `Ok(false)` to stop the walk early.
pub trait OpcodeHandler {
    /// Visits one instruction. `args` are the operand words after the opcode.
    fn handle(&mut self, module: &Module, op: Op, args: &[u32]) -> Result<bool, IrError>;

    /// Called before the instructions of `block` are visited.
    fn set_current_block(&mut self, _module: &Module, _block: &Block) -> Result<(), IrError> {
        Ok(())
    }

    /// Whether an `OpFunctionCall` to `callee` should be walked into.
    fn follow_function_call(&self, _callee: Id) -> bool {
        true
    }

    fn begin_function_scope(&mut self, _module: &Module, _args: &[u32]) -> Result<bool, IrError> {
        Ok(true)
    }

    fn end_function_scope(&mut self, _module: &Module, _args: &[u32]) -> Result<bool, IrError> {
        Ok(true)
    }
}

/// Walks every instruction of `func` in block order, descending into
/// called functions the handler wants to follow.
///
/// Returns `Ok(false)` if the handler stopped the walk.
pub fn traverse_all_reachable_opcodes(
    module: &Module,
    func: Id,
    handler: &mut impl OpcodeHandler,
) -> Result<bool, IrError> {
    let mut call_stack = HashSet::new();
    traverse_function(module, func, handler, &mut call_stack)
}

fn traverse_function(
    module: &Module,
    func: Id,
    handler: &mut impl OpcodeHandler,
    call_stack: &mut HashSet<Id>,
) -> Result<bool, IrError> {
    if !call_stack.insert(func) {
        return Err(IrError::Malformed(format!(
            "function {func} calls itself recursively"
        )));
    }

    let function = module.get::<Function>(func)?;
    for &block_id in &function.blocks {
        let block = module.get::<Block>(block_id)?;
        handler.set_current_block(module, block)?;

        for inst in &block.ops {
            let Some(op) = inst.op() else { continue };
            if !handler.handle(module, op, &inst.words)? {
                return Ok(false);
            }

            if op == Op::FunctionCall {
                let callee = call_target(inst.words.as_slice())?;
                if handler.follow_function_call(callee) {
                    if !handler.begin_function_scope(module, &inst.words)? {
                        return Ok(false);
                    }
                    if !traverse_function(module, callee, handler, call_stack)? {
                        return Ok(false);
                    }
                    if !handler.end_function_scope(module, &inst.words)? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    call_stack.remove(&func);
    Ok(true)
}

/// Returns the callee of an `OpFunctionCall` operand list.
pub fn call_target(args: &[u32]) -> Result<Id, IrError> {
    args.get(2)
        .map(|&w| Id::new(w))
        .ok_or_else(|| IrError::Malformed("OpFunctionCall without a callee".into()))
}

/// Returns the operand word at `index` as an ID, failing on short instructions.
pub fn arg_id(args: &[u32], index: usize, op: Op) -> Result<Id, IrError> {
    args.get(index)
        .map(|&w| Id::new(w))
        .ok_or_else(|| IrError::Malformed(format!("{op:?} is missing operand {index}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spvx_ir::Instruction;

    #[derive(Default)]
    struct Collect {
        ops: Vec<Op>,
        blocks: Vec<Id>,
        stop_at: Option<Op>,
    }

    impl OpcodeHandler for Collect {
        fn handle(&mut self, _: &Module, op: Op, _: &[u32]) -> Result<bool, IrError> {
            self.ops.push(op);
            Ok(self.stop_at != Some(op))
        }

        fn set_current_block(&mut self, _: &Module, block: &Block) -> Result<(), IrError> {
            self.blocks.push(block.self_id);
            Ok(())
        }
    }

    fn inst(op: Op, words: &[u32]) -> Instruction {
        Instruction {
            opcode: op as u32,
            words: words.to_vec(),
        }
    }

    /// Function 1 (block 2) calls function 3 (block 4).
    fn two_functions() -> Module {
        let mut module = Module::with_bound(8);
        let mut caller = Function::new(Id::new(1), Id::new(7), Id::new(7));
        caller.blocks.push(Id::new(2));
        module.set(Id::new(1), caller).unwrap();
        let mut callee = Function::new(Id::new(3), Id::new(7), Id::new(7));
        callee.blocks.push(Id::new(4));
        module.set(Id::new(3), callee).unwrap();

        let mut b2 = Block::new(Id::new(2));
        b2.ops.push(inst(Op::FunctionCall, &[7, 5, 3]));
        b2.ops.push(inst(Op::Nop, &[]));
        module.set(Id::new(2), b2).unwrap();
        let mut b4 = Block::new(Id::new(4));
        b4.ops.push(inst(Op::Kill, &[]));
        module.set(Id::new(4), b4).unwrap();
        module
    }

    #[test]
    fn walks_into_callees() {
        let module = two_functions();
        let mut handler = Collect::default();
        assert!(traverse_all_reachable_opcodes(&module, Id::new(1), &mut handler).unwrap());
        assert_eq!(handler.ops, vec![Op::FunctionCall, Op::Kill, Op::Nop]);
        assert_eq!(handler.blocks, vec![Id::new(2), Id::new(4)]);
    }

    #[test]
    fn handler_can_stop_the_walk() {
        let module = two_functions();
        let mut handler = Collect {
            stop_at: Some(Op::Kill),
            ..Collect::default()
        };
        assert!(!traverse_all_reachable_opcodes(&module, Id::new(1), &mut handler).unwrap());
        assert_eq!(handler.ops, vec![Op::FunctionCall, Op::Kill]);
    }

    #[test]
    fn recursion_is_malformed() {
        let mut module = two_functions();
        module
            .get_mut::<Block>(Id::new(4))
            .unwrap()
            .ops
            .push(inst(Op::FunctionCall, &[7, 6, 1]));
        let err = traverse_all_reachable_opcodes(&module, Id::new(1), &mut Collect::default())
            .unwrap_err();
        assert!(matches!(err, IrError::Malformed(_)));
    }
}
