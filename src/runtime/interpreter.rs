//! Stack-machine interpreter
//!
//! Executes compiled bytecode one instruction at a time. All frames of one
//! invocation share a single operand [`Stack`]: a call leaves the arguments
//! in place, appends zeroed locals after them and records the base pointer.
//! Returning unwinds the stack to the base pointer keeping the results.
//!
//! Structured control flow is resolved with the position maps recorded when
//! the body was written. A branch to a `loop` jumps back to the `loop`
//! opcode, which pushes the loop's block frame again. A branch to anything
//! else jumps past the matching `end`.

use tracing::trace;

use super::control::{BlockFrame, BlockKind, BlockStack};
use super::decode::decode;
use super::instance::{Callee, Instance};
use super::ops;
use super::stack::Stack;
use super::{RuntimeError, Value};
use crate::encoding::CodeReader;
use crate::instr::{BlockType, Instr};
use crate::writer::Wasm;

/// Outcome of a single [`Interpreter::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More instructions remain.
    Continue,
    /// The outermost function returned.
    Exhausted,
}

/// One active call.
#[derive(Debug)]
struct InterpreterState<'i> {
    func: u32,
    body: &'i Wasm,
    ip: usize,
    /// Stack index of the first parameter.
    base: usize,
    /// Parameters plus declared locals.
    locals_len: usize,
    arity: usize,
    blocks: BlockStack,
}

fn no_frame() -> RuntimeError {
    RuntimeError::Trap("no active frame".to_string())
}

fn current<'a, 'i>(frames: &'a mut [InterpreterState<'i>]) -> Result<&'a mut InterpreterState<'i>, RuntimeError> {
    frames.last_mut().ok_or_else(no_frame)
}

pub struct Interpreter<'i> {
    instance: &'i Instance,
    stack: Stack,
    frames: Vec<InterpreterState<'i>>,
}

impl<'i> Interpreter<'i> {
    pub fn new(instance: &'i Instance) -> Self {
        Interpreter {
            instance,
            stack: Stack::new(),
            frames: Vec::new(),
        }
    }

    /// Calls function `func` with `args` and runs it to completion,
    /// returning whatever it leaves on the stack.
    pub fn invoke(&mut self, func: u32, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let height = self.stack.depth();
        self.stack.push_all(args.iter().copied());
        self.call(func)?;
        self.run()?;
        self.stack.pop_n(self.stack.depth() - height)
    }

    /// Steps until the outermost frame returns.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Exhausted) => return Ok(()),
                Err(err) => {
                    trace!(error = %err, depth = self.frames.len(), "trap");
                    return Err(err);
                }
            }
        }
    }

    /// Number of active frames.
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Calls function `func` with its arguments on top of the stack. A host
    /// function runs to completion; a compiled function gets a new frame
    /// and runs on subsequent steps.
    pub fn call(&mut self, func: u32) -> Result<(), RuntimeError> {
        let instance = self.instance;
        let ty = instance.func_type(func)?;
        trace!(func, depth = self.frames.len(), "call");
        match instance.callee(func)? {
            Callee::Host(host) => {
                let args = self.stack.pop_n(ty.params.len())?;
                let results = host.call(&args)?;
                for (value, result) in results.iter().zip(&ty.results) {
                    value.check(*result)?;
                }
                self.stack.push_all(results);
                Ok(())
            }
            Callee::Defined => {
                if self.frames.len() >= instance.config().max_call_depth {
                    return Err(RuntimeError::CallStackOverflow);
                }
                let compiled = instance
                    .module()
                    .compiled(func)
                    .ok_or(RuntimeError::FunctionIndexOutOfBounds(func))?;
                let base = self
                    .stack
                    .depth()
                    .checked_sub(ty.params.len())
                    .ok_or(RuntimeError::StackUnderflow)?;
                self.stack
                    .push_all(compiled.locals().iter().map(|ty| Value::default_for(*ty)));
                self.frames.push(InterpreterState {
                    func,
                    body: compiled.body(),
                    ip: 0,
                    base,
                    locals_len: ty.params.len() + compiled.locals().len(),
                    arity: ty.results.len(),
                    blocks: BlockStack::new(),
                });
                Ok(())
            }
        }
    }

    /// Executes one instruction of the innermost frame.
    pub fn step(&mut self) -> Result<Step, RuntimeError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(Step::Exhausted);
        };
        let body = frame.body;
        let start = frame.ip;
        let mut reader = CodeReader::at(body.code(), start);
        let instr = decode(&mut reader)?;
        frame.ip = reader.pos();
        self.execute(start, instr)
    }

    fn block_arity(&self, block_type: BlockType) -> Result<usize, RuntimeError> {
        Ok(match block_type {
            BlockType::Empty => 0,
            BlockType::Value(_) => 1,
            BlockType::Func(index) => self
                .instance
                .module()
                .types()
                .get(index)
                .map(|ty| ty.results.len())
                .ok_or_else(|| RuntimeError::Trap(format!("unknown block type {index}")))?,
        })
    }

    fn enter(&mut self, start: usize, kind: BlockKind, block_type: BlockType) -> Result<(), RuntimeError> {
        let arity = self.block_arity(block_type)?;
        let height = self.stack.depth();
        current(&mut self.frames)?.blocks.push(BlockFrame {
            start,
            kind,
            height,
            arity,
        });
        Ok(())
    }

    /// Branch to the `depth`-th enclosing construct; one past the outermost
    /// block is the function itself.
    fn branch(&mut self, depth: u32) -> Result<Step, RuntimeError> {
        if depth as usize == current(&mut self.frames)?.blocks.depth() {
            return self.ret();
        }
        let frame = current(&mut self.frames)?;
        let target = frame.blocks.unwind(depth).ok_or(RuntimeError::InvalidLabel(depth))?;
        self.stack.unwind(target.height, target.branch_arity())?;
        frame.ip = match target.kind {
            BlockKind::Loop => target.start,
            _ => {
                frame
                    .body
                    .end_position(target.start)
                    .ok_or(RuntimeError::MissingJumpTarget(target.start))?
                    + 1
            }
        };
        Ok(Step::Continue)
    }

    fn ret(&mut self) -> Result<Step, RuntimeError> {
        let frame = self.frames.pop().ok_or_else(no_frame)?;
        self.stack.unwind(frame.base, frame.arity)?;
        trace!(func = frame.func, "return");
        if self.frames.is_empty() {
            Ok(Step::Exhausted)
        } else {
            Ok(Step::Continue)
        }
    }

    fn local_index(&mut self, index: u32) -> Result<usize, RuntimeError> {
        let frame = current(&mut self.frames)?;
        if index as usize >= frame.locals_len {
            return Err(RuntimeError::LocalIndexOutOfBounds(index));
        }
        Ok(frame.base + index as usize)
    }

    fn call_indirect(&mut self, type_index: u32, table: u32) -> Result<(), RuntimeError> {
        let instance = self.instance;
        let slot = self.stack.pop_i32()? as u32;
        let func = instance
            .table_at(table)?
            .borrow()
            .get(slot)?
            .ok_or(RuntimeError::UndefinedElement(slot))?;
        let entry = instance
            .module()
            .function(func)
            .ok_or(RuntimeError::FunctionIndexOutOfBounds(func))?;
        if entry.type_index != type_index {
            let types = instance.module().types();
            let describe = |index: u32| {
                types
                    .get(index)
                    .map_or_else(|| format!("type {index}"), |ty| ty.to_string())
            };
            return Err(RuntimeError::IndirectCallTypeMismatch {
                expected: describe(type_index),
                actual: describe(entry.type_index),
            });
        }
        self.call(func)
    }

    fn execute(&mut self, start: usize, instr: Instr) -> Result<Step, RuntimeError> {
        let instance = self.instance;
        match instr {
            Instr::Unreachable => {
                return Err(RuntimeError::Trap("unreachable instruction executed".to_string()));
            }
            Instr::Nop => {}

            // Structured control
            Instr::Block(bt) => self.enter(start, BlockKind::Block, bt)?,
            Instr::Loop(bt) => self.enter(start, BlockKind::Loop, bt)?,
            Instr::If(bt) => {
                let cond = self.stack.pop_i32()?;
                self.enter(start, BlockKind::If, bt)?;
                if cond == 0 {
                    let frame = current(&mut self.frames)?;
                    // Skip to the else arm, or to the END which closes the block.
                    frame.ip = match frame.body.else_position(start) {
                        Some(else_pos) => else_pos + 1,
                        None => frame
                            .body
                            .end_position(start)
                            .ok_or(RuntimeError::MissingJumpTarget(start))?,
                    };
                }
            }
            Instr::Else => {
                // End of the then arm.
                let frame = current(&mut self.frames)?;
                let open = frame.blocks.get(0).ok_or(RuntimeError::MissingJumpTarget(start))?.start;
                frame.ip = frame
                    .body
                    .end_position(open)
                    .ok_or(RuntimeError::MissingJumpTarget(open))?;
            }
            Instr::End => {
                let frame = current(&mut self.frames)?;
                if frame.blocks.pop().is_none() {
                    return self.ret();
                }
            }
            Instr::Br(depth) => return self.branch(depth),
            Instr::BrIf(depth) => {
                if self.stack.pop_i32()? != 0 {
                    return self.branch(depth);
                }
            }
            Instr::BrTable(labels, default) => {
                let index = self.stack.pop_i32()? as u32;
                let depth = labels.get(index as usize).copied().unwrap_or(default);
                return self.branch(depth);
            }
            Instr::Return => return self.ret(),
            Instr::Call(func) => self.call(func)?,
            Instr::CallIndirect { type_index, table } => self.call_indirect(type_index, table)?,

            // Parametric
            Instr::Drop => {
                self.stack.pop()?;
            }
            Instr::Select | Instr::SelectTyped(_) => {
                let cond = self.stack.pop_i32()?;
                let otherwise = self.stack.pop()?;
                let then = self.stack.pop()?;
                self.stack.push(if cond != 0 { then } else { otherwise });
            }

            // Variables
            Instr::LocalGet(index) => {
                let slot = self.local_index(index)?;
                let value = self.stack.get(slot)?;
                self.stack.push(value);
            }
            Instr::LocalSet(index) => {
                let slot = self.local_index(index)?;
                let value = self.stack.pop()?;
                self.stack.set(slot, value)?;
            }
            Instr::LocalTee(index) => {
                let slot = self.local_index(index)?;
                let value = *self.stack.peek().ok_or(RuntimeError::StackUnderflow)?;
                self.stack.set(slot, value)?;
            }
            Instr::GlobalGet(index) => self.stack.push(instance.global_at(index)?.get()),
            Instr::GlobalSet(index) => {
                let value = self.stack.pop()?;
                instance.global_at(index)?.store(value);
            }

            // Memory
            Instr::Load(op, memarg) => {
                let memory = instance.memory_instance()?.borrow();
                ops::memory::load(&mut self.stack, &memory, op, &memarg)?;
            }
            Instr::Store(op, memarg) => {
                let mut memory = instance.memory_instance()?.borrow_mut();
                ops::memory::store(&mut self.stack, &mut memory, op, &memarg)?;
            }
            Instr::MemorySize => {
                let pages = instance.memory_instance()?.borrow().size();
                self.stack.push(Value::I32(pages as i32));
            }
            Instr::MemoryGrow => {
                let delta = self.stack.pop_i32()? as u32;
                let previous = instance.memory_instance()?.borrow_mut().grow(delta);
                self.stack.push(Value::I32(previous));
            }

            // Constants
            Instr::I32Const(v) => self.stack.push(Value::I32(v)),
            Instr::I64Const(v) => self.stack.push(Value::I64(v)),
            Instr::F32Const(v) => self.stack.push(Value::F32(v)),
            Instr::F64Const(v) => self.stack.push(Value::F64(v)),

            // References
            Instr::RefNull => self.stack.push(Value::FuncRef(None)),
            Instr::RefIsNull => {
                let func = self.stack.pop_func_ref()?;
                self.stack.push(Value::I32(func.is_none() as i32));
            }
            Instr::RefFunc(func) => self.stack.push(Value::FuncRef(Some(func))),

            Instr::Numeric(op) => ops::execute_numeric(&mut self.stack, op)?,
            Instr::Prefixed(sub) => ops::conversion::execute_prefixed(&mut self.stack, sub)?,
        }
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_utils::test::ExecutorTest;
    use crate::types::ValueType;

    #[test]
    fn test_block_value_flows_out() {
        ExecutorTest::new()
            .inst(Instr::Block(BlockType::Value(ValueType::I32)))
            .inst(Instr::I32Const(7))
            .inst(Instr::End)
            .returns(&[ValueType::I32])
            .expect_stack(vec![Value::I32(7)]);
    }

    #[test]
    fn test_br_unwinds_to_block_height() {
        // (block (result i32) i32.const 1 i32.const 2 br 0 i32.const 3) leaves 2
        ExecutorTest::new()
            .inst(Instr::Block(BlockType::Value(ValueType::I32)))
            .inst(Instr::I32Const(1))
            .inst(Instr::I32Const(2))
            .inst(Instr::Br(0))
            .inst(Instr::I32Const(3))
            .inst(Instr::End)
            .returns(&[ValueType::I32])
            .expect_stack(vec![Value::I32(2)]);
    }

    #[test]
    fn test_loop_counts_down() {
        // local0 = 5; loop: local1 += 1; local0 -= 1; br_if local0 != 0
        ExecutorTest::new()
            .local(ValueType::I32)
            .local(ValueType::I32)
            .inst(Instr::I32Const(5))
            .inst(Instr::LocalSet(0))
            .inst(Instr::Loop(BlockType::Empty))
            .inst(Instr::LocalGet(1))
            .inst(Instr::I32Const(1))
            .inst(Instr::Numeric(0x6A))
            .inst(Instr::LocalSet(1))
            .inst(Instr::LocalGet(0))
            .inst(Instr::I32Const(1))
            .inst(Instr::Numeric(0x6B))
            .inst(Instr::LocalTee(0))
            .inst(Instr::BrIf(0))
            .inst(Instr::End)
            .inst(Instr::LocalGet(1))
            .returns(&[ValueType::I32])
            .expect_stack(vec![Value::I32(5)]);
    }

    #[test]
    fn test_if_else_arms() {
        for (cond, expected) in [(1, 10), (0, 20)] {
            ExecutorTest::new()
                .inst(Instr::I32Const(cond))
                .inst(Instr::If(BlockType::Value(ValueType::I32)))
                .inst(Instr::I32Const(10))
                .inst(Instr::Else)
                .inst(Instr::I32Const(20))
                .inst(Instr::End)
                .returns(&[ValueType::I32])
                .expect_stack(vec![Value::I32(expected)]);
        }
    }

    #[test]
    fn test_if_without_else_skipped() {
        ExecutorTest::new()
            .inst(Instr::I32Const(4))
            .inst(Instr::I32Const(0))
            .inst(Instr::If(BlockType::Empty))
            .inst(Instr::Unreachable)
            .inst(Instr::End)
            .returns(&[ValueType::I32])
            .expect_stack(vec![Value::I32(4)]);
    }

    #[test]
    fn test_br_table_selects_depth() {
        // Three nested blocks; br_table picks how many to leave.
        for (index, expected) in [(0, 100), (1, 200), (7, 300)] {
            ExecutorTest::new()
                .inst(Instr::Block(BlockType::Empty))
                .inst(Instr::Block(BlockType::Empty))
                .inst(Instr::Block(BlockType::Empty))
                .inst(Instr::I32Const(index))
                .inst(Instr::BrTable(vec![0, 1], 2))
                .inst(Instr::End)
                .inst(Instr::I32Const(100))
                .inst(Instr::Return)
                .inst(Instr::End)
                .inst(Instr::I32Const(200))
                .inst(Instr::Return)
                .inst(Instr::End)
                .inst(Instr::I32Const(300))
                .returns(&[ValueType::I32])
                .expect_stack(vec![Value::I32(expected)]);
        }
    }

    #[test]
    fn test_br_to_function_level_returns() {
        ExecutorTest::new()
            .inst(Instr::Block(BlockType::Empty))
            .inst(Instr::I32Const(9))
            .inst(Instr::Br(1))
            .inst(Instr::End)
            .inst(Instr::I32Const(1))
            .returns(&[ValueType::I32])
            .expect_stack(vec![Value::I32(9)]);
    }

    #[test]
    fn test_select() {
        ExecutorTest::new()
            .inst(Instr::I64Const(1))
            .inst(Instr::I64Const(2))
            .inst(Instr::I32Const(0))
            .inst(Instr::Select)
            .returns(&[ValueType::I64])
            .expect_stack(vec![Value::I64(2)]);
    }

    #[test]
    fn test_typed_select() {
        ExecutorTest::new()
            .inst(Instr::RefFunc(0))
            .inst(Instr::RefNull)
            .inst(Instr::I32Const(1))
            .inst(Instr::SelectTyped(ValueType::FuncRef))
            .returns(&[ValueType::FuncRef])
            .expect_stack(vec![Value::FuncRef(Some(0))]);
    }

    #[test]
    fn test_unreachable_traps() {
        ExecutorTest::new()
            .inst(Instr::Unreachable)
            .expect_error("unreachable instruction executed");
    }

    #[test]
    fn test_division_by_zero_traps() {
        ExecutorTest::new()
            .inst(Instr::I32Const(1))
            .inst(Instr::I32Const(0))
            .inst(Instr::Numeric(0x6D))
            .returns(&[ValueType::I32])
            .expect_error("Division by zero");
    }

    #[test]
    fn test_memory_grow_and_size() {
        ExecutorTest::new()
            .with_memory()
            .inst(Instr::I32Const(2))
            .inst(Instr::MemoryGrow)
            .inst(Instr::Drop)
            .inst(Instr::MemorySize)
            .returns(&[ValueType::I32])
            .expect_stack(vec![Value::I32(3)]);
    }

    #[test]
    fn test_memory_requires_instance() {
        ExecutorTest::new()
            .inst(Instr::MemorySize)
            .returns(&[ValueType::I32])
            .expect_error("No memory instance available");
    }

    #[test]
    fn test_ref_is_null() {
        ExecutorTest::new()
            .inst(Instr::RefNull)
            .inst(Instr::RefIsNull)
            .inst(Instr::RefFunc(0))
            .inst(Instr::RefIsNull)
            .returns(&[ValueType::I32, ValueType::I32])
            .expect_stack(vec![Value::I32(1), Value::I32(0)]);
    }

    #[test]
    fn test_saturating_truncation() {
        ExecutorTest::new()
            .inst(Instr::F64Const(-1e30))
            .inst(Instr::Prefixed(2))
            .returns(&[ValueType::I32])
            .expect_stack(vec![Value::I32(i32::MIN)]);
    }

    #[test]
    fn test_step_reports_exhaustion() {
        let instance = ExecutorTest::new()
            .inst(Instr::I32Const(1))
            .inst(Instr::Drop)
            .instantiate();
        let mut interp = Interpreter::new(&instance);
        interp.call(0).unwrap();
        assert_eq!(interp.call_depth(), 1);
        assert_eq!(interp.step().unwrap(), Step::Continue);
        assert_eq!(interp.step().unwrap(), Step::Continue);
        assert_eq!(interp.step().unwrap(), Step::Exhausted);
        assert_eq!(interp.call_depth(), 0);
        assert!(interp.stack().is_empty());
        assert_eq!(interp.step().unwrap(), Step::Exhausted);
    }
}
