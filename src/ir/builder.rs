//! Programmatic function construction.
//!
//! The builder keeps a current block and appends instructions to it,
//! refusing to grow a block past its terminator. `finish` runs full
//! structural validation, so a function obtained from the builder is safe
//! to hand to the analyses.

use crate::error::{LcmError, Result};
use crate::ir::types::{BlockId, CmpOp, Function, InstId, InstKind, Opcode, Value};

/// Incremental builder for [`Function`].
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
    current: Option<BlockId>,
}

impl FunctionBuilder {
    /// Start a new function. No blocks exist yet; the first call to
    /// [`block`](Self::block) creates the entry block.
    pub fn new(name: impl Into<String>, num_params: u32) -> Self {
        Self {
            func: Function::new(name, num_params),
            current: None,
        }
    }

    /// Create a new block and make it current.
    pub fn block(&mut self, label: &str) -> BlockId {
        let id = self.func.add_block(label);
        self.current = Some(id);
        id
    }

    /// Switch the insertion point to an existing block.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    fn push(&mut self, kind: InstKind) -> Result<InstId> {
        let block = self.current.ok_or(LcmError::NoCurrentBlock)?;
        if self.func.terminator(block).is_some() {
            return Err(LcmError::BlockTerminated(block));
        }
        Ok(self.func.append_inst(block, kind))
    }

    /// Append a binary arithmetic instruction; returns its result value.
    pub fn binary(&mut self, op: Opcode, lhs: Value, rhs: Value) -> Result<Value> {
        Ok(Value::Inst(self.push(InstKind::Binary { op, lhs, rhs })?))
    }

    /// Append a comparison; returns its boolean result value.
    pub fn cmp(&mut self, op: CmpOp, lhs: Value, rhs: Value) -> Result<Value> {
        Ok(Value::Inst(self.push(InstKind::Cmp { op, lhs, rhs })?))
    }

    /// Append a copy; returns the copy's result value.
    pub fn copy(&mut self, src: Value) -> Result<Value> {
        Ok(Value::Inst(self.push(InstKind::Copy { src })?))
    }

    /// Append a phi with the given incoming (predecessor, value) pairs.
    pub fn phi(&mut self, incoming: Vec<(BlockId, Value)>) -> Result<Value> {
        Ok(Value::Inst(self.push(InstKind::Phi { incoming })?))
    }

    /// Append a store to an abstract memory slot.
    pub fn store(&mut self, slot: u32, value: Value) -> Result<()> {
        self.push(InstKind::Store { slot, value })?;
        Ok(())
    }

    /// Terminate the current block with an unconditional branch.
    pub fn br(&mut self, dest: BlockId) -> Result<()> {
        self.push(InstKind::Br { dest })?;
        Ok(())
    }

    /// Terminate the current block with a conditional branch.
    pub fn cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) -> Result<()> {
        self.push(InstKind::CondBr {
            cond,
            then_dest,
            else_dest,
        })?;
        Ok(())
    }

    /// Terminate the current block with a return.
    pub fn ret(&mut self, value: Option<Value>) -> Result<()> {
        self.push(InstKind::Ret { value })?;
        Ok(())
    }

    /// Validate and return the finished function.
    pub fn finish(self) -> Result<Function> {
        self.func.validate()?;
        Ok(self.func)
    }

    /// Return the function without validating.
    ///
    /// Needed when phi incoming lists must be patched after the fact, as
    /// with loop-carried values whose defining instructions do not exist
    /// yet while the loop header is being built. Callers are expected to
    /// run [`Function::validate`] once patching is done.
    pub fn finish_unchecked(self) -> Function {
        self.func
    }
}
