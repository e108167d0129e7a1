use super::{Instruction, VmError};
use std::sync::Arc;

/// Snapshot of a stack machine between two instructions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramState {
    pub instructions: Arc<Vec<Instruction>>,
    pub ip: usize,
    pub stack: Vec<Vec<u8>>,
    pub alternate_stack: Vec<Vec<u8>>,
    /// One entry per open conditional, `true` when its branch executes.
    pub execution_stack: Vec<bool>,
    pub error: Option<String>,
}

impl ProgramState {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions: Arc::new(instructions),
            ..Self::default()
        }
    }

    pub fn is_executing(&self) -> bool {
        self.execution_stack.iter().all(|branch| *branch)
    }

    pub fn is_finished(&self) -> bool {
        self.error.is_some() || self.ip >= self.instructions.len()
    }

    pub fn top(&self) -> Option<&[u8]> {
        self.stack.last().map(Vec::as_slice)
    }

    pub(crate) fn push(&mut self, item: Vec<u8>) {
        self.stack.push(item);
    }

    pub(crate) fn pop(&mut self) -> Result<Vec<u8>, VmError> {
        self.stack.pop().ok_or(VmError::EmptyStack)
    }

    /// Item `depth` positions below the top, `0` being the top itself.
    pub(crate) fn peek(&self, depth: usize) -> Result<&Vec<u8>, VmError> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|index| &self.stack[index])
            .ok_or(VmError::EmptyStack)
    }

    pub(crate) fn remove(&mut self, depth: usize) -> Result<Vec<u8>, VmError> {
        let index = self
            .stack
            .len()
            .checked_sub(depth + 1)
            .ok_or(VmError::InvalidStackIndex)?;
        Ok(self.stack.remove(index))
    }
}
