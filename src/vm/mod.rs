mod instruction;
mod machine;
pub mod number;
mod opcode;
mod state;

pub use instruction::{
    disassemble_bytecode, disassemble_instructions, encode_data_push, parse_bytecode,
    read_instruction, serialize_instructions, Instruction,
};
pub use machine::{MachineOptions, StackMachine};
pub use opcode::{default_opcodes, opcode_name, OpCode};
pub use state::ProgramState;

use std::sync::Arc;
use thiserror::Error;

/// Builds the initial program state for a list of instructions.
pub type StateFactory = Arc<dyn Fn(Vec<Instruction>) -> ProgramState + Send + Sync>;

/// A virtual machine able to report every intermediate state of a program.
pub trait VirtualMachine: Send + Sync {
    /// Initial state followed by the state after each instruction, ending at
    /// the first error.
    fn debug(&self, state: ProgramState) -> Vec<ProgramState>;

    fn evaluate(&self, state: ProgramState) -> ProgramState {
        let fallback = state.clone();
        self.debug(state).pop().unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("Tried to read from an empty stack.")]
    EmptyStack,
    #[error("Tried to read from an empty alternate stack.")]
    EmptyAlternateStack,
    #[error("Stack depth exceeds the allowed maximum.")]
    StackOverflow,
    #[error("Encountered an OP_ELSE or OP_ENDIF without a matching OP_IF.")]
    UnbalancedConditional,
    #[error("Program failed an OP_VERIFY operation.")]
    FailedVerify,
    #[error("Program called an OP_RETURN operation.")]
    CalledReturn,
    #[error("Encountered a malformed push: {0}")]
    MalformedPush(String),
    #[error("Number exceeds the maximum length of {maximum} bytes.")]
    NumberTooLong { maximum: usize },
    #[error("Arithmetic result out of range.")]
    Overflow,
    #[error("Attempted to divide by zero.")]
    DivisionByZero,
    #[error("Stack index out of range.")]
    InvalidStackIndex,
    #[error("Split index out of range.")]
    InvalidSplitIndex,
    #[error("Bitwise operands must be of equal length.")]
    MismatchedOperandLength,
    #[error("{0} is not supported by this virtual machine.")]
    Unsupported(String),
    #[error("Program exceeded the limit of {0} steps.")]
    StepLimit(usize),
    #[error("No instruction remains to be executed.")]
    EndOfProgram,
}
