use super::number::{cast_to_bool, decode_number, encode_bool, encode_number, MAXIMUM_NUMBER_LENGTH};
use super::opcode::{opcode_name, OpCode};
use super::{Instruction, ProgramState, StateFactory, VirtualMachine, VmError};
use num_traits::FromPrimitive;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineOptions {
    /// Combined depth of the stack and the alternate stack.
    pub maximum_stack_depth: usize,
    pub maximum_number_length: usize,
    /// Stop after this many instructions.
    pub maximum_steps: usize,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            maximum_stack_depth: 1000,
            maximum_number_length: MAXIMUM_NUMBER_LENGTH,
            maximum_steps: 100_000,
        }
    }
}

/// Reference stack machine covering pushes, flow control, stack manipulation,
/// bitwise logic and integer arithmetic.
///
/// Signature checking, hashing and transaction introspection are reported as
/// unsupported operations.
#[derive(Debug, Clone, Default)]
pub struct StackMachine {
    options: MachineOptions,
}

impl StackMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MachineOptions) -> Self {
        Self { options }
    }

    pub fn create_state(instructions: Vec<Instruction>) -> ProgramState {
        ProgramState::new(instructions)
    }

    pub fn state_factory() -> StateFactory {
        Arc::new(Self::create_state)
    }

    pub fn run_once(&self, state: &mut ProgramState) -> Result<(), VmError> {
        let Some(instruction) = state.instructions.get(state.ip).cloned() else {
            return Err(VmError::EndOfProgram);
        };
        state.ip += 1;
        match instruction {
            Instruction::Malformed { .. } => {
                return Err(VmError::MalformedPush(instruction.disassemble()))
            }
            Instruction::Push { data, .. } => {
                if state.is_executing() {
                    state.push(data);
                }
            }
            Instruction::Operation(byte) => self.operation(state, byte)?,
        }
        if state.stack.len() + state.alternate_stack.len() > self.options.maximum_stack_depth {
            return Err(VmError::StackOverflow);
        }
        Ok(())
    }

    fn pop_number(&self, state: &mut ProgramState) -> Result<i64, VmError> {
        decode_number(&state.pop()?, self.options.maximum_number_length)
    }

    fn unary(
        &self,
        state: &mut ProgramState,
        f: impl FnOnce(i64) -> Result<i64, VmError>,
    ) -> Result<(), VmError> {
        let a = self.pop_number(state)?;
        state.push(encode_number(f(a)?));
        Ok(())
    }

    fn binary(
        &self,
        state: &mut ProgramState,
        f: impl FnOnce(i64, i64) -> Result<i64, VmError>,
    ) -> Result<(), VmError> {
        let b = self.pop_number(state)?;
        let a = self.pop_number(state)?;
        state.push(encode_number(f(a, b)?));
        Ok(())
    }

    fn bitwise(&self, state: &mut ProgramState, f: impl Fn(u8, u8) -> u8) -> Result<(), VmError> {
        let b = state.pop()?;
        let a = state.pop()?;
        if a.len() != b.len() {
            return Err(VmError::MismatchedOperandLength);
        }
        state.push(a.iter().zip(&b).map(|(a, b)| f(*a, *b)).collect());
        Ok(())
    }

    fn verify(state: &mut ProgramState) -> Result<(), VmError> {
        match cast_to_bool(&state.pop()?) {
            true => Ok(()),
            false => Err(VmError::FailedVerify),
        }
    }

    fn operation(&self, state: &mut ProgramState, byte: u8) -> Result<(), VmError> {
        use OpCode::*;
        let executing = state.is_executing();
        let Some(opcode) = OpCode::from_u8(byte) else {
            return match executing {
                true => Err(VmError::Unsupported(opcode_name(byte))),
                false => Ok(()),
            };
        };

        match opcode {
            OP_IF | OP_NOTIF => {
                let branch = match executing {
                    true => cast_to_bool(&state.pop()?) == (opcode == OP_IF),
                    false => false,
                };
                state.execution_stack.push(branch);
                return Ok(());
            }
            OP_ELSE => {
                let branch = state
                    .execution_stack
                    .last_mut()
                    .ok_or(VmError::UnbalancedConditional)?;
                *branch = !*branch;
                return Ok(());
            }
            OP_ENDIF => {
                state
                    .execution_stack
                    .pop()
                    .ok_or(VmError::UnbalancedConditional)?;
                return Ok(());
            }
            _ if !executing => return Ok(()),
            _ => {}
        }

        match opcode {
            OP_0 => state.push(Vec::new()),
            OP_1NEGATE => state.push(encode_number(-1)),
            OP_1 | OP_2 | OP_3 | OP_4 | OP_5 | OP_6 | OP_7 | OP_8 | OP_9 | OP_10 | OP_11
            | OP_12 | OP_13 | OP_14 | OP_15 | OP_16 => {
                let value = opcode.small_integer().unwrap_or_default();
                state.push(encode_number(value));
            }
            OP_NOP | OP_NOP1 | OP_NOP4 | OP_NOP5 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9
            | OP_NOP10 => {}
            OP_VERIFY => Self::verify(state)?,
            OP_RETURN => return Err(VmError::CalledReturn),

            OP_TOALTSTACK => {
                let item = state.pop()?;
                state.alternate_stack.push(item);
            }
            OP_FROMALTSTACK => {
                let item = state
                    .alternate_stack
                    .pop()
                    .ok_or(VmError::EmptyAlternateStack)?;
                state.push(item);
            }
            OP_2DROP => {
                state.pop()?;
                state.pop()?;
            }
            OP_2DUP => {
                let a = state.peek(1)?.clone();
                let b = state.peek(0)?.clone();
                state.push(a);
                state.push(b);
            }
            OP_3DUP => {
                let a = state.peek(2)?.clone();
                let b = state.peek(1)?.clone();
                let c = state.peek(0)?.clone();
                state.push(a);
                state.push(b);
                state.push(c);
            }
            OP_2OVER => {
                let a = state.peek(3)?.clone();
                let b = state.peek(2)?.clone();
                state.push(a);
                state.push(b);
            }
            OP_2ROT => {
                state.peek(5)?;
                let a = state.remove(5)?;
                let b = state.remove(4)?;
                state.push(a);
                state.push(b);
            }
            OP_2SWAP => {
                state.peek(3)?;
                let a = state.remove(3)?;
                let b = state.remove(2)?;
                state.push(a);
                state.push(b);
            }
            OP_IFDUP => {
                let top = state.peek(0)?.clone();
                if cast_to_bool(&top) {
                    state.push(top);
                }
            }
            OP_DEPTH => {
                let depth = state.stack.len() as i64;
                state.push(encode_number(depth));
            }
            OP_DROP => {
                state.pop()?;
            }
            OP_DUP => {
                let top = state.peek(0)?.clone();
                state.push(top);
            }
            OP_NIP => {
                state.peek(1)?;
                state.remove(1)?;
            }
            OP_OVER => {
                let item = state.peek(1)?.clone();
                state.push(item);
            }
            OP_PICK | OP_ROLL => {
                let depth = self.pop_number(state)?;
                let depth = usize::try_from(depth).map_err(|_| VmError::InvalidStackIndex)?;
                if depth >= state.stack.len() {
                    return Err(VmError::InvalidStackIndex);
                }
                let item = match opcode {
                    OP_PICK => state.peek(depth)?.clone(),
                    _ => state.remove(depth)?,
                };
                state.push(item);
            }
            OP_ROT => {
                state.peek(2)?;
                let item = state.remove(2)?;
                state.push(item);
            }
            OP_SWAP => {
                state.peek(1)?;
                let item = state.remove(1)?;
                state.push(item);
            }
            OP_TUCK => {
                let top = state.peek(0)?.clone();
                state.peek(1)?;
                let index = state.stack.len() - 2;
                state.stack.insert(index, top);
            }

            OP_CAT => {
                let b = state.pop()?;
                let mut a = state.pop()?;
                a.extend(b);
                state.push(a);
            }
            OP_SPLIT => {
                let index = self.pop_number(state)?;
                let mut item = state.pop()?;
                let index = usize::try_from(index)
                    .ok()
                    .filter(|index| *index <= item.len())
                    .ok_or(VmError::InvalidSplitIndex)?;
                let tail = item.split_off(index);
                state.push(item);
                state.push(tail);
            }
            OP_SIZE => {
                let size = state.peek(0)?.len() as i64;
                state.push(encode_number(size));
            }
            OP_REVERSEBYTES => {
                let mut item = state.pop()?;
                item.reverse();
                state.push(item);
            }

            OP_AND => self.bitwise(state, |a, b| a & b)?,
            OP_OR => self.bitwise(state, |a, b| a | b)?,
            OP_XOR => self.bitwise(state, |a, b| a ^ b)?,
            OP_EQUAL | OP_EQUALVERIFY => {
                let b = state.pop()?;
                let a = state.pop()?;
                state.push(encode_bool(a == b));
                if opcode == OP_EQUALVERIFY {
                    Self::verify(state)?;
                }
            }

            OP_1ADD => self.unary(state, |a| a.checked_add(1).ok_or(VmError::Overflow))?,
            OP_1SUB => self.unary(state, |a| a.checked_sub(1).ok_or(VmError::Overflow))?,
            OP_NEGATE => self.unary(state, |a| a.checked_neg().ok_or(VmError::Overflow))?,
            OP_ABS => self.unary(state, |a| a.checked_abs().ok_or(VmError::Overflow))?,
            OP_NOT => self.unary(state, |a| Ok(i64::from(a == 0)))?,
            OP_0NOTEQUAL => self.unary(state, |a| Ok(i64::from(a != 0)))?,
            OP_ADD => self.binary(state, |a, b| a.checked_add(b).ok_or(VmError::Overflow))?,
            OP_SUB => self.binary(state, |a, b| a.checked_sub(b).ok_or(VmError::Overflow))?,
            OP_MUL => self.binary(state, |a, b| a.checked_mul(b).ok_or(VmError::Overflow))?,
            OP_DIV => self.binary(state, |a, b| match b {
                0 => Err(VmError::DivisionByZero),
                _ => a.checked_div(b).ok_or(VmError::Overflow),
            })?,
            OP_MOD => self.binary(state, |a, b| match b {
                0 => Err(VmError::DivisionByZero),
                _ => a.checked_rem(b).ok_or(VmError::Overflow),
            })?,
            OP_BOOLAND => self.binary(state, |a, b| Ok(i64::from(a != 0 && b != 0)))?,
            OP_BOOLOR => self.binary(state, |a, b| Ok(i64::from(a != 0 || b != 0)))?,
            OP_NUMEQUAL => self.binary(state, |a, b| Ok(i64::from(a == b)))?,
            OP_NUMEQUALVERIFY => {
                self.binary(state, |a, b| Ok(i64::from(a == b)))?;
                Self::verify(state)?;
            }
            OP_NUMNOTEQUAL => self.binary(state, |a, b| Ok(i64::from(a != b)))?,
            OP_LESSTHAN => self.binary(state, |a, b| Ok(i64::from(a < b)))?,
            OP_GREATERTHAN => self.binary(state, |a, b| Ok(i64::from(a > b)))?,
            OP_LESSTHANOREQUAL => self.binary(state, |a, b| Ok(i64::from(a <= b)))?,
            OP_GREATERTHANOREQUAL => self.binary(state, |a, b| Ok(i64::from(a >= b)))?,
            OP_MIN => self.binary(state, |a, b| Ok(a.min(b)))?,
            OP_MAX => self.binary(state, |a, b| Ok(a.max(b)))?,
            OP_WITHIN => {
                let maximum = self.pop_number(state)?;
                let minimum = self.pop_number(state)?;
                let value = self.pop_number(state)?;
                state.push(encode_bool(minimum <= value && value < maximum));
            }

            _ => return Err(VmError::Unsupported(opcode.name().to_string())),
        }
        Ok(())
    }
}

impl VirtualMachine for StackMachine {
    fn debug(&self, mut state: ProgramState) -> Vec<ProgramState> {
        let mut trace = vec![state.clone()];
        let mut steps = 0;
        while !state.is_finished() {
            if steps == self.options.maximum_steps {
                state.error = Some(VmError::StepLimit(steps).to_string());
                trace.push(state);
                break;
            }
            if let Err(error) = self.run_once(&mut state) {
                state.error = Some(error.to_string());
            }
            steps += 1;
            trace.push(state.clone());
        }
        tracing::trace!(steps, "stack machine finished");
        trace
    }
}
