use super::opcode::{opcode_name, OpCode, MAXIMUM_PUSHBYTES};
use num_traits::FromPrimitive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Operation(u8),
    Push {
        opcode: u8,
        data: Vec<u8>,
    },
    /// A push whose length or payload runs past the end of the bytecode.
    ///
    /// `expected_length` is `None` when even the length prefix is truncated.
    Malformed {
        opcode: u8,
        expected_length: Option<usize>,
        data: Vec<u8>,
    },
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Operation(opcode) => *opcode,
            Self::Push { opcode, .. } | Self::Malformed { opcode, .. } => *opcode,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Operation(_) => 1,
            Self::Push { opcode, data } => 1 + length_prefix_width(*opcode) + data.len(),
            Self::Malformed { data, .. } => 1 + data.len(),
        }
    }

    pub fn to_bytecode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size());
        match self {
            Self::Operation(opcode) => bytes.push(*opcode),
            Self::Push { opcode, data } => {
                bytes.push(*opcode);
                let length = data.len() as u32;
                match length_prefix_width(*opcode) {
                    1 => bytes.push(length as u8),
                    2 => bytes.extend((length as u16).to_le_bytes()),
                    4 => bytes.extend(length.to_le_bytes()),
                    _ => {}
                }
                bytes.extend(data);
            }
            Self::Malformed { opcode, data, .. } => {
                bytes.push(*opcode);
                bytes.extend(data);
            }
        }
        bytes
    }

    /// Render the instruction so that compiling the text yields the same bytes.
    pub fn disassemble(&self) -> String {
        let name = opcode_name(self.opcode());
        match self {
            Self::Operation(_) => name,
            Self::Push { opcode, data } if length_prefix_width(*opcode) == 0 => {
                format!("{name} 0x{}", hex::encode(data))
            }
            Self::Push { .. } => {
                let bytecode = self.to_bytecode();
                let width = length_prefix_width(self.opcode());
                format!(
                    "{name} 0x{} 0x{}",
                    hex::encode(&bytecode[1..1 + width]),
                    hex::encode(&bytecode[1 + width..])
                )
            }
            Self::Malformed { data, .. } => format!("[{name} 0x{}]", hex::encode(data)),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.disassemble())
    }
}

fn length_prefix_width(opcode: u8) -> usize {
    match OpCode::from_u8(opcode) {
        Some(OpCode::OP_PUSHDATA_1) => 1,
        Some(OpCode::OP_PUSHDATA_2) => 2,
        Some(OpCode::OP_PUSHDATA_4) => 4,
        _ => 0,
    }
}

fn is_push(opcode: u8) -> bool {
    (0x01..=OpCode::OP_PUSHDATA_4 as u8).contains(&opcode)
}

/// Read the instruction starting at `ip`, advancing it past the instruction.
pub fn read_instruction(bytes: &[u8], ip: &mut usize) -> Instruction {
    let opcode = bytes[*ip];
    *ip += 1;
    if !is_push(opcode) {
        return Instruction::Operation(opcode);
    }

    let rest = &bytes[*ip..];
    let width = length_prefix_width(opcode);
    if rest.len() < width {
        *ip = bytes.len();
        return Instruction::Malformed {
            opcode,
            expected_length: None,
            data: rest.to_vec(),
        };
    }

    let length = match width {
        0 => usize::from(opcode),
        _ => rest[..width]
            .iter()
            .rev()
            .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte)),
    };
    let payload = &rest[width..];
    if payload.len() < length {
        *ip = bytes.len();
        return Instruction::Malformed {
            opcode,
            expected_length: Some(length),
            data: rest.to_vec(),
        };
    }

    *ip += width + length;
    Instruction::Push {
        opcode,
        data: payload[..length].to_vec(),
    }
}

pub fn parse_bytecode(bytes: &[u8]) -> Vec<Instruction> {
    let mut ip = 0;
    let mut instructions = Vec::new();
    while ip < bytes.len() {
        instructions.push(read_instruction(bytes, &mut ip));
    }
    instructions
}

pub fn serialize_instructions(instructions: &[Instruction]) -> Vec<u8> {
    instructions.iter().flat_map(|i| i.to_bytecode()).collect()
}

pub fn disassemble_instructions(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .map(Instruction::disassemble)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn disassemble_bytecode(bytes: &[u8]) -> String {
    disassemble_instructions(&parse_bytecode(bytes))
}

/// Wrap `data` in the shortest push that places it on the stack.
pub fn encode_data_push(data: &[u8]) -> Vec<u8> {
    let length = data.len();
    let mut bytes = Vec::with_capacity(length + 5);
    match length {
        0 => bytes.push(OpCode::OP_0 as u8),
        1 if (1..=16).contains(&data[0]) => {
            bytes.push(OpCode::OP_RESERVED as u8 + data[0]);
            return bytes;
        }
        1 if data[0] == 0x81 => {
            bytes.push(OpCode::OP_1NEGATE as u8);
            return bytes;
        }
        _ if length <= usize::from(MAXIMUM_PUSHBYTES) => bytes.push(length as u8),
        _ if length <= usize::from(u8::MAX) => {
            bytes.push(OpCode::OP_PUSHDATA_1 as u8);
            bytes.push(length as u8);
        }
        _ if length <= usize::from(u16::MAX) => {
            bytes.push(OpCode::OP_PUSHDATA_2 as u8);
            bytes.extend((length as u16).to_le_bytes());
        }
        _ => {
            bytes.push(OpCode::OP_PUSHDATA_4 as u8);
            bytes.extend((length as u32).to_le_bytes());
        }
    }
    bytes.extend(data);
    bytes
}
