use crate::instruction::Instruction;
use crate::op::Op;

/// Why a byte position could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The opcode byte is not a known [`Op`].
    UnknownOpcode { offset: usize, byte: u8 },
    /// The instruction's operands run past the end of the stream.
    Truncated { offset: usize, op: Op },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOpcode { offset, byte } => {
                write!(f, "unknown opcode 0x{byte:02x} at offset {offset}")
            }
            Self::Truncated { offset, op } => {
                write!(f, "truncated {op:?} at offset {offset}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode the instruction starting at `offset`.
///
/// Returns the instruction and its encoded length. Bytecode comes from
/// assemblies that may have been built by hand, so every read is checked.
pub fn decode_at(code: &[u8], offset: usize) -> Result<(Instruction, usize), DecodeError> {
    let byte = *code
        .get(offset)
        .ok_or(DecodeError::Truncated { offset, op: Op::Halt })?;
    let op = Op::try_from(byte).map_err(|byte| DecodeError::UnknownOpcode { offset, byte })?;
    let operands = code
        .get(offset + 1..offset + 1 + op.operand_len())
        .ok_or(DecodeError::Truncated { offset, op })?;

    let u8_at = |i: usize| operands[i];
    let u16_at = |i: usize| u16::from_le_bytes([operands[i], operands[i + 1]]);

    let instruction = match op {
        Op::Halt => Instruction::Halt,
        Op::ExecuteNativeCommand => Instruction::ExecuteNativeCommand { instance: u16_at(0) },
        Op::ExecuteCommand => Instruction::ExecuteCommand { definition: u16_at(0) },
        Op::Return => Instruction::Return,
        Op::PushEmptyTuple => Instruction::PushEmptyTuple,
        Op::PopTupleKeeping => Instruction::PopTupleKeeping { count: u8_at(0) },
        Op::MergeTuple => Instruction::MergeTuple,
        Op::Pop => Instruction::Pop,
        Op::PushFalse => Instruction::PushFalse,
        Op::PushTrue => Instruction::PushTrue,
        Op::PushLiteral => Instruction::PushLiteral { literal: u16_at(0) },
        Op::SetLocal => Instruction::SetLocal { slot: u8_at(0) },
        Op::PushLocal => Instruction::PushLocal { slot: u8_at(0) },
        Op::PushInput => Instruction::PushInput,
        Op::JumpBackward => Instruction::JumpBackward { offset: u16_at(0) },
        Op::JumpForward => Instruction::JumpForward { offset: u16_at(0) },
        Op::IfConditionJump => Instruction::IfConditionJump { offset: u16_at(0) },
        Op::ForEachConditionJump => Instruction::ForEachConditionJump {
            slot: u8_at(0),
            offset: u16_at(1),
        },
        Op::DebugHook => Instruction::DebugHook,
        Op::DebugPushDebugFrame => Instruction::DebugPushDebugFrame,
        Op::DebugPopDebugFrame => Instruction::DebugPopDebugFrame,
        Op::DebugPushVariableInfo => Instruction::DebugPushVariableInfo { slot: u8_at(0) },
    };
    Ok((instruction, 1 + op.operand_len()))
}

/// Decodes a bytecode byte slice into `(offset, Instruction)` pairs.
///
/// Iteration stops at the end of the stream or at the first undecodable
/// position; [`error`](Self::error) tells which.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    error: Option<DecodeError>,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            error: None,
        }
    }

    /// Current byte offset in the stream.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// The error that stopped iteration early, if any.
    pub fn error(&self) -> Option<DecodeError> {
        self.error
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = (usize, Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() || self.error.is_some() {
            return None;
        }
        match decode_at(self.bytes, self.pos) {
            Ok((instruction, len)) => {
                let offset = self.pos;
                self.pos += len;
                Some((offset, instruction))
            }
            Err(error) => {
                self.error = Some(error);
                None
            }
        }
    }
}
