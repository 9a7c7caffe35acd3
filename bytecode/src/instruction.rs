use core::fmt;

use crate::op::Op;

/// A decoded instruction with its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Halt,
    ExecuteNativeCommand { instance: u16 },
    ExecuteCommand { definition: u16 },
    Return,
    PushEmptyTuple,
    PopTupleKeeping { count: u8 },
    MergeTuple,
    Pop,
    PushFalse,
    PushTrue,
    PushLiteral { literal: u16 },
    SetLocal { slot: u8 },
    PushLocal { slot: u8 },
    PushInput,
    JumpBackward { offset: u16 },
    JumpForward { offset: u16 },
    IfConditionJump { offset: u16 },
    ForEachConditionJump { slot: u8, offset: u16 },
    DebugHook,
    DebugPushDebugFrame,
    DebugPopDebugFrame,
    DebugPushVariableInfo { slot: u8 },
}

impl Instruction {
    pub fn op(&self) -> Op {
        match self {
            Self::Halt => Op::Halt,
            Self::ExecuteNativeCommand { .. } => Op::ExecuteNativeCommand,
            Self::ExecuteCommand { .. } => Op::ExecuteCommand,
            Self::Return => Op::Return,
            Self::PushEmptyTuple => Op::PushEmptyTuple,
            Self::PopTupleKeeping { .. } => Op::PopTupleKeeping,
            Self::MergeTuple => Op::MergeTuple,
            Self::Pop => Op::Pop,
            Self::PushFalse => Op::PushFalse,
            Self::PushTrue => Op::PushTrue,
            Self::PushLiteral { .. } => Op::PushLiteral,
            Self::SetLocal { .. } => Op::SetLocal,
            Self::PushLocal { .. } => Op::PushLocal,
            Self::PushInput => Op::PushInput,
            Self::JumpBackward { .. } => Op::JumpBackward,
            Self::JumpForward { .. } => Op::JumpForward,
            Self::IfConditionJump { .. } => Op::IfConditionJump,
            Self::ForEachConditionJump { .. } => Op::ForEachConditionJump,
            Self::DebugHook => Op::DebugHook,
            Self::DebugPushDebugFrame => Op::DebugPushDebugFrame,
            Self::DebugPopDebugFrame => Op::DebugPopDebugFrame,
            Self::DebugPushVariableInfo { .. } => Op::DebugPushVariableInfo,
        }
    }

    /// Encoded size in bytes, opcode included.
    pub fn len(&self) -> usize {
        1 + self.op().operand_len()
    }

    /// The absolute target of a jump located at `offset`, if this is one.
    pub fn jump_target(&self, offset: usize) -> Option<usize> {
        let end = offset + self.len();
        match *self {
            Self::JumpForward { offset }
            | Self::IfConditionJump { offset }
            | Self::ForEachConditionJump { offset, .. } => Some(end + offset as usize),
            Self::JumpBackward { offset } => end.checked_sub(offset as usize),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self.op());
        match self {
            Self::ExecuteNativeCommand { instance } => write!(f, "{name} ~{instance}"),
            Self::ExecuteCommand { definition } => write!(f, "{name} @{definition}"),
            Self::PopTupleKeeping { count } => write!(f, "{name} {count}"),
            Self::PushLiteral { literal } => write!(f, "{name} #{literal}"),
            Self::SetLocal { slot }
            | Self::PushLocal { slot }
            | Self::DebugPushVariableInfo { slot } => write!(f, "{name} ${slot}"),
            Self::JumpBackward { offset } => write!(f, "{name} -{offset}"),
            Self::JumpForward { offset } | Self::IfConditionJump { offset } => {
                write!(f, "{name} +{offset}")
            }
            Self::ForEachConditionJump { slot, offset } => write!(f, "{name} ${slot} +{offset}"),
            _ => f.write_str(&name),
        }
    }
}
