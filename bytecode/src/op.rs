/// Bytecode opcodes.
///
/// Operands follow the opcode byte, little-endian. Local slots and tuple
/// counts are 8-bit; literal, command and instance indices and jump
/// offsets are 16-bit. Jump offsets are unsigned and relative to the end
/// of the jump instruction; the opcode carries the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Stop execution of the root frame.
    Halt = 0x00,

    /// Call a host-bound command.
    /// Operands: `instance:u16`
    ExecuteNativeCommand,

    /// Call a command defined in the same assembly.
    /// Operands: `definition:u16`
    ExecuteCommand,

    /// Return the top tuple to the caller.
    Return,

    /// Start a tuple with no values.
    PushEmptyTuple,

    /// Resize the top tuple to exactly `count` raw values and drop its
    /// tuple-size entry.
    /// Operands: `count:u8`
    PopTupleKeeping,

    /// Fold the two topmost tuples into one.
    MergeTuple,

    /// Discard one raw value.
    Pop,

    /// Push `false` as a 1-tuple.
    PushFalse,

    /// Push `true` as a 1-tuple.
    PushTrue,

    /// Push a literal pool entry as a 1-tuple.
    /// Operands: `literal:u16`
    PushLiteral,

    /// Pop one raw value into a frame-relative slot.
    /// Operands: `slot:u8`
    SetLocal,

    /// Push a frame-relative slot as a 1-tuple.
    /// Operands: `slot:u8`
    PushLocal,

    /// Push a copy of the running command's input tuple.
    PushInput,

    /// Operands: `offset:u16`
    JumpBackward,

    /// Operands: `offset:u16`
    JumpForward,

    /// Consume the top tuple; jump forward unless every value is truthy.
    /// Operands: `offset:u16`
    IfConditionJump,

    /// Move the first value of the top tuple into `slot`, or drop the
    /// exhausted tuple and jump forward.
    /// Operands: `slot:u8`, `offset:u16`
    ForEachConditionJump,

    /// Give an attached debugger control.
    DebugHook,

    /// Open a debugger scope for variable bookkeeping.
    DebugPushDebugFrame,

    /// Close the innermost debugger scope.
    DebugPopDebugFrame,

    /// Announce a variable to the debugger. Its name is the instruction's
    /// source slice.
    /// Operands: `slot:u8`
    DebugPushVariableInfo,
}

impl Op {
    pub const COUNT: usize = Op::DebugPushVariableInfo as usize + 1;

    const ALL: [Op; Op::COUNT] = [
        Op::Halt,
        Op::ExecuteNativeCommand,
        Op::ExecuteCommand,
        Op::Return,
        Op::PushEmptyTuple,
        Op::PopTupleKeeping,
        Op::MergeTuple,
        Op::Pop,
        Op::PushFalse,
        Op::PushTrue,
        Op::PushLiteral,
        Op::SetLocal,
        Op::PushLocal,
        Op::PushInput,
        Op::JumpBackward,
        Op::JumpForward,
        Op::IfConditionJump,
        Op::ForEachConditionJump,
        Op::DebugHook,
        Op::DebugPushDebugFrame,
        Op::DebugPopDebugFrame,
        Op::DebugPushVariableInfo,
    ];

    /// Number of operand bytes following the opcode.
    pub const fn operand_len(self) -> usize {
        match self {
            Op::ExecuteNativeCommand
            | Op::ExecuteCommand
            | Op::PushLiteral
            | Op::JumpBackward
            | Op::JumpForward
            | Op::IfConditionJump => 2,
            Op::PopTupleKeeping | Op::SetLocal | Op::PushLocal | Op::DebugPushVariableInfo => 1,
            Op::ForEachConditionJump => 3,
            _ => 0,
        }
    }

    /// Whether the opcode only exists in debug-mode assemblies.
    pub const fn is_debug(self) -> bool {
        matches!(
            self,
            Op::DebugHook
                | Op::DebugPushDebugFrame
                | Op::DebugPopDebugFrame
                | Op::DebugPushVariableInfo
        )
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Self::ALL.get(byte as usize).copied().ok_or(byte)
    }
}
