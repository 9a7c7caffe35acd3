use crate::assembly::SourceLocation;
use crate::op::Op;

/// A forward jump whose offset has not yet been resolved.
///
/// Created by [`BytecodeBuilder::jump_forward`],
/// [`BytecodeBuilder::if_condition_jump`] and
/// [`BytecodeBuilder::for_each_condition_jump`]. Resolve it with
/// [`BytecodeBuilder::bind`].
#[derive(Debug)]
#[must_use]
pub struct Label {
    /// Position of the u16 offset bytes in the buffer.
    offset_pos: usize,
    /// Position right after the jump instruction (base for relative offset).
    base: usize,
}

/// A jump whose distance does not fit the 16-bit operand. The operand has
/// been written as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTooFar {
    pub distance: usize,
}

/// Builds a bytecode byte sequence and its parallel source-location map.
///
/// Every emitted byte is tagged with the builder's current location, so
/// `locations()[i]` always describes `code()[i]`.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
    locations: Vec<SourceLocation>,
    location: SourceLocation,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current byte offset in the bytecode stream.
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Location attached to bytes emitted from now on.
    pub fn set_location(&mut self, location: SourceLocation) {
        self.location = location;
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn locations(&self) -> &[SourceLocation] {
        &self.locations
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<SourceLocation>) {
        (self.code, self.locations)
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_u8(&mut self, v: u8) {
        self.code.push(v);
        self.locations.push(self.location);
    }

    fn emit_u16(&mut self, v: u16) {
        for byte in v.to_le_bytes() {
            self.emit_u8(byte);
        }
    }

    fn emit_op(&mut self, op: Op) {
        self.emit_u8(op as u8);
    }

    /// Overwrite a previously emitted `u8` operand.
    pub fn patch_u8(&mut self, position: usize, value: u8) {
        self.code[position] = value;
    }

    fn patch_u16(&mut self, position: usize, value: u16) {
        self.code[position..position + 2].copy_from_slice(&value.to_le_bytes());
    }

    // ── instructions ───────────────────────────────────────────────

    pub fn halt(&mut self) {
        self.emit_op(Op::Halt);
    }

    /// `ExecuteNativeCommand <instance:u16>`.
    pub fn execute_native_command(&mut self, instance: u16) {
        self.emit_op(Op::ExecuteNativeCommand);
        self.emit_u16(instance);
    }

    /// `ExecuteCommand <definition:u16>`.
    pub fn execute_command(&mut self, definition: u16) {
        self.emit_op(Op::ExecuteCommand);
        self.emit_u16(definition);
    }

    pub fn return_(&mut self) {
        self.emit_op(Op::Return);
    }

    pub fn push_empty_tuple(&mut self) {
        self.emit_op(Op::PushEmptyTuple);
    }

    /// `PopTupleKeeping <count:u8>`. Returns the operand position so the
    /// count can be patched once it is known.
    pub fn pop_tuple_keeping(&mut self, count: u8) -> usize {
        self.emit_op(Op::PopTupleKeeping);
        let position = self.code.len();
        self.emit_u8(count);
        position
    }

    pub fn merge_tuple(&mut self) {
        self.emit_op(Op::MergeTuple);
    }

    pub fn pop(&mut self) {
        self.emit_op(Op::Pop);
    }

    pub fn push_bool(&mut self, value: bool) {
        self.emit_op(if value { Op::PushTrue } else { Op::PushFalse });
    }

    /// `PushLiteral <literal:u16>`.
    pub fn push_literal(&mut self, literal: u16) {
        self.emit_op(Op::PushLiteral);
        self.emit_u16(literal);
    }

    /// `SetLocal <slot:u8>`.
    pub fn set_local(&mut self, slot: u8) {
        self.emit_op(Op::SetLocal);
        self.emit_u8(slot);
    }

    /// `PushLocal <slot:u8>`.
    pub fn push_local(&mut self, slot: u8) {
        self.emit_op(Op::PushLocal);
        self.emit_u8(slot);
    }

    pub fn push_input(&mut self) {
        self.emit_op(Op::PushInput);
    }

    pub fn debug_hook(&mut self) {
        self.emit_op(Op::DebugHook);
    }

    pub fn debug_push_debug_frame(&mut self) {
        self.emit_op(Op::DebugPushDebugFrame);
    }

    pub fn debug_pop_debug_frame(&mut self) {
        self.emit_op(Op::DebugPopDebugFrame);
    }

    /// `DebugPushVariableInfo <slot:u8>`.
    pub fn debug_push_variable_info(&mut self, slot: u8) {
        self.emit_op(Op::DebugPushVariableInfo);
        self.emit_u8(slot);
    }

    // ── jumps ──────────────────────────────────────────────────────

    /// Emit an unconditional forward jump. Returns a [`Label`] that must be
    /// resolved later with [`bind`](Self::bind).
    pub fn jump_forward(&mut self) -> Label {
        self.emit_op(Op::JumpForward);
        self.emit_offset_placeholder()
    }

    /// Emit a conditional forward jump over a block. Returns a [`Label`].
    pub fn if_condition_jump(&mut self) -> Label {
        self.emit_op(Op::IfConditionJump);
        self.emit_offset_placeholder()
    }

    /// Emit a loop-head jump that exits when the iterable is exhausted.
    pub fn for_each_condition_jump(&mut self, slot: u8) -> Label {
        self.emit_op(Op::ForEachConditionJump);
        self.emit_u8(slot);
        self.emit_offset_placeholder()
    }

    /// Bind a forward jump label to the current position.
    pub fn bind(&mut self, label: Label) -> Result<(), JumpTooFar> {
        let distance = self.code.len() - label.base;
        let offset = u16::try_from(distance).map_err(|_| JumpTooFar { distance });
        self.patch_u16(label.offset_pos, *offset.as_ref().unwrap_or(&0));
        offset.map(|_| ())
    }

    /// Emit an unconditional backward jump to `target` (a byte offset
    /// obtained from [`current_offset`](Self::current_offset)).
    pub fn jump_backward(&mut self, target: usize) -> Result<(), JumpTooFar> {
        self.emit_op(Op::JumpBackward);
        let base = self.code.len() + 2;
        let distance = base - target;
        let offset = u16::try_from(distance).map_err(|_| JumpTooFar { distance });
        self.emit_u16(*offset.as_ref().unwrap_or(&0));
        offset.map(|_| ())
    }

    fn emit_offset_placeholder(&mut self) -> Label {
        let offset_pos = self.code.len();
        self.emit_u16(0); // placeholder
        Label {
            offset_pos,
            base: self.code.len(),
        }
    }
}
