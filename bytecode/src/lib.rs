//! Bytecode model for the pipeline language: opcodes, the builder the
//! compiler emits through, a checked decoder, runtime values and the
//! [`Assembly`] that ties code, literals and command tables together.

mod assembly;
mod builder;
mod decoder;
mod disassembler;
mod instruction;
mod op;
mod value;

pub use assembly::{
    Assembly, CommandDefinition, ExternalCommandDefinition, ExternalCommandInstance, Source,
    SourceLocation,
};
pub use builder::{BytecodeBuilder, JumpTooFar, Label};
pub use decoder::{BytecodeDecoder, DecodeError, decode_at};
pub use disassembler::disassemble;
pub use instruction::Instruction;
pub use op::Op;
pub use value::{Object, Value, ValueKind};

#[cfg(test)]
mod tests {
    use super::*;
    use parser::Slice;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        BytecodeDecoder::new(bytes).map(|(_, i)| i).collect()
    }

    #[test]
    fn builder_output_decodes() {
        let mut b = BytecodeBuilder::new();
        b.push_literal(42);
        b.push_local(3);
        b.merge_tuple();
        b.execute_native_command(7);
        b.pop_tuple_keeping(2);
        b.set_local(1);
        b.debug_push_variable_info(1);
        b.return_();

        let (code, _) = b.into_parts();
        assert_eq!(
            decode_all(&code),
            vec![
                Instruction::PushLiteral { literal: 42 },
                Instruction::PushLocal { slot: 3 },
                Instruction::MergeTuple,
                Instruction::ExecuteNativeCommand { instance: 7 },
                Instruction::PopTupleKeeping { count: 2 },
                Instruction::SetLocal { slot: 1 },
                Instruction::DebugPushVariableInfo { slot: 1 },
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn operands_are_little_endian() {
        let mut b = BytecodeBuilder::new();
        b.execute_command(0x0102);
        assert_eq!(b.code(), &[Op::ExecuteCommand as u8, 0x02, 0x01]);
    }

    #[test]
    fn forward_jump() {
        let mut b = BytecodeBuilder::new();
        b.push_bool(true);
        let label = b.if_condition_jump();
        b.push_literal(1);
        b.bind(label).expect("short jump");
        b.halt();

        assert_eq!(
            decode_all(b.code()),
            vec![
                Instruction::PushTrue,
                Instruction::IfConditionJump { offset: 3 },
                Instruction::PushLiteral { literal: 1 },
                Instruction::Halt,
            ]
        );
        let (instruction, _) = decode_at(b.code(), 1).expect("decodes");
        assert_eq!(instruction.jump_target(1), Some(7));
    }

    #[test]
    fn backward_jump() {
        let mut b = BytecodeBuilder::new();
        b.push_empty_tuple();
        let top = b.current_offset();
        let exit = b.for_each_condition_jump(0);
        b.jump_backward(top).expect("short jump");
        b.bind(exit).expect("short jump");

        assert_eq!(
            decode_all(b.code()),
            vec![
                Instruction::PushEmptyTuple,
                Instruction::ForEachConditionJump { slot: 0, offset: 3 },
                Instruction::JumpBackward { offset: 7 },
            ]
        );
        let (instruction, _) = decode_at(b.code(), 5).expect("decodes");
        assert_eq!(instruction.jump_target(5), Some(top));
    }

    #[test]
    fn jump_overflow_writes_zero() {
        let mut b = BytecodeBuilder::new();
        let label = b.jump_forward();
        for _ in 0..=u16::MAX as usize {
            b.pop();
        }
        let error = b.bind(label).expect_err("too far");
        assert_eq!(error.distance, u16::MAX as usize + 1);
        assert_eq!(
            decode_at(b.code(), 0).expect("decodes").0,
            Instruction::JumpForward { offset: 0 }
        );
    }

    #[test]
    fn patch_count_after_emission() {
        let mut b = BytecodeBuilder::new();
        let position = b.pop_tuple_keeping(0);
        b.patch_u8(position, 4);
        assert_eq!(decode_all(b.code()), vec![Instruction::PopTupleKeeping { count: 4 }]);
    }

    #[test]
    fn every_byte_has_a_location() {
        let mut b = BytecodeBuilder::new();
        let first = SourceLocation::new(0, Slice::new(0, 2));
        let second = SourceLocation::new(1, Slice::new(5, 3));
        b.set_location(first);
        b.push_literal(0);
        b.set_location(second);
        let label = b.for_each_condition_jump(2);
        b.bind(label).expect("short jump");

        let (code, locations) = b.into_parts();
        assert_eq!(code.len(), locations.len());
        assert_eq!(&locations[..3], &[first; 3]);
        assert_eq!(&locations[3..], &[second; 4]);
    }

    #[test]
    fn decoder_stops_at_bad_bytes() {
        let code = [Op::PushTrue as u8, 0xee, Op::Pop as u8];
        let mut decoder = BytecodeDecoder::new(&code);
        assert_eq!(decoder.next(), Some((0, Instruction::PushTrue)));
        assert_eq!(decoder.next(), None);
        assert_eq!(
            decoder.error(),
            Some(DecodeError::UnknownOpcode { offset: 1, byte: 0xee })
        );

        let truncated = [Op::PushLiteral as u8, 0x01];
        assert_eq!(
            decode_at(&truncated, 0),
            Err(DecodeError::Truncated { offset: 0, op: Op::PushLiteral })
        );
    }

    #[test]
    fn display_instructions() {
        assert_eq!(Instruction::PushLiteral { literal: 3 }.to_string(), "PushLiteral #3");
        assert_eq!(Instruction::JumpBackward { offset: 5 }.to_string(), "JumpBackward -5");
        assert_eq!(
            Instruction::ForEachConditionJump { slot: 1, offset: 9 }.to_string(),
            "ForEachConditionJump $1 +9"
        );
    }

    // ── Disassembly ───────────────────────────────────────────

    fn print_assembly() -> Assembly {
        let text = "1 | print;\ncommand noop {\n}";
        let mut assembly = Assembly::new("main");
        assembly.sources.push(Source::new("main", text));
        let literal = assembly.add_literal(Value::Int(1)).expect("room");
        assembly.external_commands.push(ExternalCommandDefinition {
            name: "print".into(),
            parameter_count: 0,
            location: SourceLocation::default(),
        });
        assembly.external_instances.push(ExternalCommandInstance {
            source_index: 0,
            definition_index: 0,
            location: SourceLocation::new(0, Slice::new(4, 5)),
        });

        let mut b = BytecodeBuilder::new();
        b.set_location(SourceLocation::new(0, Slice::new(0, 1)));
        b.push_literal(literal);
        b.set_location(SourceLocation::new(0, Slice::new(4, 5)));
        b.execute_native_command(0);
        b.pop_tuple_keeping(0);
        b.set_location(SourceLocation::new(0, Slice::new(11, 7)));
        let skip = b.jump_forward();
        assembly.commands.push(CommandDefinition {
            name: "noop".into(),
            entry: b.current_offset(),
            parameter_count: 0,
            location: SourceLocation::new(0, Slice::new(19, 4)),
        });
        b.set_location(SourceLocation::new(0, Slice::new(26, 1)));
        b.push_empty_tuple();
        b.return_();
        b.bind(skip).expect("short jump");
        b.halt();

        let (code, locations) = b.into_parts();
        assembly.code = code;
        assembly.locations = locations;
        assembly
    }

    #[test]
    fn disassembly_listing() {
        let listing = disassemble(&print_assembly());
        let expected = "\
0000    1 PushLiteral #0  ; 1
0003    | ExecuteNativeCommand ~0  ; external print
0006    | PopTupleKeeping 0
0008    2 JumpForward +2  ; -> 0013
-- command noop --
0011    3 PushEmptyTuple
0012    | Return
0013    | Halt
";
        assert_eq!(listing, expected);
    }
}
