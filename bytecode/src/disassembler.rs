use std::collections::HashMap;
use std::fmt::Write as _;

use crate::assembly::Assembly;
use crate::decoder::BytecodeDecoder;
use crate::instruction::Instruction;

/// Render an assembly's code, one instruction per line:
///
/// ```text
/// -- command twice --
/// 0003    2 PushInput
/// 0004    | PushInput
/// 0005    | MergeTuple
/// 0006    | Return
/// ```
///
/// The line column shows `|` while the source line is unchanged. Literal,
/// command and external-command operands are annotated after `;`, jumps
/// with their absolute target. Undecodable bytes end the listing with an
/// `error:` line.
pub fn disassemble(assembly: &Assembly) -> String {
    let entries: HashMap<usize, &str> = assembly
        .commands
        .iter()
        .map(|c| (c.entry, c.name.as_str()))
        .collect();

    let mut out = String::new();
    let mut previous_line = None;
    let mut decoder = BytecodeDecoder::new(&assembly.code);

    for (offset, instruction) in decoder.by_ref() {
        if let Some(name) = entries.get(&offset) {
            let _ = writeln!(out, "-- command {name} --");
            previous_line = None;
        }

        let location = assembly.location_at(offset);
        let line = assembly.line_at(offset);
        let line_column = if previous_line == Some((location.source, line)) {
            "|".to_string()
        } else {
            line.to_string()
        };
        previous_line = Some((location.source, line));

        let _ = write!(out, "{offset:04} {line_column:>4} {instruction}");
        if let Some(note) = annotate(assembly, offset, &instruction) {
            let _ = write!(out, "  ; {note}");
        }
        out.push('\n');
    }

    if let Some(error) = decoder.error() {
        let _ = writeln!(out, "error: {error}");
    }
    out
}

fn annotate(assembly: &Assembly, offset: usize, instruction: &Instruction) -> Option<String> {
    if let Some(target) = instruction.jump_target(offset) {
        return Some(format!("-> {target:04}"));
    }
    match *instruction {
        Instruction::PushLiteral { literal } => assembly
            .literals
            .get(literal as usize)
            .map(|value| match value {
                crate::Value::String(text) => format!("{text:?}"),
                other => other.to_string(),
            }),
        Instruction::ExecuteCommand { definition } => assembly
            .commands
            .get(definition as usize)
            .map(|c| c.name.clone()),
        Instruction::ExecuteNativeCommand { instance } => {
            let instance = assembly.external_instances.get(instance as usize)?;
            let name = assembly.text_at(instance.location);
            Some(match instance.source_index {
                0 => format!("external {name}"),
                i => {
                    let uri = assembly.dependencies.get(i as usize - 1)?;
                    format!("external {name} from {uri}")
                }
            })
        }
        Instruction::DebugPushVariableInfo { .. } => {
            Some(assembly.text_at(assembly.location_at(offset)).to_string())
        }
        _ => None,
    }
}
