//! The stack machine.
//!
//! Besides the value stack the VM keeps three companion stacks:
//!
//! - `tuple_sizes`: how many values on top of the stack belong to each
//!   live tuple, innermost last;
//! - `inputs`: the piped-in values of each running command (`$$`);
//! - `frames`: one [`StackFrame`] per running command, root first.
//!
//! Locals are plain stack slots addressed relative to the frame base.

use std::fmt;
use std::sync::Arc;

use bytecode::{Assembly, Instruction, SourceLocation, Value, decode_at};

use crate::debugger::{Debugger, VmView};
use crate::linker::{CommandContext, Executable};

/// Limits for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Deepest allowed command nesting, root frame included.
    pub max_frames: usize,
    /// Stop after this many instructions. Test harnesses use it to bound
    /// scripts that would never finish.
    pub instruction_limit: Option<u64>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            max_frames: 1024,
            instruction_limit: None,
        }
    }
}

/// One running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Where execution resumes in this frame. For the innermost frame of a
    /// failed run this is the end of the failing instruction.
    pub code_index: usize,
    /// Stack index of local slot 0.
    pub stack_base: usize,
    /// Definition index of the command, `None` for the root frame.
    pub command: Option<u16>,
    tuple_base: usize,
    debug_base: usize,
}

/// Visible locals of one scope, recorded only while a debugger is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugFrame {
    pub variables: Vec<VariableInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub stack_index: usize,
}

#[derive(Debug, Clone, Copy)]
struct Input {
    start: usize,
    len: usize,
}

/// Cursor over a `foreach` iterable that stays on the stack while the
/// loop runs.
#[derive(Debug, Clone, Copy)]
struct Iteration {
    /// Index of the iterable in `tuple_sizes`.
    tuple: usize,
    start: usize,
    taken: usize,
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    /// A native command reported an error.
    CommandFailed { command: String, message: String },
    /// A call site has no linked callback.
    MissingCommandInstance { instance: u16 },
    MalformedBytecode { reason: String },
    StackOverflow { depth: usize },
    InstructionLimitExceeded { limit: u64 },
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandFailed { command, message } => write!(f, "`{command}` failed: {message}"),
            Self::MissingCommandInstance { instance } => {
                write!(f, "no command is linked for call site #{instance}")
            }
            Self::MalformedBytecode { reason } => write!(f, "malformed bytecode: {reason}"),
            Self::StackOverflow { depth } => write!(f, "stack overflow ({depth} frames)"),
            Self::InstructionLimitExceeded { limit } => {
                write!(f, "instruction limit of {limit} exceeded")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    /// Byte offset of the failing instruction.
    pub instruction_index: usize,
    pub location: SourceLocation,
}

impl RuntimeError {
    /// `error: message` followed by the highlighted location.
    pub fn render(&self, assembly: &Assembly) -> String {
        format!("error: {}\n{}", self.kind, assembly.highlight(self.location))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {:04})", self.kind, self.instruction_index)
    }
}

impl std::error::Error for RuntimeError {}

fn malformed(reason: impl Into<String>) -> RuntimeErrorKind {
    RuntimeErrorKind::MalformedBytecode {
        reason: reason.into(),
    }
}

enum Flow {
    Continue,
    Finish(Vec<Value>),
}

// ═══════════════════════════════════════════════════════════════════
// Vm
// ═══════════════════════════════════════════════════════════════════

pub struct Vm<'d> {
    options: ExecuteOptions,
    stack: Vec<Value>,
    tuple_sizes: Vec<usize>,
    inputs: Vec<Input>,
    frames: Vec<StackFrame>,
    debug_frames: Vec<DebugFrame>,
    /// Active `foreach` loops, innermost last.
    iterations: Vec<Iteration>,
    /// Reused buffer for native command arguments.
    scratch: Vec<Value>,
    debugger: Option<&'d mut dyn Debugger>,
    /// Offset of the instruction being executed.
    ip: usize,
    executed: u64,
}

impl<'d> Vm<'d> {
    pub fn new(options: ExecuteOptions) -> Self {
        Self {
            options,
            stack: Vec::with_capacity(256),
            tuple_sizes: Vec::with_capacity(64),
            inputs: Vec::new(),
            frames: Vec::new(),
            debug_frames: Vec::new(),
            iterations: Vec::new(),
            scratch: Vec::new(),
            debugger: None,
            ip: 0,
            executed: 0,
        }
    }

    pub fn with_debugger(mut self, debugger: &'d mut dyn Debugger) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<StackFrame> {
        self.frames
    }

    /// Instructions executed by the last run.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Run `executable` from its first instruction with `args` as the root
    /// input. On failure the frame stack is left as it was.
    pub fn run(
        &mut self,
        executable: &mut Executable,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, RuntimeError> {
        let assembly = Arc::clone(executable.assembly());
        self.reset();

        let argc = args.len();
        self.stack.extend(args);
        self.inputs.push(Input { start: 0, len: argc });
        self.frames.push(StackFrame {
            code_index: 0,
            stack_base: argc,
            command: None,
            tuple_base: 0,
            debug_base: 0,
        });

        log::debug!("executing {} with {argc} argument(s)", assembly.uri);
        if let Some(debugger) = self.debugger.as_deref_mut() {
            debugger.on_begin(&VmView {
                assembly: &assembly,
                stack: &self.stack,
                frames: &self.frames,
                debug_frames: &self.debug_frames,
                location: assembly.location_at(0),
            });
        }

        let result = self.dispatch(&assembly, executable);

        if let Some(debugger) = self.debugger.as_deref_mut() {
            debugger.on_end(&VmView {
                assembly: &assembly,
                stack: &self.stack,
                frames: &self.frames,
                debug_frames: &self.debug_frames,
                location: assembly.location_at(self.ip),
            });
        }
        match &result {
            Ok(values) => log::debug!(
                "{} finished after {} instruction(s) with {} value(s)",
                assembly.uri,
                self.executed,
                values.len()
            ),
            Err(error) => log::debug!("{} failed: {error}", assembly.uri),
        }
        result
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.tuple_sizes.clear();
        self.inputs.clear();
        self.frames.clear();
        self.debug_frames.clear();
        self.iterations.clear();
        self.ip = 0;
        self.executed = 0;
    }

    fn dispatch(
        &mut self,
        assembly: &Assembly,
        executable: &mut Executable,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut next = 0;
        loop {
            self.ip = next;
            let step = match decode_at(&assembly.code, self.ip) {
                Ok((instruction, len)) => {
                    next = self.ip + len;
                    log::trace!("{:04} {instruction}", self.ip);
                    self.step(instruction, &mut next, assembly, executable)
                }
                Err(error) => Err(malformed(error.to_string())),
            };

            match step {
                Ok(Flow::Continue) => {}
                Ok(Flow::Finish(values)) => return Ok(values),
                Err(kind) => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.code_index = next;
                    }
                    return Err(RuntimeError {
                        kind,
                        instruction_index: self.ip,
                        location: assembly.location_at(self.ip),
                    });
                }
            }
        }
    }

    fn step(
        &mut self,
        instruction: Instruction,
        next: &mut usize,
        assembly: &Assembly,
        executable: &mut Executable,
    ) -> Result<Flow, RuntimeErrorKind> {
        self.executed += 1;
        if let Some(limit) = self.options.instruction_limit {
            if self.executed > limit {
                return Err(RuntimeErrorKind::InstructionLimitExceeded { limit });
            }
        }

        match instruction {
            Instruction::Halt => {
                self.frames.clear();
                self.inputs.clear();
                return Ok(Flow::Finish(Vec::new()));
            }
            Instruction::ExecuteNativeCommand { instance } => {
                self.execute_native(instance, executable)?;
            }
            Instruction::ExecuteCommand { definition } => {
                *next = self.call(definition, *next, assembly)?;
            }
            Instruction::Return => {
                return match self.return_from()? {
                    Some(resume) => {
                        *next = resume;
                        Ok(Flow::Continue)
                    }
                    None => Ok(Flow::Finish(std::mem::take(&mut self.stack))),
                };
            }
            Instruction::PushEmptyTuple => self.tuple_sizes.push(0),
            Instruction::PopTupleKeeping { count } => {
                let size = self.pop_size()?;
                let count = usize::from(count);
                if size > count {
                    self.stack.truncate(self.stack.len() - (size - count));
                } else {
                    self.stack.resize(self.stack.len() + (count - size), Value::Null);
                }
            }
            Instruction::MergeTuple => {
                let right = self.pop_size()?;
                let left = self.pop_size()?;
                self.tuple_sizes.push(left + right);
            }
            Instruction::Pop => {
                self.stack.pop().ok_or_else(|| malformed("pop on empty stack"))?;
            }
            Instruction::PushFalse => self.push_single(Value::False),
            Instruction::PushTrue => self.push_single(Value::True),
            Instruction::PushLiteral { literal } => {
                let value = assembly
                    .literals
                    .get(usize::from(literal))
                    .cloned()
                    .ok_or_else(|| malformed(format!("no literal #{literal}")))?;
                self.push_single(value);
            }
            Instruction::SetLocal { slot } => {
                let value = self
                    .stack
                    .pop()
                    .ok_or_else(|| malformed("set local from empty stack"))?;
                let index = self.slot_index(slot)?;
                *self
                    .stack
                    .get_mut(index)
                    .ok_or_else(|| malformed(format!("no local slot {slot}")))? = value;
            }
            Instruction::PushLocal { slot } => {
                let index = self.slot_index(slot)?;
                let value = self
                    .stack
                    .get(index)
                    .cloned()
                    .ok_or_else(|| malformed(format!("no local slot {slot}")))?;
                self.push_single(value);
            }
            Instruction::PushInput => {
                let input = *self
                    .inputs
                    .last()
                    .ok_or_else(|| malformed("no input outside a frame"))?;
                self.stack.extend_from_within(input.start..input.start + input.len);
                self.tuple_sizes.push(input.len);
            }
            Instruction::JumpBackward { offset } => {
                *next = next
                    .checked_sub(usize::from(offset))
                    .ok_or_else(|| malformed("jump before start of code"))?;
            }
            Instruction::JumpForward { offset } => *next += usize::from(offset),
            Instruction::IfConditionJump { offset } => {
                let size = self.pop_size()?;
                let start = self.stack.len() - size;
                let truthy = self.stack[start..].iter().all(Value::is_truthy);
                self.stack.truncate(start);
                if !truthy {
                    *next += usize::from(offset);
                }
            }
            Instruction::ForEachConditionJump { slot, offset } => {
                let tuple = self
                    .tuple_sizes
                    .len()
                    .checked_sub(1)
                    .ok_or_else(|| malformed("foreach without a tuple"))?;
                let size = self.tuple_sizes[tuple];
                if size > self.stack.len() {
                    return Err(malformed("tuple larger than the stack"));
                }
                let start = self.stack.len() - size;
                let resumed = self
                    .iterations
                    .last()
                    .is_some_and(|it| it.tuple == tuple && it.start == start);
                if !resumed {
                    self.iterations.push(Iteration {
                        tuple,
                        start,
                        taken: 0,
                    });
                }
                let Some(iteration) = self.iterations.last_mut() else {
                    return Err(malformed("foreach without a cursor"));
                };

                if iteration.taken == size {
                    self.iterations.pop();
                    self.tuple_sizes.pop();
                    self.stack.truncate(start);
                    *next += usize::from(offset);
                } else {
                    let value = self.stack[start + iteration.taken].clone();
                    iteration.taken += 1;
                    let index = self.slot_index(slot)?;
                    *self
                        .stack
                        .get_mut(index)
                        .ok_or_else(|| malformed(format!("no loop slot {slot}")))? = value;
                }
            }
            Instruction::DebugHook => {
                if let Some(debugger) = self.debugger.as_deref_mut() {
                    debugger.on_hook(&VmView {
                        assembly,
                        stack: &self.stack,
                        frames: &self.frames,
                        debug_frames: &self.debug_frames,
                        location: assembly.location_at(self.ip),
                    });
                }
            }
            Instruction::DebugPushDebugFrame => {
                if self.debugger.is_some() {
                    self.debug_frames.push(DebugFrame::default());
                }
            }
            Instruction::DebugPopDebugFrame => {
                if self.debugger.is_some() {
                    self.debug_frames.pop();
                }
            }
            Instruction::DebugPushVariableInfo { slot } => {
                if self.debugger.is_some() {
                    let stack_index = self.slot_index(slot)?;
                    let name = assembly.text_at(assembly.location_at(self.ip)).to_string();
                    if let Some(frame) = self.debug_frames.last_mut() {
                        match frame.variables.iter_mut().find(|v| v.stack_index == stack_index) {
                            Some(existing) => existing.name = name,
                            None => frame.variables.push(VariableInfo { name, stack_index }),
                        }
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    // ── helpers ────────────────────────────────────────────────────

    fn push_single(&mut self, value: Value) {
        self.stack.push(value);
        self.tuple_sizes.push(1);
    }

    fn pop_size(&mut self) -> Result<usize, RuntimeErrorKind> {
        let size = self
            .tuple_sizes
            .pop()
            .ok_or_else(|| malformed("no tuple on the stack"))?;
        if size > self.stack.len() {
            return Err(malformed("tuple larger than the stack"));
        }
        Ok(size)
    }

    fn slot_index(&self, slot: u8) -> Result<usize, RuntimeErrorKind> {
        self.frames
            .last()
            .map(|frame| frame.stack_base + usize::from(slot))
            .ok_or_else(|| malformed("local access without a frame"))
    }

    /// Enter a script command. Returns the callee's entry offset.
    fn call(
        &mut self,
        definition: u16,
        resume: usize,
        assembly: &Assembly,
    ) -> Result<usize, RuntimeErrorKind> {
        let command = assembly
            .commands
            .get(usize::from(definition))
            .ok_or_else(|| malformed(format!("no command #{definition}")))?;
        let size = self.pop_size()?;
        let parameters = usize::from(command.parameter_count);
        if size < parameters {
            return Err(malformed(format!(
                "`{}` needs {parameters} argument(s), tuple has {size} value(s)",
                command.name
            )));
        }
        if self.frames.len() >= self.options.max_frames {
            return Err(RuntimeErrorKind::StackOverflow {
                depth: self.frames.len(),
            });
        }

        let start = self.stack.len() - size;
        let input_count = size - parameters;
        self.inputs.push(Input {
            start,
            len: input_count,
        });
        if let Some(caller) = self.frames.last_mut() {
            caller.code_index = resume;
        }
        self.frames.push(StackFrame {
            code_index: command.entry,
            stack_base: start + input_count,
            command: Some(definition),
            tuple_base: self.tuple_sizes.len(),
            debug_base: self.debug_frames.len(),
        });
        Ok(command.entry)
    }

    /// Leave the innermost frame. Returns the caller's resume offset, or
    /// `None` when the root frame returned and the stack holds the result.
    fn return_from(&mut self) -> Result<Option<usize>, RuntimeErrorKind> {
        let size = self.pop_size()?;
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| malformed("return without a frame"))?;
        let input = self
            .inputs
            .pop()
            .ok_or_else(|| malformed("return without an input"))?;

        let result_start = self.stack.len() - size;
        if input.start > result_start {
            return Err(malformed("return tuple overlaps the caller"));
        }
        self.stack.drain(input.start..result_start);
        self.tuple_sizes.truncate(frame.tuple_base);
        self.debug_frames.truncate(frame.debug_base);
        self.iterations.retain(|it| it.tuple < frame.tuple_base);

        match self.frames.last() {
            Some(caller) => {
                self.tuple_sizes.push(size);
                Ok(Some(caller.code_index))
            }
            None => Ok(None),
        }
    }

    fn execute_native(
        &mut self,
        instance: u16,
        executable: &mut Executable,
    ) -> Result<(), RuntimeErrorKind> {
        let bound = executable
            .command_mut(instance)
            .ok_or(RuntimeErrorKind::MissingCommandInstance { instance })?;
        let size = self.pop_size()?;
        let parameters = usize::from(bound.parameter_count);
        if size < parameters {
            return Err(malformed(format!(
                "`{}` needs {parameters} argument(s), tuple has {size} value(s)",
                bound.name
            )));
        }

        let start = self.stack.len() - size;
        self.scratch.clear();
        self.scratch.extend(self.stack.drain(start..));

        let mut ctx = CommandContext::new(&self.scratch, size - parameters, &mut self.stack);
        bound.command.call(&mut ctx);
        let pushed = ctx.pushed();
        if let Some(message) = ctx.take_error() {
            return Err(RuntimeErrorKind::CommandFailed {
                command: bound.name.clone(),
                message,
            });
        }
        self.tuple_sizes.push(pushed);
        Ok(())
    }
}

/// One line per frame, innermost first: `at NAME (uri:line:column)`.
pub fn render_call_stack(assembly: &Assembly, frames: &[StackFrame]) -> String {
    let mut out = String::new();
    for frame in frames.iter().rev() {
        let name = frame
            .command
            .and_then(|index| assembly.commands.get(usize::from(index)))
            .map_or("<root>", |command| command.name.as_str());
        let location = assembly.location_at(frame.code_index.saturating_sub(1));
        out.push_str(&format!("  at {name} ({})\n", assembly.describe(location)));
    }
    out
}

#[cfg(test)]
mod tests {
    use bytecode::BytecodeBuilder;

    use super::*;
    use crate::compiler::{CompileOptions, compile};
    use crate::library::Library;
    use crate::linker::{CommandRegistry, link};

    fn assemble(literals: &[Value], build: impl FnOnce(&mut BytecodeBuilder)) -> Assembly {
        let mut assembly = Assembly::new("test");
        for literal in literals {
            assembly.add_literal(literal.clone());
        }
        let mut builder = BytecodeBuilder::new();
        build(&mut builder);
        let (code, locations) = builder.into_parts();
        assembly.code = code;
        assembly.locations = locations;
        assembly
    }

    fn run_with(
        assembly: Assembly,
        args: Vec<Value>,
        options: ExecuteOptions,
    ) -> (Result<Vec<Value>, RuntimeError>, Vec<StackFrame>) {
        let mut executable = link(Arc::new(assembly), &Library::new(), &CommandRegistry::new())
            .expect("nothing to link");
        let mut vm = Vm::new(options);
        let result = vm.run(&mut executable, args);
        (result, vm.into_frames())
    }

    fn run(assembly: Assembly) -> Result<Vec<Value>, RuntimeError> {
        run_with(assembly, Vec::new(), ExecuteOptions::default()).0
    }

    fn run_source(source: &str) -> Result<Vec<Value>, RuntimeError> {
        let (errors, assembly) = compile(source, &CompileOptions::default());
        assert!(errors.is_empty(), "{errors:?}");
        let options = ExecuteOptions {
            instruction_limit: Some(10_000),
            ..ExecuteOptions::default()
        };
        run_with(assembly, Vec::new(), options).0
    }

    fn ints(values: &[i32]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn execution_advances_past_each_instruction() {
        assert_eq!(run_source("return 1, 2;"), Ok(ints(&[1, 2])));
        assert_eq!(run_source("1, 2, 3 | $a, $b; return $b, $a;"), Ok(ints(&[2, 1])));
    }

    #[test]
    fn foreach_visits_elements_in_order() {
        let source = "\
            0 | $a, $b, $c; \
            foreach $x in 1, 2, 3 { $b, $c, $x | $a, $b, $c; } \
            return $a, $b, $c;";
        assert_eq!(run_source(source), Ok(ints(&[1, 2, 3])));
    }

    #[test]
    fn sibling_loops_start_fresh() {
        let source = "\
            0 | $a, $b, $c, $d; \
            foreach $x in 1, 2 { $b, $c, $d, $x | $a, $b, $c, $d; } \
            foreach $y in 3, 4 { $b, $c, $d, $y | $a, $b, $c, $d; } \
            return $a, $b, $c, $d;";
        assert_eq!(run_source(source), Ok(ints(&[1, 2, 3, 4])));
    }

    #[test]
    fn returning_from_a_loop_forgets_its_cursor() {
        // Both calls see the iterable at the same stack position.
        let source = "\
            command first { foreach $x in $$ { return $x; } return 0; } \
            0 | $a, $b; \
            { 1, 2 | first | $t; $t | $a; } \
            { 3, 4 | first | $t; $t | $b; } \
            return $a, $b;";
        assert_eq!(run_source(source), Ok(ints(&[1, 3])));
    }

    #[test]
    fn inner_loops_restart_on_every_outer_pass() {
        let source = "\
            0 | $a, $b, $c, $d; \
            foreach $x in 1, 2 { foreach $y in 10, 20 { $c, $d, $x, $y | $a, $b, $c, $d; } } \
            return $a, $b, $c, $d;";
        assert_eq!(run_source(source), Ok(ints(&[2, 10, 2, 20])));
    }

    #[test]
    fn keeping_more_than_produced_pads_with_null() {
        let assembly = assemble(&[Value::Int(1)], |b| {
            b.push_literal(0);
            b.pop_tuple_keeping(3);
            b.push_local(2);
            b.push_local(0);
            b.merge_tuple();
            b.return_();
        });
        assert_eq!(run(assembly), Ok(vec![Value::Null, Value::Int(1)]));
    }

    #[test]
    fn keeping_fewer_keeps_the_first_values() {
        let assembly = assemble(&[Value::Int(1), Value::Int(2)], |b| {
            b.push_literal(0);
            b.push_literal(1);
            b.merge_tuple();
            b.pop_tuple_keeping(1);
            b.push_local(0);
            b.return_();
        });
        assert_eq!(run(assembly), Ok(vec![Value::Int(1)]));
    }

    #[test]
    fn root_input_is_the_argument_tuple() {
        let assembly = assemble(&[], |b| {
            b.push_input();
            b.return_();
        });
        let (result, frames) = run_with(
            assembly,
            vec![Value::Int(7), Value::Int(8)],
            ExecuteOptions::default(),
        );
        assert_eq!(result, Ok(vec![Value::Int(7), Value::Int(8)]));
        assert!(frames.is_empty());
    }

    #[test]
    fn halt_ends_with_an_empty_result() {
        let assembly = assemble(&[], |b| b.halt());
        let (result, frames) = run_with(assembly, Vec::new(), ExecuteOptions::default());
        assert_eq!(result, Ok(Vec::new()));
        assert!(frames.is_empty());
    }

    #[test]
    fn bad_literal_index_is_malformed() {
        let assembly = assemble(&[], |b| b.push_literal(9));
        let error = run(assembly).expect_err("no literal 9");
        assert!(matches!(error.kind, RuntimeErrorKind::MalformedBytecode { .. }));
        assert_eq!(error.instruction_index, 0);
    }

    #[test]
    fn unknown_opcode_is_malformed() {
        let mut assembly = Assembly::new("test");
        assembly.code = vec![0xFF];
        let error = run(assembly).expect_err("not an opcode");
        assert!(matches!(error.kind, RuntimeErrorKind::MalformedBytecode { .. }));
    }

    #[test]
    fn instruction_limit_stops_endless_loops() {
        let assembly = assemble(&[], |b| {
            b.jump_backward(0).expect("short jump");
        });
        let options = ExecuteOptions {
            instruction_limit: Some(100),
            ..ExecuteOptions::default()
        };
        let (result, frames) = run_with(assembly, Vec::new(), options);
        assert_eq!(
            result.map_err(|e| e.kind),
            Err(RuntimeErrorKind::InstructionLimitExceeded { limit: 100 })
        );
        assert_eq!(frames.len(), 1);
    }
}
