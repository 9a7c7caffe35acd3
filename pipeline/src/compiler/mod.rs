//! Single-pass compiler from source text to an [`Assembly`].
//!
//! There is no syntax tree. The [`controller`] drives the parser and emits
//! bytecode from its rule callbacks through a [`CompilerCore`], which owns
//! everything that outlives one source: the assembly under construction,
//! scopes and variables, and the error list. Imported sources get their own
//! controller over the same core.

mod controller;
mod error;
mod scope;

use std::collections::HashSet;

use bytecode::{
    Assembly, BytecodeBuilder, JumpTooFar, Label, Source, SourceLocation, Value,
};

use crate::library::{Library, SourceLoader};

use controller::Controller;
pub use error::{CompileError, CompileErrorReason, Severity};
use scope::{Reservation, Scope, ScopeKind, Variable, VariableState};

/// Whether `Debug*` instructions are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Debug,
    #[default]
    Release,
}

/// Inputs to [`compile`].
#[derive(Clone, Copy)]
pub struct CompileOptions<'a> {
    /// URI of the main source; it also counts as already imported.
    pub uri: &'a str,
    pub mode: Mode,
    /// Resolves imports that are not in `library` to source text.
    pub loader: Option<&'a dyn SourceLoader>,
    /// Compiled assemblies imports may bind to as dependencies.
    pub library: Option<&'a Library>,
}

impl Default for CompileOptions<'_> {
    fn default() -> Self {
        Self {
            uri: "main",
            mode: Mode::Release,
            loader: None,
            library: None,
        }
    }
}

/// Compile `source` into an assembly.
///
/// Never fails outright: errors are collected and returned next to the
/// assembly, which is only meaningful when the list is empty.
pub fn compile(source: &str, options: &CompileOptions<'_>) -> (Vec<CompileError>, Assembly) {
    log::debug!("compiling {} ({:?})", options.uri, options.mode);

    let mut core = CompilerCore::new(options);
    core.imported.insert(options.uri.to_string());
    let index = core.add_source(options.uri, source);

    core.begin_scope(ScopeKind::Normal);
    Controller::new(&mut core, source, index, false).compile_declarations();
    core.end_scope();
    core.builder.halt();

    let (errors, assembly) = core.finish();
    log::debug!(
        "compiled {}: {} bytes, {} error(s)",
        assembly.uri,
        assembly.code.len(),
        errors.len()
    );
    (errors, assembly)
}

/// What resolving a variable name found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Local(usize),
    /// Declared outside the current command; already reported.
    OutsideCommand,
    Missing,
}

/// Command-local state saved while a command body is compiled.
struct CommandState {
    command_base: usize,
    reservations: Vec<Reservation>,
}

pub(crate) struct CompilerCore<'o> {
    mode: Mode,
    assembly: Assembly,
    builder: BytecodeBuilder,
    errors: Vec<CompileError>,
    panic_mode: bool,
    scopes: Vec<Scope>,
    variables: Vec<Variable>,
    /// Variable index where the current command's locals start.
    command_base: usize,
    reservations: Vec<Reservation>,
    imported: HashSet<String>,
    loader: Option<&'o dyn SourceLoader>,
    library: Option<&'o Library>,
}

impl<'o> CompilerCore<'o> {
    fn new(options: &CompileOptions<'o>) -> Self {
        Self {
            mode: options.mode,
            assembly: Assembly::new(options.uri),
            builder: BytecodeBuilder::new(),
            errors: Vec::new(),
            panic_mode: false,
            scopes: Vec::new(),
            variables: Vec::new(),
            command_base: 0,
            reservations: Vec::new(),
            imported: HashSet::new(),
            loader: options.loader,
            library: options.library,
        }
    }

    fn finish(mut self) -> (Vec<CompileError>, Assembly) {
        let (code, locations) = self.builder.into_parts();
        self.assembly.code = code;
        self.assembly.locations = locations;
        (self.errors, self.assembly)
    }

    fn add_source(&mut self, uri: &str, text: &str) -> u16 {
        let index = u16::try_from(self.assembly.sources.len()).unwrap_or(u16::MAX);
        self.assembly.sources.push(Source::new(uri, text));
        index
    }

    // ── errors ─────────────────────────────────────────────────────

    fn error(&mut self, reason: CompileErrorReason, severity: Severity, location: SourceLocation) {
        if self.panic_mode {
            return;
        }
        if severity == Severity::Hard {
            self.panic_mode = true;
        }
        self.errors.push(CompileError {
            reason,
            severity,
            location,
        });
    }

    fn soft(&mut self, reason: CompileErrorReason, location: SourceLocation) {
        self.error(reason, Severity::Soft, location);
    }

    fn hard(&mut self, reason: CompileErrorReason, location: SourceLocation) {
        self.error(reason, Severity::Hard, location);
    }

    // ── emission helpers ───────────────────────────────────────────

    fn debug_enabled(&self) -> bool {
        self.mode == Mode::Debug
    }

    fn debug_hook(&mut self) {
        if self.debug_enabled() {
            self.builder.debug_hook();
        }
    }

    fn push_literal(&mut self, value: Value) {
        match self.assembly.add_literal(value) {
            Some(index) => self.builder.push_literal(index),
            None => {
                self.soft(CompileErrorReason::TooManyLiterals, self.builder.location());
                self.builder.push_literal(0);
            }
        }
    }

    fn report_jump(&mut self, result: Result<(), JumpTooFar>) {
        if let Err(JumpTooFar { distance }) = result {
            log::debug!("jump of {distance} bytes does not fit");
            self.soft(CompileErrorReason::JumpTooFar, self.builder.location());
        }
    }

    fn bind(&mut self, label: Label) {
        let result = self.builder.bind(label);
        self.report_jump(result);
    }

    fn jump_backward(&mut self, target: usize) {
        let result = self.builder.jump_backward(target);
        self.report_jump(result);
    }

    // ── scopes ─────────────────────────────────────────────────────

    fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    fn begin_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            variables_start: self.variables.len(),
        });
        if self.debug_enabled() {
            self.builder.debug_push_debug_frame();
        }
    }

    /// Close the innermost scope: report unused locals and drop them.
    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };

        let closing = self.variables.split_off(scope.variables_start);
        for variable in &closing {
            let reason = match variable.state {
                VariableState::NotRead if !variable.is_exempt() => {
                    CompileErrorReason::UnreadVariable {
                        name: variable.name.clone(),
                    }
                }
                VariableState::Unwritten => CompileErrorReason::UnwrittenVariable {
                    name: variable.name.clone(),
                },
                _ => continue,
            };
            self.soft(reason, variable.location);
        }

        if scope.kind == ScopeKind::CommandBody {
            return;
        }
        if self.debug_enabled() {
            self.builder.debug_pop_debug_frame();
        }
        if self.reservations.is_empty() {
            for _ in &closing {
                self.builder.pop();
            }
        }
    }

    /// Enter a command body. Locals declared before it become unreachable
    /// and any loop reservation belongs to the enclosing code.
    fn begin_command(&mut self) -> CommandState {
        let saved = CommandState {
            command_base: self.command_base,
            reservations: std::mem::take(&mut self.reservations),
        };
        self.command_base = self.variables.len();
        saved
    }

    fn end_command(&mut self, saved: CommandState) {
        self.command_base = saved.command_base;
        self.reservations = saved.reservations;
    }

    // ── variables ──────────────────────────────────────────────────

    fn is_reserving(&self) -> bool {
        !self.reservations.is_empty()
    }

    /// Declare a local in the innermost scope and return its slot.
    fn add_variable(&mut self, name: &str, location: SourceLocation) -> u8 {
        self.variables.push(Variable::new(name, location));
        let index = self.variables.len() - 1;

        if let Some(reservation) = self.reservations.first_mut() {
            reservation.peak = reservation
                .peak
                .max(self.variables.len() - reservation.variables_start);
        }

        let slot = self.slot_of(index).unwrap_or_else(|| {
            self.soft(CompileErrorReason::TooManyLocals, location);
            u8::MAX
        });
        if self.debug_enabled() {
            let saved = self.builder.location();
            self.builder.set_location(location);
            self.builder.debug_push_variable_info(slot);
            self.builder.set_location(saved);
        }
        slot
    }

    fn slot_of(&self, index: usize) -> Option<u8> {
        u8::try_from(index - self.command_base).ok()
    }

    fn mark_written(&mut self, index: usize) {
        if let Some(variable) = self.variables.get_mut(index) {
            variable.mark_written();
        }
    }

    fn mark_last_written(&mut self, count: usize) {
        let start = self.variables.len().saturating_sub(count);
        for variable in &mut self.variables[start..] {
            variable.mark_written();
        }
    }

    /// Find `name` innermost-first. A hit below the current command's base
    /// is a hard error: command bodies do not capture enclosing locals.
    fn resolve_variable(&mut self, name: &str, location: SourceLocation) -> Resolution {
        let Some(index) = self.variables.iter().rposition(|v| v.name == name) else {
            return Resolution::Missing;
        };
        if index < self.command_base {
            self.hard(
                CompileErrorReason::VariableOutsideCommandScope {
                    name: name.to_string(),
                },
                location,
            );
            return Resolution::OutsideCommand;
        }
        Resolution::Local(index)
    }

    /// Reserve loop slots unless an enclosing loop of this command already
    /// did. Returns whether this loop owns the reservation.
    fn begin_reservation(&mut self) -> bool {
        if self.is_reserving() {
            return false;
        }
        self.builder.push_empty_tuple();
        let patch_position = self.builder.pop_tuple_keeping(0);
        self.reservations.push(Reservation {
            variables_start: self.variables.len(),
            peak: 0,
            patch_position,
        });
        true
    }

    fn end_reservation(&mut self) {
        let Some(reservation) = self.reservations.pop() else {
            return;
        };
        let count = u8::try_from(reservation.peak).unwrap_or(u8::MAX);
        self.builder.patch_u8(reservation.patch_position, count);
        for _ in 0..count {
            self.builder.pop();
        }
    }

    // ── commands ───────────────────────────────────────────────────

    /// Whether `name` is already a command or external command here.
    fn name_taken(&self, name: &str) -> bool {
        self.assembly.find_command(name).is_some()
            || self.assembly.find_external_command(name).is_some()
    }

    /// Look up an external command: declared in this assembly first, then
    /// in each dependency in import order. Returns
    /// `(source_index, definition_index, parameter_count)`.
    fn resolve_external(&self, name: &str) -> Option<(u16, u16, u8)> {
        if let Some(index) = self.assembly.find_external_command(name) {
            let definition = &self.assembly.external_commands[index];
            return Some((0, u16::try_from(index).ok()?, definition.parameter_count));
        }
        let library = self.library?;
        self.assembly
            .dependencies
            .iter()
            .enumerate()
            .find_map(|(i, uri)| {
                let dependency = library.get(uri)?;
                let index = dependency.find_external_command(name)?;
                let definition = &dependency.external_commands[index];
                Some((
                    u16::try_from(i + 1).ok()?,
                    u16::try_from(index).ok()?,
                    definition.parameter_count,
                ))
            })
    }
}
