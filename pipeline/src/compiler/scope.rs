use bytecode::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Normal,
    /// The body of a `foreach`, which also holds the loop variable.
    IterationBody,
    /// The body of a command. Its locals vanish with the frame on `Return`,
    /// so closing it emits no pops.
    CommandBody,
}

#[derive(Debug, Clone, Copy)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Index into the variable list where this scope's locals start.
    pub variables_start: usize,
}

/// Read/write tracking for the unused-variable diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableState {
    /// Declared but nothing stored yet.
    Unwritten,
    /// Stored but never read.
    NotRead,
    Fulfilled,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub location: SourceLocation,
    pub state: VariableState,
}

impl Variable {
    pub fn new(name: &str, location: SourceLocation) -> Self {
        Self {
            name: name.to_string(),
            location,
            state: VariableState::Unwritten,
        }
    }

    pub fn mark_written(&mut self) {
        if self.state == VariableState::Unwritten {
            self.state = VariableState::NotRead;
        }
    }

    pub fn mark_read(&mut self) {
        self.state = VariableState::Fulfilled;
    }

    /// `$_name` locals are allowed to go unread.
    pub fn is_exempt(&self) -> bool {
        self.name.starts_with("$_")
    }
}

/// Slots set aside by the outermost `foreach` of a command.
///
/// While a loop runs, its iterable sits on the stack above the locals, so
/// locals declared inside the loop cannot be pushed in place. The loop
/// instead reserves one slot per local it will ever hold at once, before
/// evaluating the iterable, and every declaration in the loop (nested loops
/// included) stores into those slots.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    /// Variable index of the first reserved slot.
    pub variables_start: usize,
    /// Most variables alive at once since the reservation began.
    pub peak: usize,
    /// Position of the `PopTupleKeeping` count operand to patch.
    pub patch_position: usize,
}
