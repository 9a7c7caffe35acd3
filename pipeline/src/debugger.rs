//! Hooks for attaching a debugger to a [`Vm`](crate::vm::Vm).
//!
//! Only assemblies compiled in [`Mode::Debug`](crate::Mode::Debug) carry the
//! instructions that reach these hooks. A [`PausingDebugger`] suspends the
//! executing thread in [`Debugger::on_hook`] until another thread resumes
//! or steps it through the shared [`DebugControl`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytecode::{Assembly, SourceLocation, Value};
use parking_lot::{Condvar, Mutex};

use crate::vm::{DebugFrame, StackFrame};

/// A consistent snapshot of VM state, valid for the duration of a callback.
#[derive(Debug, Clone, Copy)]
pub struct VmView<'a> {
    pub assembly: &'a Assembly,
    pub stack: &'a [Value],
    pub frames: &'a [StackFrame],
    pub debug_frames: &'a [DebugFrame],
    /// Source of the instruction about to run.
    pub location: SourceLocation,
}

impl<'a> VmView<'a> {
    /// 1-based line of the current location.
    pub fn line(&self) -> usize {
        self.assembly
            .source_of(self.location)
            .map_or(0, |source| self.location.slice.line_column(&source.text).0)
    }

    /// Every variable in scope, outermost first, with its current value.
    pub fn variables(&self) -> Vec<(&'a str, &'a Value)> {
        let stack = self.stack;
        self.debug_frames
            .iter()
            .flat_map(|frame| frame.variables.iter())
            .filter_map(|variable| {
                let value = stack.get(variable.stack_index)?;
                Some((variable.name.as_str(), value))
            })
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<&'a Value> {
        self.variables()
            .into_iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value)
    }
}

/// Callbacks around a run. `on_hook` fires at every statement.
pub trait Debugger {
    fn on_begin(&mut self, _vm: &VmView<'_>) {}

    fn on_hook(&mut self, vm: &VmView<'_>);

    fn on_end(&mut self, _vm: &VmView<'_>) {}
}

// ── Suspend / resume ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    /// Run to the next hook, then pause.
    Stepping,
}

#[derive(Debug)]
struct ControlState {
    run: RunState,
    /// The VM thread is blocked in a hook.
    parked: bool,
    paused_at: Option<SourceLocation>,
}

/// Shared between the VM thread and whoever drives it.
#[derive(Debug)]
pub struct DebugControl {
    state: Mutex<ControlState>,
    signal: Condvar,
}

impl Default for DebugControl {
    fn default() -> Self {
        Self::new(RunState::Running)
    }
}

impl DebugControl {
    pub fn new(run: RunState) -> Self {
        Self {
            state: Mutex::new(ControlState {
                run,
                parked: false,
                paused_at: None,
            }),
            signal: Condvar::new(),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.state.lock().run
    }

    /// Where the VM is parked, if it is.
    pub fn paused_at(&self) -> Option<SourceLocation> {
        let state = self.state.lock();
        if state.parked { state.paused_at } else { None }
    }

    /// Stop at the next hook.
    pub fn pause(&self) {
        self.state.lock().run = RunState::Paused;
    }

    pub fn resume(&self) {
        self.release(RunState::Running);
    }

    pub fn step(&self) {
        self.release(RunState::Stepping);
    }

    fn release(&self, run: RunState) {
        let mut state = self.state.lock();
        state.run = run;
        state.parked = false;
        self.signal.notify_all();
    }

    /// Block until the VM parks or `timeout` passes. Returns whether it
    /// parked.
    pub fn wait_until_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.parked {
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                return state.parked;
            }
        }
        true
    }

    /// Called on the VM thread at a hook.
    fn park(&self, location: SourceLocation) {
        let mut state = self.state.lock();
        if state.run == RunState::Stepping {
            state.run = RunState::Paused;
        }
        while state.run == RunState::Paused {
            state.parked = true;
            state.paused_at = Some(location);
            self.signal.notify_all();
            self.signal.wait(&mut state);
        }
        state.parked = false;
    }
}

/// Parks the VM thread whenever its [`DebugControl`] says so.
#[derive(Debug, Clone)]
pub struct PausingDebugger {
    control: Arc<DebugControl>,
    hooks: usize,
}

impl PausingDebugger {
    pub fn new(control: Arc<DebugControl>) -> Self {
        Self { control, hooks: 0 }
    }

    /// Hooks reached so far.
    pub fn hooks(&self) -> usize {
        self.hooks
    }
}

impl Debugger for PausingDebugger {
    fn on_hook(&mut self, vm: &VmView<'_>) {
        self.hooks += 1;
        log::trace!("hook {} at line {}", self.hooks, vm.line());
        self.control.park(vm.location);
    }
}
