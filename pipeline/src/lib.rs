//! # Pipeline
//!
//! An embeddable scripting language whose programs are pipelines: values
//! flow left to right through commands, every command returns a tuple, and
//! the host extends the language with native commands.
//!
//! ```text
//!  source ──compile──▶ Assembly ──link──▶ Executable ──execute──▶ tuple
//!              │                   ▲
//!              │                   │
//!         SourceLoader      CommandRegistry
//!           Library
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pipeline::{CommandRegistry, CompileOptions, Library, Value, compile, execute, link};
//!
//! let source = "external command double 0; return 21 | double;";
//! let (errors, assembly) = compile(source, &CompileOptions::default());
//! assert!(errors.is_empty());
//!
//! let mut registry = CommandRegistry::new();
//! registry
//!     .register_fn("double", 0, |ctx: &mut pipeline::CommandContext<'_>| {
//!         let n = ctx.input(0).and_then(Value::as_int).unwrap_or(0);
//!         ctx.push(n * 2);
//!     })
//!     .unwrap();
//!
//! let mut executable = link(Arc::new(assembly), &Library::new(), &registry).unwrap();
//! let (result, _frames) = execute(&mut executable, Vec::new());
//! assert_eq!(result, Ok(vec![Value::Int(42)]));
//! ```

pub mod compiler;
pub mod debugger;
pub mod library;
pub mod linker;
pub mod vm;

pub use bytecode::{Assembly, Object, SourceLocation, Value, ValueKind, disassemble};
pub use compiler::{CompileError, CompileErrorReason, CompileOptions, Mode, Severity, compile};
pub use debugger::{DebugControl, Debugger, PausingDebugger, RunState, VmView};
pub use library::{FileLoader, Library, MemoryLoader, SourceLoader};
pub use linker::{
    BoundCommand, CommandContext, CommandRegistry, Executable, LinkError, NativeCommand,
    RegistryError, link,
};
pub use vm::{ExecuteOptions, RuntimeError, RuntimeErrorKind, StackFrame, Vm, render_call_stack};

/// Run `executable` with default limits. Returns the result together with
/// the frame stack, which is empty on success and intact after a failure.
pub fn execute(
    executable: &mut Executable,
    args: Vec<Value>,
) -> (Result<Vec<Value>, RuntimeError>, Vec<StackFrame>) {
    execute_with(executable, args, &ExecuteOptions::default())
}

pub fn execute_with(
    executable: &mut Executable,
    args: Vec<Value>,
    options: &ExecuteOptions,
) -> (Result<Vec<Value>, RuntimeError>, Vec<StackFrame>) {
    let mut vm = Vm::new(options.clone());
    let result = vm.run(executable, args);
    (result, vm.into_frames())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    const PRELUDE: &str = "
        external command bypass 0;
        external command observe 0;
        external command increment 0;
        external command nothing 0;
        external command tag 1;
        external command fail 0;
    ";

    /// Host commands shared by the language tests. `observe` records each
    /// input tuple it receives; `increment` counts its calls.
    struct Host {
        registry: CommandRegistry,
        observed: Arc<Mutex<Vec<Vec<Value>>>>,
        increments: Arc<AtomicUsize>,
    }

    impl Host {
        fn new() -> Self {
            let observed = Arc::new(Mutex::new(Vec::new()));
            let increments = Arc::new(AtomicUsize::new(0));
            let mut registry = CommandRegistry::new();

            registry
                .register_fn("bypass", 0, |ctx: &mut CommandContext<'_>| {
                    for value in ctx.inputs().to_vec() {
                        ctx.push(value);
                    }
                })
                .expect("register bypass");

            let sink = Arc::clone(&observed);
            registry
                .register_fn("observe", 0, move |ctx: &mut CommandContext<'_>| {
                    sink.lock().push(ctx.inputs().to_vec());
                })
                .expect("register observe");

            let counter = Arc::clone(&increments);
            registry
                .register_fn("increment", 0, move |_: &mut CommandContext<'_>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .expect("register increment");

            registry
                .register_fn("nothing", 0, |_: &mut CommandContext<'_>| {})
                .expect("register nothing");

            registry
                .register_fn("tag", 1, |ctx: &mut CommandContext<'_>| {
                    let mut values = ctx.inputs().to_vec();
                    values.extend_from_slice(ctx.arguments());
                    for value in values {
                        ctx.push(value);
                    }
                })
                .expect("register tag");

            registry
                .register_fn("fail", 0, |ctx: &mut CommandContext<'_>| {
                    ctx.set_error("it broke");
                })
                .expect("register fail");

            Self {
                registry,
                observed,
                increments,
            }
        }

        fn executable(&self, source: &str) -> Executable {
            self.executable_in(source, Mode::Release)
        }

        fn executable_in(&self, source: &str, mode: Mode) -> Executable {
            let source = format!("{PRELUDE}{source}");
            let options = CompileOptions {
                mode,
                ..CompileOptions::default()
            };
            let (errors, assembly) = compile(&source, &options);
            assert!(errors.is_empty(), "{errors:?}");
            link(Arc::new(assembly), &Library::new(), &self.registry).expect("links")
        }

        fn run(&self, source: &str) -> Result<Vec<Value>, RuntimeError> {
            execute(&mut self.executable(source), Vec::new()).0
        }

        fn observed(&self) -> Vec<Vec<Value>> {
            self.observed.lock().clone()
        }

        fn increments(&self) -> usize {
            self.increments.load(Ordering::SeqCst)
        }
    }

    fn ints(values: &[i32]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    fn string(text: &str) -> Value {
        Value::from(text)
    }

    // ── Tuples ────────────────────────────────────────────────

    #[test]
    fn values_pass_through_a_bypass_unchanged() {
        let host = Host::new();
        host.run("1, \"two\", 3.5, true, false | bypass | observe;")
            .expect("runs");
        assert_eq!(
            host.observed(),
            vec![vec![
                Value::Int(1),
                string("two"),
                Value::Float(3.5),
                Value::True,
                Value::False,
            ]]
        );
    }

    #[test]
    fn arguments_follow_the_input() {
        let host = Host::new();
        host.run("1, 2 | tag \"x\" | observe;").expect("runs");
        assert_eq!(
            host.observed(),
            vec![vec![Value::Int(1), Value::Int(2), string("x")]]
        );
    }

    #[test]
    fn escapes_are_resolved() {
        let host = Host::new();
        host.run(r#""a\"b\n" | observe;"#).expect("runs");
        assert_eq!(host.observed(), vec![vec![string("a\"b\n")]]);
    }

    // ── Variables ─────────────────────────────────────────────

    #[test]
    fn destructuring_pads_and_truncates() {
        let host = Host::new();
        host.run("1 | $a, $b; $a, $b | observe; 1, 2, 3 | $c; $c | observe;")
            .expect("runs");
        assert_eq!(
            host.observed(),
            vec![vec![Value::Int(1), Value::Null], ints(&[1])]
        );
    }

    #[test]
    fn reassignment_overwrites_in_place() {
        let host = Host::new();
        host.run("1, 2 | $a, $b; $b, $a | $a, $b; $a, $b | observe; 9 | $a; $a, $b | observe;")
            .expect("runs");
        assert_eq!(host.observed(), vec![ints(&[2, 1]), ints(&[9, 1])]);
    }

    #[test]
    fn block_locals_are_popped_at_scope_end() {
        let host = Host::new();
        host.run("1 | $a; { 2 | $b; $b | observe; } 3 | $c; $a, $c | observe;")
            .expect("runs");
        assert_eq!(host.observed(), vec![ints(&[2]), ints(&[1, 3])]);
    }

    // ── Control flow ──────────────────────────────────────────

    #[test]
    fn if_requires_every_value_to_be_truthy() {
        let host = Host::new();
        host.run(
            "if true, 1, \"s\" { \"A\" | observe; } else { \"B\" | observe; }
             if true, true, false { \"A\" | observe; } else { \"B\" | observe; }
             if false { \"A\" | observe; } else { \"B\" | observe; }
             if nothing { \"empty\" | observe; }",
        )
        .expect("runs");
        assert_eq!(
            host.observed(),
            vec![
                vec![string("A")],
                vec![string("B")],
                vec![string("B")],
                vec![string("empty")],
            ]
        );
    }

    #[test]
    fn else_if_chains_pick_the_first_match() {
        let host = Host::new();
        host.run(
            "if 0 { 1 | observe; } else if 0.0 { 2 | observe; } else if 1 { 3 | observe; } else { 4 | observe; }",
        )
        .expect("runs");
        assert_eq!(host.observed(), vec![ints(&[3])]);
    }

    #[test]
    fn foreach_runs_once_per_element() {
        let host = Host::new();
        host.run("foreach $_ in 1, 2, 3 { increment; }").expect("runs");
        assert_eq!(host.increments(), 3);

        let host = Host::new();
        host.run("foreach $_ in nothing { increment; }").expect("runs");
        assert_eq!(host.increments(), 0);
    }

    #[test]
    fn foreach_binds_each_element_in_order() {
        let host = Host::new();
        host.run("foreach $v in 1, 2, 3 { $v | $w; $w, $v | observe; }")
            .expect("runs");
        assert_eq!(
            host.observed(),
            vec![ints(&[1, 1]), ints(&[2, 2]), ints(&[3, 3])]
        );
    }

    #[test]
    fn nested_loops_share_the_outer_reservation() {
        let host = Host::new();
        host.run(
            "1 | $before;
             foreach $x in 1, 2 { foreach $y in 3, 4 { $x, $y | observe; } }
             $before | observe;",
        )
        .expect("runs");
        assert_eq!(
            host.observed(),
            vec![
                ints(&[1, 3]),
                ints(&[1, 4]),
                ints(&[2, 3]),
                ints(&[2, 4]),
                ints(&[1]),
            ]
        );
    }

    // ── Commands ──────────────────────────────────────────────

    #[test]
    fn return_propagates_multiple_values() {
        let host = Host::new();
        host.run("command c { return 1, 2, 3; } c | observe;").expect("runs");
        assert_eq!(host.observed(), vec![ints(&[1, 2, 3])]);
    }

    #[test]
    fn parameters_and_input_are_separate() {
        let host = Host::new();
        host.run("command wrap $p { return $$, $p; } 1, 2 | wrap 3 | observe;")
            .expect("runs");
        assert_eq!(host.observed(), vec![ints(&[1, 2, 3])]);
    }

    #[test]
    fn commands_have_their_own_locals() {
        let host = Host::new();
        host.run(
            "command a { 1 | $x; return $x; }
             command b { 2 | $x; return $x; }
             5 | $x; a, b, $x | observe;",
        )
        .expect("runs");
        assert_eq!(host.observed(), vec![ints(&[1, 2, 5])]);
    }

    #[test]
    fn return_exits_from_inside_a_loop() {
        let host = Host::new();
        host.run(
            "command first { foreach $v in $$ { return $v; } return; }
             7, 8, 9 | first | observe;
             nothing | first | observe;",
        )
        .expect("runs");
        assert_eq!(host.observed(), vec![ints(&[7]), vec![]]);
    }

    #[test]
    fn falling_off_a_command_returns_nothing() {
        let host = Host::new();
        host.run("command quiet { 1 | $_x; } quiet | observe;").expect("runs");
        assert_eq!(host.observed(), vec![vec![]]);
    }

    #[test]
    fn top_level_return_is_the_result() {
        let host = Host::new();
        assert_eq!(host.run("return 1, 2;"), Ok(ints(&[1, 2])));
        assert_eq!(host.run("1 | $_a;"), Ok(vec![]));
    }

    #[test]
    fn arguments_are_the_root_input() {
        let host = Host::new();
        let mut executable = host.executable("$$ | observe;");
        let (result, frames) = execute(&mut executable, ints(&[4, 5]));
        assert_eq!(result, Ok(vec![]));
        assert!(frames.is_empty());
        assert_eq!(host.observed(), vec![ints(&[4, 5])]);
    }

    #[test]
    fn every_call_site_gets_its_own_callback() {
        let mut registry = CommandRegistry::new();
        registry
            .register("count", 0, || {
                let mut calls = 0;
                Box::new(move |ctx: &mut CommandContext<'_>| {
                    calls += 1;
                    ctx.push(calls);
                }) as Box<dyn NativeCommand>
            })
            .expect("register count");

        let source = "external command count 0;
                      foreach $_ in 1, 2 { count | $_n; }
                      return count, count;";
        let (errors, assembly) = compile(source, &CompileOptions::default());
        assert!(errors.is_empty(), "{errors:?}");
        let mut executable =
            link(Arc::new(assembly), &Library::new(), &registry).expect("links");
        let (result, _) = execute(&mut executable, Vec::new());
        assert_eq!(result, Ok(ints(&[1, 1])));

        let (again, _) = execute(&mut executable, Vec::new());
        assert_eq!(again, Ok(ints(&[2, 2])));
    }

    #[test]
    fn debug_and_release_agree() {
        let source = "command twice $v { return $v, $v; }
                      foreach $x in 1, 2 { twice $x | $a, $b; $a, $b | observe; }";
        let release = Host::new();
        execute(&mut release.executable_in(source, Mode::Release), Vec::new())
            .0
            .expect("release runs");
        let debug = Host::new();
        execute(&mut debug.executable_in(source, Mode::Debug), Vec::new())
            .0
            .expect("debug runs");
        assert_eq!(release.observed(), debug.observed());
        assert_eq!(release.observed(), vec![ints(&[1, 1]), ints(&[2, 2])]);
    }

    // ── Failures ──────────────────────────────────────────────

    #[test]
    fn unbound_external_compiles_but_fails_to_link() {
        let (errors, assembly) = compile("external command foo 1;", &CompileOptions::default());
        assert!(errors.is_empty());
        let errors = link(Arc::new(assembly), &Library::new(), &CommandRegistry::new())
            .expect_err("foo is not registered");
        assert_eq!(
            errors,
            vec![LinkError::MissingBinding {
                name: "foo".to_string()
            }]
        );
    }

    #[test]
    fn callback_errors_stop_execution_with_a_trace() {
        let host = Host::new();
        let mut executable = host.executable(
            "command inner { fail; }
             command outer { inner; }
             outer;
             1 | observe;",
        );
        let (result, frames) = execute(&mut executable, Vec::new());
        let error = result.expect_err("fail fails");
        assert_eq!(
            error.kind,
            RuntimeErrorKind::CommandFailed {
                command: "fail".to_string(),
                message: "it broke".to_string(),
            }
        );
        assert!(host.observed().is_empty());

        let assembly = executable.assembly();
        assert_eq!(assembly.text_at(error.location), "fail");
        assert_eq!(frames.len(), 3);
        let trace = render_call_stack(assembly, &frames);
        let lines: Vec<&str> = trace.lines().map(str::trim).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("at inner (main:"), "{trace}");
        assert!(lines[1].starts_with("at outer (main:"), "{trace}");
        assert!(lines[2].starts_with("at <root> (main:"), "{trace}");
        assert!(error.render(assembly).starts_with("error: `fail` failed: it broke"));
    }

    #[test]
    fn unbounded_recursion_overflows() {
        let host = Host::new();
        let mut executable = host.executable("command forever { forever; } forever;");
        let options = ExecuteOptions {
            max_frames: 16,
            ..ExecuteOptions::default()
        };
        let (result, frames) = execute_with(&mut executable, Vec::new(), &options);
        assert_eq!(
            result.map_err(|e| e.kind),
            Err(RuntimeErrorKind::StackOverflow { depth: 16 })
        );
        assert_eq!(frames.len(), 16);
    }

    #[test]
    fn instruction_limit_is_enforced() {
        let host = Host::new();
        let mut executable = host.executable("foreach $_ in 1, 2, 3 { increment; }");
        let options = ExecuteOptions {
            instruction_limit: Some(8),
            ..ExecuteOptions::default()
        };
        let (result, _) = execute_with(&mut executable, Vec::new(), &options);
        assert_eq!(
            result.map_err(|e| e.kind),
            Err(RuntimeErrorKind::InstructionLimitExceeded { limit: 8 })
        );
        assert!(host.increments() < 3);
    }

    // ── Multiple assemblies ───────────────────────────────────

    #[test]
    fn dependencies_link_against_the_library() {
        let host = Host::new();
        let (errors, std) = compile(
            "external command observe 0;",
            &CompileOptions {
                uri: "std",
                ..CompileOptions::default()
            },
        );
        assert!(errors.is_empty());
        let mut library = Library::new();
        library.insert(Arc::new(std));

        let options = CompileOptions {
            library: Some(&library),
            ..CompileOptions::default()
        };
        let (errors, main) = compile("import \"std\"; 9 | observe;", &options);
        assert!(errors.is_empty(), "{errors:?}");
        let mut executable =
            link(Arc::new(main), &library, &host.registry).expect("links");
        execute(&mut executable, Vec::new()).0.expect("runs");
        assert_eq!(host.observed(), vec![ints(&[9])]);
    }

    #[test]
    fn imported_commands_are_callable() {
        let host = Host::new();
        let loader = MemoryLoader::new().with(
            "util",
            "external command observe 0; command show $v { $v | observe; }",
        );
        let options = CompileOptions {
            loader: Some(&loader),
            ..CompileOptions::default()
        };
        let (errors, assembly) = compile("import \"util\"; show 4;", &options);
        assert!(errors.is_empty(), "{errors:?}");
        let mut executable =
            link(Arc::new(assembly), &Library::new(), &host.registry).expect("links");
        execute(&mut executable, Vec::new()).0.expect("runs");
        assert_eq!(host.observed(), vec![ints(&[4])]);
    }
}
