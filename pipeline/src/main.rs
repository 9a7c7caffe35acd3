use clap::Parser as ClapParser;
use std::{
    fs,
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use pipeline::{
    CommandContext, CommandRegistry, CompileOptions, Debugger, ExecuteOptions, FileLoader,
    Library, Mode, Value, Vm, VmView, compile, disassemble, link, render_call_stack,
};

/// Declarations every script can `import "std";`.
const PRELUDE: &str = "external command print 0;";

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to execute in order
    #[arg(required = true, help = "The .pipe files to execute")]
    files: Vec<PathBuf>,

    /// Print bytecode instead of executing
    #[arg(long, help = "Dump the disassembled bytecode of each input")]
    dump_bytecode: bool,

    /// Compile with debug instructions and trace every statement
    #[arg(long, help = "Compile in debug mode and trace statements to stderr")]
    debug: bool,

    /// Abort a script after this many instructions
    #[arg(long, value_name = "N")]
    instruction_limit: Option<u64>,

    /// Directory imports are resolved against (default: the file's directory)
    #[arg(long, value_name = "DIR")]
    import_root: Option<PathBuf>,
}

/// Prints the visible variables at every statement.
struct Tracer;

impl Debugger for Tracer {
    fn on_hook(&mut self, vm: &VmView<'_>) {
        let variables: Vec<String> = vm
            .variables()
            .into_iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect();
        eprintln!("[line {}] {}", vm.line(), variables.join(", "));
    }
}

fn host_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    let result = registry.register_fn("print", 0, |ctx: &mut CommandContext<'_>| {
        println!("{}", join(ctx.inputs()));
    });
    if let Err(err) = result {
        eprintln!("Error setting up host commands: {err}");
        process::exit(1);
    }
    registry
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn prelude() -> Library {
    let (errors, std) = compile(
        PRELUDE,
        &CompileOptions {
            uri: "std",
            ..CompileOptions::default()
        },
    );
    for error in &errors {
        log::error!("prelude: {error}");
    }
    let mut library = Library::new();
    library.insert(Arc::new(std));
    library
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let registry = host_registry();
    let mut library = prelude();
    let mode = if cli.debug { Mode::Debug } else { Mode::Release };
    let options = ExecuteOptions {
        instruction_limit: cli.instruction_limit,
        ..ExecuteOptions::default()
    };

    for path in &cli.files {
        let source_code = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("Error reading file '{}': {}", path.display(), err);
                process::exit(1);
            }
        };

        let root = cli
            .import_root
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let loader = FileLoader::new(root);
        let uri = path.display().to_string();
        let (errors, assembly) = compile(
            &source_code,
            &CompileOptions {
                uri: &uri,
                mode,
                loader: Some(&loader),
                library: Some(&library),
            },
        );
        if !errors.is_empty() {
            for error in &errors {
                eprintln!("{}\n", error.render(&assembly));
            }
            eprintln!("{}: {} error(s)", uri, errors.len());
            process::exit(1);
        }

        let assembly = Arc::new(assembly);
        if cli.dump_bytecode {
            println!("== {} ==", uri);
            print!("{}", disassemble(&assembly));
            library.insert(assembly);
            continue;
        }

        let mut executable = match link(Arc::clone(&assembly), &library, &registry) {
            Ok(executable) => executable,
            Err(errors) => {
                for error in &errors {
                    eprintln!("error: {error}");
                }
                process::exit(1);
            }
        };

        let mut tracer = Tracer;
        let mut vm = Vm::new(options.clone());
        if cli.debug {
            vm = vm.with_debugger(&mut tracer);
        }
        match vm.run(&mut executable, Vec::new()) {
            Ok(values) => {
                if !values.is_empty() {
                    println!("{}", join(&values));
                }
            }
            Err(err) => {
                eprintln!("{}", err.render(&assembly));
                eprint!("{}", render_call_stack(&assembly, vm.frames()));
                process::exit(1);
            }
        }
        library.insert(assembly);
    }
}
