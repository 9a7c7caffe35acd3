//! Binding external command declarations to host callbacks.
//!
//! Compilation only records that a script *wants* `external command f 1;`
//! and where it calls it. Linking checks those wants against a
//! [`CommandRegistry`] and produces an [`Executable`] with one live
//! callback per call site.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bytecode::{Assembly, ExternalCommandDefinition, Value};

use crate::library::Library;

// ── Host callbacks ──────────────────────────────────────────────────

/// What a native command sees while it runs.
///
/// `values` holds the piped-in input followed by the explicit arguments.
/// Everything pushed becomes the command's result tuple.
pub struct CommandContext<'a> {
    values: &'a [Value],
    input_count: usize,
    output: &'a mut Vec<Value>,
    pushed: usize,
    error: Option<String>,
}

impl<'a> CommandContext<'a> {
    pub fn new(values: &'a [Value], input_count: usize, output: &'a mut Vec<Value>) -> Self {
        Self {
            values,
            input_count: input_count.min(values.len()),
            output,
            pushed: 0,
            error: None,
        }
    }

    /// Number of piped-in values.
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn input(&self, index: usize) -> Option<&Value> {
        self.inputs().get(index)
    }

    pub fn inputs(&self) -> &[Value] {
        &self.values[..self.input_count]
    }

    pub fn argument(&self, index: usize) -> Option<&Value> {
        self.arguments().get(index)
    }

    pub fn arguments(&self) -> &[Value] {
        &self.values[self.input_count..]
    }

    /// Append a value to the result tuple.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.output.push(value.into());
        self.pushed += 1;
    }

    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Fail the command. The VM stops with this message once the callback
    /// returns.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }
}

/// A host-implemented command. Any `FnMut(&mut CommandContext)` works.
pub trait NativeCommand: Send {
    fn call(&mut self, ctx: &mut CommandContext<'_>);
}

impl<F> NativeCommand for F
where
    F: FnMut(&mut CommandContext<'_>) + Send,
{
    fn call(&mut self, ctx: &mut CommandContext<'_>) {
        self(ctx)
    }
}

/// Produces one callback per call site. Must be callable from any thread.
pub type CommandFactory = Box<dyn Fn() -> Box<dyn NativeCommand> + Send + Sync>;

// ── Registry ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate { name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate { name } => write!(f, "command `{name}` is already registered"),
        }
    }
}

impl std::error::Error for RegistryError {}

struct Registration {
    parameter_count: u8,
    factory: CommandFactory,
}

/// Host commands available to [`link`].
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Registration>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        parameter_count: u8,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn NativeCommand> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.commands.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.commands.insert(
            name,
            Registration {
                parameter_count,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Register a closure; every call site gets its own clone.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        parameter_count: u8,
        command: F,
    ) -> Result<(), RegistryError>
    where
        F: FnMut(&mut CommandContext<'_>) + Clone + Send + Sync + 'static,
    {
        self.register(name, parameter_count, move || {
            Box::new(command.clone()) as Box<dyn NativeCommand>
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn parameter_count(&self, name: &str) -> Option<u8> {
        self.commands.get(name).map(|r| r.parameter_count)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn instantiate(&self, name: &str) -> Option<Box<dyn NativeCommand>> {
        self.commands.get(name).map(|r| (r.factory)())
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("commands", &names)
            .finish()
    }
}

// ── Linking ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    MissingDependency {
        uri: String,
    },
    MissingBinding {
        name: String,
    },
    IncompatibleBinding {
        name: String,
        declared: u8,
        registered: u8,
    },
    /// A call site names a definition its assembly does not have.
    UnknownDefinition {
        instance: u16,
    },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependency { uri } => write!(f, "dependency `{uri}` is not in the library"),
            Self::MissingBinding { name } => {
                write!(f, "external command `{name}` has no host binding")
            }
            Self::IncompatibleBinding {
                name,
                declared,
                registered,
            } => write!(
                f,
                "external command `{name}` is declared with {declared} parameter(s) but registered with {registered}"
            ),
            Self::UnknownDefinition { instance } => {
                write!(f, "call site #{instance} refers to an unknown definition")
            }
        }
    }
}

impl std::error::Error for LinkError {}

/// A live callback for one external call site.
pub struct BoundCommand {
    pub name: String,
    pub parameter_count: u8,
    pub(crate) command: Box<dyn NativeCommand>,
}

impl fmt::Debug for BoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCommand")
            .field("name", &self.name)
            .field("parameter_count", &self.parameter_count)
            .finish_non_exhaustive()
    }
}

/// A linked assembly, ready to run.
#[derive(Debug)]
pub struct Executable {
    assembly: Arc<Assembly>,
    commands: Vec<BoundCommand>,
}

impl Executable {
    pub fn assembly(&self) -> &Arc<Assembly> {
        &self.assembly
    }

    /// Bound callbacks, indexed like the assembly's external instances.
    pub fn commands(&self) -> &[BoundCommand] {
        &self.commands
    }

    pub(crate) fn command_mut(&mut self, instance: u16) -> Option<&mut BoundCommand> {
        self.commands.get_mut(usize::from(instance))
    }
}

/// Resolve every external command `assembly` declares or calls.
///
/// All problems are reported, each definition at most once.
pub fn link(
    assembly: Arc<Assembly>,
    library: &Library,
    registry: &CommandRegistry,
) -> Result<Executable, Vec<LinkError>> {
    let mut errors = Vec::new();
    let mut checked: HashSet<(u16, u16)> = HashSet::new();

    let dependencies: Vec<Option<&Arc<Assembly>>> = assembly
        .dependencies
        .iter()
        .map(|uri| {
            let dependency = library.get(uri);
            if dependency.is_none() {
                errors.push(LinkError::MissingDependency { uri: uri.clone() });
            }
            dependency
        })
        .collect();

    for (index, definition) in assembly.external_commands.iter().enumerate() {
        let key = (0, u16::try_from(index).unwrap_or(u16::MAX));
        checked.insert(key);
        if let Err(error) = check_binding(definition, registry) {
            errors.push(error);
        }
    }

    let mut commands = Vec::with_capacity(assembly.external_instances.len());
    for (index, instance) in assembly.external_instances.iter().enumerate() {
        let owner = match instance.source_index {
            0 => Some(&assembly),
            source => match dependencies.get(usize::from(source) - 1) {
                Some(Some(dependency)) => Some(*dependency),
                // already reported as a missing dependency
                Some(None) => continue,
                None => None,
            },
        };
        let Some(definition) =
            owner.and_then(|a| a.external_commands.get(usize::from(instance.definition_index)))
        else {
            errors.push(LinkError::UnknownDefinition {
                instance: u16::try_from(index).unwrap_or(u16::MAX),
            });
            continue;
        };

        if checked.insert((instance.source_index, instance.definition_index)) {
            if let Err(error) = check_binding(definition, registry) {
                errors.push(error);
            }
        }
        if let Some(command) = registry.instantiate(&definition.name) {
            log::debug!("bound call site #{index} to `{}`", definition.name);
            commands.push(BoundCommand {
                name: definition.name.clone(),
                parameter_count: definition.parameter_count,
                command,
            });
        }
    }

    if !errors.is_empty() {
        log::warn!("linking {} failed with {} error(s)", assembly.uri, errors.len());
        return Err(errors);
    }
    Ok(Executable { assembly, commands })
}

fn check_binding(
    definition: &ExternalCommandDefinition,
    registry: &CommandRegistry,
) -> Result<(), LinkError> {
    match registry.parameter_count(&definition.name) {
        None => Err(LinkError::MissingBinding {
            name: definition.name.clone(),
        }),
        Some(registered) if registered != definition.parameter_count => {
            Err(LinkError::IncompatibleBinding {
                name: definition.name.clone(),
                declared: definition.parameter_count,
                registered,
            })
        }
        Some(_) => Ok(()),
    }
}
