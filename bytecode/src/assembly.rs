use parser::Slice;

use crate::value::Value;

/// A source text compiled into an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub uri: String,
    pub text: String,
}

impl Source {
    pub fn new(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            text: text.into(),
        }
    }

    /// Render the line containing `slice` with a caret underline:
    ///
    /// ```text
    /// main.pipe:2:8
    ///  2 | 1, 2 | nope;
    ///    |        ^^^^
    /// ```
    pub fn highlight(&self, slice: Slice) -> String {
        let text = self.text.as_str();
        let start = slice.start().min(text.len());
        let (line, column) = slice.line_column(text);

        let line_start = text
            .get(..start)
            .and_then(|before| before.rfind('\n'))
            .map_or(0, |newline| newline + 1);
        let line_end = text
            .get(start..)
            .and_then(|after| after.find('\n'))
            .map_or(text.len(), |newline| start + newline);
        let line_text = text.get(line_start..line_end).unwrap_or("");

        let pad = text.get(line_start..start).map_or(0, |s| s.chars().count());
        let width = text
            .get(start..slice.end().min(line_end))
            .map_or(0, |s| s.chars().count())
            .max(1);

        let gutter = line.to_string();
        let blank = " ".repeat(gutter.len());
        format!(
            "{}:{line}:{column}\n {gutter} | {line_text}\n {blank} | {}{}",
            self.uri,
            " ".repeat(pad),
            "^".repeat(width),
        )
    }
}

/// Where a byte of code came from: a source of the assembly and a slice
/// of its text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Index into [`Assembly::sources`].
    pub source: u16,
    pub slice: Slice,
}

impl SourceLocation {
    pub const fn new(source: u16, slice: Slice) -> Self {
        Self { source, slice }
    }
}

/// A command defined in script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: String,
    /// Absolute byte offset of the first body instruction.
    pub entry: usize,
    pub parameter_count: u8,
    /// Location of the command's name.
    pub location: SourceLocation,
}

/// A command declared in script with `external command NAME N;` and
/// implemented by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommandDefinition {
    pub name: String,
    pub parameter_count: u8,
    pub location: SourceLocation,
}

/// One call site of an external command.
///
/// `source_index` 0 is the assembly itself; `i > 0` names
/// `dependencies[i - 1]`. The callback is attached at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalCommandInstance {
    pub source_index: u16,
    pub definition_index: u16,
    pub location: SourceLocation,
}

/// The compiled artifact of one source and everything it inlined.
///
/// Mutated only while it is being compiled and shared immutably (usually
/// behind an `Arc`) afterwards.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub uri: String,
    /// `sources[0]` is the main source; imports that were inlined follow.
    pub sources: Vec<Source>,
    pub code: Vec<u8>,
    /// One entry per byte of `code`.
    pub locations: Vec<SourceLocation>,
    pub literals: Vec<Value>,
    pub commands: Vec<CommandDefinition>,
    pub external_commands: Vec<ExternalCommandDefinition>,
    pub external_instances: Vec<ExternalCommandInstance>,
    /// URIs of the assemblies external call sites may refer to.
    pub dependencies: Vec<String>,
}

impl Assembly {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Add a literal to the pool, reusing an equal entry. `None` once the
    /// pool has no 16-bit index left.
    pub fn add_literal(&mut self, value: Value) -> Option<u16> {
        if let Some(index) = self.literals.iter().position(|v| *v == value) {
            return u16::try_from(index).ok();
        }
        let index = u16::try_from(self.literals.len()).ok()?;
        self.literals.push(value);
        Some(index)
    }

    pub fn find_command(&self, name: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.name == name)
    }

    pub fn find_external_command(&self, name: &str) -> Option<usize> {
        self.external_commands.iter().position(|c| c.name == name)
    }

    /// Index of `uri` in the dependency list, plus one (0 is self).
    pub fn dependency_index(&self, uri: &str) -> Option<usize> {
        self.dependencies.iter().position(|d| d == uri).map(|i| i + 1)
    }

    pub fn location_at(&self, offset: usize) -> SourceLocation {
        self.locations.get(offset).copied().unwrap_or_default()
    }

    pub fn source_of(&self, location: SourceLocation) -> Option<&Source> {
        self.sources.get(location.source as usize)
    }

    /// Source text covered by `location`.
    pub fn text_at(&self, location: SourceLocation) -> &str {
        self.source_of(location)
            .map_or("", |source| location.slice.text(&source.text))
    }

    /// 1-based line of the code byte at `offset`.
    pub fn line_at(&self, offset: usize) -> usize {
        let location = self.location_at(offset);
        self.source_of(location)
            .map_or(0, |source| location.slice.line_column(&source.text).0)
    }

    /// `uri:line:column` for a location.
    pub fn describe(&self, location: SourceLocation) -> String {
        match self.source_of(location) {
            Some(source) => {
                let (line, column) = location.slice.line_column(&source.text);
                format!("{}:{line}:{column}", source.uri)
            }
            None => self.uri.clone(),
        }
    }

    /// Caret highlight of a location, see [`Source::highlight`].
    pub fn highlight(&self, location: SourceLocation) -> String {
        self.source_of(location)
            .map_or_else(|| self.uri.clone(), |source| source.highlight(location.slice))
    }
}
