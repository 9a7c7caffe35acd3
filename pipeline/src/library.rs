//! Where imports come from.
//!
//! An `import "uri";` is satisfied either by an already compiled assembly
//! in a [`Library`] (it becomes a dependency and is linked, not inlined) or
//! by source text from a [`SourceLoader`] (it is compiled into the
//! importing assembly).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytecode::Assembly;

/// Compiled assemblies other compilations may depend on, keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct Library {
    assemblies: HashMap<String, Arc<Assembly>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assembly under its own URI, replacing any previous one.
    pub fn insert(&mut self, assembly: Arc<Assembly>) {
        self.assemblies.insert(assembly.uri.clone(), assembly);
    }

    pub fn get(&self, uri: &str) -> Option<&Arc<Assembly>> {
        self.assemblies.get(uri)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.assemblies.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.assemblies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty()
    }
}

/// Resolves an import URI to source text.
pub trait SourceLoader {
    fn load(&self, uri: &str) -> Option<String>;
}

/// Sources held in memory. Handy for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(uri, text);
        self
    }

    pub fn insert(&mut self, uri: impl Into<String>, text: impl Into<String>) {
        self.sources.insert(uri.into(), text.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, uri: &str) -> Option<String> {
        self.sources.get(uri).cloned()
    }
}

/// Reads imports from files relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceLoader for FileLoader {
    fn load(&self, uri: &str) -> Option<String> {
        let path = self.root.join(uri);
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(err) => {
                log::debug!("import {uri}: cannot read {}: {err}", path.display());
                None
            }
        }
    }
}
