//! Module loading
//!
//! `open name` resolves the whole dependency graph of `name` before any of
//! it runs: sources are fetched through a [`ModuleLoader`], their top-level
//! `open` statements walked depth-first, and cycles rejected. Modules are
//! then evaluated in dependency order and cached by name.

use super::eval::Engine;
use super::scope::{Frame, ModuleScope};
use crate::config::EngineConfig;
use crate::error::{Result, ScriptError};
use crate::lexer::{Token, TokenKind, tokenize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

/// Source text of a module
#[derive(Debug, Clone)]
pub struct ModuleSource {
    /// Name used in positions and error reports (usually the file path)
    pub origin: String,
    pub text: String,
}

/// Where module sources come from
pub trait ModuleLoader {
    fn load(&self, name: &str) -> Option<ModuleSource>;
}

/// Loads `<dir>/<name>.<extension>` from a list of directories
#[derive(Debug, Clone)]
pub struct FileLoader {
    paths: Vec<PathBuf>,
    extension: String,
}

impl FileLoader {
    pub fn new(paths: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        FileLoader {
            paths,
            extension: extension.into(),
        }
    }

    /// Configured directories, then the working directory
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut paths = config.module_paths.clone();
        paths.push(PathBuf::from("."));
        FileLoader::new(paths, config.module_extension.clone())
    }

    /// Search `path` before every other directory
    pub fn prepend_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(0, path.into());
    }
}

impl ModuleLoader for FileLoader {
    fn load(&self, name: &str) -> Option<ModuleSource> {
        self.paths.iter().find_map(|dir| {
            let path = dir.join(format!("{name}.{}", self.extension));
            let text = std::fs::read_to_string(&path).ok()?;
            Some(ModuleSource {
                origin: path.display().to_string(),
                text,
            })
        })
    }
}

/// In-memory module sources, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    modules: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module
    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.modules.insert(name.to_string(), text.to_string());
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&self, name: &str) -> Option<ModuleSource> {
        self.modules.get(name).map(|text| ModuleSource {
            origin: format!("{name}.ember"),
            text: text.clone(),
        })
    }
}

/// A module whose source has been tokenized but not evaluated
struct PendingModule {
    name: String,
    statements: Vec<Vec<Token>>,
}

/// Modules named by top-level `open` statements
fn dependencies(statements: &[Vec<Token>]) -> Vec<String> {
    statements
        .iter()
        .filter(|s| s.first().is_some_and(|t| t.is(TokenKind::Open)))
        .filter_map(|s| s.last().filter(|t| t.is(TokenKind::Ident)))
        .map(|t| t.text.clone())
        .collect()
}

impl Engine {
    /// Load, order and evaluate `name` and everything it opens
    #[tracing::instrument(level = "debug", skip_all, fields(module = name))]
    pub(crate) fn import(&mut self, name: &str) -> Result<Rc<ModuleScope>> {
        if let Some(scope) = self.modules.get(name) {
            return Ok(scope.clone());
        }

        let mut order = Vec::new();
        let mut visiting = Vec::new();
        let mut done = HashSet::new();
        self.visit(name, &mut visiting, &mut done, &mut order)?;
        debug!(
            order = ?order.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "module build order"
        );

        for module in order {
            self.evaluate_module(module)?;
        }
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::plain(format!("module {name} failed to load")))
    }

    /// Depth-first walk of the dependency graph
    fn visit(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<PendingModule>,
    ) -> Result<()> {
        if self.modules.contains_key(name) || done.contains(name) {
            return Ok(());
        }
        if let Some(start) = visiting.iter().position(|n| n == name) {
            let mut chain = visiting[start..].to_vec();
            chain.push(name.to_string());
            return Err(ScriptError::plain(format!("import cycle: {}", chain.join(" -> "))));
        }

        let source = self
            .loader
            .load(name)
            .ok_or_else(|| ScriptError::name(format!("module not found: {name}")))?;
        debug!(module = name, origin = %source.origin, "loaded module source");
        let statements = tokenize(&source.origin, &source.text)?;

        visiting.push(name.to_string());
        for dependency in dependencies(&statements) {
            self.visit(&dependency, visiting, done, order)?;
        }
        visiting.pop();

        done.insert(name.to_string());
        order.push(PendingModule {
            name: name.to_string(),
            statements,
        });
        Ok(())
    }

    fn evaluate_module(&mut self, module: PendingModule) -> Result<()> {
        debug!(module = %module.name, "evaluating module");
        let scope = ModuleScope::new(&module.name, &self.natives);
        let mut frame = Frame::module(scope.clone());
        self.exec_top_level(&mut frame, &module.statements)?;
        self.modules.insert(module.name, scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_from_top_level_open() {
        let statements = tokenize("t", "open a\nopen m b\nx := 1\nfunc f() {\n open c\n}").unwrap();
        assert_eq!(dependencies(&statements), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with("util", "X := 1");
        assert_eq!(loader.load("util").unwrap().text, "X := 1");
        assert!(loader.load("missing").is_none());
    }

    #[test]
    fn test_file_loader_missing_module() {
        let loader = FileLoader::new(vec![PathBuf::from("/nonexistent")], "ember");
        assert!(loader.load("nothing").is_none());
    }
}
