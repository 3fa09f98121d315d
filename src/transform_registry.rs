//! Extension registry for the `dynamic` mapping strategy.
//!
//! Extensions are plain Rust functions registered under a two-part name
//! (`module.function`) at startup. A mapping's `scriptExtension` identifier is
//! resolved against this registry and the function is called with the fixed
//! [`ExtensionArgs`] contract. New transformations are added by registering
//! functions, never by changing the resolver.

use std::collections::HashMap;

use crate::mapping::{FieldMapping, GlobalOptions};
use crate::record::Row;

/// Error type for extension resolution and execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    #[error("extension identifier '{0}' is not in 'module.function' form")]
    InvalidIdentifier(String),

    #[error("extension module not found: {0}")]
    ModuleNotFound(String),

    #[error("extension function not found: {module}.{function}")]
    FunctionNotFound { module: String, function: String },

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("execution error: {0}")]
    ExecutionError(String),
}

impl ExtensionError {
    /// Identifier could not be resolved to a registered function.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            ExtensionError::InvalidIdentifier(_)
                | ExtensionError::ModuleNotFound(_)
                | ExtensionError::FunctionNotFound { .. }
        )
    }
}

/// Arguments handed to every extension call.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionArgs<'a> {
    /// Raw value of the cell being resolved
    pub cell_value: &'a str,
    /// Column label of that cell
    pub column: &'a str,
    pub row: &'a Row,
    pub mapping: &'a FieldMapping,
    pub options: &'a GlobalOptions,
}

/// Trait for extension functions
pub trait ExtensionFn: Send + Sync {
    fn call(&self, args: &ExtensionArgs<'_>) -> Result<String, ExtensionError>;
}

impl<F> ExtensionFn for F
where
    F: Fn(&ExtensionArgs<'_>) -> Result<String, ExtensionError> + Send + Sync,
{
    fn call(&self, args: &ExtensionArgs<'_>) -> Result<String, ExtensionError> {
        self(args)
    }
}

/// Split `module.function` on the first dot.
///
/// Both parts must be non-empty. Any later dots belong to the function name.
pub fn split_identifier(identifier: &str) -> Result<(&str, &str), ExtensionError> {
    let invalid = || ExtensionError::InvalidIdentifier(identifier.to_string());

    let (module, function) = identifier.trim().split_once('.').ok_or_else(invalid)?;
    if module.is_empty() || function.is_empty() {
        return Err(invalid());
    }

    Ok((module, function))
}

/// Registry of extension functions, grouped by module
#[derive(Default)]
pub struct ExtensionRegistry {
    modules: HashMap<String, HashMap<String, Box<dyn ExtensionFn>>>,
}

impl ExtensionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the functions in [`crate::extensions`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::extensions::register_builtins(&mut registry);
        registry
    }

    /// Register an extension function
    ///
    /// # Example
    ///
    /// ```
    /// use sheetmap::ExtensionRegistry;
    ///
    /// let mut registry = ExtensionRegistry::new();
    /// registry.register("text", "reverse", |args| Ok(args.cell_value.chars().rev().collect()));
    /// assert!(registry.has_extension("text.reverse"));
    /// ```
    pub fn register<F>(&mut self, module: impl Into<String>, function: impl Into<String>, func: F)
    where
        F: Fn(&ExtensionArgs<'_>) -> Result<String, ExtensionError> + Send + Sync + 'static,
    {
        self.register_boxed(module, function, Box::new(func));
    }

    /// Register a boxed extension function.
    ///
    /// Identifiers split on their first dot, so a module name containing a
    /// dot can never be called; such registrations are skipped with a warning.
    pub fn register_boxed(
        &mut self,
        module: impl Into<String>,
        function: impl Into<String>,
        func: Box<dyn ExtensionFn>,
    ) {
        let module = module.into();
        if module.is_empty() || module.contains('.') {
            tracing::warn!(
                module = %module,
                "extension module name must be non-empty and dot-free"
            );
            return;
        }

        self.modules
            .entry(module)
            .or_default()
            .insert(function.into(), func);
    }

    /// Look up the function named by a `module.function` identifier.
    pub fn resolve(&self, identifier: &str) -> Result<&dyn ExtensionFn, ExtensionError> {
        let (module, function) = split_identifier(identifier)?;

        let functions = self
            .modules
            .get(module)
            .ok_or_else(|| ExtensionError::ModuleNotFound(module.to_string()))?;

        functions
            .get(function)
            .map(|f| f.as_ref())
            .ok_or_else(|| ExtensionError::FunctionNotFound {
                module: module.to_string(),
                function: function.to_string(),
            })
    }

    /// Resolve and invoke in one step.
    pub fn call(&self, identifier: &str, args: &ExtensionArgs<'_>) -> Result<String, ExtensionError> {
        self.resolve(identifier)?.call(args)
    }

    pub fn has_extension(&self, identifier: &str) -> bool {
        self.resolve(identifier).is_ok()
    }

    /// All registered identifiers, sorted.
    pub fn list_extensions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .iter()
            .flat_map(|(module, functions)| {
                functions.keys().map(move |f| format!("{}.{}", module, f))
            })
            .collect();
        names.sort();
        names
    }
}
