//! Error types for loading, resolution, and diffing.
//!
//! The crate exposes a single unified error type (`GriffeError`) covering
//! every subsystem. Errors are caught at module boundaries by the loader:
//! the affected module is recorded as partial and loading continues. Alias
//! resolution errors propagate to the caller that asked for a target.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, GriffeError>;

/// Unified error type.
#[derive(Debug, Error)]
pub enum GriffeError {
    /// Package layout could not be found on the search path.
    #[error("could not find package '{package}': {details}")]
    Loading { package: String, details: String },

    /// A file was found but could not be parsed.
    #[error("cannot parse module at {path}: {reason}")]
    UnimportableModule { path: PathBuf, reason: String },

    /// An editable-install pointer uses a format we do not recognize.
    #[error("unhandled editable module pointer: {path}")]
    UnhandledEditableModule { path: PathBuf },

    /// An unqualified name could not be bound in scope.
    #[error("could not resolve name '{name}' in scope '{scope}'")]
    NameResolution { name: String, scope: String },

    /// An alias target is absent after loading completed.
    #[error("could not resolve alias '{alias_path}' pointing at '{target_path}'")]
    AliasResolution {
        alias_path: String,
        target_path: String,
    },

    /// An alias chain revisits itself.
    #[error("cyclic alias chain: {}", chain.join(" -> "))]
    CyclicAlias { chain: Vec<String> },

    /// A file-path query on a built-in module that has no source file.
    #[error("built-in module '{name}' has no source file")]
    BuiltinModule { name: String },

    /// A string could not be re-parsed as a Python expression.
    #[error("invalid expression {expr_source:?}: {message}")]
    ExpressionParse {
        expr_source: String,
        message: String,
    },

    /// Git collaborator failure.
    #[error("git error: {message}")]
    Git { message: String },

    /// IO failure while reading sources.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GriffeError {
    /// Create a loading error.
    pub fn loading(package: impl Into<String>, details: impl Into<String>) -> Self {
        GriffeError::Loading {
            package: package.into(),
            details: details.into(),
        }
    }

    /// Create an unimportable-module error.
    pub fn unimportable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GriffeError::UnimportableModule {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a name-resolution error.
    pub fn name_resolution(name: impl Into<String>, scope: impl Into<String>) -> Self {
        GriffeError::NameResolution {
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Create an alias-resolution error.
    pub fn alias_resolution(alias_path: impl Into<String>, target_path: impl Into<String>) -> Self {
        GriffeError::AliasResolution {
            alias_path: alias_path.into(),
            target_path: target_path.into(),
        }
    }

    /// Create a git error.
    pub fn git(message: impl Into<String>) -> Self {
        GriffeError::Git {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_display() {
        let err = GriffeError::loading("mypkg", "not on search path");
        assert_eq!(
            err.to_string(),
            "could not find package 'mypkg': not on search path"
        );
    }

    #[test]
    fn cyclic_alias_display_joins_chain() {
        let err = GriffeError::CyclicAlias {
            chain: vec!["a.x".to_string(), "b.y".to_string(), "a.x".to_string()],
        };
        assert_eq!(err.to_string(), "cyclic alias chain: a.x -> b.y -> a.x");
    }

    #[test]
    fn alias_resolution_display() {
        let err = GriffeError::alias_resolution("pkg.mod.name", "missing.thing");
        assert_eq!(
            err.to_string(),
            "could not resolve alias 'pkg.mod.name' pointing at 'missing.thing'"
        );
    }
}
