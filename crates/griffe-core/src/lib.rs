//! Static extraction of Python API surfaces.
//!
//! This crate loads a Python package without executing it and produces a
//! queryable object tree: modules, classes, functions, attributes, type
//! aliases, and the import indirections (aliases) between them. The tree can
//! be serialized to JSON and two trees can be compared for API-breaking
//! changes.
//!
//! ## Pipeline
//!
//! 1. [`finder::ModuleFinder`] locates the package layout on a search path.
//! 2. [`visitor`] lowers each parsed source file into the object model.
//! 3. [`loader::Loader`] drives the finder and visitor, merges stubs,
//!    expands `__all__` and wildcard imports, and resolves aliases.
//! 4. [`diff::find_breaking_changes`] walks two loaded trees.
//!
//! ## Example
//!
//! ```ignore
//! use griffe_core::loader::{LoadOptions, Loader};
//!
//! let options = LoadOptions::new(vec!["./src".into()]);
//! let mut loader = Loader::new(options);
//! let root = loader.load("mypkg")?;
//! let collection = loader.into_collection();
//! println!("{}", collection.path(root));
//! ```

pub mod collection;
pub mod diff;
pub mod docstring;
pub mod error;
pub mod expr;
pub mod finder;
pub mod git;
pub mod json;
pub mod lines;
pub mod loader;
pub mod merge;
pub mod mro;
pub mod object;
pub mod visitor;

pub use collection::{ModulesCollection, ObjectId};
pub use diff::{find_breaking_changes, Breakage, BreakageKind, ExplanationStyle};
pub use error::{GriffeError, Result};
pub use expr::Expr;
pub use loader::{LoadOptions, Loader};
pub use object::{Kind, Object};
