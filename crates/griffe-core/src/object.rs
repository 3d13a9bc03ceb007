//! The object model: modules, classes, functions, attributes, type aliases,
//! and the alias indirections between them.
//!
//! Objects share a set of common fields (name, location, parent handle,
//! members, labels, ...) and carry kind-specific payloads in a tagged
//! variant. Behavior that needs the whole address space (path computation,
//! scope resolution, alias walking) lives on
//! [`crate::collection::ModulesCollection`]; this module is the data.

use std::collections::BTreeSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::collection::ObjectId;
use crate::docstring::Docstring;
use crate::expr::Expr;

// ============================================================================
// Kinds
// ============================================================================

/// The kind of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Module,
    Class,
    Function,
    Attribute,
    TypeAlias,
    Alias,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Module => "module",
            Kind::Class => "class",
            Kind::Function => "function",
            Kind::Attribute => "attribute",
            Kind::TypeAlias => "type_alias",
            Kind::Alias => "alias",
        }
    }
}

/// How an object was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analysis {
    Static,
    Dynamic,
}

/// Deprecation marker: a bare flag or a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Deprecation {
    Flag,
    Message(String),
}

// ============================================================================
// Parameters and type parameters
// ============================================================================

/// The five Python parameter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::PositionalOnly => "positional-only",
            ParameterKind::PositionalOrKeyword => "positional-or-keyword",
            ParameterKind::VarPositional => "var-positional",
            ParameterKind::KeywordOnly => "keyword-only",
            ParameterKind::VarKeyword => "var-keyword",
        }
    }

    /// Whether parameters of this kind are addressed by position.
    pub fn is_positional(&self) -> bool {
        matches!(
            self,
            ParameterKind::PositionalOnly | ParameterKind::PositionalOrKeyword
        )
    }

    /// Whether this kind is a variadic marker.
    pub fn is_variadic(&self) -> bool {
        matches!(
            self,
            ParameterKind::VarPositional | ParameterKind::VarKeyword
        )
    }
}

/// A typed function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Parameter {
            name: name.into(),
            kind,
            annotation: None,
            default: None,
        }
    }

    /// A parameter is required when it has no default and is not variadic.
    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.kind.is_variadic()
    }
}

/// Type parameter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeParameterKind {
    TypeVar,
    TypeVarTuple,
    ParamSpec,
}

impl TypeParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeParameterKind::TypeVar => "type-var",
            TypeParameterKind::TypeVarTuple => "type-var-tuple",
            TypeParameterKind::ParamSpec => "param-spec",
        }
    }

    /// The prefix used when a resolved name binds to this parameter.
    pub fn prefix(&self) -> &'static str {
        match self {
            TypeParameterKind::TypeVar => "",
            TypeParameterKind::TypeVarTuple => "*",
            TypeParameterKind::ParamSpec => "**",
        }
    }
}

/// A type parameter. `bound` and `constraints` are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParameter {
    pub name: String,
    pub kind: TypeParameterKind,
    pub bound: Option<Expr>,
    pub constraints: Vec<Expr>,
    pub default: Option<Expr>,
}

impl TypeParameter {
    pub fn new(name: impl Into<String>, kind: TypeParameterKind) -> Self {
        TypeParameter {
            name: name.into(),
            kind,
            bound: None,
            constraints: Vec::new(),
            default: None,
        }
    }
}

/// A decorator expression with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub value: Expr,
    pub lineno: Option<usize>,
    pub endlineno: Option<usize>,
}

impl Decorator {
    /// The dotted path of the decorator callable, call parentheses stripped.
    pub fn callable_dotted(&self) -> Option<String> {
        match &self.value {
            Expr::Call { function, .. } => function.dotted(),
            other => other.dotted(),
        }
    }
}

// ============================================================================
// Exports
// ============================================================================

/// One entry of a module's `__all__`.
///
/// Entries start as strings or unresolved name expressions (for
/// `*other.__all__` style extensions) and are all strings once the loader
/// has expanded exports.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportItem {
    Name(String),
    Expr(Expr),
}

/// A pending `from module import *` recorded during the visit.
#[derive(Debug, Clone)]
pub struct WildcardImport {
    pub source_path: String,
    pub runtime: bool,
    pub lineno: Option<usize>,
}

// ============================================================================
// Kind payloads
// ============================================================================

/// Filesystem location of a module: a file, or directories for namespace
/// packages.
#[derive(Debug, Clone, PartialEq)]
pub enum ModulePath {
    File(PathBuf),
    Dirs(Vec<PathBuf>),
}

#[derive(Debug, Clone, Default)]
pub struct ModuleData {
    pub filepath: Option<ModulePath>,
    pub wildcard_imports: Vec<WildcardImport>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassData {
    pub bases: Vec<Expr>,
    pub decorators: Vec<Decorator>,
}

/// One recorded `typing.overload` signature of a function.
#[derive(Debug, Clone)]
pub struct Overload {
    pub parameters: Vec<Parameter>,
    pub returns: Option<Expr>,
    pub lineno: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionData {
    pub parameters: Vec<Parameter>,
    pub returns: Option<Expr>,
    pub decorators: Vec<Decorator>,
    pub overloads: Vec<Overload>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeData {
    pub value: Option<Expr>,
    pub annotation: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct TypeAliasData {
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct AliasData {
    /// The dotted path this alias points at.
    pub target_path: String,
    /// Cached resolved target; cleared when `target_path` changes.
    pub target: Option<ObjectId>,
    /// True for aliases derived from class inheritance.
    pub inherited: bool,
}

/// Kind-specific payload.
#[derive(Debug, Clone)]
pub enum ObjectData {
    Module(ModuleData),
    Class(ClassData),
    Function(FunctionData),
    Attribute(AttributeData),
    TypeAlias(TypeAliasData),
    Alias(AliasData),
}

impl ObjectData {
    pub fn kind(&self) -> Kind {
        match self {
            ObjectData::Module(_) => Kind::Module,
            ObjectData::Class(_) => Kind::Class,
            ObjectData::Function(_) => Kind::Function,
            ObjectData::Attribute(_) => Kind::Attribute,
            ObjectData::TypeAlias(_) => Kind::TypeAlias,
            ObjectData::Alias(_) => Kind::Alias,
        }
    }
}

// ============================================================================
// Object
// ============================================================================

/// A node of the object tree.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub lineno: Option<usize>,
    pub endlineno: Option<usize>,
    /// Back-reference to the containing module or class. `None` only for
    /// top-level modules and detached nodes.
    pub parent: Option<ObjectId>,
    /// Children in source order, keyed by local name.
    pub members: IndexMap<String, ObjectId>,
    /// Free-form labels (`"property"`, `"dataclass"`, ...).
    pub labels: BTreeSet<String>,
    /// Local name -> dotted path that introduced it.
    pub imports: IndexMap<String, String>,
    /// The `__all__` list; `None` when the module did not declare one.
    pub exports: Option<Vec<ExportItem>>,
    /// Reverse index: path of every alias pointing at this object.
    pub aliases: IndexMap<String, ObjectId>,
    /// False for objects under a `TYPE_CHECKING` guard.
    pub runtime: bool,
    /// Explicit visibility override.
    pub public: Option<bool>,
    pub docstring: Option<Docstring>,
    pub type_parameters: Vec<TypeParameter>,
    pub analysis: Option<Analysis>,
    pub deprecated: Option<Deprecation>,
    pub data: ObjectData,
}

impl Object {
    fn new(name: impl Into<String>, data: ObjectData) -> Self {
        Object {
            name: name.into(),
            lineno: None,
            endlineno: None,
            parent: None,
            members: IndexMap::new(),
            labels: BTreeSet::new(),
            imports: IndexMap::new(),
            exports: None,
            aliases: IndexMap::new(),
            runtime: true,
            public: None,
            docstring: None,
            type_parameters: Vec::new(),
            analysis: None,
            deprecated: None,
            data,
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        Object::new(name, ObjectData::Module(ModuleData::default()))
    }

    pub fn class(name: impl Into<String>) -> Self {
        Object::new(name, ObjectData::Class(ClassData::default()))
    }

    pub fn function(name: impl Into<String>) -> Self {
        Object::new(name, ObjectData::Function(FunctionData::default()))
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Object::new(name, ObjectData::Attribute(AttributeData::default()))
    }

    pub fn type_alias(name: impl Into<String>, value: Expr) -> Self {
        Object::new(name, ObjectData::TypeAlias(TypeAliasData { value }))
    }

    pub fn alias(name: impl Into<String>, target_path: impl Into<String>) -> Self {
        Object::new(
            name,
            ObjectData::Alias(AliasData {
                target_path: target_path.into(),
                target: None,
                inherited: false,
            }),
        )
    }

    pub fn kind(&self) -> Kind {
        self.data.kind()
    }

    pub fn is_module(&self) -> bool {
        matches!(self.data, ObjectData::Module(_))
    }

    pub fn is_class(&self) -> bool {
        matches!(self.data, ObjectData::Class(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.data, ObjectData::Function(_))
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.data, ObjectData::Attribute(_))
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.data, ObjectData::Alias(_))
    }

    pub fn as_module(&self) -> Option<&ModuleData> {
        match &self.data {
            ObjectData::Module(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_module_mut(&mut self) -> Option<&mut ModuleData> {
        match &mut self.data {
            ObjectData::Module(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassData> {
        match &self.data {
            ObjectData::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassData> {
        match &mut self.data {
            ObjectData::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.data {
            ObjectData::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionData> {
        match &mut self.data {
            ObjectData::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeData> {
        match &self.data {
            ObjectData::Attribute(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_attribute_mut(&mut self) -> Option<&mut AttributeData> {
        match &mut self.data {
            ObjectData::Attribute(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_type_alias(&self) -> Option<&TypeAliasData> {
        match &self.data {
            ObjectData::TypeAlias(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&AliasData> {
        match &self.data {
            ObjectData::Alias(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_alias_mut(&mut self) -> Option<&mut AliasData> {
        match &mut self.data {
            ObjectData::Alias(data) => Some(data),
            _ => None,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn add_label(&mut self, label: impl Into<String>) {
        self.labels.insert(label.into());
    }

    /// Whether this module object is an `__init__` file.
    pub fn is_init_module(&self) -> bool {
        match self.as_module().and_then(|data| data.filepath.as_ref()) {
            Some(ModulePath::File(path)) => path
                .file_stem()
                .is_some_and(|stem| stem.to_string_lossy() == "__init__"),
            _ => false,
        }
    }

    /// Whether this module object is a namespace package or subpackage.
    pub fn is_namespace_module(&self) -> bool {
        matches!(
            self.as_module().and_then(|data| data.filepath.as_ref()),
            Some(ModulePath::Dirs(_))
        )
    }
}

/// Whether a name is a dunder (`__name__`).
pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Whether a name is private by convention (leading underscore, not dunder).
pub fn is_private_name(name: &str) -> bool {
    name.starts_with('_') && !is_dunder(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_payloads() {
        assert_eq!(Object::module("m").kind(), Kind::Module);
        assert_eq!(Object::class("C").kind(), Kind::Class);
        assert_eq!(Object::function("f").kind(), Kind::Function);
        assert_eq!(Object::attribute("a").kind(), Kind::Attribute);
        assert_eq!(Object::alias("x", "a.b").kind(), Kind::Alias);
        assert_eq!(
            Object::type_alias("T", Expr::name("int")).kind(),
            Kind::TypeAlias,
        );
    }

    #[test]
    fn dunder_and_private_names() {
        assert!(is_dunder("__init__"));
        assert!(!is_dunder("__x"));
        assert!(!is_dunder("____"));
        assert!(is_private_name("_internal"));
        assert!(!is_private_name("__init__"));
        assert!(!is_private_name("public"));
    }

    #[test]
    fn parameter_required() {
        let mut parameter = Parameter::new("x", ParameterKind::PositionalOrKeyword);
        assert!(parameter.is_required());
        parameter.default = Some(Expr::constant("1"));
        assert!(!parameter.is_required());
        let variadic = Parameter::new("args", ParameterKind::VarPositional);
        assert!(!variadic.is_required());
    }

    #[test]
    fn decorator_callable_dotted_strips_call() {
        let plain = Decorator {
            value: Expr::name("property"),
            lineno: None,
            endlineno: None,
        };
        assert_eq!(plain.callable_dotted().as_deref(), Some("property"));
        let call = Decorator {
            value: Expr::Call {
                function: Box::new(Expr::Attribute {
                    value: Box::new(Expr::name("functools")),
                    attr: "lru_cache".to_string(),
                }),
                arguments: vec![],
            },
            lineno: None,
            endlineno: None,
        };
        assert_eq!(
            call.callable_dotted().as_deref(),
            Some("functools.lru_cache"),
        );
    }
}
