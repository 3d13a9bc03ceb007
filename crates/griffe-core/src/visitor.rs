//! The static visitor: parses one source file and lowers its AST into the
//! object model.
//!
//! Visitors are stateful per module and share nothing across modules. They
//! collect imports as aliases, capture `__all__`, recognize typing guards,
//! map well-known decorators to labels, record overloads and deprecation
//! markers, and re-parse string annotations unless the module activated
//! `from __future__ import annotations`.

use std::path::Path;

use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::Mode;
use tracing::{debug, warn};

use crate::collection::{ModulesCollection, ObjectId};
use crate::docstring::Docstring;
use crate::error::{GriffeError, Result};
use crate::expr::{safe_parse_expr, Expr};
use crate::lines::{LineIndex, LinesCollection};
use crate::object::{
    Analysis, Decorator, Deprecation, ExportItem, ModulePath, Object, Overload, Parameter,
    ParameterKind, TypeParameter, TypeParameterKind, WildcardImport,
};

/// Decorators recognized statically, mapped to the labels they imply.
/// Matching is on the full dotted render or its unqualified tail.
pub const DECORATOR_LABELS: &[(&str, &[&str])] = &[
    ("property", &["property"]),
    ("staticmethod", &["staticmethod"]),
    ("classmethod", &["classmethod"]),
    ("functools.cache", &["cached"]),
    ("functools.cached_property", &["cached", "property"]),
    ("functools.lru_cache", &["cached"]),
    ("dataclasses.dataclass", &["dataclass"]),
    ("abc.abstractmethod", &["abstractmethod"]),
    ("typing.overload", &["overload"]),
    ("typing.final", &["final"]),
    ("typing.runtime_checkable", &["runtime-checkable"]),
];

/// Parse and visit one module file, returning the new module object.
///
/// `module_path` is the full dotted path (`pkg.sub.mod`); the object is not
/// attached to any parent here, the loader does that.
pub fn visit_module(
    collection: &mut ModulesCollection,
    lines: &mut LinesCollection,
    module_path: &str,
    filepath: &Path,
    source: &str,
) -> Result<ObjectId> {
    let parsed = rustpython_parser::parse(source, Mode::Module, &filepath.to_string_lossy())
        .map_err(|error| GriffeError::unimportable(filepath, error.to_string()))?;
    let body = match parsed {
        ast::Mod::Module(module) => module.body,
        _ => Vec::new(),
    };

    lines.insert(filepath, source);
    let line_index = LineIndex::new(source);

    let name = module_path.rsplit('.').next().unwrap_or(module_path);
    let mut module = Object::module(name);
    module.analysis = Some(Analysis::Static);
    if let Some(data) = module.as_module_mut() {
        data.filepath = Some(ModulePath::File(filepath.to_path_buf()));
    }
    let module_id = collection.alloc(module);

    let future_annotations = body.iter().any(|stmt| match stmt {
        ast::Stmt::ImportFrom(import) => {
            import.module.as_ref().is_some_and(|m| m.as_str() == "__future__")
                && import
                    .names
                    .iter()
                    .any(|alias| alias.name.as_str() == "annotations")
        }
        _ => false,
    });

    let mut visitor = Visitor {
        collection,
        module: module_id,
        module_path: module_path.to_string(),
        is_init: filepath
            .file_stem()
            .is_some_and(|stem| stem.to_string_lossy() == "__init__"),
        line_index,
        future_annotations,
        type_checking: false,
    };
    visitor.visit_body(&body, module_id, true);
    Ok(module_id)
}

struct Visitor<'a> {
    collection: &'a mut ModulesCollection,
    module: ObjectId,
    module_path: String,
    is_init: bool,
    line_index: LineIndex,
    future_annotations: bool,
    type_checking: bool,
}

impl Visitor<'_> {
    fn line(&self, offset: ast::text_size::TextSize) -> usize {
        self.line_index.line_of(offset.to_usize())
    }

    fn end_line(&self, range: ast::text_size::TextRange) -> usize {
        self.line_index
            .line_of(range.end().to_usize().saturating_sub(1))
    }

    /// Visit a statement sequence. With `docstring_position`, the first
    /// statement may be the scope's docstring; later bare strings document
    /// the attributes assigned just before them.
    fn visit_body(&mut self, body: &[ast::Stmt], scope: ObjectId, docstring_position: bool) {
        let mut previous_attributes: Vec<ObjectId> = Vec::new();
        for (index, stmt) in body.iter().enumerate() {
            if let Some(docstring) = string_statement(stmt) {
                if index == 0 && docstring_position {
                    let docstring = self.build_docstring(stmt, docstring);
                    self.collection.object_mut(scope).docstring = Some(docstring);
                    continue;
                }
                if !previous_attributes.is_empty() {
                    let docstring = self.build_docstring(stmt, docstring);
                    for attribute in previous_attributes.drain(..) {
                        self.collection.object_mut(attribute).docstring =
                            Some(docstring.clone());
                    }
                    continue;
                }
            }
            previous_attributes = self.visit_stmt(stmt, scope);
        }
    }

    fn build_docstring(&self, stmt: &ast::Stmt, text: &str) -> Docstring {
        let mut docstring = Docstring::new(clean_docstring(text));
        docstring.lineno = Some(self.line(stmt.range().start()));
        docstring.endlineno = Some(self.end_line(stmt.range()));
        docstring
    }

    /// Visit one statement; returns the attributes it defined so a following
    /// bare string can document them.
    fn visit_stmt(&mut self, stmt: &ast::Stmt, scope: ObjectId) -> Vec<ObjectId> {
        match stmt {
            ast::Stmt::FunctionDef(node) => {
                self.handle_function(
                    FunctionParts {
                        name: node.name.as_str(),
                        args: &node.args,
                        body: &node.body,
                        decorator_list: &node.decorator_list,
                        returns: node.returns.as_deref(),
                        type_params: &node.type_params,
                        range: node.range,
                    },
                    scope,
                    false,
                );
            }
            ast::Stmt::AsyncFunctionDef(node) => {
                self.handle_function(
                    FunctionParts {
                        name: node.name.as_str(),
                        args: &node.args,
                        body: &node.body,
                        decorator_list: &node.decorator_list,
                        returns: node.returns.as_deref(),
                        type_params: &node.type_params,
                        range: node.range,
                    },
                    scope,
                    true,
                );
            }
            ast::Stmt::ClassDef(node) => self.handle_class(node, scope),
            ast::Stmt::Assign(node) => {
                return self.handle_assign(&node.targets, Some(&node.value), None, node.range, scope);
            }
            ast::Stmt::AnnAssign(node) => {
                return self.handle_assign(
                    std::slice::from_ref(node.target.as_ref()),
                    node.value.as_deref(),
                    Some(&node.annotation),
                    node.range,
                    scope,
                );
            }
            ast::Stmt::AugAssign(node) => {
                if scope == self.module && is_name(&node.target, "__all__") {
                    let items = self.parse_export_items(&node.value, scope);
                    self.extend_exports(items);
                }
            }
            ast::Stmt::Import(node) => self.handle_import(node, scope),
            ast::Stmt::ImportFrom(node) => self.handle_import_from(node, scope),
            ast::Stmt::If(node) => {
                if is_type_checking(&node.test) {
                    let saved = self.type_checking;
                    self.type_checking = true;
                    self.visit_block(&node.body, scope);
                    self.type_checking = saved;
                    self.visit_block(&node.orelse, scope);
                } else {
                    // Both branches contribute to the API surface.
                    self.visit_block(&node.body, scope);
                    self.visit_block(&node.orelse, scope);
                }
            }
            ast::Stmt::Try(node) => {
                self.visit_block(&node.body, scope);
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.visit_block(&handler.body, scope);
                }
                self.visit_block(&node.orelse, scope);
                self.visit_block(&node.finalbody, scope);
            }
            ast::Stmt::With(node) => self.visit_block(&node.body, scope),
            ast::Stmt::TypeAlias(node) => self.handle_type_alias(node, scope),
            ast::Stmt::Expr(node) => self.handle_expr_statement(&node.value, scope),
            _ => {}
        }
        Vec::new()
    }

    fn visit_block(&mut self, body: &[ast::Stmt], scope: ObjectId) {
        for stmt in body {
            self.visit_stmt(stmt, scope);
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn handle_function(&mut self, parts: FunctionParts<'_>, scope: ObjectId, is_async: bool) {
        let previous = self.collection.get_member(scope, parts.name);
        let mut inherited_overloads: Vec<Overload> = Vec::new();
        if let Some(previous) = previous {
            let previous_object = self.collection.object(previous);
            if previous_object.is_function() && previous_object.has_label("overload") {
                if let Some(data) = previous_object.as_function() {
                    inherited_overloads = data.overloads.clone();
                    inherited_overloads.push(Overload {
                        parameters: data.parameters.clone(),
                        returns: data.returns.clone(),
                        lineno: previous_object.lineno,
                    });
                }
            } else {
                debug!(
                    member = %format!("{}.{}", self.collection.path(scope), parts.name),
                    "redefinition replaces previous member",
                );
            }
        }

        let function_id = self.collection.alloc(Object::function(parts.name));
        self.collection.set_member(scope, parts.name, function_id);

        let decorators = self.build_decorators(parts.decorator_list, scope);
        let mut labels = decorator_labels(&decorators);
        if is_async {
            labels.push("async".to_string());
        }
        let deprecated = deprecation_from_decorators(&decorators);

        let type_parameters = self.build_type_parameters(parts.type_params, function_id);
        {
            let object = self.collection.object_mut(function_id);
            object.type_parameters = type_parameters;
        }
        let parameters = self.build_parameters(parts.args, function_id);
        let returns = parts
            .returns
            .map(|annotation| self.annotation_expr(annotation, function_id));

        let lineno = self.line(parts.range.start());
        let endlineno = self.end_line(parts.range);
        let object = self.collection.object_mut(function_id);
        object.lineno = Some(lineno);
        object.endlineno = Some(endlineno);
        object.runtime = !self.type_checking;
        object.deprecated = deprecated;
        for label in labels {
            object.labels.insert(label);
        }
        if let Some(data) = object.as_function_mut() {
            data.parameters = parameters;
            data.returns = returns;
            data.decorators = decorators;
            data.overloads = inherited_overloads;
        }

        // Scan __init__ bodies for instance attributes on the class.
        if parts.name == "__init__" && self.collection.object(scope).is_class() {
            self.scan_instance_attributes(parts.body, scope, function_id);
        }
    }

    fn scan_instance_attributes(
        &mut self,
        body: &[ast::Stmt],
        class: ObjectId,
        function: ObjectId,
    ) {
        for stmt in body {
            let (targets, value, annotation, range) = match stmt {
                ast::Stmt::Assign(node) => {
                    (node.targets.iter().collect::<Vec<_>>(), Some(&*node.value), None, node.range)
                }
                ast::Stmt::AnnAssign(node) => (
                    vec![node.target.as_ref()],
                    node.value.as_deref(),
                    Some(&*node.annotation),
                    node.range,
                ),
                _ => continue,
            };
            for target in targets {
                let ast::Expr::Attribute(attribute) = target else {
                    continue;
                };
                if !is_name(&attribute.value, "self") {
                    continue;
                }
                let name = attribute.attr.as_str();
                if self.collection.get_member(class, name).is_some() {
                    continue;
                }
                let attribute_id = self.collection.alloc(Object::attribute(name));
                self.collection.set_member(class, name, attribute_id);
                let value_expr = value.map(|value| Expr::from_ast(value, Some(function)));
                let annotation_expr =
                    annotation.map(|annotation| self.annotation_expr(annotation, function));
                let lineno = self.line(range.start());
                let endlineno = self.end_line(range);
                let object = self.collection.object_mut(attribute_id);
                object.lineno = Some(lineno);
                object.endlineno = Some(endlineno);
                object.runtime = !self.type_checking;
                object.labels.insert("instance-attribute".to_string());
                if let Some(data) = object.as_attribute_mut() {
                    data.value = value_expr;
                    data.annotation = annotation_expr;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    fn handle_class(&mut self, node: &ast::StmtClassDef, scope: ObjectId) {
        let class_id = self.collection.alloc(Object::class(node.name.as_str()));
        self.collection.set_member(scope, node.name.as_str(), class_id);

        let decorators = self.build_decorators(&node.decorator_list, scope);
        let labels = decorator_labels(&decorators);
        let deprecated = deprecation_from_decorators(&decorators);
        let type_parameters = self.build_type_parameters(&node.type_params, class_id);
        // Bases resolve in the enclosing scope, not the class body.
        let bases: Vec<Expr> = node
            .bases
            .iter()
            .map(|base| Expr::from_ast(base, Some(scope)))
            .collect();

        let lineno = self.line(node.range.start());
        let endlineno = self.end_line(node.range);
        let object = self.collection.object_mut(class_id);
        object.lineno = Some(lineno);
        object.endlineno = Some(endlineno);
        object.runtime = !self.type_checking;
        object.deprecated = deprecated;
        object.type_parameters = type_parameters;
        for label in labels {
            object.labels.insert(label);
        }
        if let Some(data) = object.as_class_mut() {
            data.bases = bases;
            data.decorators = decorators;
        }

        self.visit_body(&node.body, class_id, true);
    }

    // ------------------------------------------------------------------
    // Assignments and attributes
    // ------------------------------------------------------------------

    fn handle_assign(
        &mut self,
        targets: &[ast::Expr],
        value: Option<&ast::Expr>,
        annotation: Option<&ast::Expr>,
        range: ast::text_size::TextRange,
        scope: ObjectId,
    ) -> Vec<ObjectId> {
        // __all__ is the module's export contract, not an attribute.
        if scope == self.module && targets.len() == 1 && is_name(&targets[0], "__all__") {
            let items = value
                .map(|value| self.parse_export_items(value, scope))
                .unwrap_or_default();
            self.collection.object_mut(scope).exports = Some(items);
            return Vec::new();
        }

        let mut names: Vec<String> = Vec::new();
        for target in targets {
            match target {
                ast::Expr::Name(name) => names.push(name.id.as_str().to_string()),
                ast::Expr::Tuple(tuple) => {
                    for element in &tuple.elts {
                        if let ast::Expr::Name(name) = element {
                            names.push(name.id.as_str().to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        let scope_is_module = self.collection.object(scope).is_module();
        let scope_is_class = self.collection.object(scope).is_class();
        if !scope_is_module && !scope_is_class {
            return Vec::new();
        }

        let mut created = Vec::new();
        for name in names {
            let attribute_id = self.collection.alloc(Object::attribute(&name));
            self.collection.set_member(scope, &name, attribute_id);
            let value_expr = value.map(|value| Expr::from_ast(value, Some(scope)));
            let annotation_expr =
                annotation.map(|annotation| self.annotation_expr(annotation, attribute_id));
            let is_type_alias_annotation = annotation_expr
                .as_ref()
                .and_then(|expr| expr.dotted())
                .is_some_and(|dotted| {
                    dotted == "TypeAlias" || dotted.ends_with(".TypeAlias")
                });
            let lineno = self.line(range.start());
            let endlineno = self.end_line(range);
            let object = self.collection.object_mut(attribute_id);
            object.lineno = Some(lineno);
            object.endlineno = Some(endlineno);
            object.runtime = !self.type_checking;
            if scope_is_class {
                object.labels.insert("class-attribute".to_string());
            } else {
                object.labels.insert("module-attribute".to_string());
            }
            if is_type_alias_annotation {
                object.labels.insert("type-alias".to_string());
            }
            if let Some(data) = object.as_attribute_mut() {
                data.value = value_expr;
                data.annotation = annotation_expr;
            }
            created.push(attribute_id);
        }
        created
    }

    fn handle_type_alias(&mut self, node: &ast::StmtTypeAlias, scope: ObjectId) {
        let ast::Expr::Name(name) = node.name.as_ref() else {
            return;
        };
        let alias_id = self
            .collection
            .alloc(Object::type_alias(name.id.as_str(), Expr::constant("...")));
        self.collection.set_member(scope, name.id.as_str(), alias_id);
        let type_parameters = self.build_type_parameters(&node.type_params, alias_id);
        let value = Expr::from_ast(&node.value, Some(alias_id));
        let lineno = self.line(node.range.start());
        let endlineno = self.end_line(node.range);
        let object = self.collection.object_mut(alias_id);
        object.lineno = Some(lineno);
        object.endlineno = Some(endlineno);
        object.runtime = !self.type_checking;
        object.type_parameters = type_parameters;
        if let crate::object::ObjectData::TypeAlias(data) = &mut object.data {
            data.value = value;
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn handle_import(&mut self, node: &ast::StmtImport, scope: ObjectId) {
        for alias in &node.names {
            let full = alias.name.as_str();
            let (local, target) = match &alias.asname {
                Some(asname) => (asname.as_str().to_string(), full.to_string()),
                None => {
                    let first = full.split('.').next().unwrap_or(full);
                    (first.to_string(), first.to_string())
                }
            };
            self.add_import_alias(scope, &local, &target, full, alias.range);
        }
    }

    fn handle_import_from(&mut self, node: &ast::StmtImportFrom, scope: ObjectId) {
        let level = node.level.map(|level| level.to_usize()).unwrap_or(0);
        let base = match self.resolve_relative(node.module.as_ref().map(|m| m.as_str()), level) {
            Some(base) => base,
            None => {
                warn!(
                    module = %self.module_path,
                    "relative import reaches beyond the top-level package",
                );
                return;
            }
        };
        for alias in &node.names {
            let name = alias.name.as_str();
            if name == "*" {
                let lineno = self.line(node.range.start());
                let runtime = !self.type_checking;
                if let Some(data) = self.collection.object_mut(self.module).as_module_mut() {
                    data.wildcard_imports.push(WildcardImport {
                        source_path: base.clone(),
                        runtime,
                        lineno: Some(lineno),
                    });
                }
                continue;
            }
            let target = format!("{base}.{name}");
            let local = alias
                .asname
                .as_ref()
                .map(|asname| asname.as_str())
                .unwrap_or(name);
            self.add_import_alias(scope, local, &target, &target, alias.range);
        }
    }

    fn add_import_alias(
        &mut self,
        scope: ObjectId,
        local: &str,
        target: &str,
        import_path: &str,
        range: ast::text_size::TextRange,
    ) {
        let alias_id = self.collection.alloc(Object::alias(local, target));
        self.collection.set_member(scope, local, alias_id);
        let lineno = self.line(range.start());
        let object = self.collection.object_mut(alias_id);
        object.lineno = Some(lineno);
        object.runtime = !self.type_checking;
        self.collection
            .object_mut(scope)
            .imports
            .insert(local.to_string(), import_path.to_string());
    }

    /// Compute the absolute base of a `from ... import` statement.
    fn resolve_relative(&self, module: Option<&str>, level: usize) -> Option<String> {
        if level == 0 {
            return module.map(str::to_string);
        }
        let mut parts: Vec<&str> = self.module_path.split('.').collect();
        // One dot from an __init__ names the package itself; from a regular
        // module it names the containing package.
        let keep = if self.is_init {
            parts.len()
        } else {
            parts.len().checked_sub(1)?
        };
        let keep = keep.checked_sub(level - 1)?;
        if keep == 0 {
            return None;
        }
        parts.truncate(keep);
        let base = parts.join(".");
        match module {
            Some(module) => Some(format!("{base}.{module}")),
            None => Some(base),
        }
    }

    // ------------------------------------------------------------------
    // Exports
    // ------------------------------------------------------------------

    fn parse_export_items(&self, expr: &ast::Expr, scope: ObjectId) -> Vec<ExportItem> {
        match expr {
            ast::Expr::List(list) => self.export_elements(&list.elts, scope),
            ast::Expr::Tuple(tuple) => self.export_elements(&tuple.elts, scope),
            ast::Expr::Set(set) => self.export_elements(&set.elts, scope),
            ast::Expr::BinOp(binop) if matches!(binop.op, ast::Operator::Add) => {
                let mut items = self.parse_export_items(&binop.left, scope);
                items.extend(self.parse_export_items(&binop.right, scope));
                items
            }
            other => self.export_element(other, scope),
        }
    }

    fn export_elements(&self, elements: &[ast::Expr], scope: ObjectId) -> Vec<ExportItem> {
        elements
            .iter()
            .flat_map(|element| self.export_element(element, scope))
            .collect()
    }

    fn export_element(&self, element: &ast::Expr, scope: ObjectId) -> Vec<ExportItem> {
        match element {
            ast::Expr::Constant(constant) => match &constant.value {
                ast::Constant::Str(name) => vec![ExportItem::Name(name.clone())],
                _ => Vec::new(),
            },
            ast::Expr::Starred(starred) => {
                vec![ExportItem::Expr(Expr::from_ast(&starred.value, Some(scope)))]
            }
            other => vec![ExportItem::Expr(Expr::from_ast(other, Some(scope)))],
        }
    }

    fn extend_exports(&mut self, items: Vec<ExportItem>) {
        let exports = self
            .collection
            .object_mut(self.module)
            .exports
            .get_or_insert_with(Vec::new);
        exports.extend(items);
    }

    fn handle_expr_statement(&mut self, value: &ast::Expr, scope: ObjectId) {
        // `__all__.append(...)` / `__all__.extend(...)`.
        let ast::Expr::Call(call) = value else {
            return;
        };
        let ast::Expr::Attribute(attribute) = call.func.as_ref() else {
            return;
        };
        if !is_name(&attribute.value, "__all__")
            || !matches!(attribute.attr.as_str(), "append" | "extend")
        {
            return;
        }
        if scope != self.module {
            return;
        }
        let mut items = Vec::new();
        for argument in &call.args {
            items.extend(self.parse_export_items(argument, scope));
        }
        self.extend_exports(items);
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn build_decorators(&self, decorator_list: &[ast::Expr], scope: ObjectId) -> Vec<Decorator> {
        decorator_list
            .iter()
            .map(|decorator| Decorator {
                value: Expr::from_ast(decorator, Some(scope)),
                lineno: Some(self.line(decorator.range().start())),
                endlineno: Some(self.end_line(decorator.range())),
            })
            .collect()
    }

    fn build_parameters(&self, args: &ast::Arguments, scope: ObjectId) -> Vec<Parameter> {
        let mut parameters = Vec::new();
        let mut push = |parameters: &mut Vec<Parameter>,
                        arg: &ast::Arg,
                        default: Option<&ast::Expr>,
                        kind: ParameterKind| {
            let mut parameter = Parameter::new(arg.arg.as_str(), kind);
            parameter.annotation = arg
                .annotation
                .as_deref()
                .map(|annotation| self.annotation_expr(annotation, scope));
            parameter.default = default.map(|default| Expr::from_ast(default, Some(scope)));
            parameters.push(parameter);
        };
        for argument in &args.posonlyargs {
            push(
                &mut parameters,
                &argument.def,
                argument.default.as_deref(),
                ParameterKind::PositionalOnly,
            );
        }
        for argument in &args.args {
            push(
                &mut parameters,
                &argument.def,
                argument.default.as_deref(),
                ParameterKind::PositionalOrKeyword,
            );
        }
        if let Some(vararg) = &args.vararg {
            push(&mut parameters, vararg, None, ParameterKind::VarPositional);
        }
        for argument in &args.kwonlyargs {
            push(
                &mut parameters,
                &argument.def,
                argument.default.as_deref(),
                ParameterKind::KeywordOnly,
            );
        }
        if let Some(kwarg) = &args.kwarg {
            push(&mut parameters, kwarg, None, ParameterKind::VarKeyword);
        }
        parameters
    }

    fn build_type_parameters(
        &self,
        type_params: &[ast::TypeParam],
        scope: ObjectId,
    ) -> Vec<TypeParameter> {
        type_params
            .iter()
            .map(|type_param| match type_param {
                ast::TypeParam::TypeVar(node) => {
                    let mut parameter =
                        TypeParameter::new(node.name.as_str(), TypeParameterKind::TypeVar);
                    // A tuple bound is a constraint list, anything else a bound.
                    match node.bound.as_deref() {
                        Some(ast::Expr::Tuple(tuple)) => {
                            parameter.constraints = tuple
                                .elts
                                .iter()
                                .map(|element| Expr::from_ast(element, Some(scope)))
                                .collect();
                        }
                        Some(bound) => {
                            parameter.bound = Some(Expr::from_ast(bound, Some(scope)));
                        }
                        None => {}
                    }
                    parameter
                }
                ast::TypeParam::TypeVarTuple(node) => {
                    TypeParameter::new(node.name.as_str(), TypeParameterKind::TypeVarTuple)
                }
                ast::TypeParam::ParamSpec(node) => {
                    TypeParameter::new(node.name.as_str(), TypeParameterKind::ParamSpec)
                }
            })
            .collect()
    }

    /// Build an annotation expression, re-parsing string annotations unless
    /// `from __future__ import annotations` is active.
    fn annotation_expr(&self, annotation: &ast::Expr, scope: ObjectId) -> Expr {
        if let ast::Expr::Constant(constant) = annotation {
            if let ast::Constant::Str(text) = &constant.value {
                if !self.future_annotations {
                    if let Some(expr) = safe_parse_expr(text, Some(scope)) {
                        return expr;
                    }
                }
                return Expr::from_ast(annotation, Some(scope));
            }
        }
        Expr::from_ast(annotation, Some(scope))
    }
}

/// Borrowed pieces of a (possibly async) function definition.
struct FunctionParts<'a> {
    name: &'a str,
    args: &'a ast::Arguments,
    body: &'a [ast::Stmt],
    decorator_list: &'a [ast::Expr],
    returns: Option<&'a ast::Expr>,
    type_params: &'a [ast::TypeParam],
    range: ast::text_size::TextRange,
}

// ============================================================================
// Free helpers
// ============================================================================

fn is_name(expr: &ast::Expr, name: &str) -> bool {
    matches!(expr, ast::Expr::Name(node) if node.id.as_str() == name)
}

fn is_type_checking(test: &ast::Expr) -> bool {
    match test {
        ast::Expr::Name(node) => node.id.as_str() == "TYPE_CHECKING",
        ast::Expr::Attribute(node) => node.attr.as_str() == "TYPE_CHECKING",
        _ => false,
    }
}

fn string_statement(stmt: &ast::Stmt) -> Option<&str> {
    if let ast::Stmt::Expr(node) = stmt {
        if let ast::Expr::Constant(constant) = node.value.as_ref() {
            if let ast::Constant::Str(text) = &constant.value {
                return Some(text);
            }
        }
    }
    None
}

/// Strip the docstring the way `inspect.cleandoc` does: trim the first line,
/// dedent the rest.
fn clean_docstring(text: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("").trim();
    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut cleaned = vec![first.to_string()];
    for line in &rest {
        if line.len() >= indent {
            cleaned.push(line[indent..].trim_end().to_string());
        } else {
            cleaned.push(line.trim().to_string());
        }
    }
    while cleaned.last().is_some_and(|line| line.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

fn decorator_labels(decorators: &[Decorator]) -> Vec<String> {
    let mut labels = Vec::new();
    for decorator in decorators {
        let Some(dotted) = decorator.callable_dotted() else {
            continue;
        };
        for (known, implied) in DECORATOR_LABELS {
            let tail = known.rsplit('.').next().unwrap_or(known);
            if dotted == *known || dotted == tail {
                for label in *implied {
                    labels.push((*label).to_string());
                }
            }
        }
    }
    labels
}

fn deprecation_from_decorators(decorators: &[Decorator]) -> Option<Deprecation> {
    for decorator in decorators {
        let Some(dotted) = decorator.callable_dotted() else {
            continue;
        };
        if dotted != "deprecated" && !dotted.ends_with(".deprecated") {
            continue;
        }
        if let Expr::Call { arguments, .. } = &decorator.value {
            if let Some(Expr::Constant { value }) = arguments.first() {
                if let Some(message) = unquote(value) {
                    return Some(Deprecation::Message(message));
                }
            }
        }
        return Some(Deprecation::Flag);
    }
    None
}

/// Undo the source-form quoting of a string constant.
fn unquote(value: &str) -> Option<String> {
    let inner = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .or_else(|| {
            value
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
        })?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => break,
            }
        } else {
            out.push(ch);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Kind;
    use std::path::PathBuf;

    fn visit(source: &str) -> (ModulesCollection, ObjectId) {
        let mut collection = ModulesCollection::new();
        let mut lines = LinesCollection::new();
        let module = visit_module(
            &mut collection,
            &mut lines,
            "m",
            &PathBuf::from("m.py"),
            source,
        )
        .unwrap();
        collection.insert_top_level(module);
        (collection, module)
    }

    #[test]
    fn module_docstring_and_members() {
        let (collection, module) = visit("\"\"\"Module doc.\"\"\"\n\nX = 1\n\ndef f(x):\n    return x\n");
        let object = collection.object(module);
        assert_eq!(object.docstring.as_ref().unwrap().value, "Module doc.");
        let attribute = collection.get_member(module, "X").unwrap();
        assert_eq!(collection.object(attribute).kind(), Kind::Attribute);
        let function = collection.get_member(module, "f").unwrap();
        assert_eq!(collection.object(function).kind(), Kind::Function);
        assert_eq!(collection.object(function).lineno, Some(5));
    }

    #[test]
    fn attribute_docstring_attaches() {
        let (collection, module) = visit("X = 1\n\"\"\"The X constant.\"\"\"\n");
        let attribute = collection.get_member(module, "X").unwrap();
        assert_eq!(
            collection.object(attribute).docstring.as_ref().unwrap().value,
            "The X constant.",
        );
    }

    #[test]
    fn imports_become_aliases() {
        let (collection, module) = visit("from os.path import join as j\nimport sys\n");
        let alias = collection.get_member(module, "j").unwrap();
        assert_eq!(
            collection.object(alias).as_alias().unwrap().target_path,
            "os.path.join",
        );
        let sys_alias = collection.get_member(module, "sys").unwrap();
        assert_eq!(
            collection.object(sys_alias).as_alias().unwrap().target_path,
            "sys",
        );
        assert_eq!(
            collection.object(module).imports.get("j").map(String::as_str),
            Some("os.path.join"),
        );
    }

    #[test]
    fn relative_imports_resolve() {
        let mut collection = ModulesCollection::new();
        let mut lines = LinesCollection::new();
        let module = visit_module(
            &mut collection,
            &mut lines,
            "pkg.sub.mod",
            &PathBuf::from("pkg/sub/mod.py"),
            "from . import sibling\nfrom ..other import thing\n",
        )
        .unwrap();
        let sibling = collection.get_member(module, "sibling").unwrap();
        assert_eq!(
            collection.object(sibling).as_alias().unwrap().target_path,
            "pkg.sub.sibling",
        );
        let thing = collection.get_member(module, "thing").unwrap();
        assert_eq!(
            collection.object(thing).as_alias().unwrap().target_path,
            "pkg.other.thing",
        );
    }

    #[test]
    fn init_relative_import_names_own_package() {
        let mut collection = ModulesCollection::new();
        let mut lines = LinesCollection::new();
        let module = visit_module(
            &mut collection,
            &mut lines,
            "pkg",
            &PathBuf::from("pkg/__init__.py"),
            "from .mod import thing\n",
        )
        .unwrap();
        let thing = collection.get_member(module, "thing").unwrap();
        assert_eq!(
            collection.object(thing).as_alias().unwrap().target_path,
            "pkg.mod.thing",
        );
    }

    #[test]
    fn all_capture_with_augmented_assign() {
        let (collection, module) = visit(
            "__all__ = ['a']\n__all__ += ['b']\n__all__.append('c')\n__all__.extend(['d'])\n",
        );
        assert_eq!(
            collection.expanded_exports(module),
            Some(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "d".to_string(),
            ]),
        );
    }

    #[test]
    fn all_unresolved_entries_stay_expressions() {
        let (collection, module) = visit("__all__ = ['a', *sub.__all__]\n");
        let exports = collection.object(module).exports.as_ref().unwrap();
        assert_eq!(exports.len(), 2);
        assert!(matches!(exports[0], ExportItem::Name(_)));
        assert!(matches!(exports[1], ExportItem::Expr(_)));
    }

    #[test]
    fn type_checking_guard_clears_runtime() {
        let (collection, module) = visit(
            "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    from os import path\nX = 1\n",
        );
        let path_alias = collection.get_member(module, "path").unwrap();
        assert!(!collection.object(path_alias).runtime);
        let attribute = collection.get_member(module, "X").unwrap();
        assert!(collection.object(attribute).runtime);
    }

    #[test]
    fn wildcard_import_is_recorded() {
        let (collection, module) = visit("from helpers import *\n");
        let data = collection.object(module).as_module().unwrap();
        assert_eq!(data.wildcard_imports.len(), 1);
        assert_eq!(data.wildcard_imports[0].source_path, "helpers");
    }

    #[test]
    fn decorators_map_to_labels() {
        let (collection, module) = visit(
            "import functools\n\nclass C:\n    @property\n    def x(self):\n        ...\n    @functools.cached_property\n    def y(self):\n        ...\n    @staticmethod\n    def s():\n        ...\n",
        );
        let class = collection.get_member(module, "C").unwrap();
        let x = collection.get_member(class, "x").unwrap();
        assert!(collection.object(x).has_label("property"));
        let y = collection.get_member(class, "y").unwrap();
        assert!(collection.object(y).has_label("cached"));
        assert!(collection.object(y).has_label("property"));
        let s = collection.get_member(class, "s").unwrap();
        assert!(collection.object(s).has_label("staticmethod"));
    }

    #[test]
    fn overloads_accumulate_on_final_definition() {
        let (collection, module) = visit(
            "from typing import overload\n\n@overload\ndef f(x: int) -> int: ...\n@overload\ndef f(x: str) -> str: ...\ndef f(x):\n    return x\n",
        );
        let function = collection.get_member(module, "f").unwrap();
        let object = collection.object(function);
        assert!(!object.has_label("overload"));
        let data = object.as_function().unwrap();
        assert_eq!(data.overloads.len(), 2);
        assert_eq!(
            data.overloads[0].returns.as_ref().unwrap().to_string(),
            "int",
        );
    }

    #[test]
    fn deprecated_decorator_with_message() {
        let (collection, module) = visit(
            "import warnings\n\n@warnings.deprecated('use g instead')\ndef f():\n    ...\n",
        );
        let function = collection.get_member(module, "f").unwrap();
        assert_eq!(
            collection.object(function).deprecated,
            Some(Deprecation::Message("use g instead".to_string())),
        );
    }

    #[test]
    fn string_annotations_reparse_without_future_import() {
        let (collection, module) = visit("def f(x: 'list[int]') -> 'str':\n    ...\n");
        let function = collection.get_member(module, "f").unwrap();
        let data = collection.object(function).as_function().unwrap();
        assert_eq!(
            data.parameters[0].annotation.as_ref().unwrap().to_string(),
            "list[int]",
        );
        assert_eq!(data.returns.as_ref().unwrap().to_string(), "str");
    }

    #[test]
    fn string_annotations_kept_with_future_import() {
        let (collection, module) = visit(
            "from __future__ import annotations\n\ndef f(x: 'list[int]'):\n    ...\n",
        );
        let function = collection.get_member(module, "f").unwrap();
        let data = collection.object(function).as_function().unwrap();
        assert_eq!(
            data.parameters[0].annotation.as_ref().unwrap().to_string(),
            "'list[int]'",
        );
    }

    #[test]
    fn instance_attributes_from_init() {
        let (collection, module) = visit(
            "class C:\n    def __init__(self, x: int):\n        self.x: int = x\n        self._private = None\n",
        );
        let class = collection.get_member(module, "C").unwrap();
        let x = collection.get_member(class, "x").unwrap();
        assert!(collection.object(x).has_label("instance-attribute"));
        assert_eq!(
            collection
                .object(x)
                .as_attribute()
                .unwrap()
                .annotation
                .as_ref()
                .unwrap()
                .to_string(),
            "int",
        );
        assert!(collection.get_member(class, "_private").is_some());
    }

    #[test]
    fn parameters_capture_kinds_and_defaults() {
        let (collection, module) = visit(
            "def f(a, /, b, c=1, *args, d, e=2, **kwargs):\n    ...\n",
        );
        let function = collection.get_member(module, "f").unwrap();
        let data = collection.object(function).as_function().unwrap();
        let kinds: Vec<ParameterKind> = data.parameters.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParameterKind::PositionalOnly,
                ParameterKind::PositionalOrKeyword,
                ParameterKind::PositionalOrKeyword,
                ParameterKind::VarPositional,
                ParameterKind::KeywordOnly,
                ParameterKind::KeywordOnly,
                ParameterKind::VarKeyword,
            ],
        );
        assert_eq!(
            data.parameters[2].default.as_ref().unwrap().to_string(),
            "1",
        );
        assert!(data.parameters[4].is_required());
        assert!(!data.parameters[5].is_required());
    }

    #[test]
    fn type_alias_statement() {
        let (collection, module) = visit("type Vector = list[float]\n");
        let alias = collection.get_member(module, "Vector").unwrap();
        assert_eq!(collection.object(alias).kind(), Kind::TypeAlias);
        assert_eq!(
            collection.object(alias).as_type_alias().unwrap().value.to_string(),
            "list[float]",
        );
    }

    #[test]
    fn type_parameters_on_class() {
        let (collection, module) = visit("class Box[T]:\n    ...\n");
        let class = collection.get_member(module, "Box").unwrap();
        let object = collection.object(class);
        assert_eq!(object.type_parameters.len(), 1);
        assert_eq!(object.type_parameters[0].name, "T");
        assert_eq!(object.type_parameters[0].kind, TypeParameterKind::TypeVar);
    }

    #[test]
    fn syntax_error_is_unimportable() {
        let mut collection = ModulesCollection::new();
        let mut lines = LinesCollection::new();
        let error = visit_module(
            &mut collection,
            &mut lines,
            "bad",
            &PathBuf::from("bad.py"),
            "def broken(:\n",
        )
        .unwrap_err();
        assert!(matches!(error, GriffeError::UnimportableModule { .. }));
    }
}
