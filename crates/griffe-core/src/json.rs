//! Structural JSON (de)serialization of the object model.
//!
//! Every node carries `kind` and `name`; other keys appear only when
//! present. Aliases serialize their `target_path` instead of inlining the
//! target, so round-tripping a whole collection preserves graph identity.
//! Expressions serialize as their canonical source render and are re-parsed
//! on load, which keeps `from_json(to_json(x))` byte-stable.

use serde_json::{json, Map, Value};

use crate::collection::{ModulesCollection, ObjectId};
use crate::docstring::{Docstring, DocstringStyle};
use crate::error::{GriffeError, Result};
use crate::expr::{safe_parse_expr, Expr};
use crate::object::{
    Analysis, Deprecation, ExportItem, Kind, ModulePath, Object, Parameter, ParameterKind,
    TypeParameter, TypeParameterKind,
};

// ============================================================================
// Serialization
// ============================================================================

/// Serialize one object tree.
pub fn object_to_json(
    collection: &ModulesCollection,
    id: ObjectId,
    full: bool,
    docstring_style: Option<DocstringStyle>,
) -> Value {
    let object = collection.object(id);
    let mut map = Map::new();
    map.insert("kind".to_string(), json!(object.kind().as_str()));
    map.insert("name".to_string(), json!(object.name));
    if let Some(lineno) = object.lineno {
        map.insert("lineno".to_string(), json!(lineno));
    }
    if let Some(endlineno) = object.endlineno {
        map.insert("endlineno".to_string(), json!(endlineno));
    }
    if !object.runtime {
        map.insert("runtime".to_string(), json!(false));
    }
    if let Some(public) = object.public {
        map.insert("public".to_string(), json!(public));
    }
    if let Some(exports) = &object.exports {
        map.insert(
            "exports".to_string(),
            Value::Array(exports.iter().map(export_to_json).collect()),
        );
    }
    if !object.imports.is_empty() {
        let mut imports = Map::new();
        for (local, target) in &object.imports {
            imports.insert(local.clone(), json!(target));
        }
        map.insert("imports".to_string(), Value::Object(imports));
    }
    if let Some(deprecated) = &object.deprecated {
        let value = match deprecated {
            Deprecation::Flag => json!(true),
            Deprecation::Message(message) => json!(message),
        };
        map.insert("deprecated".to_string(), value);
    }
    if let Some(docstring) = &object.docstring {
        map.insert(
            "docstring".to_string(),
            docstring_to_json(docstring, docstring_style),
        );
    }
    if !object.labels.is_empty() {
        map.insert(
            "labels".to_string(),
            Value::Array(object.labels.iter().map(|label| json!(label)).collect()),
        );
    }
    if !object.type_parameters.is_empty() {
        map.insert(
            "type_parameters".to_string(),
            Value::Array(
                object
                    .type_parameters
                    .iter()
                    .map(type_parameter_to_json)
                    .collect(),
            ),
        );
    }

    match object.kind() {
        Kind::Module => {}
        Kind::Class => {
            let data = object.as_class().expect("kind checked");
            if !data.bases.is_empty() {
                map.insert(
                    "bases".to_string(),
                    Value::Array(data.bases.iter().map(|base| json!(base.to_string())).collect()),
                );
            }
            if !data.decorators.is_empty() {
                map.insert(
                    "decorators".to_string(),
                    Value::Array(
                        data.decorators
                            .iter()
                            .map(|decorator| json!(decorator.value.to_string()))
                            .collect(),
                    ),
                );
            }
        }
        Kind::Function => {
            let data = object.as_function().expect("kind checked");
            map.insert(
                "parameters".to_string(),
                Value::Array(data.parameters.iter().map(parameter_to_json).collect()),
            );
            if let Some(returns) = &data.returns {
                map.insert("returns".to_string(), json!(returns.to_string()));
            }
            if !data.decorators.is_empty() {
                map.insert(
                    "decorators".to_string(),
                    Value::Array(
                        data.decorators
                            .iter()
                            .map(|decorator| json!(decorator.value.to_string()))
                            .collect(),
                    ),
                );
            }
        }
        Kind::Attribute => {
            let data = object.as_attribute().expect("kind checked");
            if let Some(annotation) = &data.annotation {
                map.insert("annotation".to_string(), json!(annotation.to_string()));
            }
            if let Some(value) = &data.value {
                map.insert("value".to_string(), json!(value.to_string()));
            }
        }
        Kind::TypeAlias => {
            let data = object.as_type_alias().expect("kind checked");
            map.insert("value".to_string(), json!(data.value.to_string()));
        }
        Kind::Alias => {
            let data = object.as_alias().expect("kind checked");
            map.insert("target_path".to_string(), json!(data.target_path));
            if data.inherited {
                map.insert("inherited".to_string(), json!(true));
            }
        }
    }

    if !object.members.is_empty() {
        let mut members = Map::new();
        for (name, member) in &object.members {
            members.insert(
                name.clone(),
                object_to_json(collection, *member, full, docstring_style),
            );
        }
        map.insert("members".to_string(), Value::Object(members));
    }
    if let Some(analysis) = object.analysis {
        let value = match analysis {
            Analysis::Static => "static",
            Analysis::Dynamic => "dynamic",
        };
        map.insert("analysis".to_string(), json!(value));
    }

    if full {
        map.insert("path".to_string(), json!(collection.path(id)));
        map.insert("is_public".to_string(), json!(collection.is_public(id)));
        if object.is_class() {
            let inherited = crate::mro::inherited_members(collection, id);
            if !inherited.is_empty() {
                map.insert(
                    "inherited_members".to_string(),
                    Value::Array(inherited.keys().map(|name| json!(name)).collect()),
                );
            }
        }
        if object.is_function() {
            let in_class = object
                .parent
                .map(|parent| collection.object(parent).is_class())
                .unwrap_or(false);
            map.insert(
                "is_init_method".to_string(),
                json!(in_class && object.name == "__init__"),
            );
        }
        if let Some(data) = object.as_module() {
            match &data.filepath {
                Some(ModulePath::File(path)) => {
                    map.insert("filepath".to_string(), json!(path.display().to_string()));
                }
                Some(ModulePath::Dirs(dirs)) => {
                    map.insert(
                        "filepath".to_string(),
                        Value::Array(
                            dirs.iter()
                                .map(|dir| json!(dir.display().to_string()))
                                .collect(),
                        ),
                    );
                }
                None => {}
            }
        }
    }

    Value::Object(map)
}

/// Serialize a whole collection as a map of top-level modules.
pub fn collection_to_json(
    collection: &ModulesCollection,
    full: bool,
    docstring_style: Option<DocstringStyle>,
) -> Value {
    let mut map = Map::new();
    for (name, module) in collection.top_level() {
        map.insert(
            name.clone(),
            object_to_json(collection, *module, full, docstring_style),
        );
    }
    Value::Object(map)
}

fn export_to_json(item: &ExportItem) -> Value {
    match item {
        ExportItem::Name(name) => json!(name),
        ExportItem::Expr(expr) => json!({"kind": "expr", "value": expr.to_string()}),
    }
}

fn docstring_to_json(docstring: &Docstring, style: Option<DocstringStyle>) -> Value {
    let mut map = Map::new();
    map.insert("value".to_string(), json!(docstring.value));
    if let Some(lineno) = docstring.lineno {
        map.insert("lineno".to_string(), json!(lineno));
    }
    if let Some(endlineno) = docstring.endlineno {
        map.insert("endlineno".to_string(), json!(endlineno));
    }
    if style.or(docstring.style).is_some() {
        let sections = docstring.parse(style);
        map.insert(
            "parsed".to_string(),
            Value::Array(sections.iter().map(|section| section.to_json()).collect()),
        );
    }
    Value::Object(map)
}

fn parameter_to_json(parameter: &Parameter) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(parameter.name));
    map.insert("kind".to_string(), json!(parameter.kind.as_str()));
    if let Some(annotation) = &parameter.annotation {
        map.insert("annotation".to_string(), json!(annotation.to_string()));
    }
    if let Some(default) = &parameter.default {
        map.insert("default".to_string(), json!(default.to_string()));
    }
    Value::Object(map)
}

fn type_parameter_to_json(type_parameter: &TypeParameter) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(type_parameter.name));
    map.insert("kind".to_string(), json!(type_parameter.kind.as_str()));
    if let Some(bound) = &type_parameter.bound {
        map.insert("bound".to_string(), json!(bound.to_string()));
    }
    if !type_parameter.constraints.is_empty() {
        map.insert(
            "constraints".to_string(),
            Value::Array(
                type_parameter
                    .constraints
                    .iter()
                    .map(|constraint| json!(constraint.to_string()))
                    .collect(),
            ),
        );
    }
    if let Some(default) = &type_parameter.default {
        map.insert("default".to_string(), json!(default.to_string()));
    }
    Value::Object(map)
}

// ============================================================================
// Deserialization
// ============================================================================

fn invalid(message: impl Into<String>) -> GriffeError {
    GriffeError::ExpressionParse {
        expr_source: String::new(),
        message: message.into(),
    }
}

fn parse_expr_field(value: &Value, scope: Option<ObjectId>) -> Option<Expr> {
    let text = value.as_str()?;
    safe_parse_expr(text, scope).or_else(|| Some(Expr::constant(text)))
}

/// Rebuild an object tree from its JSON form, allocating into `collection`.
/// The returned root is not attached to any parent.
pub fn object_from_json(collection: &mut ModulesCollection, value: &Value) -> Result<ObjectId> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("expected a JSON object"))?;
    let kind = map
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'kind'"))?;
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'name'"))?;

    let object = match kind {
        "module" => Object::module(name),
        "class" => Object::class(name),
        "function" => Object::function(name),
        "attribute" => Object::attribute(name),
        "type_alias" => Object::type_alias(name, Expr::constant("...")),
        "alias" => {
            let target_path = map
                .get("target_path")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("alias without 'target_path'"))?;
            Object::alias(name, target_path)
        }
        other => return Err(invalid(format!("unknown kind {other:?}"))),
    };
    let id = collection.alloc(object);

    {
        let object = collection.object_mut(id);
        object.lineno = map.get("lineno").and_then(Value::as_u64).map(|v| v as usize);
        object.endlineno = map
            .get("endlineno")
            .and_then(Value::as_u64)
            .map(|v| v as usize);
        if let Some(runtime) = map.get("runtime").and_then(Value::as_bool) {
            object.runtime = runtime;
        }
        object.public = map.get("public").and_then(Value::as_bool);
        if let Some(deprecated) = map.get("deprecated") {
            object.deprecated = match deprecated {
                Value::Bool(true) => Some(Deprecation::Flag),
                Value::String(message) => Some(Deprecation::Message(message.clone())),
                _ => None,
            };
        }
        if let Some(labels) = map.get("labels").and_then(Value::as_array) {
            for label in labels {
                if let Some(label) = label.as_str() {
                    object.labels.insert(label.to_string());
                }
            }
        }
        if let Some(analysis) = map.get("analysis").and_then(Value::as_str) {
            object.analysis = match analysis {
                "static" => Some(Analysis::Static),
                "dynamic" => Some(Analysis::Dynamic),
                _ => None,
            };
        }
        if let Some(docstring) = map.get("docstring").and_then(Value::as_object) {
            let mut parsed = Docstring::new(
                docstring
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            );
            parsed.lineno = docstring
                .get("lineno")
                .and_then(Value::as_u64)
                .map(|v| v as usize);
            parsed.endlineno = docstring
                .get("endlineno")
                .and_then(Value::as_u64)
                .map(|v| v as usize);
            object.docstring = Some(parsed);
        }
        if let Some(imports) = map.get("imports").and_then(Value::as_object) {
            for (local, target) in imports {
                if let Some(target) = target.as_str() {
                    object.imports.insert(local.clone(), target.to_string());
                }
            }
        }
        if map.get("inherited").and_then(Value::as_bool) == Some(true) {
            if let Some(data) = object.as_alias_mut() {
                data.inherited = true;
            }
        }
    }

    if let Some(exports) = map.get("exports").and_then(Value::as_array) {
        let items = exports
            .iter()
            .map(|item| match item {
                Value::String(name) => ExportItem::Name(name.clone()),
                other => {
                    let render = other
                        .get("value")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    match safe_parse_expr(render, Some(id)) {
                        Some(expr) => ExportItem::Expr(expr),
                        None => ExportItem::Name(render.to_string()),
                    }
                }
            })
            .collect();
        collection.object_mut(id).exports = Some(items);
    }

    if let Some(type_parameters) = map.get("type_parameters").and_then(Value::as_array) {
        let parsed: Vec<TypeParameter> = type_parameters
            .iter()
            .filter_map(|value| type_parameter_from_json(value, Some(id)))
            .collect();
        collection.object_mut(id).type_parameters = parsed;
    }

    match kind {
        "class" => {
            let bases: Vec<Expr> = map
                .get("bases")
                .and_then(Value::as_array)
                .map(|bases| {
                    bases
                        .iter()
                        .filter_map(|base| parse_expr_field(base, Some(id)))
                        .collect()
                })
                .unwrap_or_default();
            let decorators = decorators_from_json(map.get("decorators"), id);
            if let Some(data) = collection.object_mut(id).as_class_mut() {
                data.bases = bases;
                data.decorators = decorators;
            }
        }
        "function" => {
            let parameters: Vec<Parameter> = map
                .get("parameters")
                .and_then(Value::as_array)
                .map(|parameters| {
                    parameters
                        .iter()
                        .filter_map(|value| parameter_from_json(value, Some(id)))
                        .collect()
                })
                .unwrap_or_default();
            let returns = map
                .get("returns")
                .and_then(|value| parse_expr_field(value, Some(id)));
            let decorators = decorators_from_json(map.get("decorators"), id);
            if let Some(data) = collection.object_mut(id).as_function_mut() {
                data.parameters = parameters;
                data.returns = returns;
                data.decorators = decorators;
            }
        }
        "attribute" => {
            let annotation = map
                .get("annotation")
                .and_then(|value| parse_expr_field(value, Some(id)));
            let value = map
                .get("value")
                .and_then(|value| parse_expr_field(value, Some(id)));
            if let Some(data) = collection.object_mut(id).as_attribute_mut() {
                data.annotation = annotation;
                data.value = value;
            }
        }
        "type_alias" => {
            if let Some(value) = map
                .get("value")
                .and_then(|value| parse_expr_field(value, Some(id)))
            {
                if let crate::object::ObjectData::TypeAlias(data) =
                    &mut collection.object_mut(id).data
                {
                    data.value = value;
                }
            }
        }
        _ => {}
    }

    if let Some(members) = map.get("members").and_then(Value::as_object) {
        for (member_name, member_value) in members {
            let member = object_from_json(collection, member_value)?;
            collection.set_member(id, member_name, member);
        }
    }

    Ok(id)
}

/// Rebuild a whole collection from its JSON form.
pub fn collection_from_json(value: &Value) -> Result<ModulesCollection> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("expected a JSON object of modules"))?;
    let mut collection = ModulesCollection::new();
    for module_value in map.values() {
        let module = object_from_json(&mut collection, module_value)?;
        collection.insert_top_level(module);
    }
    Ok(collection)
}

fn parameter_from_json(value: &Value, scope: Option<ObjectId>) -> Option<Parameter> {
    let map = value.as_object()?;
    let name = map.get("name").and_then(Value::as_str)?;
    let kind = match map.get("kind").and_then(Value::as_str)? {
        "positional-only" => ParameterKind::PositionalOnly,
        "positional-or-keyword" => ParameterKind::PositionalOrKeyword,
        "var-positional" => ParameterKind::VarPositional,
        "keyword-only" => ParameterKind::KeywordOnly,
        "var-keyword" => ParameterKind::VarKeyword,
        _ => return None,
    };
    let mut parameter = Parameter::new(name, kind);
    parameter.annotation = map
        .get("annotation")
        .and_then(|value| parse_expr_field(value, scope));
    parameter.default = map
        .get("default")
        .and_then(|value| parse_expr_field(value, scope));
    Some(parameter)
}

fn type_parameter_from_json(value: &Value, scope: Option<ObjectId>) -> Option<TypeParameter> {
    let map = value.as_object()?;
    let name = map.get("name").and_then(Value::as_str)?;
    let kind = match map.get("kind").and_then(Value::as_str)? {
        "type-var" => TypeParameterKind::TypeVar,
        "type-var-tuple" => TypeParameterKind::TypeVarTuple,
        "param-spec" => TypeParameterKind::ParamSpec,
        _ => return None,
    };
    let mut type_parameter = TypeParameter::new(name, kind);
    type_parameter.bound = map
        .get("bound")
        .and_then(|value| parse_expr_field(value, scope));
    if let Some(constraints) = map.get("constraints").and_then(Value::as_array) {
        type_parameter.constraints = constraints
            .iter()
            .filter_map(|constraint| parse_expr_field(constraint, scope))
            .collect();
    }
    type_parameter.default = map
        .get("default")
        .and_then(|value| parse_expr_field(value, scope));
    Some(type_parameter)
}

fn decorators_from_json(
    value: Option<&Value>,
    scope: ObjectId,
) -> Vec<crate::object::Decorator> {
    value
        .and_then(Value::as_array)
        .map(|decorators| {
            decorators
                .iter()
                .filter_map(|decorator| {
                    Some(crate::object::Decorator {
                        value: parse_expr_field(decorator, Some(scope))?,
                        lineno: None,
                        endlineno: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::LinesCollection;
    use crate::visitor::visit_module;
    use std::path::PathBuf;

    fn load(source: &str) -> (ModulesCollection, ObjectId) {
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
    fn json_round_trip_is_byte_identical() {
        let (collection, module) = load(
            "\"\"\"Doc.\"\"\"\n\nfrom os.path import join\n\n__all__ = ['f', 'C']\n\nX: int = 1\n\nclass C(Exception):\n    \"\"\"A class.\"\"\"\n    y: str = 'v'\n\n    def method(self, a, b=2) -> bool:\n        ...\n\ndef f(x: 'list[int]' = None) -> str:\n    ...\n",
        );
        let first = object_to_json(&collection, module, false, None);
        let mut rebuilt = ModulesCollection::new();
        let rebuilt_module = object_from_json(&mut rebuilt, &first).unwrap();
        rebuilt.insert_top_level(rebuilt_module);
        let second = object_to_json(&rebuilt, rebuilt_module, false, None);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap(),
        );
    }

    #[test]
    fn keys_present_only_when_set() {
        let (collection, module) = load("def f():\n    ...\n");
        let value = object_to_json(&collection, module, false, None);
        let function = &value["members"]["f"];
        assert_eq!(function["kind"], "function");
        assert!(function.get("returns").is_none());
        assert!(function.get("docstring").is_none());
        assert!(value.get("exports").is_none());
        assert!(value.get("runtime").is_none());
    }

    #[test]
    fn alias_serializes_target_path_not_target() {
        let (collection, module) = load("from os.path import join\n");
        let value = object_to_json(&collection, module, false, None);
        let alias = &value["members"]["join"];
        assert_eq!(alias["kind"], "alias");
        assert_eq!(alias["target_path"], "os.path.join");
        assert!(alias.get("members").is_none());
    }

    #[test]
    fn full_mode_adds_derived_fields() {
        let (collection, module) = load("def f():\n    ...\n");
        let value = object_to_json(&collection, module, true, None);
        assert_eq!(value["path"], "m");
        assert_eq!(value["members"]["f"]["path"], "m.f");
        assert_eq!(value["members"]["f"]["is_public"], true);
        assert!(value["filepath"].as_str().is_some());
    }

    #[test]
    fn member_order_is_preserved() {
        let (collection, module) = load("b = 1\na = 2\nc = 3\n");
        let value = object_to_json(&collection, module, false, None);
        let keys: Vec<&String> = value["members"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn collection_round_trip_preserves_graph_identity() {
        let (mut collection, module) = load("from m2 import thing\n");
        let other = collection.alloc(Object::module("m2"));
        collection.insert_top_level(other);
        let thing = collection.alloc(Object::function("thing"));
        collection.set_member(other, "thing", thing);
        let _ = module;

        let value = collection_to_json(&collection, false, None);
        let rebuilt = collection_from_json(&value).unwrap();
        let alias = rebuilt.get_member_path("m.thing").unwrap();
        let target = rebuilt.resolve_alias(alias).unwrap();
        assert_eq!(rebuilt.path(target), "m2.thing");
    }

    #[test]
    fn docstring_parsed_sections_with_style() {
        let (collection, module) = load(
            "def f(x):\n    \"\"\"Do.\n\n    Args:\n        x: input.\n    \"\"\"\n",
        );
        let value = object_to_json(
            &collection,
            module,
            false,
            Some(DocstringStyle::Google),
        );
        let parsed = &value["members"]["f"]["docstring"]["parsed"];
        assert!(parsed.as_array().is_some());
        assert_eq!(parsed[1]["kind"], "parameters");
    }
}
