//! Merging of stub (`.pyi`) modules into their runtime counterparts.
//!
//! Signatures, annotations, type parameters and `__all__` come from the
//! stub; docstrings and members only present in the runtime module survive.
//! Merging recurses into classes.

use tracing::debug;

use crate::collection::{ModulesCollection, ObjectId};
use crate::object::{Kind, ObjectData};

/// Merge `stub` into `runtime` in place. The stub object tree is left
/// detached afterwards.
pub fn merge_stub(collection: &mut ModulesCollection, runtime: ObjectId, stub: ObjectId) {
    merge_common(collection, runtime, stub);
    if let Some(exports) = collection.object(stub).exports.clone() {
        collection.object_mut(runtime).exports = Some(exports);
    }
    let stub_imports = collection.object(stub).imports.clone();
    collection.object_mut(runtime).imports.extend(stub_imports);
    merge_members(collection, runtime, stub);
}

fn merge_common(collection: &mut ModulesCollection, runtime: ObjectId, stub: ObjectId) {
    let stub_docstring = collection.object(stub).docstring.clone();
    let stub_type_parameters = collection.object(stub).type_parameters.clone();
    let stub_labels = collection.object(stub).labels.clone();
    let stub_deprecated = collection.object(stub).deprecated.clone();

    let runtime_object = collection.object_mut(runtime);
    if runtime_object.docstring.is_none() {
        runtime_object.docstring = stub_docstring;
    }
    if !stub_type_parameters.is_empty() {
        runtime_object.type_parameters = stub_type_parameters;
    }
    runtime_object.labels.extend(stub_labels);
    if runtime_object.deprecated.is_none() {
        runtime_object.deprecated = stub_deprecated;
    }
}

fn merge_members(collection: &mut ModulesCollection, runtime: ObjectId, stub: ObjectId) {
    let stub_members: Vec<(String, ObjectId)> = collection
        .object(stub)
        .members
        .iter()
        .map(|(name, id)| (name.clone(), *id))
        .collect();

    for (name, stub_member) in stub_members {
        match collection.get_member(runtime, &name) {
            None => {
                // Stub-only member: adopt it wholesale.
                collection.set_member(runtime, &name, stub_member);
            }
            Some(runtime_member) => {
                let runtime_kind = collection.object(runtime_member).kind();
                let stub_kind = collection.object(stub_member).kind();
                if runtime_kind != stub_kind {
                    debug!(
                        member = %collection.path(runtime_member),
                        runtime = runtime_kind.as_str(),
                        stub = stub_kind.as_str(),
                        "stub and runtime kinds differ, keeping runtime",
                    );
                    continue;
                }
                match runtime_kind {
                    Kind::Function => merge_function(collection, runtime_member, stub_member),
                    Kind::Attribute => merge_attribute(collection, runtime_member, stub_member),
                    Kind::Class => {
                        merge_class(collection, runtime_member, stub_member);
                        merge_members(collection, runtime_member, stub_member);
                    }
                    Kind::Module => {
                        merge_stub(collection, runtime_member, stub_member);
                    }
                    Kind::TypeAlias | Kind::Alias => {}
                }
            }
        }
    }
}

fn merge_function(collection: &mut ModulesCollection, runtime: ObjectId, stub: ObjectId) {
    merge_common(collection, runtime, stub);
    let stub_data = match &collection.object(stub).data {
        ObjectData::Function(data) => data.clone(),
        _ => return,
    };
    if let Some(runtime_data) = collection.object_mut(runtime).as_function_mut() {
        runtime_data.parameters = stub_data.parameters;
        runtime_data.returns = stub_data.returns;
        if !stub_data.decorators.is_empty() {
            runtime_data.decorators = stub_data.decorators;
        }
        if !stub_data.overloads.is_empty() {
            runtime_data.overloads = stub_data.overloads;
        }
    }
}

fn merge_attribute(collection: &mut ModulesCollection, runtime: ObjectId, stub: ObjectId) {
    merge_common(collection, runtime, stub);
    let stub_data = match &collection.object(stub).data {
        ObjectData::Attribute(data) => data.clone(),
        _ => return,
    };
    if let Some(runtime_data) = collection.object_mut(runtime).as_attribute_mut() {
        if stub_data.annotation.is_some() {
            runtime_data.annotation = stub_data.annotation;
        }
        if runtime_data.value.is_none() {
            runtime_data.value = stub_data.value;
        }
    }
}

fn merge_class(collection: &mut ModulesCollection, runtime: ObjectId, stub: ObjectId) {
    merge_common(collection, runtime, stub);
    let stub_data = match &collection.object(stub).data {
        ObjectData::Class(data) => data.clone(),
        _ => return,
    };
    if let Some(runtime_data) = collection.object_mut(runtime).as_class_mut() {
        if !stub_data.bases.is_empty() {
            runtime_data.bases = stub_data.bases;
        }
        if !stub_data.decorators.is_empty() {
            runtime_data.decorators = stub_data.decorators;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstring::Docstring;
    use crate::expr::Expr;
    use crate::object::{Object, Parameter, ParameterKind};

    fn module_pair(collection: &mut ModulesCollection) -> (ObjectId, ObjectId) {
        let runtime = collection.alloc(Object::module("m"));
        collection.insert_top_level(runtime);
        let stub = collection.alloc(Object::module("m"));
        (runtime, stub)
    }

    #[test]
    fn stub_signature_wins_runtime_docstring_survives() {
        let mut collection = ModulesCollection::new();
        let (runtime, stub) = module_pair(&mut collection);

        let mut runtime_function = Object::function("f");
        runtime_function.docstring = Some(Docstring::new("doc"));
        if let Some(data) = runtime_function.as_function_mut() {
            data.parameters
                .push(Parameter::new("x", ParameterKind::PositionalOrKeyword));
        }
        let runtime_function = collection.alloc(runtime_function);
        collection.set_member(runtime, "f", runtime_function);

        let mut stub_function = Object::function("f");
        if let Some(data) = stub_function.as_function_mut() {
            let mut parameter = Parameter::new("x", ParameterKind::PositionalOrKeyword);
            parameter.annotation = Some(Expr::name("int"));
            data.parameters.push(parameter);
            data.returns = Some(Expr::name("str"));
        }
        let stub_function = collection.alloc(stub_function);
        collection.set_member(stub, "f", stub_function);

        merge_stub(&mut collection, runtime, stub);

        let merged = collection.object(runtime_function);
        assert_eq!(merged.docstring.as_ref().unwrap().value, "doc");
        let data = merged.as_function().unwrap();
        assert_eq!(
            data.parameters[0].annotation.as_ref().unwrap().to_string(),
            "int",
        );
        assert_eq!(data.returns.as_ref().unwrap().to_string(), "str");
    }

    #[test]
    fn disjoint_members_union() {
        let mut collection = ModulesCollection::new();
        let (runtime, stub) = module_pair(&mut collection);
        let runtime_only = collection.alloc(Object::function("runtime_only"));
        collection.set_member(runtime, "runtime_only", runtime_only);
        let stub_only = collection.alloc(Object::function("stub_only"));
        collection.set_member(stub, "stub_only", stub_only);

        merge_stub(&mut collection, runtime, stub);

        assert!(collection.get_member(runtime, "runtime_only").is_some());
        assert!(collection.get_member(runtime, "stub_only").is_some());
        assert_eq!(collection.path(stub_only), "m.stub_only");
    }

    #[test]
    fn stub_exports_take_precedence() {
        use crate::object::ExportItem;
        let mut collection = ModulesCollection::new();
        let (runtime, stub) = module_pair(&mut collection);
        collection.object_mut(runtime).exports =
            Some(vec![ExportItem::Name("old".to_string())]);
        collection.object_mut(stub).exports =
            Some(vec![ExportItem::Name("new".to_string())]);

        merge_stub(&mut collection, runtime, stub);

        assert_eq!(
            collection.expanded_exports(runtime),
            Some(vec!["new".to_string()]),
        );
    }

    #[test]
    fn classes_merge_recursively() {
        let mut collection = ModulesCollection::new();
        let (runtime, stub) = module_pair(&mut collection);

        let runtime_class = collection.alloc(Object::class("C"));
        collection.set_member(runtime, "C", runtime_class);
        let runtime_method = collection.alloc(Object::function("m"));
        collection.set_member(runtime_class, "m", runtime_method);

        let stub_class = collection.alloc(Object::class("C"));
        collection.set_member(stub, "C", stub_class);
        let mut stub_method = Object::function("m");
        if let Some(data) = stub_method.as_function_mut() {
            data.returns = Some(Expr::name("int"));
        }
        let stub_method = collection.alloc(stub_method);
        collection.set_member(stub_class, "m", stub_method);

        merge_stub(&mut collection, runtime, stub);

        let merged = collection.object(runtime_method).as_function().unwrap();
        assert_eq!(merged.returns.as_ref().unwrap().to_string(), "int");
    }
}
