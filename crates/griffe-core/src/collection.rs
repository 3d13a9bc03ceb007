//! The modules collection: the shared address space of loaded objects.
//!
//! Objects live in an arena and refer to each other with [`ObjectId`]
//! handles, never owning references, so parent back-references and alias
//! target caches cannot form ownership cycles. All operations that need the
//! whole graph (paths, scope resolution, alias resolution, visibility) are
//! methods here, parameterized by id.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{GriffeError, Result};
use crate::object::{is_private_name, ExportItem, Object};

/// Budget for alias chain walks. Exceeding it is reported as a cycle.
const MAX_ALIAS_HOPS: usize = 256;

/// Non-owning handle to an object in a [`ModulesCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Arena of objects plus the map of top-level modules.
#[derive(Debug, Default)]
pub struct ModulesCollection {
    arena: Vec<Object>,
    top_level: IndexMap<String, ObjectId>,
}

impl ModulesCollection {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Arena access
    // ------------------------------------------------------------------

    /// Allocate an object and return its handle.
    pub fn alloc(&mut self, object: Object) -> ObjectId {
        let id = ObjectId(self.arena.len() as u32);
        self.arena.push(object);
        id
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.arena[id.index()]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.arena[id.index()]
    }

    /// Iterate over every allocated id, including detached ones.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.arena.len() as u32).map(ObjectId)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    // ------------------------------------------------------------------
    // Top-level modules
    // ------------------------------------------------------------------

    pub fn top_level(&self) -> &IndexMap<String, ObjectId> {
        &self.top_level
    }

    /// Register a top-level module under its own name.
    pub fn insert_top_level(&mut self, id: ObjectId) {
        let name = self.object(id).name.clone();
        self.top_level.insert(name, id);
    }

    pub fn top_level_module(&self, name: &str) -> Option<ObjectId> {
        self.top_level.get(name).copied()
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// Dotted path of an object, from its top-level module down.
    pub fn path(&self, id: ObjectId) -> String {
        let mut names = vec![self.object(id).name.as_str()];
        let mut current = id;
        while let Some(parent) = self.object(current).parent {
            names.push(self.object(parent).name.as_str());
            current = parent;
        }
        names.reverse();
        names.join(".")
    }

    /// Path where the object was originally defined: aliases report their
    /// final target's path, other objects their own.
    pub fn canonical_path(&self, id: ObjectId) -> String {
        if self.object(id).is_alias() {
            match self.resolve_alias(id) {
                Ok(target) => self.path(target),
                Err(_) => self
                    .object(id)
                    .as_alias()
                    .map(|data| data.target_path.clone())
                    .unwrap_or_else(|| self.path(id)),
            }
        } else {
            self.path(id)
        }
    }

    /// Canonicalize a dotted path through whatever it names, best effort.
    pub fn canonicalize_path(&self, path: &str) -> String {
        match self.get_member_path(path) {
            Some(id) => self.canonical_path(id),
            None => path.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    /// Direct member lookup, not following aliases.
    pub fn get_member(&self, id: ObjectId, name: &str) -> Option<ObjectId> {
        self.object(id).members.get(name).copied()
    }

    /// Walk a dotted path through `members` without following aliases.
    pub fn get_member_path(&self, path: &str) -> Option<ObjectId> {
        let mut segments = path.split('.');
        let mut current = self.top_level_module(segments.next()?)?;
        for segment in segments {
            current = self.get_member(current, segment)?;
        }
        Some(current)
    }

    /// Attach `child` to `parent` under `name`.
    ///
    /// The child's own name is set to the local binding name. Attaching an
    /// alias with a cached target also registers it in the target's reverse
    /// index.
    pub fn set_member(&mut self, parent: ObjectId, name: &str, child: ObjectId) {
        self.object_mut(child).name = name.to_string();
        self.object_mut(child).parent = Some(parent);
        self.object_mut(parent).members.insert(name.to_string(), child);
        if let Some(target) = self.object(child).as_alias().and_then(|data| data.target) {
            let alias_path = self.path(child);
            self.object_mut(target).aliases.insert(alias_path, child);
        }
    }

    /// Detach the member under `name` from `parent`.
    ///
    /// The removed subtree stays allocated but unreachable. If the removed
    /// member is an alias with a cached target, the target's reverse index
    /// is updated.
    pub fn del_member(&mut self, parent: ObjectId, name: &str) -> Option<ObjectId> {
        let child = self.object_mut(parent).members.shift_remove(name)?;
        let child_path = self.path(child);
        if let Some(target) = self.object(child).as_alias().and_then(|data| data.target) {
            self.object_mut(target).aliases.shift_remove(&child_path);
        }
        self.object_mut(child).parent = None;
        Some(child)
    }

    /// Reassign an alias target path, invalidating the cached target.
    pub fn set_alias_target_path(&mut self, id: ObjectId, target_path: impl Into<String>) {
        let alias_path = self.path(id);
        let old_target = self.object(id).as_alias().and_then(|data| data.target);
        if let Some(old_target) = old_target {
            self.object_mut(old_target).aliases.shift_remove(&alias_path);
        }
        if let Some(data) = self.object_mut(id).as_alias_mut() {
            data.target_path = target_path.into();
            data.target = None;
        }
    }

    // ------------------------------------------------------------------
    // Alias resolution
    // ------------------------------------------------------------------

    /// Resolve an alias to its ultimate target, walking through
    /// intermediate aliases. Pure: no caching, deterministic for a frozen
    /// collection. Cycles and exhausted budgets raise `CyclicAliasError`;
    /// missing targets raise `AliasResolutionError`.
    pub fn resolve_alias(&self, id: ObjectId) -> Result<ObjectId> {
        if let Some(target) = self.object(id).as_alias().and_then(|data| data.target) {
            return Ok(target);
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut chain: Vec<String> = Vec::new();
        let mut budget = MAX_ALIAS_HOPS;
        self.resolve_alias_inner(id, &mut seen, &mut chain, &mut budget)
    }

    fn resolve_alias_inner(
        &self,
        id: ObjectId,
        seen: &mut HashSet<String>,
        chain: &mut Vec<String>,
        budget: &mut usize,
    ) -> Result<ObjectId> {
        let mut current = id;
        loop {
            if *budget == 0 {
                return Err(GriffeError::CyclicAlias {
                    chain: chain.clone(),
                });
            }
            *budget -= 1;
            let alias_path = self.path(current);
            if !seen.insert(alias_path.clone()) {
                chain.push(alias_path);
                return Err(GriffeError::CyclicAlias {
                    chain: chain.clone(),
                });
            }
            chain.push(alias_path.clone());
            let target_path = match self.object(current).as_alias() {
                Some(data) => {
                    if let Some(target) = data.target {
                        return Ok(target);
                    }
                    data.target_path.clone()
                }
                None => return Ok(current),
            };
            let target = self.walk_target_path(&alias_path, &target_path, budget)?;
            if !self.object(target).is_alias() {
                return Ok(target);
            }
            current = target;
        }
    }

    /// Walk a dotted target path from the top-level map, resolving aliases
    /// encountered mid-path. Mid-path aliases resolve with a fresh visited
    /// set (the same alias can legitimately be crossed twice); the shared
    /// hop budget still bounds mutual recursion.
    fn walk_target_path(
        &self,
        alias_path: &str,
        target_path: &str,
        budget: &mut usize,
    ) -> Result<ObjectId> {
        let mut segments = target_path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.top_level_module(first).ok_or_else(|| {
            GriffeError::alias_resolution(alias_path.to_string(), target_path.to_string())
        })?;
        for segment in segments {
            if self.object(current).is_alias() {
                let mut sub_seen: HashSet<String> = HashSet::new();
                let mut sub_chain: Vec<String> = Vec::new();
                current = self.resolve_alias_inner(current, &mut sub_seen, &mut sub_chain, budget)?;
            }
            current = self.get_member(current, segment).ok_or_else(|| {
                GriffeError::alias_resolution(alias_path.to_string(), target_path.to_string())
            })?;
        }
        Ok(current)
    }

    /// Resolve an alias and cache the target on it, maintaining the
    /// target's reverse index.
    pub fn cache_alias_target(&mut self, id: ObjectId) -> Result<ObjectId> {
        let target = self.resolve_alias(id)?;
        let alias_path = self.path(id);
        if let Some(data) = self.object_mut(id).as_alias_mut() {
            data.target = Some(target);
        }
        self.object_mut(target).aliases.insert(alias_path, id);
        Ok(target)
    }

    /// The object itself, or the resolved target for aliases.
    pub fn final_target(&self, id: ObjectId) -> Result<ObjectId> {
        if self.object(id).is_alias() {
            self.resolve_alias(id)
        } else {
            Ok(id)
        }
    }

    /// Follow alias `target_path` strings to the last path in the chain
    /// without requiring targets to exist. Used by name resolution, which
    /// must answer even before external packages are loaded.
    fn walked_target_path(&self, id: ObjectId) -> String {
        let mut seen: HashSet<String> = HashSet::new();
        let mut current_path = match self.object(id).as_alias() {
            Some(data) => data.target_path.clone(),
            None => return self.path(id),
        };
        let mut budget = MAX_ALIAS_HOPS;
        while budget > 0 && seen.insert(current_path.clone()) {
            budget -= 1;
            match self.get_member_path(&current_path) {
                Some(target) => match self.object(target).as_alias() {
                    Some(data) => current_path = data.target_path.clone(),
                    None => break,
                },
                None => break,
            }
        }
        current_path
    }

    // ------------------------------------------------------------------
    // Scope resolution
    // ------------------------------------------------------------------

    /// Answer: if `name` were evaluated in the scope of the object `scope`,
    /// which fully qualified entity would it bind to?
    pub fn resolve(&self, scope: ObjectId, name: &str) -> Result<String> {
        let object = self.object(scope);
        if let Some(type_parameter) = object
            .type_parameters
            .iter()
            .find(|type_parameter| type_parameter.name == name)
        {
            return Ok(format!(
                "{}[{}{}]",
                self.path(scope),
                type_parameter.kind.prefix(),
                name,
            ));
        }
        if let Some(member) = self.get_member(scope, name) {
            if self.object(member).is_alias() {
                return Ok(self.walked_target_path(member));
            }
            return Ok(self.path(member));
        }
        match object.parent {
            None => Err(GriffeError::name_resolution(name, self.path(scope))),
            Some(parent) => {
                let parent_object = self.object(parent);
                if !parent_object.is_module() && parent_object.name == name {
                    return Ok(self.path(parent));
                }
                self.resolve(parent, name)
            }
        }
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Exports of a module as plain strings, once expansion has run.
    /// Unexpanded expression entries are skipped.
    pub fn expanded_exports(&self, id: ObjectId) -> Option<Vec<String>> {
        self.object(id).exports.as_ref().map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    ExportItem::Name(name) => Some(name.clone()),
                    ExportItem::Expr(_) => None,
                })
                .collect()
        })
    }

    /// Whether an object is part of the public API.
    ///
    /// The explicit `public` flag wins; then the parent module's `__all__`
    /// is authoritative; then naming conventions (private prefix) and
    /// import status decide.
    pub fn is_public(&self, id: ObjectId) -> bool {
        let object = self.object(id);
        if let Some(flag) = object.public {
            return flag;
        }
        if let Some(parent) = object.parent {
            let parent_object = self.object(parent);
            if parent_object.is_module() {
                if let Some(exports) = self.expanded_exports(parent) {
                    return exports.iter().any(|export| export == &object.name);
                }
            }
        }
        if is_private_name(&object.name) {
            return false;
        }
        // Imported names are not exported API by default.
        if object.is_alias() && !object.as_alias().map(|a| a.inherited).unwrap_or(false) {
            return false;
        }
        true
    }

    /// Whether `from parent import *` would bind this member.
    pub fn is_wildcard_exposed(&self, id: ObjectId) -> bool {
        let object = self.object(id);
        let Some(parent) = object.parent else {
            return false;
        };
        let parent_object = self.object(parent);
        if !parent_object.is_module() {
            return false;
        }
        if let Some(exports) = self.expanded_exports(parent) {
            return exports.iter().any(|export| export == &object.name);
        }
        if object.name.starts_with('_') {
            return false;
        }
        // Without `__all__`, submodules leak only when the parent imports
        // them explicitly.
        if object.is_module() && !parent_object.imports.contains_key(&object.name) {
            return false;
        }
        true
    }

    /// Names a wildcard import of this module would bind, in member order.
    pub fn wildcard_exposed_members(&self, id: ObjectId) -> Vec<(String, ObjectId)> {
        let mut exposed = Vec::new();
        for (name, member) in &self.object(id).members {
            if self.is_wildcard_exposed(*member) {
                exposed.push((name.clone(), *member));
            } else {
                debug!(member = %name, "not wildcard exposed");
            }
        }
        exposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{TypeParameter, TypeParameterKind};

    fn collection_with_module(name: &str) -> (ModulesCollection, ObjectId) {
        let mut collection = ModulesCollection::new();
        let module = collection.alloc(Object::module(name));
        collection.insert_top_level(module);
        (collection, module)
    }

    #[test]
    fn paths_follow_parents() {
        let (mut collection, module) = collection_with_module("pkg");
        let class = collection.alloc(Object::class("C"));
        collection.set_member(module, "C", class);
        let method = collection.alloc(Object::function("m"));
        collection.set_member(class, "m", method);
        assert_eq!(collection.path(method), "pkg.C.m");
        assert_eq!(collection.get_member_path("pkg.C.m"), Some(method));
    }

    #[test]
    fn parent_member_invariant() {
        let (mut collection, module) = collection_with_module("pkg");
        let function = collection.alloc(Object::function("f"));
        collection.set_member(module, "f", function);
        let parent = collection.object(function).parent.unwrap();
        assert_eq!(collection.get_member(parent, "f"), Some(function));
    }

    #[test]
    fn del_member_detaches() {
        let (mut collection, module) = collection_with_module("pkg");
        let function = collection.alloc(Object::function("f"));
        collection.set_member(module, "f", function);
        let removed = collection.del_member(module, "f").unwrap();
        assert_eq!(removed, function);
        assert!(collection.object(function).parent.is_none());
        assert!(collection.get_member(module, "f").is_none());
    }

    #[test]
    fn alias_chain_resolves_to_origin() {
        let (mut collection, module) = collection_with_module("pkg");
        let module_a = collection.alloc(Object::module("a"));
        collection.set_member(module, "a", module_a);
        let module_b = collection.alloc(Object::module("b"));
        collection.set_member(module, "b", module_b);
        let module_c = collection.alloc(Object::module("c"));
        collection.set_member(module, "c", module_c);

        let function = collection.alloc(Object::function("f"));
        collection.set_member(module_a, "f", function);
        let alias_b = collection.alloc(Object::alias("f", "pkg.a.f"));
        collection.set_member(module_b, "f", alias_b);
        let alias_c = collection.alloc(Object::alias("g", "pkg.b.f"));
        collection.set_member(module_c, "g", alias_c);

        let target = collection.resolve_alias(alias_c).unwrap();
        assert_eq!(target, function);
        assert_eq!(collection.canonical_path(alias_c), "pkg.a.f");
    }

    #[test]
    fn alias_cycle_raises() {
        let (mut collection, module) = collection_with_module("pkg");
        let alias_x = collection.alloc(Object::alias("x", "pkg.y"));
        collection.set_member(module, "x", alias_x);
        let alias_y = collection.alloc(Object::alias("y", "pkg.x"));
        collection.set_member(module, "y", alias_y);

        let error = collection.resolve_alias(alias_x).unwrap_err();
        assert!(matches!(error, GriffeError::CyclicAlias { .. }));
        // No partial state: the caches are still empty.
        assert!(collection.object(alias_x).as_alias().unwrap().target.is_none());
        assert!(collection.object(alias_y).as_alias().unwrap().target.is_none());
    }

    #[test]
    fn missing_target_raises_alias_resolution() {
        let (mut collection, module) = collection_with_module("pkg");
        let alias = collection.alloc(Object::alias("x", "missing.thing"));
        collection.set_member(module, "x", alias);
        let error = collection.resolve_alias(alias).unwrap_err();
        assert!(matches!(error, GriffeError::AliasResolution { .. }));
    }

    #[test]
    fn cache_alias_target_updates_reverse_index() {
        let (mut collection, module) = collection_with_module("pkg");
        let function = collection.alloc(Object::function("f"));
        collection.set_member(module, "f", function);
        let alias = collection.alloc(Object::alias("g", "pkg.f"));
        collection.set_member(module, "g", alias);

        let target = collection.cache_alias_target(alias).unwrap();
        assert_eq!(target, function);
        assert_eq!(
            collection.object(function).aliases.get("pkg.g").copied(),
            Some(alias),
        );
    }

    mod resolve {
        use super::*;

        #[test]
        fn direct_member() {
            let (mut collection, module) = collection_with_module("pkg");
            let function = collection.alloc(Object::function("f"));
            collection.set_member(module, "f", function);
            assert_eq!(collection.resolve(module, "f").unwrap(), "pkg.f");
        }

        #[test]
        fn recurses_into_parent() {
            let (mut collection, module) = collection_with_module("pkg");
            let constant = collection.alloc(Object::attribute("X"));
            collection.set_member(module, "X", constant);
            let class = collection.alloc(Object::class("C"));
            collection.set_member(module, "C", class);
            let method = collection.alloc(Object::function("m"));
            collection.set_member(class, "m", method);
            assert_eq!(collection.resolve(method, "X").unwrap(), "pkg.X");
        }

        #[test]
        fn class_self_reference() {
            let (mut collection, module) = collection_with_module("pkg");
            let class = collection.alloc(Object::class("C"));
            collection.set_member(module, "C", class);
            let method = collection.alloc(Object::function("m"));
            collection.set_member(class, "m", method);
            assert_eq!(collection.resolve(method, "C").unwrap(), "pkg.C");
        }

        #[test]
        fn type_parameter_binding() {
            let (mut collection, module) = collection_with_module("pkg");
            let mut class = Object::class("C");
            class
                .type_parameters
                .push(TypeParameter::new("T", TypeParameterKind::TypeVar));
            let class = collection.alloc(class);
            collection.set_member(module, "C", class);
            assert_eq!(collection.resolve(class, "T").unwrap(), "pkg.C[T]");
        }

        #[test]
        fn unknown_name_errors() {
            let (collection, module) = collection_with_module("pkg");
            let error = collection.resolve(module, "nope").unwrap_err();
            assert!(matches!(error, GriffeError::NameResolution { .. }));
        }

        #[test]
        fn alias_member_resolves_to_walked_target() {
            let (mut collection, module) = collection_with_module("pkg");
            let alias = collection.alloc(Object::alias("join", "os.path.join"));
            collection.set_member(module, "join", alias);
            // os is not loaded: resolution still answers with the path.
            assert_eq!(collection.resolve(module, "join").unwrap(), "os.path.join");
        }

        #[test]
        fn idempotent_on_frozen_tree() {
            let (mut collection, module) = collection_with_module("pkg");
            let function = collection.alloc(Object::function("f"));
            collection.set_member(module, "f", function);
            let first = collection.resolve(module, "f").unwrap();
            let second = collection.resolve(module, "f").unwrap();
            assert_eq!(first, second);
        }
    }

    mod visibility {
        use super::*;

        #[test]
        fn exports_are_authoritative() {
            let (mut collection, module) = collection_with_module("pkg");
            let public_function = collection.alloc(Object::function("f"));
            collection.set_member(module, "f", public_function);
            let hidden_function = collection.alloc(Object::function("g"));
            collection.set_member(module, "g", hidden_function);
            collection.object_mut(module).exports =
                Some(vec![ExportItem::Name("f".to_string())]);
            assert!(collection.is_public(public_function));
            assert!(!collection.is_public(hidden_function));
        }

        #[test]
        fn underscore_names_private_without_exports() {
            let (mut collection, module) = collection_with_module("pkg");
            let private_function = collection.alloc(Object::function("_helper"));
            collection.set_member(module, "_helper", private_function);
            let dunder = collection.alloc(Object::attribute("__version__"));
            collection.set_member(module, "__version__", dunder);
            assert!(!collection.is_public(private_function));
            assert!(collection.is_public(dunder));
        }

        #[test]
        fn explicit_flag_wins_over_exports() {
            let (mut collection, module) = collection_with_module("pkg");
            let function = collection.alloc(Object::function("f"));
            collection.set_member(module, "f", function);
            collection.object_mut(module).exports = Some(vec![]);
            collection.object_mut(function).public = Some(true);
            assert!(collection.is_public(function));
        }

        #[test]
        fn imported_names_private_without_exports() {
            let (mut collection, module) = collection_with_module("pkg");
            let alias = collection.alloc(Object::alias("join", "os.path.join"));
            collection.set_member(module, "join", alias);
            assert!(!collection.is_public(alias));
        }

        #[test]
        fn wildcard_exposure_respects_exports_and_imports() {
            let (mut collection, module) = collection_with_module("pkg");
            let function = collection.alloc(Object::function("f"));
            collection.set_member(module, "f", function);
            let submodule = collection.alloc(Object::module("sub"));
            collection.set_member(module, "sub", submodule);
            // No __all__: plain members leak, unimported submodules do not.
            assert!(collection.is_wildcard_exposed(function));
            assert!(!collection.is_wildcard_exposed(submodule));
            collection
                .object_mut(module)
                .imports
                .insert("sub".to_string(), "pkg.sub".to_string());
            assert!(collection.is_wildcard_exposed(submodule));
        }
    }
}
