//! The loader: drives the finder and visitor, merges stubs, expands
//! `__all__` and wildcard imports, and resolves aliases to a fixed point.
//!
//! Failures are scoped to the offending module: the object exists with
//! incomplete members, a warning is logged, and loading continues. Only a
//! failure on the package root itself aborts the load.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collection::{ModulesCollection, ObjectId};
use crate::docstring::DocstringStyle;
use crate::error::{GriffeError, Result};
use crate::expr::Expr;
use crate::finder::{ModuleFinder, PackageKind, RecordKind};
use crate::lines::LinesCollection;
use crate::merge::merge_stub;
use crate::object::{ExportItem, ModulePath, Object, WildcardImport};
use crate::visitor::visit_module;

/// Fallback producing modules by importing them at runtime. Kept behind a
/// narrow seam; no in-process implementation ships with this crate.
pub trait DynamicInspector {
    fn construct_module(
        &self,
        name: &str,
        path: &Path,
        collection: &mut ModulesCollection,
    ) -> Result<ObjectId>;
}

/// Options controlling a load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub search_paths: Vec<PathBuf>,
    /// Fall back to dynamic inspection when a static visit fails.
    pub allow_inspection: bool,
    /// Skip static visiting entirely.
    pub force_inspection: bool,
    /// Run the alias resolution pass after loading.
    pub resolve_aliases: bool,
    /// Chase alias targets into packages that were not asked for.
    pub resolve_external: bool,
    /// Look for `.pyi` stubs and merge them.
    pub find_stubs: bool,
    /// Ceiling on loads triggered by external alias targets.
    pub external_load_cap: usize,
    /// Docstring parser recorded on loaded docstrings.
    pub docstring_style: Option<DocstringStyle>,
}

impl LoadOptions {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        LoadOptions {
            search_paths,
            allow_inspection: true,
            force_inspection: false,
            resolve_aliases: false,
            resolve_external: false,
            find_stubs: true,
            external_load_cap: 50,
            docstring_style: None,
        }
    }
}

/// Counters accumulated over a load.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub modules_visited: usize,
    pub stub_merges: usize,
    pub aliases_resolved: usize,
    pub aliases_unresolved: usize,
    pub external_loads: usize,
    pub elapsed: Duration,
}

/// Loads packages into a shared modules collection.
pub struct Loader {
    options: LoadOptions,
    finder: ModuleFinder,
    collection: ModulesCollection,
    lines: LinesCollection,
    stats: Stats,
    inspector: Option<Box<dyn DynamicInspector>>,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Self {
        let finder = ModuleFinder::new(options.search_paths.clone());
        Loader {
            options,
            finder,
            collection: ModulesCollection::new(),
            lines: LinesCollection::new(),
            stats: Stats::default(),
            inspector: None,
        }
    }

    pub fn with_inspector(mut self, inspector: Box<dyn DynamicInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn collection(&self) -> &ModulesCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut ModulesCollection {
        &mut self.collection
    }

    pub fn lines(&self) -> &LinesCollection {
        &self.lines
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn into_collection(self) -> ModulesCollection {
        self.collection
    }

    /// Load a package and return its root module.
    pub fn load(&mut self, package: &str) -> Result<ObjectId> {
        let start = Instant::now();
        let root = self.load_package(package)?;
        self.expand_exports();
        self.expand_wildcards(package)?;
        if self.options.resolve_aliases {
            self.resolve_aliases_pass();
        }
        self.stats.elapsed += start.elapsed();
        info!(
            package,
            modules = self.stats.modules_visited,
            "loaded package",
        );
        Ok(root)
    }

    // ------------------------------------------------------------------
    // Package loading
    // ------------------------------------------------------------------

    fn load_package(&mut self, package: &str) -> Result<ObjectId> {
        if let Some(existing) = self.collection.top_level_module(package) {
            return Ok(existing);
        }
        let layout = self.finder.find_package(package, self.options.find_stubs)?;
        let root = match &layout.kind {
            PackageKind::Regular { init } => self.visit_or_inspect(package, init)?,
            PackageKind::Single { file } => self.visit_or_inspect(package, file)?,
            PackageKind::Namespace { dirs } => {
                let mut module = Object::module(package);
                if let Some(data) = module.as_module_mut() {
                    data.filepath = Some(ModulePath::Dirs(dirs.clone()));
                }
                self.collection.alloc(module)
            }
        };
        self.collection.insert_top_level(root);
        if let Some(stub_path) = &layout.top_stub {
            self.merge_stub_file(package, stub_path, root);
        }
        for record in &layout.records {
            self.load_record(record.name.clone(), record.kind, record.path.clone());
        }
        self.apply_docstring_style(root);
        Ok(root)
    }

    fn load_record(&mut self, name: String, kind: RecordKind, path: PathBuf) {
        match kind {
            RecordKind::Namespace => {
                let module = self.ensure_module(&name);
                if let Some(data) = self.collection.object_mut(module).as_module_mut() {
                    match &mut data.filepath {
                        Some(ModulePath::Dirs(dirs)) => dirs.push(path),
                        None => data.filepath = Some(ModulePath::Dirs(vec![path])),
                        Some(ModulePath::File(_)) => {}
                    }
                }
            }
            RecordKind::Regular | RecordKind::Init => {
                match self.visit_or_inspect(&name, &path) {
                    Ok(module) => self.attach_module(&name, module),
                    Err(error) => {
                        warn!(module = %name, "visit failed, recording partial module: {error}");
                        self.ensure_module(&name);
                    }
                }
            }
            RecordKind::Stub => {
                if let Some(runtime) = self.collection.get_member_path(&name) {
                    if self.collection.object(runtime).is_module() {
                        self.merge_stub_file(&name, &path, runtime);
                        return;
                    }
                }
                // Stub-only module: the stub becomes the module.
                let source = match std::fs::read_to_string(&path) {
                    Ok(source) => source,
                    Err(error) => {
                        warn!(module = %name, "cannot read stub: {error}");
                        return;
                    }
                };
                match visit_module(&mut self.collection, &mut self.lines, &name, &path, &source) {
                    Ok(module) => {
                        self.stats.modules_visited += 1;
                        self.attach_module(&name, module);
                    }
                    Err(error) => warn!(module = %name, "stub visit failed: {error}"),
                }
            }
        }
    }

    fn merge_stub_file(&mut self, name: &str, path: &Path, runtime: ObjectId) {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                warn!(module = %name, "cannot read stub: {error}");
                return;
            }
        };
        match visit_module(&mut self.collection, &mut self.lines, name, path, &source) {
            Ok(stub) => {
                merge_stub(&mut self.collection, runtime, stub);
                self.stats.stub_merges += 1;
            }
            Err(error) => warn!(module = %name, "stub visit failed: {error}"),
        }
    }

    fn visit_or_inspect(&mut self, name: &str, path: &Path) -> Result<ObjectId> {
        if self.options.force_inspection {
            return self.inspect(name, path);
        }
        let source = std::fs::read_to_string(path)?;
        match visit_module(&mut self.collection, &mut self.lines, name, path, &source) {
            Ok(module) => {
                self.stats.modules_visited += 1;
                Ok(module)
            }
            Err(error) if self.options.allow_inspection && self.inspector.is_some() => {
                debug!(module = %name, "static visit failed, trying inspection: {error}");
                self.inspect(name, path)
            }
            Err(error) => Err(error),
        }
    }

    fn inspect(&mut self, name: &str, path: &Path) -> Result<ObjectId> {
        // Take the inspector so it can borrow the collection mutably.
        let Some(inspector) = self.inspector.take() else {
            return Err(GriffeError::unimportable(
                path,
                "dynamic inspection requested but no inspector is configured",
            ));
        };
        let result = inspector.construct_module(name, path, &mut self.collection);
        self.inspector = Some(inspector);
        if result.is_ok() {
            self.stats.modules_visited += 1;
        }
        result
    }

    /// Get or create the module at a dotted path, creating placeholder
    /// parents as needed. Children are visited before their parents, so
    /// placeholders are routinely filled in later.
    fn ensure_module(&mut self, dotted: &str) -> ObjectId {
        let mut segments = dotted.split('.');
        let top = segments.next().unwrap_or(dotted);
        let mut current = match self.collection.top_level_module(top) {
            Some(id) => id,
            None => {
                let id = self.collection.alloc(Object::module(top));
                self.collection.insert_top_level(id);
                id
            }
        };
        for segment in segments {
            current = match self.collection.get_member(current, segment) {
                Some(existing) => existing,
                None => {
                    let id = self.collection.alloc(Object::module(segment));
                    self.collection.set_member(current, segment, id);
                    id
                }
            };
        }
        current
    }

    /// Attach a freshly visited module at its dotted path, adopting
    /// submodule children already hanging off a placeholder there.
    fn attach_module(&mut self, dotted: &str, module: ObjectId) {
        let Some((parent_path, name)) = dotted.rsplit_once('.') else {
            self.collection.insert_top_level(module);
            return;
        };
        let parent = self.ensure_module(parent_path);
        if let Some(existing) = self.collection.get_member(parent, name) {
            if self.collection.object(existing).is_module() {
                let children: Vec<(String, ObjectId)> = self
                    .collection
                    .object(existing)
                    .members
                    .iter()
                    .map(|(child_name, child)| (child_name.clone(), *child))
                    .collect();
                for (child_name, child) in children {
                    if self.collection.get_member(module, &child_name).is_none() {
                        self.collection.set_member(module, &child_name, child);
                    }
                }
            }
        }
        self.collection.set_member(parent, name, module);
    }

    fn apply_docstring_style(&mut self, root: ObjectId) {
        let Some(style) = self.options.docstring_style else {
            return;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(docstring) = &mut self.collection.object_mut(id).docstring {
                docstring.style = Some(style);
            }
            stack.extend(self.collection.object(id).members.values().copied());
        }
    }

    // ------------------------------------------------------------------
    // Export expansion
    // ------------------------------------------------------------------

    /// Substitute `*other.__all__` entries with the target module's
    /// (already expanded) exports, iterating to a fixed point.
    fn expand_exports(&mut self) {
        loop {
            let pending: Vec<ObjectId> = self
                .collection
                .ids()
                .filter(|id| {
                    self.collection
                        .object(*id)
                        .exports
                        .as_ref()
                        .is_some_and(|exports| {
                            exports.iter().any(|item| matches!(item, ExportItem::Expr(_)))
                        })
                })
                .collect();
            if pending.is_empty() {
                return;
            }
            let mut progress = false;
            for module in pending {
                if self.try_expand_module_exports(module) {
                    progress = true;
                }
            }
            if !progress {
                for id in self.collection.ids() {
                    if let Some(exports) = &self.collection.object(id).exports {
                        if exports.iter().any(|item| matches!(item, ExportItem::Expr(_))) {
                            warn!(
                                module = %self.collection.path(id),
                                "could not expand every __all__ entry",
                            );
                        }
                    }
                }
                return;
            }
        }
    }

    /// Try to expand one module's exports; true when fully expanded.
    fn try_expand_module_exports(&mut self, module: ObjectId) -> bool {
        let Some(items) = self.collection.object(module).exports.clone() else {
            return false;
        };
        let mut expanded: Vec<ExportItem> = Vec::new();
        for item in items {
            match item {
                ExportItem::Name(name) => expanded.push(ExportItem::Name(name)),
                ExportItem::Expr(expr) => {
                    match self.exports_referenced_by(&expr) {
                        Some(names) => {
                            expanded.extend(names.into_iter().map(ExportItem::Name));
                        }
                        // Target not expandable yet: try again next pass.
                        None => return false,
                    }
                }
            }
        }
        self.collection.object_mut(module).exports = Some(expanded);
        true
    }

    /// Evaluate an `__all__` entry like `utils.__all__` to a name list, if
    /// the referenced module is loaded and fully expanded.
    fn exports_referenced_by(&self, expr: &Expr) -> Option<Vec<String>> {
        let Expr::Attribute { value, attr } = expr else {
            return None;
        };
        if attr != "__all__" {
            return None;
        }
        let path = value.name_path(&self.collection).ok()?;
        let target = self.collection.get_member_path(&path)?;
        let target = self.collection.final_target(target).ok()?;
        let exports = self.collection.object(target).exports.as_ref()?;
        let mut names = Vec::new();
        for item in exports {
            match item {
                ExportItem::Name(name) => names.push(name.clone()),
                ExportItem::Expr(_) => return None,
            }
        }
        Some(names)
    }

    // ------------------------------------------------------------------
    // Wildcard expansion
    // ------------------------------------------------------------------

    /// Materialize `from x import *` into one alias per exposed name.
    /// Circular wildcard chains are a load-time error.
    fn expand_wildcards(&mut self, package: &str) -> Result<()> {
        loop {
            let pending: Vec<(ObjectId, WildcardImport)> = self
                .collection
                .ids()
                .filter_map(|id| {
                    let data = self.collection.object(id).as_module()?;
                    let wildcard = data.wildcard_imports.first()?.clone();
                    Some((id, wildcard))
                })
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            let mut progress = false;
            for (module, wildcard) in &pending {
                let source = self
                    .collection
                    .get_member_path(&wildcard.source_path)
                    .and_then(|id| self.collection.final_target(id).ok());
                let Some(source) = source else {
                    warn!(
                        module = %self.collection.path(*module),
                        source = %wildcard.source_path,
                        "wildcard import source not loaded, skipping",
                    );
                    self.pop_wildcard(*module);
                    progress = true;
                    continue;
                };
                // A source with its own pending wildcard expands first.
                let source_pending = self
                    .collection
                    .object(source)
                    .as_module()
                    .map(|data| !data.wildcard_imports.is_empty())
                    .unwrap_or(false);
                if source_pending {
                    continue;
                }
                let source_path = self.collection.path(source);
                for (name, _member) in self.collection.wildcard_exposed_members(source) {
                    if self.collection.get_member(*module, &name).is_some() {
                        continue;
                    }
                    let alias = self
                        .collection
                        .alloc(Object::alias(&name, format!("{source_path}.{name}")));
                    self.collection.set_member(*module, &name, alias);
                    let object = self.collection.object_mut(alias);
                    object.runtime = wildcard.runtime;
                    object.lineno = wildcard.lineno;
                    self.collection
                        .object_mut(*module)
                        .imports
                        .insert(name.clone(), format!("{source_path}.{name}"));
                }
                self.pop_wildcard(*module);
                progress = true;
            }
            if !progress {
                let cycle: Vec<String> = pending
                    .iter()
                    .map(|(module, _)| self.collection.path(*module))
                    .collect();
                return Err(GriffeError::loading(
                    package,
                    format!("circular wildcard imports through {}", cycle.join(", ")),
                ));
            }
        }
    }

    fn pop_wildcard(&mut self, module: ObjectId) {
        if let Some(data) = self.collection.object_mut(module).as_module_mut() {
            if !data.wildcard_imports.is_empty() {
                data.wildcard_imports.remove(0);
            }
        }
    }

    // ------------------------------------------------------------------
    // Alias resolution
    // ------------------------------------------------------------------

    /// Resolve aliases to a fixed point, optionally loading external
    /// packages (bounded by `external_load_cap`).
    fn resolve_aliases_pass(&mut self) {
        let mut external_budget = self.options.external_load_cap;
        loop {
            let unresolved: Vec<ObjectId> = self
                .collection
                .ids()
                .filter(|id| {
                    let object = self.collection.object(*id);
                    object.parent.is_some()
                        && object.as_alias().is_some_and(|data| data.target.is_none())
                })
                .collect();
            let mut progress = false;
            for id in &unresolved {
                match self.collection.cache_alias_target(*id) {
                    Ok(_) => {
                        self.stats.aliases_resolved += 1;
                        progress = true;
                    }
                    Err(GriffeError::AliasResolution { target_path, .. }) => {
                        let top = target_path.split('.').next().unwrap_or("").to_string();
                        if !top.is_empty()
                            && self.collection.top_level_module(&top).is_none()
                            && self.should_load_external(&top)
                            && external_budget > 0
                        {
                            external_budget -= 1;
                            self.stats.external_loads += 1;
                            match self.load_package(&top) {
                                Ok(_) => {
                                    self.expand_exports();
                                    if let Err(error) = self.expand_wildcards(&top) {
                                        warn!("external package {top}: {error}");
                                    }
                                    progress = true;
                                }
                                Err(error) => {
                                    debug!("external package {top} not loadable: {error}");
                                }
                            }
                        }
                    }
                    Err(error) => {
                        debug!(
                            alias = %self.collection.path(*id),
                            "alias left unresolved: {error}",
                        );
                    }
                }
            }
            if !progress {
                self.stats.aliases_unresolved = self
                    .collection
                    .ids()
                    .filter(|id| {
                        let object = self.collection.object(*id);
                        object.parent.is_some()
                            && object.as_alias().is_some_and(|data| data.target.is_none())
                    })
                    .count();
                return;
            }
        }
    }

    /// External loads are opt-in, except for private top-level twins
    /// (`_pkg` next to a loaded `pkg`).
    fn should_load_external(&self, top: &str) -> bool {
        if self.options.resolve_external {
            return true;
        }
        top.strip_prefix('_')
            .map(|public| self.collection.top_level_module(public).is_some())
            .unwrap_or(false)
    }
}
