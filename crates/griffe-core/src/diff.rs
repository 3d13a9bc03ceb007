//! Breaking-change detection between two loaded trees.
//!
//! The walk descends matched members by name, compares kinds, class bases,
//! function signatures, and attribute types/values, and emits a stream of
//! [`Breakage`] records. Rendering a breakage is a strategy
//! ([`ExplanationStyle`]), not part of the diff logic. A comparison failure
//! on one pair never aborts the walk.

use std::collections::HashSet;

use tracing::debug;

use crate::collection::{ModulesCollection, ObjectId};
use crate::expr::{modernize, Expr};
use crate::object::{Kind, Parameter};

// ============================================================================
// Breakage kinds
// ============================================================================

/// The closed set of breakage kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakageKind {
    ObjectRemoved,
    ObjectChangedKind,
    ClassRemovedBase,
    AttributeChangedType,
    AttributeChangedValue,
    ReturnChangedType,
    ParameterRemoved,
    ParameterMoved,
    ParameterAddedRequired,
    ParameterChangedRequired,
    ParameterChangedKind,
    ParameterChangedDefault,
}

impl BreakageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakageKind::ObjectRemoved => "OBJECT_REMOVED",
            BreakageKind::ObjectChangedKind => "OBJECT_CHANGED_KIND",
            BreakageKind::ClassRemovedBase => "CLASS_REMOVED_BASE",
            BreakageKind::AttributeChangedType => "ATTRIBUTE_CHANGED_TYPE",
            BreakageKind::AttributeChangedValue => "ATTRIBUTE_CHANGED_VALUE",
            BreakageKind::ReturnChangedType => "RETURN_CHANGED_TYPE",
            BreakageKind::ParameterRemoved => "PARAMETER_REMOVED",
            BreakageKind::ParameterMoved => "PARAMETER_MOVED",
            BreakageKind::ParameterAddedRequired => "PARAMETER_ADDED_REQUIRED",
            BreakageKind::ParameterChangedRequired => "PARAMETER_CHANGED_REQUIRED",
            BreakageKind::ParameterChangedKind => "PARAMETER_CHANGED_KIND",
            BreakageKind::ParameterChangedDefault => "PARAMETER_CHANGED_DEFAULT",
        }
    }

    fn explanation(&self) -> &'static str {
        match self {
            BreakageKind::ObjectRemoved => "Public object was removed",
            BreakageKind::ObjectChangedKind => {
                "Public object points to a different kind of object"
            }
            BreakageKind::ClassRemovedBase => "Base class was removed",
            BreakageKind::AttributeChangedType => "Attribute types are incompatible",
            BreakageKind::AttributeChangedValue => "Attribute value was changed",
            BreakageKind::ReturnChangedType => "Return types are incompatible",
            BreakageKind::ParameterRemoved => "Parameter was removed",
            BreakageKind::ParameterMoved => "Positional parameter was moved",
            BreakageKind::ParameterAddedRequired => "Parameter was added as required",
            BreakageKind::ParameterChangedRequired => "Parameter is now required",
            BreakageKind::ParameterChangedKind => "Parameter kind was changed",
            BreakageKind::ParameterChangedDefault => "Parameter default was changed",
        }
    }
}

/// How to render breakages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplanationStyle {
    OneLine,
    Verbose,
    Markdown,
    Github,
}

impl ExplanationStyle {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "oneline" => Some(ExplanationStyle::OneLine),
            "verbose" => Some(ExplanationStyle::Verbose),
            "markdown" => Some(ExplanationStyle::Markdown),
            "github" => Some(ExplanationStyle::Github),
            _ => None,
        }
    }
}

// ============================================================================
// Breakage
// ============================================================================

/// One detected breaking change.
#[derive(Debug, Clone)]
pub struct Breakage {
    pub kind: BreakageKind,
    /// Canonical path of the affected object.
    pub path: String,
    /// Parameter name, for parameter-level breakages.
    pub parameter: Option<String>,
    pub lineno: Option<usize>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub details: Option<String>,
}

impl Breakage {
    fn new(kind: BreakageKind, path: impl Into<String>) -> Self {
        Breakage {
            kind,
            path: path.into(),
            parameter: None,
            lineno: None,
            old_value: None,
            new_value: None,
            details: None,
        }
    }

    fn subject(&self) -> String {
        match &self.parameter {
            Some(parameter) => format!("{}({})", self.path, parameter),
            None => self.path.clone(),
        }
    }

    /// Render this breakage in the given style.
    pub fn explain(&self, style: ExplanationStyle) -> String {
        match style {
            ExplanationStyle::OneLine => {
                let mut line = format!("{}: {}", self.subject(), self.kind.explanation());
                match (&self.old_value, &self.new_value) {
                    (Some(old), Some(new)) => {
                        line.push_str(&format!(": {old} -> {new}"));
                    }
                    (Some(old), None) => line.push_str(&format!(": {old}")),
                    _ => {}
                }
                line
            }
            ExplanationStyle::Verbose => {
                let mut out = format!("{}:\n  {}", self.subject(), self.kind.explanation());
                if let Some(lineno) = self.lineno {
                    out.push_str(&format!("\n  line: {lineno}"));
                }
                if let Some(old) = &self.old_value {
                    out.push_str(&format!("\n  old: {old}"));
                }
                if let Some(new) = &self.new_value {
                    out.push_str(&format!("\n  new: {new}"));
                }
                if let Some(details) = &self.details {
                    out.push_str(&format!("\n  details: {details}"));
                }
                out
            }
            ExplanationStyle::Markdown => {
                let mut line = format!("- `{}`: {}", self.subject(), self.kind.explanation());
                if let (Some(old), Some(new)) = (&self.old_value, &self.new_value) {
                    line.push_str(&format!(" (`{old}` -> `{new}`)"));
                }
                line
            }
            ExplanationStyle::Github => {
                let mut command = "::warning title=API breakage".to_string();
                if let Some(lineno) = self.lineno {
                    command.push_str(&format!(",line={lineno}"));
                }
                command.push_str(&format!(
                    "::{}: {}",
                    self.subject(),
                    self.kind.explanation(),
                ));
                command
            }
        }
    }
}

// ============================================================================
// Walk
// ============================================================================

struct DiffContext<'a> {
    old: &'a ModulesCollection,
    new: &'a ModulesCollection,
    visited: HashSet<(ObjectId, ObjectId)>,
    breakages: Vec<Breakage>,
}

/// Compare two loaded trees and report breaking changes, in deterministic
/// member order.
pub fn find_breaking_changes(
    old: &ModulesCollection,
    old_root: ObjectId,
    new: &ModulesCollection,
    new_root: ObjectId,
) -> Vec<Breakage> {
    let mut context = DiffContext {
        old,
        new,
        visited: HashSet::new(),
        breakages: Vec::new(),
    };
    context.diff_object(old_root, new_root);
    context.breakages
}

impl DiffContext<'_> {
    fn diff_object(&mut self, old_id: ObjectId, new_id: ObjectId) {
        // Follow aliases; a resolution failure skips this pair only.
        let old_id = match self.old.final_target(old_id) {
            Ok(id) => id,
            Err(error) => {
                debug!(path = %self.old.path(old_id), "skipping unresolvable alias: {error}");
                return;
            }
        };
        let new_id = match self.new.final_target(new_id) {
            Ok(id) => id,
            Err(error) => {
                debug!(path = %self.new.path(new_id), "skipping unresolvable alias: {error}");
                return;
            }
        };
        if !self.visited.insert((old_id, new_id)) {
            return;
        }

        let old_object = self.old.object(old_id);
        let new_object = self.new.object(new_id);
        if old_object.kind() != new_object.kind() {
            let mut breakage = Breakage::new(BreakageKind::ObjectChangedKind, self.old.path(old_id));
            breakage.old_value = Some(old_object.kind().as_str().to_string());
            breakage.new_value = Some(new_object.kind().as_str().to_string());
            breakage.lineno = new_object.lineno;
            self.breakages.push(breakage);
            return;
        }

        match old_object.kind() {
            Kind::Module => self.diff_members(old_id, new_id),
            Kind::Class => {
                self.diff_class(old_id, new_id);
                self.diff_members(old_id, new_id);
            }
            Kind::Function => self.diff_function(old_id, new_id),
            Kind::Attribute => self.diff_attribute(old_id, new_id),
            Kind::TypeAlias | Kind::Alias => {}
        }
    }

    fn diff_members(&mut self, old_id: ObjectId, new_id: ObjectId) {
        let member_names: Vec<String> = self
            .old
            .object(old_id)
            .members
            .keys()
            .cloned()
            .collect();
        for name in member_names {
            let old_member = match self.old.get_member(old_id, &name) {
                Some(member) => member,
                None => continue,
            };
            if !self.old.is_public(old_member) {
                continue;
            }
            match self.new.get_member(new_id, &name) {
                Some(new_member) => self.diff_object(old_member, new_member),
                None => {
                    let mut breakage =
                        Breakage::new(BreakageKind::ObjectRemoved, self.old.path(old_member));
                    breakage.old_value =
                        Some(self.old.object(old_member).kind().as_str().to_string());
                    self.breakages.push(breakage);
                }
            }
        }
    }

    fn diff_class(&mut self, old_id: ObjectId, new_id: ObjectId) {
        let old_bases = self.base_paths(self.old, old_id);
        let new_bases: HashSet<String> = self.base_paths(self.new, new_id).into_iter().collect();
        for base in old_bases {
            if !new_bases.contains(&base) {
                let mut breakage =
                    Breakage::new(BreakageKind::ClassRemovedBase, self.old.path(old_id));
                breakage.old_value = Some(base);
                breakage.lineno = self.new.object(new_id).lineno;
                self.breakages.push(breakage);
            }
        }
    }

    fn base_paths(&self, collection: &ModulesCollection, class_id: ObjectId) -> Vec<String> {
        let Some(data) = collection.object(class_id).as_class() else {
            return Vec::new();
        };
        data.bases
            .iter()
            .map(|base| {
                let head = match base {
                    Expr::Subscript { value, .. } => value.as_ref(),
                    other => other,
                };
                head.canonical_path(collection)
                    .unwrap_or_else(|_| modernize(head).to_string())
            })
            .collect()
    }

    fn diff_function(&mut self, old_id: ObjectId, new_id: ObjectId) {
        let path = self.old.path(old_id);
        let lineno = self.new.object(new_id).lineno;
        let (Some(old_data), Some(new_data)) = (
            self.old.object(old_id).as_function(),
            self.new.object(new_id).as_function(),
        ) else {
            return;
        };

        let mut matched_new: HashSet<usize> = HashSet::new();
        for (old_index, old_parameter) in old_data.parameters.iter().enumerate() {
            let found = new_data
                .parameters
                .iter()
                .enumerate()
                .find(|(_, parameter)| parameter.name == old_parameter.name);
            let Some((new_index, new_parameter)) = found else {
                let mut breakage = Breakage::new(BreakageKind::ParameterRemoved, path.clone());
                breakage.parameter = Some(old_parameter.name.clone());
                breakage.old_value = Some(render_parameter(old_parameter));
                breakage.lineno = lineno;
                self.breakages.push(breakage);
                continue;
            };
            matched_new.insert(new_index);

            if old_parameter.kind != new_parameter.kind {
                let mut breakage = Breakage::new(BreakageKind::ParameterChangedKind, path.clone());
                breakage.parameter = Some(old_parameter.name.clone());
                breakage.old_value = Some(old_parameter.kind.as_str().to_string());
                breakage.new_value = Some(new_parameter.kind.as_str().to_string());
                breakage.lineno = lineno;
                self.breakages.push(breakage);
                continue;
            }

            if old_parameter.kind.is_positional() {
                let old_position = positional_index(&old_data.parameters, old_index);
                let new_position = positional_index(&new_data.parameters, new_index);
                if old_position != new_position {
                    let mut breakage = Breakage::new(BreakageKind::ParameterMoved, path.clone());
                    breakage.parameter = Some(old_parameter.name.clone());
                    breakage.old_value = Some(old_position.to_string());
                    breakage.new_value = Some(new_position.to_string());
                    breakage.lineno = lineno;
                    self.breakages.push(breakage);
                }
            }

            match (&old_parameter.default, &new_parameter.default) {
                (Some(_), None) if !new_parameter.kind.is_variadic() => {
                    let mut breakage =
                        Breakage::new(BreakageKind::ParameterChangedRequired, path.clone());
                    breakage.parameter = Some(old_parameter.name.clone());
                    breakage.lineno = lineno;
                    self.breakages.push(breakage);
                }
                (Some(old_default), Some(new_default)) => {
                    let old_render = old_default.to_string();
                    let new_render = new_default.to_string();
                    if old_render != new_render {
                        // A soft signal compared to the structural breakages.
                        let mut breakage =
                            Breakage::new(BreakageKind::ParameterChangedDefault, path.clone());
                        breakage.parameter = Some(old_parameter.name.clone());
                        breakage.old_value = Some(old_render);
                        breakage.new_value = Some(new_render);
                        breakage.lineno = lineno;
                        self.breakages.push(breakage);
                    }
                }
                _ => {}
            }
        }

        for (new_index, new_parameter) in new_data.parameters.iter().enumerate() {
            if matched_new.contains(&new_index) {
                continue;
            }
            if new_parameter.is_required() {
                let mut breakage =
                    Breakage::new(BreakageKind::ParameterAddedRequired, path.clone());
                breakage.parameter = Some(new_parameter.name.clone());
                breakage.new_value = Some(render_parameter(new_parameter));
                breakage.lineno = lineno;
                self.breakages.push(breakage);
            }
        }

        if let (Some(old_returns), Some(new_returns)) = (&old_data.returns, &new_data.returns) {
            let old_render = modernize(old_returns).to_string();
            let new_render = modernize(new_returns).to_string();
            if old_render != new_render {
                let mut breakage = Breakage::new(BreakageKind::ReturnChangedType, path);
                breakage.old_value = Some(old_render);
                breakage.new_value = Some(new_render);
                breakage.lineno = lineno;
                self.breakages.push(breakage);
            }
        }
    }

    fn diff_attribute(&mut self, old_id: ObjectId, new_id: ObjectId) {
        let path = self.old.path(old_id);
        let lineno = self.new.object(new_id).lineno;
        let (Some(old_data), Some(new_data)) = (
            self.old.object(old_id).as_attribute(),
            self.new.object(new_id).as_attribute(),
        ) else {
            return;
        };

        if let (Some(old_annotation), Some(new_annotation)) =
            (&old_data.annotation, &new_data.annotation)
        {
            let old_render = modernize(old_annotation).to_string();
            let new_render = modernize(new_annotation).to_string();
            if old_render != new_render {
                let mut breakage =
                    Breakage::new(BreakageKind::AttributeChangedType, path.clone());
                breakage.old_value = Some(old_render);
                breakage.new_value = Some(new_render);
                breakage.lineno = lineno;
                self.breakages.push(breakage);
            }
        }

        if let (Some(old_value), Some(new_value)) = (&old_data.value, &new_data.value) {
            if old_value.is_constant() && new_value.is_constant() {
                let old_render = old_value.to_string();
                let new_render = new_value.to_string();
                if old_render != new_render {
                    let mut breakage =
                        Breakage::new(BreakageKind::AttributeChangedValue, path);
                    breakage.old_value = Some(old_render);
                    breakage.new_value = Some(new_render);
                    breakage.lineno = lineno;
                    self.breakages.push(breakage);
                }
            }
        }
    }
}

/// Index of a parameter among the positional parameters only.
fn positional_index(parameters: &[Parameter], index: usize) -> usize {
    parameters[..index]
        .iter()
        .filter(|parameter| parameter.kind.is_positional())
        .count()
}

fn render_parameter(parameter: &Parameter) -> String {
    let mut out = match parameter.kind {
        crate::object::ParameterKind::VarPositional => format!("*{}", parameter.name),
        crate::object::ParameterKind::VarKeyword => format!("**{}", parameter.name),
        _ => parameter.name.clone(),
    };
    if let Some(annotation) = &parameter.annotation {
        out.push_str(&format!(": {annotation}"));
    }
    if let Some(default) = &parameter.default {
        out.push_str(&format!("={default}"));
    }
    out
}
