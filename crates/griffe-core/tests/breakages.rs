//! Breaking-change detection over two loaded versions of a package.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use griffe_core::collection::{ModulesCollection, ObjectId};
use griffe_core::diff::{find_breaking_changes, BreakageKind, ExplanationStyle};
use griffe_core::loader::{LoadOptions, Loader};

fn load_source(source: &str) -> (ModulesCollection, ObjectId) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("m.py"), source).unwrap();
    load_package(temp.path(), "m")
}

fn load_package(root: &Path, package: &str) -> (ModulesCollection, ObjectId) {
    let mut options = LoadOptions::new(vec![root.to_path_buf()]);
    options.resolve_aliases = true;
    let mut loader = Loader::new(options);
    let module = loader.load(package).unwrap();
    (loader.into_collection(), module)
}

fn diff_sources(old: &str, new: &str) -> Vec<BreakageKind> {
    let (old_collection, old_root) = load_source(old);
    let (new_collection, new_root) = load_source(new);
    find_breaking_changes(&old_collection, old_root, &new_collection, new_root)
        .into_iter()
        .map(|breakage| breakage.kind)
        .collect()
}

#[test]
fn losing_a_default_is_one_changed_required() {
    let (old_collection, old_root) = load_source("def f(x, y=1):\n    pass\n");
    let (new_collection, new_root) = load_source("def f(x, y):\n    pass\n");
    let breakages =
        find_breaking_changes(&old_collection, old_root, &new_collection, new_root);
    assert_eq!(breakages.len(), 1);
    assert_eq!(breakages[0].kind, BreakageKind::ParameterChangedRequired);
    assert_eq!(breakages[0].parameter.as_deref(), Some("y"));
}

#[test]
fn adding_a_required_parameter_breaks() {
    let kinds = diff_sources("def f(x):\n    pass\n", "def f(x, y):\n    pass\n");
    assert_eq!(kinds, vec![BreakageKind::ParameterAddedRequired]);
}

#[test]
fn removing_a_public_function_breaks() {
    let kinds = diff_sources("def f():\n    pass\n", "X = 1\n");
    assert_eq!(kinds, vec![BreakageKind::ObjectRemoved]);
}

#[test]
fn private_members_do_not_break() {
    let kinds = diff_sources("def _helper():\n    pass\n", "X = 1\n");
    assert!(kinds.is_empty());
}

#[test]
fn all_gates_what_counts_as_public() {
    let kinds = diff_sources(
        "__all__ = ['f']\n\ndef f():\n    pass\n\ndef g():\n    pass\n",
        "__all__ = ['f']\n\ndef f():\n    pass\n",
    );
    // g was never exported, so its removal is not a breakage.
    assert!(kinds.is_empty());
}

#[test]
fn kind_change_is_reported_once() {
    let kinds = diff_sources(
        "class Thing:\n    def method(self):\n        pass\n",
        "def Thing():\n    pass\n",
    );
    assert_eq!(kinds, vec![BreakageKind::ObjectChangedKind]);
}

#[test]
fn return_type_is_compared_modernized() {
    let kinds = diff_sources(
        "import typing\n\ndef f() -> typing.Optional[int]:\n    pass\n",
        "def f() -> int | None:\n    pass\n",
    );
    assert!(kinds.is_empty());

    let kinds = diff_sources(
        "def f() -> int:\n    pass\n",
        "def f() -> str:\n    pass\n",
    );
    assert_eq!(kinds, vec![BreakageKind::ReturnChangedType]);
}

#[test]
fn attribute_type_and_value_changes() {
    let kinds = diff_sources("X: int = 1\n", "X: str = '1'\n");
    assert_eq!(
        kinds,
        vec![
            BreakageKind::AttributeChangedType,
            BreakageKind::AttributeChangedValue,
        ],
    );
}

#[test]
fn removed_base_class_breaks() {
    let kinds = diff_sources(
        "class Base:\n    pass\n\nclass Sub(Base):\n    pass\n",
        "class Base:\n    pass\n\nclass Sub:\n    pass\n",
    );
    assert_eq!(kinds, vec![BreakageKind::ClassRemovedBase]);
}

#[test]
fn method_removal_inside_class() {
    let kinds = diff_sources(
        "class C:\n    def keep(self):\n        pass\n    def drop(self):\n        pass\n",
        "class C:\n    def keep(self):\n        pass\n",
    );
    assert_eq!(kinds, vec![BreakageKind::ObjectRemoved]);
}

#[test]
fn breakages_render_in_every_style() {
    let (old_collection, old_root) = load_source("def f(x, y=1):\n    pass\n");
    let (new_collection, new_root) = load_source("def f(x):\n    pass\n");
    let breakages =
        find_breaking_changes(&old_collection, old_root, &new_collection, new_root);
    assert!(!breakages.is_empty());
    for breakage in &breakages {
        for style in [
            ExplanationStyle::OneLine,
            ExplanationStyle::Verbose,
            ExplanationStyle::Markdown,
            ExplanationStyle::Github,
        ] {
            assert!(!breakage.explain(style).is_empty());
        }
    }
}

#[test]
fn diff_through_alias_members() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("pkg")).unwrap();
    fs::write(temp.path().join("pkg/__init__.py"), "from .impl import f\n").unwrap();
    fs::write(temp.path().join("pkg/impl.py"), "def f(x):\n    pass\n").unwrap();
    let (old_collection, old_root) = load_package(temp.path(), "pkg");

    let temp_new = TempDir::new().unwrap();
    fs::create_dir_all(temp_new.path().join("pkg")).unwrap();
    fs::write(
        temp_new.path().join("pkg/__init__.py"),
        "from .impl import f\n",
    )
    .unwrap();
    fs::write(
        temp_new.path().join("pkg/impl.py"),
        "def f(x, y):\n    pass\n",
    )
    .unwrap();
    let (new_collection, new_root) = load_package(temp_new.path(), "pkg");

    let breakages =
        find_breaking_changes(&old_collection, old_root, &new_collection, new_root);
    let kinds: Vec<BreakageKind> = breakages.iter().map(|breakage| breakage.kind).collect();
    assert!(kinds.contains(&BreakageKind::ParameterAddedRequired));
}
