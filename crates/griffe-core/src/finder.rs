//! Package layout discovery on a search path.
//!
//! The finder locates regular packages (`name/__init__.py`), single-file
//! modules (`name.py`), stubs (`.pyi`), namespace packages (directories
//! without `__init__.py`), and editable-install pointers (`.pth` files and
//! setuptools `__editable__*.py` mapping files). Submodule records come out
//! deepest-first so children are visited before their parents' `__init__`
//! processing re-enters them.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{GriffeError, Result};

/// Directories never descended into.
const EXCLUDED_DIRS: &[&str] = &[".git", "__pycache__", "venv", ".venv", "node_modules"];

// ============================================================================
// Records
// ============================================================================

/// What a discovered path is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A `.py` module file.
    Regular,
    /// An `__init__.py` file.
    Init,
    /// A `.pyi` stub file.
    Stub,
    /// A directory without `__init__.py` (namespace subpackage).
    Namespace,
}

/// One discovered module: dotted name, kind, filesystem path.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub name: String,
    pub kind: RecordKind,
    pub path: PathBuf,
}

/// The shape of the top-level package.
#[derive(Debug, Clone)]
pub enum PackageKind {
    /// `name/__init__.py`.
    Regular { init: PathBuf },
    /// `name.py` (or a lone `name.pyi`).
    Single { file: PathBuf },
    /// One or more directories without `__init__.py`.
    Namespace { dirs: Vec<PathBuf> },
}

/// A located package plus its submodule records, deepest-first.
#[derive(Debug, Clone)]
pub struct PackageLayout {
    pub name: String,
    pub kind: PackageKind,
    /// Stub companion for the top module, when requested and present.
    pub top_stub: Option<PathBuf>,
    pub records: Vec<ModuleRecord>,
}

// ============================================================================
// Finder
// ============================================================================

/// Locates packages and their submodules on a search path.
#[derive(Debug, Clone)]
pub struct ModuleFinder {
    search_paths: Vec<PathBuf>,
}

impl ModuleFinder {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        let search_paths = if search_paths.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            search_paths
        };
        ModuleFinder { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the layout of a package by name.
    pub fn find_package(&self, name: &str, find_stubs: bool) -> Result<PackageLayout> {
        if !is_identifier(name) {
            return Err(GriffeError::loading(name, "not a valid module name"));
        }
        let mut search = self.search_paths.clone();
        for dir in &self.search_paths {
            match self.expand_editable(dir, name) {
                Ok(extra) => search.extend(extra),
                Err(error) => return Err(error),
            }
        }

        let mut namespace_dirs: Vec<PathBuf> = Vec::new();
        for dir in &search {
            let package_dir = dir.join(name);
            let init = package_dir.join("__init__.py");
            if init.is_file() {
                let stub = package_dir.join("__init__.pyi");
                let top_stub = (find_stubs && stub.is_file()).then_some(stub);
                let records = self.submodules(name, &package_dir, find_stubs);
                return Ok(PackageLayout {
                    name: name.to_string(),
                    kind: PackageKind::Regular { init },
                    top_stub,
                    records,
                });
            }
            let single = dir.join(format!("{name}.py"));
            if single.is_file() {
                let stub = dir.join(format!("{name}.pyi"));
                return Ok(PackageLayout {
                    name: name.to_string(),
                    kind: PackageKind::Single { file: single },
                    top_stub: (find_stubs && stub.is_file()).then_some(stub),
                    records: Vec::new(),
                });
            }
            let stub_only = dir.join(format!("{name}.pyi"));
            if stub_only.is_file() {
                return Ok(PackageLayout {
                    name: name.to_string(),
                    kind: PackageKind::Single { file: stub_only },
                    top_stub: None,
                    records: Vec::new(),
                });
            }
            if package_dir.is_dir() {
                namespace_dirs.push(package_dir);
            }
        }

        if !namespace_dirs.is_empty() {
            let mut records = Vec::new();
            for dir in &namespace_dirs {
                records.extend(self.submodules(name, dir, find_stubs));
            }
            sort_records(&mut records);
            return Ok(PackageLayout {
                name: name.to_string(),
                kind: PackageKind::Namespace {
                    dirs: namespace_dirs,
                },
                top_stub: None,
                records,
            });
        }

        Err(GriffeError::loading(
            name,
            format!(
                "not found on search path ({})",
                self.search_paths
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        ))
    }

    /// Discover every submodule under a package directory.
    fn submodules(&self, package: &str, package_dir: &Path, find_stubs: bool) -> Vec<ModuleRecord> {
        let mut records = Vec::new();
        let walker = WalkDir::new(package_dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() {
                    is_identifier(&name) && !EXCLUDED_DIRS.contains(&name.as_ref())
                } else {
                    true
                }
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("skipping unreadable entry: {error}");
                    continue;
                }
            };
            let path = entry.path();
            let relative = match path.strip_prefix(package_dir) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if entry.file_type().is_dir() {
                if !path.join("__init__.py").is_file() && !path.join("__init__.pyi").is_file() {
                    if let Some(name) = dotted_name(package, relative, None) {
                        records.push(ModuleRecord {
                            name,
                            kind: RecordKind::Namespace,
                            path: path.to_path_buf(),
                        });
                    }
                }
                continue;
            }
            let extension = path.extension().and_then(|ext| ext.to_str());
            let kind = match extension {
                Some("py") => {
                    if path.file_stem().is_some_and(|stem| stem == "__init__") {
                        RecordKind::Init
                    } else {
                        RecordKind::Regular
                    }
                }
                Some("pyi") if find_stubs => RecordKind::Stub,
                _ => continue,
            };
            let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if stem == "__init__" || is_identifier(stem) => stem,
                _ => continue,
            };
            let stem = if stem == "__init__" { None } else { Some(stem) };
            // The top-level __init__ is handled by the package record.
            if stem.is_none() && relative.parent().map(|p| p.as_os_str().is_empty()).unwrap_or(true)
            {
                continue;
            }
            let Some(name) = dotted_name(package, relative.parent().unwrap_or(Path::new("")), stem)
            else {
                continue;
            };
            records.push(ModuleRecord {
                name,
                kind,
                path: path.to_path_buf(),
            });
        }
        sort_records(&mut records);
        records
    }

    /// Recognize editable-install pointers in a search directory and return
    /// the extra directories they contribute.
    fn expand_editable(&self, dir: &Path, package: &str) -> Result<Vec<PathBuf>> {
        let mut extra = Vec::new();
        let Ok(entries) = fs::read_dir(dir) else {
            return Ok(extra);
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();
            if file_name.ends_with(".pth") {
                let Ok(content) = fs::read_to_string(&path) else {
                    continue;
                };
                for line in content.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') || line.starts_with("import") {
                        continue;
                    }
                    let candidate = if Path::new(line).is_absolute() {
                        PathBuf::from(line)
                    } else {
                        dir.join(line)
                    };
                    if candidate.is_dir() {
                        debug!(path = %candidate.display(), "search path from .pth file");
                        extra.push(candidate);
                    }
                }
            } else if file_name.starts_with("__editable__")
                && file_name.ends_with(".py")
                && mentions_package(&file_name, package)
            {
                let content = fs::read_to_string(&path)?;
                let mapping =
                    Regex::new(r#"['"]([A-Za-z_][\w.]*)['"]\s*:\s*r?['"]([^'"]+)['"]"#)
                        .expect("static regex");
                let mut found = false;
                for captures in mapping.captures_iter(&content) {
                    let key = &captures[1];
                    if key == package || key.starts_with(&format!("{package}.")) {
                        let target = PathBuf::from(&captures[2]);
                        if let Some(parent) = target.parent() {
                            debug!(
                                path = %parent.display(),
                                "search path from editable mapping",
                            );
                            extra.push(parent.to_path_buf());
                            found = true;
                        }
                    }
                }
                if !found {
                    return Err(GriffeError::UnhandledEditableModule { path });
                }
            }
        }
        Ok(extra)
    }
}

fn mentions_package(file_name: &str, package: &str) -> bool {
    file_name
        .replace('-', "_")
        .contains(&package.replace('-', "_"))
}

/// Build `pkg.sub.mod` from the package name, a relative directory, and an
/// optional file stem. Returns `None` when a component is not importable.
fn dotted_name(package: &str, relative_dir: &Path, stem: Option<&str>) -> Option<String> {
    let mut parts = vec![package.to_string()];
    for component in relative_dir.components() {
        let component = component.as_os_str().to_str()?;
        if !is_identifier(component) {
            return None;
        }
        parts.push(component.to_string());
    }
    if let Some(stem) = stem {
        parts.push(stem.to_string());
    }
    Some(parts.join("."))
}

/// Deepest-first, then lexicographic, stubs after their runtime twin.
fn sort_records(records: &mut [ModuleRecord]) {
    records.sort_by_key(|record| {
        (
            Reverse(record.name.matches('.').count()),
            record.name.clone(),
            record.kind == RecordKind::Stub,
        )
    });
}

/// Whether a string is a valid Python identifier (ASCII approximation).
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn finds_regular_package() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pkg/__init__.py", "");
        write(temp.path(), "pkg/mod.py", "");
        write(temp.path(), "pkg/sub/__init__.py", "");
        write(temp.path(), "pkg/sub/deep.py", "");

        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        let layout = finder.find_package("pkg", false).unwrap();
        assert!(matches!(layout.kind, PackageKind::Regular { .. }));
        let names: Vec<&str> = layout
            .records
            .iter()
            .map(|record| record.name.as_str())
            .collect();
        // Deepest first, then lexicographic.
        assert_eq!(names, vec!["pkg.sub.deep", "pkg.mod", "pkg.sub"]);
    }

    #[test]
    fn finds_single_module() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "single.py", "x = 1\n");
        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        let layout = finder.find_package("single", false).unwrap();
        assert!(matches!(layout.kind, PackageKind::Single { .. }));
        assert!(layout.records.is_empty());
    }

    #[test]
    fn prefers_stub_companions_when_requested() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pkg/__init__.py", "");
        write(temp.path(), "pkg/__init__.pyi", "");
        write(temp.path(), "pkg/mod.py", "");
        write(temp.path(), "pkg/mod.pyi", "");

        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        let layout = finder.find_package("pkg", true).unwrap();
        assert!(layout.top_stub.is_some());
        let kinds: Vec<RecordKind> = layout.records.iter().map(|record| record.kind).collect();
        // Runtime module sorts before its stub twin.
        assert_eq!(kinds, vec![RecordKind::Regular, RecordKind::Stub]);

        let without = finder.find_package("pkg", false).unwrap();
        assert!(without.top_stub.is_none());
        assert_eq!(without.records.len(), 1);
    }

    #[test]
    fn finds_namespace_package() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "ns/part.py", "");
        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        let layout = finder.find_package("ns", false).unwrap();
        assert!(matches!(layout.kind, PackageKind::Namespace { .. }));
        assert_eq!(layout.records[0].name, "ns.part");
    }

    #[test]
    fn missing_package_errors() {
        let temp = TempDir::new().unwrap();
        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        assert!(matches!(
            finder.find_package("nope", false),
            Err(GriffeError::Loading { .. }),
        ));
    }

    #[test]
    fn pth_pointer_extends_search() {
        let temp = TempDir::new().unwrap();
        let real = TempDir::new().unwrap();
        write(real.path(), "pointed/__init__.py", "");
        write(
            temp.path(),
            "site.pth",
            &format!("# comment\n{}\n", real.path().display()),
        );
        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        let layout = finder.find_package("pointed", false).unwrap();
        assert!(matches!(layout.kind, PackageKind::Regular { .. }));
    }

    #[test]
    fn editable_mapping_resolves() {
        let temp = TempDir::new().unwrap();
        let real = TempDir::new().unwrap();
        write(real.path(), "edpkg/__init__.py", "");
        write(
            temp.path(),
            "__editable__.edpkg-0.1.0.py",
            &format!(
                "MAPPING = {{'edpkg': '{}'}}\n",
                real.path().join("edpkg").display(),
            ),
        );
        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        let layout = finder.find_package("edpkg", false).unwrap();
        assert!(matches!(layout.kind, PackageKind::Regular { .. }));
    }

    #[test]
    fn unrecognized_editable_pointer_errors() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "__editable__.mystery-0.1.0.py",
            "some unrecognized content\n",
        );
        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        assert!(matches!(
            finder.find_package("mystery", false),
            Err(GriffeError::UnhandledEditableModule { .. }),
        ));
    }

    #[test]
    fn excluded_directories_are_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pkg/__init__.py", "");
        write(temp.path(), "pkg/__pycache__/junk.py", "");
        write(temp.path(), "pkg/not-a-module/file.py", "");
        let finder = ModuleFinder::new(vec![temp.path().to_path_buf()]);
        let layout = finder.find_package("pkg", false).unwrap();
        assert!(layout.records.is_empty());
    }
}
