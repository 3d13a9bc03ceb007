//! Git collaborator: load a package as it was at a given ref.
//!
//! Shells out to `git worktree add` to materialize a detached checkout in a
//! temporary directory, re-enters the static loader against it, and prunes
//! the worktree afterwards. Only the loaded tree survives; file paths inside
//! it dangle once the checkout is removed.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::collection::{ModulesCollection, ObjectId};
use crate::error::{GriffeError, Result};
use crate::loader::{LoadOptions, Loader};

fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .map_err(|error| GriffeError::git(format!("cannot run git: {error}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GriffeError::git(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim(),
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Fail unless `path` is inside a git work tree.
pub fn assert_git_repo(path: &Path) -> Result<()> {
    run_git(path, &["rev-parse", "--is-inside-work-tree"]).map(|_| ())
}

/// A detached worktree checkout of one ref, pruned on drop.
pub struct WorktreeCheckout {
    repo: PathBuf,
    path: PathBuf,
    _temp: TempDir,
}

impl WorktreeCheckout {
    pub fn new(repo: &Path, reference: &str) -> Result<Self> {
        let temp = TempDir::new()?;
        let path = temp.path().join("worktree");
        let path_str = path.to_string_lossy();
        run_git(
            repo,
            &["worktree", "add", "--detach", &path_str, reference],
        )?;
        debug!(reference, path = %path.display(), "created worktree");
        Ok(WorktreeCheckout {
            repo: repo.to_path_buf(),
            path,
            _temp: temp,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorktreeCheckout {
    fn drop(&mut self) {
        let path_str = self.path.to_string_lossy();
        let removed = run_git(
            &self.repo,
            &["worktree", "remove", "--force", &path_str],
        );
        if let Err(error) = removed {
            warn!("could not remove worktree: {error}");
        }
    }
}

/// Load `package` from `repo` as of `reference`.
///
/// Relative search paths are rebased onto the checkout; `subdirectory`
/// overrides them entirely when given.
pub fn load_git(
    package: &str,
    reference: &str,
    repo: &Path,
    mut options: LoadOptions,
    subdirectory: Option<&Path>,
) -> Result<(ModulesCollection, ObjectId)> {
    assert_git_repo(repo)?;
    let checkout = WorktreeCheckout::new(repo, reference)?;
    let root = checkout.path();
    options.search_paths = match subdirectory {
        Some(subdirectory) => vec![root.join(subdirectory)],
        None => {
            let mut rebased: Vec<PathBuf> = options
                .search_paths
                .iter()
                .filter(|path| path.is_relative())
                .map(|path| root.join(path))
                .collect();
            rebased.push(root.to_path_buf());
            rebased
        }
    };
    let mut loader = Loader::new(options);
    let module = loader.load(package)?;
    Ok((loader.into_collection(), module))
}
