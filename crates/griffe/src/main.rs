//! Binary entry point for the griffe CLI.
//!
//! Two subcommands: `dump` serializes loaded package trees as JSON, `check`
//! loads two versions of a package and reports API breaking changes.
//!
//! ```bash
//! # Dump a package as JSON
//! griffe dump mypkg --search src --output api.json
//!
//! # Check the current tree against a released tag
//! griffe check mypkg --against v1.0.0 --search src --style markdown
//! ```
//!
//! Exit codes: 0 success, 1 breakages or failure, 2 usage error.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

use griffe_core::diff::{find_breaking_changes, ExplanationStyle};
use griffe_core::docstring::DocstringStyle;
use griffe_core::git::load_git;
use griffe_core::json::collection_to_json;
use griffe_core::loader::{LoadOptions, Loader};

// ============================================================================
// CLI structure
// ============================================================================

/// Extract and compare Python API surfaces without importing the code.
#[derive(Parser)]
#[command(name = "griffe", version, about = "Python API surface extraction and breakage checks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load packages and serialize their object trees as JSON.
    Dump {
        /// Packages to load.
        #[arg(required = true)]
        packages: Vec<String>,
        /// Write JSON to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Include derived fields (paths, visibility, file locations).
        #[arg(long)]
        full: bool,
        /// Parse docstrings with this style and include the sections.
        #[arg(long, value_enum)]
        docstyle: Option<Docstyle>,
        /// Resolve aliases to their targets before dumping.
        #[arg(long)]
        resolve_aliases: bool,
        /// Load external packages to resolve aliases pointing outside.
        #[arg(long)]
        resolve_external: bool,
        /// Add a directory to the search path (repeatable).
        #[arg(long = "search")]
        search: Vec<PathBuf>,
        /// Print loading statistics to stderr.
        #[arg(long)]
        stats: bool,
    },
    /// Load two versions of a package and report breaking changes.
    Check {
        /// Package to check.
        package: String,
        /// Git reference of the old version.
        #[arg(long)]
        against: String,
        /// Search directory inside the old checkout.
        #[arg(long)]
        against_path: Option<PathBuf>,
        /// Git reference of the new version (default: working tree).
        #[arg(long)]
        base_ref: Option<String>,
        /// Add a directory to the search path (repeatable).
        #[arg(long = "search")]
        search: Vec<PathBuf>,
        /// How to render breakages.
        #[arg(long, value_enum, default_value = "oneline")]
        style: Style,
        /// Shorthand for --style verbose.
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Docstyle {
    Google,
    Numpy,
    Sphinx,
    Auto,
}

impl From<Docstyle> for DocstringStyle {
    fn from(style: Docstyle) -> Self {
        match style {
            Docstyle::Google => DocstringStyle::Google,
            Docstyle::Numpy => DocstringStyle::Numpy,
            Docstyle::Sphinx => DocstringStyle::Sphinx,
            Docstyle::Auto => DocstringStyle::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Style {
    Oneline,
    Verbose,
    Markdown,
    Github,
}

impl From<Style> for ExplanationStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Oneline => ExplanationStyle::OneLine,
            Style::Verbose => ExplanationStyle::Verbose,
            Style::Markdown => ExplanationStyle::Markdown,
            Style::Github => ExplanationStyle::Github,
        }
    }
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::from(1);
    };
    match execute(command) {
        Ok(found_breakages) => {
            if found_breakages {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

/// Initialize the tracing subscriber from `GRIFFE_LOG_LEVEL`.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let level = match env::var("GRIFFE_LOG_LEVEL")
        .unwrap_or_default()
        .to_uppercase()
        .as_str()
    {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "SUCCESS" | "INFO" | "" => "info",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        other => {
            eprintln!("unknown GRIFFE_LOG_LEVEL {other:?}, using INFO");
            "info"
        }
    };
    let filter = EnvFilter::try_from_env("GRIFFE_LOG_FILTER")
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn execute(command: Command) -> Result<bool, griffe_core::GriffeError> {
    match command {
        Command::Dump {
            packages,
            output,
            full,
            docstyle,
            resolve_aliases,
            resolve_external,
            search,
            stats,
        } => {
            execute_dump(
                &packages,
                output.as_deref(),
                full,
                docstyle.map(Into::into),
                resolve_aliases,
                resolve_external,
                search,
                stats,
            )?;
            Ok(false)
        }
        Command::Check {
            package,
            against,
            against_path,
            base_ref,
            search,
            style,
            verbose,
        } => execute_check(
            &package,
            &against,
            against_path.as_deref(),
            base_ref.as_deref(),
            search,
            if verbose {
                ExplanationStyle::Verbose
            } else {
                style.into()
            },
        ),
    }
}

// ============================================================================
// Command executors
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn execute_dump(
    packages: &[String],
    output: Option<&Path>,
    full: bool,
    docstyle: Option<DocstringStyle>,
    resolve_aliases: bool,
    resolve_external: bool,
    search: Vec<PathBuf>,
    stats: bool,
) -> Result<(), griffe_core::GriffeError> {
    let mut options = LoadOptions::new(search);
    options.resolve_aliases = resolve_aliases;
    options.resolve_external = resolve_external;
    options.docstring_style = docstyle;
    let mut loader = Loader::new(options);
    for package in packages {
        loader.load(package)?;
    }
    if stats {
        let loaded = loader.stats();
        eprintln!(
            "modules: {}, stub merges: {}, aliases resolved: {}, unresolved: {}, external loads: {}, lines: {}, elapsed: {:?}",
            loaded.modules_visited,
            loaded.stub_merges,
            loaded.aliases_resolved,
            loaded.aliases_unresolved,
            loaded.external_loads,
            loader.lines().total_lines(),
            loaded.elapsed,
        );
    }
    let value = collection_to_json(loader.collection(), full, docstyle);
    let rendered =
        serde_json::to_string_pretty(&value).expect("serializing a JSON value cannot fail");
    match output {
        Some(path) => fs::write(path, rendered)?,
        None => {
            let mut stdout = io::stdout();
            let _ = writeln!(stdout, "{rendered}");
        }
    }
    Ok(())
}

fn execute_check(
    package: &str,
    against: &str,
    against_path: Option<&Path>,
    base_ref: Option<&str>,
    search: Vec<PathBuf>,
    style: ExplanationStyle,
) -> Result<bool, griffe_core::GriffeError> {
    let repo = PathBuf::from(".");
    let options = LoadOptions::new(search);

    let (old_collection, old_root) =
        load_git(package, against, &repo, options.clone(), against_path)?;
    let (new_collection, new_root) = match base_ref {
        Some(reference) => load_git(package, reference, &repo, options, against_path)?,
        None => {
            let mut loader = Loader::new(options);
            let root = loader.load(package)?;
            (loader.into_collection(), root)
        }
    };

    let breakages = find_breaking_changes(&old_collection, old_root, &new_collection, new_root);
    for breakage in &breakages {
        println!("{}", breakage.explain(style));
    }
    Ok(!breakages.is_empty())
}
