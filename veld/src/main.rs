#![forbid(unsafe_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{ArgAction, Parser, Subcommand};
use miette::{Diagnostic, IntoDiagnostic, NamedSource};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use veld_ast::Program;
use veld_sema::{Analysis, AnalysisOptions, Diagnostic as SemanticDiagnostic};

mod manifest;
mod report;

#[derive(Parser, Debug)]
#[command(name = "veld", version, about = "Veld semantic analyzer")]
struct Cli {
    /// Raise log verbosity (repeatable). `VELD_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Analyze a program given as a JSON syntax tree
    Check {
        /// Path to the JSON syntax tree
        path: PathBuf,

        /// Source text the spans point into; enables code snippets
        #[arg(long)]
        source: Option<PathBuf>,

        /// Write a machine-readable JSON report here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Worker threads for the per-body checkers. Overrides `veld.toml`.
        #[arg(long)]
        jobs: Option<usize>,

        /// Check bodies one at a time
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Stop printing after this many diagnostics. Overrides `veld.toml`.
        #[arg(long = "max-diagnostics")]
        max_diagnostics: Option<usize>,
    },

    /// Print the resolved symbol table as JSON
    Symbols {
        /// Path to the JSON syntax tree
        path: PathBuf,
    },
}

#[derive(Debug, Error, Diagnostic)]
#[error("cannot load {path}: {message}")]
#[diagnostic(code(veld::input))]
struct InputError {
    path: String,
    message: String,
}

#[derive(Debug, Error, Diagnostic)]
#[error("{input}: {count} semantic error(s)")]
#[diagnostic(code(veld::rejected))]
struct Rejected {
    input: String,
    count: usize,
}

#[derive(Debug, Error, Diagnostic)]
#[error("`--jobs` must be at least 1")]
#[diagnostic(code(veld::usage))]
struct ZeroJobs;

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Cmd::Check {
            path,
            source,
            report,
            jobs,
            sequential,
            max_diagnostics,
        } => {
            if jobs == Some(0) {
                return Err(ZeroJobs.into());
            }
            let resolved = manifest::load_resolved_manifest(&path)?;
            if let Some(m) = &resolved.manifest_path {
                debug!(
                    manifest = %m.display(),
                    root = %resolved.project_root.display(),
                    project = ?resolved.name,
                    "using manifest"
                );
            }
            let options = analysis_options(&resolved, jobs, sequential, max_diagnostics);
            check(&path, source.as_deref(), report.as_deref(), &options)
        }
        Cmd::Symbols { path } => symbols(&path),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("VELD_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    // A second initialization (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// CLI flags win over `[analysis]`; `--sequential` always wins.
fn analysis_options(
    resolved: &manifest::ResolvedManifest,
    jobs: Option<usize>,
    sequential: bool,
    max_diagnostics: Option<usize>,
) -> AnalysisOptions {
    let settings = &resolved.analysis;
    AnalysisOptions {
        parallel: !sequential && settings.parallel.unwrap_or(true),
        jobs: jobs.or(settings.jobs),
        max_diagnostics: max_diagnostics.or(settings.max_diagnostics),
    }
}

fn load_program(path: &Path) -> Result<Program, InputError> {
    let display = report::display_path(path);
    let raw = fs::read_to_string(path).map_err(|e| InputError {
        path: display.clone(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| InputError {
        path: display,
        message: format!("not a valid syntax tree: {e}"),
    })
}

fn check(
    path: &Path,
    source: Option<&Path>,
    report_path: Option<&Path>,
    options: &AnalysisOptions,
) -> miette::Result<()> {
    let program = load_program(path)?;
    info!(
        input = %path.display(),
        modules = program.modules.len(),
        parallel = options.parallel,
        "checking"
    );

    let analysis = veld_sema::analyze(&program, options);

    if let Some(out) = report_path {
        report::write_report(out, &report::build_report(path, &analysis))?;
        info!(report = %out.display(), "wrote report");
    }

    let source = match source {
        Some(p) => {
            let text = fs::read_to_string(p).into_diagnostic()?;
            let len = text.len();
            Some((NamedSource::new(report::display_path(p), text), len))
        }
        None => None,
    };
    print_diagnostics(&analysis, source.as_ref());

    if analysis.is_accepted() {
        println!("ok: {}", report::display_path(path));
        Ok(())
    } else {
        Err(Rejected {
            input: report::display_path(path),
            count: analysis.diagnostics.len() + analysis.truncated,
        }
        .into())
    }
}

fn print_diagnostics(analysis: &Analysis, source: Option<&(NamedSource<String>, usize)>) {
    for d in &analysis.diagnostics {
        let report = miette::Report::new(d.clone());
        let report = match source {
            Some((src, len)) if spans_within(d, *len) => report.with_source_code(src.clone()),
            _ => report,
        };
        eprintln!("{report:?}");
    }
    if analysis.truncated > 0 {
        eprintln!("... {} more diagnostic(s) not shown", analysis.truncated);
    }
}

/// Snippets are only rendered when every label lies inside the source text.
fn spans_within(d: &SemanticDiagnostic, len: usize) -> bool {
    std::iter::once(d.span)
        .chain(d.related.iter().map(|r| r.span))
        .all(|s| s.end() <= len)
}

fn symbols(path: &Path) -> miette::Result<()> {
    let program = load_program(path)?;
    let (table, diags) = veld_sema::resolve_types(&program);
    let json = serde_json::to_string_pretty(&table).into_diagnostic()?;
    println!("{json}");

    for d in &diags {
        eprintln!("{:?}", miette::Report::new(d.clone()));
    }
    if diags.is_empty() {
        Ok(())
    } else {
        Err(Rejected {
            input: report::display_path(path),
            count: diags.len(),
        }
        .into())
    }
}
