#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, debug_span, warn};
use veld_ast::Program;

use crate::diagnostics::{normalize, Diagnostic};
use crate::lifecycle::{self, InitOrder};
use crate::symbols::{DestructorPolicy, SymbolTable};
use crate::{error_channel, mutability, resolve, typeck};

/// Knobs for a full analysis run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Check independent bodies on the rayon pool.
    pub parallel: bool,
    /// Size of a dedicated pool; `None` uses the global one.
    pub jobs: Option<usize>,
    /// Keep at most this many diagnostics after normalization.
    pub max_diagnostics: Option<usize>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: None,
            max_diagnostics: None,
        }
    }
}

/// Everything the analyzer learned about a program.
#[derive(Clone, Debug, Serialize)]
pub struct Analysis {
    pub table: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
    pub init_orders: Vec<InitOrder>,
    pub destructor_policies: BTreeMap<String, DestructorPolicy>,
    /// Diagnostics dropped by `max_diagnostics`.
    pub truncated: usize,
}

impl Analysis {
    /// No diagnostics at all: every diagnostic is an error.
    pub fn is_accepted(&self) -> bool {
        self.diagnostics.is_empty() && self.truncated == 0
    }
}

/// Resolves the program, then runs every checker over it.
pub fn analyze(program: &Program, options: &AnalysisOptions) -> Analysis {
    let jobs = if options.parallel { options.jobs } else { None };
    match jobs {
        Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(|| analyze_with(program, options, true)),
            Err(err) => {
                warn!(%err, jobs = n, "could not build thread pool; checking sequentially");
                analyze_with(program, options, false)
            }
        },
        None => analyze_with(program, options, options.parallel),
    }
}

fn analyze_with(program: &Program, options: &AnalysisOptions, parallel: bool) -> Analysis {
    let span = debug_span!("analyze", modules = program.modules.len(), parallel);
    let _enter = span.enter();

    let (table, mut diagnostics) = resolve::resolve(program);
    diagnostics.extend(typeck::check(program, &table, parallel));
    diagnostics.extend(mutability::check(program, &table, parallel));
    diagnostics.extend(error_channel::check(program, &table, parallel));
    diagnostics.extend(lifecycle::check(program, &table, parallel));
    normalize(&mut diagnostics);

    let mut truncated = 0;
    if let Some(max) = options.max_diagnostics {
        if diagnostics.len() > max {
            truncated = diagnostics.len() - max;
            diagnostics.truncate(max);
        }
    }

    let (init_orders, destructor_policies) = lifecycle::decorations(program, &table);
    debug!(
        types = table.types.len(),
        functions = table.functions.len(),
        diagnostics = diagnostics.len(),
        truncated,
        "analysis finished"
    );
    Analysis {
        table,
        diagnostics,
        init_orders,
        destructor_policies,
        truncated,
    }
}
