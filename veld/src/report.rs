#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use miette::IntoDiagnostic;
use serde::Serialize;
use veld_ast::Span;
use veld_sema::{Analysis, CapabilityMismatch, DestructorPolicy, InitOrder};

pub const SCHEMA: &str = "veld.check.v1";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpanRange {
    pub offset: usize,
    pub len: usize,
}

impl From<Span> for SpanRange {
    fn from(s: Span) -> Self {
        Self {
            offset: s.offset,
            len: s.len,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport<'a> {
    pub schema: &'static str,
    pub input: String,
    pub ok: bool,
    pub diagnostics: Vec<DiagnosticEntry<'a>>,
    pub truncated: usize,
    pub init_orders: &'a [InitOrder],
    pub destructor_policies: &'a BTreeMap<String, DestructorPolicy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry<'a> {
    pub kind: &'static str,
    pub code: String,
    pub message: &'a str,
    pub span: SpanRange,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<SpanRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<&'a CapabilityMismatch>,
}

pub fn build_report<'a>(input: &Path, analysis: &'a Analysis) -> CheckReport<'a> {
    CheckReport {
        schema: SCHEMA,
        input: display_path(input),
        ok: analysis.is_accepted(),
        diagnostics: analysis
            .diagnostics
            .iter()
            .map(|d| DiagnosticEntry {
                kind: d.kind.name(),
                code: format!("veld::{}", d.kind.code()),
                message: &d.message,
                span: d.span.into(),
                related: d.related.iter().map(|r| r.span.into()).collect(),
                capability: d.capability.as_ref(),
            })
            .collect(),
        truncated: analysis.truncated,
        init_orders: &analysis.init_orders,
        destructor_policies: &analysis.destructor_policies,
    }
}

pub fn write_report(path: &Path, report: &CheckReport<'_>) -> miette::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    let json = serde_json::to_string_pretty(report).into_diagnostic()?;
    fs::write(path, json).into_diagnostic()?;
    Ok(())
}

/// Stable, mostly relative path text for reports and messages.
pub fn display_path(path: &Path) -> String {
    let p = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let s = p.to_string_lossy().replace('\\', "/");

    if let Ok(cwd) = std::env::current_dir() {
        let prefix = format!("{}/", cwd.to_string_lossy().replace('\\', "/"));
        if let Some(rest) = s.strip_prefix(&prefix) {
            return rest.to_string();
        }
    }
    s
}
