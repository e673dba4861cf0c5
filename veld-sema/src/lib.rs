#![forbid(unsafe_code)]

//! Semantic analysis for Veld.
//!
//! Resolution builds the [`SymbolTable`]; four checkers then walk every
//! body independently and only ever add diagnostics. A program is accepted
//! when none of them reports anything.

mod body;
pub mod cfg;
mod diagnostics;
mod driver;
mod error_channel;
mod lifecycle;
mod mutability;
mod resolve;
mod symbols;
mod typeck;
mod types;

pub use diagnostics::{normalize, CapabilityMismatch, Diagnostic, DiagnosticKind, Related};
pub use driver::{analyze, Analysis, AnalysisOptions};
pub use lifecycle::{init_order, InitOrder};
pub use symbols::{
    DefaultCtor, DestructorInfo, DestructorPolicy, ParamInfo, PropertyInfo, Signature, StructInfo,
    SymbolTable, TypeDef, TypeKind,
};
pub use types::{Type, TypeId};

use veld_ast::Program;

/// Builds the symbol table, reporting structural problems.
pub fn resolve_types(program: &Program) -> (SymbolTable, Vec<Diagnostic>) {
    let (table, mut diags) = resolve::resolve(program);
    normalize(&mut diags);
    (table, diags)
}

/// Expression typing, assignability, conversions and match exhaustiveness.
pub fn check_types(program: &Program, table: &SymbolTable) -> Vec<Diagnostic> {
    finish(typeck::check(program, table, true))
}

/// Capability rules on bindings, access paths, receivers and arguments.
pub fn check_mutability(program: &Program, table: &SymbolTable) -> Vec<Diagnostic> {
    finish(mutability::check(program, table, true))
}

/// Forced handling of raising calls.
pub fn check_errors(program: &Program, table: &SymbolTable) -> Vec<Diagnostic> {
    finish(error_channel::check(program, table, true))
}

/// Constructor initialization and destructor obligations.
pub fn check_lifecycle(program: &Program, table: &SymbolTable) -> Vec<Diagnostic> {
    finish(lifecycle::check(program, table, true))
}

fn finish(mut diags: Vec<Diagnostic>) -> Vec<Diagnostic> {
    normalize(&mut diags);
    diags
}
