#![forbid(unsafe_code)]

//! Forced handling of the out-of-band error channel.
//!
//! Every call whose callee declares an error type must sit directly under
//! exactly one `!` (re-raise) or `catch`. Re-raising needs a compatible
//! channel on the enclosing body.

use tracing::debug;
use veld_ast::{ArmPattern, Block, Capability, Decl, Expr, ExprKind, Program, Span, Stmt};

use crate::body::{bodies, check_each, BodyRef};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::resolve::type_of_decl;
use crate::symbols::SymbolTable;
use crate::typeck::{Callee, Scopes, Typer};
use crate::types::Type;

pub(crate) fn check(program: &Program, table: &SymbolTable, parallel: bool) -> Vec<Diagnostic> {
    let bodies = bodies(program, table);
    let mut diags = check_each(&bodies, parallel, |b| check_body(table, b));
    diags.extend(check_property_defaults(program, table));
    diags
}

fn check_body(table: &SymbolTable, body: &BodyRef<'_>) -> Vec<Diagnostic> {
    debug!(body = %body.name, "checking error channel");
    let mut checker = ChannelChecker {
        typer: Typer::new(table, body.module),
        scopes: Scopes::for_signature(body.sig),
        owner: body.name.clone(),
        channel: body.sig.error,
        diags: Vec::new(),
    };
    checker.block(body.body);
    checker.diags
}

/// Defaults run outside any body, so they have no channel to re-raise into.
fn check_property_defaults(program: &Program, table: &SymbolTable) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (module, decl) in program.decls() {
        let Decl::Struct(s) = decl else {
            continue;
        };
        let valid = type_of_decl(table, &s.name.node, s.span).is_some_and(|id| table.def(id).valid);
        if !valid {
            continue;
        }
        for p in &s.properties {
            let Some(default) = &p.default else {
                continue;
            };
            let mut checker = ChannelChecker {
                typer: Typer::new(table, module),
                scopes: Scopes::default(),
                owner: format!("default of `{}.{}`", s.name.node, p.name.node),
                channel: None,
                diags: Vec::new(),
            };
            checker.expr(default, false);
            diags.append(&mut checker.diags);
        }
    }
    diags
}

struct ChannelChecker<'t> {
    typer: Typer<'t>,
    scopes: Scopes,
    /// Name used in messages.
    owner: String,
    channel: Option<Type>,
    diags: Vec<Diagnostic>,
}

impl<'t> ChannelChecker<'t> {
    fn report(&mut self, kind: DiagnosticKind, span: Span, message: String) {
        self.diags.push(Diagnostic::new(kind, span, message));
    }

    fn block(&mut self, block: &Block) {
        self.scopes.push();
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let(s) => {
                self.expr(&s.init, false);
                let ty = match &s.ty {
                    Some(r) => self.typer.lookup_ref(r),
                    None => self.typer.type_of(&self.scopes, &s.init),
                };
                self.scopes
                    .declare(&s.name.node, ty, s.capability, s.name.span);
            }
            Stmt::Assign(s) => {
                self.expr(&s.value, false);
                self.expr(&s.target, false);
            }
            Stmt::Expr(e) => self.expr(e, false),
            Stmt::If(s) => {
                self.expr(&s.cond, false);
                self.block(&s.then_block);
                if let Some(b) = &s.else_block {
                    self.block(b);
                }
            }
            Stmt::While(s) => {
                self.expr(&s.cond, false);
                self.block(&s.body);
            }
            Stmt::Match(m) => {
                self.expr(&m.scrutinee, false);
                for arm in &m.arms {
                    self.scopes.push();
                    if let ArmPattern::Variant {
                        ty,
                        binder: Some(b),
                    } = &arm.pattern
                    {
                        let vt = self.typer.lookup_ref(ty);
                        self.scopes.declare(&b.node, vt, Capability::Immutable, b.span);
                    }
                    self.block(&arm.body);
                    self.scopes.pop();
                }
            }
            Stmt::Return(s) => {
                if let Some(v) = &s.value {
                    self.expr(v, false);
                }
            }
            Stmt::Raise(s) => {
                self.expr(&s.value, false);
                if self.channel.is_none() {
                    let msg = format!(
                        "`raise` in `{}`, which declares no error channel",
                        self.owner
                    );
                    self.report(DiagnosticKind::UnhandledErrorPropagation, s.span, msg);
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Block(b) => self.block(b),
        }
    }

    /// `handled` is set when `e` is the direct operand of `!` or `catch`.
    fn expr(&mut self, e: &Expr, handled: bool) {
        match &e.kind {
            ExprKind::Reraise { call } => {
                if let Some(callee) = self.operand(e, call, "!") {
                    self.reraise(e.span, callee);
                }
                self.expr(call, true);
            }
            ExprKind::Catch { call, fallback } => {
                if let Some(callee) = self.operand(e, call, "catch") {
                    if let (Some(ret), None) = (callee.ret(), fallback) {
                        let table = self.typer.table;
                        let msg = format!(
                            "catching `{}` needs a fallback value of type `{}`",
                            callee.display(table),
                            table.display(ret)
                        );
                        self.report(DiagnosticKind::UnhandledError, e.span, msg);
                    }
                }
                self.expr(call, true);
                if let Some(fb) = fallback {
                    self.expr(fb, false);
                }
            }
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => {
                if !handled {
                    if let Some(callee) = self.typer.callee(&self.scopes, e) {
                        if let Some(err) = callee.error() {
                            let table = self.typer.table;
                            let msg = format!(
                                "`{}` can raise `{}`; handle it with `!` or `catch`",
                                callee.display(table),
                                table.display(err)
                            );
                            self.report(DiagnosticKind::UnhandledError, e.span, msg);
                        }
                    }
                }
                for child in e.children() {
                    self.expr(child, false);
                }
            }
            _ => {
                for child in e.children() {
                    self.expr(child, false);
                }
            }
        }
    }

    /// Validates the operand of an error operator and returns its callee
    /// when the operand is a call to something that can raise.
    fn operand(&mut self, op: &Expr, call: &Expr, symbol: &str) -> Option<Callee<'t>> {
        if !call.is_call() {
            self.report(
                DiagnosticKind::InvalidErrorOperator,
                op.span,
                format!("`{symbol}` must be applied directly to a call"),
            );
            return None;
        }
        // Unresolved callees were already reported by the type checker.
        let callee = self.typer.callee(&self.scopes, call)?;
        if callee.error().is_none() {
            let msg = format!(
                "`{}` declares no error type, so `{symbol}` has nothing to handle",
                callee.display(self.typer.table)
            );
            self.report(DiagnosticKind::InvalidErrorOperator, op.span, msg);
            return None;
        }
        Some(callee)
    }

    fn reraise(&mut self, span: Span, callee: Callee<'_>) {
        let table = self.typer.table;
        let Some(err) = callee.error() else {
            return;
        };
        match self.channel {
            None => {
                let msg = format!(
                    "re-raising `{}` from `{}`, which declares no error channel",
                    callee.display(table),
                    self.owner
                );
                self.diags.push(
                    Diagnostic::new(DiagnosticKind::UnhandledErrorPropagation, span, msg)
                        .with_help(format!(
                            "declare `{}` as the error type of `{}`, or use `catch`",
                            table.display(err),
                            self.owner
                        )),
                );
            }
            Some(channel) if !table.is_assignable(err, channel) => {
                let msg = format!(
                    "`{}` raises `{}`, but `{}` can only raise `{}`",
                    callee.display(table),
                    table.display(err),
                    self.owner,
                    table.display(channel)
                );
                self.report(DiagnosticKind::UnhandledErrorPropagation, span, msg);
            }
            Some(_) => {}
        }
    }
}
