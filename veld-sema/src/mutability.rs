#![forbid(unsafe_code)]

//! Capability lattice enforcement.
//!
//! A capability belongs to an access path, not to a type: `a.b.c` grants the
//! minimum of `a`'s binding capability and the declared capabilities of `b`
//! and `c`. So an immutable root freezes everything reachable from it.

use tracing::debug;
use veld_ast::{ArmPattern, Block, Capability, Expr, ExprKind, Ident, Program, Span, Stmt, SELF};

use crate::body::{bodies, check_each, BodyRef};
use crate::diagnostics::Diagnostic;
use crate::symbols::SymbolTable;
use crate::typeck::{Callee, Local, Scopes, Typer};
use crate::types::Type;

pub(crate) fn check(program: &Program, table: &SymbolTable, parallel: bool) -> Vec<Diagnostic> {
    let bodies = bodies(program, table);
    check_each(&bodies, parallel, |b| check_body(table, b))
}

fn check_body(table: &SymbolTable, body: &BodyRef<'_>) -> Vec<Diagnostic> {
    debug!(body = %body.name, "checking capabilities");
    let mut checker = MutabilityChecker {
        typer: Typer::new(table, body.module),
        scopes: Scopes::for_signature(body.sig),
        constructor: body.is_constructor(),
        diags: Vec::new(),
    };
    checker.block(body.body);
    checker.diags
}

fn display_path(root: &str, path: &[&Ident]) -> String {
    let mut out = root.to_string();
    for seg in path {
        out.push('.');
        out.push_str(&seg.node);
    }
    out
}

struct MutabilityChecker<'t> {
    typer: Typer<'t>,
    scopes: Scopes,
    constructor: bool,
    diags: Vec<Diagnostic>,
}

impl MutabilityChecker<'_> {
    fn violation(
        &mut self,
        path: String,
        required: Capability,
        granted: Capability,
        span: Span,
        message: String,
    ) {
        self.diags
            .push(Diagnostic::capability(path, required, granted, span, message));
    }

    /// Capability and type at the end of `path`, starting from `root`.
    /// `None` when a segment does not resolve (already reported elsewhere).
    fn path_capability(&self, root: &Local, path: &[&Ident]) -> Option<(Capability, Type)> {
        let mut cap = root.capability;
        let mut ty = root.ty;
        for seg in path {
            let (_, p) = self.typer.table.property(ty, &seg.node)?;
            cap = cap.min(p.capability);
            ty = p.ty;
        }
        Some((cap, ty))
    }

    /// Access path text and granted capability of a place expression.
    /// Temporaries are not places and return `None`.
    fn place_capability(&self, e: &Expr) -> Option<(String, Capability)> {
        let place = e.as_place()?;
        let root = self.scopes.lookup(&place.root.node)?;
        let (cap, _) = self.path_capability(root, &place.path)?;
        Some((place.display(), cap))
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
                self.expr(&s.init);
                let ty = match &s.ty {
                    Some(r) => self.typer.lookup_ref(r),
                    None => self.typer.type_of(&self.scopes, &s.init),
                };
                self.scopes
                    .declare(&s.name.node, ty, s.capability, s.name.span);
            }
            Stmt::Assign(s) => {
                self.expr(&s.value);
                if let ExprKind::Member { base, .. } = &s.target.kind {
                    self.expr(base);
                }
                self.assign(&s.target);
            }
            Stmt::Expr(e) => self.expr(e),
            Stmt::If(s) => {
                self.expr(&s.cond);
                self.block(&s.then_block);
                if let Some(b) = &s.else_block {
                    self.block(b);
                }
            }
            Stmt::While(s) => {
                self.expr(&s.cond);
                self.block(&s.body);
            }
            Stmt::Match(m) => {
                self.expr(&m.scrutinee);
                let granted = self
                    .place_capability(&m.scrutinee)
                    .map_or(Capability::Mutable, |(_, cap)| cap);
                let binder_cap = granted.min(Capability::Varying);
                for arm in &m.arms {
                    self.scopes.push();
                    if let ArmPattern::Variant {
                        ty,
                        binder: Some(b),
                    } = &arm.pattern
                    {
                        let vt = self.typer.lookup_ref(ty);
                        self.scopes.declare(&b.node, vt, binder_cap, b.span);
                    }
                    self.block(&arm.body);
                    self.scopes.pop();
                }
            }
            Stmt::Return(s) => {
                if let Some(v) = &s.value {
                    self.expr(v);
                }
            }
            Stmt::Raise(s) => self.expr(&s.value),
            Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Block(b) => self.block(b),
        }
    }

    fn assign(&mut self, target: &Expr) {
        let table = self.typer.table;
        let Some(place) = target.as_place() else {
            return;
        };
        let Some(root) = self.scopes.lookup(&place.root.node).cloned() else {
            return;
        };
        let Some((last, prefix)) = place.path.split_last() else {
            if root.capability < Capability::Mutable {
                self.violation(
                    root.name.clone(),
                    Capability::Mutable,
                    root.capability,
                    target.span,
                    format!(
                        "cannot assign to `{}`: the binding is {}",
                        root.name, root.capability
                    ),
                );
            }
            return;
        };
        // Direct `self.p = v` inside a constructor initializes `p`.
        if self.constructor && root.name == SELF && prefix.is_empty() {
            return;
        }
        let Some((granted, owner_ty)) = self.path_capability(&root, prefix) else {
            return;
        };
        let full = place.display();
        if granted < Capability::Varying {
            let through = display_path(&root.name, prefix);
            self.violation(
                through.clone(),
                Capability::Varying,
                granted,
                target.span,
                format!("cannot mutate `{full}`: `{through}` is {granted}"),
            );
            return;
        }
        let Some((_, prop)) = table.property(owner_ty, &last.node) else {
            return;
        };
        if prop.capability < Capability::Mutable {
            self.violation(
                full.clone(),
                Capability::Mutable,
                prop.capability,
                target.span,
                format!(
                    "cannot re-assign `{full}`: property `{}` is declared {}",
                    prop.name, prop.capability
                ),
            );
        }
    }

    fn expr(&mut self, e: &Expr) {
        for child in e.children() {
            self.expr(child);
        }
        match &e.kind {
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                let Some(callee) = self.typer.callee(&self.scopes, e) else {
                    return;
                };
                let required = match callee {
                    Callee::Destructor { .. } => Capability::Mutable,
                    _ => callee
                        .signature()
                        .and_then(|s| s.receiver())
                        .map_or(Capability::Immutable, |r| r.capability),
                };
                if let Some((path, granted)) = self.place_capability(receiver) {
                    if granted < required {
                        self.violation(
                            path.clone(),
                            required,
                            granted,
                            method.span,
                            format!(
                                "calling `{}` needs a {required} receiver, but `{path}` is {granted}",
                                callee.display(self.typer.table)
                            ),
                        );
                    }
                }
                self.args(callee, args);
            }
            ExprKind::Call { args, .. } => {
                if let Some(callee) = self.typer.callee(&self.scopes, e) {
                    self.args(callee, args);
                }
            }
            _ => {}
        }
    }

    /// Struct-typed places passed to varying or mutable parameters must
    /// grant at least that much. Primitives are copied and temporaries are
    /// exclusively owned, so neither is restricted.
    fn args(&mut self, callee: Callee<'_>, args: &[Expr]) {
        let table = self.typer.table;
        for (param, arg) in callee.explicit_params().iter().zip(args) {
            if param.capability == Capability::Immutable {
                continue;
            }
            let arg_ty = self.typer.type_of(&self.scopes, arg);
            if table.struct_info(arg_ty).is_none() {
                continue;
            }
            let Some((path, granted)) = self.place_capability(arg) else {
                continue;
            };
            if granted < param.capability {
                self.violation(
                    path.clone(),
                    param.capability,
                    granted,
                    arg.span,
                    format!(
                        "`{path}` is {granted}, but parameter `{}` of `{}` is {}",
                        param.name,
                        callee.display(table),
                        param.capability
                    ),
                );
            }
        }
    }
}
