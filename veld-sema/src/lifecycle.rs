#![forbid(unsafe_code)]

//! Object lifecycle: constructor initialization and destructor obligations.
//!
//! Both flow-sensitive checks lower bodies onto the shared [`cfg`](crate::cfg)
//! builder and run a forward dataflow to a fixed point.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use veld_ast::{
    ArmPattern, AssignStmt, Block, Capability, Decl, Expr, ExprKind, LetStmt, MatchArm, Program,
    Span, Stmt, SELF,
};

use crate::body::{bodies, check_each, BodyKind, BodyRef};
use crate::cfg::{lower_body, run, Dataflow, Emit, ExitKind, Lowering};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::resolve::type_of_decl;
use crate::symbols::{DefaultCtor, DestructorPolicy, ParamInfo, PropertyInfo, SymbolTable, TypeKind};
use crate::typeck::{Callee, Scopes, Typer};
use crate::types::{Type, TypeId};

/// Order in which a constructor leaves properties initialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InitOrder {
    #[serde(rename = "type")]
    pub ty: String,
    /// Index of the explicit constructor, `None` for the synthesized one.
    pub ctor: Option<usize>,
    pub span: Span,
    pub order: Vec<String>,
}

pub(crate) fn check(program: &Program, table: &SymbolTable, parallel: bool) -> Vec<Diagnostic> {
    let mut diags = check_default_destructors(program, table);
    let bodies = bodies(program, table);
    diags.extend(check_each(&bodies, parallel, |b| check_body(table, b)));
    diags
}

fn check_body(table: &SymbolTable, body: &BodyRef<'_>) -> Vec<Diagnostic> {
    debug!(body = %body.name, "checking lifecycle");
    let mut diags = check_obligations(table, body);
    if let (BodyKind::Constructor(_), Some(owner)) = (body.kind, body.owner) {
        diags.extend(check_constructor(table, owner, body));
    }
    diags
}

fn check_default_destructors(program: &Program, table: &SymbolTable) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (_, decl) in program.decls() {
        let Decl::Struct(s) = decl else {
            continue;
        };
        if type_of_decl(table, &s.name.node, s.span).is_none() {
            continue;
        }
        let mut defaults = s.dtors.iter().filter(|d| d.name.is_none());
        let Some(first) = defaults.next() else {
            continue;
        };
        for extra in defaults {
            diags.push(
                Diagnostic::new(
                    DiagnosticKind::MultipleDefaultDestructors,
                    extra.span,
                    format!("`{}` declares more than one default destructor", s.name.node),
                )
                .with_related(first.span, "first default destructor"),
            );
        }
    }
    diags
}

// ---------------------------------------------------------------------------
// Destructor obligations
// ---------------------------------------------------------------------------

/// A tracked binding: one that must be released explicitly.
#[derive(Clone, Debug)]
struct Slot {
    name: String,
    span: Span,
    destructors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
enum BindingEvent {
    Declare(usize),
    Use { slot: usize, span: Span },
    Destroy { slot: usize, span: Span, via: String },
    Transfer { slot: usize, span: Span },
    Rebind { slot: usize, span: Span },
    ScopeExit { slot: usize, span: Span },
}

struct BindingLowering<'t> {
    typer: Typer<'t>,
    params: &'t [ParamInfo],
    param_span: Span,
    scopes: Scopes,
    visible: Vec<Vec<(String, Option<usize>)>>,
    slots: Vec<Slot>,
}

impl BindingLowering<'_> {
    fn slot_named(&self, name: &str) -> Option<usize> {
        self.visible
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(n, _)| n == name)
            .and_then(|(_, slot)| *slot)
    }

    fn slot_of(&self, e: &Expr) -> Option<usize> {
        self.slot_named(&e.as_ident()?.node)
    }

    fn bind(&mut self, name: &str, ty: Type, capability: Capability, span: Span, tracked: bool) -> Option<usize> {
        self.scopes.declare(name, ty, capability, span);
        let table = self.typer.table;
        let slot = if tracked && table.has_destruction_obligation(ty) {
            let destructors = match table.struct_info(ty) {
                Some((id, _)) => match table.destructor_policy(id) {
                    Some(DestructorPolicy::Explicit { destructors }) => destructors,
                    _ => Vec::new(),
                },
                None => Vec::new(),
            };
            self.slots.push(Slot {
                name: name.to_string(),
                span,
                destructors,
            });
            Some(self.slots.len() - 1)
        } else {
            None
        };
        if let Some(scope) = self.visible.last_mut() {
            scope.push((name.to_string(), slot));
        }
        slot
    }

    fn visit(&mut self, e: &Expr, out: &mut Emit<BindingEvent>) {
        match &e.kind {
            ExprKind::Ident(id) => {
                if let Some(slot) = self.slot_named(&id.node) {
                    out.push(BindingEvent::Use {
                        slot,
                        span: id.span,
                    });
                }
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                let callee = self.typer.callee(&self.scopes, e);
                if let (Some(Callee::Destructor { .. }), Some(slot)) = (callee, self.slot_of(receiver)) {
                    self.visit_args(callee, args, out);
                    out.push(BindingEvent::Destroy {
                        slot,
                        span: e.span,
                        via: method.node.clone(),
                    });
                    return;
                }
                self.visit(receiver, out);
                self.visit_args(callee, args, out);
            }
            ExprKind::Call { args, .. } => {
                let callee = self.typer.callee(&self.scopes, e);
                self.visit_args(callee, args, out);
            }
            ExprKind::Reraise { call } => {
                self.visit(call, out);
                out.reraise(e.span);
            }
            _ => {
                for child in e.children() {
                    self.visit(child, out);
                }
            }
        }
    }

    /// Passing a tracked binding to a mutable parameter hands it over.
    fn visit_args(&mut self, callee: Option<Callee<'_>>, args: &[Expr], out: &mut Emit<BindingEvent>) {
        let params = callee.map(|c| c.explicit_params()).unwrap_or(&[]);
        for (i, arg) in args.iter().enumerate() {
            let owned = params
                .get(i)
                .is_some_and(|p| p.capability == Capability::Mutable);
            match (owned, self.slot_of(arg)) {
                (true, Some(slot)) => out.push(BindingEvent::Transfer {
                    slot,
                    span: arg.span,
                }),
                _ => self.visit(arg, out),
            }
        }
    }
}

impl<'a> Lowering<'a> for BindingLowering<'_> {
    type Event = BindingEvent;

    fn enter_body(&mut self, out: &mut Emit<BindingEvent>) {
        let (params, span) = (self.params, self.param_span);
        for p in params {
            let owned = p.name != SELF && p.capability == Capability::Mutable;
            if let Some(slot) = self.bind(&p.name, p.ty, p.capability, span, owned) {
                out.push(BindingEvent::Declare(slot));
            }
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push();
        self.visible.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        self.visible.pop();
    }

    fn scope_exit(&mut self, keep: usize, span: Span, out: &mut Emit<BindingEvent>) {
        for scope in self.visible[keep.min(self.visible.len())..].iter().rev() {
            for (_, slot) in scope.iter().rev() {
                if let Some(slot) = *slot {
                    out.push(BindingEvent::ScopeExit { slot, span });
                }
            }
        }
    }

    fn expr(&mut self, expr: &'a Expr, out: &mut Emit<BindingEvent>) {
        self.visit(expr, out);
    }

    fn declare(&mut self, stmt: &'a LetStmt, out: &mut Emit<BindingEvent>) {
        if let Some(src) = self.slot_of(&stmt.init) {
            out.push(BindingEvent::Transfer {
                slot: src,
                span: stmt.init.span,
            });
        }
        let ty = match &stmt.ty {
            Some(r) => self.typer.lookup_ref(r),
            None => self.typer.type_of(&self.scopes, &stmt.init),
        };
        if let Some(slot) = self.bind(&stmt.name.node, ty, stmt.capability, stmt.name.span, true) {
            out.push(BindingEvent::Declare(slot));
        }
    }

    fn assign(&mut self, stmt: &'a AssignStmt, out: &mut Emit<BindingEvent>) {
        let source = self.slot_of(&stmt.value);
        match self.slot_of(&stmt.target) {
            Some(target) => {
                if let Some(src) = source.filter(|s| *s != target) {
                    out.push(BindingEvent::Transfer {
                        slot: src,
                        span: stmt.value.span,
                    });
                }
                out.push(BindingEvent::Rebind {
                    slot: target,
                    span: stmt.span,
                });
            }
            None => {
                if let ExprKind::Member { base, .. } = &stmt.target.kind {
                    self.visit(base, out);
                }
                if let Some(src) = source {
                    out.push(BindingEvent::Transfer {
                        slot: src,
                        span: stmt.value.span,
                    });
                }
            }
        }
    }

    fn bind_arm(&mut self, _scrutinee: &'a Expr, arm: &'a MatchArm, _out: &mut Emit<BindingEvent>) {
        // Binders borrow the scrutinee; they never carry an obligation.
        if let ArmPattern::Variant {
            ty,
            binder: Some(b),
        } = &arm.pattern
        {
            let vt = self.typer.lookup_ref(ty);
            self.bind(&b.node, vt, Capability::Immutable, b.span, false);
        }
    }

    fn exit(&mut self, _kind: ExitKind, _span: Span, value: Option<&'a Expr>, out: &mut Emit<BindingEvent>) {
        let Some(value) = value else {
            return;
        };
        if let Some(slot) = self.slot_of(value) {
            out.push(BindingEvent::Transfer {
                slot,
                span: value.span,
            });
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Release {
    Destroyed,
    Transferred,
    Either,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    /// Not in scope on this path.
    Unborn,
    Active,
    Released(Release),
    MaybeReleased,
}

struct Obligations<'s> {
    slots: &'s [Slot],
}

impl Obligations<'_> {
    fn released(&self, slot: usize, status: Status, span: Span, what: &str) -> Option<Diagnostic> {
        let name = &self.slots[slot].name;
        let message = match status {
            Status::Released(Release::Destroyed) => format!("`{name}` is {what} after it was destroyed"),
            Status::Released(Release::Transferred) => format!("`{name}` is {what} after it was moved"),
            Status::Released(Release::Either) => {
                format!("`{name}` is {what} after it was destroyed or moved")
            }
            Status::MaybeReleased => {
                format!("`{name}` is {what} after it may have been destroyed or moved")
            }
            Status::Unborn | Status::Active => return None,
        };
        Some(
            Diagnostic::new(DiagnosticKind::UseAfterDestruction, span, message)
                .with_related(self.slots[slot].span, "declared here"),
        )
    }

    fn missing(&self, slot: usize, span: Span, message: String) -> Diagnostic {
        let s = &self.slots[slot];
        Diagnostic::new(DiagnosticKind::MissingDestructorInvocation, span, message)
            .with_related(s.span, "declared here")
            .with_help(format!("call one of: {}", s.destructors.join(", ")))
    }
}

impl Dataflow<BindingEvent> for Obligations<'_> {
    type State = Vec<Status>;

    fn entry_state(&self) -> Vec<Status> {
        vec![Status::Unborn; self.slots.len()]
    }

    fn join(&self, a: &Vec<Status>, b: &Vec<Status>) -> Vec<Status> {
        a.iter()
            .zip(b)
            .map(|(x, y)| match (*x, *y) {
                (x, y) if x == y => x,
                (Status::Unborn, other) | (other, Status::Unborn) => other,
                (Status::Released(_), Status::Released(_)) => Status::Released(Release::Either),
                _ => Status::MaybeReleased,
            })
            .collect()
    }

    fn transfer(&self, state: &mut Vec<Status>, event: &BindingEvent, diags: &mut Vec<Diagnostic>) {
        match event {
            BindingEvent::Declare(slot) => state[*slot] = Status::Active,
            BindingEvent::Use { slot, span } => {
                diags.extend(self.released(*slot, state[*slot], *span, "used"));
            }
            BindingEvent::Destroy { slot, span, via } => {
                diags.extend(self.released(*slot, state[*slot], *span, &format!("destroyed by `{via}`")));
                state[*slot] = Status::Released(Release::Destroyed);
            }
            BindingEvent::Transfer { slot, span } => {
                diags.extend(self.released(*slot, state[*slot], *span, "moved"));
                state[*slot] = Status::Released(Release::Transferred);
            }
            BindingEvent::Rebind { slot, span } => {
                if matches!(state[*slot], Status::Active | Status::MaybeReleased) {
                    let name = &self.slots[*slot].name;
                    diags.push(self.missing(
                        *slot,
                        *span,
                        format!("`{name}` is rebound before its current value is destroyed"),
                    ));
                }
                state[*slot] = Status::Active;
            }
            BindingEvent::ScopeExit { slot, span } => {
                let name = &self.slots[*slot].name;
                let message = match state[*slot] {
                    Status::Active => Some(format!(
                        "`{name}` goes out of scope without a destructor call"
                    )),
                    Status::MaybeReleased => Some(format!(
                        "`{name}` is not destroyed on every path before it goes out of scope"
                    )),
                    _ => None,
                };
                if let Some(message) = message {
                    diags.push(self.missing(*slot, *span, message));
                }
                state[*slot] = Status::Unborn;
            }
        }
    }
}

fn check_obligations(table: &SymbolTable, body: &BodyRef<'_>) -> Vec<Diagnostic> {
    let lowering = BindingLowering {
        typer: Typer::new(table, body.module),
        params: &body.sig.params,
        param_span: body.span,
        scopes: Scopes::default(),
        visible: Vec::new(),
        slots: Vec::new(),
    };
    let (cfg, lowering) = lower_body(lowering, body.body);
    if lowering.slots.is_empty() {
        return Vec::new();
    }
    debug!(body = %body.name, slots = lowering.slots.len(), blocks = cfg.blocks.len(), "tracking obligations");
    run(&cfg, &Obligations {
        slots: &lowering.slots,
    })
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum InitEvent {
    Read { prop: usize, span: Span },
    Write { prop: usize, span: Span },
    /// `self` escapes as a whole value (argument, receiver, return).
    WholeSelf { span: Span },
    /// Normal exit: the object must be complete.
    Complete { span: Span },
}

struct ConstructionLowering<'t> {
    properties: &'t [PropertyInfo],
}

impl ConstructionLowering<'_> {
    fn index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    fn visit(&self, e: &Expr, out: &mut Emit<InitEvent>) {
        match &e.kind {
            ExprKind::Member { base, member } if base.is_self() => {
                if let Some(prop) = self.index(&member.node) {
                    out.push(InitEvent::Read { prop, span: e.span });
                }
            }
            ExprKind::Ident(id) if id.node == SELF => {
                out.push(InitEvent::WholeSelf { span: e.span });
            }
            ExprKind::Reraise { call } => {
                self.visit(call, out);
                out.reraise(e.span);
            }
            _ => {
                for child in e.children() {
                    self.visit(child, out);
                }
            }
        }
    }
}

impl<'a> Lowering<'a> for ConstructionLowering<'_> {
    type Event = InitEvent;

    fn enter_body(&mut self, _out: &mut Emit<InitEvent>) {}
    fn push_scope(&mut self) {}
    fn pop_scope(&mut self) {}
    fn scope_exit(&mut self, _keep: usize, _span: Span, _out: &mut Emit<InitEvent>) {}

    fn expr(&mut self, expr: &'a Expr, out: &mut Emit<InitEvent>) {
        self.visit(expr, out);
    }

    fn declare(&mut self, _stmt: &'a LetStmt, _out: &mut Emit<InitEvent>) {}

    fn assign(&mut self, stmt: &'a AssignStmt, out: &mut Emit<InitEvent>) {
        if let ExprKind::Member { base, member } = &stmt.target.kind {
            if base.is_self() {
                if let Some(prop) = self.index(&member.node) {
                    out.push(InitEvent::Write {
                        prop,
                        span: stmt.target.span,
                    });
                }
            } else {
                self.visit(base, out);
            }
        }
    }

    fn bind_arm(&mut self, _scrutinee: &'a Expr, _arm: &'a MatchArm, _out: &mut Emit<InitEvent>) {}

    fn exit(&mut self, kind: ExitKind, span: Span, _value: Option<&'a Expr>, out: &mut Emit<InitEvent>) {
        if kind != ExitKind::Raise {
            out.push(InitEvent::Complete { span });
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct InitState {
    /// Assigned on every path (defaults count).
    definite: Vec<bool>,
    /// Assigned by the body on some path.
    written: Vec<bool>,
}

struct Construction<'t> {
    ty: &'t str,
    properties: &'t [PropertyInfo],
}

impl Construction<'_> {
    fn missing(&self, state: &InitState) -> Vec<&str> {
        self.properties
            .iter()
            .zip(&state.definite)
            .filter(|(_, done)| !**done)
            .map(|(p, _)| p.name.as_str())
            .collect()
    }
}

impl Dataflow<InitEvent> for Construction<'_> {
    type State = InitState;

    fn entry_state(&self) -> InitState {
        InitState {
            definite: self.properties.iter().map(|p| p.has_default).collect(),
            written: vec![false; self.properties.len()],
        }
    }

    fn join(&self, a: &InitState, b: &InitState) -> InitState {
        InitState {
            definite: a.definite.iter().zip(&b.definite).map(|(x, y)| *x && *y).collect(),
            written: a.written.iter().zip(&b.written).map(|(x, y)| *x || *y).collect(),
        }
    }

    fn transfer(&self, state: &mut InitState, event: &InitEvent, diags: &mut Vec<Diagnostic>) {
        match event {
            InitEvent::Read { prop, span } => {
                if !state.definite[*prop] {
                    let p = &self.properties[*prop];
                    let when = if state.written[*prop] {
                        "on every path"
                    } else {
                        "yet"
                    };
                    diags.push(
                        Diagnostic::new(
                            DiagnosticKind::UninitializedPropertyAccess,
                            *span,
                            format!("`self.{}` is read before it is assigned {when}", p.name),
                        )
                        .with_related(p.span, "property declared here"),
                    );
                }
            }
            InitEvent::WholeSelf { span } => {
                let missing = self.missing(state);
                if !missing.is_empty() {
                    diags.push(Diagnostic::new(
                        DiagnosticKind::UninitializedPropertyAccess,
                        *span,
                        format!(
                            "`self` is used before every property is assigned (missing: {})",
                            missing.join(", ")
                        ),
                    ));
                }
            }
            InitEvent::Write { prop, span } => {
                let p = &self.properties[*prop];
                if state.written[*prop] && p.capability != Capability::Mutable {
                    diags.push(
                        Diagnostic::capability(
                            format!("{SELF}.{}", p.name),
                            Capability::Mutable,
                            p.capability,
                            *span,
                            format!(
                                "`self.{}` may already be initialized; only mutable properties can be re-assigned",
                                p.name
                            ),
                        )
                        .with_related(p.span, "property declared here"),
                    );
                }
                state.definite[*prop] = true;
                state.written[*prop] = true;
            }
            InitEvent::Complete { span } => {
                let missing = self.missing(state);
                if !missing.is_empty() {
                    diags.push(
                        Diagnostic::new(
                            DiagnosticKind::IncompleteConstruction,
                            *span,
                            format!(
                                "constructor of `{}` can finish without assigning {}",
                                self.ty,
                                missing.join(", ")
                            ),
                        )
                        .with_help("assign every property without a default on every path"),
                    );
                }
            }
        }
    }
}

fn check_constructor(table: &SymbolTable, owner: TypeId, body: &BodyRef<'_>) -> Vec<Diagnostic> {
    let def = table.def(owner);
    let TypeKind::Struct(info) = &def.kind else {
        return Vec::new();
    };

    let mut diags = Vec::new();
    for_each_expr(body.body, &mut |e| {
        if let ExprKind::Call { callee, .. } = &e.kind {
            if table.lookup_type(&callee.node) == Some(owner) {
                diags.push(
                    Diagnostic::new(
                        DiagnosticKind::RecursiveConstructionViolation,
                        e.span,
                        format!("a constructor of `{}` cannot construct `{}`", def.name, def.name),
                    )
                    .with_related(body.span, "inside this constructor"),
                );
            }
        }
    });

    let lowering = ConstructionLowering {
        properties: &info.properties,
    };
    let (cfg, _) = lower_body(lowering, body.body);
    diags.extend(run(
        &cfg,
        &Construction {
            ty: &def.name,
            properties: &info.properties,
        },
    ));
    diags
}

/// Visits every expression of a block in source order, nested ones included.
fn for_each_expr<'a>(block: &'a Block, f: &mut impl FnMut(&'a Expr)) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Let(s) => s.init.walk(f),
            Stmt::Assign(s) => {
                s.value.walk(f);
                s.target.walk(f);
            }
            Stmt::Expr(e) => e.walk(f),
            Stmt::If(s) => {
                s.cond.walk(f);
                for_each_expr(&s.then_block, f);
                if let Some(b) = &s.else_block {
                    for_each_expr(b, f);
                }
            }
            Stmt::While(s) => {
                s.cond.walk(f);
                for_each_expr(&s.body, f);
            }
            Stmt::Match(m) => {
                m.scrutinee.walk(f);
                for arm in &m.arms {
                    for_each_expr(&arm.body, f);
                }
            }
            Stmt::Return(s) => {
                if let Some(v) = &s.value {
                    v.walk(f);
                }
            }
            Stmt::Raise(s) => s.value.walk(f),
            Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Block(b) => for_each_expr(b, f),
        }
    }
}

/// Properties a constructor body assigns directly, in order of first
/// appearance.
fn assigned_in_order(block: &Block, out: &mut Vec<String>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Assign(s) => {
                if let ExprKind::Member { base, member } = &s.target.kind {
                    if base.is_self() && !out.contains(&member.node) {
                        out.push(member.node.clone());
                    }
                }
            }
            Stmt::If(s) => {
                assigned_in_order(&s.then_block, out);
                if let Some(b) = &s.else_block {
                    assigned_in_order(b, out);
                }
            }
            Stmt::While(s) => assigned_in_order(&s.body, out),
            Stmt::Match(m) => {
                for arm in &m.arms {
                    assigned_in_order(&arm.body, out);
                }
            }
            Stmt::Block(b) => assigned_in_order(b, out),
            _ => {}
        }
    }
}

/// Defaults the body does not override (declaration order), then the
/// properties the body assigns (order of first assignment).
pub fn init_order(properties: &[PropertyInfo], body: Option<&Block>) -> Vec<String> {
    let mut assigned = Vec::new();
    if let Some(body) = body {
        assigned_in_order(body, &mut assigned);
        assigned.retain(|name| properties.iter().any(|p| &p.name == name));
    }
    let mut out: Vec<String> = properties
        .iter()
        .filter(|p| p.has_default && !assigned.contains(&p.name))
        .map(|p| p.name.clone())
        .collect();
    out.extend(assigned);
    out
}

/// Initialization orders for every constructor (explicit or synthesized)
/// and the destructor policy of every struct.
pub fn decorations(
    program: &Program,
    table: &SymbolTable,
) -> (Vec<InitOrder>, BTreeMap<String, DestructorPolicy>) {
    let mut orders = Vec::new();
    let mut policies = BTreeMap::new();
    for (_, decl) in program.decls() {
        let Decl::Struct(s) = decl else {
            continue;
        };
        let Some(id) = type_of_decl(table, &s.name.node, s.span) else {
            continue;
        };
        let def = table.def(id);
        let TypeKind::Struct(info) = &def.kind else {
            continue;
        };
        if let Some(policy) = table.destructor_policy(id) {
            policies.insert(def.name.clone(), policy);
        }
        for (i, (ctor, sig)) in s.ctors.iter().zip(&info.ctors).enumerate() {
            if sig.valid {
                orders.push(InitOrder {
                    ty: def.name.clone(),
                    ctor: Some(i),
                    span: ctor.span,
                    order: init_order(&info.properties, Some(&ctor.body)),
                });
            }
        }
        if info.default_ctor == DefaultCtor::Synthesized {
            orders.push(InitOrder {
                ty: def.name.clone(),
                ctor: None,
                span: s.span,
                order: init_order(&info.properties, None),
            });
        }
    }
    (orders, policies)
}
