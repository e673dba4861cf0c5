#![forbid(unsafe_code)]

//! Body-level half of the type engine: infers expression types, resolves
//! calls to their callee, and checks statements against signatures.
//!
//! The [`Typer`] is also what the other checkers use to learn the type of
//! an expression or which callee a call selects.

use tracing::debug;
use veld_ast::{
    ArmPattern, BinOp, Block, Capability, Decl, Expr, ExprKind, Ident, MatchStmt, Program, Span,
    Stmt, TypeRef, UnaryOp, Visibility,
};

use crate::body::{bodies, check_each, BodyRef};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::resolve::type_of_decl;
use crate::symbols::{
    DefaultCtor, DestructorInfo, ParamInfo, Signature, SymbolTable, TypeKind,
};
use crate::types::{Type, TypeId};

#[derive(Clone, Debug, PartialEq)]
pub struct Local {
    pub name: String,
    pub ty: Type,
    pub capability: Capability,
    pub span: Span,
}

/// Lexical scopes of a body; the innermost frame is last.
#[derive(Clone, Debug, Default)]
pub struct Scopes {
    frames: Vec<Vec<Local>>,
}

impl Scopes {
    /// One frame holding the parameters (including `self`).
    pub fn for_signature(sig: &Signature) -> Self {
        let mut scopes = Scopes::default();
        scopes.push();
        for p in &sig.params {
            scopes.declare(&p.name, p.ty, p.capability, sig.span);
        }
        scopes
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn declare(&mut self, name: &str, ty: Type, capability: Capability, span: Span) {
        if self.frames.is_empty() {
            self.push();
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push(Local {
                name: name.to_string(),
                ty,
                capability,
                span,
            });
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Local> {
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.iter().rev())
            .find(|l| l.name == name)
    }
}

/// What a call expression resolved to.
#[derive(Clone, Copy, Debug)]
pub enum Callee<'t> {
    Function(&'t Signature),
    Method {
        owner: TypeId,
        sig: &'t Signature,
    },
    Destructor {
        owner: TypeId,
        dtor: &'t DestructorInfo,
    },
    Constructor {
        owner: TypeId,
        index: usize,
        sig: &'t Signature,
    },
    /// The default constructor of a struct whose properties all have
    /// defaults.
    SynthesizedCtor {
        owner: TypeId,
    },
}

impl<'t> Callee<'t> {
    pub fn signature(&self) -> Option<&'t Signature> {
        match *self {
            Callee::Function(sig) => Some(sig),
            Callee::Method { sig, .. } | Callee::Constructor { sig, .. } => Some(sig),
            Callee::Destructor { dtor, .. } => Some(&dtor.sig),
            Callee::SynthesizedCtor { .. } => None,
        }
    }

    pub fn owner(&self) -> Option<TypeId> {
        match *self {
            Callee::Function(_) => None,
            Callee::Method { owner, .. }
            | Callee::Destructor { owner, .. }
            | Callee::Constructor { owner, .. }
            | Callee::SynthesizedCtor { owner } => Some(owner),
        }
    }

    pub fn error(&self) -> Option<Type> {
        self.signature().and_then(|s| s.error)
    }

    pub fn ret(&self) -> Option<Type> {
        match *self {
            Callee::SynthesizedCtor { owner } => Some(Type::Named(owner)),
            _ => self.signature().and_then(|s| s.ret),
        }
    }

    pub fn explicit_params(&self) -> &'t [ParamInfo] {
        match self.signature() {
            Some(sig) => sig.explicit_params(),
            None => &[],
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            Callee::Constructor { .. } | Callee::SynthesizedCtor { .. }
        )
    }

    pub fn display(&self, table: &SymbolTable) -> String {
        match *self {
            Callee::Function(sig) => sig.name.clone(),
            Callee::Method { owner, sig } => format!("{}.{}", table.def(owner).name, sig.name),
            Callee::Destructor { owner, dtor } => format!(
                "{}.{}",
                table.def(owner).name,
                dtor.name.as_deref().unwrap_or("drop")
            ),
            Callee::Constructor { owner, .. } | Callee::SynthesizedCtor { owner } => {
                table.def(owner).name.clone()
            }
        }
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

/// Expression typing in the context of one module.
#[derive(Clone, Copy)]
pub struct Typer<'t> {
    pub table: &'t SymbolTable,
    pub module: &'t str,
}

impl<'t> Typer<'t> {
    pub fn new(table: &'t SymbolTable, module: &'t str) -> Self {
        Typer { table, module }
    }

    fn mismatch(&self, span: Span, message: String, diags: &mut Vec<Diagnostic>) {
        diags.push(Diagnostic::new(DiagnosticKind::TypeMismatch, span, message));
    }

    pub fn resolve_ref(&self, r: &TypeRef, diags: &mut Vec<Diagnostic>) -> Type {
        match self.table.resolve_name(&r.node) {
            Some(ty) => ty,
            None => {
                diags.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedType,
                    r.span,
                    format!("cannot find type `{}`", r.node),
                ));
                Type::Unknown
            }
        }
    }

    /// Like [`resolve_ref`](Self::resolve_ref), but silent.
    pub fn lookup_ref(&self, r: &TypeRef) -> Type {
        self.table.resolve_name(&r.node).unwrap_or(Type::Unknown)
    }

    /// Type of `e` without reporting anything.
    pub fn type_of(&self, scopes: &Scopes, e: &Expr) -> Type {
        self.infer(scopes, e, &mut Vec::new())
    }

    /// The callee a call expression selects, if it resolves.
    pub fn callee(&self, scopes: &Scopes, e: &Expr) -> Option<Callee<'t>> {
        if !e.is_call() {
            return None;
        }
        self.call(scopes, e, &mut Vec::new()).1
    }

    pub fn expect(
        &self,
        source: Type,
        target: Type,
        span: Span,
        what: &str,
        diags: &mut Vec<Diagnostic>,
    ) {
        if !self.table.is_assignable(source, target) {
            self.mismatch(
                span,
                format!(
                    "{what}: expected `{}`, found `{}`",
                    self.table.display(target),
                    self.table.display(source)
                ),
                diags,
            );
        }
    }

    pub fn infer(&self, scopes: &Scopes, e: &Expr, diags: &mut Vec<Diagnostic>) -> Type {
        let table = self.table;
        match &e.kind {
            ExprKind::Unit => Type::Unit,
            ExprKind::Int(_) => Type::Int,
            ExprKind::Float(_) => Type::Float,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Str(_) => Type::String,
            ExprKind::Ident(id) => match scopes.lookup(&id.node) {
                Some(local) => local.ty,
                None => {
                    diags.push(Diagnostic::new(
                        DiagnosticKind::UnknownName,
                        id.span,
                        format!("cannot find value `{}` in this scope", id.node),
                    ));
                    Type::Unknown
                }
            },
            ExprKind::Member { base, member } => {
                let bt = self.infer(scopes, base, diags);
                self.member_type(bt, member, diags)
            }
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => self.call(scopes, e, diags).0,
            ExprKind::Convert { target, value } => {
                let to = self.resolve_ref(target, diags);
                let from = self.infer(scopes, value, diags);
                if !table.is_convertible(from, to) {
                    self.mismatch(
                        e.span,
                        format!(
                            "cannot convert `{}` to `{}`; conversions follow alias chains only",
                            table.display(from),
                            table.display(to)
                        ),
                        diags,
                    );
                }
                to
            }
            ExprKind::Reraise { call } => self.infer(scopes, call, diags),
            ExprKind::Catch { call, fallback } => {
                let produced = self.infer(scopes, call, diags);
                if let Some(fb) = fallback {
                    let ft = self.infer(scopes, fb, diags);
                    self.expect(ft, produced, fb.span, "catch fallback", diags);
                }
                produced
            }
            ExprKind::Unary { op, expr } => {
                let t = self.infer(scopes, expr, diags);
                match op {
                    UnaryOp::Neg => {
                        if !t.is_unknown() && !table.unalias(t).is_numeric() {
                            self.mismatch(
                                e.span,
                                format!("cannot negate a value of type `{}`", table.display(t)),
                                diags,
                            );
                            return Type::Unknown;
                        }
                        t
                    }
                    UnaryOp::Not => {
                        self.expect(t, Type::Bool, expr.span, "operand of `!`", diags);
                        Type::Bool
                    }
                }
            }
            ExprKind::Binary { left, op, right } => {
                let l = self.infer(scopes, left, diags);
                let r = self.infer(scopes, right, diags);
                self.binary(*op, l, r, e.span, diags)
            }
        }
    }

    fn binary(&self, op: BinOp, l: Type, r: Type, span: Span, diags: &mut Vec<Diagnostic>) -> Type {
        let table = self.table;
        if op.is_logical() {
            self.expect(l, Type::Bool, span, "left operand", diags);
            self.expect(r, Type::Bool, span, "right operand", diags);
            return Type::Bool;
        }
        if l.is_unknown() || r.is_unknown() {
            return if op.is_arithmetic() {
                Type::Unknown
            } else {
                Type::Bool
            };
        }
        if matches!(op, BinOp::Eq | BinOp::Ne) {
            if !table.is_assignable(l, r) && !table.is_assignable(r, l) {
                self.mismatch(
                    span,
                    format!(
                        "cannot compare `{}` with `{}`",
                        table.display(l),
                        table.display(r)
                    ),
                    diags,
                );
            }
            return Type::Bool;
        }
        let (lu, ru) = (table.unalias(l), table.unalias(r));
        let ordered = lu == ru && (lu.is_numeric() || lu == Type::String);
        let ok = if op.is_arithmetic() {
            lu == ru && (lu.is_numeric() || (op == BinOp::Add && lu == Type::String))
        } else {
            ordered
        };
        if !ok {
            self.mismatch(
                span,
                format!(
                    "cannot apply `{}` to `{}` and `{}`",
                    op_symbol(op),
                    table.display(l),
                    table.display(r)
                ),
                diags,
            );
            return if op.is_arithmetic() {
                Type::Unknown
            } else {
                Type::Bool
            };
        }
        match op.is_arithmetic() {
            true if l == r => l,
            true => lu,
            false => Type::Bool,
        }
    }

    fn member_type(&self, base: Type, member: &Ident, diags: &mut Vec<Diagnostic>) -> Type {
        let table = self.table;
        if base.is_unknown() {
            return Type::Unknown;
        }
        if table.is_union(base) {
            diags.push(Diagnostic::new(
                DiagnosticKind::UnionAccessWithoutNarrowing,
                member.span,
                format!(
                    "`{}` is a union; match on it before accessing `{}`",
                    table.display(base),
                    member.node
                ),
            ));
            return Type::Unknown;
        }
        match table.property(base, &member.node) {
            Some((owner, p)) => {
                let def = table.def(owner);
                if p.visibility == Visibility::Private && def.module != self.module {
                    diags.push(
                        Diagnostic::new(
                            DiagnosticKind::PrivateAccess,
                            member.span,
                            format!(
                                "property `{}` of `{}` is private to module `{}`",
                                p.name, def.name, def.module
                            ),
                        )
                        .with_related(p.span, "declared here"),
                    );
                }
                p.ty
            }
            None => {
                diags.push(Diagnostic::new(
                    DiagnosticKind::UnknownName,
                    member.span,
                    format!(
                        "no property `{}` on `{}`",
                        member.node,
                        table.display(base)
                    ),
                ));
                Type::Unknown
            }
        }
    }

    fn check_args(
        &self,
        callee: &str,
        params: &[ParamInfo],
        args: &[Expr],
        arg_tys: &[Type],
        span: Span,
        diags: &mut Vec<Diagnostic>,
    ) {
        if params.len() != args.len() {
            self.mismatch(
                span,
                format!(
                    "`{callee}` takes {} argument(s) but {} were given",
                    params.len(),
                    args.len()
                ),
                diags,
            );
            return;
        }
        for ((p, a), t) in params.iter().zip(args).zip(arg_tys) {
            self.expect(
                *t,
                p.ty,
                a.span,
                &format!("argument `{}` of `{callee}`", p.name),
                diags,
            );
        }
    }

    fn call(&self, scopes: &Scopes, e: &Expr, diags: &mut Vec<Diagnostic>) -> (Type, Option<Callee<'t>>) {
        let table = self.table;
        match &e.kind {
            ExprKind::Call { callee, args } => {
                let arg_tys: Vec<Type> = args.iter().map(|a| self.infer(scopes, a, diags)).collect();
                if let Some(sig) = table.functions.get(&callee.node) {
                    self.check_args(&callee.node, sig.explicit_params(), args, &arg_tys, e.span, diags);
                    return (sig.ret.unwrap_or(Type::Unit), Some(Callee::Function(sig)));
                }
                if let Some(id) = table.lookup_type(&callee.node) {
                    return self.construct(id, &arg_tys, e.span, diags);
                }
                diags.push(Diagnostic::new(
                    DiagnosticKind::UnknownName,
                    callee.span,
                    format!("cannot find function or type `{}`", callee.node),
                ));
                (Type::Unknown, None)
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                let rt = self.infer(scopes, receiver, diags);
                let arg_tys: Vec<Type> = args.iter().map(|a| self.infer(scopes, a, diags)).collect();
                if rt.is_unknown() {
                    return (Type::Unknown, None);
                }
                if table.is_union(rt) {
                    diags.push(Diagnostic::new(
                        DiagnosticKind::UnionAccessWithoutNarrowing,
                        method.span,
                        format!(
                            "`{}` is a union; match on it before calling `{}`",
                            table.display(rt),
                            method.node
                        ),
                    ));
                    return (Type::Unknown, None);
                }
                let Some((owner, info)) = table.struct_info(rt) else {
                    diags.push(Diagnostic::new(
                        DiagnosticKind::UnknownName,
                        method.span,
                        format!("type `{}` has no method `{}`", table.display(rt), method.node),
                    ));
                    return (Type::Unknown, None);
                };
                let name = format!("{}.{}", table.def(owner).name, method.node);
                if let Some(sig) = info.methods.get(&method.node) {
                    self.check_args(&name, sig.explicit_params(), args, &arg_tys, e.span, diags);
                    return (
                        sig.ret.unwrap_or(Type::Unit),
                        Some(Callee::Method { owner, sig }),
                    );
                }
                if let Some(dtor) = table.custom_destructor(rt, &method.node) {
                    self.check_args(&name, dtor.sig.explicit_params(), args, &arg_tys, e.span, diags);
                    return (Type::Unit, Some(Callee::Destructor { owner, dtor }));
                }
                diags.push(Diagnostic::new(
                    DiagnosticKind::UnknownName,
                    method.span,
                    format!("no method `{}` on `{}`", method.node, table.def(owner).name),
                ));
                (Type::Unknown, None)
            }
            _ => (self.infer(scopes, e, diags), None),
        }
    }

    fn construct(
        &self,
        id: TypeId,
        arg_tys: &[Type],
        span: Span,
        diags: &mut Vec<Diagnostic>,
    ) -> (Type, Option<Callee<'t>>) {
        let table = self.table;
        let def = table.def(id);
        let TypeKind::Struct(info) = &def.kind else {
            self.mismatch(
                span,
                format!("`{}` is not a struct and has no constructors", def.name),
                diags,
            );
            return (Type::Unknown, None);
        };
        let ty = Type::Named(id);
        if !def.valid {
            return (ty, None);
        }
        let accepts = |sig: &Signature| {
            let params = sig.explicit_params();
            params.len() == arg_tys.len()
                && params
                    .iter()
                    .zip(arg_tys)
                    .all(|(p, t)| table.is_assignable(*t, p.ty))
        };
        if let Some((index, sig)) = info
            .ctors
            .iter()
            .enumerate()
            .find(|(_, c)| c.valid && accepts(c))
        {
            return (ty, Some(Callee::Constructor { owner: id, index, sig }));
        }
        if arg_tys.is_empty() && info.default_ctor == DefaultCtor::Synthesized {
            return (ty, Some(Callee::SynthesizedCtor { owner: id }));
        }

        let shown: Vec<String> = arg_tys.iter().map(|t| table.display(*t)).collect();
        let mut d = Diagnostic::new(
            DiagnosticKind::TypeMismatch,
            span,
            format!(
                "no constructor of `{}` accepts ({})",
                def.name,
                shown.join(", ")
            ),
        );
        if arg_tys.is_empty() {
            let missing: Vec<&str> = info
                .properties
                .iter()
                .filter(|p| !p.has_default)
                .map(|p| p.name.as_str())
                .collect();
            d = d.with_help(format!(
                "`{}` has no default constructor; properties without defaults: {}",
                def.name,
                missing.join(", ")
            ));
        }
        for c in info.ctors.iter().filter(|c| c.valid) {
            let params: Vec<String> = c
                .explicit_params()
                .iter()
                .map(|p| table.display(p.ty))
                .collect();
            d = d.with_related(c.span, format!("candidate: {}({})", def.name, params.join(", ")));
        }
        diags.push(d);
        (ty, None)
    }
}

pub(crate) fn check(program: &Program, table: &SymbolTable, parallel: bool) -> Vec<Diagnostic> {
    let bodies = bodies(program, table);
    let mut diags = check_each(&bodies, parallel, |b| check_body(table, b));
    diags.extend(check_property_defaults(program, table));
    diags
}

fn check_body(table: &SymbolTable, body: &BodyRef<'_>) -> Vec<Diagnostic> {
    debug!(body = %body.name, "type checking");
    let mut checker = BodyChecker {
        typer: Typer::new(table, body.module),
        scopes: Scopes::for_signature(body.sig),
        body,
        loops: 0,
        diags: Vec::new(),
    };
    checker.block(body.body);
    checker.diags
}

/// Defaults are evaluated before any constructor runs, so they see no
/// bindings at all, not even `self`.
fn check_property_defaults(program: &Program, table: &SymbolTable) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (module, decl) in program.decls() {
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
        if !def.valid {
            continue;
        }
        let typer = Typer::new(table, module);
        let scopes = Scopes::default();
        for p in &s.properties {
            let Some(default) = &p.default else {
                continue;
            };
            let Some(prop) = info.properties.iter().find(|q| q.span == p.span) else {
                continue;
            };
            let t = typer.infer(&scopes, default, &mut diags);
            typer.expect(
                t,
                prop.ty,
                default.span,
                &format!("default of `{}.{}`", def.name, prop.name),
                &mut diags,
            );
        }
    }
    diags
}

struct BodyChecker<'t, 'b> {
    typer: Typer<'t>,
    scopes: Scopes,
    body: &'b BodyRef<'t>,
    loops: usize,
    diags: Vec<Diagnostic>,
}

impl BodyChecker<'_, '_> {
    fn infer(&mut self, e: &Expr) -> Type {
        self.typer.infer(&self.scopes, e, &mut self.diags)
    }

    fn expect(&mut self, source: Type, target: Type, span: Span, what: &str) {
        self.typer
            .expect(source, target, span, what, &mut self.diags);
    }

    fn block(&mut self, block: &Block) {
        self.scopes.push();
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let table = self.typer.table;
        let body = self.body;
        match stmt {
            Stmt::Let(s) => {
                let init = self.infer(&s.init);
                let ty = match &s.ty {
                    Some(r) => {
                        let ann = self.typer.resolve_ref(r, &mut self.diags);
                        self.expect(init, ann, s.init.span, &format!("initializer of `{}`", s.name.node));
                        ann
                    }
                    None => init,
                };
                self.scopes
                    .declare(&s.name.node, ty, s.capability, s.name.span);
            }
            Stmt::Assign(s) => {
                let value = self.infer(&s.value);
                if s.target.as_place().is_none() {
                    self.diags.push(Diagnostic::new(
                        DiagnosticKind::InvalidAssignmentTarget,
                        s.target.span,
                        "only bindings and properties can be assigned to",
                    ));
                    return;
                }
                let target = self.infer(&s.target);
                self.expect(value, target, s.value.span, "assignment");
            }
            Stmt::Expr(e) => {
                self.infer(e);
            }
            Stmt::If(s) => {
                let cond = self.infer(&s.cond);
                self.expect(cond, Type::Bool, s.cond.span, "condition");
                self.block(&s.then_block);
                if let Some(b) = &s.else_block {
                    self.block(b);
                }
            }
            Stmt::While(s) => {
                let cond = self.infer(&s.cond);
                self.expect(cond, Type::Bool, s.cond.span, "condition");
                self.loops += 1;
                self.block(&s.body);
                self.loops -= 1;
            }
            Stmt::Match(m) => self.match_stmt(m),
            Stmt::Return(s) => {
                let name = &body.name;
                match (&s.value, body.is_constructor(), body.sig.ret) {
                    (Some(v), true, _) => {
                        self.infer(v);
                        self.diags.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            v.span,
                            "constructors return the constructed object implicitly",
                        ));
                    }
                    (Some(v), false, Some(ret)) => {
                        let t = self.infer(v);
                        self.expect(t, ret, v.span, "return value");
                    }
                    (Some(v), false, None) => {
                        let t = self.infer(v);
                        if !t.is_unknown() && t != Type::Unit {
                            let msg = format!(
                                "`{name}` declares no return type but returns `{}`",
                                table.display(t)
                            );
                            self.diags
                                .push(Diagnostic::new(DiagnosticKind::TypeMismatch, v.span, msg));
                        }
                    }
                    (None, false, Some(ret)) => {
                        let msg = format!(
                            "`{name}` must return a value of type `{}`",
                            table.display(ret)
                        );
                        self.diags
                            .push(Diagnostic::new(DiagnosticKind::TypeMismatch, s.span, msg));
                    }
                    (None, _, _) => {}
                }
            }
            Stmt::Raise(s) => {
                let t = self.infer(&s.value);
                if let Some(error) = body.sig.error {
                    self.expect(t, error, s.value.span, "raised value");
                }
            }
            Stmt::Break(span) | Stmt::Continue(span) => {
                if self.loops == 0 {
                    let what = if matches!(stmt, Stmt::Break(_)) {
                        "break"
                    } else {
                        "continue"
                    };
                    self.diags.push(Diagnostic::new(
                        DiagnosticKind::MisplacedJump,
                        *span,
                        format!("`{what}` outside of a loop"),
                    ));
                }
            }
            Stmt::Block(b) => self.block(b),
        }
    }

    fn match_stmt(&mut self, m: &MatchStmt) {
        let table = self.typer.table;
        let scrutinee = self.infer(&m.scrutinee);
        let variants: Option<Vec<Type>> = if scrutinee.is_unknown() {
            None
        } else if let Some(vs) = table.union_variants(scrutinee) {
            Some(vs.to_vec())
        } else {
            self.diags.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                m.scrutinee.span,
                format!(
                    "`match` requires a union value, found `{}`",
                    table.display(scrutinee)
                ),
            ));
            None
        };
        let union_name = table.display(scrutinee);

        let mut covered: Vec<Type> = Vec::new();
        let mut wildcard: Option<Span> = None;
        for arm in &m.arms {
            let mut binder: Option<(&Ident, Type)> = None;
            match &arm.pattern {
                ArmPattern::Variant { ty, binder: b } => {
                    let vt = self.typer.resolve_ref(ty, &mut self.diags);
                    if let (Some(vs), false) = (&variants, vt.is_unknown()) {
                        self.classify_arm(vs, vt, ty, arm.span, &union_name, &mut covered, wildcard);
                    }
                    binder = b.as_ref().map(|b| (b, vt));
                }
                ArmPattern::Wildcard { span } => {
                    let exhausted = variants
                        .as_ref()
                        .is_some_and(|vs| vs.iter().all(|v| covered.contains(v)));
                    if wildcard.is_some() || exhausted {
                        self.diags.push(Diagnostic::new(
                            DiagnosticKind::UnreachableArm,
                            *span,
                            "wildcard arm can never match; every variant is already handled",
                        ));
                    }
                    if wildcard.is_none() {
                        wildcard = Some(*span);
                    }
                }
            }
            self.scopes.push();
            if let Some((b, vt)) = binder {
                self.scopes.declare(&b.node, vt, Capability::Immutable, b.span);
            }
            self.block(&arm.body);
            self.scopes.pop();
        }

        if let (Some(vs), None) = (&variants, wildcard) {
            let missing: Vec<String> = vs
                .iter()
                .filter(|v| !covered.contains(v))
                .map(|v| format!("`{}`", table.display(*v)))
                .collect();
            if !missing.is_empty() {
                self.diags.push(
                    Diagnostic::new(
                        DiagnosticKind::NonExhaustiveUnion,
                        m.span,
                        format!(
                            "match on `{union_name}` does not handle {}",
                            missing.join(", ")
                        ),
                    )
                    .with_help("add an arm for each missing variant, or a wildcard arm"),
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_arm(
        &mut self,
        variants: &[Type],
        vt: Type,
        pattern: &TypeRef,
        arm_span: Span,
        union_name: &str,
        covered: &mut Vec<Type>,
        wildcard: Option<Span>,
    ) {
        let table = self.typer.table;
        if variants.contains(&vt) {
            if wildcard.is_some() || covered.contains(&vt) {
                self.diags.push(Diagnostic::new(
                    DiagnosticKind::UnreachableArm,
                    arm_span,
                    format!("arm for `{}` can never match; it is already handled", pattern.node),
                ));
            } else {
                covered.push(vt);
            }
        } else if let Some(v) = variants.iter().find(|v| table.alias_related(vt, **v)) {
            self.diags.push(
                Diagnostic::new(
                    DiagnosticKind::AmbiguousVariantPattern,
                    pattern.span,
                    format!(
                        "`{}` is alias-related to variant `{}` of `{union_name}`; name the variant exactly",
                        pattern.node,
                        table.display(*v)
                    ),
                )
                .with_help("whether an alias matches its base variant is not decided by the language"),
            );
        } else {
            self.diags.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                pattern.span,
                format!("`{}` is not a variant of `{union_name}`", pattern.node),
            ));
        }
    }
}
