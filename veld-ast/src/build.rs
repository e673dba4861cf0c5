//! Terse constructors for ASTs.
//!
//! Tools that synthesize programs (and the test suites) use these instead of
//! spelling out every node. Each node receives a fresh, distinct span so
//! diagnostics stay attributable.

use std::cell::Cell;

use crate::*;

thread_local! {
    static NEXT_OFFSET: Cell<usize> = const { Cell::new(0) };
}

fn fresh() -> Span {
    NEXT_OFFSET.with(|n| {
        let offset = n.get();
        n.set(offset + 1);
        Span::new(offset, 1)
    })
}

fn expr(kind: ExprKind) -> Expr {
    Expr::new(fresh(), kind)
}

pub fn ident(name: &str) -> Ident {
    Spanned::new(fresh(), name.to_string())
}

pub fn ty(name: &str) -> TypeRef {
    ident(name)
}

pub fn program(modules: Vec<Module>) -> Program {
    Program { modules }
}

pub fn module(name: &str, decls: Vec<Decl>) -> Module {
    Module {
        span: fresh(),
        name: ident(name),
        decls,
    }
}

/// A program made of one module named `main`.
pub fn single(decls: Vec<Decl>) -> Program {
    program(vec![module("main", decls)])
}

pub fn param(capability: Capability, name: &str, ty_name: &str) -> Param {
    Param {
        span: fresh(),
        name: ident(name),
        capability,
        ty: ty(ty_name),
    }
}

pub fn block(stmts: Vec<Stmt>) -> Block {
    Block {
        span: fresh(),
        stmts,
    }
}

// --- declarations ---

pub fn alias(name: &str, base: &str) -> Decl {
    Decl::Alias(AliasDecl {
        span: fresh(),
        name: ident(name),
        base: ty(base),
    })
}

pub fn union(name: &str, variants: &[&str]) -> Decl {
    Decl::Union(UnionDecl {
        span: fresh(),
        name: ident(name),
        variants: variants.iter().map(|v| ty(v)).collect(),
    })
}

pub fn function(name: &str) -> FunBuilder {
    FunBuilder {
        name: ident(name),
        params: Vec::new(),
        ret: None,
        error: None,
    }
}

pub struct FunBuilder {
    name: Ident,
    params: Vec<Param>,
    ret: Option<TypeRef>,
    error: Option<TypeRef>,
}

impl FunBuilder {
    pub fn param(mut self, capability: Capability, name: &str, ty_name: &str) -> Self {
        self.params.push(param(capability, name, ty_name));
        self
    }

    pub fn ret(mut self, ty_name: &str) -> Self {
        self.ret = Some(ty(ty_name));
        self
    }

    pub fn error(mut self, ty_name: &str) -> Self {
        self.error = Some(ty(ty_name));
        self
    }

    pub fn body(self, stmts: Vec<Stmt>) -> Decl {
        Decl::Function(FunDecl {
            span: fresh(),
            name: self.name,
            params: self.params,
            ret: self.ret,
            error: self.error,
            body: block(stmts),
        })
    }
}

pub fn structure(name: &str) -> StructBuilder {
    StructBuilder {
        decl: StructDecl {
            span: fresh(),
            name: ident(name),
            properties: Vec::new(),
            ctors: Vec::new(),
            dtors: Vec::new(),
            methods: Vec::new(),
        },
    }
}

pub struct StructBuilder {
    decl: StructDecl,
}

impl StructBuilder {
    pub fn prop(self, capability: Capability, name: &str, ty_name: &str) -> Self {
        self.property(capability, Visibility::Public, name, ty_name, None)
    }

    pub fn prop_default(self, capability: Capability, name: &str, ty_name: &str, default: Expr) -> Self {
        self.property(capability, Visibility::Public, name, ty_name, Some(default))
    }

    pub fn private_prop(self, capability: Capability, name: &str, ty_name: &str) -> Self {
        self.property(capability, Visibility::Private, name, ty_name, None)
    }

    pub fn property(
        mut self,
        capability: Capability,
        visibility: Visibility,
        name: &str,
        ty_name: &str,
        default: Option<Expr>,
    ) -> Self {
        self.decl.properties.push(PropertyDecl {
            span: fresh(),
            name: ident(name),
            ty: ty(ty_name),
            capability,
            visibility,
            default,
        });
        self
    }

    pub fn ctor(mut self, params: Vec<Param>, stmts: Vec<Stmt>) -> Self {
        self.decl.ctors.push(CtorDecl {
            span: fresh(),
            params,
            error: None,
            body: block(stmts),
        });
        self
    }

    pub fn ctor_raising(mut self, params: Vec<Param>, error: &str, stmts: Vec<Stmt>) -> Self {
        self.decl.ctors.push(CtorDecl {
            span: fresh(),
            params,
            error: Some(ty(error)),
            body: block(stmts),
        });
        self
    }

    /// The default destructor.
    pub fn dtor(mut self, stmts: Vec<Stmt>) -> Self {
        self.decl.dtors.push(DtorDecl {
            span: fresh(),
            name: None,
            params: Vec::new(),
            body: block(stmts),
        });
        self
    }

    pub fn custom_dtor(mut self, name: &str, stmts: Vec<Stmt>) -> Self {
        self.decl.dtors.push(DtorDecl {
            span: fresh(),
            name: Some(ident(name)),
            params: Vec::new(),
            body: block(stmts),
        });
        self
    }

    pub fn method(
        self,
        name: &str,
        self_capability: Capability,
        params: Vec<Param>,
        ret: Option<&str>,
        stmts: Vec<Stmt>,
    ) -> Self {
        self.method_raising(name, self_capability, params, ret, None, stmts)
    }

    pub fn method_raising(
        mut self,
        name: &str,
        self_capability: Capability,
        params: Vec<Param>,
        ret: Option<&str>,
        error: Option<&str>,
        stmts: Vec<Stmt>,
    ) -> Self {
        self.decl.methods.push(MethodDecl {
            span: fresh(),
            name: ident(name),
            self_capability,
            params,
            ret: ret.map(ty),
            error: error.map(ty),
            body: block(stmts),
        });
        self
    }

    pub fn build(self) -> Decl {
        Decl::Struct(self.decl)
    }
}

// --- statements ---

pub fn bind(capability: Capability, name: &str, init: Expr) -> Stmt {
    Stmt::Let(LetStmt {
        span: fresh(),
        name: ident(name),
        capability,
        ty: None,
        init,
    })
}

pub fn bind_typed(capability: Capability, name: &str, ty_name: &str, init: Expr) -> Stmt {
    Stmt::Let(LetStmt {
        span: fresh(),
        name: ident(name),
        capability,
        ty: Some(ty(ty_name)),
        init,
    })
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign(AssignStmt {
        span: fresh(),
        target,
        value,
    })
}

pub fn eval(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

pub fn if_(cond: Expr, then_stmts: Vec<Stmt>, else_stmts: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If(IfStmt {
        span: fresh(),
        cond,
        then_block: block(then_stmts),
        else_block: else_stmts.map(block),
    })
}

pub fn while_(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While(WhileStmt {
        span: fresh(),
        cond,
        body: block(body),
    })
}

pub fn match_(scrutinee: Expr, arms: Vec<MatchArm>) -> Stmt {
    Stmt::Match(MatchStmt {
        span: fresh(),
        scrutinee,
        arms,
    })
}

pub fn arm(variant: &str, binder: Option<&str>, body: Vec<Stmt>) -> MatchArm {
    MatchArm {
        span: fresh(),
        pattern: ArmPattern::Variant {
            ty: ty(variant),
            binder: binder.map(ident),
        },
        body: block(body),
    }
}

pub fn wildcard(body: Vec<Stmt>) -> MatchArm {
    MatchArm {
        span: fresh(),
        pattern: ArmPattern::Wildcard { span: fresh() },
        body: block(body),
    }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return(ReturnStmt {
        span: fresh(),
        value,
    })
}

pub fn raise(value: Expr) -> Stmt {
    Stmt::Raise(RaiseStmt {
        span: fresh(),
        value,
    })
}

pub fn brk() -> Stmt {
    Stmt::Break(fresh())
}

pub fn cont() -> Stmt {
    Stmt::Continue(fresh())
}

pub fn scope(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Block(block(stmts))
}

// --- expressions ---

pub fn unit() -> Expr {
    expr(ExprKind::Unit)
}

pub fn int(v: i64) -> Expr {
    expr(ExprKind::Int(v))
}

pub fn float(v: f64) -> Expr {
    expr(ExprKind::Float(v))
}

pub fn boolean(v: bool) -> Expr {
    expr(ExprKind::Bool(v))
}

pub fn string(v: &str) -> Expr {
    expr(ExprKind::Str(v.to_string()))
}

pub fn var(name: &str) -> Expr {
    expr(ExprKind::Ident(ident(name)))
}

pub fn self_() -> Expr {
    var(SELF)
}

pub fn member(base: Expr, name: &str) -> Expr {
    expr(ExprKind::Member {
        base: Box::new(base),
        member: ident(name),
    })
}

/// `self.name`
pub fn field(name: &str) -> Expr {
    member(self_(), name)
}

pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        callee: ident(callee),
        args,
    })
}

pub fn method(receiver: Expr, name: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::MethodCall {
        receiver: Box::new(receiver),
        method: ident(name),
        args,
    })
}

pub fn convert(target: &str, value: Expr) -> Expr {
    expr(ExprKind::Convert {
        target: ty(target),
        value: Box::new(value),
    })
}

pub fn reraise(call: Expr) -> Expr {
    expr(ExprKind::Reraise {
        call: Box::new(call),
    })
}

pub fn catch(call: Expr, fallback: Option<Expr>) -> Expr {
    expr(ExprKind::Catch {
        call: Box::new(call),
        fallback: fallback.map(Box::new),
    })
}

pub fn not(e: Expr) -> Expr {
    expr(ExprKind::Unary {
        op: UnaryOp::Not,
        expr: Box::new(e),
    })
}

pub fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    expr(ExprKind::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}
