#![forbid(unsafe_code)]

use std::fmt;

use miette::SourceSpan;
use serde::{Deserialize, Serialize};

pub mod build;

/// Byte range in the source the parser read. The core never sees the text
/// itself, only these offsets.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Saturates; spans arrive from outside and are not trusted.
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.len)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        let start = self.offset.min(other.offset);
        let end = self.end().max(other.end());
        span_between(start, end)
    }
}

impl From<Span> for SourceSpan {
    fn from(s: Span) -> Self {
        SourceSpan::new(s.offset.into(), s.len)
    }
}

pub fn span(start: usize, len: usize) -> Span {
    Span::new(start, len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub type Ident = Spanned<String>;

/// Type references are plain names; the language has no type arguments.
pub type TypeRef = Ident;

/// Name of the implicit receiver in constructors, destructors and methods.
pub const SELF: &str = "self";

/// Mutability tier of a binding, parameter, property or receiver.
///
/// Ordered so that `a >= b` means "`a` grants everything `b` grants".
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Immutable,
    Varying,
    Mutable,
}

impl Capability {
    pub fn permits(self, required: Capability) -> bool {
        self >= required
    }

    pub fn display(&self) -> &'static str {
        match self {
            Capability::Immutable => "immutable",
            Capability::Varying => "varying",
            Capability::Mutable => "mutable",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub modules: Vec<Module>,
}

impl Program {
    /// Every declaration paired with the name of its module, in source order.
    pub fn decls(&self) -> impl Iterator<Item = (&str, &Decl)> + '_ {
        self.modules
            .iter()
            .flat_map(|m| m.decls.iter().map(move |d| (m.name.node.as_str(), d)))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub span: Span,
    pub name: Ident,
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Struct(StructDecl),
    Alias(AliasDecl),
    Union(UnionDecl),
    Function(FunDecl),
}

impl Decl {
    pub fn name(&self) -> &Ident {
        match self {
            Decl::Struct(d) => &d.name,
            Decl::Alias(d) => &d.name,
            Decl::Union(d) => &d.name,
            Decl::Function(d) => &d.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Decl::Struct(d) => d.span,
            Decl::Alias(d) => d.span,
            Decl::Union(d) => d.span,
            Decl::Function(d) => d.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub span: Span,
    pub name: Ident,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    #[serde(default)]
    pub ctors: Vec<CtorDecl>,
    #[serde(default)]
    pub dtors: Vec<DtorDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub span: Span,
    pub name: Ident,
    pub ty: TypeRef,
    pub capability: Capability,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub default: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    pub capability: Capability,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CtorDecl {
    pub span: Span,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub error: Option<TypeRef>,
    pub body: Block,
}

/// `name == None` declares the type's default destructor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DtorDecl {
    pub span: Span,
    #[serde(default)]
    pub name: Option<Ident>,
    #[serde(default)]
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub span: Span,
    pub name: Ident,
    pub self_capability: Capability,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub ret: Option<TypeRef>,
    #[serde(default)]
    pub error: Option<TypeRef>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AliasDecl {
    pub span: Span,
    pub name: Ident,
    pub base: TypeRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnionDecl {
    pub span: Span,
    pub name: Ident,
    pub variants: Vec<TypeRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunDecl {
    pub span: Span,
    pub name: Ident,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub ret: Option<TypeRef>,
    #[serde(default)]
    pub error: Option<TypeRef>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Let(LetStmt),
    Assign(AssignStmt),
    Expr(Expr),
    If(IfStmt),
    While(WhileStmt),
    Match(MatchStmt),
    Return(ReturnStmt),
    Raise(RaiseStmt),
    Break(Span),
    Continue(Span),
    Block(Block),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::Expr(e) => e.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::Match(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Raise(s) => s.span,
            Stmt::Break(span) | Stmt::Continue(span) => *span,
            Stmt::Block(b) => b.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LetStmt {
    pub span: Span,
    pub name: Ident,
    pub capability: Capability,
    #[serde(default)]
    pub ty: Option<TypeRef>,
    pub init: Expr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignStmt {
    pub span: Span,
    pub target: Expr,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub then_block: Block,
    #[serde(default)]
    pub else_block: Option<Block>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchStmt {
    pub span: Span,
    pub scrutinee: Expr,
    pub arms: Vec<MatchArm>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub span: Span,
    pub pattern: ArmPattern,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArmPattern {
    /// Narrows the scrutinee to one variant, optionally binding it.
    Variant { ty: TypeRef, binder: Option<Ident> },
    Wildcard { span: Span },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub span: Span,
    #[serde(default)]
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaiseStmt {
    pub span: Span,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Unit,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// A binding or `self`.
    Ident(Ident),
    Member {
        base: Box<Expr>,
        member: Ident,
    },
    /// Function call, or constructor call when `callee` names a struct.
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    /// Method call, or explicit invocation of a custom destructor.
    MethodCall {
        receiver: Box<Expr>,
        method: Ident,
        args: Vec<Expr>,
    },
    /// Explicit conversion request, e.g. from a base type to its alias.
    Convert {
        target: TypeRef,
        value: Box<Expr>,
    },
    /// Propagates the callee's error to the caller unchanged.
    Reraise {
        call: Box<Expr>,
    },
    /// Handles the callee's error by substituting `fallback`.
    Catch {
        call: Box<Expr>,
        fallback: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

/// An access path `root.p1.p2...`, the only expressions that can be
/// assigned to or carry a capability.
#[derive(Clone, Debug, PartialEq)]
pub struct Place<'a> {
    pub root: &'a Ident,
    pub path: Vec<&'a Ident>,
}

impl Place<'_> {
    pub fn is_binding(&self) -> bool {
        self.path.is_empty()
    }

    pub fn display(&self) -> String {
        let mut out = self.root.node.clone();
        for p in &self.path {
            out.push('.');
            out.push_str(&p.node);
        }
        out
    }
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Ident(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_self(&self) -> bool {
        self.as_ident().is_some_and(|id| id.node == SELF)
    }

    pub fn as_place(&self) -> Option<Place<'_>> {
        match &self.kind {
            ExprKind::Ident(root) => Some(Place {
                root,
                path: Vec::new(),
            }),
            ExprKind::Member { base, member } => {
                let mut place = base.as_place()?;
                place.path.push(member);
                Some(place)
            }
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Call { .. } | ExprKind::MethodCall { .. }
        )
    }

    /// Direct sub-expressions in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Unit
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::Ident(_) => Vec::new(),
            ExprKind::Member { base, .. } => vec![&**base],
            ExprKind::Call { args, .. } => args.iter().collect(),
            ExprKind::MethodCall { receiver, args, .. } => {
                let mut out: Vec<&Expr> = vec![&**receiver];
                out.extend(args.iter());
                out
            }
            ExprKind::Convert { value, .. } => vec![&**value],
            ExprKind::Reraise { call } => vec![&**call],
            ExprKind::Catch { call, fallback } => {
                let mut out: Vec<&Expr> = vec![&**call];
                if let Some(fb) = fallback {
                    out.push(&**fb);
                }
                out
            }
            ExprKind::Unary { expr, .. } => vec![&**expr],
            ExprKind::Binary { left, right, .. } => vec![&**left, &**right],
        }
    }

    /// Pre-order traversal over this expression and all sub-expressions.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}
