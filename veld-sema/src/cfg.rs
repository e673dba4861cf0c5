#![forbid(unsafe_code)]

//! Control-flow graphs over bodies, and a forward dataflow solver.
//!
//! What a block contains is up to the analysis: a [`Lowering`] turns
//! statements and expressions into its own event type while the builder
//! takes care of the shape (branches, loops, early exits, scope unwinding).

use std::collections::VecDeque;
use std::marker::PhantomData;

use tracing::{trace, warn};
use veld_ast::{AssignStmt, Block, Expr, LetStmt, MatchArm, Span, Stmt};

use crate::diagnostics::Diagnostic;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

#[derive(Clone, Debug)]
pub struct BasicBlock<E> {
    pub events: Vec<E>,
    pub succs: Vec<BlockId>,
}

#[derive(Clone, Debug)]
pub struct Cfg<E> {
    pub blocks: Vec<BasicBlock<E>>,
    pub entry: BlockId,
    pub exit: BlockId,
}

impl<E> Cfg<E> {
    pub fn block(&self, id: BlockId) -> &BasicBlock<E> {
        &self.blocks[id.0]
    }

    pub fn preds(&self, id: BlockId) -> Vec<BlockId> {
        (0..self.blocks.len())
            .map(BlockId)
            .filter(|b| self.block(*b).succs.contains(&id))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// Explicit `return`.
    Return,
    /// `raise`.
    Raise,
    /// Control reaches the end of the body.
    FallOff,
}

/// Where a [`Lowering`] writes events. Besides plain events it carries
/// re-raise points: events pushed before [`Emit::reraise`] happen on the
/// error edge as well, later ones only on the normal path.
pub struct Emit<E> {
    pieces: Vec<Piece<E>>,
}

enum Piece<E> {
    Event(E),
    Reraise(Span),
}

impl<E> Emit<E> {
    fn new() -> Self {
        Self { pieces: Vec::new() }
    }

    pub fn push(&mut self, event: E) {
        self.pieces.push(Piece::Event(event));
    }

    /// The `!` at `span` may leave the body here.
    pub fn reraise(&mut self, span: Span) {
        self.pieces.push(Piece::Reraise(span));
    }
}

/// Decides which events each piece of a body produces.
///
/// The builder keeps the scope depth; a lowering keeps whatever it needs per
/// scope. `scope_exit(keep, ..)` must emit exit events for every scope at
/// index `keep` and deeper without forgetting them, because only one path
/// leaves through that edge. `pop_scope` then forgets the innermost scope.
///
/// `expr` must call [`Emit::reraise`] right after the events of the call a
/// `!` applies to; the builder forks the error edge there.
pub trait Lowering<'a> {
    type Event;

    /// Called once with the parameter scope already pushed.
    fn enter_body(&mut self, out: &mut Emit<Self::Event>);
    fn push_scope(&mut self);
    fn pop_scope(&mut self);
    fn scope_exit(&mut self, keep: usize, span: Span, out: &mut Emit<Self::Event>);
    fn expr(&mut self, expr: &'a Expr, out: &mut Emit<Self::Event>);
    fn declare(&mut self, stmt: &'a LetStmt, out: &mut Emit<Self::Event>);
    fn assign(&mut self, stmt: &'a AssignStmt, out: &mut Emit<Self::Event>);
    /// Called in the arm's own scope, before its body.
    fn bind_arm(&mut self, scrutinee: &'a Expr, arm: &'a MatchArm, out: &mut Emit<Self::Event>);
    /// Called before scopes unwind on a body exit.
    fn exit(
        &mut self,
        kind: ExitKind,
        span: Span,
        value: Option<&'a Expr>,
        out: &mut Emit<Self::Event>,
    );
}

#[derive(Clone, Copy)]
struct Loop {
    head: BlockId,
    after: BlockId,
    depth: usize,
}

struct Builder<'a, L: Lowering<'a>> {
    lowering: L,
    blocks: Vec<BasicBlock<L::Event>>,
    current: BlockId,
    exit: BlockId,
    depth: usize,
    loops: Vec<Loop>,
    _body: PhantomData<&'a Block>,
}

/// Lowers `body` into a CFG. Returns the lowering as well, since it usually
/// collected tables (slots, names) the analysis needs.
pub fn lower_body<'a, L: Lowering<'a>>(lowering: L, body: &'a Block) -> (Cfg<L::Event>, L) {
    let mut b = Builder {
        lowering,
        blocks: Vec::new(),
        current: BlockId(0),
        exit: BlockId(0),
        depth: 0,
        loops: Vec::new(),
        _body: PhantomData,
    };
    let entry = b.new_block();
    b.exit = b.new_block();
    b.current = entry;

    b.lowering.push_scope();
    b.depth = 1;
    b.emit(|l, out| l.enter_body(out));

    b.block(body);

    let end = Span::new(body.span.end(), 0);
    b.emit(|l, out| {
        l.exit(ExitKind::FallOff, end, None, out);
        l.scope_exit(0, end, out);
    });
    b.lowering.pop_scope();
    b.edge(b.current, b.exit);

    let cfg = Cfg {
        blocks: b.blocks,
        entry,
        exit: b.exit,
    };
    (cfg, b.lowering)
}

impl<'a, L: Lowering<'a>> Builder<'a, L> {
    fn new_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock {
            events: Vec::new(),
            succs: Vec::new(),
        });
        BlockId(self.blocks.len() - 1)
    }

    fn edge(&mut self, from: BlockId, to: BlockId) {
        let succs = &mut self.blocks[from.0].succs;
        if !succs.contains(&to) {
            succs.push(to);
        }
    }

    /// Ends the current block with a jump; code after it lands in a block
    /// nothing reaches.
    fn jump(&mut self, to: BlockId) {
        self.edge(self.current, to);
        self.current = self.new_block();
    }

    /// Runs one lowering call and appends what it emitted to the current
    /// block, forking an error edge at every re-raise point.
    fn emit(&mut self, f: impl FnOnce(&mut L, &mut Emit<L::Event>)) {
        let mut out = Emit::new();
        f(&mut self.lowering, &mut out);
        for piece in out.pieces {
            match piece {
                Piece::Event(e) => self.blocks[self.current.0].events.push(e),
                Piece::Reraise(span) => self.fork_error(span),
            }
        }
    }

    /// The error edge of a `!`: unwind every scope, then leave the body.
    fn fork_error(&mut self, span: Span) {
        let err = self.new_block();
        self.edge(self.current, err);
        let mut out = Emit::new();
        self.lowering.scope_exit(0, span, &mut out);
        let events = &mut self.blocks[err.0].events;
        for piece in out.pieces {
            if let Piece::Event(e) = piece {
                events.push(e);
            }
        }
        self.edge(err, self.exit);
        let cont = self.new_block();
        self.edge(self.current, cont);
        self.current = cont;
    }

    fn unwind(&mut self, keep: usize, span: Span) {
        self.emit(|l, out| l.scope_exit(keep, span, out));
    }

    fn expr(&mut self, e: &'a Expr) {
        self.emit(|l, out| l.expr(e, out));
    }

    fn block(&mut self, block: &'a Block) {
        self.lowering.push_scope();
        self.depth += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.unwind(self.depth - 1, Span::new(block.span.end(), 0));
        self.lowering.pop_scope();
        self.depth -= 1;
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Let(s) => {
                self.expr(&s.init);
                self.emit(|l, out| l.declare(s, out));
            }
            Stmt::Assign(s) => {
                self.expr(&s.value);
                self.emit(|l, out| l.assign(s, out));
            }
            Stmt::Expr(e) => self.expr(e),
            Stmt::If(s) => {
                self.expr(&s.cond);
                let cond = self.current;
                let join = self.new_block();

                let then_b = self.new_block();
                self.edge(cond, then_b);
                self.current = then_b;
                self.block(&s.then_block);
                self.edge(self.current, join);

                match &s.else_block {
                    Some(else_block) => {
                        let else_b = self.new_block();
                        self.edge(cond, else_b);
                        self.current = else_b;
                        self.block(else_block);
                        self.edge(self.current, join);
                    }
                    None => self.edge(cond, join),
                }
                self.current = join;
            }
            Stmt::While(s) => {
                let head = self.new_block();
                self.edge(self.current, head);
                self.current = head;
                self.expr(&s.cond);
                let cond = self.current;

                let body_b = self.new_block();
                let after = self.new_block();
                self.edge(cond, body_b);
                self.edge(cond, after);

                self.loops.push(Loop {
                    head,
                    after,
                    depth: self.depth,
                });
                self.current = body_b;
                self.block(&s.body);
                self.edge(self.current, head);
                self.loops.pop();
                self.current = after;
            }
            Stmt::Match(m) => {
                self.expr(&m.scrutinee);
                let dispatch = self.current;
                let join = self.new_block();
                for arm in &m.arms {
                    let arm_b = self.new_block();
                    self.edge(dispatch, arm_b);
                    self.current = arm_b;

                    self.lowering.push_scope();
                    self.depth += 1;
                    let scrutinee = &m.scrutinee;
                    self.emit(|l, out| l.bind_arm(scrutinee, arm, out));
                    self.block(&arm.body);
                    self.unwind(self.depth - 1, Span::new(arm.body.span.end(), 0));
                    self.lowering.pop_scope();
                    self.depth -= 1;

                    self.edge(self.current, join);
                }
                if m.arms.is_empty() {
                    self.edge(dispatch, join);
                }
                self.current = join;
            }
            Stmt::Return(s) => {
                if let Some(v) = &s.value {
                    self.expr(v);
                }
                self.emit(|l, out| l.exit(ExitKind::Return, s.span, s.value.as_ref(), out));
                self.unwind(0, s.span);
                self.jump(self.exit);
            }
            Stmt::Raise(s) => {
                self.expr(&s.value);
                self.emit(|l, out| l.exit(ExitKind::Raise, s.span, Some(&s.value), out));
                self.unwind(0, s.span);
                self.jump(self.exit);
            }
            Stmt::Break(span) => {
                if let Some(l) = self.loops.last().copied() {
                    self.unwind(l.depth, *span);
                    self.jump(l.after);
                }
            }
            Stmt::Continue(span) => {
                if let Some(l) = self.loops.last().copied() {
                    self.unwind(l.depth, *span);
                    self.jump(l.head);
                }
            }
            Stmt::Block(b) => self.block(b),
        }
    }
}

/// A forward analysis over a [`Cfg`] whose blocks hold `E` events.
pub trait Dataflow<E> {
    type State: Clone + PartialEq;

    fn entry_state(&self) -> Self::State;
    fn join(&self, a: &Self::State, b: &Self::State) -> Self::State;
    /// Applies one event. Diagnostics pushed during the fixed-point
    /// iteration are discarded; only the final replay keeps them.
    fn transfer(&self, state: &mut Self::State, event: &E, diags: &mut Vec<Diagnostic>);
}

/// Upper bound on how often one block may be re-queued before the solver
/// gives up on reaching a fixed point.
const MAX_VISITS_PER_BLOCK: usize = 64;

/// Entry state of every block at the fixed point; `None` for blocks that
/// no path reaches.
pub fn solve<E, D: Dataflow<E>>(cfg: &Cfg<E>, analysis: &D) -> Vec<Option<D::State>> {
    let n = cfg.blocks.len();
    let mut states: Vec<Option<D::State>> = vec![None; n];
    states[cfg.entry.0] = Some(analysis.entry_state());

    let mut queue = VecDeque::from([cfg.entry]);
    let mut queued = vec![false; n];
    queued[cfg.entry.0] = true;
    let mut visits = 0usize;
    let budget = n.saturating_mul(MAX_VISITS_PER_BLOCK).max(1);
    let mut scratch = Vec::new();

    while let Some(id) = queue.pop_front() {
        queued[id.0] = false;
        visits += 1;
        if visits > budget {
            warn!(blocks = n, visits, "dataflow did not converge; giving up");
            break;
        }
        let Some(mut state) = states[id.0].clone() else {
            continue;
        };
        for event in &cfg.block(id).events {
            analysis.transfer(&mut state, event, &mut scratch);
        }
        scratch.clear();
        for &succ in &cfg.block(id).succs {
            let merged = match &states[succ.0] {
                None => state.clone(),
                Some(old) => analysis.join(old, &state),
            };
            if states[succ.0].as_ref() != Some(&merged) {
                trace!(from = id.0, to = succ.0, "state changed");
                states[succ.0] = Some(merged);
                if !queued[succ.0] {
                    queued[succ.0] = true;
                    queue.push_back(succ);
                }
            }
        }
    }
    states
}

/// Re-runs every reachable block once from its fixed-point entry state and
/// collects diagnostics. Loops therefore report each problem once.
pub fn replay<E, D: Dataflow<E>>(
    cfg: &Cfg<E>,
    analysis: &D,
    states: &[Option<D::State>],
) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (block, state) in cfg.blocks.iter().zip(states) {
        let Some(state) = state else {
            continue;
        };
        let mut state = state.clone();
        for event in &block.events {
            analysis.transfer(&mut state, event, &mut diags);
        }
    }
    diags
}

pub fn run<E, D: Dataflow<E>>(cfg: &Cfg<E>, analysis: &D) -> Vec<Diagnostic> {
    let states = solve(cfg, analysis);
    replay(cfg, analysis, &states)
}

#[cfg(test)]
mod tests {
    use veld_ast::build::*;
    use veld_ast::Capability::*;
    use veld_ast::{ExprKind, Span};

    use super::*;
    use crate::diagnostics::DiagnosticKind;

    /// Records declarations and scope exits by name.
    #[derive(Default)]
    struct Names {
        scopes: Vec<Vec<String>>,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Ev {
        Declare(String),
        Exit(String),
        Call(String),
    }

    impl<'a> Lowering<'a> for Names {
        type Event = Ev;

        fn enter_body(&mut self, _out: &mut Emit<Ev>) {}

        fn push_scope(&mut self) {
            self.scopes.push(Vec::new());
        }

        fn pop_scope(&mut self) {
            self.scopes.pop();
        }

        fn scope_exit(&mut self, keep: usize, _span: Span, out: &mut Emit<Ev>) {
            for scope in self.scopes[keep..].iter().rev() {
                for name in scope.iter().rev() {
                    out.push(Ev::Exit(name.clone()));
                }
            }
        }

        fn expr(&mut self, expr: &'a Expr, out: &mut Emit<Ev>) {
            for child in expr.children() {
                self.expr(child, out);
            }
            match &expr.kind {
                ExprKind::Call { callee, .. } => out.push(Ev::Call(callee.node.clone())),
                ExprKind::Reraise { .. } => out.reraise(expr.span),
                _ => {}
            }
        }

        fn declare(&mut self, stmt: &'a LetStmt, out: &mut Emit<Ev>) {
            out.push(Ev::Declare(stmt.name.node.clone()));
            if let Some(scope) = self.scopes.last_mut() {
                scope.push(stmt.name.node.clone());
            }
        }

        fn assign(&mut self, _stmt: &'a AssignStmt, _out: &mut Emit<Ev>) {}

        fn bind_arm(&mut self, _s: &'a Expr, _arm: &'a MatchArm, _out: &mut Emit<Ev>) {}

        fn exit(&mut self, _k: ExitKind, _s: Span, _v: Option<&'a Expr>, _out: &mut Emit<Ev>) {}
    }

    /// Names declared and not yet exited; reports names still live at
    /// the body exit.
    struct Live;

    impl Dataflow<Ev> for Live {
        type State = Vec<String>;

        fn entry_state(&self) -> Vec<String> {
            Vec::new()
        }

        fn join(&self, a: &Vec<String>, b: &Vec<String>) -> Vec<String> {
            let mut out = a.clone();
            for n in b {
                if !out.contains(n) {
                    out.push(n.clone());
                }
            }
            out.sort();
            out
        }

        fn transfer(&self, state: &mut Vec<String>, event: &Ev, diags: &mut Vec<Diagnostic>) {
            match event {
                Ev::Declare(n) => {
                    if !state.contains(n) {
                        state.push(n.clone());
                        state.sort();
                    }
                }
                Ev::Exit(n) => state.retain(|m| m != n),
                Ev::Call(c) if c == "check" && !state.is_empty() => diags.push(Diagnostic::new(
                    DiagnosticKind::MissingDestructorInvocation,
                    Span::default(),
                    state.join(","),
                )),
                Ev::Call(_) => {}
            }
        }
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let body = block(vec![
            ret(None),
            bind(Immutable, "dead", call("f", vec![])),
        ]);
        let (cfg, _) = lower_body(Names::default(), &body);
        let states = solve(&cfg, &Live);
        let holds_dead = cfg
            .blocks
            .iter()
            .position(|b| b.events.contains(&Ev::Declare("dead".into())))
            .expect("declaration lowered");
        assert!(states[holds_dead].is_none());
        assert!(states[cfg.exit.0].is_some());
    }

    #[test]
    fn loop_has_a_back_edge() {
        let body = block(vec![while_(boolean(true), vec![eval(call("f", vec![]))])]);
        let (cfg, _) = lower_body(Names::default(), &body);
        let calls = cfg
            .blocks
            .iter()
            .position(|b| b.events.contains(&Ev::Call("f".into())))
            .expect("call lowered");
        let succs = &cfg.block(BlockId(calls)).succs;
        let head = succs[0];
        assert!(cfg.preds(head).len() >= 2, "head is entered from before and from the body");
    }

    #[test]
    fn break_unwinds_loop_scopes_only() {
        let body = block(vec![
            bind(Immutable, "outer", int(0)),
            while_(
                boolean(true),
                vec![bind(Immutable, "inner", int(1)), brk()],
            ),
        ]);
        let (cfg, _) = lower_body(Names::default(), &body);
        let breaking = cfg
            .blocks
            .iter()
            .find(|b| b.events.contains(&Ev::Declare("inner".into())))
            .expect("loop body");
        assert!(breaking.events.contains(&Ev::Exit("inner".into())));
        assert!(!breaking.events.contains(&Ev::Exit("outer".into())));
    }

    #[test]
    fn reraise_forks_to_exit_and_unwinds() {
        let body = block(vec![
            bind(Immutable, "a", int(0)),
            eval(reraise(call("f", vec![]))),
            eval(call("check", vec![])),
        ]);
        let (cfg, _) = lower_body(Names::default(), &body);
        let err = cfg
            .blocks
            .iter()
            .position(|b| b.succs == vec![cfg.exit] && b.events == vec![Ev::Exit("a".into())])
            .expect("error edge block");
        assert!(cfg.preds(BlockId(err)).len() == 1);
    }

    #[test]
    fn reraise_inside_arguments_forks_before_later_arguments() {
        let body = block(vec![
            bind(Immutable, "a", int(0)),
            eval(call(
                "g",
                vec![reraise(call("f", vec![])), call("h", vec![])],
            )),
        ]);
        let (cfg, _) = lower_body(Names::default(), &body);
        let err = cfg
            .blocks
            .iter()
            .position(|b| b.succs == vec![cfg.exit] && b.events == vec![Ev::Exit("a".into())])
            .expect("error edge block");
        let before = cfg.preds(BlockId(err));
        assert_eq!(before.len(), 1);
        let before = &cfg.block(before[0]).events;
        assert_eq!(before.last(), Some(&Ev::Call("f".into())));
        assert!(!before.contains(&Ev::Call("h".into())));

        let after = cfg
            .blocks
            .iter()
            .find(|b| b.events.contains(&Ev::Call("h".into())))
            .expect("later argument lowered");
        assert_eq!(after.events[..2], [Ev::Call("h".into()), Ev::Call("g".into())]);
    }

    #[test]
    fn replay_reports_once_per_event() {
        let body = block(vec![
            bind(Immutable, "a", int(0)),
            while_(boolean(true), vec![eval(call("check", vec![]))]),
        ]);
        let (cfg, _) = lower_body(Names::default(), &body);
        let diags = run(&cfg, &Live);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "a");
    }
}
