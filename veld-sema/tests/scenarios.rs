//! End-to-end programs run through every checker.

use veld_ast::build::*;
use veld_ast::{Capability, Decl, Program, Span};
use veld_sema::{analyze, Analysis, AnalysisOptions, DefaultCtor, DiagnosticKind, Type};

fn run(program: &Program) -> Analysis {
    analyze(program, &AnalysisOptions::default())
}

fn kinds(analysis: &Analysis) -> Vec<DiagnosticKind> {
    analysis.diagnostics.iter().map(|d| d.kind).collect()
}

fn default_ctor(analysis: &Analysis, name: &str) -> DefaultCtor {
    let id = analysis.table.lookup_type(name).expect("declared");
    analysis
        .table
        .struct_info(Type::Named(id))
        .map(|(_, info)| info.default_ctor)
        .expect("struct")
}

/// `type Foo { val a: Int }`, optionally with `ctor Foo(val v: Int) { self.a = v }`.
fn foo(with_ctor: bool) -> Decl {
    let s = structure("Foo").prop(Capability::Immutable, "a", "Int");
    let s = if with_ctor {
        s.ctor(
            vec![param(Capability::Immutable, "v", "Int")],
            vec![assign(field("a"), var("v"))],
        )
    } else {
        s
    };
    s.build()
}

#[test]
fn scenario_a_default_constructor_cannot_be_synthesized() {
    let bare = run(&single(vec![
        foo(false),
        function("f").body(vec![bind(Capability::Immutable, "x", call("Foo", vec![]))]),
    ]));
    assert_eq!(default_ctor(&bare, "Foo"), DefaultCtor::Unavailable);
    assert_eq!(kinds(&bare), vec![DiagnosticKind::TypeMismatch]);
    let d = &bare.diagnostics[0];
    assert!(d.message.contains("no constructor of `Foo`"), "{}", d.message);
    assert!(d.help.as_deref().is_some_and(|h| h.contains("a")));

    let explicit = run(&single(vec![
        foo(true),
        function("f").body(vec![bind(Capability::Immutable, "x", call("Foo", vec![int(1)]))]),
    ]));
    assert!(explicit.is_accepted(), "{:?}", explicit.diagnostics);

    let no_args = run(&single(vec![
        foo(true),
        function("f").body(vec![bind(Capability::Immutable, "x", call("Foo", vec![]))]),
    ]));
    assert_eq!(kinds(&no_args), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn scenario_b_defaults_are_initialized_before_the_body() {
    let synthesized = run(&single(vec![
        structure("Foo")
            .prop_default(Capability::Immutable, "a", "Int", int(1))
            .build(),
        function("f").body(vec![bind(Capability::Immutable, "x", call("Foo", vec![]))]),
    ]));
    assert!(synthesized.is_accepted(), "{:?}", synthesized.diagnostics);
    assert_eq!(default_ctor(&synthesized, "Foo"), DefaultCtor::Synthesized);
    assert_eq!(synthesized.init_orders.len(), 1);
    assert_eq!(synthesized.init_orders[0].ctor, None);
    assert_eq!(synthesized.init_orders[0].order, vec!["a".to_string()]);

    let reads_default = run(&single(vec![
        structure("Foo")
            .prop_default(Capability::Immutable, "a", "Int", int(1))
            .prop(Capability::Immutable, "b", "Int")
            .ctor(vec![], vec![assign(field("b"), member(self_(), "a"))])
            .build(),
    ]));
    assert!(reads_default.is_accepted(), "{:?}", reads_default.diagnostics);
}

#[test]
fn scenario_c_custom_destructor_must_run_on_every_path() {
    let program = |else_branch: bool| {
        let cleanup = || eval(method(var("x"), "cleanup", vec![]));
        single(vec![
            structure("Foo").custom_dtor("cleanup", vec![]).build(),
            function("f")
                .param(Capability::Immutable, "c", "Bool")
                .body(vec![
                    bind(Capability::Mutable, "x", call("Foo", vec![])),
                    if_(var("c"), vec![cleanup()], else_branch.then(|| vec![cleanup()])),
                ]),
        ])
    };

    let leaky = run(&program(false));
    assert_eq!(
        kinds(&leaky),
        vec![DiagnosticKind::MissingDestructorInvocation]
    );

    let tidy = run(&program(true));
    assert!(tidy.is_accepted(), "{:?}", tidy.diagnostics);
}

#[test]
fn scenario_d_reraise_needs_a_channel_in_the_caller() {
    let program = |caller_channel: Option<&str>| {
        let user = function("use").ret("Int");
        let user = match caller_channel {
            Some(err) => user.error(err),
            None => user,
        };
        single(vec![
            function("div")
                .param(Capability::Immutable, "a", "Int")
                .param(Capability::Immutable, "b", "Int")
                .ret("Int")
                .error("Bool")
                .body(vec![raise(boolean(false))]),
            user.body(vec![ret(Some(reraise(call("div", vec![int(1), int(0)]))))]),
        ])
    };

    let rejected = run(&program(None));
    assert_eq!(
        kinds(&rejected),
        vec![DiagnosticKind::UnhandledErrorPropagation]
    );

    let accepted = run(&program(Some("Bool")));
    assert!(accepted.is_accepted(), "{:?}", accepted.diagnostics);
}

#[test]
fn checkers_report_independently() {
    let p = single(vec![
        structure("Handle").custom_dtor("close", vec![]).build(),
        function("fail").error("Bool").body(vec![raise(boolean(true))]),
        function("f").body(vec![
            bind(Capability::Immutable, "n", int(1)),
            assign(var("n"), int(2)),
            eval(call("fail", vec![])),
            bind(Capability::Mutable, "h", call("Handle", vec![])),
            bind_typed(Capability::Immutable, "s", "String", int(3)),
        ]),
    ]);
    let analysis = run(&p);
    let mut found = kinds(&analysis);
    found.sort();
    assert_eq!(
        found,
        vec![
            DiagnosticKind::CapabilityViolation,
            DiagnosticKind::UnhandledError,
            DiagnosticKind::TypeMismatch,
            DiagnosticKind::MissingDestructorInvocation,
        ]
    );

    let sequential = analyze(
        &p,
        &AnalysisOptions {
            parallel: false,
            ..Default::default()
        },
    );
    assert_eq!(analysis.diagnostics, sequential.diagnostics);
}

#[test]
fn invalid_declarations_suppress_only_their_own_bodies() {
    let p = single(vec![
        structure("Broken")
            .prop(Capability::Immutable, "a", "Nowhere")
            .method(
                "m",
                Capability::Immutable,
                vec![],
                None,
                vec![assign(field("a"), int(1))],
            )
            .build(),
        function("f").body(vec![
            bind(Capability::Immutable, "n", int(1)),
            assign(var("n"), int(2)),
        ]),
    ]);
    let analysis = run(&p);
    let mut found = kinds(&analysis);
    found.sort();
    assert_eq!(
        found,
        vec![
            DiagnosticKind::CapabilityViolation,
            DiagnosticKind::UnresolvedType
        ]
    );
}

#[test]
fn spans_at_the_end_of_the_range_are_reported_not_fatal() {
    let mut f = function("f").body(vec![bind(
        Capability::Mutable,
        "h",
        call("Handle", vec![]),
    )]);
    if let Decl::Function(fun) = &mut f {
        fun.body.span = Span::new(usize::MAX, 1);
    }
    let p = single(vec![
        structure("Handle").custom_dtor("close", vec![]).build(),
        f,
    ]);
    let analysis = run(&p);
    assert_eq!(kinds(&analysis), vec![DiagnosticKind::MissingDestructorInvocation]);
    assert_eq!(analysis.diagnostics[0].span, Span::new(usize::MAX, 0));
}

#[test]
fn immutable_handle_with_only_custom_destructors_is_always_rejected() {
    let file = || structure("File").custom_dtor("close", vec![]).build();

    let closed = run(&single(vec![
        file(),
        function("f").body(vec![
            bind(Capability::Immutable, "h", call("File", vec![])),
            eval(method(var("h"), "close", vec![])),
        ]),
    ]));
    assert_eq!(kinds(&closed), vec![DiagnosticKind::CapabilityViolation]);
    let mismatch = closed.diagnostics[0].capability.as_ref().expect("capability details");
    assert_eq!(mismatch.required, Capability::Mutable);
    assert_eq!(mismatch.granted, Capability::Immutable);

    let left_open = run(&single(vec![
        file(),
        function("f").body(vec![bind(Capability::Immutable, "h", call("File", vec![]))]),
    ]));
    assert_eq!(kinds(&left_open), vec![DiagnosticKind::MissingDestructorInvocation]);
}
