use veld_ast::build::*;
use veld_ast::{Capability, Decl, Program, Stmt};
use veld_sema::{check_mutability, resolve_types, Diagnostic, DiagnosticKind};

fn check(program: &Program) -> Vec<Diagnostic> {
    let (table, diags) = resolve_types(program);
    assert!(diags.is_empty(), "resolution failed: {diags:?}");
    check_mutability(program, &table)
}

fn point() -> Decl {
    structure("Point")
        .prop_default(Capability::Mutable, "x", "Int", int(0))
        .prop_default(Capability::Immutable, "id", "Int", int(0))
        .method("shift", Capability::Varying, vec![], None, vec![assign(field("x"), int(1))])
        .method("peek", Capability::Immutable, vec![], Some("Int"), vec![ret(Some(field("x")))])
        .build()
}

fn with_point(body: Vec<Stmt>) -> Program {
    single(vec![point(), function("f").body(body)])
}

/// (binding, required, granted) of every violation.
fn violations(diags: &[Diagnostic]) -> Vec<(String, Capability, Capability)> {
    diags
        .iter()
        .map(|d| {
            assert_eq!(d.kind, DiagnosticKind::CapabilityViolation, "{d:?}");
            let c = d.capability.as_ref().expect("capability details");
            (c.binding.clone(), c.required, c.granted)
        })
        .collect()
}

#[test]
fn immutable_binding_cannot_be_rebound() {
    let p = with_point(vec![
        bind(Capability::Immutable, "a", int(1)),
        assign(var("a"), int(2)),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("a".to_string(), Capability::Mutable, Capability::Immutable)]
    );
}

#[test]
fn varying_binding_mutates_but_does_not_rebind() {
    let p = with_point(vec![
        bind(Capability::Varying, "p", call("Point", vec![])),
        assign(member(var("p"), "x"), int(1)),
        eval(method(var("p"), "shift", vec![])),
        assign(var("p"), call("Point", vec![])),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("p".to_string(), Capability::Mutable, Capability::Varying)]
    );
}

#[test]
fn immutable_root_freezes_nested_properties() {
    let p = single(vec![
        structure("Inner")
            .prop_default(Capability::Mutable, "v", "Int", int(0))
            .build(),
        structure("Outer")
            .prop_default(Capability::Mutable, "inner", "Inner", call("Inner", vec![]))
            .build(),
        function("f").body(vec![
            bind(Capability::Immutable, "o", call("Outer", vec![])),
            assign(member(member(var("o"), "inner"), "v"), int(1)),
            bind(Capability::Mutable, "m", call("Outer", vec![])),
            assign(member(member(var("m"), "inner"), "v"), int(1)),
        ]),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("o.inner".to_string(), Capability::Varying, Capability::Immutable)]
    );
}

#[test]
fn immutable_property_cannot_be_reassigned() {
    let p = with_point(vec![
        bind(Capability::Mutable, "p", call("Point", vec![])),
        assign(member(var("p"), "id"), int(2)),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("p.id".to_string(), Capability::Mutable, Capability::Immutable)]
    );
}

#[test]
fn receiver_must_grant_the_method_capability() {
    let p = with_point(vec![
        bind(Capability::Immutable, "p", call("Point", vec![])),
        eval(method(var("p"), "peek", vec![])),
        eval(method(var("p"), "shift", vec![])),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("p".to_string(), Capability::Varying, Capability::Immutable)]
    );
}

#[test]
fn immutable_method_cannot_mutate_self() {
    let p = single(vec![
        structure("Counter")
            .prop_default(Capability::Mutable, "n", "Int", int(0))
            .method("bump", Capability::Immutable, vec![], None, vec![assign(field("n"), int(1))])
            .build(),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("self".to_string(), Capability::Varying, Capability::Immutable)]
    );
}

#[test]
fn arguments_must_grant_the_parameter_capability() {
    let p = single(vec![
        point(),
        function("take")
            .param(Capability::Mutable, "p", "Point")
            .body(vec![]),
        function("look")
            .param(Capability::Immutable, "p", "Point")
            .body(vec![]),
        function("f").body(vec![
            bind(Capability::Varying, "p", call("Point", vec![])),
            eval(call("look", vec![var("p")])),
            eval(call("take", vec![call("Point", vec![])])),
            eval(call("take", vec![var("p")])),
        ]),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("p".to_string(), Capability::Mutable, Capability::Varying)]
    );
}

#[test]
fn primitive_arguments_are_copied() {
    let p = single(vec![
        function("inc")
            .param(Capability::Mutable, "n", "Int")
            .body(vec![assign(var("n"), int(1))]),
        function("f").body(vec![
            bind(Capability::Immutable, "k", int(1)),
            eval(call("inc", vec![var("k")])),
        ]),
    ]);
    assert!(check(&p).is_empty());
}

#[test]
fn constructor_initializes_immutable_properties() {
    let p = single(vec![
        structure("Id")
            .prop(Capability::Immutable, "v", "Int")
            .ctor(
                vec![param(Capability::Immutable, "n", "Int")],
                vec![assign(field("v"), var("n"))],
            )
            .build(),
    ]);
    assert!(check(&p).is_empty());
}

#[test]
fn match_binder_is_capped_by_the_scrutinee() {
    let body = |cap| {
        single(vec![
            point(),
            union("Maybe", &["Point", "Int"]),
            function("f")
                .param(cap, "u", "Maybe")
                .body(vec![match_(
                    var("u"),
                    vec![
                        arm("Point", Some("p"), vec![assign(member(var("p"), "x"), int(1))]),
                        wildcard(vec![]),
                    ],
                )]),
        ])
    };
    assert_eq!(
        violations(&check(&body(Capability::Immutable))),
        vec![("p".to_string(), Capability::Varying, Capability::Immutable)]
    );
    assert!(check(&body(Capability::Mutable)).is_empty());
}

#[test]
fn destructor_call_needs_a_mutable_receiver() {
    let p = single(vec![
        structure("File").custom_dtor("close", vec![]).build(),
        function("f").body(vec![
            bind(Capability::Varying, "h", call("File", vec![])),
            eval(method(var("h"), "close", vec![])),
        ]),
    ]);
    assert_eq!(
        violations(&check(&p)),
        vec![("h".to_string(), Capability::Mutable, Capability::Varying)]
    );
}
