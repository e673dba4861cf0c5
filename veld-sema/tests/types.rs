use veld_ast::build::*;
use veld_ast::{BinOp, Capability, Decl, Program};
use veld_sema::{check_types, resolve_types, Diagnostic, DiagnosticKind};

fn check(program: &Program) -> Vec<Diagnostic> {
    let (table, diags) = resolve_types(program);
    assert!(diags.is_empty(), "resolution failed: {diags:?}");
    check_types(program, &table)
}

fn kinds(diags: &[Diagnostic]) -> Vec<DiagnosticKind> {
    diags.iter().map(|d| d.kind).collect()
}

fn shapes() -> Vec<Decl> {
    vec![
        structure("Circle")
            .prop_default(Capability::Mutable, "r", "Float", float(1.0))
            .build(),
        structure("Square")
            .prop_default(Capability::Mutable, "side", "Float", float(1.0))
            .build(),
        union("Shape", &["Circle", "Square"]),
    ]
}

fn with_shapes(extra: Vec<Decl>) -> Program {
    let mut decls = shapes();
    decls.extend(extra);
    single(decls)
}

#[test]
fn alias_promotes_to_base_but_not_back() {
    let p = single(vec![
        alias("Meters", "Int"),
        function("f").body(vec![
            bind_typed(Capability::Immutable, "m", "Meters", convert("Meters", int(3))),
            bind_typed(Capability::Immutable, "i", "Int", var("m")),
            bind_typed(Capability::Immutable, "back", "Meters", var("i")),
        ]),
    ]);
    let diags = check(&p);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::TypeMismatch]);
    assert!(
        diags[0].message.contains("expected `Meters`, found `Int`"),
        "unexpected error: {}",
        diags[0].message
    );
}

#[test]
fn conversion_outside_alias_chain_is_rejected() {
    let p = single(vec![
        alias("Meters", "Int"),
        alias("Feet", "Int"),
        function("f").body(vec![
            bind(Capability::Immutable, "m", convert("Meters", int(1))),
            bind(Capability::Immutable, "s", convert("Meters", string("1"))),
            bind(Capability::Immutable, "f", convert("Feet", var("m"))),
        ]),
    ]);
    let diags = check(&p);
    assert_eq!(
        kinds(&diags),
        vec![DiagnosticKind::TypeMismatch, DiagnosticKind::TypeMismatch]
    );
    assert!(diags.iter().all(|d| d.message.contains("cannot convert")));
}

#[test]
fn distinct_structs_are_never_interchangeable() {
    let p = single(vec![
        structure("A").build(),
        structure("B").build(),
        function("f").body(vec![bind_typed(Capability::Immutable, "a", "A", call("B", vec![]))]),
    ]);
    assert_eq!(kinds(&check(&p)), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn union_accepts_each_variant() {
    let p = with_shapes(vec![function("f").body(vec![
        bind_typed(Capability::Immutable, "a", "Shape", call("Circle", vec![])),
        bind_typed(Capability::Immutable, "b", "Shape", call("Square", vec![])),
    ])]);
    assert!(check(&p).is_empty());
}

#[test]
fn missing_variant_is_reported() {
    let p = with_shapes(vec![
        function("f")
            .param(Capability::Immutable, "s", "Shape")
            .body(vec![match_(var("s"), vec![arm("Circle", Some("c"), vec![])])]),
    ]);
    let diags = check(&p);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::NonExhaustiveUnion]);
    assert!(diags[0].message.contains("`Square`"), "{}", diags[0].message);
}

#[test]
fn arm_after_wildcard_is_unreachable() {
    let p = with_shapes(vec![
        function("f")
            .param(Capability::Immutable, "s", "Shape")
            .body(vec![match_(
                var("s"),
                vec![wildcard(vec![]), arm("Circle", None, vec![])],
            )]),
    ]);
    assert_eq!(kinds(&check(&p)), vec![DiagnosticKind::UnreachableArm]);
}

#[test]
fn wildcard_after_full_coverage_is_unreachable() {
    let p = with_shapes(vec![
        function("f")
            .param(Capability::Immutable, "s", "Shape")
            .body(vec![match_(
                var("s"),
                vec![
                    arm("Circle", None, vec![]),
                    arm("Square", None, vec![]),
                    wildcard(vec![]),
                ],
            )]),
    ]);
    assert_eq!(kinds(&check(&p)), vec![DiagnosticKind::UnreachableArm]);
}

#[test]
fn binder_has_the_variant_type() {
    let p = with_shapes(vec![
        function("radius")
            .param(Capability::Immutable, "s", "Shape")
            .ret("Float")
            .body(vec![
                match_(
                    var("s"),
                    vec![
                        arm("Circle", Some("c"), vec![ret(Some(member(var("c"), "r")))]),
                        arm("Square", Some("q"), vec![ret(Some(member(var("q"), "r")))]),
                    ],
                ),
                ret(Some(float(0.0))),
            ]),
    ]);
    let diags = check(&p);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::UnknownName]);
    assert!(diags[0].message.contains("no property `r` on `Square`"), "{}", diags[0].message);
}

#[test]
fn alias_of_a_variant_is_ambiguous_in_patterns() {
    let mut extra = vec![alias("Round", "Circle")];
    extra.push(
        function("f")
            .param(Capability::Immutable, "s", "Shape")
            .body(vec![match_(
                var("s"),
                vec![arm("Round", None, vec![]), wildcard(vec![])],
            )]),
    );
    let diags = check(&with_shapes(extra));
    assert_eq!(kinds(&diags), vec![DiagnosticKind::AmbiguousVariantPattern]);
    assert!(diags[0].help.is_some());
}

#[test]
fn union_members_need_narrowing() {
    let p = with_shapes(vec![
        function("f")
            .param(Capability::Immutable, "s", "Shape")
            .body(vec![eval(member(var("s"), "r"))]),
    ]);
    assert_eq!(
        kinds(&check(&p)),
        vec![DiagnosticKind::UnionAccessWithoutNarrowing]
    );
}

#[test]
fn match_requires_a_union() {
    let p = single(vec![
        function("f")
            .param(Capability::Immutable, "n", "Int")
            .body(vec![match_(var("n"), vec![wildcard(vec![])])]),
    ]);
    assert_eq!(kinds(&check(&p)), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn private_property_is_module_scoped() {
    let p = program(vec![
        module(
            "vault",
            vec![
                structure("Secret")
                    .private_prop(Capability::Immutable, "key", "Int")
                    .ctor(vec![], vec![assign(field("key"), int(7))])
                    .method(
                        "peek",
                        Capability::Immutable,
                        vec![],
                        Some("Int"),
                        vec![ret(Some(field("key")))],
                    )
                    .build(),
            ],
        ),
        module(
            "thief",
            vec![
                function("steal")
                    .param(Capability::Immutable, "s", "Secret")
                    .ret("Int")
                    .body(vec![ret(Some(member(var("s"), "key")))]),
            ],
        ),
    ]);
    let diags = check(&p);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::PrivateAccess]);
    assert_eq!(diags[0].related.len(), 1);
}

#[test]
fn constructor_overloads_are_selected_by_argument_types() {
    let p = single(vec![
        structure("Tag")
            .prop_default(Capability::Mutable, "n", "Int", int(0))
            .ctor(vec![param(Capability::Immutable, "n", "Int")], vec![assign(field("n"), var("n"))])
            .ctor(vec![param(Capability::Immutable, "s", "String")], vec![])
            .build(),
        function("f").body(vec![
            bind(Capability::Immutable, "a", call("Tag", vec![int(1)])),
            bind(Capability::Immutable, "b", call("Tag", vec![string("x")])),
            bind(Capability::Immutable, "c", call("Tag", vec![boolean(true)])),
        ]),
    ]);
    let diags = check(&p);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::TypeMismatch]);
    assert!(diags[0].message.contains("no constructor of `Tag` accepts (Bool)"));
    assert_eq!(diags[0].related.len(), 2);
}

#[test]
fn return_values_must_match_the_signature() {
    let p = single(vec![
        function("f").ret("Int").body(vec![ret(Some(boolean(true)))]),
        function("g").ret("Int").body(vec![ret(None)]),
        function("h").body(vec![ret(Some(int(1)))]),
    ]);
    assert_eq!(
        kinds(&check(&p)),
        vec![
            DiagnosticKind::TypeMismatch,
            DiagnosticKind::TypeMismatch,
            DiagnosticKind::TypeMismatch
        ]
    );
}

#[test]
fn conditions_and_operators_are_typed() {
    let p = single(vec![function("f").body(vec![
        if_(int(1), vec![], None),
        bind(Capability::Immutable, "s", binary(string("a"), BinOp::Add, string("b"))),
        bind(Capability::Immutable, "bad", binary(int(1), BinOp::Add, boolean(true))),
        while_(binary(int(1), BinOp::Lt, int(2)), vec![brk()]),
    ])]);
    assert_eq!(
        kinds(&check(&p)),
        vec![DiagnosticKind::TypeMismatch, DiagnosticKind::TypeMismatch]
    );
}

#[test]
fn jumps_outside_loops_are_misplaced() {
    let p = single(vec![function("f").body(vec![
        brk(),
        while_(boolean(true), vec![cont()]),
        cont(),
    ])]);
    assert_eq!(
        kinds(&check(&p)),
        vec![DiagnosticKind::MisplacedJump, DiagnosticKind::MisplacedJump]
    );
}

#[test]
fn only_places_can_be_assigned() {
    let p = single(vec![function("f").body(vec![assign(int(1), int(2))])]);
    assert_eq!(
        kinds(&check(&p)),
        vec![DiagnosticKind::InvalidAssignmentTarget]
    );
}

#[test]
fn unknown_names_are_reported() {
    let p = single(vec![function("f").body(vec![
        eval(var("ghost")),
        eval(call("nowhere", vec![])),
    ])]);
    assert_eq!(
        kinds(&check(&p)),
        vec![DiagnosticKind::UnknownName, DiagnosticKind::UnknownName]
    );
}
