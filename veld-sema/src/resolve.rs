#![forbid(unsafe_code)]

//! Type resolution: builds the [`SymbolTable`] every other pass reads.
//!
//! Passes run in a fixed order over declarations in source order (modules,
//! then declarations), so ids and diagnostics are deterministic.

use std::collections::BTreeMap;

use tracing::debug;
use veld_ast::{Capability, Decl, Param, Program, Span, StructDecl, TypeRef, SELF};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::symbols::{
    DefaultCtor, DestructorInfo, ParamInfo, PropertyInfo, Signature, StructInfo, SymbolTable,
    TypeDef, TypeKind,
};
use crate::types::{Type, TypeId};

pub fn resolve(program: &Program) -> (SymbolTable, Vec<Diagnostic>) {
    let mut r = Resolver {
        table: SymbolTable::default(),
        diags: Vec::new(),
    };
    r.declare_types(program);
    r.resolve_aliases_and_unions(program);
    r.detect_alias_cycles();
    r.resolve_structs(program);
    r.resolve_functions(program);
    debug!(
        types = r.table.types.len(),
        functions = r.table.functions.len(),
        diagnostics = r.diags.len(),
        "resolved declarations"
    );
    (r.table, r.diags)
}

/// Finds the table entry created for `decl`. Declarations that lost a name
/// collision have no entry.
pub(crate) fn type_of_decl(table: &SymbolTable, name: &str, span: Span) -> Option<TypeId> {
    let id = table.lookup_type(name)?;
    (table.def(id).span == span).then_some(id)
}

struct Resolver {
    table: SymbolTable,
    diags: Vec<Diagnostic>,
}

impl Resolver {
    fn duplicate(&mut self, what: &str, name: &str, span: Span, first: Span) {
        self.diags.push(
            Diagnostic::new(
                DiagnosticKind::DuplicateDeclaration,
                span,
                format!("{what} `{name}` is declared more than once"),
            )
            .with_related(first, "first declared here"),
        );
    }

    fn resolve_ref(&mut self, r: &TypeRef) -> Option<Type> {
        let ty = self.table.resolve_name(&r.node);
        if ty.is_none() {
            self.diags.push(Diagnostic::new(
                DiagnosticKind::UnresolvedType,
                r.span,
                format!("cannot find type `{}`", r.node),
            ));
        }
        ty
    }

    fn declare_types(&mut self, program: &Program) {
        for (module, decl) in program.decls() {
            let placeholder = match decl {
                Decl::Struct(_) => TypeKind::Struct(StructInfo::default()),
                Decl::Alias(_) => TypeKind::Alias {
                    base: Type::Unknown,
                },
                Decl::Union(_) => TypeKind::Union {
                    variants: Vec::new(),
                },
                Decl::Function(_) => continue,
            };
            let name = decl.name();
            if Type::primitive(&name.node).is_some() {
                self.diags.push(Diagnostic::new(
                    DiagnosticKind::DuplicateDeclaration,
                    name.span,
                    format!("`{}` is a built-in type and cannot be redeclared", name.node),
                ));
                continue;
            }
            if let Some(&first) = self.table.type_names.get(&name.node) {
                let first = self.table.def(first).span;
                self.duplicate("type", &name.node, name.span, first);
                continue;
            }
            let id = TypeId(self.table.types.len() as u32);
            self.table.types.push(TypeDef {
                id,
                name: name.node.clone(),
                module: module.to_string(),
                span: decl.span(),
                valid: true,
                kind: placeholder,
            });
            self.table.type_names.insert(name.node.clone(), id);
        }
    }

    fn resolve_aliases_and_unions(&mut self, program: &Program) {
        for (_, decl) in program.decls() {
            match decl {
                Decl::Alias(a) => {
                    let Some(id) = type_of_decl(&self.table, &a.name.node, a.span) else {
                        continue;
                    };
                    let base = self.resolve_ref(&a.base);
                    let def = &mut self.table.types[id.index()];
                    def.valid &= base.is_some();
                    def.kind = TypeKind::Alias {
                        base: base.unwrap_or(Type::Unknown),
                    };
                }
                Decl::Union(u) => {
                    let Some(id) = type_of_decl(&self.table, &u.name.node, u.span) else {
                        continue;
                    };
                    let mut variants: Vec<Type> = Vec::new();
                    let mut spans: Vec<Span> = Vec::new();
                    let mut valid = true;
                    for v in &u.variants {
                        let Some(ty) = self.resolve_ref(v) else {
                            valid = false;
                            continue;
                        };
                        if let Some(pos) = variants.iter().position(|t| *t == ty) {
                            self.duplicate("variant", &v.node, v.span, spans[pos]);
                            continue;
                        }
                        variants.push(ty);
                        spans.push(v.span);
                    }
                    let def = &mut self.table.types[id.index()];
                    def.valid &= valid;
                    def.kind = TypeKind::Union { variants };
                }
                _ => {}
            }
        }
    }

    fn detect_alias_cycles(&mut self) {
        for i in 0..self.table.types.len() {
            let TypeKind::Alias { base } = self.table.types[i].kind else {
                continue;
            };
            let start = Type::Named(TypeId(i as u32));
            if !self.table.alias_chain(base).contains(&start) {
                continue;
            }
            let def = &mut self.table.types[i];
            def.valid = false;
            let (name, span) = (def.name.clone(), def.span);
            self.diags.push(Diagnostic::new(
                DiagnosticKind::CyclicAlias,
                span,
                format!("alias `{name}` refers back to itself"),
            ));
        }
    }

    fn resolve_params(
        &mut self,
        params: &[Param],
        receiver: Option<(Capability, TypeId)>,
    ) -> (Vec<ParamInfo>, bool) {
        let mut out = Vec::new();
        let mut spans: Vec<Span> = Vec::new();
        let mut valid = true;
        if let Some((capability, id)) = receiver {
            out.push(ParamInfo {
                name: SELF.to_string(),
                ty: Type::Named(id),
                capability,
            });
            spans.push(Span::default());
        }
        for p in params {
            if let Some(pos) = out.iter().position(|q| q.name == p.name.node) {
                if receiver.is_some() && pos == 0 {
                    self.diags.push(Diagnostic::new(
                        DiagnosticKind::DuplicateDeclaration,
                        p.name.span,
                        "`self` is implicit and cannot be declared as a parameter",
                    ));
                } else {
                    self.duplicate("parameter", &p.name.node, p.name.span, spans[pos]);
                }
                valid = false;
                continue;
            }
            let ty = self.resolve_ref(&p.ty);
            valid &= ty.is_some();
            out.push(ParamInfo {
                name: p.name.node.clone(),
                ty: ty.unwrap_or(Type::Unknown),
                capability: p.capability,
            });
            spans.push(p.span);
        }
        (out, valid)
    }

    fn resolve_optional(&mut self, r: Option<&TypeRef>) -> (Option<Type>, bool) {
        match r {
            None => (None, true),
            Some(r) => match self.resolve_ref(r) {
                Some(Type::Unit) => (None, true),
                Some(ty) => (Some(ty), true),
                None => (Some(Type::Unknown), false),
            },
        }
    }

    fn resolve_structs(&mut self, program: &Program) {
        for (_, decl) in program.decls() {
            let Decl::Struct(s) = decl else {
                continue;
            };
            let Some(id) = type_of_decl(&self.table, &s.name.node, s.span) else {
                continue;
            };
            let (info, valid) = self.resolve_struct(id, s);
            let def = &mut self.table.types[id.index()];
            def.valid &= valid;
            def.kind = TypeKind::Struct(info);
        }
    }

    fn resolve_struct(&mut self, id: TypeId, s: &StructDecl) -> (StructInfo, bool) {
        let mut info = StructInfo::default();
        let mut valid = true;

        for p in &s.properties {
            if let Some(first) = info.properties.iter().find(|q| q.name == p.name.node) {
                let first = first.span;
                self.duplicate("property", &p.name.node, p.name.span, first);
                continue;
            }
            let ty = self.resolve_ref(&p.ty);
            valid &= ty.is_some();
            info.properties.push(PropertyInfo {
                name: p.name.node.clone(),
                span: p.span,
                ty: ty.unwrap_or(Type::Unknown),
                capability: p.capability,
                visibility: p.visibility,
                has_default: p.default.is_some(),
            });
        }

        for c in &s.ctors {
            let (params, params_ok) =
                self.resolve_params(&c.params, Some((Capability::Varying, id)));
            let (error, error_ok) = self.resolve_optional(c.error.as_ref());
            let mut sig = Signature {
                name: s.name.node.clone(),
                span: c.span,
                params,
                has_receiver: true,
                ret: Some(Type::Named(id)),
                error,
                valid: params_ok && error_ok,
            };
            let shape: Vec<Type> = sig.explicit_params().iter().map(|p| p.ty).collect();
            let clash = info.ctors.iter().find(|other| {
                other.valid
                    && other.explicit_params().iter().map(|p| p.ty).eq(shape.iter().copied())
            });
            if let Some(other) = clash {
                let first = other.span;
                self.diags.push(
                    Diagnostic::new(
                        DiagnosticKind::DuplicateDeclaration,
                        c.span,
                        format!(
                            "a constructor of `{}` with the same parameter types already exists",
                            s.name.node
                        ),
                    )
                    .with_related(first, "first declared here"),
                );
                sig.valid = false;
            }
            info.ctors.push(sig);
        }

        for d in &s.dtors {
            let (params, mut ok) = self.resolve_params(&d.params, Some((Capability::Mutable, id)));
            let name = d.name.as_ref().map(|n| n.node.clone());
            match &d.name {
                None if !d.params.is_empty() => {
                    self.diags.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        d.span,
                        format!("the default destructor of `{}` takes no parameters", s.name.node),
                    ));
                    ok = false;
                }
                Some(n) => {
                    let clash = info
                        .dtors
                        .iter()
                        .find(|o| o.name.as_deref() == Some(n.node.as_str()))
                        .map(|o| o.span);
                    if let Some(first) = clash {
                        self.duplicate("destructor", &n.node, n.span, first);
                        ok = false;
                    }
                }
                None => {}
            }
            info.dtors.push(DestructorInfo {
                name: name.clone(),
                span: d.span,
                sig: Signature {
                    name: name.unwrap_or_else(|| s.name.node.clone()),
                    span: d.span,
                    params,
                    has_receiver: true,
                    ret: None,
                    error: None,
                    valid: ok,
                },
            });
        }

        for m in &s.methods {
            let first = info.methods.get(&m.name.node).map(|o| o.span).or_else(|| {
                info.dtors
                    .iter()
                    .find(|d| d.name.as_deref() == Some(m.name.node.as_str()))
                    .map(|d| d.span)
            });
            if let Some(first) = first {
                self.duplicate("member", &m.name.node, m.name.span, first);
                continue;
            }
            let (params, params_ok) =
                self.resolve_params(&m.params, Some((m.self_capability, id)));
            let (ret, ret_ok) = self.resolve_optional(m.ret.as_ref());
            let (error, error_ok) = self.resolve_optional(m.error.as_ref());
            info.methods.insert(
                m.name.node.clone(),
                Signature {
                    name: m.name.node.clone(),
                    span: m.span,
                    params,
                    has_receiver: true,
                    ret,
                    error,
                    valid: params_ok && ret_ok && error_ok,
                },
            );
        }

        info.default_ctor = match info
            .ctors
            .iter()
            .position(|c| c.valid && c.explicit_params().is_empty())
        {
            Some(i) => DefaultCtor::Explicit(i),
            None if info.properties.iter().all(|p| p.has_default) => DefaultCtor::Synthesized,
            None => DefaultCtor::Unavailable,
        };

        (info, valid)
    }

    fn resolve_functions(&mut self, program: &Program) {
        let mut seen: BTreeMap<String, Span> = BTreeMap::new();
        for (_, decl) in program.decls() {
            let Decl::Function(f) = decl else {
                continue;
            };
            let name = &f.name.node;
            if Type::primitive(name).is_some() {
                self.diags.push(Diagnostic::new(
                    DiagnosticKind::DuplicateDeclaration,
                    f.name.span,
                    format!("`{name}` is a built-in type and cannot name a function"),
                ));
                continue;
            }
            if let Some(id) = self.table.lookup_type(name) {
                let first = self.table.def(id).span;
                self.duplicate("name", name, f.name.span, first);
                continue;
            }
            if let Some(&first) = seen.get(name) {
                self.duplicate("function", name, f.name.span, first);
                continue;
            }
            seen.insert(name.clone(), f.span);

            let (params, params_ok) = self.resolve_params(&f.params, None);
            let (ret, ret_ok) = self.resolve_optional(f.ret.as_ref());
            let (error, error_ok) = self.resolve_optional(f.error.as_ref());
            self.table.functions.insert(
                name.clone(),
                Signature {
                    name: name.clone(),
                    span: f.span,
                    params,
                    has_receiver: false,
                    ret,
                    error,
                    valid: params_ok && ret_ok && error_ok,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use veld_ast::build::*;
    use veld_ast::Capability::*;

    use super::*;

    #[test]
    fn ids_follow_declaration_order() {
        let p = program(vec![
            module("a", vec![structure("A").build(), alias("B", "A")]),
            module("b", vec![union("C", &["A", "B"])]),
        ]);
        let (table, diags) = resolve(&p);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(table.lookup_type("A"), Some(TypeId(0)));
        assert_eq!(table.lookup_type("C"), Some(TypeId(2)));
        assert_eq!(table.def(TypeId(2)).module, "b");
    }

    #[test]
    fn receiver_is_injected_first() {
        let p = single(vec![structure("Counter")
            .prop(Mutable, "n", "Int")
            .method("bump", Varying, vec![param(Immutable, "by", "Int")], None, vec![])
            .build()]);
        let (table, _) = resolve(&p);
        let sig = table
            .method(Type::Named(TypeId(0)), "bump")
            .expect("method");
        assert_eq!(sig.params[0].name, SELF);
        assert_eq!(sig.params[0].capability, Varying);
        assert_eq!(sig.explicit_params().len(), 1);
    }

    #[test]
    fn unit_return_is_no_return() {
        let p = single(vec![function("f").ret("Unit").body(vec![])]);
        let (table, _) = resolve(&p);
        assert_eq!(table.functions["f"].ret, None);
    }
}
