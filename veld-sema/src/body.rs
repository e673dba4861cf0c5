#![forbid(unsafe_code)]

use rayon::prelude::*;
use veld_ast::{Block, Decl, Program, Span};

use crate::diagnostics::Diagnostic;
use crate::resolve::type_of_decl;
use crate::symbols::{Signature, SymbolTable, TypeKind};
use crate::types::TypeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Function,
    Method,
    Constructor(usize),
    Destructor,
}

/// One checkable body together with its resolved signature.
#[derive(Clone, Debug)]
pub struct BodyRef<'a> {
    pub module: &'a str,
    pub kind: BodyKind,
    pub owner: Option<TypeId>,
    pub sig: &'a Signature,
    pub body: &'a Block,
    /// `f`, `Foo::bar`, `Foo::new`
    pub name: String,
    pub span: Span,
}

impl BodyRef<'_> {
    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, BodyKind::Constructor(_))
    }
}

/// Every body whose declaration resolved cleanly, in source order.
pub fn bodies<'a>(program: &'a Program, table: &'a SymbolTable) -> Vec<BodyRef<'a>> {
    let mut out = Vec::new();
    for (module, decl) in program.decls() {
        match decl {
            Decl::Function(f) => {
                let Some(sig) = table.functions.get(&f.name.node) else {
                    continue;
                };
                if sig.span != f.span || !sig.valid {
                    continue;
                }
                out.push(BodyRef {
                    module,
                    kind: BodyKind::Function,
                    owner: None,
                    sig,
                    body: &f.body,
                    name: f.name.node.clone(),
                    span: f.span,
                });
            }
            Decl::Struct(s) => {
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
                let ty = &def.name;
                for (i, (c, sig)) in s.ctors.iter().zip(&info.ctors).enumerate() {
                    if sig.valid {
                        out.push(BodyRef {
                            module,
                            kind: BodyKind::Constructor(i),
                            owner: Some(id),
                            sig,
                            body: &c.body,
                            name: format!("{ty}::new"),
                            span: c.span,
                        });
                    }
                }
                for (d, dtor) in s.dtors.iter().zip(&info.dtors) {
                    if dtor.sig.valid {
                        let name = dtor.name.as_deref().unwrap_or("drop");
                        out.push(BodyRef {
                            module,
                            kind: BodyKind::Destructor,
                            owner: Some(id),
                            sig: &dtor.sig,
                            body: &d.body,
                            name: format!("{ty}::{name}"),
                            span: d.span,
                        });
                    }
                }
                for m in &s.methods {
                    let Some(sig) = info.methods.get(&m.name.node) else {
                        continue;
                    };
                    if sig.span == m.span && sig.valid {
                        out.push(BodyRef {
                            module,
                            kind: BodyKind::Method,
                            owner: Some(id),
                            sig,
                            body: &m.body,
                            name: format!("{ty}::{}", m.name.node),
                            span: m.span,
                        });
                    }
                }
            }
            Decl::Alias(_) | Decl::Union(_) => {}
        }
    }
    out
}

/// Runs `check` over every item, on the current rayon pool when `parallel`
/// is set. Output order follows input order either way.
pub fn check_each<T, F>(items: &[T], parallel: bool, check: F) -> Vec<Diagnostic>
where
    T: Sync,
    F: Fn(&T) -> Vec<Diagnostic> + Sync + Send,
{
    if parallel {
        items
            .par_iter()
            .map(&check)
            .collect::<Vec<Vec<Diagnostic>>>()
            .into_iter()
            .flatten()
            .collect()
    } else {
        items.iter().flat_map(check).collect()
    }
}
