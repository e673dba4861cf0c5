#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::Serialize;
use veld_ast::{Capability, Span, Visibility};

use crate::types::{Type, TypeId};

/// Everything type resolution learned about the program's declarations.
///
/// Built once by [`resolve_types`](crate::resolve_types), then shared
/// read-only by every checker (and every worker thread).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SymbolTable {
    pub types: Vec<TypeDef>,
    pub type_names: BTreeMap<String, TypeId>,
    pub functions: BTreeMap<String, Signature>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypeDef {
    pub id: TypeId,
    pub name: String,
    pub module: String,
    pub span: Span,
    /// Cleared when part of the declaration failed to resolve; bodies of an
    /// invalid declaration are not checked.
    pub valid: bool,
    pub kind: TypeKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TypeKind {
    Struct(StructInfo),
    Alias { base: Type },
    Union { variants: Vec<Type> },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StructInfo {
    pub properties: Vec<PropertyInfo>,
    /// One entry per declared constructor, in declaration order.
    pub ctors: Vec<Signature>,
    /// One entry per declared destructor, in declaration order.
    pub dtors: Vec<DestructorInfo>,
    pub methods: BTreeMap<String, Signature>,
    pub default_ctor: DefaultCtor,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PropertyInfo {
    pub name: String,
    pub span: Span,
    pub ty: Type,
    pub capability: Capability,
    pub visibility: Visibility,
    pub has_default: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DestructorInfo {
    /// `None` for the default destructor.
    pub name: Option<String>,
    pub span: Span,
    pub sig: Signature,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultCtor {
    /// Index into [`StructInfo::ctors`] of the zero-parameter constructor.
    Explicit(usize),
    /// Every property has a default value.
    Synthesized,
    #[default]
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    pub ty: Type,
    pub capability: Capability,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Signature {
    pub name: String,
    pub span: Span,
    /// Includes the injected `self` at position 0 when `has_receiver`.
    pub params: Vec<ParamInfo>,
    pub has_receiver: bool,
    pub ret: Option<Type>,
    pub error: Option<Type>,
    pub valid: bool,
}

impl Signature {
    /// Parameters the caller passes arguments for.
    pub fn explicit_params(&self) -> &[ParamInfo] {
        if self.has_receiver && !self.params.is_empty() {
            &self.params[1..]
        } else {
            &self.params
        }
    }

    pub fn receiver(&self) -> Option<&ParamInfo> {
        if self.has_receiver {
            self.params.first()
        } else {
            None
        }
    }
}

/// How instances of a struct are destroyed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructorPolicy {
    /// A default destructor (declared or synthesized) fires at scope exit
    /// and on rebinding.
    Automatic,
    /// Every binding must be released through one of these destructors.
    Explicit { destructors: Vec<String> },
}

impl SymbolTable {
    pub fn def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Resolves a type name to a primitive or a declared type.
    pub fn resolve_name(&self, name: &str) -> Option<Type> {
        Type::primitive(name).or_else(|| self.lookup_type(name).map(Type::Named))
    }

    pub fn display(&self, ty: Type) -> String {
        match ty {
            Type::Unknown => "<unknown>".to_string(),
            Type::Unit => "Unit".to_string(),
            Type::Int => "Int".to_string(),
            Type::Float => "Float".to_string(),
            Type::Bool => "Bool".to_string(),
            Type::String => "String".to_string(),
            Type::Named(id) => self.def(id).name.clone(),
        }
    }

    /// `ty`, its base, its base's base, and so on. Stops at a repeated type
    /// so cyclic aliases terminate.
    pub fn alias_chain(&self, ty: Type) -> Vec<Type> {
        let mut chain = vec![ty];
        let mut cur = ty;
        while let Type::Named(id) = cur {
            let TypeKind::Alias { base } = self.def(id).kind else {
                break;
            };
            if chain.contains(&base) {
                break;
            }
            chain.push(base);
            cur = base;
        }
        chain
    }

    /// The first non-alias type reached by following alias bases.
    pub fn unalias(&self, ty: Type) -> Type {
        let chain = self.alias_chain(ty);
        match chain.last() {
            Some(&Type::Named(id)) if matches!(self.def(id).kind, TypeKind::Alias { .. }) => {
                Type::Unknown
            }
            Some(&last) => last,
            None => ty,
        }
    }

    pub fn struct_info(&self, ty: Type) -> Option<(TypeId, &StructInfo)> {
        let id = self.unalias(ty).as_named()?;
        match &self.def(id).kind {
            TypeKind::Struct(info) => Some((id, info)),
            _ => None,
        }
    }

    pub fn union_variants(&self, ty: Type) -> Option<&[Type]> {
        let id = self.unalias(ty).as_named()?;
        match &self.def(id).kind {
            TypeKind::Union { variants } => Some(variants),
            _ => None,
        }
    }

    pub fn is_union(&self, ty: Type) -> bool {
        self.union_variants(ty).is_some()
    }

    /// Whether a value of `source` may flow into a `target` slot without an
    /// explicit conversion: identical types, alias to base (transitively), or
    /// a variant into a union that contains it.
    pub fn is_assignable(&self, source: Type, target: Type) -> bool {
        self.assignable_within(source, target, self.types.len() + 1)
    }

    fn assignable_within(&self, source: Type, target: Type, depth: usize) -> bool {
        if source.is_unknown() || target.is_unknown() {
            return true;
        }
        if self.alias_chain(source).contains(&target) {
            return true;
        }
        if depth == 0 {
            return false;
        }
        let Some(id) = target.as_named() else {
            return false;
        };
        match &self.def(id).kind {
            TypeKind::Union { variants } => variants
                .iter()
                .any(|v| self.assignable_within(source, *v, depth - 1)),
            _ => false,
        }
    }

    /// Explicit conversions: identical types, or anywhere along one alias
    /// chain in either direction.
    pub fn is_convertible(&self, from: Type, to: Type) -> bool {
        from.is_unknown()
            || to.is_unknown()
            || self.alias_chain(from).contains(&to)
            || self.alias_chain(to).contains(&from)
    }

    /// Whether `a` and `b` are the same type seen through aliases, without
    /// being identical.
    pub fn alias_related(&self, a: Type, b: Type) -> bool {
        a != b && self.is_convertible(a, b)
    }

    pub fn property(&self, ty: Type, name: &str) -> Option<(TypeId, &PropertyInfo)> {
        let (id, info) = self.struct_info(ty)?;
        info.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| (id, p))
    }

    pub fn method(&self, ty: Type, name: &str) -> Option<&Signature> {
        let (_, info) = self.struct_info(ty)?;
        info.methods.get(name)
    }

    pub fn custom_destructor(&self, ty: Type, name: &str) -> Option<&DestructorInfo> {
        let (_, info) = self.struct_info(ty)?;
        info.dtors
            .iter()
            .find(|d| d.name.as_deref() == Some(name))
    }

    pub fn destructor_policy(&self, id: TypeId) -> Option<DestructorPolicy> {
        let TypeKind::Struct(info) = &self.def(id).kind else {
            return None;
        };
        let has_default = info.dtors.iter().any(|d| d.name.is_none());
        let custom: Vec<String> = info.dtors.iter().filter_map(|d| d.name.clone()).collect();
        if has_default || custom.is_empty() {
            Some(DestructorPolicy::Automatic)
        } else {
            Some(DestructorPolicy::Explicit {
                destructors: custom,
            })
        }
    }

    /// Bindings of this type must be released by an explicit destructor call.
    pub fn has_destruction_obligation(&self, ty: Type) -> bool {
        match self.struct_info(ty) {
            Some((id, _)) => matches!(
                self.destructor_policy(id),
                Some(DestructorPolicy::Explicit { .. })
            ),
            None => false,
        }
    }
}
