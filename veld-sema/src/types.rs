#![forbid(unsafe_code)]

use serde::Serialize;

/// Index of a user-defined type in the [`SymbolTable`](crate::SymbolTable).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A resolved type. User-defined types are nominal and referenced by id;
/// two distinct ids are distinct types even when their shapes agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Type {
    /// Produced after an earlier error; compatible with everything so one
    /// mistake does not cascade.
    Unknown,
    Unit,
    Int,
    Float,
    Bool,
    String,
    Named(TypeId),
}

pub const PRIMITIVES: [(&str, Type); 5] = [
    ("Unit", Type::Unit),
    ("Int", Type::Int),
    ("Float", Type::Float),
    ("Bool", Type::Bool),
    ("String", Type::String),
];

impl Type {
    pub fn primitive(name: &str) -> Option<Type> {
        PRIMITIVES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
    }

    pub fn is_unknown(self) -> bool {
        self == Type::Unknown
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn as_named(self) -> Option<TypeId> {
        match self {
            Type::Named(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names_resolve() {
        assert_eq!(Type::primitive("Int"), Some(Type::Int));
        assert_eq!(Type::primitive("Unit"), Some(Type::Unit));
        assert_eq!(Type::primitive("int"), None);
    }
}
