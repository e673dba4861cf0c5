#![forbid(unsafe_code)]

use std::fmt;

use miette::LabeledSpan;
use serde::Serialize;
use thiserror::Error;
use veld_ast::{Capability, Span};

/// The rule a diagnostic reports a violation of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DiagnosticKind {
    // Mutability lattice
    CapabilityViolation,

    // Error channel
    UnhandledError,
    UnhandledErrorPropagation,
    InvalidErrorOperator,

    // Type identity & conversion
    TypeMismatch,
    NonExhaustiveUnion,
    UnresolvedType,
    DuplicateDeclaration,
    CyclicAlias,
    UnknownName,
    PrivateAccess,
    InvalidAssignmentTarget,
    UnionAccessWithoutNarrowing,
    AmbiguousVariantPattern,
    UnreachableArm,
    MisplacedJump,

    // Lifecycle
    UninitializedPropertyAccess,
    IncompleteConstruction,
    RecursiveConstructionViolation,
    MultipleDefaultDestructors,
    MissingDestructorInvocation,
    UseAfterDestruction,
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::CapabilityViolation => "CapabilityViolation",
            DiagnosticKind::UnhandledError => "UnhandledError",
            DiagnosticKind::UnhandledErrorPropagation => "UnhandledErrorPropagation",
            DiagnosticKind::InvalidErrorOperator => "InvalidErrorOperator",
            DiagnosticKind::TypeMismatch => "TypeMismatch",
            DiagnosticKind::NonExhaustiveUnion => "NonExhaustiveUnion",
            DiagnosticKind::UnresolvedType => "UnresolvedType",
            DiagnosticKind::DuplicateDeclaration => "DuplicateDeclaration",
            DiagnosticKind::CyclicAlias => "CyclicAlias",
            DiagnosticKind::UnknownName => "UnknownName",
            DiagnosticKind::PrivateAccess => "PrivateAccess",
            DiagnosticKind::InvalidAssignmentTarget => "InvalidAssignmentTarget",
            DiagnosticKind::UnionAccessWithoutNarrowing => "UnionAccessWithoutNarrowing",
            DiagnosticKind::AmbiguousVariantPattern => "AmbiguousVariantPattern",
            DiagnosticKind::UnreachableArm => "UnreachableArm",
            DiagnosticKind::MisplacedJump => "MisplacedJump",
            DiagnosticKind::UninitializedPropertyAccess => "UninitializedPropertyAccess",
            DiagnosticKind::IncompleteConstruction => "IncompleteConstruction",
            DiagnosticKind::RecursiveConstructionViolation => "RecursiveConstructionViolation",
            DiagnosticKind::MultipleDefaultDestructors => "MultipleDefaultDestructors",
            DiagnosticKind::MissingDestructorInvocation => "MissingDestructorInvocation",
            DiagnosticKind::UseAfterDestruction => "UseAfterDestruction",
        }
    }

    /// Stable snake_case code, rendered as `veld::<code>`.
    pub fn code(&self) -> String {
        let mut out = String::new();
        for (i, ch) in self.name().chars().enumerate() {
            if ch.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(ch.to_ascii_lowercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binding (or access path), the level an operation needed, and the level
/// the path actually grants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CapabilityMismatch {
    pub binding: String,
    pub required: Capability,
    pub granted: Capability,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Related {
    pub span: Span,
    pub message: String,
}

/// A rejected program fragment. Every diagnostic blocks acceptance of the
/// compilation unit; there are no warnings at this layer.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Related>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<CapabilityMismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            span,
            related: Vec::new(),
            capability: None,
            help: None,
        }
    }

    pub fn capability(
        binding: impl Into<String>,
        required: Capability,
        granted: Capability,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        let binding = binding.into();
        let mut d = Diagnostic::new(DiagnosticKind::CapabilityViolation, span, message);
        d.help = Some(format!(
            "`{binding}` is {granted} here; this operation needs a {required} access path"
        ));
        d.capability = Some(CapabilityMismatch {
            binding,
            required,
            granted,
        });
        d
    }

    pub fn with_related(mut self, span: Span, message: impl Into<String>) -> Self {
        self.related.push(Related {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl miette::Diagnostic for Diagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("veld::{}", self.kind.code())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn fmt::Display + 'a>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let primary = LabeledSpan::new_with_span(Some(self.kind.name().to_string()), self.span);
        let related = self
            .related
            .iter()
            .map(|r| LabeledSpan::new_with_span(Some(r.message.clone()), r.span));
        Some(Box::new(std::iter::once(primary).chain(related)))
    }
}

/// Orders diagnostics by location, then rule, and drops exact duplicates.
pub fn normalize(diags: &mut Vec<Diagnostic>) {
    diags.sort_by(|a, b| {
        (a.span, a.kind, &a.message).cmp(&(b.span, b.kind, &b.message))
    });
    diags.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(
            DiagnosticKind::CapabilityViolation.code(),
            "capability_violation"
        );
        assert_eq!(
            DiagnosticKind::UnhandledErrorPropagation.code(),
            "unhandled_error_propagation"
        );
    }

    #[test]
    fn capability_diagnostic_names_levels() {
        let d = Diagnostic::capability(
            "p.name",
            Capability::Varying,
            Capability::Immutable,
            Span::new(4, 2),
            "cannot mutate",
        );
        let cap = d.capability.expect("capability detail");
        assert_eq!(cap.binding, "p.name");
        assert_eq!(cap.required, Capability::Varying);
        assert_eq!(cap.granted, Capability::Immutable);
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let a = Diagnostic::new(DiagnosticKind::TypeMismatch, Span::new(9, 1), "b");
        let b = Diagnostic::new(DiagnosticKind::TypeMismatch, Span::new(2, 1), "a");
        let mut v = vec![a.clone(), b.clone(), a];
        normalize(&mut v);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].span.offset, 2);
    }
}
