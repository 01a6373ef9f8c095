//! User-visible front-end errors.
//!
//! Every error carries the source span it was detected at. Lowering halts
//! on the first error inside a definition and discards the partial result;
//! later definitions are still processed (see `Config::fail_fast`).

use std::fmt;

use crate::ast::Span;

/// Classification of front-end failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A top-level name collides with an existing function/struct/
    /// predicate, or a local shadows within the same scope.
    DuplicateName { name: String },
    /// Reference to an undeclared identifier.
    UnknownName { name: String },
    /// Wrong type, wrong arity, or an operator applied to unsupported
    /// operands.
    TypeMismatch { expected: String, got: String },
    /// Non-void function with a reachable non-returning path.
    MissingReturn { function: String },
    /// `return e;` in a void function.
    ReturnInVoid,
    /// Bare `return;` in a non-void function.
    ReturnMissingValue,
    /// Ranking-function cardinality differs between the contract and a
    /// loop head.
    InconsistentRankings {
        function: String,
        expected: usize,
        got: usize,
    },
    /// `\result` of a struct return used without a member selector.
    AmbiguousResult,
    /// An annotation construct used where it is not allowed (`\old`
    /// outside a postcondition/invariant, a quantifier in executable
    /// code, a function call in predicate position, ...).
    IllegalAnnotationForm { reason: String },
    /// A front-end bug; never expected.
    InternalInvariant { reason: String },
}

/// A front-end error with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub span: Span,
}

impl Error {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn duplicate_name(name: impl Into<String>, span: Span) -> Self {
        Self::new(
            ErrorKind::DuplicateName { name: name.into() },
            span,
        )
    }

    pub fn unknown_name(name: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::UnknownName { name: name.into() }, span)
    }

    pub fn type_mismatch(
        expected: impl Into<String>,
        got: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::new(
            ErrorKind::TypeMismatch {
                expected: expected.into(),
                got: got.into(),
            },
            span,
        )
    }

    pub fn illegal_annotation(reason: impl Into<String>, span: Span) -> Self {
        Self::new(
            ErrorKind::IllegalAnnotationForm {
                reason: reason.into(),
            },
            span,
        )
    }

    pub fn internal(reason: impl Into<String>, span: Span) -> Self {
        Self::new(
            ErrorKind::InternalInvariant {
                reason: reason.into(),
            },
            span,
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::DuplicateName { name } => {
                write!(f, "duplicate name `{name}`")
            }
            ErrorKind::UnknownName { name } => {
                write!(f, "unknown name `{name}`")
            }
            ErrorKind::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {expected}, got {got}")
            }
            ErrorKind::MissingReturn { function } => {
                write!(f, "function `{function}` may reach its end without returning")
            }
            ErrorKind::ReturnInVoid => {
                write!(f, "`return` with a value in a void function")
            }
            ErrorKind::ReturnMissingValue => {
                write!(f, "`return` without a value in a non-void function")
            }
            ErrorKind::InconsistentRankings {
                function,
                expected,
                got,
            } => write!(
                f,
                "function `{function}` has {expected} ranking component(s) in its contract \
                 but a loop head carries {got}"
            ),
            ErrorKind::AmbiguousResult => {
                write!(f, "`\\result` of a struct return requires a member selector")
            }
            ErrorKind::IllegalAnnotationForm { reason } => {
                write!(f, "illegal annotation form: {reason}")
            }
            ErrorKind::InternalInvariant { reason } => {
                write!(f, "internal invariant violated: {reason}")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span == Span::default() {
            write!(f, "{}", self.kind)
        } else {
            write!(
                f,
                "{}:{}: {}",
                self.span.start_line, self.span.start_col, self.kind
            )
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_duplicate_name() {
        let err = Error::duplicate_name("abs", Span::default());
        assert_eq!(err.to_string(), "duplicate name `abs`");
    }

    #[test]
    fn display_with_location() {
        let err = Error::unknown_name("i", Span::point(4, 12));
        assert_eq!(err.to_string(), "4:12: unknown name `i`");
    }

    #[test]
    fn display_type_mismatch() {
        let err = Error::type_mismatch("int", "bool", Span::default());
        assert_eq!(err.to_string(), "type mismatch: expected int, got bool");
    }

    #[test]
    fn display_inconsistent_rankings() {
        let err = Error::new(
            ErrorKind::InconsistentRankings {
                function: "scan".to_string(),
                expected: 1,
                got: 0,
            },
            Span::default(),
        );
        assert_eq!(
            err.to_string(),
            "function `scan` has 1 ranking component(s) in its contract but a loop head carries 0"
        );
    }

    #[test]
    fn error_equality() {
        let a = Error::unknown_name("x", Span::default());
        let b = Error::unknown_name("x", Span::default());
        let c = Error::unknown_name("y", Span::default());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
