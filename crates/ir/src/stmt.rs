//! Statements carried by basic blocks.
//!
//! No control flow lives inside a statement: branching is expressed by
//! block edges and their guards. `MemberAssign` is transient — the
//! flattener rewrites it to a plain `Assign` on the backing member local.

use crate::expr::Expr;
use crate::pred::Pred;

/// A straight-line statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `target := value`. Also used for ghost snapshot assignments
    /// materialized by the annotation binder.
    Assign { target: String, value: Expr },
    /// `array[index] := value`.
    ArrayAssign {
        array: String,
        index: Expr,
        value: Expr,
    },
    /// `target.field := value`; erased by the flattener.
    MemberAssign {
        target: String,
        field: String,
        value: Expr,
    },
    /// Path assumption, e.g. a branch guard.
    Assume(Pred),
    /// In-code assertion to be discharged by the prover.
    Assert(Pred),
    /// Function call in statement position. `results` binds the callee's
    /// return values in order; empty for void calls.
    Call {
        callee: String,
        args: Vec<Expr>,
        results: Vec<String>,
    },
}
