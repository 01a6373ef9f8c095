//! Executable expressions.
//!
//! One of the three disjoint expression universes (see also [`crate::term`]
//! and [`crate::pred`]). Executable expressions appear on the right-hand
//! side of assignments and as call arguments. They may read variables,
//! subscript arrays, read struct members, and call user functions; they
//! never mention `\result`, `\old`, `\length`, or quantifiers — those are
//! not constructible in this tree.

use crate::types::{BOOL, FLOAT, INT, TypeId};

/// Unary operators on executable expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation (`-e`), int or float.
    Neg,
    /// Boolean negation (`!e`).
    Not,
}

/// Binary operators on executable expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Remainder; int only.
    Rem,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Rem)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// An executable expression. Every node carries its type.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Variable read. Struct-typed reads survive only until the flattener
    /// (whole-struct values occur as call arguments).
    Var { name: String, ty: TypeId },
    /// Struct member read; erased by the flattener.
    Member {
        /// Unique name of the struct variable being read.
        base: String,
        field: String,
        ty: TypeId,
    },
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    /// Call to a user function with exactly one return value.
    Call {
        callee: String,
        args: Vec<Expr>,
        ty: TypeId,
    },
    Subscript {
        array: Box<Expr>,
        index: Box<Expr>,
        ty: TypeId,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        ty: TypeId,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: TypeId,
    },
}

impl Expr {
    pub fn ty(&self) -> TypeId {
        match self {
            Expr::Var { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::Subscript { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Binary { ty, .. } => *ty,
            Expr::IntLit(_) => INT,
            Expr::FloatLit(_) => FLOAT,
            Expr::BoolLit(_) => BOOL,
        }
    }
}
