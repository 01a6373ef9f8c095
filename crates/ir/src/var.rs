//! Variables of the IR.
//!
//! Every defining occurrence in a function is α-renamed
//! (`<source>@<counter>`) so names are unique function-wide; the original
//! source spelling is preserved for diagnostics. Struct variables are
//! transient: the flattener erases them, leaving only their scalar members.

use crate::types::{BOOL, FLOAT, INT, TypeId};

/// A scalar (or array) variable with a unique α-renamed name.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    /// Unique name within the enclosing function, e.g. `i@3`.
    pub name: String,
    /// User-visible spelling, preserved for diagnostics.
    pub source_name: String,
    pub ty: TypeId,
}

impl LocalVar {
    pub fn new(name: impl Into<String>, source_name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            source_name: source_name.into(),
            ty,
        }
    }
}

/// A struct-typed variable and the scalar members backing it.
///
/// Member locals are the real storage: member reads/writes resolve to them
/// when the flattener runs, and the struct variable itself disappears.
#[derive(Debug, Clone, PartialEq)]
pub struct StructVar {
    /// Unique name within the enclosing function, e.g. `p@1`.
    pub name: String,
    pub source_name: String,
    /// The struct type.
    pub ty: TypeId,
    /// Members in struct declaration order, each backed by a scalar local.
    pub members: Vec<(String, LocalVar)>,
}

impl StructVar {
    pub fn member(&self, field: &str) -> Option<&LocalVar> {
        self.members.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }
}

/// A parameter, return, or local slot. All slots are `Local` after the
/// flattener has run.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Local(LocalVar),
    Struct(StructVar),
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::Local(v) => &v.name,
            Variable::Struct(v) => &v.name,
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            Variable::Local(v) => &v.source_name,
            Variable::Struct(v) => &v.source_name,
        }
    }

    pub fn ty(&self) -> TypeId {
        match self {
            Variable::Local(v) => v.ty,
            Variable::Struct(v) => v.ty,
        }
    }

    pub fn as_local(&self) -> Option<&LocalVar> {
        match self {
            Variable::Local(v) => Some(v),
            Variable::Struct(_) => None,
        }
    }
}

/// Sorts available to quantifier binders in the predicate language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalSort {
    Bool,
    Int,
    Real,
}

impl LogicalSort {
    /// The source type a binder of this sort unifies with in terms.
    pub fn ty(self) -> TypeId {
        match self {
            LogicalSort::Bool => BOOL,
            LogicalSort::Int => INT,
            LogicalSort::Real => FLOAT,
        }
    }
}

/// A quantifier-bound variable; appears only inside predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantifiedVar {
    /// Unique α-renamed name, e.g. `k@7`.
    pub name: String,
    pub source_name: String,
    pub sort: LogicalSort,
}
