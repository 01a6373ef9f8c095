//! The lowered program handed to the SMT backend.

use crate::block::Cfg;
use crate::pred::Pred;
use crate::types::{TypeId, TypeTable};
use crate::var::Variable;

/// A fully lowered function. After the flattener has run, every parameter,
/// return, and local slot is scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Variable>,
    /// Return slots; empty for void functions. A struct return occupies
    /// one slot before flattening and one slot per member afterwards.
    pub returns: Vec<Variable>,
    pub locals: Vec<Variable>,
    /// The function type; recomputed by the flattener.
    pub ty: TypeId,
    pub body: Cfg,
}

impl Function {
    /// Whether any slot still has struct type. False once the flattener
    /// has run.
    pub fn has_struct_slots(&self) -> bool {
        self.params
            .iter()
            .chain(self.returns.iter())
            .chain(self.locals.iter())
            .any(|v| matches!(v, Variable::Struct(_)))
    }
}

/// A named logical relation with a predicate body.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub name: String,
    pub params: Vec<Variable>,
    /// The predicate type; recomputed by the flattener.
    pub ty: TypeId,
    pub body: Pred,
}

/// The IR for a whole translation unit, in definition order. Struct
/// definitions survive only inside the type table, for diagnostics.
#[derive(Debug, Clone)]
pub struct Program {
    pub functions: Vec<Function>,
    pub predicates: Vec<Predicate>,
    pub types: TypeTable,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn predicate(&self, name: &str) -> Option<&Predicate> {
        self.predicates.iter().find(|p| p.name == name)
    }
}
