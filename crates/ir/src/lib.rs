//! Intermediate representation for the Imp deductive verifier.
//!
//! This crate is pure data: the typed, struct-free, control-flow-graph IR
//! that the front end produces and the SMT backend consumes. It has three
//! deliberately disjoint expression universes — executable expressions,
//! logical terms, and predicates — so that a node of one language can
//! never appear where another is required.
//!
//! The front end crate (`imp-fv-frontend`) builds these structures;
//! nothing here performs lowering or checking.

pub mod block;
pub mod expr;
pub mod path;
pub mod pred;
pub mod program;
pub mod stmt;
pub mod term;
pub mod types;
pub mod var;

pub use block::{Block, BlockId, BlockKind, Cfg, Edge};
pub use expr::{BinOp, Expr, UnOp};
pub use path::BasicPath;
pub use pred::{Pred, Quantifier, RelOp};
pub use program::{Function, Predicate, Program};
pub use stmt::Statement;
pub use term::{Term, TermBinOp};
pub use types::{ArrayLength, AtomicType, Type, TypeId, TypeTable};
pub use var::{LocalVar, LogicalSort, QuantifiedVar, StructVar, Variable};
