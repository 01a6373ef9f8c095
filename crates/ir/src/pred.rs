//! Logical predicates.
//!
//! Predicates denote truth values: assertion clauses, loop invariants, and
//! edge guards are all predicates. Boolean constants and connectives are
//! formers of this tree only — a predicate can never appear where an
//! executable expression or a term is required, by construction.

use crate::term::Term;
use crate::var::QuantifiedVar;

/// Relational operators between terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Forall,
    Exists,
}

/// A predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Pred {
    True,
    False,
    /// A Bool-typed term (program variable, pure bool call, or quantified
    /// bool binder) lifted into the predicate language.
    Atom(Term),
    /// A single relational comparison. Chained source comparisons
    /// (`a < b < c`) are desugared to a conjunction during lowering.
    Cmp { op: RelOp, lhs: Term, rhs: Term },
    /// Application of a named predicate.
    App { callee: String, args: Vec<Term> },
    Not(Box<Pred>),
    And(Vec<Pred>),
    Or(Vec<Pred>),
    Implies(Box<Pred>, Box<Pred>),
    Iff(Box<Pred>, Box<Pred>),
    Xor(Box<Pred>, Box<Pred>),
    /// `\old(p)`; rewritten away by the annotation binder.
    Old(Box<Pred>),
    Quant {
        q: Quantifier,
        binders: Vec<QuantifiedVar>,
        body: Box<Pred>,
    },
}

impl Pred {
    /// Conjunction of a clause list: empty becomes `\true`, a single
    /// clause stays bare. `\true` conjuncts are preserved, not absorbed.
    pub fn conjoin(mut preds: Vec<Pred>) -> Pred {
        match preds.len() {
            0 => Pred::True,
            1 => preds.remove(0),
            _ => Pred::And(preds),
        }
    }

    pub fn negate(self) -> Pred {
        Pred::Not(Box::new(self))
    }

    /// Whether any `\old` marker occurs in this predicate or its terms.
    pub fn mentions_old(&self) -> bool {
        match self {
            Pred::True | Pred::False => false,
            Pred::Old(_) => true,
            Pred::Atom(t) => t.mentions_old(),
            Pred::Cmp { lhs, rhs, .. } => lhs.mentions_old() || rhs.mentions_old(),
            Pred::App { args, .. } => args.iter().any(Term::mentions_old),
            Pred::Not(p) => p.mentions_old(),
            Pred::And(ps) | Pred::Or(ps) => ps.iter().any(Pred::mentions_old),
            Pred::Implies(l, r) | Pred::Iff(l, r) | Pred::Xor(l, r) => {
                l.mentions_old() || r.mentions_old()
            }
            Pred::Quant { body, .. } => body.mentions_old(),
        }
    }
}
