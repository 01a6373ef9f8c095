//! Basic paths: the records streamed to the SMT backend.

use crate::block::BlockId;
use crate::pred::Pred;
use crate::stmt::Statement;
use crate::term::Term;

/// A loop-free trace between two cut blocks, reducible to a single
/// verification condition: `head_condition ∧ wp(statements) ⇒
/// tail_condition`, plus a termination condition `tail_rankings ≺
/// head_rankings` (lexicographic) when the path closes a loop and ranking
/// functions are present.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicPath {
    pub head: BlockId,
    pub tail: BlockId,
    /// Conjunction of the head cut block's assertions.
    pub head_condition: Pred,
    pub head_rankings: Vec<Term>,
    /// Interior statements: head snapshots, then the interior basic
    /// blocks' statements interleaved with the chosen edge guards as
    /// assumptions.
    pub statements: Vec<Statement>,
    /// Conjunction of the tail cut block's assertions.
    pub tail_condition: Pred,
    pub tail_rankings: Vec<Term>,
}

impl BasicPath {
    /// Whether the consumer must emit a strict-decrease check for this
    /// path. True exactly for ranked paths that return to their own head.
    pub fn needs_termination_check(&self) -> bool {
        self.head == self.tail && !self.head_rankings.is_empty()
    }
}
