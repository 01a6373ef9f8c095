//! The control-flow graph.
//!
//! Blocks live in an arena ([`Cfg::blocks`]) and reference each other by
//! stable [`BlockId`] handles; each block carries explicit predecessor and
//! successor lists, so back-edges and join fan-in are plain data. Edges
//! carry the branch assumption chosen along them, if any.
//!
//! Cut blocks are the precondition, the postcondition, and every loop
//! head. Between two consecutive cut blocks along any path only basic
//! blocks appear; the basic-path extractor relies on this.

use crate::pred::Pred;
use crate::stmt::Statement;
use crate::term::Term;

/// Index into [`Cfg::blocks`].
pub type BlockId = usize;

/// A directed CFG edge with an optional branch guard.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: BlockId,
    /// The assumption made by taking this edge (branch condition or its
    /// negation); `None` for unconditional edges.
    pub guard: Option<Pred>,
}

/// Payload of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// Unique function entry; no predecessors.
    Precondition {
        assertions: Vec<Pred>,
        rankings: Vec<Term>,
        /// Ghost snapshot assignments (`x_old := x`) materialized by the
        /// annotation binder; prepended to every path leaving this block.
        snapshots: Vec<Statement>,
    },
    /// Unique function exit; no successors. References the return
    /// variables.
    Postcondition { assertions: Vec<Pred> },
    /// Inserted at every loop construct before the first test.
    LoopHead {
        invariants: Vec<Pred>,
        rankings: Vec<Term>,
        snapshots: Vec<Statement>,
    },
    /// Straight-line code.
    Basic { statements: Vec<Statement> },
}

/// A block: payload plus adjacency.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub preds: Vec<BlockId>,
    pub succs: Vec<Edge>,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// Whether this block is a cut point for basic-path extraction.
    pub fn is_cut(&self) -> bool {
        !matches!(self.kind, BlockKind::Basic { .. })
    }

    /// Assertions attached to a cut block: precondition clauses, loop
    /// invariants, or postcondition clauses. Empty for basic blocks.
    pub fn assertions(&self) -> &[Pred] {
        match &self.kind {
            BlockKind::Precondition { assertions, .. }
            | BlockKind::Postcondition { assertions } => assertions,
            BlockKind::LoopHead { invariants, .. } => invariants,
            BlockKind::Basic { .. } => &[],
        }
    }

    /// Ranking-function terms attached to a cut block. The postcondition
    /// carries none.
    pub fn rankings(&self) -> &[Term] {
        match &self.kind {
            BlockKind::Precondition { rankings, .. }
            | BlockKind::LoopHead { rankings, .. } => rankings,
            _ => &[],
        }
    }

    /// Ghost snapshot statements of a cut block.
    pub fn snapshots(&self) -> &[Statement] {
        match &self.kind {
            BlockKind::Precondition { snapshots, .. }
            | BlockKind::LoopHead { snapshots, .. } => snapshots,
            _ => &[],
        }
    }

    pub fn statements(&self) -> &[Statement] {
        match &self.kind {
            BlockKind::Basic { statements } => statements,
            _ => &[],
        }
    }
}

/// A function body: block arena rooted at the precondition block.
#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    pub blocks: Vec<Block>,
    /// The precondition block.
    pub entry: BlockId,
    /// The postcondition block.
    pub exit: BlockId,
}

impl Cfg {
    /// Create a CFG containing only the entry and exit cut blocks.
    pub fn new() -> Self {
        let mut cfg = Self {
            blocks: Vec::new(),
            entry: 0,
            exit: 0,
        };
        cfg.entry = cfg.push(BlockKind::Precondition {
            assertions: Vec::new(),
            rankings: Vec::new(),
            snapshots: Vec::new(),
        });
        cfg.exit = cfg.push(BlockKind::Postcondition {
            assertions: Vec::new(),
        });
        cfg
    }

    pub fn push(&mut self, kind: BlockKind) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block::new(kind));
        id
    }

    pub fn push_basic(&mut self) -> BlockId {
        self.push(BlockKind::Basic {
            statements: Vec::new(),
        })
    }

    /// Add an edge, maintaining both adjacency lists.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, guard: Option<Pred>) {
        self.blocks[from].succs.push(Edge { target: to, guard });
        self.blocks[to].preds.push(from);
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    /// Ids of all cut blocks, in arena order.
    pub fn cut_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_cut())
            .map(|(id, _)| id)
    }

    /// Blocks reachable from the entry, in DFS preorder.
    pub fn reachable(&self) -> Vec<BlockId> {
        let mut seen = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if seen[id] {
                continue;
            }
            seen[id] = true;
            order.push(id);
            for edge in self.blocks[id].succs.iter().rev() {
                if !seen[edge.target] {
                    stack.push(edge.target);
                }
            }
        }
        order
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cfg_has_entry_and_exit() {
        let cfg = Cfg::new();
        assert!(matches!(
            cfg.block(cfg.entry).kind,
            BlockKind::Precondition { .. }
        ));
        assert!(matches!(
            cfg.block(cfg.exit).kind,
            BlockKind::Postcondition { .. }
        ));
        assert!(cfg.block(cfg.entry).preds.is_empty());
        assert!(cfg.block(cfg.exit).succs.is_empty());
    }

    #[test]
    fn add_edge_maintains_both_sides() {
        let mut cfg = Cfg::new();
        let b = cfg.push_basic();
        cfg.add_edge(cfg.entry, b, None);
        cfg.add_edge(b, cfg.exit, Some(Pred::True));
        assert_eq!(cfg.block(cfg.entry).succs[0].target, b);
        assert_eq!(cfg.block(b).preds, vec![cfg.entry]);
        assert_eq!(cfg.block(b).succs[0].guard, Some(Pred::True));
        assert_eq!(cfg.block(cfg.exit).preds, vec![b]);
    }

    #[test]
    fn cut_blocks_excludes_basic() {
        let mut cfg = Cfg::new();
        let b = cfg.push_basic();
        let lh = cfg.push(BlockKind::LoopHead {
            invariants: Vec::new(),
            rankings: Vec::new(),
            snapshots: Vec::new(),
        });
        let cuts: Vec<_> = cfg.cut_blocks().collect();
        assert!(cuts.contains(&cfg.entry));
        assert!(cuts.contains(&cfg.exit));
        assert!(cuts.contains(&lh));
        assert!(!cuts.contains(&b));
    }

    #[test]
    fn reachable_skips_orphans() {
        let mut cfg = Cfg::new();
        let b = cfg.push_basic();
        let orphan = cfg.push_basic();
        cfg.add_edge(cfg.entry, b, None);
        cfg.add_edge(b, cfg.exit, None);
        let reach = cfg.reachable();
        assert!(reach.contains(&b));
        assert!(!reach.contains(&orphan));
    }
}
