//! Basic-path extraction.
//!
//! Enumerates every loop-free route between two cut blocks whose interior
//! contains only basic blocks. The enumeration is a depth-first search
//! with an explicit stack, exposed as a lazy [`Iterator`] — the consumer
//! stops pulling to cancel. It terminates because deleting the incoming
//! edges of every cut block leaves a DAG: any cycle in the CFG crosses a
//! loop head.
//!
//! Statements along a path are the head block's ghost snapshots, then the
//! interior blocks' statements with each chosen edge's guard interleaved
//! as an assumption. Routes that happen to produce identical statement
//! lists are not deduplicated; the prover handles them idempotently.

use imp_fv_ir::block::{BlockId, Cfg};
use imp_fv_ir::path::BasicPath;
use imp_fv_ir::pred::Pred;
use imp_fv_ir::program::Function;
use imp_fv_ir::stmt::Statement;

/// One suspended DFS position: a block whose outgoing edges are being
/// visited, and the statement-buffer length to restore when backtracking
/// past it.
struct Frame {
    block: BlockId,
    next_edge: usize,
    base_len: usize,
}

/// Lazy iterator over a function's basic paths.
pub struct BasicPaths<'a> {
    cfg: &'a Cfg,
    cuts: Vec<BlockId>,
    cut_idx: usize,
    stack: Vec<Frame>,
    stmts: Vec<Statement>,
}

impl<'a> BasicPaths<'a> {
    fn new(cfg: &'a Cfg) -> Self {
        Self {
            cfg,
            cuts: cfg.cut_blocks().collect(),
            cut_idx: 0,
            stack: Vec::new(),
            stmts: Vec::new(),
        }
    }

    fn head(&self) -> BlockId {
        self.cuts[self.cut_idx]
    }

    fn emit(&self, tail: BlockId) -> BasicPath {
        let head = self.head();
        let head_block = self.cfg.block(head);
        let tail_block = self.cfg.block(tail);
        BasicPath {
            head,
            tail,
            head_condition: Pred::conjoin(head_block.assertions().to_vec()),
            head_rankings: head_block.rankings().to_vec(),
            statements: self.stmts.clone(),
            tail_condition: Pred::conjoin(tail_block.assertions().to_vec()),
            tail_rankings: tail_block.rankings().to_vec(),
        }
    }
}

impl Iterator for BasicPaths<'_> {
    type Item = BasicPath;

    fn next(&mut self) -> Option<BasicPath> {
        loop {
            if self.stack.is_empty() {
                if self.cut_idx >= self.cuts.len() {
                    return None;
                }
                let head = self.head();
                self.stmts.clear();
                self.stmts
                    .extend(self.cfg.block(head).snapshots().iter().cloned());
                self.stack.push(Frame {
                    block: head,
                    next_edge: 0,
                    base_len: 0,
                });
            }

            let top = self.stack.len() - 1;
            let block = self.stack[top].block;
            let edge_idx = self.stack[top].next_edge;
            let succs = &self.cfg.block(block).succs;

            if edge_idx >= succs.len() {
                let frame = match self.stack.pop() {
                    Some(f) => f,
                    None => return None,
                };
                self.stmts.truncate(frame.base_len);
                if self.stack.is_empty() {
                    self.cut_idx += 1;
                }
                continue;
            }
            self.stack[top].next_edge += 1;

            let edge = &succs[edge_idx];
            let mark = self.stmts.len();
            if let Some(guard) = &edge.guard {
                self.stmts.push(Statement::Assume(guard.clone()));
            }
            let target = self.cfg.block(edge.target);
            if target.is_cut() {
                let path = self.emit(edge.target);
                self.stmts.truncate(mark);
                return Some(path);
            }
            self.stmts.extend(target.statements().iter().cloned());
            self.stack.push(Frame {
                block: edge.target,
                next_edge: 0,
                base_len: mark,
            });
        }
    }
}

/// Basic paths of one function, lazily.
pub fn basic_paths(func: &Function) -> BasicPaths<'_> {
    BasicPaths::new(&func.body)
}

/// All basic paths of one function, eagerly.
pub fn extract_all(func: &Function) -> Vec<BasicPath> {
    let paths: Vec<BasicPath> = basic_paths(func).collect();
    tracing::debug!(function = %func.name, count = paths.len(), "extracted basic paths");
    paths
}
