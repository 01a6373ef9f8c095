//! Whole-function consistency gates.
//!
//! Two kinds of checks run after flattening: a user-facing one — ranking
//! functions must be present with the same cardinality on every cut point
//! of a function, or on none — and an internal well-formedness validator
//! for the CFG, run under `Config::validate_ir` and by tests. Nothing
//! here judges whether ranking functions are well-founded; that is the
//! prover's job.

use imp_fv_ir::block::{BlockId, BlockKind};
use imp_fv_ir::pred::Pred;
use imp_fv_ir::program::Function;
use imp_fv_ir::stmt::Statement;
use imp_fv_ir::var::Variable;

use crate::ast::Span;
use crate::error::{Error, ErrorKind};

/// Ranking cardinality: every loop head must carry exactly as many
/// ranking components as the precondition block.
pub fn check_rankings(func: &Function, span: Span) -> Result<(), Error> {
    let expected = func.body.block(func.body.entry).rankings().len();
    for block in &func.body.blocks {
        if let BlockKind::LoopHead { rankings, .. } = &block.kind {
            if rankings.len() != expected {
                return Err(Error::new(
                    ErrorKind::InconsistentRankings {
                        function: func.name.clone(),
                        expected,
                        got: rankings.len(),
                    },
                    span,
                ));
            }
        }
    }
    Ok(())
}

/// CFG well-formedness. Violations are front-end bugs, surfaced as
/// `InternalInvariant`.
///
/// Checks, over the blocks reachable from the entry:
/// - the entry is the unique precondition block and has no predecessors;
/// - the exit is the unique postcondition block and has no successors;
/// - every other reachable block is a basic block or a loop head;
/// - every reachable block except the exit has at least one successor;
/// - no parameter, return, or local slot has struct type;
/// - no statement is a `MemberAssign`, and no assertion still mentions
///   `\old`.
pub fn validate(func: &Function, span: Span) -> Result<(), Error> {
    let cfg = &func.body;
    let fail = |reason: String| Err(Error::internal(reason, span));

    if !matches!(cfg.block(cfg.entry).kind, BlockKind::Precondition { .. }) {
        return fail("entry is not a precondition block".to_string());
    }
    if !cfg.block(cfg.entry).preds.is_empty() {
        return fail("precondition block has predecessors".to_string());
    }
    if !matches!(cfg.block(cfg.exit).kind, BlockKind::Postcondition { .. }) {
        return fail("exit is not a postcondition block".to_string());
    }
    if !cfg.block(cfg.exit).succs.is_empty() {
        return fail("postcondition block has successors".to_string());
    }

    let reachable = cfg.reachable();
    for &id in &reachable {
        let block = cfg.block(id);
        match &block.kind {
            BlockKind::Precondition { .. } if id != cfg.entry => {
                return fail(format!("second precondition block {id}"));
            }
            BlockKind::Postcondition { .. } if id != cfg.exit => {
                return fail(format!("second postcondition block {id}"));
            }
            _ => {}
        }
        if id != cfg.exit && block.succs.is_empty() {
            return fail(format!("reachable block {id} has no successors"));
        }
        for pred in block.assertions() {
            if pred.mentions_old() {
                return fail(format!("block {id} assertion still mentions \\old"));
            }
        }
        for stmt in block.statements().iter().chain(block.snapshots()) {
            validate_stmt(stmt, id, span)?;
        }
        for edge in &block.succs {
            if let Some(guard) = &edge.guard {
                if guard.mentions_old() {
                    return fail(format!("edge guard out of block {id} mentions \\old"));
                }
            }
        }
    }

    if func.has_struct_slots() {
        return fail("struct-typed slot survived flattening".to_string());
    }
    for var in func.params.iter().chain(&func.returns).chain(&func.locals) {
        if matches!(var, Variable::Struct(_)) {
            return fail("struct-typed slot survived flattening".to_string());
        }
    }
    Ok(())
}

fn validate_stmt(stmt: &Statement, block: BlockId, span: Span) -> Result<(), Error> {
    match stmt {
        Statement::MemberAssign { .. } => Err(Error::internal(
            format!("member assignment survived flattening in block {block}"),
            span,
        )),
        Statement::Assume(p) | Statement::Assert(p) => {
            if p.mentions_old() {
                Err(Error::internal(
                    format!("statement predicate in block {block} mentions \\old"),
                    span,
                ))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// Convenience used by tests: the conjunction a consumer would see for a
/// cut block's assertions.
pub fn cut_condition(func: &Function, block: BlockId) -> Pred {
    Pred::conjoin(func.body.block(block).assertions().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imp_fv_ir::block::Cfg;
    use imp_fv_ir::term::Term;
    use imp_fv_ir::types::{INT, TypeTable};

    fn empty_function(name: &str) -> Function {
        let mut cfg = Cfg::new();
        let b = cfg.push_basic();
        cfg.add_edge(cfg.entry, b, None);
        cfg.add_edge(b, cfg.exit, None);
        let mut types = TypeTable::new();
        let ty = types.get_fun(vec![], vec![]);
        Function {
            name: name.to_string(),
            params: vec![],
            returns: vec![],
            locals: vec![],
            ty,
            body: cfg,
        }
    }

    fn int_term(name: &str) -> Term {
        Term::Var {
            name: name.to_string(),
            ty: INT,
        }
    }

    #[test]
    fn empty_function_validates() {
        let func = empty_function("noop");
        assert!(validate(&func, Span::default()).is_ok());
        assert!(check_rankings(&func, Span::default()).is_ok());
    }

    #[test]
    fn ranking_mismatch_detected() {
        let mut func = empty_function("scan");
        // Contract declares one ranking component...
        if let BlockKind::Precondition { rankings, .. } =
            &mut func.body.blocks[func.body.entry].kind
        {
            rankings.push(int_term("n@0"));
        }
        // ...but the loop head carries none.
        func.body.push(BlockKind::LoopHead {
            invariants: vec![],
            rankings: vec![],
            snapshots: vec![],
        });

        let err = check_rankings(&func, Span::default()).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::InconsistentRankings {
                expected: 1,
                got: 0,
                ..
            }
        ));
    }

    #[test]
    fn ranking_match_accepted() {
        let mut func = empty_function("scan");
        if let BlockKind::Precondition { rankings, .. } =
            &mut func.body.blocks[func.body.entry].kind
        {
            rankings.push(int_term("n@0"));
        }
        func.body.push(BlockKind::LoopHead {
            invariants: vec![],
            rankings: vec![int_term("n@0")],
            snapshots: vec![],
        });
        assert!(check_rankings(&func, Span::default()).is_ok());
    }

    #[test]
    fn surviving_old_is_rejected() {
        let mut func = empty_function("f");
        if let BlockKind::Postcondition { assertions } =
            &mut func.body.blocks[func.body.exit].kind
        {
            assertions.push(Pred::Old(Box::new(Pred::True)));
        }
        let err = validate(&func, Span::default()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InternalInvariant { .. }));
    }
}
