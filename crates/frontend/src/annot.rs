//! Annotation binding: `\old` snapshots and `\result` resolution.
//!
//! After the CFG is built, postconditions and loop invariants may still
//! contain `\old(·)` markers and `\result` placeholders. This pass
//! eliminates both:
//!
//! - every free program variable `x` under `\old` becomes a fresh ghost
//!   `x_old`, materialized as an `Assign(x_old, x)` snapshot in the owning
//!   cut block (the precondition for `ensures` clauses, the loop head for
//!   invariants) — inside an invariant, `\old(x)` therefore means "x at
//!   the last visit to this loop head";
//! - `\result` resolves to the function's return variable. Nested `\old`
//!   collapses: the outermost marker wins.
//!
//! Quantifier-bound variables are not program state and are never
//! snapshotted.

use imp_fv_ir::block::{BlockId, BlockKind, Cfg};
use imp_fv_ir::expr::Expr;
use imp_fv_ir::pred::Pred;
use imp_fv_ir::stmt::Statement;
use imp_fv_ir::term::Term;
use imp_fv_ir::types::TypeId;
use imp_fv_ir::var::{LocalVar, Variable};
use rustc_hash::FxHashMap;

use crate::ast::Span;
use crate::error::{Error, ErrorKind};
use crate::lower_expr::Namer;

/// Ghost snapshot variables for one cut block.
struct Snapshots<'a> {
    namer: &'a mut Namer,
    /// Keyed by the snapshotted variable's unique name (`x@1`) or member
    /// path (`p@2.x`).
    map: FxHashMap<String, LocalVar>,
    assigns: Vec<Statement>,
    ghosts: Vec<LocalVar>,
}

impl<'a> Snapshots<'a> {
    fn new(namer: &'a mut Namer) -> Self {
        Self {
            namer,
            map: FxHashMap::default(),
            assigns: Vec::new(),
            ghosts: Vec::new(),
        }
    }

    fn ghost_for(&mut self, key: &str, source: &str, ty: TypeId, value: Expr) -> LocalVar {
        if let Some(g) = self.map.get(key) {
            return g.clone();
        }
        let name = self.namer.fresh(&format!("{source}_old"));
        let ghost = LocalVar::new(name, format!("\\old({source})"), ty);
        self.map.insert(key.to_string(), ghost.clone());
        self.assigns.push(Statement::Assign {
            target: ghost.name.clone(),
            value,
        });
        self.ghosts.push(ghost.clone());
        ghost
    }
}

/// Recover the user spelling from an α-renamed unique name.
fn source_of(unique: &str) -> &str {
    unique.split('@').next().unwrap_or(unique)
}

/// Run the binder over a finished CFG.
pub(crate) fn bind_annotations(
    cfg: &mut Cfg,
    ret: Option<&Variable>,
    namer: &mut Namer,
    locals: &mut Vec<Variable>,
    span: Span,
) -> Result<(), Error> {
    // Postcondition clauses snapshot at the precondition block.
    let exit = cfg.exit;
    let entry = cfg.entry;
    rewrite_cut_block(cfg, exit, entry, ret, namer, locals, span)?;

    // Each loop head's invariants snapshot at that head.
    let loop_heads: Vec<BlockId> = cfg
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| matches!(b.kind, BlockKind::LoopHead { .. }))
        .map(|(id, _)| id)
        .collect();
    for head in loop_heads {
        rewrite_cut_block(cfg, head, head, ret, namer, locals, span)?;
    }
    Ok(())
}

/// Rewrite the assertions of `block`, materializing snapshots into
/// `snapshot_block`.
fn rewrite_cut_block(
    cfg: &mut Cfg,
    block: BlockId,
    snapshot_block: BlockId,
    ret: Option<&Variable>,
    namer: &mut Namer,
    locals: &mut Vec<Variable>,
    span: Span,
) -> Result<(), Error> {
    let assertions = match &cfg.blocks[block].kind {
        BlockKind::Postcondition { assertions } => assertions.clone(),
        BlockKind::LoopHead { invariants, .. } => invariants.clone(),
        _ => return Ok(()),
    };

    let mut snap = Snapshots::new(namer);
    let mut bound = Vec::new();
    let rewritten: Vec<Pred> = assertions
        .into_iter()
        .map(|p| rewrite_pred(p, false, &mut bound, &mut snap, ret, span))
        .collect::<Result<_, _>>()?;

    match &mut cfg.blocks[block].kind {
        BlockKind::Postcondition { assertions } => *assertions = rewritten,
        BlockKind::LoopHead { invariants, .. } => *invariants = rewritten,
        _ => {}
    }

    if !snap.assigns.is_empty() {
        tracing::debug!(
            block = snapshot_block,
            ghosts = snap.assigns.len(),
            "materialized \\old snapshots"
        );
    }
    locals.extend(snap.ghosts.into_iter().map(Variable::Local));
    match &mut cfg.blocks[snapshot_block].kind {
        BlockKind::Precondition { snapshots, .. } | BlockKind::LoopHead { snapshots, .. } => {
            snapshots.extend(snap.assigns);
        }
        _ => {
            return Err(Error::internal(
                "snapshot target is not a precondition or loop head",
                span,
            ));
        }
    }
    Ok(())
}

fn rewrite_pred(
    p: Pred,
    in_old: bool,
    bound: &mut Vec<String>,
    snap: &mut Snapshots<'_>,
    ret: Option<&Variable>,
    span: Span,
) -> Result<Pred, Error> {
    Ok(match p {
        Pred::True => Pred::True,
        Pred::False => Pred::False,
        Pred::Atom(t) => Pred::Atom(rewrite_term(t, in_old, bound, snap, ret, span)?),
        Pred::Cmp { op, lhs, rhs } => Pred::Cmp {
            op,
            lhs: rewrite_term(lhs, in_old, bound, snap, ret, span)?,
            rhs: rewrite_term(rhs, in_old, bound, snap, ret, span)?,
        },
        Pred::App { callee, args } => Pred::App {
            callee,
            args: args
                .into_iter()
                .map(|t| rewrite_term(t, in_old, bound, snap, ret, span))
                .collect::<Result<_, _>>()?,
        },
        Pred::Not(inner) => {
            Pred::Not(Box::new(rewrite_pred(*inner, in_old, bound, snap, ret, span)?))
        }
        Pred::And(ps) => Pred::And(
            ps.into_iter()
                .map(|p| rewrite_pred(p, in_old, bound, snap, ret, span))
                .collect::<Result<_, _>>()?,
        ),
        Pred::Or(ps) => Pred::Or(
            ps.into_iter()
                .map(|p| rewrite_pred(p, in_old, bound, snap, ret, span))
                .collect::<Result<_, _>>()?,
        ),
        Pred::Implies(l, r) => Pred::Implies(
            Box::new(rewrite_pred(*l, in_old, bound, snap, ret, span)?),
            Box::new(rewrite_pred(*r, in_old, bound, snap, ret, span)?),
        ),
        Pred::Iff(l, r) => Pred::Iff(
            Box::new(rewrite_pred(*l, in_old, bound, snap, ret, span)?),
            Box::new(rewrite_pred(*r, in_old, bound, snap, ret, span)?),
        ),
        Pred::Xor(l, r) => Pred::Xor(
            Box::new(rewrite_pred(*l, in_old, bound, snap, ret, span)?),
            Box::new(rewrite_pred(*r, in_old, bound, snap, ret, span)?),
        ),
        // Outer \old wins: the inner predicate is rewritten in old state
        // and the marker itself disappears.
        Pred::Old(inner) => rewrite_pred(*inner, true, bound, snap, ret, span)?,
        Pred::Quant { q, binders, body } => {
            let names: Vec<String> = binders.iter().map(|b| b.name.clone()).collect();
            let depth = bound.len();
            bound.extend(names);
            let body = rewrite_pred(*body, in_old, bound, snap, ret, span);
            bound.truncate(depth);
            Pred::Quant {
                q,
                binders,
                body: Box::new(body?),
            }
        }
    })
}

fn rewrite_term(
    t: Term,
    in_old: bool,
    bound: &mut Vec<String>,
    snap: &mut Snapshots<'_>,
    ret: Option<&Variable>,
    span: Span,
) -> Result<Term, Error> {
    Ok(match t {
        Term::Var { name, ty } => {
            if in_old && !bound.iter().any(|b| b == &name) {
                let source = source_of(&name).to_string();
                let value = Expr::Var {
                    name: name.clone(),
                    ty,
                };
                let ghost = snap.ghost_for(&name, &source, ty, value);
                Term::Var {
                    name: ghost.name,
                    ty,
                }
            } else {
                Term::Var { name, ty }
            }
        }
        Term::Result { .. } => match ret {
            Some(Variable::Local(v)) => Term::Var {
                name: v.name.clone(),
                ty: v.ty,
            },
            Some(Variable::Struct(_)) => {
                return Err(Error::new(ErrorKind::AmbiguousResult, span));
            }
            None => {
                return Err(Error::internal("\\result bound in a void function", span));
            }
        },
        Term::Member { base, field, ty } => match *base {
            Term::Result { .. } => match ret {
                Some(Variable::Struct(sv)) => match sv.member(&field) {
                    Some(member) => Term::Var {
                        name: member.name.clone(),
                        ty: member.ty,
                    },
                    None => {
                        return Err(Error::unknown_name(format!("\\result.{field}"), span));
                    }
                },
                _ => {
                    return Err(Error::internal(
                        "member selection on a non-struct \\result",
                        span,
                    ));
                }
            },
            Term::Var {
                name: base_name,
                ty: base_ty,
            } => {
                if in_old {
                    let key = format!("{base_name}.{field}");
                    let source = format!("{}.{field}", source_of(&base_name));
                    let value = Expr::Member {
                        base: base_name.clone(),
                        field: field.clone(),
                        ty,
                    };
                    let ghost = snap.ghost_for(&key, &source, ty, value);
                    Term::Var {
                        name: ghost.name,
                        ty,
                    }
                } else {
                    Term::Member {
                        base: Box::new(Term::Var {
                            name: base_name,
                            ty: base_ty,
                        }),
                        field,
                        ty,
                    }
                }
            }
            other => Term::Member {
                base: Box::new(rewrite_term(other, in_old, bound, snap, ret, span)?),
                field,
                ty,
            },
        },
        Term::IntLit(v) => Term::IntLit(v),
        Term::FloatLit(v) => Term::FloatLit(v),
        Term::Call { callee, args, ty } => Term::Call {
            callee,
            args: args
                .into_iter()
                .map(|a| rewrite_term(a, in_old, bound, snap, ret, span))
                .collect::<Result<_, _>>()?,
            ty,
        },
        Term::Subscript { array, index, ty } => Term::Subscript {
            array: Box::new(rewrite_term(*array, in_old, bound, snap, ret, span)?),
            index: Box::new(rewrite_term(*index, in_old, bound, snap, ret, span)?),
            ty,
        },
        Term::Length(inner) => {
            Term::Length(Box::new(rewrite_term(*inner, in_old, bound, snap, ret, span)?))
        }
        // Outer \old wins over nested markers.
        Term::Old(inner) => rewrite_term(*inner, true, bound, snap, ret, span)?,
        Term::ArrayUpdate {
            array,
            index,
            value,
            ty,
        } => Term::ArrayUpdate {
            array: Box::new(rewrite_term(*array, in_old, bound, snap, ret, span)?),
            index: Box::new(rewrite_term(*index, in_old, bound, snap, ret, span)?),
            value: Box::new(rewrite_term(*value, in_old, bound, snap, ret, span)?),
            ty,
        },
        Term::Neg { operand, ty } => Term::Neg {
            operand: Box::new(rewrite_term(*operand, in_old, bound, snap, ret, span)?),
            ty,
        },
        Term::Binary { op, lhs, rhs, ty } => Term::Binary {
            op,
            lhs: Box::new(rewrite_term(*lhs, in_old, bound, snap, ret, span)?),
            rhs: Box::new(rewrite_term(*rhs, in_old, bound, snap, ret, span)?),
            ty,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use imp_fv_ir::pred::RelOp;
    use imp_fv_ir::types::INT;

    fn int_var(name: &str) -> Term {
        Term::Var {
            name: name.to_string(),
            ty: INT,
        }
    }

    #[test]
    fn old_free_var_becomes_ghost() {
        let mut namer = Namer::new();
        let mut snap = Snapshots::new(&mut namer);
        let mut bound = Vec::new();
        let t = Term::Old(Box::new(int_var("x@0")));
        let rewritten = rewrite_term(t, false, &mut bound, &mut snap, None, Span::default())
            .unwrap();
        match rewritten {
            Term::Var { name, .. } => assert!(name.starts_with("x_old@")),
            other => panic!("expected ghost var, got {other:?}"),
        }
        assert_eq!(snap.assigns.len(), 1);
    }

    #[test]
    fn nested_old_collapses_outer_wins() {
        let mut namer = Namer::new();
        let mut snap = Snapshots::new(&mut namer);
        let mut bound = Vec::new();
        let t = Term::Old(Box::new(Term::Old(Box::new(int_var("x@0")))));
        let rewritten = rewrite_term(t, false, &mut bound, &mut snap, None, Span::default())
            .unwrap();
        assert!(!rewritten.mentions_old());
        // One ghost, not two.
        assert_eq!(snap.assigns.len(), 1);
    }

    #[test]
    fn same_var_snapshotted_once() {
        let mut namer = Namer::new();
        let mut snap = Snapshots::new(&mut namer);
        let mut bound = Vec::new();
        let p = Pred::Cmp {
            op: RelOp::Eq,
            lhs: Term::Old(Box::new(int_var("x@0"))),
            rhs: Term::Old(Box::new(int_var("x@0"))),
        };
        rewrite_pred(p, false, &mut bound, &mut snap, None, Span::default()).unwrap();
        assert_eq!(snap.assigns.len(), 1);
    }

    #[test]
    fn bound_vars_not_snapshotted() {
        use imp_fv_ir::pred::Quantifier;
        use imp_fv_ir::var::{LogicalSort, QuantifiedVar};

        let mut namer = Namer::new();
        let mut snap = Snapshots::new(&mut namer);
        let mut bound = Vec::new();
        let p = Pred::Old(Box::new(Pred::Quant {
            q: Quantifier::Forall,
            binders: vec![QuantifiedVar {
                name: "k@5".to_string(),
                source_name: "k".to_string(),
                sort: LogicalSort::Int,
            }],
            body: Box::new(Pred::Cmp {
                op: RelOp::Le,
                lhs: int_var("k@5"),
                rhs: int_var("n@0"),
            }),
        }));
        rewrite_pred(p, false, &mut bound, &mut snap, None, Span::default()).unwrap();
        // Only `n` is program state; the binder `k` is untouched.
        assert_eq!(snap.assigns.len(), 1);
        assert!(snap.map.contains_key("n@0"));
    }

    #[test]
    fn result_resolves_to_return_local() {
        let ret = Variable::Local(LocalVar::new("result@3", "\\result", INT));
        let mut namer = Namer::new();
        let mut snap = Snapshots::new(&mut namer);
        let mut bound = Vec::new();
        let t = Term::Result { ty: INT };
        let rewritten =
            rewrite_term(t, false, &mut bound, &mut snap, Some(&ret), Span::default()).unwrap();
        assert_eq!(
            rewritten,
            Term::Var {
                name: "result@3".to_string(),
                ty: INT
            }
        );
    }
}
