//! Struct flattening.
//!
//! Runs after CFG construction and annotation binding, before the
//! consistency checks. Struct-typed parameters, returns, and locals are
//! replaced in place by their ordered scalar members; member reads and
//! writes are rewritten onto the backing member locals; struct-typed call
//! arguments and result bindings expand into member sequences; and the
//! function/predicate types are recomputed from the flattened lists.
//!
//! Any whole-struct reference surviving this pass is a front-end bug and
//! fails with `InternalInvariant`. Struct definitions stay in the type
//! table for diagnostics only.

use imp_fv_ir::block::BlockKind;
use imp_fv_ir::expr::Expr;
use imp_fv_ir::pred::Pred;
use imp_fv_ir::program::{Function, Predicate};
use imp_fv_ir::stmt::Statement;
use imp_fv_ir::term::Term;
use imp_fv_ir::types::TypeTable;
use imp_fv_ir::var::{StructVar, Variable};
use rustc_hash::FxHashMap;

use crate::ast::Span;
use crate::error::Error;

/// Struct variables of one function, keyed by unique name.
type StructMap = FxHashMap<String, StructVar>;

fn struct_map(slots: &[&[Variable]]) -> StructMap {
    let mut map = StructMap::default();
    for group in slots {
        for var in *group {
            if let Variable::Struct(sv) = var {
                map.insert(sv.name.clone(), sv.clone());
            }
        }
    }
    map
}

fn expand_slots(slots: Vec<Variable>) -> Vec<Variable> {
    let mut out = Vec::with_capacity(slots.len());
    for var in slots {
        match var {
            Variable::Struct(sv) => {
                out.extend(sv.members.into_iter().map(|(_, m)| Variable::Local(m)));
            }
            local => out.push(local),
        }
    }
    out
}

/// Flatten one function in place.
pub(crate) fn flatten_function(
    func: &mut Function,
    types: &mut TypeTable,
    span: Span,
) -> Result<(), Error> {
    let map = struct_map(&[&func.params, &func.returns, &func.locals]);

    func.params = expand_slots(std::mem::take(&mut func.params));
    func.returns = expand_slots(std::mem::take(&mut func.returns));
    func.locals = expand_slots(std::mem::take(&mut func.locals));

    let param_tys = func.params.iter().map(|v| v.ty()).collect();
    let return_tys = func.returns.iter().map(|v| v.ty()).collect();
    func.ty = types.get_fun(return_tys, param_tys);

    if map.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        function = %func.name,
        structs = map.len(),
        "flattening struct slots"
    );

    for block in &mut func.body.blocks {
        match &mut block.kind {
            BlockKind::Basic { statements } => {
                let old = std::mem::take(statements);
                for stmt in old {
                    statements.push(flatten_stmt(stmt, &map, span)?);
                }
            }
            BlockKind::Precondition {
                assertions,
                rankings,
                snapshots,
            } => {
                flatten_preds(assertions, &map, span)?;
                flatten_terms(rankings, &map, span)?;
                let old = std::mem::take(snapshots);
                for stmt in old {
                    snapshots.push(flatten_stmt(stmt, &map, span)?);
                }
            }
            BlockKind::LoopHead {
                invariants,
                rankings,
                snapshots,
            } => {
                flatten_preds(invariants, &map, span)?;
                flatten_terms(rankings, &map, span)?;
                let old = std::mem::take(snapshots);
                for stmt in old {
                    snapshots.push(flatten_stmt(stmt, &map, span)?);
                }
            }
            BlockKind::Postcondition { assertions } => {
                flatten_preds(assertions, &map, span)?;
            }
        }
        for edge in &mut block.succs {
            if let Some(guard) = edge.guard.take() {
                edge.guard = Some(flatten_pred(guard, &map, span)?);
            }
        }
    }
    Ok(())
}

/// Flatten one predicate definition in place.
pub(crate) fn flatten_predicate(
    pred: &mut Predicate,
    types: &mut TypeTable,
    span: Span,
) -> Result<(), Error> {
    let map = struct_map(&[&pred.params]);
    pred.params = expand_slots(std::mem::take(&mut pred.params));
    let param_tys = pred.params.iter().map(|v| v.ty()).collect();
    pred.ty = types.get_pred(param_tys);

    if map.is_empty() {
        return Ok(());
    }
    let body = std::mem::replace(&mut pred.body, Pred::True);
    pred.body = flatten_pred(body, &map, span)?;
    Ok(())
}

fn flatten_preds(preds: &mut Vec<Pred>, map: &StructMap, span: Span) -> Result<(), Error> {
    let old = std::mem::take(preds);
    for p in old {
        preds.push(flatten_pred(p, map, span)?);
    }
    Ok(())
}

fn flatten_terms(terms: &mut Vec<Term>, map: &StructMap, span: Span) -> Result<(), Error> {
    let old = std::mem::take(terms);
    for t in old {
        terms.push(flatten_term(t, map, span)?);
    }
    Ok(())
}

fn flatten_stmt(stmt: Statement, map: &StructMap, span: Span) -> Result<Statement, Error> {
    Ok(match stmt {
        Statement::Assign { target, value } => {
            if map.contains_key(&target) {
                return Err(Error::internal(
                    format!("whole-struct assignment to `{target}` survived lowering"),
                    span,
                ));
            }
            Statement::Assign {
                target,
                value: flatten_expr(value, map, span)?,
            }
        }
        Statement::ArrayAssign {
            array,
            index,
            value,
        } => Statement::ArrayAssign {
            array,
            index: flatten_expr(index, map, span)?,
            value: flatten_expr(value, map, span)?,
        },
        Statement::MemberAssign {
            target,
            field,
            value,
        } => {
            let member = resolve_member(map, &target, &field, span)?;
            Statement::Assign {
                target: member,
                value: flatten_expr(value, map, span)?,
            }
        }
        Statement::Assume(p) => Statement::Assume(flatten_pred(p, map, span)?),
        Statement::Assert(p) => Statement::Assert(flatten_pred(p, map, span)?),
        Statement::Call {
            callee,
            args,
            results,
        } => {
            let mut flat_args = Vec::with_capacity(args.len());
            for arg in args {
                expand_expr_arg(arg, map, span, &mut flat_args)?;
            }
            let mut flat_results = Vec::with_capacity(results.len());
            for name in results {
                match map.get(&name) {
                    Some(sv) => {
                        flat_results.extend(sv.members.iter().map(|(_, m)| m.name.clone()));
                    }
                    None => flat_results.push(name),
                }
            }
            Statement::Call {
                callee,
                args: flat_args,
                results: flat_results,
            }
        }
    })
}

/// Expand a call argument: a whole-struct variable becomes its members in
/// declaration order.
fn expand_expr_arg(
    arg: Expr,
    map: &StructMap,
    span: Span,
    out: &mut Vec<Expr>,
) -> Result<(), Error> {
    if let Expr::Var { name, .. } = &arg {
        if let Some(sv) = map.get(name) {
            out.extend(sv.members.iter().map(|(_, m)| Expr::Var {
                name: m.name.clone(),
                ty: m.ty,
            }));
            return Ok(());
        }
    }
    out.push(flatten_expr(arg, map, span)?);
    Ok(())
}

fn expand_term_arg(
    arg: Term,
    map: &StructMap,
    span: Span,
    out: &mut Vec<Term>,
) -> Result<(), Error> {
    if let Term::Var { name, .. } = &arg {
        if let Some(sv) = map.get(name) {
            out.extend(sv.members.iter().map(|(_, m)| Term::Var {
                name: m.name.clone(),
                ty: m.ty,
            }));
            return Ok(());
        }
    }
    out.push(flatten_term(arg, map, span)?);
    Ok(())
}

fn resolve_member(
    map: &StructMap,
    base: &str,
    field: &str,
    span: Span,
) -> Result<String, Error> {
    let sv = map.get(base).ok_or_else(|| {
        Error::internal(
            format!("member access on unknown struct variable `{base}`"),
            span,
        )
    })?;
    match sv.member(field) {
        Some(m) => Ok(m.name.clone()),
        None => Err(Error::internal(
            format!("member access on unknown field `{base}.{field}`"),
            span,
        )),
    }
}

fn flatten_expr(e: Expr, map: &StructMap, span: Span) -> Result<Expr, Error> {
    Ok(match e {
        Expr::Var { name, ty } => {
            if map.contains_key(&name) {
                return Err(Error::internal(
                    format!("whole-struct reference `{name}` survived flattening"),
                    span,
                ));
            }
            Expr::Var { name, ty }
        }
        Expr::Member { base, field, .. } => {
            let member = resolve_member(map, &base, &field, span)?;
            let ty = map
                .get(&base)
                .and_then(|sv| sv.member(&field))
                .map(|m| m.ty)
                .ok_or_else(|| {
                    Error::internal(format!("unknown member `{base}.{field}`"), span)
                })?;
            Expr::Var { name: member, ty }
        }
        Expr::IntLit(v) => Expr::IntLit(v),
        Expr::FloatLit(v) => Expr::FloatLit(v),
        Expr::BoolLit(v) => Expr::BoolLit(v),
        Expr::Call { callee, args, ty } => {
            let mut flat_args = Vec::with_capacity(args.len());
            for arg in args {
                expand_expr_arg(arg, map, span, &mut flat_args)?;
            }
            Expr::Call {
                callee,
                args: flat_args,
                ty,
            }
        }
        Expr::Subscript { array, index, ty } => Expr::Subscript {
            array: Box::new(flatten_expr(*array, map, span)?),
            index: Box::new(flatten_expr(*index, map, span)?),
            ty,
        },
        Expr::Unary { op, operand, ty } => Expr::Unary {
            op,
            operand: Box::new(flatten_expr(*operand, map, span)?),
            ty,
        },
        Expr::Binary { op, lhs, rhs, ty } => Expr::Binary {
            op,
            lhs: Box::new(flatten_expr(*lhs, map, span)?),
            rhs: Box::new(flatten_expr(*rhs, map, span)?),
            ty,
        },
    })
}

fn flatten_term(t: Term, map: &StructMap, span: Span) -> Result<Term, Error> {
    Ok(match t {
        Term::Var { name, ty } => {
            if map.contains_key(&name) {
                return Err(Error::internal(
                    format!("whole-struct term `{name}` survived flattening"),
                    span,
                ));
            }
            Term::Var { name, ty }
        }
        Term::Result { .. } => {
            return Err(Error::internal("\\result survived annotation binding", span));
        }
        Term::Old(_) => {
            return Err(Error::internal("\\old survived annotation binding", span));
        }
        Term::Member { base, field, .. } => match *base {
            Term::Var { name, .. } => {
                let sv = map.get(&name).ok_or_else(|| {
                    Error::internal(
                        format!("member access on unknown struct variable `{name}`"),
                        span,
                    )
                })?;
                match sv.member(&field) {
                    Some(m) => Term::Var {
                        name: m.name.clone(),
                        ty: m.ty,
                    },
                    None => {
                        return Err(Error::internal(
                            format!("unknown member `{name}.{field}`"),
                            span,
                        ));
                    }
                }
            }
            _ => {
                return Err(Error::internal(
                    "member selection on a non-variable term",
                    span,
                ));
            }
        },
        Term::IntLit(v) => Term::IntLit(v),
        Term::FloatLit(v) => Term::FloatLit(v),
        Term::Call { callee, args, ty } => {
            let mut flat_args = Vec::with_capacity(args.len());
            for arg in args {
                expand_term_arg(arg, map, span, &mut flat_args)?;
            }
            Term::Call {
                callee,
                args: flat_args,
                ty,
            }
        }
        Term::Subscript { array, index, ty } => Term::Subscript {
            array: Box::new(flatten_term(*array, map, span)?),
            index: Box::new(flatten_term(*index, map, span)?),
            ty,
        },
        Term::Length(inner) => Term::Length(Box::new(flatten_term(*inner, map, span)?)),
        Term::ArrayUpdate {
            array,
            index,
            value,
            ty,
        } => Term::ArrayUpdate {
            array: Box::new(flatten_term(*array, map, span)?),
            index: Box::new(flatten_term(*index, map, span)?),
            value: Box::new(flatten_term(*value, map, span)?),
            ty,
        },
        Term::Neg { operand, ty } => Term::Neg {
            operand: Box::new(flatten_term(*operand, map, span)?),
            ty,
        },
        Term::Binary { op, lhs, rhs, ty } => Term::Binary {
            op,
            lhs: Box::new(flatten_term(*lhs, map, span)?),
            rhs: Box::new(flatten_term(*rhs, map, span)?),
            ty,
        },
    })
}

fn flatten_pred(p: Pred, map: &StructMap, span: Span) -> Result<Pred, Error> {
    Ok(match p {
        Pred::True => Pred::True,
        Pred::False => Pred::False,
        Pred::Atom(t) => Pred::Atom(flatten_term(t, map, span)?),
        Pred::Cmp { op, lhs, rhs } => Pred::Cmp {
            op,
            lhs: flatten_term(lhs, map, span)?,
            rhs: flatten_term(rhs, map, span)?,
        },
        Pred::App { callee, args } => {
            let mut flat_args = Vec::with_capacity(args.len());
            for arg in args {
                expand_term_arg(arg, map, span, &mut flat_args)?;
            }
            Pred::App {
                callee,
                args: flat_args,
            }
        }
        Pred::Not(inner) => Pred::Not(Box::new(flatten_pred(*inner, map, span)?)),
        Pred::And(ps) => Pred::And(
            ps.into_iter()
                .map(|p| flatten_pred(p, map, span))
                .collect::<Result<_, _>>()?,
        ),
        Pred::Or(ps) => Pred::Or(
            ps.into_iter()
                .map(|p| flatten_pred(p, map, span))
                .collect::<Result<_, _>>()?,
        ),
        Pred::Implies(l, r) => Pred::Implies(
            Box::new(flatten_pred(*l, map, span)?),
            Box::new(flatten_pred(*r, map, span)?),
        ),
        Pred::Iff(l, r) => Pred::Iff(
            Box::new(flatten_pred(*l, map, span)?),
            Box::new(flatten_pred(*r, map, span)?),
        ),
        Pred::Xor(l, r) => Pred::Xor(
            Box::new(flatten_pred(*l, map, span)?),
            Box::new(flatten_pred(*r, map, span)?),
        ),
        Pred::Old(_) => {
            return Err(Error::internal("\\old survived annotation binding", span));
        }
        Pred::Quant { q, binders, body } => Pred::Quant {
            q,
            binders,
            body: Box::new(flatten_pred(*body, map, span)?),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use imp_fv_ir::types::{AtomicType, INT, TypeTable};
    use imp_fv_ir::var::LocalVar;

    fn point_var(types: &mut TypeTable, unique: &str, source: &str) -> StructVar {
        let ty = match types.get_struct("Point") {
            Some(id) => id,
            None => types
                .declare_struct(
                    "Point",
                    vec![
                        ("x".to_string(), AtomicType::Int),
                        ("y".to_string(), AtomicType::Int),
                    ],
                )
                .expect("fresh table"),
        };
        StructVar {
            name: unique.to_string(),
            source_name: source.to_string(),
            ty,
            members: vec![
                (
                    "x".to_string(),
                    LocalVar::new(format!("{unique}.x"), format!("{source}.x"), INT),
                ),
                (
                    "y".to_string(),
                    LocalVar::new(format!("{unique}.y"), format!("{source}.y"), INT),
                ),
            ],
        }
    }

    #[test]
    fn member_assign_becomes_scalar_assign() {
        let mut types = TypeTable::new();
        let sv = point_var(&mut types, "p@0", "p");
        let mut map = StructMap::default();
        map.insert(sv.name.clone(), sv);

        let stmt = Statement::MemberAssign {
            target: "p@0".to_string(),
            field: "x".to_string(),
            value: Expr::IntLit(1),
        };
        let flattened = flatten_stmt(stmt, &map, Span::default()).unwrap();
        assert_eq!(
            flattened,
            Statement::Assign {
                target: "p@0.x".to_string(),
                value: Expr::IntLit(1),
            }
        );
    }

    #[test]
    fn struct_call_argument_expands_in_order() {
        let mut types = TypeTable::new();
        let sv = point_var(&mut types, "p@0", "p");
        let struct_ty = sv.ty;
        let mut map = StructMap::default();
        map.insert(sv.name.clone(), sv);

        let stmt = Statement::Call {
            callee: "norm".to_string(),
            args: vec![Expr::Var {
                name: "p@0".to_string(),
                ty: struct_ty,
            }],
            results: vec![],
        };
        match flatten_stmt(stmt, &map, Span::default()).unwrap() {
            Statement::Call { args, .. } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(&args[0], Expr::Var { name, .. } if name == "p@0.x"));
                assert!(matches!(&args[1], Expr::Var { name, .. } if name == "p@0.y"));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn surviving_whole_struct_reference_is_internal_error() {
        let mut types = TypeTable::new();
        let sv = point_var(&mut types, "p@0", "p");
        let struct_ty = sv.ty;
        let mut map = StructMap::default();
        map.insert(sv.name.clone(), sv);

        let e = Expr::Var {
            name: "p@0".to_string(),
            ty: struct_ty,
        };
        let err = flatten_expr(e, &map, Span::default()).unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::ErrorKind::InternalInvariant { .. }
        ));
    }
}
