//! Expression, term, and predicate lowering.
//!
//! Three mutually recursive visitors over the shared AST expression
//! grammar. Which constructs are legal depends on where the expression
//! appears ([`SpecScope`]): executable guards may not mention `\old`,
//! `\length`, quantifiers, or predicates; annotation clauses may not call
//! functions in predicate position; `\result` is visible only inside
//! `ensures`; `\old` only inside `ensures` and loop invariants.
//!
//! Each visitor returns a typed IR node; there are no implicit
//! conversions anywhere.

use imp_fv_ir as ir;
use imp_fv_ir::expr::{BinOp, UnOp};
use imp_fv_ir::pred::{Pred, Quantifier, RelOp};
use imp_fv_ir::term::{Term, TermBinOp};
use imp_fv_ir::types::{BOOL, INT, TypeId, TypeTable};
use imp_fv_ir::var::{LogicalSort, QuantifiedVar, Variable};

use crate::ast::{self, BinOpAst, ExprKind, QuantAst, RelOpAst, SortAst, Span, UnOpAst};
use crate::env::{Binding, Env};
use crate::error::{Error, ErrorKind};

/// Monotonic α-renaming counter; one per function or predicate
/// definition. Every defining occurrence gets a globally fresh
/// `<source>@<n>` name.
#[derive(Debug, Default)]
pub(crate) struct Namer {
    next: u32,
}

impl Namer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fresh(&mut self, source: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{source}@{n}")
    }
}

/// The position an annotation expression is being lowered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecScope {
    Requires,
    Ensures,
    LoopInvariant,
    LoopVariant,
    Decreases,
    /// `assert pred;` inside a body.
    Assertion,
    /// An executable branch/loop condition embedded as a predicate.
    Guard,
    /// The body of a predicate definition.
    PredicateBody,
}

impl SpecScope {
    fn old_allowed(self) -> bool {
        matches!(self, SpecScope::Ensures | SpecScope::LoopInvariant)
    }

    fn result_allowed(self) -> bool {
        matches!(self, SpecScope::Ensures)
    }

    /// Guards come from executable code: annotation-only term formers are
    /// rejected and bool-returning function calls become atoms.
    fn is_guard(self) -> bool {
        matches!(self, SpecScope::Guard)
    }
}

/// Shared state of the three visitors.
pub(crate) struct LowerCx<'a> {
    pub types: &'a TypeTable,
    pub env: &'a mut Env,
    pub namer: &'a mut Namer,
    /// The enclosing function's return slot; `None` for void functions
    /// and predicate bodies.
    pub ret: Option<&'a Variable>,
    pub scope: SpecScope,
}

impl<'a> LowerCx<'a> {
    fn ty_name(&self, ty: TypeId) -> String {
        self.types.display_name(ty)
    }
}

fn require_same_numeric(
    cx: &LowerCx<'_>,
    lhs: TypeId,
    rhs: TypeId,
    span: Span,
) -> Result<TypeId, Error> {
    if lhs != rhs {
        return Err(Error::type_mismatch(cx.ty_name(lhs), cx.ty_name(rhs), span));
    }
    if !cx.types.is_numeric(lhs) {
        return Err(Error::type_mismatch("int or float", cx.ty_name(lhs), span));
    }
    Ok(lhs)
}

// ---------------------------------------------------------------------------
// Executable expressions
// ---------------------------------------------------------------------------

/// Lower an executable expression (assignment right-hand sides, call
/// arguments, subscripts).
pub(crate) fn lower_expr(e: &ast::Expr, cx: &mut LowerCx<'_>) -> Result<ir::Expr, Error> {
    let span = e.span;
    match &e.kind {
        ExprKind::Ident(name) => match cx.env.resolve(name) {
            Some(Binding::Local(v)) => Ok(ir::Expr::Var {
                name: v.name.clone(),
                ty: v.ty,
            }),
            // Whole-struct values occur as call arguments and assignment
            // sources; other uses fail the operator typing rules.
            Some(Binding::Struct(sv)) => Ok(ir::Expr::Var {
                name: sv.name.clone(),
                ty: sv.ty,
            }),
            Some(Binding::Quantified(_)) => Err(Error::internal(
                "quantified binder visible in executable code",
                span,
            )),
            None => Err(Error::unknown_name(name, span)),
        },
        ExprKind::IntLit(v) => Ok(ir::Expr::IntLit(*v)),
        ExprKind::FloatLit(v) => Ok(ir::Expr::FloatLit(*v)),
        ExprKind::BoolLit(v) => Ok(ir::Expr::BoolLit(*v)),
        ExprKind::Call { callee, args } => {
            let (arg_exprs, returns) = check_exec_call(callee, args, span, cx)?;
            match returns.as_slice() {
                [] => Err(Error::type_mismatch(
                    "a value-producing call",
                    format!("call to void function `{callee}`"),
                    span,
                )),
                [ret] => Ok(ir::Expr::Call {
                    callee: callee.clone(),
                    args: arg_exprs,
                    ty: *ret,
                }),
                _ => Err(Error::type_mismatch(
                    "a single-value call",
                    format!("call to `{callee}` with multiple return values"),
                    span,
                )),
            }
        }
        ExprKind::Index { base, index } => {
            let array = lower_expr(base, cx)?;
            let elem = cx.types.array_elem(array.ty()).ok_or_else(|| {
                Error::type_mismatch("an array", cx.ty_name(array.ty()), base.span)
            })?;
            let index_expr = lower_expr(index, cx)?;
            if index_expr.ty() != INT {
                return Err(Error::type_mismatch(
                    "int",
                    cx.ty_name(index_expr.ty()),
                    index.span,
                ));
            }
            Ok(ir::Expr::Subscript {
                array: Box::new(array),
                index: Box::new(index_expr),
                ty: elem,
            })
        }
        ExprKind::Member { base, field } => {
            let base_name = match &base.kind {
                ExprKind::Ident(n) => n,
                _ => {
                    return Err(Error::type_mismatch(
                        "a struct variable",
                        "a compound expression",
                        base.span,
                    ));
                }
            };
            match cx.env.resolve(base_name) {
                Some(Binding::Struct(sv)) => match sv.member(field) {
                    Some(member) => Ok(ir::Expr::Member {
                        base: sv.name.clone(),
                        field: field.clone(),
                        ty: member.ty,
                    }),
                    None => Err(Error::unknown_name(format!("{base_name}.{field}"), span)),
                },
                Some(Binding::Local(v)) => Err(Error::type_mismatch(
                    "a struct variable",
                    cx.ty_name(v.ty),
                    base.span,
                )),
                Some(Binding::Quantified(_)) => Err(Error::type_mismatch(
                    "a struct variable",
                    "a quantified variable",
                    base.span,
                )),
                None => Err(Error::unknown_name(base_name, base.span)),
            }
        }
        ExprKind::Unary { op, operand } => {
            let inner = lower_expr(operand, cx)?;
            let ty = inner.ty();
            match op {
                UnOpAst::Neg => {
                    if !cx.types.is_numeric(ty) {
                        return Err(Error::type_mismatch(
                            "int or float",
                            cx.ty_name(ty),
                            operand.span,
                        ));
                    }
                    Ok(ir::Expr::Unary {
                        op: UnOp::Neg,
                        operand: Box::new(inner),
                        ty,
                    })
                }
                UnOpAst::Not => {
                    if ty != BOOL {
                        return Err(Error::type_mismatch("bool", cx.ty_name(ty), operand.span));
                    }
                    Ok(ir::Expr::Unary {
                        op: UnOp::Not,
                        operand: Box::new(inner),
                        ty: BOOL,
                    })
                }
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let op = match op {
                BinOpAst::Add => BinOp::Add,
                BinOpAst::Sub => BinOp::Sub,
                BinOpAst::Mul => BinOp::Mul,
                BinOpAst::Div => BinOp::Div,
                BinOpAst::Rem => BinOp::Rem,
                BinOpAst::And => BinOp::And,
                BinOpAst::Or => BinOp::Or,
                BinOpAst::Implies | BinOpAst::Iff | BinOpAst::Xor => {
                    return Err(Error::illegal_annotation(
                        "predicate connective in executable code",
                        span,
                    ));
                }
            };
            let l = lower_expr(lhs, cx)?;
            let r = lower_expr(rhs, cx)?;
            let ty = if op.is_logical() {
                if l.ty() != BOOL {
                    return Err(Error::type_mismatch("bool", cx.ty_name(l.ty()), lhs.span));
                }
                if r.ty() != BOOL {
                    return Err(Error::type_mismatch("bool", cx.ty_name(r.ty()), rhs.span));
                }
                BOOL
            } else {
                let ty = require_same_numeric(cx, l.ty(), r.ty(), span)?;
                if op == BinOp::Rem && ty != INT {
                    return Err(Error::type_mismatch("int", cx.ty_name(ty), span));
                }
                ty
            };
            Ok(ir::Expr::Binary {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r),
                ty,
            })
        }
        ExprKind::Compare { operands, ops } => lower_exec_compare(operands, ops, span, cx),
        ExprKind::Old(_) => Err(Error::illegal_annotation("`\\old` in executable code", span)),
        ExprKind::Result => Err(Error::illegal_annotation(
            "`\\result` in executable code",
            span,
        )),
        ExprKind::Length(_) => Err(Error::illegal_annotation(
            "`\\length` in executable code",
            span,
        )),
        ExprKind::ArrayUpdate { .. } => Err(Error::illegal_annotation(
            "array update in executable code",
            span,
        )),
        ExprKind::Quant { .. } => Err(Error::illegal_annotation(
            "quantifier in an executable expression",
            span,
        )),
    }
}

/// Check callee existence, arity, and argument types for an executable
/// call; returns the lowered arguments and the callee's return types.
pub(crate) fn check_exec_call(
    callee: &str,
    args: &[ast::Expr],
    span: Span,
    cx: &mut LowerCx<'_>,
) -> Result<(Vec<ir::Expr>, Vec<TypeId>), Error> {
    if cx.env.predicate(callee).is_some() {
        return Err(Error::illegal_annotation(
            format!("predicate `{callee}` called in executable code"),
            span,
        ));
    }
    let (params, returns) = match cx.env.function(callee) {
        Some(sig) => (sig.params.clone(), sig.returns.clone()),
        None => return Err(Error::unknown_name(callee, span)),
    };
    if args.len() != params.len() {
        return Err(Error::type_mismatch(
            format!("{} argument(s) to `{callee}`", params.len()),
            format!("{}", args.len()),
            span,
        ));
    }
    let mut arg_exprs = Vec::with_capacity(args.len());
    for (arg, &param_ty) in args.iter().zip(params.iter()) {
        let lowered = lower_expr(arg, cx)?;
        if lowered.ty() != param_ty {
            return Err(Error::type_mismatch(
                cx.ty_name(param_ty),
                cx.ty_name(lowered.ty()),
                arg.span,
            ));
        }
        arg_exprs.push(lowered);
    }
    Ok((arg_exprs, returns))
}

/// Lower a comparison chain in executable position: `a < b < c` becomes
/// `(a < b) && (b < c)`, the shared operand duplicated (expressions are
/// side-effect-free, so evaluate-once semantics is preserved).
fn lower_exec_compare(
    operands: &[ast::Expr],
    ops: &[RelOpAst],
    span: Span,
    cx: &mut LowerCx<'_>,
) -> Result<ir::Expr, Error> {
    if operands.len() != ops.len() + 1 || ops.is_empty() {
        return Err(Error::internal("malformed comparison chain", span));
    }
    let lowered: Vec<ir::Expr> = operands
        .iter()
        .map(|o| lower_expr(o, cx))
        .collect::<Result<_, _>>()?;
    let mut links = Vec::with_capacity(ops.len());
    for (i, op) in ops.iter().enumerate() {
        let lhs = &lowered[i];
        let rhs = &lowered[i + 1];
        check_comparison_operands(cx, *op, lhs.ty(), rhs.ty(), operands[i + 1].span)?;
        links.push(ir::Expr::Binary {
            op: exec_rel_op(*op),
            lhs: Box::new(lhs.clone()),
            rhs: Box::new(rhs.clone()),
            ty: BOOL,
        });
    }
    let mut chain = links.remove(0);
    for link in links {
        chain = ir::Expr::Binary {
            op: BinOp::And,
            lhs: Box::new(chain),
            rhs: Box::new(link),
            ty: BOOL,
        };
    }
    Ok(chain)
}

fn exec_rel_op(op: RelOpAst) -> BinOp {
    match op {
        RelOpAst::Eq => BinOp::Eq,
        RelOpAst::Ne => BinOp::Ne,
        RelOpAst::Lt => BinOp::Lt,
        RelOpAst::Le => BinOp::Le,
        RelOpAst::Gt => BinOp::Gt,
        RelOpAst::Ge => BinOp::Ge,
    }
}

fn rel_op(op: RelOpAst) -> RelOp {
    match op {
        RelOpAst::Eq => RelOp::Eq,
        RelOpAst::Ne => RelOp::Ne,
        RelOpAst::Lt => RelOp::Lt,
        RelOpAst::Le => RelOp::Le,
        RelOpAst::Gt => RelOp::Gt,
        RelOpAst::Ge => RelOp::Ge,
    }
}

/// Equality accepts any matching atomic type; order comparisons are
/// numeric only.
fn check_comparison_operands(
    cx: &LowerCx<'_>,
    op: RelOpAst,
    lhs: TypeId,
    rhs: TypeId,
    span: Span,
) -> Result<(), Error> {
    if lhs != rhs {
        return Err(Error::type_mismatch(cx.ty_name(lhs), cx.ty_name(rhs), span));
    }
    match op {
        RelOpAst::Eq | RelOpAst::Ne => {
            if !cx.types.is_atomic(lhs) {
                return Err(Error::type_mismatch(
                    "an atomic type",
                    cx.ty_name(lhs),
                    span,
                ));
            }
        }
        _ => {
            if !cx.types.is_numeric(lhs) {
                return Err(Error::type_mismatch("int or float", cx.ty_name(lhs), span));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Logical terms
// ---------------------------------------------------------------------------

/// Lower a logical term (comparison operands, ranking components,
/// predicate arguments).
pub(crate) fn lower_term(e: &ast::Expr, cx: &mut LowerCx<'_>) -> Result<Term, Error> {
    let span = e.span;
    match &e.kind {
        ExprKind::Ident(name) => match cx.env.resolve(name) {
            Some(Binding::Local(v)) => Ok(Term::Var {
                name: v.name.clone(),
                ty: v.ty,
            }),
            // Struct-typed terms are legal only as member bases and
            // struct-typed predicate arguments; operator typing rejects
            // everything else.
            Some(Binding::Struct(sv)) => Ok(Term::Var {
                name: sv.name.clone(),
                ty: sv.ty,
            }),
            Some(Binding::Quantified(qv)) => Ok(Term::Var {
                name: qv.name.clone(),
                ty: qv.sort.ty(),
            }),
            None => Err(Error::unknown_name(name, span)),
        },
        ExprKind::IntLit(v) => Ok(Term::IntLit(*v)),
        ExprKind::FloatLit(v) => Ok(Term::FloatLit(*v)),
        ExprKind::BoolLit(_) => Err(Error::type_mismatch(
            "a term",
            "a boolean constant",
            span,
        )),
        ExprKind::Result => {
            if !cx.scope.result_allowed() {
                return Err(Error::illegal_annotation(
                    "`\\result` outside a postcondition",
                    span,
                ));
            }
            match cx.ret {
                None => Err(Error::unknown_name("\\result", span)),
                Some(Variable::Local(v)) => Ok(Term::Result { ty: v.ty }),
                // A struct \result must select a member syntactically;
                // the Member arm below handles that form.
                Some(Variable::Struct(_)) => {
                    Err(Error::new(ErrorKind::AmbiguousResult, span))
                }
            }
        }
        ExprKind::Old(inner) => {
            if !cx.scope.old_allowed() {
                return Err(Error::illegal_annotation(
                    "`\\old` outside a postcondition or loop invariant",
                    span,
                ));
            }
            let t = lower_term(inner, cx)?;
            if term_mentions_result(&t) {
                return Err(Error::illegal_annotation(
                    "`\\result` under `\\old`",
                    span,
                ));
            }
            Ok(Term::Old(Box::new(t)))
        }
        ExprKind::Length(inner) => {
            if cx.scope.is_guard() {
                return Err(Error::illegal_annotation(
                    "`\\length` in executable code",
                    span,
                ));
            }
            let t = lower_term(inner, cx)?;
            if !cx.types.is_array(t.ty()) {
                return Err(Error::type_mismatch("an array", cx.ty_name(t.ty()), span));
            }
            Ok(Term::Length(Box::new(t)))
        }
        ExprKind::ArrayUpdate { base, index, value } => {
            if cx.scope.is_guard() {
                return Err(Error::illegal_annotation(
                    "array update in executable code",
                    span,
                ));
            }
            let array = lower_term(base, cx)?;
            let elem = cx.types.array_elem(array.ty()).ok_or_else(|| {
                Error::type_mismatch("an array", cx.ty_name(array.ty()), base.span)
            })?;
            let index_term = lower_term(index, cx)?;
            if index_term.ty() != INT {
                return Err(Error::type_mismatch(
                    "int",
                    cx.ty_name(index_term.ty()),
                    index.span,
                ));
            }
            let value_term = lower_term(value, cx)?;
            if value_term.ty() != elem {
                return Err(Error::type_mismatch(
                    cx.ty_name(elem),
                    cx.ty_name(value_term.ty()),
                    value.span,
                ));
            }
            let ty = array.ty();
            Ok(Term::ArrayUpdate {
                array: Box::new(array),
                index: Box::new(index_term),
                value: Box::new(value_term),
                ty,
            })
        }
        ExprKind::Call { callee, args } => {
            if cx.env.predicate(callee).is_some() {
                return Err(Error::illegal_annotation(
                    format!("predicate `{callee}` applied in term position"),
                    span,
                ));
            }
            let (params, returns) = match cx.env.function(callee) {
                Some(sig) => (sig.params.clone(), sig.returns.clone()),
                None => return Err(Error::unknown_name(callee, span)),
            };
            if args.len() != params.len() {
                return Err(Error::type_mismatch(
                    format!("{} argument(s) to `{callee}`", params.len()),
                    format!("{}", args.len()),
                    span,
                ));
            }
            let mut arg_terms = Vec::with_capacity(args.len());
            for (arg, &param_ty) in args.iter().zip(params.iter()) {
                let lowered = lower_term(arg, cx)?;
                if lowered.ty() != param_ty {
                    return Err(Error::type_mismatch(
                        cx.ty_name(param_ty),
                        cx.ty_name(lowered.ty()),
                        arg.span,
                    ));
                }
                arg_terms.push(lowered);
            }
            match returns.as_slice() {
                [ret] => Ok(Term::Call {
                    callee: callee.clone(),
                    args: arg_terms,
                    ty: *ret,
                }),
                _ => Err(Error::type_mismatch(
                    "a single-value call",
                    format!("call to `{callee}`"),
                    span,
                )),
            }
        }
        ExprKind::Index { base, index } => {
            let array = lower_term(base, cx)?;
            let elem = cx.types.array_elem(array.ty()).ok_or_else(|| {
                Error::type_mismatch("an array", cx.ty_name(array.ty()), base.span)
            })?;
            let index_term = lower_term(index, cx)?;
            if index_term.ty() != INT {
                return Err(Error::type_mismatch(
                    "int",
                    cx.ty_name(index_term.ty()),
                    index.span,
                ));
            }
            Ok(Term::Subscript {
                array: Box::new(array),
                index: Box::new(index_term),
                ty: elem,
            })
        }
        ExprKind::Member { base, field } => lower_member_term(base, field, span, cx),
        ExprKind::Unary { op, operand } => match op {
            UnOpAst::Neg => {
                let inner = lower_term(operand, cx)?;
                let ty = inner.ty();
                if !cx.types.is_numeric(ty) {
                    return Err(Error::type_mismatch(
                        "int or float",
                        cx.ty_name(ty),
                        operand.span,
                    ));
                }
                Ok(Term::Neg {
                    operand: Box::new(inner),
                    ty,
                })
            }
            UnOpAst::Not => Err(Error::type_mismatch("a term", "a boolean operation", span)),
        },
        ExprKind::Binary { op, lhs, rhs } => {
            let op = match op {
                BinOpAst::Add => TermBinOp::Add,
                BinOpAst::Sub => TermBinOp::Sub,
                BinOpAst::Mul => TermBinOp::Mul,
                BinOpAst::Div => TermBinOp::Div,
                BinOpAst::Rem => TermBinOp::Rem,
                BinOpAst::And
                | BinOpAst::Or
                | BinOpAst::Implies
                | BinOpAst::Iff
                | BinOpAst::Xor => {
                    return Err(Error::type_mismatch(
                        "a term",
                        "a predicate connective",
                        span,
                    ));
                }
            };
            let l = lower_term(lhs, cx)?;
            let r = lower_term(rhs, cx)?;
            let ty = require_same_numeric(cx, l.ty(), r.ty(), span)?;
            if op == TermBinOp::Rem && ty != INT {
                return Err(Error::type_mismatch("int", cx.ty_name(ty), span));
            }
            Ok(Term::Binary {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r),
                ty,
            })
        }
        ExprKind::Compare { .. } => Err(Error::type_mismatch("a term", "a comparison", span)),
        ExprKind::Quant { .. } => Err(Error::type_mismatch(
            "a term",
            "a quantified predicate",
            span,
        )),
    }
}

/// `base.field` in term position. The base is a struct variable or a
/// struct-returning `\result`.
fn lower_member_term(
    base: &ast::Expr,
    field: &str,
    span: Span,
    cx: &mut LowerCx<'_>,
) -> Result<Term, Error> {
    match &base.kind {
        ExprKind::Ident(name) => match cx.env.resolve(name) {
            Some(Binding::Struct(sv)) => match sv.member(field) {
                Some(member) => Ok(Term::Member {
                    base: Box::new(Term::Var {
                        name: sv.name.clone(),
                        ty: sv.ty,
                    }),
                    field: field.to_string(),
                    ty: member.ty,
                }),
                None => Err(Error::unknown_name(format!("{name}.{field}"), span)),
            },
            Some(Binding::Local(v)) => Err(Error::type_mismatch(
                "a struct variable",
                cx.ty_name(v.ty),
                base.span,
            )),
            Some(Binding::Quantified(_)) => Err(Error::type_mismatch(
                "a struct variable",
                "a quantified variable",
                base.span,
            )),
            None => Err(Error::unknown_name(name, base.span)),
        },
        ExprKind::Result => {
            if !cx.scope.result_allowed() {
                return Err(Error::illegal_annotation(
                    "`\\result` outside a postcondition",
                    base.span,
                ));
            }
            match cx.ret {
                Some(Variable::Struct(sv)) => match sv.member(field) {
                    Some(member) => Ok(Term::Member {
                        base: Box::new(Term::Result { ty: sv.ty }),
                        field: field.to_string(),
                        ty: member.ty,
                    }),
                    None => Err(Error::unknown_name(format!("\\result.{field}"), span)),
                },
                Some(Variable::Local(v)) => Err(Error::type_mismatch(
                    "a struct return",
                    cx.ty_name(v.ty),
                    base.span,
                )),
                None => Err(Error::unknown_name("\\result", base.span)),
            }
        }
        _ => Err(Error::type_mismatch(
            "a struct variable",
            "a compound expression",
            base.span,
        )),
    }
}

fn term_mentions_result(t: &Term) -> bool {
    match t {
        Term::Result { .. } => true,
        Term::Var { .. } | Term::IntLit(_) | Term::FloatLit(_) => false,
        Term::Member { base, .. } => term_mentions_result(base),
        Term::Call { args, .. } => args.iter().any(term_mentions_result),
        Term::Subscript { array, index, .. } => {
            term_mentions_result(array) || term_mentions_result(index)
        }
        Term::Length(inner) | Term::Old(inner) => term_mentions_result(inner),
        Term::ArrayUpdate {
            array,
            index,
            value,
            ..
        } => {
            term_mentions_result(array)
                || term_mentions_result(index)
                || term_mentions_result(value)
        }
        Term::Neg { operand, .. } => term_mentions_result(operand),
        Term::Binary { lhs, rhs, .. } => {
            term_mentions_result(lhs) || term_mentions_result(rhs)
        }
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Lower a predicate: contract clauses, loop invariants, assertions,
/// predicate bodies, and (with [`SpecScope::Guard`]) executable branch
/// conditions.
pub(crate) fn lower_pred(e: &ast::Expr, cx: &mut LowerCx<'_>) -> Result<Pred, Error> {
    let span = e.span;
    match &e.kind {
        ExprKind::BoolLit(true) => Ok(Pred::True),
        ExprKind::BoolLit(false) => Ok(Pred::False),
        // Bool-typed variables, members, subscripts, and `\result` lift
        // into predicate atoms.
        ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        | ExprKind::Result => {
            let t = lower_term(e, cx)?;
            if t.ty() != BOOL {
                return Err(Error::type_mismatch("bool", cx.ty_name(t.ty()), span));
            }
            Ok(Pred::Atom(t))
        }
        ExprKind::Call { callee, args } => {
            if cx.env.predicate(callee).is_some() {
                if cx.scope.is_guard() {
                    return Err(Error::illegal_annotation(
                        format!("predicate `{callee}` called in executable code"),
                        span,
                    ));
                }
                return lower_pred_app(callee, args, span, cx);
            }
            if cx.env.function(callee).is_some() {
                // Guards come from executable code, where bool-returning
                // calls are ordinary conditions. In annotations a function
                // in predicate position is an error.
                if cx.scope.is_guard() {
                    let t = lower_term(e, cx)?;
                    if t.ty() != BOOL {
                        return Err(Error::type_mismatch("bool", cx.ty_name(t.ty()), span));
                    }
                    return Ok(Pred::Atom(t));
                }
                return Err(Error::illegal_annotation(
                    format!("function `{callee}` called in predicate position"),
                    span,
                ));
            }
            Err(Error::unknown_name(callee, span))
        }
        ExprKind::Unary { op, operand } => match op {
            UnOpAst::Not => Ok(Pred::Not(Box::new(lower_pred(operand, cx)?))),
            UnOpAst::Neg => Err(Error::type_mismatch(
                "a predicate",
                "an arithmetic expression",
                span,
            )),
        },
        ExprKind::Binary { op, lhs, rhs } => {
            match op {
                BinOpAst::And => Ok(Pred::And(vec![
                    lower_pred(lhs, cx)?,
                    lower_pred(rhs, cx)?,
                ])),
                BinOpAst::Or => Ok(Pred::Or(vec![
                    lower_pred(lhs, cx)?,
                    lower_pred(rhs, cx)?,
                ])),
                BinOpAst::Implies | BinOpAst::Iff | BinOpAst::Xor => {
                    if cx.scope.is_guard() {
                        return Err(Error::illegal_annotation(
                            "predicate connective in executable code",
                            span,
                        ));
                    }
                    let l = Box::new(lower_pred(lhs, cx)?);
                    let r = Box::new(lower_pred(rhs, cx)?);
                    Ok(match op {
                        BinOpAst::Implies => Pred::Implies(l, r),
                        BinOpAst::Iff => Pred::Iff(l, r),
                        _ => Pred::Xor(l, r),
                    })
                }
                _ => Err(Error::type_mismatch(
                    "a predicate",
                    "an arithmetic expression",
                    span,
                )),
            }
        }
        ExprKind::Compare { operands, ops } => {
            if operands.len() != ops.len() + 1 || ops.is_empty() {
                return Err(Error::internal("malformed comparison chain", span));
            }
            let lowered: Vec<Term> = operands
                .iter()
                .map(|o| lower_term(o, cx))
                .collect::<Result<_, _>>()?;
            let mut links = Vec::with_capacity(ops.len());
            for (i, op) in ops.iter().enumerate() {
                let lhs = &lowered[i];
                let rhs = &lowered[i + 1];
                check_comparison_operands(cx, *op, lhs.ty(), rhs.ty(), operands[i + 1].span)?;
                links.push(Pred::Cmp {
                    op: rel_op(*op),
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                });
            }
            if links.len() == 1 {
                Ok(links.remove(0))
            } else {
                Ok(Pred::And(links))
            }
        }
        ExprKind::Quant { q, binders, body } => {
            if cx.scope.is_guard() {
                return Err(Error::illegal_annotation(
                    "quantifier in an executable expression",
                    span,
                ));
            }
            let q = match q {
                QuantAst::Forall => Quantifier::Forall,
                QuantAst::Exists => Quantifier::Exists,
            };
            cx.env.push_scope();
            let mut vars = Vec::with_capacity(binders.len());
            for (name, sort) in binders {
                let sort = match sort {
                    SortAst::Bool => LogicalSort::Bool,
                    SortAst::Int => LogicalSort::Int,
                    SortAst::Real => LogicalSort::Real,
                };
                let qv = QuantifiedVar {
                    name: cx.namer.fresh(name),
                    source_name: name.clone(),
                    sort,
                };
                if cx
                    .env
                    .declare(name, Binding::Quantified(qv.clone()))
                    .is_err()
                {
                    cx.env.pop_scope();
                    return Err(Error::duplicate_name(name, span));
                }
                vars.push(qv);
            }
            let body = lower_pred(body, cx);
            cx.env.pop_scope();
            Ok(Pred::Quant {
                q,
                binders: vars,
                body: Box::new(body?),
            })
        }
        ExprKind::Old(inner) => {
            if !cx.scope.old_allowed() {
                return Err(Error::illegal_annotation(
                    "`\\old` outside a postcondition or loop invariant",
                    span,
                ));
            }
            Ok(Pred::Old(Box::new(lower_pred(inner, cx)?)))
        }
        ExprKind::IntLit(_) | ExprKind::FloatLit(_) => Err(Error::type_mismatch(
            "a predicate",
            "a numeric constant",
            span,
        )),
        ExprKind::Length(_) | ExprKind::ArrayUpdate { .. } => Err(Error::type_mismatch(
            "a predicate",
            "a term",
            span,
        )),
    }
}

/// Application of a named predicate: arity and argument types against the
/// registered (source-level) signature.
fn lower_pred_app(
    callee: &str,
    args: &[ast::Expr],
    span: Span,
    cx: &mut LowerCx<'_>,
) -> Result<Pred, Error> {
    let params = match cx.env.predicate(callee) {
        Some(sig) => sig.params.clone(),
        None => return Err(Error::unknown_name(callee, span)),
    };
    if args.len() != params.len() {
        return Err(Error::type_mismatch(
            format!("{} argument(s) to `{callee}`", params.len()),
            format!("{}", args.len()),
            span,
        ));
    }
    let mut arg_terms = Vec::with_capacity(args.len());
    for (arg, &param_ty) in args.iter().zip(params.iter()) {
        let lowered = lower_term(arg, cx)?;
        if lowered.ty() != param_ty {
            return Err(Error::type_mismatch(
                cx.ty_name(param_ty),
                cx.ty_name(lowered.ty()),
                arg.span,
            ));
        }
        arg_terms.push(lowered);
    }
    Ok(Pred::App {
        callee: callee.to_string(),
        args: arg_terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr as Ast;
    use crate::env::FunSig;
    use imp_fv_ir::types::{ArrayLength, FLOAT};
    use imp_fv_ir::var::LocalVar;

    struct Fixture {
        types: TypeTable,
        env: Env,
        namer: Namer,
    }

    impl Fixture {
        fn new() -> Self {
            let mut types = TypeTable::new();
            let int_array = types.get_array(imp_fv_ir::types::AtomicType::Int, ArrayLength::Unknown);
            let mut env = Env::new();
            env.push_scope();
            env.declare("x", Binding::Local(LocalVar::new("x@0", "x", INT)))
                .unwrap();
            env.declare("y", Binding::Local(LocalVar::new("y@1", "y", FLOAT)))
                .unwrap();
            env.declare("b", Binding::Local(LocalVar::new("b@2", "b", BOOL)))
                .unwrap();
            env.declare("a", Binding::Local(LocalVar::new("a@3", "a", int_array)))
                .unwrap();
            env.declare_function(FunSig {
                name: "inc".to_string(),
                ty: INT, // signature type handle unused by lowering
                params: vec![INT],
                returns: vec![INT],
            });
            Self {
                types,
                env,
                namer: Namer::new(),
            }
        }

        fn cx(&mut self, scope: SpecScope) -> LowerCx<'_> {
            LowerCx {
                types: &self.types,
                env: &mut self.env,
                namer: &mut self.namer,
                ret: None,
                scope,
            }
        }
    }

    #[test]
    fn arithmetic_requires_matching_types() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let mixed = Ast::binary(BinOpAst::Add, Ast::ident("x"), Ast::ident("y"));
        let err = lower_expr(&mixed, &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn rem_is_int_only() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let e = Ast::binary(BinOpAst::Rem, Ast::ident("y"), Ast::ident("y"));
        let err = lower_expr(&e, &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn unknown_identifier() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let err = lower_expr(&Ast::ident("nope"), &mut cx).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnknownName {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn call_arity_checked() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let e = Ast::call("inc", vec![Ast::int(1), Ast::int(2)]);
        let err = lower_expr(&e, &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn chained_comparison_desugars_to_conjunction() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Requires);
        let chain = Ast::cmp_chain(
            vec![Ast::int(0), Ast::ident("x"), Ast::int(10)],
            vec![RelOpAst::Le, RelOpAst::Lt],
        );
        let p = lower_pred(&chain, &mut cx).unwrap();
        match p {
            Pred::And(links) => {
                assert_eq!(links.len(), 2);
                assert!(matches!(&links[0], Pred::Cmp { op: RelOp::Le, .. }));
                assert!(matches!(&links[1], Pred::Cmp { op: RelOp::Lt, .. }));
                // The shared operand appears in both links.
                if let (Pred::Cmp { rhs, .. }, Pred::Cmp { lhs, .. }) = (&links[0], &links[1]) {
                    assert_eq!(rhs, lhs);
                }
            }
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn old_rejected_in_requires() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Requires);
        let e = Ast::cmp(RelOpAst::Eq, Ast::old(Ast::ident("x")), Ast::int(0));
        let err = lower_pred(&e, &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalAnnotationForm { .. }));
    }

    #[test]
    fn old_accepted_in_ensures() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Ensures);
        let e = Ast::cmp(RelOpAst::Eq, Ast::old(Ast::ident("x")), Ast::ident("x"));
        let p = lower_pred(&e, &mut cx).unwrap();
        assert!(p.mentions_old());
    }

    #[test]
    fn quantifier_rejected_in_guard() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let e = Ast::forall(
            vec![("k".to_string(), SortAst::Int)],
            Ast::cmp(RelOpAst::Ge, Ast::ident("k"), Ast::ident("k")),
        );
        let err = lower_pred(&e, &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalAnnotationForm { .. }));
    }

    #[test]
    fn quantifier_binders_are_alpha_renamed() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::PredicateBody);
        let e = Ast::forall(
            vec![("k".to_string(), SortAst::Int)],
            Ast::cmp(RelOpAst::Ge, Ast::ident("k"), Ast::int(0)),
        );
        match lower_pred(&e, &mut cx).unwrap() {
            Pred::Quant { binders, .. } => {
                assert_eq!(binders[0].source_name, "k");
                assert_ne!(binders[0].name, "k");
            }
            other => panic!("expected quantifier, got {other:?}"),
        }
    }

    #[test]
    fn bool_var_lifts_to_atom() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let p = lower_pred(&Ast::ident("b"), &mut cx).unwrap();
        assert!(matches!(p, Pred::Atom(Term::Var { .. })));
    }

    #[test]
    fn int_var_is_not_a_predicate() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let err = lower_pred(&Ast::ident("x"), &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn length_is_term_only() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Guard);
        let e = Ast::cmp(RelOpAst::Lt, Ast::ident("x"), Ast::length(Ast::ident("a")));
        let err = lower_pred(&e, &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalAnnotationForm { .. }));

        let mut cx = fx.cx(SpecScope::LoopInvariant);
        let e = Ast::cmp(RelOpAst::Lt, Ast::ident("x"), Ast::length(Ast::ident("a")));
        assert!(lower_pred(&e, &mut cx).is_ok());
    }

    #[test]
    fn array_update_preserves_array_type() {
        let mut fx = Fixture::new();
        let mut cx = fx.cx(SpecScope::Ensures);
        let upd = Ast::new(
            ExprKind::ArrayUpdate {
                base: Box::new(Ast::ident("a")),
                index: Box::new(Ast::int(0)),
                value: Box::new(Ast::int(7)),
            },
            Span::default(),
        );
        let t = lower_term(&upd, &mut cx).unwrap();
        let array_ty = match cx.env.resolve("a") {
            Some(Binding::Local(v)) => v.ty,
            other => panic!("unexpected binding: {other:?}"),
        };
        assert_eq!(t.ty(), array_ty);
    }

    #[test]
    fn result_under_old_rejected() {
        let mut fx = Fixture::new();
        let ret = Variable::Local(LocalVar::new("result@9", "\\result", INT));
        let mut cx = LowerCx {
            types: &fx.types,
            env: &mut fx.env,
            namer: &mut fx.namer,
            ret: Some(&ret),
            scope: SpecScope::Ensures,
        };
        let e = Ast::old(Ast::result());
        let err = lower_term(&e, &mut cx).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalAnnotationForm { .. }));
    }
}
