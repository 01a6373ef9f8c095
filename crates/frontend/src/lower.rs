//! Statement lowering: structured syntax to the block CFG.
//!
//! The builder keeps three cursors while visiting a function body: the
//! basic block currently being appended to (`None` once control flow has
//! ended), and the break/continue targets, which are saved and restored
//! around each loop. Cut blocks are created at function entry and exit
//! and at every loop construct before the first test.

use imp_fv_ir as ir;
use imp_fv_ir::block::{BlockId, BlockKind, Cfg};
use imp_fv_ir::pred::Pred;
use imp_fv_ir::stmt::Statement;
use imp_fv_ir::term::Term;
use imp_fv_ir::types::{TypeId, TypeTable};
use imp_fv_ir::var::{LocalVar, StructVar, Variable};

use crate::ast::{self, ExprKind, LValue, Span, StmtKind, TypeAst};
use crate::env::{Binding, Env, FunSig, PredSig};
use crate::error::{Error, ErrorKind};
use crate::lower_expr::{
    LowerCx, Namer, SpecScope, check_exec_call, lower_expr, lower_pred, lower_term,
};

/// Resolve a written type to an interned handle. `unknown_len_ok` is true
/// for parameter positions, where array lengths are unspecified.
pub(crate) fn resolve_type(
    types: &mut TypeTable,
    ast_ty: &TypeAst,
    span: Span,
    unknown_len_ok: bool,
) -> Result<TypeId, Error> {
    match ast_ty {
        TypeAst::Int => Ok(imp_fv_ir::types::INT),
        TypeAst::Float => Ok(imp_fv_ir::types::FLOAT),
        TypeAst::Bool => Ok(imp_fv_ir::types::BOOL),
        TypeAst::Array { elem, len } => {
            let elem = match elem.as_ref() {
                TypeAst::Int => ir::AtomicType::Int,
                TypeAst::Float => ir::AtomicType::Float,
                TypeAst::Bool => ir::AtomicType::Bool,
                other => {
                    return Err(Error::type_mismatch(
                        "an atomic element type",
                        describe_type_ast(other),
                        span,
                    ));
                }
            };
            let len = match len {
                Some(n) => ir::ArrayLength::Fixed(*n),
                None if unknown_len_ok => ir::ArrayLength::Unknown,
                None => {
                    return Err(Error::type_mismatch(
                        "an array with a compile-time length",
                        "an array of unspecified length",
                        span,
                    ));
                }
            };
            Ok(types.get_array(elem, len))
        }
        TypeAst::Struct(name) => types
            .get_struct(name)
            .ok_or_else(|| Error::unknown_name(name, span)),
    }
}

fn describe_type_ast(ty: &TypeAst) -> String {
    match ty {
        TypeAst::Int => "int".to_string(),
        TypeAst::Float => "float".to_string(),
        TypeAst::Bool => "bool".to_string(),
        TypeAst::Array { .. } => "an array".to_string(),
        TypeAst::Struct(name) => format!("struct {name}"),
    }
}

/// Lowers one function definition to an [`ir::Function`].
pub(crate) struct FunctionLowerer<'a> {
    pub types: &'a mut TypeTable,
    pub env: &'a mut Env,
    pub namer: Namer,
    pub cfg: Cfg,
    current: Option<BlockId>,
    break_target: Option<BlockId>,
    continue_target: Option<BlockId>,
    /// The function's return slot; `None` for void functions.
    pub ret: Option<Variable>,
    pub params: Vec<Variable>,
    pub locals: Vec<Variable>,
    name: String,
    span: Span,
}

impl<'a> FunctionLowerer<'a> {
    pub(crate) fn new(
        types: &'a mut TypeTable,
        env: &'a mut Env,
        name: &str,
        span: Span,
    ) -> Self {
        Self {
            types,
            env,
            namer: Namer::new(),
            cfg: Cfg::new(),
            current: None,
            break_target: None,
            continue_target: None,
            ret: None,
            params: Vec::new(),
            locals: Vec::new(),
            name: name.to_string(),
            span,
        }
    }

    fn cx(&mut self, scope: SpecScope) -> LowerCx<'_> {
        LowerCx {
            types: &*self.types,
            env: &mut *self.env,
            namer: &mut self.namer,
            ret: self.ret.as_ref(),
            scope,
        }
    }

    /// Build a variable for a declaration site, α-renaming it. Struct
    /// types get a transient [`StructVar`] backed by one scalar local per
    /// member.
    fn make_var(&mut self, source: &str, ty: TypeId) -> Variable {
        let unique = self.namer.fresh(source);
        if let Some(members) = self.types.struct_members(ty) {
            let members = members
                .iter()
                .map(|(field, atomic)| {
                    (
                        field.clone(),
                        LocalVar::new(
                            format!("{unique}.{field}"),
                            format!("{source}.{field}"),
                            atomic.id(),
                        ),
                    )
                })
                .collect();
            Variable::Struct(StructVar {
                name: unique,
                source_name: source.to_string(),
                ty,
                members,
            })
        } else {
            Variable::Local(LocalVar::new(unique, source, ty))
        }
    }

    fn declare(&mut self, source: &str, var: Variable, span: Span) -> Result<(), Error> {
        let binding = match &var {
            Variable::Local(v) => Binding::Local(v.clone()),
            Variable::Struct(v) => Binding::Struct(v.clone()),
        };
        self.env
            .declare(source, binding)
            .map_err(|_| Error::duplicate_name(source, span))
    }

    fn ensure_current(&mut self) -> BlockId {
        match self.current {
            Some(b) => b,
            None => {
                let b = self.cfg.push_basic();
                self.current = Some(b);
                b
            }
        }
    }

    fn emit(&mut self, stmt: Statement) {
        let b = self.ensure_current();
        if let BlockKind::Basic { statements } = &mut self.cfg.blocks[b].kind {
            statements.push(stmt);
        }
    }

    /// Lower the whole definition. On success the caller takes `cfg`,
    /// `params`, `ret`, and `locals` to assemble the [`ir::Function`].
    pub(crate) fn lower(&mut self, fun: &ast::FunDef) -> Result<(), Error> {
        // Return slot first: the contract lowering needs it for \result.
        if let Some(ret_ty) = &fun.return_ty {
            let ty = resolve_type(self.types, ret_ty, fun.span, false)?;
            if self.types.is_array(ty) {
                return Err(Error::type_mismatch(
                    "a scalar or struct return type",
                    self.types.display_name(ty),
                    fun.span,
                ));
            }
            self.ret = Some(self.make_var("result", ty));
        }

        // Parameters share the body's outermost scope, so a local
        // redeclaring a parameter is a duplicate, not a shadow.
        self.env.push_scope();
        let mut param_tys = Vec::with_capacity(fun.params.len());
        for p in &fun.params {
            let ty = resolve_type(self.types, &p.ty, p.span, true)?;
            param_tys.push(ty);
            let var = self.make_var(&p.name, ty);
            self.declare(&p.name, var.clone(), p.span)?;
            self.params.push(var);
        }

        // The signature is visible to the body the moment it is fixed, so
        // functions may recurse.
        let returns: Vec<TypeId> = self.ret.iter().map(|r| r.ty()).collect();
        let fun_ty = self.types.get_fun(returns.clone(), param_tys.clone());
        self.env.declare_function(FunSig {
            name: self.name.clone(),
            ty: fun_ty,
            params: param_tys,
            returns,
        });

        self.lower_contract(&fun.contract)?;

        // The entry block cannot hold statements; the body starts in a
        // fresh basic block hanging off it.
        let first = self.cfg.push_basic();
        self.cfg.add_edge(self.cfg.entry, first, None);
        self.current = Some(first);

        self.lower_stmts(&fun.body)?;

        match self.current {
            Some(b) if self.ret.is_none() => {
                let exit = self.cfg.exit;
                self.cfg.add_edge(b, exit, None);
            }
            Some(_) => {
                return Err(Error::new(
                    ErrorKind::MissingReturn {
                        function: self.name.clone(),
                    },
                    fun.span,
                ));
            }
            None => {}
        }

        crate::annot::bind_annotations(
            &mut self.cfg,
            self.ret.as_ref(),
            &mut self.namer,
            &mut self.locals,
            fun.span,
        )?;

        self.env.pop_scope();
        tracing::debug!(
            function = %self.name,
            blocks = self.cfg.blocks.len(),
            "lowered function body"
        );
        Ok(())
    }

    fn lower_contract(&mut self, contract: &ast::Contract) -> Result<(), Error> {
        let mut requires = Vec::with_capacity(contract.requires.len());
        for clause in &contract.requires {
            let mut cx = self.cx(SpecScope::Requires);
            requires.push(lower_pred(clause, &mut cx)?);
        }
        let mut rankings = Vec::with_capacity(contract.decreases.len());
        for component in &contract.decreases {
            let mut cx = self.cx(SpecScope::Decreases);
            let term = lower_term(component, &mut cx)?;
            if term.ty() != imp_fv_ir::types::INT {
                return Err(Error::type_mismatch(
                    "int",
                    self.types.display_name(term.ty()),
                    component.span,
                ));
            }
            rankings.push(term);
        }
        let mut ensures = Vec::with_capacity(contract.ensures.len());
        for clause in &contract.ensures {
            let mut cx = self.cx(SpecScope::Ensures);
            ensures.push(lower_pred(clause, &mut cx)?);
        }

        let entry = self.cfg.entry;
        if let BlockKind::Precondition {
            assertions,
            rankings: entry_rankings,
            ..
        } = &mut self.cfg.blocks[entry].kind
        {
            *assertions = requires;
            *entry_rankings = rankings;
        }
        let exit = self.cfg.exit;
        if let BlockKind::Postcondition { assertions } = &mut self.cfg.blocks[exit].kind {
            *assertions = ensures;
        }
        Ok(())
    }

    fn lower_loop_annot(
        &mut self,
        annot: &ast::LoopAnnot,
    ) -> Result<(Vec<Pred>, Vec<Term>), Error> {
        let mut invariants = Vec::with_capacity(annot.invariants.len());
        for clause in &annot.invariants {
            let mut cx = self.cx(SpecScope::LoopInvariant);
            invariants.push(lower_pred(clause, &mut cx)?);
        }
        let mut rankings = Vec::with_capacity(annot.variant.len());
        for component in &annot.variant {
            let mut cx = self.cx(SpecScope::LoopVariant);
            let term = lower_term(component, &mut cx)?;
            if term.ty() != imp_fv_ir::types::INT {
                return Err(Error::type_mismatch(
                    "int",
                    self.types.display_name(term.ty()),
                    component.span,
                ));
            }
            rankings.push(term);
        }
        Ok((invariants, rankings))
    }

    fn lower_stmts(&mut self, stmts: &[ast::Stmt]) -> Result<(), Error> {
        for s in stmts {
            self.lower_stmt(s)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, s: &ast::Stmt) -> Result<(), Error> {
        let span = s.span;
        match &s.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Decl { name, ty, init } => self.lower_decl(name, ty, init.as_ref(), span),
            StmtKind::Assign { target, value } => self.lower_assign(target, value, span),
            StmtKind::Expr(e) => self.lower_expr_stmt(e, span),
            StmtKind::Assert(e) => {
                let mut cx = self.cx(SpecScope::Assertion);
                let pred = lower_pred(e, &mut cx)?;
                self.emit(Statement::Assert(pred));
                Ok(())
            }
            StmtKind::Block(body) => {
                self.env.push_scope();
                let result = self.lower_stmts(body);
                self.env.pop_scope();
                result
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(cond, then_body, else_body),
            StmtKind::While { annot, cond, body } => self.lower_while(annot, cond, body),
            StmtKind::DoWhile { annot, body, cond } => self.lower_do_while(annot, body, cond),
            StmtKind::For {
                annot,
                init,
                cond,
                step,
                body,
            } => self.lower_for(annot, init.as_deref(), cond, step.as_deref(), body),
            StmtKind::Break => match self.break_target {
                Some(target) => {
                    let b = self.ensure_current();
                    self.cfg.add_edge(b, target, None);
                    self.current = None;
                    Ok(())
                }
                None => Err(Error::illegal_annotation("`break` outside of a loop", span)),
            },
            StmtKind::Continue => match self.continue_target {
                Some(target) => {
                    let b = self.ensure_current();
                    self.cfg.add_edge(b, target, None);
                    self.current = None;
                    Ok(())
                }
                None => Err(Error::illegal_annotation(
                    "`continue` outside of a loop",
                    span,
                )),
            },
            StmtKind::Return(value) => self.lower_return(value.as_ref(), span),
        }
    }

    fn lower_decl(
        &mut self,
        name: &str,
        ty: &TypeAst,
        init: Option<&ast::Expr>,
        span: Span,
    ) -> Result<(), Error> {
        let ty = resolve_type(self.types, ty, span, false)?;
        let var = self.make_var(name, ty);
        self.declare(name, var.clone(), span)?;
        self.locals.push(var.clone());

        let Some(init) = init else {
            return Ok(());
        };
        match &var {
            Variable::Local(v) => {
                if self.types.is_array(v.ty) {
                    return Err(Error::type_mismatch(
                        "an array declaration without an initializer",
                        "an initializer",
                        span,
                    ));
                }
                let mut cx = self.cx(SpecScope::Guard);
                let value = lower_expr(init, &mut cx)?;
                if value.ty() != v.ty {
                    return Err(Error::type_mismatch(
                        self.types.display_name(v.ty),
                        self.types.display_name(value.ty()),
                        init.span,
                    ));
                }
                let target = v.name.clone();
                self.emit(Statement::Assign { target, value });
                Ok(())
            }
            Variable::Struct(sv) => {
                let sv = sv.clone();
                self.copy_struct_into(&sv, init, span)
            }
        }
    }

    /// Memberwise copy of a struct value (a struct variable or a
    /// struct-returning call) into `target`.
    fn copy_struct_into(
        &mut self,
        target: &StructVar,
        source: &ast::Expr,
        span: Span,
    ) -> Result<(), Error> {
        match &source.kind {
            ExprKind::Ident(name) => {
                let src = match self.env.resolve(name) {
                    Some(Binding::Struct(sv)) => sv.clone(),
                    Some(Binding::Local(v)) => {
                        return Err(Error::type_mismatch(
                            self.types.display_name(target.ty),
                            self.types.display_name(v.ty),
                            source.span,
                        ));
                    }
                    Some(Binding::Quantified(_)) => {
                        return Err(Error::internal(
                            "quantified binder visible in executable code",
                            source.span,
                        ));
                    }
                    None => return Err(Error::unknown_name(name, source.span)),
                };
                if src.ty != target.ty {
                    return Err(Error::type_mismatch(
                        self.types.display_name(target.ty),
                        self.types.display_name(src.ty),
                        source.span,
                    ));
                }
                for (field, member) in &target.members {
                    let value = ir::Expr::Member {
                        base: src.name.clone(),
                        field: field.clone(),
                        ty: member.ty,
                    };
                    self.emit(Statement::MemberAssign {
                        target: target.name.clone(),
                        field: field.clone(),
                        value,
                    });
                }
                Ok(())
            }
            ExprKind::Call { callee, args } => {
                let callee = callee.clone();
                let (arg_exprs, returns) = {
                    let mut cx = self.cx(SpecScope::Guard);
                    check_exec_call(&callee, args, span, &mut cx)?
                };
                if returns.len() != 1 || returns[0] != target.ty {
                    let got = match returns.as_slice() {
                        [] => "call to a void function".to_string(),
                        [ty] => self.types.display_name(*ty),
                        _ => "a multi-value call".to_string(),
                    };
                    return Err(Error::type_mismatch(
                        self.types.display_name(target.ty),
                        got,
                        span,
                    ));
                }
                self.emit(Statement::Call {
                    callee,
                    args: arg_exprs,
                    results: vec![target.name.clone()],
                });
                Ok(())
            }
            _ => Err(Error::type_mismatch(
                self.types.display_name(target.ty),
                "a non-struct expression",
                source.span,
            )),
        }
    }

    fn lower_assign(
        &mut self,
        target: &LValue,
        value: &ast::Expr,
        span: Span,
    ) -> Result<(), Error> {
        match target {
            LValue::Var(name) => match self.env.resolve(name).cloned() {
                Some(Binding::Local(v)) => {
                    if self.types.is_array(v.ty) {
                        return Err(Error::type_mismatch(
                            "a scalar assignment target",
                            self.types.display_name(v.ty),
                            span,
                        ));
                    }
                    let mut cx = self.cx(SpecScope::Guard);
                    let lowered = lower_expr(value, &mut cx)?;
                    if lowered.ty() != v.ty {
                        return Err(Error::type_mismatch(
                            self.types.display_name(v.ty),
                            self.types.display_name(lowered.ty()),
                            value.span,
                        ));
                    }
                    self.emit(Statement::Assign {
                        target: v.name,
                        value: lowered,
                    });
                    Ok(())
                }
                Some(Binding::Struct(sv)) => self.copy_struct_into(&sv, value, span),
                Some(Binding::Quantified(_)) => Err(Error::internal(
                    "quantified binder visible in executable code",
                    span,
                )),
                None => Err(Error::unknown_name(name, span)),
            },
            LValue::Index { array, index } => {
                let v = match self.env.resolve(array).cloned() {
                    Some(Binding::Local(v)) => v,
                    Some(_) => {
                        return Err(Error::type_mismatch("an array", "a struct", span));
                    }
                    None => return Err(Error::unknown_name(array, span)),
                };
                let elem = self.types.array_elem(v.ty).ok_or_else(|| {
                    Error::type_mismatch("an array", self.types.display_name(v.ty), span)
                })?;
                let mut cx = self.cx(SpecScope::Guard);
                let index_expr = lower_expr(index, &mut cx)?;
                if index_expr.ty() != imp_fv_ir::types::INT {
                    return Err(Error::type_mismatch(
                        "int",
                        self.types.display_name(index_expr.ty()),
                        index.span,
                    ));
                }
                let mut cx = self.cx(SpecScope::Guard);
                let lowered = lower_expr(value, &mut cx)?;
                if lowered.ty() != elem {
                    return Err(Error::type_mismatch(
                        self.types.display_name(elem),
                        self.types.display_name(lowered.ty()),
                        value.span,
                    ));
                }
                self.emit(Statement::ArrayAssign {
                    array: v.name,
                    index: index_expr,
                    value: lowered,
                });
                Ok(())
            }
            LValue::Member { base, field } => {
                let sv = match self.env.resolve(base).cloned() {
                    Some(Binding::Struct(sv)) => sv,
                    Some(Binding::Local(v)) => {
                        return Err(Error::type_mismatch(
                            "a struct variable",
                            self.types.display_name(v.ty),
                            span,
                        ));
                    }
                    Some(Binding::Quantified(_)) => {
                        return Err(Error::internal(
                            "quantified binder visible in executable code",
                            span,
                        ));
                    }
                    None => return Err(Error::unknown_name(base, span)),
                };
                let member_ty = match sv.member(field) {
                    Some(m) => m.ty,
                    None => {
                        return Err(Error::unknown_name(format!("{base}.{field}"), span));
                    }
                };
                let mut cx = self.cx(SpecScope::Guard);
                let lowered = lower_expr(value, &mut cx)?;
                if lowered.ty() != member_ty {
                    return Err(Error::type_mismatch(
                        self.types.display_name(member_ty),
                        self.types.display_name(lowered.ty()),
                        value.span,
                    ));
                }
                self.emit(Statement::MemberAssign {
                    target: sv.name,
                    field: field.clone(),
                    value: lowered,
                });
                Ok(())
            }
        }
    }

    /// Expression statement. Calls stay in the IR — the backend must still
    /// check the callee's precondition at the call site — with a scratch
    /// binding for any discarded return value. Call-free expressions are
    /// type-checked and dropped.
    fn lower_expr_stmt(&mut self, e: &ast::Expr, span: Span) -> Result<(), Error> {
        if let ExprKind::Call { callee, args } = &e.kind {
            let callee = callee.clone();
            let (arg_exprs, returns) = {
                let mut cx = self.cx(SpecScope::Guard);
                check_exec_call(&callee, args, span, &mut cx)?
            };
            let results = match returns.as_slice() {
                [] => Vec::new(),
                [ret_ty] => {
                    let scratch = self.make_var(&format!("{callee}_ret"), *ret_ty);
                    self.locals.push(scratch.clone());
                    vec![scratch.name().to_string()]
                }
                _ => {
                    return Err(Error::type_mismatch(
                        "a single-value call",
                        format!("call to `{callee}`"),
                        span,
                    ));
                }
            };
            self.emit(Statement::Call {
                callee,
                args: arg_exprs,
                results,
            });
            return Ok(());
        }
        let mut cx = self.cx(SpecScope::Guard);
        lower_expr(e, &mut cx)?;
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: &ast::Expr,
        then_body: &[ast::Stmt],
        else_body: &[ast::Stmt],
    ) -> Result<(), Error> {
        let guard = {
            let mut cx = self.cx(SpecScope::Guard);
            lower_pred(cond, &mut cx)?
        };
        let from = self.ensure_current();

        let then_block = self.cfg.push_basic();
        self.cfg.add_edge(from, then_block, Some(guard.clone()));
        let else_block = self.cfg.push_basic();
        self.cfg.add_edge(from, else_block, Some(guard.negate()));

        self.current = Some(then_block);
        self.env.push_scope();
        let then_result = self.lower_stmts(then_body);
        self.env.pop_scope();
        then_result?;
        let then_end = self.current;

        self.current = Some(else_block);
        self.env.push_scope();
        let else_result = self.lower_stmts(else_body);
        self.env.pop_scope();
        else_result?;
        let else_end = self.current;

        if then_end.is_none() && else_end.is_none() {
            self.current = None;
            return Ok(());
        }
        let join = self.cfg.push_basic();
        if let Some(b) = then_end {
            self.cfg.add_edge(b, join, None);
        }
        if let Some(b) = else_end {
            self.cfg.add_edge(b, join, None);
        }
        self.current = Some(join);
        Ok(())
    }

    fn lower_while(
        &mut self,
        annot: &ast::LoopAnnot,
        cond: &ast::Expr,
        body: &[ast::Stmt],
    ) -> Result<(), Error> {
        let (invariants, rankings) = self.lower_loop_annot(annot)?;
        let guard = {
            let mut cx = self.cx(SpecScope::Guard);
            lower_pred(cond, &mut cx)?
        };

        let head = self.cfg.push(BlockKind::LoopHead {
            invariants,
            rankings,
            snapshots: Vec::new(),
        });
        let from = self.ensure_current();
        self.cfg.add_edge(from, head, None);

        let body_block = self.cfg.push_basic();
        self.cfg.add_edge(head, body_block, Some(guard.clone()));
        let after = self.cfg.push_basic();
        self.cfg.add_edge(head, after, Some(guard.negate()));

        let saved = (self.break_target, self.continue_target);
        self.break_target = Some(after);
        self.continue_target = Some(head);

        self.current = Some(body_block);
        self.env.push_scope();
        let body_result = self.lower_stmts(body);
        self.env.pop_scope();
        (self.break_target, self.continue_target) = saved;
        body_result?;

        if let Some(b) = self.current {
            self.cfg.add_edge(b, head, None);
        }
        self.current = Some(after);
        Ok(())
    }

    fn lower_do_while(
        &mut self,
        annot: &ast::LoopAnnot,
        body: &[ast::Stmt],
        cond: &ast::Expr,
    ) -> Result<(), Error> {
        let (invariants, rankings) = self.lower_loop_annot(annot)?;
        let guard = {
            let mut cx = self.cx(SpecScope::Guard);
            lower_pred(cond, &mut cx)?
        };

        let head = self.cfg.push(BlockKind::LoopHead {
            invariants,
            rankings,
            snapshots: Vec::new(),
        });
        let from = self.ensure_current();
        self.cfg.add_edge(from, head, None);

        // The first iteration bypasses the test: the body hangs directly
        // off the loop head, and the test sits between the body's end and
        // the back-edge.
        let body_block = self.cfg.push_basic();
        self.cfg.add_edge(head, body_block, None);
        let test_block = self.cfg.push_basic();
        let after = self.cfg.push_basic();
        self.cfg.add_edge(test_block, head, Some(guard.clone()));
        self.cfg.add_edge(test_block, after, Some(guard.negate()));

        let saved = (self.break_target, self.continue_target);
        self.break_target = Some(after);
        self.continue_target = Some(test_block);

        self.current = Some(body_block);
        self.env.push_scope();
        let body_result = self.lower_stmts(body);
        self.env.pop_scope();
        (self.break_target, self.continue_target) = saved;
        body_result?;

        if let Some(b) = self.current {
            self.cfg.add_edge(b, test_block, None);
        }
        self.current = Some(after);
        Ok(())
    }

    fn lower_for(
        &mut self,
        annot: &ast::LoopAnnot,
        init: Option<&ast::Stmt>,
        cond: &ast::Expr,
        step: Option<&ast::Stmt>,
        body: &[ast::Stmt],
    ) -> Result<(), Error> {
        // The loop header gets its own scope so an `init` declaration is
        // local to the loop.
        self.env.push_scope();
        let result = self.lower_for_inner(annot, init, cond, step, body);
        self.env.pop_scope();
        result
    }

    fn lower_for_inner(
        &mut self,
        annot: &ast::LoopAnnot,
        init: Option<&ast::Stmt>,
        cond: &ast::Expr,
        step: Option<&ast::Stmt>,
        body: &[ast::Stmt],
    ) -> Result<(), Error> {
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }
        let (invariants, rankings) = self.lower_loop_annot(annot)?;
        let guard = {
            let mut cx = self.cx(SpecScope::Guard);
            lower_pred(cond, &mut cx)?
        };

        let head = self.cfg.push(BlockKind::LoopHead {
            invariants,
            rankings,
            snapshots: Vec::new(),
        });
        let from = self.ensure_current();
        self.cfg.add_edge(from, head, None);

        let body_block = self.cfg.push_basic();
        self.cfg.add_edge(head, body_block, Some(guard.clone()));
        let after = self.cfg.push_basic();
        self.cfg.add_edge(head, after, Some(guard.negate()));
        // The step lowers just before the back-edge; `continue` jumps to
        // it, not to the head.
        let step_block = self.cfg.push_basic();

        let saved = (self.break_target, self.continue_target);
        self.break_target = Some(after);
        self.continue_target = Some(step_block);

        self.current = Some(body_block);
        self.env.push_scope();
        let body_result = self.lower_stmts(body);
        self.env.pop_scope();
        (self.break_target, self.continue_target) = saved;
        body_result?;

        if let Some(b) = self.current {
            self.cfg.add_edge(b, step_block, None);
        }
        self.current = Some(step_block);
        if let Some(step) = step {
            self.lower_stmt(step)?;
        }
        self.cfg.add_edge(step_block, head, None);
        self.current = Some(after);
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&ast::Expr>, span: Span) -> Result<(), Error> {
        let ret = self.ret.clone();
        match (ret, value) {
            (None, None) => {
                let b = self.ensure_current();
                let exit = self.cfg.exit;
                self.cfg.add_edge(b, exit, None);
                self.current = None;
                Ok(())
            }
            (None, Some(_)) => Err(Error::new(ErrorKind::ReturnInVoid, span)),
            (Some(_), None) => Err(Error::new(ErrorKind::ReturnMissingValue, span)),
            (Some(Variable::Local(rv)), Some(e)) => {
                let mut cx = self.cx(SpecScope::Guard);
                let lowered = lower_expr(e, &mut cx)?;
                if lowered.ty() != rv.ty {
                    return Err(Error::type_mismatch(
                        self.types.display_name(rv.ty),
                        self.types.display_name(lowered.ty()),
                        e.span,
                    ));
                }
                self.emit(Statement::Assign {
                    target: rv.name,
                    value: lowered,
                });
                let b = self.ensure_current();
                let exit = self.cfg.exit;
                self.cfg.add_edge(b, exit, None);
                self.current = None;
                Ok(())
            }
            (Some(Variable::Struct(sv)), Some(e)) => {
                self.copy_struct_into(&sv, e, span)?;
                let b = self.ensure_current();
                let exit = self.cfg.exit;
                self.cfg.add_edge(b, exit, None);
                self.current = None;
                Ok(())
            }
        }
    }
}

/// Lower a predicate definition. Registration happens only after the body
/// has lowered, so predicates cannot recurse.
pub(crate) fn lower_predicate_def(
    types: &mut TypeTable,
    env: &mut Env,
    def: &ast::PredDef,
) -> Result<ir::Predicate, Error> {
    let depth = env.scope_depth();
    env.push_scope();
    let parts = lower_predicate_parts(types, env, def);
    env.truncate_scopes(depth);
    let (params, param_tys, body) = parts?;

    let ty = types.get_pred(param_tys.clone());
    env.declare_predicate(PredSig {
        name: def.name.clone(),
        ty,
        params: param_tys,
    });
    Ok(ir::Predicate {
        name: def.name.clone(),
        params,
        ty,
        body,
    })
}

fn lower_predicate_parts(
    types: &mut TypeTable,
    env: &mut Env,
    def: &ast::PredDef,
) -> Result<(Vec<Variable>, Vec<TypeId>, Pred), Error> {
    let mut namer = Namer::new();
    let mut params = Vec::with_capacity(def.params.len());
    let mut param_tys = Vec::with_capacity(def.params.len());

    for p in &def.params {
        let ty = resolve_type(types, &p.ty, p.span, true)?;
        param_tys.push(ty);
        let unique = namer.fresh(&p.name);
        let var = if let Some(members) = types.struct_members(ty) {
            let members = members
                .iter()
                .map(|(field, atomic)| {
                    (
                        field.clone(),
                        LocalVar::new(
                            format!("{unique}.{field}"),
                            format!("{}.{field}", p.name),
                            atomic.id(),
                        ),
                    )
                })
                .collect();
            Variable::Struct(StructVar {
                name: unique,
                source_name: p.name.clone(),
                ty,
                members,
            })
        } else {
            Variable::Local(LocalVar::new(unique, &p.name, ty))
        };
        let binding = match &var {
            Variable::Local(v) => Binding::Local(v.clone()),
            Variable::Struct(v) => Binding::Struct(v.clone()),
        };
        env.declare(&p.name, binding)
            .map_err(|_| Error::duplicate_name(&p.name, p.span))?;
        params.push(var);
    }

    let mut cx = LowerCx {
        types,
        env,
        namer: &mut namer,
        ret: None,
        scope: SpecScope::PredicateBody,
    };
    let body = lower_pred(&def.body, &mut cx)?;
    Ok((params, param_tys, body))
}
