//! Front end of the Imp deductive verifier.
//!
//! Takes the parser's AST and produces the typed, struct-free CFG IR of
//! `imp-fv-ir`, ready for basic-path extraction and the SMT backend:
//!
//! 1. expression/term/predicate lowering and CFG construction, with cut
//!    blocks at function entry/exit and every loop head;
//! 2. annotation binding: contract clauses onto entry/exit blocks, loop
//!    annotations onto loop heads, `\old` rewritten to ghost snapshots,
//!    `\result` resolved;
//! 3. struct flattening;
//! 4. consistency gates (ranking cardinality, CFG well-formedness);
//! 5. lazy basic-path extraction ([`paths::basic_paths`]).
//!
//! Lexing, SMT serialization, the CLI, and diagnostic rendering live
//! outside this crate; errors carry spans and render via `Display`.

pub mod ast;
pub mod checks;
pub mod config;
pub mod env;
pub mod error;
pub mod paths;

mod annot;
mod flatten;
mod lower;
mod lower_expr;

pub use config::Config;
pub use error::{Error, ErrorKind};
pub use paths::{BasicPaths, basic_paths, extract_all};

use imp_fv_ir as ir;
use imp_fv_ir::program::Program;
use imp_fv_ir::types::TypeTable;

use crate::ast::Item;
use crate::env::Env;
use crate::lower::{FunctionLowerer, lower_predicate_def, resolve_type};

/// Lower a whole translation unit.
///
/// Definitions are processed in order. A failing definition is discarded
/// and reported; later definitions still lower against everything
/// registered so far (set [`Config::fail_fast`] to stop at the first
/// failure instead). Any error means no IR is handed out.
pub fn lower_program(
    program: &ast::Program,
    config: &Config,
) -> Result<Program, Vec<Error>> {
    let mut types = TypeTable::new();
    let mut env = Env::new();
    let mut functions = Vec::new();
    let mut predicates = Vec::new();
    let mut errors = Vec::new();

    for item in &program.items {
        let depth = env.scope_depth();
        let result = lower_item(item, &mut types, &mut env, &mut functions, &mut predicates, config);
        if let Err(err) = result {
            tracing::info!(
                item = item.name(),
                error = %err,
                "definition discarded"
            );
            env.truncate_scopes(depth);
            if let Item::Fun(f) = item {
                env.retract_function(&f.name);
            }
            errors.push(err);
            if config.fail_fast {
                break;
            }
        }
    }

    if errors.is_empty() {
        tracing::info!(
            functions = functions.len(),
            predicates = predicates.len(),
            "lowered translation unit"
        );
        Ok(Program {
            functions,
            predicates,
            types,
        })
    } else {
        Err(errors)
    }
}

fn lower_item(
    item: &Item,
    types: &mut TypeTable,
    env: &mut Env,
    functions: &mut Vec<ir::Function>,
    predicates: &mut Vec<ir::Predicate>,
    config: &Config,
) -> Result<(), Error> {
    if env.top_level_taken(item.name(), types) {
        return Err(Error::duplicate_name(item.name(), item.span()));
    }
    match item {
        Item::Struct(def) => {
            let mut fields = Vec::with_capacity(def.fields.len());
            for field in &def.fields {
                let atomic = match &field.ty {
                    ast::TypeAst::Int => ir::AtomicType::Int,
                    ast::TypeAst::Float => ir::AtomicType::Float,
                    ast::TypeAst::Bool => ir::AtomicType::Bool,
                    other => {
                        // resolve_type produces the diagnostic spelling.
                        let got = resolve_type(types, other, field.span, true)
                            .map(|ty| types.display_name(ty))
                            .unwrap_or_else(|_| "a non-atomic type".to_string());
                        return Err(Error::type_mismatch(
                            "an atomic member type",
                            got,
                            field.span,
                        ));
                    }
                };
                if fields.iter().any(|(name, _)| name == &field.name) {
                    return Err(Error::duplicate_name(&field.name, field.span));
                }
                fields.push((field.name.clone(), atomic));
            }
            if types.declare_struct(&def.name, fields).is_none() {
                return Err(Error::duplicate_name(&def.name, def.span));
            }
            Ok(())
        }
        Item::Fun(def) => {
            tracing::debug!(function = %def.name, "lowering function");
            let mut fl = FunctionLowerer::new(types, env, &def.name, def.span);
            fl.lower(def)?;
            let params = std::mem::take(&mut fl.params);
            let returns: Vec<ir::Variable> = fl.ret.take().into_iter().collect();
            let locals = std::mem::take(&mut fl.locals);
            let cfg = std::mem::take(&mut fl.cfg);
            let sig_ty = match env.function(&def.name) {
                Some(sig) => sig.ty,
                None => {
                    return Err(Error::internal(
                        "function signature missing after lowering",
                        def.span,
                    ));
                }
            };
            let mut func = ir::Function {
                name: def.name.clone(),
                params,
                returns,
                locals,
                ty: sig_ty,
                body: cfg,
            };
            flatten::flatten_function(&mut func, types, def.span)?;
            checks::check_rankings(&func, def.span)?;
            if config.validate_ir {
                checks::validate(&func, def.span)?;
            }
            functions.push(func);
            Ok(())
        }
        Item::Pred(def) => {
            tracing::debug!(predicate = %def.name, "lowering predicate");
            let mut pred = lower_predicate_def(types, env, def)?;
            flatten::flatten_predicate(&mut pred, types, def.span)?;
            predicates.push(pred);
            Ok(())
        }
    }
}
