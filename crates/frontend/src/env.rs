//! The symbol environment.
//!
//! A stack of scope frames for local bindings, plus flat top-level tables
//! for functions and predicates. Struct names live in the type table; the
//! cross-kind collision checks here consult it so that one name can never
//! denote both a function and a struct, a struct and a predicate, and so
//! on.

use imp_fv_ir::types::{TypeId, TypeTable};
use imp_fv_ir::var::{LocalVar, QuantifiedVar, StructVar};
use rustc_hash::FxHashMap;

/// What a local name resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Local(LocalVar),
    Struct(StructVar),
    /// A quantifier binder; visible only inside the quantifier body.
    Quantified(QuantifiedVar),
}

/// Signature of a declared function, in source-level (unflattened) types.
#[derive(Debug, Clone, PartialEq)]
pub struct FunSig {
    pub name: String,
    pub ty: TypeId,
    pub params: Vec<TypeId>,
    pub returns: Vec<TypeId>,
}

/// Signature of a declared predicate, in source-level types.
#[derive(Debug, Clone, PartialEq)]
pub struct PredSig {
    pub name: String,
    pub ty: TypeId,
    pub params: Vec<TypeId>,
}

/// Nested scopes plus the top-level tables.
#[derive(Debug, Default)]
pub struct Env {
    scopes: Vec<FxHashMap<String, Binding>>,
    functions: FxHashMap<String, FunSig>,
    predicates: FxHashMap<String, PredSig>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Drop scopes down to a previously recorded depth. Used to unwind
    /// cleanly when a definition fails mid-lowering.
    pub fn truncate_scopes(&mut self, depth: usize) {
        self.scopes.truncate(depth);
    }

    /// Declare a local binding in the innermost scope. Fails if the name
    /// already exists in that scope; shadowing across scopes is allowed.
    pub fn declare(&mut self, source_name: &str, binding: Binding) -> Result<(), ()> {
        let frame = match self.scopes.last_mut() {
            Some(f) => f,
            None => return Err(()),
        };
        if frame.contains_key(source_name) {
            return Err(());
        }
        frame.insert(source_name.to_string(), binding);
        Ok(())
    }

    /// Resolve a name, innermost scope first.
    pub fn resolve(&self, source_name: &str) -> Option<&Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.get(source_name))
    }

    pub fn function(&self, name: &str) -> Option<&FunSig> {
        self.functions.get(name)
    }

    pub fn predicate(&self, name: &str) -> Option<&PredSig> {
        self.predicates.get(name)
    }

    /// Whether a top-level name is already taken by any kind.
    pub fn top_level_taken(&self, name: &str, types: &TypeTable) -> bool {
        self.functions.contains_key(name)
            || self.predicates.contains_key(name)
            || types.get_struct(name).is_some()
    }

    /// Register a function signature. The caller must have checked
    /// [`Env::top_level_taken`] first.
    pub fn declare_function(&mut self, sig: FunSig) {
        self.functions.insert(sig.name.clone(), sig);
    }

    /// Remove a function signature again; used when its body fails to
    /// lower and the partial definition is discarded.
    pub fn retract_function(&mut self, name: &str) {
        self.functions.remove(name);
    }

    /// Register a predicate signature. Predicates register only after
    /// their body has lowered, which is why they cannot recurse.
    pub fn declare_predicate(&mut self, sig: PredSig) {
        self.predicates.insert(sig.name.clone(), sig);
    }
}
