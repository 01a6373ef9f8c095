//! Abstract syntax handed to the front end by the parser.
//!
//! Lexing and concrete syntax live outside this crate; the parser produces
//! this tree. Expressions use a single shared grammar for executable code,
//! logical terms, and predicates — the parser cannot tell the three
//! sub-languages apart, so the lowering visitors decide which constructs
//! are legal where.
//!
//! Every node carries a [`Span`] (line/column range) used in errors.

/// A line/column range in the source file. Lines and columns are 1-based;
/// `Span::default()` produces the zero span used by synthesized nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// A single-position span.
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }
}

/// A source-language type as written.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAst {
    Int,
    Float,
    Bool,
    /// `elem name[len]`; `len` is `None` for array parameters, whose
    /// length is unspecified.
    Array { elem: Box<TypeAst>, len: Option<u64> },
    Struct(String),
}

/// A whole translation unit, in definition order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Fun(FunDef),
    Struct(StructDef),
    Pred(PredDef),
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Fun(f) => &f.name,
            Item::Struct(s) => &s.name,
            Item::Pred(p) => &p.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Item::Fun(f) => f.span,
            Item::Struct(s) => s.span,
            Item::Pred(p) => p.span,
        }
    }
}

/// A function definition: contract, signature, body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunDef {
    pub name: String,
    pub params: Vec<Param>,
    /// `None` for void functions.
    pub return_ty: Option<TypeAst>,
    pub contract: Contract,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeAst,
    pub span: Span,
}

/// The annotation-comment contract preceding a function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contract {
    /// `requires pred;` clauses.
    pub requires: Vec<Expr>,
    /// `decreases term, ...;` ranking components, lexicographic order.
    pub decreases: Vec<Expr>,
    /// `ensures pred;` clauses.
    pub ensures: Vec<Expr>,
}

/// A struct definition. Fields are atomic.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Param>,
    pub span: Span,
}

/// A predicate definition from a `/*@ predicate ... */` annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct PredDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Expr,
    pub span: Span,
}

/// The annotation preceding a loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoopAnnot {
    /// `loop invariant pred;` clauses.
    pub invariants: Vec<Expr>,
    /// `loop variant term, ...;` ranking components.
    pub variant: Vec<Expr>,
}

/// An assignable location.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Var(String),
    Index { array: String, index: Expr },
    Member { base: String, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Local declaration with optional initializer.
    Decl {
        name: String,
        ty: TypeAst,
        init: Option<Expr>,
    },
    Assign {
        target: LValue,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        /// Empty when there is no `else`.
        else_body: Vec<Stmt>,
    },
    While {
        annot: LoopAnnot,
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        annot: LoopAnnot,
        body: Vec<Stmt>,
        cond: Expr,
    },
    For {
        annot: LoopAnnot,
        init: Option<Box<Stmt>>,
        cond: Expr,
        step: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    /// `assert pred;` from an annotation comment.
    Assert(Expr),
    Block(Vec<Stmt>),
    /// Expression statement; the value is discarded.
    Expr(Expr),
    Empty,
}

/// Unary operators as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpAst {
    Neg,
    Not,
}

/// Binary operators as written. Relational operators are not here — the
/// parser produces [`ExprKind::Compare`] chains for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpAst {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    /// `==>`; predicates only.
    Implies,
    /// `<==>`; predicates only.
    Iff,
    /// `^^`; predicates only.
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOpAst {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantAst {
    Forall,
    Exists,
}

/// Sorts a quantifier may bind over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortAst {
    Bool,
    Int,
    Real,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: String,
    },
    Unary {
        op: UnOpAst,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOpAst,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Non-associative comparison chain: `operands.len() == ops.len() + 1`.
    /// A single comparison is a chain of one op.
    Compare {
        operands: Vec<Expr>,
        ops: Vec<RelOpAst>,
    },
    /// `\forall` / `\exists`; predicates only.
    Quant {
        q: QuantAst,
        binders: Vec<(String, SortAst)>,
        body: Box<Expr>,
    },
    /// `\old(e)`; postcondition and loop-invariant scopes only.
    Old(Box<Expr>),
    /// `\result`; postcondition scope only.
    Result,
    /// `\length(a)`; terms only.
    Length(Box<Expr>),
    /// `{a \with [i] = v}`; terms only.
    ArrayUpdate {
        base: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
}

// Construction helpers used by the parser and by tests. All synthesize
// the zero span; use `with_span` when a real position is available.
impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Ident(name.into()), Span::default())
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::IntLit(value), Span::default())
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::FloatLit(value), Span::default())
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::BoolLit(value), Span::default())
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(
            ExprKind::Call {
                callee: callee.into(),
                args,
            },
            Span::default(),
        )
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Self::new(
            ExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
            },
            Span::default(),
        )
    }

    pub fn member(base: Expr, field: impl Into<String>) -> Self {
        Self::new(
            ExprKind::Member {
                base: Box::new(base),
                field: field.into(),
            },
            Span::default(),
        )
    }

    pub fn unary(op: UnOpAst, operand: Expr) -> Self {
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            Span::default(),
        )
    }

    pub fn binary(op: BinOpAst, lhs: Expr, rhs: Expr) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Span::default(),
        )
    }

    /// A single comparison, as a chain of one.
    pub fn cmp(op: RelOpAst, lhs: Expr, rhs: Expr) -> Self {
        Self::new(
            ExprKind::Compare {
                operands: vec![lhs, rhs],
                ops: vec![op],
            },
            Span::default(),
        )
    }

    /// A comparison chain `operands[0] ops[0] operands[1] ops[1] ...`.
    pub fn cmp_chain(operands: Vec<Expr>, ops: Vec<RelOpAst>) -> Self {
        Self::new(ExprKind::Compare { operands, ops }, Span::default())
    }

    pub fn old(inner: Expr) -> Self {
        Self::new(ExprKind::Old(Box::new(inner)), Span::default())
    }

    pub fn result() -> Self {
        Self::new(ExprKind::Result, Span::default())
    }

    pub fn length(array: Expr) -> Self {
        Self::new(ExprKind::Length(Box::new(array)), Span::default())
    }

    pub fn forall(binders: Vec<(String, SortAst)>, body: Expr) -> Self {
        Self::new(
            ExprKind::Quant {
                q: QuantAst::Forall,
                binders,
                body: Box::new(body),
            },
            Span::default(),
        )
    }
}
