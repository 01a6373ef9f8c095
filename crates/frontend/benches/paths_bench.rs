//! Benchmarks for basic-path extraction.
//!
//! Path counts grow with branching (one path per route between cut
//! points), so the interesting shapes are sequences of annotated loops
//! and chains of if/else diamonds.

use criterion::{Criterion, criterion_group, criterion_main};

use imp_fv_frontend::ast::{
    BinOpAst, Contract, Expr, FunDef, Item, LoopAnnot, LValue, Param, Program, RelOpAst, Span,
    Stmt, StmtKind, TypeAst,
};
use imp_fv_frontend::{Config, basic_paths, lower_program};

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Span::default())
}

fn bump_x() -> Stmt {
    stmt(StmtKind::Assign {
        target: LValue::Var("x".to_string()),
        value: Expr::binary(BinOpAst::Add, Expr::ident("x"), Expr::int(1)),
    })
}

fn annotated_loop(body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::While {
        annot: LoopAnnot {
            invariants: vec![Expr::cmp_chain(
                vec![Expr::int(0), Expr::ident("x"), Expr::ident("n")],
                vec![RelOpAst::Le, RelOpAst::Le],
            )],
            variant: vec![Expr::binary(
                BinOpAst::Sub,
                Expr::ident("n"),
                Expr::ident("x"),
            )],
        },
        cond: Expr::cmp(RelOpAst::Lt, Expr::ident("x"), Expr::ident("n")),
        body,
    })
}

fn diamond(depth: u32) -> Vec<Stmt> {
    let mut body = vec![bump_x()];
    for _ in 0..depth {
        body = vec![stmt(StmtKind::If {
            cond: Expr::cmp(RelOpAst::Lt, Expr::ident("x"), Expr::ident("n")),
            then_body: body.clone(),
            else_body: body,
        })];
    }
    body
}

/// `k` annotated loops in sequence, each with a diamond body.
fn make_function(loops: usize, diamond_depth: u32) -> Item {
    let mut body = Vec::new();
    for _ in 0..loops {
        body.push(annotated_loop(diamond(diamond_depth)));
    }
    Item::Fun(FunDef {
        name: "bench".to_string(),
        params: vec![
            Param {
                name: "x".to_string(),
                ty: TypeAst::Int,
                span: Span::default(),
            },
            Param {
                name: "n".to_string(),
                ty: TypeAst::Int,
                span: Span::default(),
            },
        ],
        return_ty: None,
        contract: Contract {
            requires: vec![Expr::cmp(RelOpAst::Ge, Expr::ident("n"), Expr::int(0))],
            decreases: vec![Expr::ident("n")],
            ensures: vec![Expr::bool(true)],
        },
        body,
        span: Span::default(),
    })
}

fn bench_extraction(c: &mut Criterion) {
    for (loops, depth) in [(4usize, 2u32), (8, 3), (16, 4)] {
        let program = Program {
            items: vec![make_function(loops, depth)],
        };
        let ir = lower_program(&program, &Config::new()).expect("bench program lowers");
        let func = ir.function("bench").expect("bench function");
        c.bench_function(&format!("paths_{loops}loops_depth{depth}"), |b| {
            b.iter(|| basic_paths(func).count())
        });
    }
}

fn bench_lowering(c: &mut Criterion) {
    let program = Program {
        items: vec![make_function(8, 3)],
    };
    c.bench_function("lower_8loops_depth3", |b| {
        b.iter(|| lower_program(&program, &Config::new()).expect("bench program lowers"))
    });
}

criterion_group!(benches, bench_extraction, bench_lowering);
criterion_main!(benches);
