//! Benchmarks for the bytecode compiler and virtual machine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use brisk::ast::{Expr, Program, Stmt};
use brisk::bytecode::{Chunk, Compiler, Vm};

/// let fib = fn(n) { if (n < 2) { return n }; fib(n - 1) + fib(n - 2) }; fib(<n>)
fn fib_program(n: i64) -> Program {
    let fib = Expr::function(
        &["n"],
        vec![
            Stmt::expr(Expr::if_(
                Expr::infix(Expr::ident("n"), "<", Expr::int(2)),
                vec![Stmt::return_(Expr::ident("n"))],
                None,
            )),
            Stmt::expr(Expr::infix(
                Expr::call(
                    Expr::ident("fib"),
                    vec![Expr::infix(Expr::ident("n"), "-", Expr::int(1))],
                ),
                "+",
                Expr::call(
                    Expr::ident("fib"),
                    vec![Expr::infix(Expr::ident("n"), "-", Expr::int(2))],
                ),
            )),
        ],
    );
    Program::new(vec![
        Stmt::let_("fib", fib),
        Stmt::expr(Expr::call(Expr::ident("fib"), vec![Expr::int(n)])),
    ])
}

/// let i = 0; let sum = 0; loop (i < <n>) { sum = sum + i; i = i + 1 }; sum
fn loop_sum_program(n: i64) -> Program {
    let step = |name: &str, rhs: Expr| {
        Stmt::expr(Expr::assign(
            Expr::ident(name),
            Expr::infix(Expr::ident(name), "+", rhs),
        ))
    };
    Program::new(vec![
        Stmt::let_("i", Expr::int(0)),
        Stmt::let_("sum", Expr::int(0)),
        Stmt::expr(Expr::loop_(
            Expr::infix(Expr::ident("i"), "<", Expr::int(n)),
            vec![step("sum", Expr::ident("i")), step("i", Expr::int(1))],
        )),
        Stmt::expr(Expr::ident("sum")),
    ])
}

fn compile(program: &Program) -> Chunk {
    let mut compiler = Compiler::new();
    compiler.compile(program).expect("compile error");
    compiler.bytecode()
}

fn run_vm(chunk: Chunk) {
    let mut vm = Vm::new(chunk);
    vm.run().expect("vm runtime error");
    black_box(vm.last_popped_stack_elem());
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive");

    for n in [10, 15, 20] {
        let chunk = compile(&fib_program(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &chunk, |b, chunk| {
            b.iter(|| run_vm(black_box(chunk.clone())))
        });
    }

    group.finish();
}

fn loop_sum(c: &mut Criterion) {
    let chunk = compile(&loop_sum_program(10_000));
    c.bench_function("loop_sum", |b| b.iter(|| run_vm(black_box(chunk.clone()))));
}

/// Compilation time alone, no execution.
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    let program = fib_program(20);
    group.bench_function("compile_fib", |b| b.iter(|| compile(black_box(&program))));

    let program = loop_sum_program(10_000);
    group.bench_function("compile_loop", |b| b.iter(|| compile(black_box(&program))));

    group.finish();
}

criterion_group!(benches, fib_scaling, loop_sum, compilation_overhead);

criterion_main!(benches);
