// Copyright 2026 the Term Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use term_tape::instr::{Alloc, Instr, Operand};
use term_tape::program::{Function, Label, Module};
use term_tape::verifier::{VerifyConfig, verify_module};

fn bench_verify(c: &mut Criterion) {
    bench_straight_line(c);
    bench_select_fanout(c);
    bench_many_functions(c);
}

fn function(name: &str, arity: u32, entry: u32, body: Vec<Instr>) -> Function {
    let mut code = vec![
        Instr::Label {
            lbl: Label(entry - 1),
        },
        Instr::FuncInfo {
            module: "bench".into(),
            name: name.into(),
            arity,
        },
        Instr::Label { lbl: Label(entry) },
    ];
    code.extend(body);
    Function {
        name: name.into(),
        arity,
        entry: Label(entry),
        code,
    }
}

fn modl(functions: Vec<Function>) -> Module {
    Module {
        name: "bench".into(),
        exports: Vec::new(),
        attributes: Vec::new(),
        functions,
        label_count: 1 << 20,
    }
}

/// A long run of moves and tuple builds with no control flow.
fn straight_line(len: u32) -> Module {
    let mut body = Vec::new();
    body.push(Instr::TestHeap {
        need: Alloc::Words(3 * len),
        live: 1,
    });
    for i in 0..len {
        let dst = 1 + (i % 16);
        body.push(Instr::PutTuple {
            arity: 2,
            dst: Operand::X(dst),
        });
        body.push(Instr::Put {
            src: Operand::X(0),
        });
        body.push(Instr::Put {
            src: Operand::Integer(i64::from(i)),
        });
    }
    body.push(Instr::Return);
    modl(vec![function("straight", 1, 2, body)])
}

/// One `select_val` fanning out to `n` arms that all merge back.
fn select_fanout(n: u32) -> Module {
    let join = 1000;
    let mut body = vec![Instr::SelectVal {
        src: Operand::X(0),
        fail: Label(join),
        list: (0..n)
            .map(|i| (Operand::Integer(i64::from(i)), Label(10 + i)))
            .collect(),
    }];
    for i in 0..n {
        body.push(Instr::Label { lbl: Label(10 + i) });
        body.push(Instr::Move {
            src: Operand::X(0),
            dst: Operand::X(1),
        });
        body.push(Instr::Jump { lbl: Label(join) });
    }
    body.push(Instr::Label { lbl: Label(join) });
    body.push(Instr::Return);
    modl(vec![function("fanout", 1, 2, body)])
}

fn many_functions(n: u32) -> Module {
    let fns = (0..n)
        .map(|i| {
            let entry = 2 + 2 * i;
            function(
                &format!("f{i}"),
                1,
                entry,
                vec![
                    Instr::Allocate { stack: 1, live: 1 },
                    Instr::Move {
                        src: Operand::X(0),
                        dst: Operand::Y(0),
                    },
                    Instr::Deallocate { n: 1 },
                    Instr::Return,
                ],
            )
        })
        .collect();
    modl(fns)
}

fn bench_straight_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("straight_line");
    for &len in &[16_u32, 128, 1024] {
        let m = straight_line(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &m, |b, m| {
            b.iter(|| {
                black_box(verify_module(m, &VerifyConfig::default()).is_ok());
            });
        });
    }
    group.finish();
}

fn bench_select_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_fanout");
    for &n in &[4_u32, 32, 256] {
        let m = select_fanout(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &m, |b, m| {
            b.iter(|| {
                black_box(verify_module(m, &VerifyConfig::default()).is_ok());
            });
        });
    }
    group.finish();
}

fn bench_many_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_functions");
    for &n in &[16_u32, 256] {
        let m = many_functions(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &m, |b, m| {
            b.iter(|| {
                black_box(verify_module(m, &VerifyConfig::default()).is_ok());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_verify);
criterion_main!(benches);
