//! Criterion benchmarks for the query gate.
//!
//! Measures guard latency for the common query shapes a chat turn produces:
//! a query that gets rewritten, an already-scoped join, a denial, and a
//! teacher pass-through.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use school_query_gate::config::GateConfig;
use school_query_gate::gate::QueryGate;
use school_query_gate::query::extract_tables;
use school_query_gate::types::Requester;

const SCOPED_JOIN: &str = "SELECT s.name, a.day, a.status \
     FROM students s JOIN attendance a ON a.student_id = s.id \
     WHERE s.id = 42 AND a.status <> 'present' ORDER BY a.day DESC LIMIT 20";

fn bench_guard(c: &mut Criterion) {
    let mut config = GateConfig::default();
    config.audit = false;
    let gate = QueryGate::new(config).expect("default gate");
    let student = Requester::student(42).expect("valid id");
    let teacher = Requester::teacher(3).expect("valid id");

    c.bench_function("guard_rewrite", |b| {
        b.iter(|| gate.guard(&student, black_box("SELECT * FROM attendance")))
    });
    c.bench_function("guard_scoped_join", |b| {
        b.iter(|| gate.guard(&student, black_box(SCOPED_JOIN)))
    });
    c.bench_function("guard_deny", |b| {
        b.iter(|| gate.guard(&student, black_box("SELECT * FROM teachers")))
    });
    c.bench_function("guard_teacher", |b| {
        b.iter(|| gate.guard(&teacher, black_box(SCOPED_JOIN)))
    });
}

fn bench_extract(c: &mut Criterion) {
    c.bench_function("extract_tables", |b| {
        b.iter(|| extract_tables(black_box(SCOPED_JOIN)))
    });
}

criterion_group!(benches, bench_guard, bench_extract);
criterion_main!(benches);
