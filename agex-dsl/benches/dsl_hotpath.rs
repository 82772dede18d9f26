use agex_dsl::eval::NativeRegistry;
use agex_dsl::{evaluate, parse, Env, EvalCtx, Scanner};
use agex_core::RuntimeLimits;
use agex_policy::Policy;
use agex_storage::{base_store, MemoryBackend, StoreKind};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const PROGRAM: &str = r#"
total = 0
for i in range(50):
    if i % 2 == 0:
        total += i
    else:
        total -= 1
task_success(total)
"#;

fn bench_lex_parse(c: &mut Criterion) {
    c.bench_function("dsl/lex_parse", |b| {
        b.iter(|| {
            let tokens = Scanner::new(black_box(PROGRAM)).tokenize().expect("tokenize");
            let module = parse(tokens).expect("parse");
            black_box(module.body.len());
        });
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let tokens = Scanner::new(PROGRAM).tokenize().expect("tokenize");
    let module = parse(tokens).expect("parse");
    let policy = Policy::new("benchmark agent");
    let natives = NativeRegistry::default();
    let limits = RuntimeLimits::default();

    c.bench_function("dsl/evaluate_loop", |b| {
        b.iter(|| {
            let state = base_store(StoreKind::Transient, Box::new(MemoryBackend::new()));
            let env = Env::root(state.clone());
            let mut ctx = EvalCtx::new(&policy, &natives, PROGRAM, &limits, state);
            let outcome = evaluate(black_box(&module.body), &env, &mut ctx).expect("evaluate");
            black_box(outcome);
        });
    });
}

criterion_group!(benches, bench_lex_parse, bench_evaluate);
criterion_main!(benches);
