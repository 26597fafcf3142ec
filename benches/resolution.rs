use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use uuid::Uuid;

use contact_resolution::{
    jaro_winkler, normalize, Contact, ContactDirectory, CustomerAlias, InMemoryDirectory,
    ResolutionEngine, ResolutionRequest, ResolutionRuntime, RuntimeConfig, Scope,
    SimilarityScorer,
};

const SEEDED_CONTACTS: usize = 512;

fn scope() -> Scope {
    Scope::parse("bench-tenant", Some("bench-company")).unwrap()
}

fn make_engine_with_data() -> ResolutionEngine {
    let directory = InMemoryDirectory::new();

    // Every contact carries one alias so both lookup phases see realistic volume.
    for i in 0..SEEDED_CONTACTS {
        let name = format!("Vendor {i:04} Trading Pte Ltd");
        let contact = Contact::new(scope(), &name);
        let alias = CustomerAlias::new(scope(), &name, contact.id, 1.0, None).unwrap();
        directory.provision(contact, alias).unwrap();
    }

    ResolutionEngine::new(Arc::new(directory))
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(1));
    group.bench_function("legal_name_with_abbreviation", |b| {
        b.iter(|| normalize(black_box("  Accounting & Corporate Authority Pte. Ltd. (ACCA) ")));
    });
    group.finish();
}

fn bench_similarity(c: &mut Criterion) {
    let scorer = SimilarityScorer::default();
    let query = normalize("Acme Tradng Pte Ltd");
    let candidate = normalize("Acme Trading Holdings Pte Ltd");

    c.bench_function("similarity/jaro_winkler", |b| {
        b.iter(|| {
            jaro_winkler(
                black_box("acme tradng pte ltd"),
                black_box("acme trading pte ltd"),
                0.1,
                4,
            )
        });
    });
    c.bench_function("similarity/assess_guarded", |b| {
        b.iter(|| scorer.assess(black_box(&query), black_box(&candidate)));
    });
}

fn bench_resolve(c: &mut Criterion) {
    let engine = make_engine_with_data();
    let mut group = c.benchmark_group("resolve_customer");
    group.throughput(Throughput::Elements(1));

    group.bench_function("alias_hit", |b| {
        b.iter(|| {
            engine
                .resolve_customer(&scope(), black_box("VENDOR 0300 TRADING PTE. LTD."))
                .unwrap()
        });
    });
    group.bench_function("fuzzy_scan", |b| {
        b.iter(|| {
            engine
                .resolve_customer(&scope(), black_box("Vendr 0300 Tradng Pte Ltd"))
                .unwrap()
        });
    });
    group.bench_function("no_match_scan", |b| {
        b.iter(|| {
            engine
                .resolve_customer(&scope(), black_box("Completely Unrelated Name"))
                .unwrap()
        });
    });
    group.finish();
}

fn bench_runtime_lookup(c: &mut Criterion) {
    c.bench_function("runtime/lookup_round_trip", |b| {
        // Fresh runtime per sample, but exclude setup from timing.
        b.iter_custom(|iters| {
            let runtime = ResolutionRuntime::new(
                make_engine_with_data(),
                RuntimeConfig {
                    lookup_workers: 1,
                    provision_workers: 1,
                    queue_capacity: 1024,
                },
            )
            .unwrap();
            let request = ResolutionRequest::Resolve {
                scope: scope(),
                raw_name: "Vendor 0042 Trading Pte Ltd".to_string(),
            };

            let start = Instant::now();
            for _ in 0..iters {
                runtime.execute(request.clone()).unwrap();
            }
            start.elapsed()
        });
    });
}

fn bench_provision(c: &mut Criterion) {
    let mut group = c.benchmark_group("provision");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_or_create_new", |b| {
        b.iter_custom(|iters| {
            let engine = ResolutionEngine::new(Arc::new(InMemoryDirectory::new()));
            // Random suffixes keep every name clear of the fuzzy threshold.
            let names: Vec<String> = (0..iters)
                .map(|_| format!("Fresh Customer {}", Uuid::new_v4().simple()))
                .collect();

            let start = Instant::now();
            for name in &names {
                engine
                    .get_or_create_customer_contact(&scope(), name, None)
                    .unwrap();
            }
            start.elapsed()
        });
    });
    group.finish();
}

criterion_group!(
    resolution,
    bench_normalize,
    bench_similarity,
    bench_resolve,
    bench_runtime_lookup,
    bench_provision
);
criterion_main!(resolution);
