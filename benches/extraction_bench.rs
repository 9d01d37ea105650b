use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use citespan::{CitationEngine, CitationDetector, Protector, SentenceLocator};

const PARAGRAPH: &str = "Deep learning changed vision [1, 3]. \
Smith et al. (2020) showed gains on ImageNet (see Fig. 2). \
Results hold broadly (Lee, 2019; Chen & Wu, 2021), whereas earlier work disagreed [4-6]. \
The idea is older (as cited in Jones, 2001) than it looks. \
Code is at https://example.org/repo and the F1 score [7] improved^{8}.\n\n";

fn document(paragraphs: usize) -> String {
    PARAGRAPH.repeat(paragraphs)
}

fn bench_engine_instantiation(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_instantiation");
    // WHY: pattern compilation is expensive; fewer samples keep the run short
    group.sample_size(20);
    group.bench_function("with_defaults", |b| {
        b.iter(|| black_box(CitationEngine::with_defaults().unwrap()))
    });
    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let engine = CitationEngine::with_defaults().unwrap();
    for (size_name, paragraphs) in [("small", 1), ("medium", 20), ("large", 200)] {
        let text = document(paragraphs);
        let mut group = c.benchmark_group(format!("extraction_{size_name}"));
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_function("full_pipeline", |b| {
            b.iter(|| black_box(engine.extract(black_box(&text))))
        });
        group.finish();
    }
}

fn bench_stages(c: &mut Criterion) {
    let protector = Protector::with_default_rules().unwrap();
    let detector = CitationDetector::with_default_rules().unwrap();
    let locator = SentenceLocator::with_default_rules().unwrap();
    let text = document(20);
    let (protected, _) = protector.protect(&text);
    let (marked, _) = detector.detect_and_mark(&protected);

    let mut group = c.benchmark_group("stages");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("protect", |b| b.iter(|| black_box(protector.protect(black_box(&text)))));
    group.bench_function("detect", |b| {
        b.iter(|| black_box(detector.detect_and_mark(black_box(&protected))))
    });
    group.bench_function("boundary_index", |b| {
        b.iter(|| black_box(locator.index(black_box(&marked)).len()))
    });
    group.finish();
}

criterion_group!(benches, bench_engine_instantiation, bench_extraction, bench_stages);
criterion_main!(benches);
