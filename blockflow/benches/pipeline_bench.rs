//! Benchmarks for pipeline and union execution.

use blockflow::prelude::*;
use blockflow::testing::{classification_frame, junkfood_texts, CountVectorizer, NearestCentroid, Scaler, VarianceThreshold};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn corpus(n_docs: usize, n_partitions: usize) -> Dataset {
    let texts: Vec<String> = junkfood_texts().into_iter().cycle().take(n_docs).collect();
    Dataset::from(BlockStore::from_texts(texts, n_partitions, Some(64)).expect("corpus"))
}

fn union_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("union_transform");
    for n_partitions in [1, 4, 16] {
        let data = corpus(4_096, n_partitions);
        let mut union = FeatureUnion::new(vec![
            ("words", EstimatorHandle::new(CountVectorizer::new())),
            ("chars", EstimatorHandle::new(CountVectorizer::char_wb(2, 4))),
        ])
        .expect("union");
        union.fit(&data, &FitParams::new()).expect("fit");

        group.bench_with_input(BenchmarkId::from_parameter(n_partitions), &data, |b, data| {
            b.iter(|| black_box(union.transform(data).and_then(|out| out.collect_features())))
        });
    }
    group.finish();
}

fn pipeline_benchmark(c: &mut Criterion) {
    let text = corpus(4_096, 8);
    let mut vect = Pipeline::new(vec![
        ("vect", EstimatorHandle::new(CountVectorizer::new())),
        ("filter", EstimatorHandle::new(VarianceThreshold::new(0.0))),
    ])
    .expect("pipeline");
    c.bench_function("pipeline_fit_text", |b| {
        b.iter(|| black_box(vect.fit(&text, &FitParams::new()).map(|_| ())))
    });

    let numeric = classification_frame(10_000, 16, 8).expect("frame");
    let mut clf = Pipeline::new(vec![
        ("scale", EstimatorHandle::new(Scaler::new(0.5))),
        ("clf", EstimatorHandle::new(NearestCentroid::new())),
    ])
    .expect("pipeline");
    clf.fit(&numeric, &FitParams::new()).expect("fit");
    c.bench_function("pipeline_predict_dense", |b| {
        b.iter(|| black_box(clf.predict(&numeric).and_then(|p| p.collect())))
    });
}

criterion_group!(benches, union_benchmark, pipeline_benchmark);
criterion_main!(benches);
