//! Criterion benchmarks for geval-rf: forest training and prediction.

use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use geval_rf::{
    Dataset, FeatureRanking, ForestParms, RandomForest, RootedPolicy, RootedSelectorFactory,
};

fn make_classification(n_rows: usize, n_features: usize, n_classes: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_rows);
    let mut classes = Vec::with_capacity(n_rows);
    for i in 0..n_rows {
        let class = i % n_classes;
        classes.push(class);
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        features.push(row);
    }
    Dataset::from_classes(features, &classes, n_classes).unwrap()
}

fn bench_rf_train(c: &mut Criterion) {
    let ds = make_classification(500, 20, 5, 42);
    let parms = ForestParms::new(50).unwrap().with_seed(42);

    c.bench_function("rf_train_500x20_5class_50trees", |b| {
        b.iter(|| RandomForest::fit(&ds, &parms).unwrap());
    });
}

fn bench_rf_train_rooted(c: &mut Criterion) {
    let ds = make_classification(500, 20, 5, 42);
    let parms = ForestParms::new(50).unwrap().with_seed(42);
    let impact = RandomForest::fit(&ds, &parms).unwrap().compute_impact();
    let ranking = Arc::new(FeatureRanking::from_scores(impact).unwrap());
    let factory = RootedSelectorFactory::new(ranking, RootedPolicy::new()).unwrap();

    c.bench_function("rf_train_rooted_500x20_5class_50trees", |b| {
        b.iter(|| {
            RandomForest::fit_with(&ds, &parms, std::iter::repeat(factory.clone()), None).unwrap()
        });
    });
}

fn bench_rf_predict(c: &mut Criterion) {
    let ds = make_classification(500, 20, 5, 42);
    let parms = ForestParms::new(50).unwrap().with_seed(42);
    let forest = RandomForest::fit(&ds, &parms).unwrap();

    c.bench_function("rf_predict_500x20_50trees", |b| {
        b.iter(|| forest.predict(ds.rows()).unwrap());
    });
}

fn bench_single_tree(c: &mut Criterion) {
    // Proxy for split-finding: train a single-tree forest on 500 rows.
    let ds = make_classification(500, 20, 5, 42);
    let parms = ForestParms::new(1).unwrap().with_seed(42);

    c.bench_function("rf_single_tree_500x20_5class", |b| {
        b.iter(|| RandomForest::fit(&ds, &parms).unwrap());
    });
}

criterion_group!(
    benches,
    bench_rf_train,
    bench_rf_train_rooted,
    bench_rf_predict,
    bench_single_tree
);
criterion_main!(benches);
