//! Random forest training with parallel tree construction.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::config::{EnsembleMethod, ForestParms};
use crate::dataset::Dataset;
use crate::error::RfError;
use crate::oob::tree_oob_accuracy;
use crate::selector::{FeatureSelectorFactory, NormalSelectorFactory};
use crate::tree::DecisionTree;

/// Receives a notification each time a tree finishes building.
///
/// Called from worker threads, so implementations must be `Sync`. Trees
/// finish in scheduling order; `index` identifies which one.
pub trait ProgressSink: Sync {
    /// Tree `index` (zero-based) of `total` is built.
    fn tree_built(&self, index: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Sync,
{
    fn tree_built(&self, index: usize, total: usize) {
        self(index, total);
    }
}

/// A fitted random forest ensemble.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) parms: ForestParms,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
    pub(crate) feature_names: Vec<String>,
    pub(crate) class_names: Vec<String>,
}

/// Draw `draw_count` row indices from `0..n_rows` with replacement.
fn bootstrap_sample(n_rows: usize, draw_count: usize, rng: &mut impl Rng) -> Vec<usize> {
    (0..draw_count).map(|_| rng.gen_range(0..n_rows)).collect()
}

impl RandomForest {
    /// Train a forest with uniform feature selection at every split.
    ///
    /// # Errors
    ///
    /// See [`RandomForest::fit_with`].
    pub fn fit(dataset: &Dataset, parms: &ForestParms) -> Result<Self, RfError> {
        Self::fit_with(
            dataset,
            parms,
            std::iter::repeat(NormalSelectorFactory),
            None,
        )
    }

    /// Train a forest, drawing one selector factory per tree from `factories`.
    ///
    /// Exactly `n_trees` factories are taken from the iterator before any tree
    /// is built; factory `i` seeds the selector of tree `i`. Tree `i` draws its
    /// bootstrap sample and selector seed from stream `i` of a ChaCha8
    /// generator keyed by the forest seed, so results do not depend on the
    /// thread count or on scheduling.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::InvalidTreeCount`] | `n_trees` is zero |
    /// | [`RfError::InvalidMaxFeatures`] | max_features resolves outside [1, n_features] |
    /// | [`RfError::InvalidMaxDepth`] / [`RfError::InvalidMinSamplesSplit`] / [`RfError::InvalidMinSamplesLeaf`] | tree settings out of range |
    /// | [`RfError::InvalidBootstrapFraction`] | fraction outside (0, 1] |
    /// | [`RfError::InvalidThreadCount`] | `n_threads` is `Some(0)` |
    /// | [`RfError::TooFewSelectorFactories`] | the iterator yields fewer than `n_trees` factories |
    /// | [`RfError::LengthMismatch`] | a factory's feature ranking does not have one score per column |
    /// | [`RfError::ThreadPool`] | the worker pool could not be built |
    #[instrument(skip_all, fields(n_trees = parms.n_trees, n_rows = dataset.n_rows()))]
    pub fn fit_with<F, I>(
        dataset: &Dataset,
        parms: &ForestParms,
        factories: I,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Self, RfError>
    where
        F: FeatureSelectorFactory,
        I: IntoIterator<Item = F>,
    {
        let max_features = parms.validate_forest(dataset.n_features())?;
        let n_trees = parms.n_trees;

        let factories: Vec<F> = factories.into_iter().take(n_trees).collect();
        if factories.len() < n_trees {
            return Err(RfError::TooFewSelectorFactories {
                n_trees,
                supplied: factories.len(),
            });
        }
        for factory in &factories {
            factory.check_feature_count(dataset.n_features())?;
        }

        let pool = match parms.n_threads {
            Some(n) => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
            None => None,
        };

        let eligible = Self::useful_features(dataset);
        debug!(
            n_useful = eligible.len(),
            n_features = dataset.n_features(),
            "useful features selected"
        );

        let n_rows = dataset.n_rows();
        let draw_count = ((n_rows as f64) * parms.bootstrap_fraction).ceil() as usize;

        info!(
            n_trees,
            n_rows,
            n_features = dataset.n_features(),
            n_classes = dataset.n_classes(),
            max_features,
            draw_count,
            method = ?parms.method,
            "training random forest"
        );

        let build = || -> Result<Vec<DecisionTree>, RfError> {
            factories
                .par_iter()
                .enumerate()
                .map(|(index, factory)| {
                    let mut rng = ChaCha8Rng::seed_from_u64(parms.seed);
                    rng.set_stream(index as u64);
                    let sample = bootstrap_sample(n_rows, draw_count, &mut rng);
                    let mut selector = factory.selector(rng.r#gen());

                    let mut tree = DecisionTree::fit_sample(
                        dataset,
                        sample,
                        eligible.clone(),
                        parms,
                        &mut selector,
                    )?;
                    if parms.method == EnsembleMethod::Weighted {
                        tree.weight = tree_oob_accuracy(&tree, dataset);
                    }

                    if let Some(sink) = progress {
                        sink.tree_built(index, n_trees);
                    }
                    Ok(tree)
                })
                .collect()
        };

        let mut trees = match &pool {
            Some(pool) => pool.install(build)?,
            None => build()?,
        };

        if trees.iter().all(|t| t.weight == 0.0) {
            warn!(n_trees, "every tree has zero out-of-bag accuracy; using equal weights");
            for tree in &mut trees {
                tree.weight = 1.0;
            }
        }

        let total_nodes: usize = trees.iter().map(DecisionTree::n_nodes).sum();
        info!(n_trees = trees.len(), total_nodes, "random forest training complete");

        Ok(RandomForest {
            trees,
            parms: parms.clone(),
            n_features: dataset.n_features(),
            n_classes: dataset.n_classes(),
            feature_names: dataset.feature_names().to_vec(),
            class_names: dataset.class_names().to_vec(),
        })
    }

    /// Return the feature columns holding more than one distinct value.
    ///
    /// Constant columns can never produce a split, so trees skip them.
    #[must_use]
    pub fn useful_features(dataset: &Dataset) -> Vec<usize> {
        (0..dataset.n_features())
            .filter(|&f| {
                let column = dataset.column(f);
                column.iter().any(|&v| v != column[0])
            })
            .collect()
    }
}
