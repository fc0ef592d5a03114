//! Stratified k-fold cross-validation for the random forest.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument};

use crate::config::ForestParms;
use crate::dataset::Dataset;
use crate::error::RfError;
use crate::forest::RandomForest;
use crate::importance::{RankedFeature, rank_impact};
use crate::predict_error::ClassPredictError;

/// Cross-validation configuration.
///
/// Construct via [`CrossValidation::new`], then chain `with_seed` if desired.
#[derive(Debug, Clone)]
pub struct CrossValidation {
    n_folds: usize,
    seed: u64,
}

/// Results of stratified k-fold cross-validation.
#[derive(Debug)]
pub struct CrossValidationResult {
    /// Accuracy for each fold.
    pub fold_accuracies: Vec<f64>,
    /// Expected-vs-predicted counts pooled across all held-out folds.
    pub confusion: ClassPredictError,
    /// Mean accuracy across folds.
    pub mean_accuracy: f64,
    /// Standard deviation of fold accuracies.
    pub std_accuracy: f64,
    /// Fold forests' impact, averaged and ranked.
    pub ranked_impact: Vec<RankedFeature>,
    /// Number of folds.
    pub n_folds: usize,
    /// Total number of rows.
    pub n_rows: usize,
    /// Number of features.
    pub n_features: usize,
    /// Number of classes.
    pub n_classes: usize,
}

impl CrossValidation {
    /// Create a new cross-validation config with the given number of folds.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidFoldCount`] if `n_folds` < 2.
    pub fn new(n_folds: usize) -> Result<Self, RfError> {
        if n_folds < 2 {
            return Err(RfError::InvalidFoldCount { n_folds });
        }
        Ok(Self { n_folds, seed: 42 })
    }

    /// Set the random seed for fold shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run stratified k-fold cross-validation.
    ///
    /// Fold `f` trains on every other fold with the forest seed offset by
    /// `f` and predicts its own rows. Confusion counts are pooled over all
    /// held-out rows; impact is the plain mean of the fold forests'.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::TooFewSamplesForFolds`] | A present class has fewer rows than folds |
    /// | Other RF errors | From underlying training |
    #[instrument(skip_all, fields(n_folds = self.n_folds, n_rows = dataset.n_rows()))]
    pub fn evaluate(
        &self,
        parms: &ForestParms,
        dataset: &Dataset,
    ) -> Result<CrossValidationResult, RfError> {
        let n_classes = dataset.n_classes();
        let n_features = dataset.n_features();
        let folds = self.stratified_folds(dataset.classes(), n_classes)?;

        let mut fold_accuracies = Vec::with_capacity(self.n_folds);
        let mut confusion = ClassPredictError::new(n_classes);
        let mut mean_impact = vec![0.0f64; n_features];

        for (fold, held_out) in folds.iter().enumerate() {
            let (fold_confusion, impact) = run_fold(parms, dataset, fold, held_out)?;
            let accuracy = fold_confusion.accuracy();
            info!(fold, accuracy, n_held_out = held_out.len(), "fold completed");

            fold_accuracies.push(accuracy);
            confusion.merge(&fold_confusion);
            for (m, v) in mean_impact.iter_mut().zip(impact) {
                *m += v / self.n_folds as f64;
            }
        }

        let (mean_accuracy, std_accuracy) = mean_and_std(&fold_accuracies);
        info!(mean_accuracy, std_accuracy, "cross-validation complete");

        Ok(CrossValidationResult {
            fold_accuracies,
            confusion,
            mean_accuracy,
            std_accuracy,
            ranked_impact: rank_impact(&mean_impact, dataset.feature_names()),
            n_folds: self.n_folds,
            n_rows: dataset.n_rows(),
            n_features,
            n_classes,
        })
    }

    /// Rows of each fold, ascending.
    ///
    /// Each class's rows are shuffled on the configured seed and dealt
    /// round-robin, so every fold sees each class in near-equal share.
    fn stratified_folds(
        &self,
        classes: &[usize],
        n_classes: usize,
    ) -> Result<Vec<Vec<usize>>, RfError> {
        let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (row, &class) in classes.iter().enumerate() {
            by_class[class].push(row);
        }
        if let Some((class, rows)) = by_class
            .iter()
            .enumerate()
            .find(|(_, rows)| !rows.is_empty() && rows.len() < self.n_folds)
        {
            return Err(RfError::TooFewSamplesForFolds {
                class,
                count: rows.len(),
                n_folds: self.n_folds,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut folds = vec![Vec::new(); self.n_folds];
        for rows in &mut by_class {
            rows.shuffle(&mut rng);
            for (j, &row) in rows.iter().enumerate() {
                folds[j % self.n_folds].push(row);
            }
        }
        folds.iter_mut().for_each(|f| f.sort_unstable());
        Ok(folds)
    }
}

/// Train without `held_out`, then score it. Returns its confusion and the fold forest's impact.
fn run_fold(
    parms: &ForestParms,
    dataset: &Dataset,
    fold: usize,
    held_out: &[usize],
) -> Result<(ClassPredictError, Vec<f64>), RfError> {
    let mut in_test = vec![false; dataset.n_rows()];
    held_out.iter().for_each(|&r| in_test[r] = true);
    let train_rows: Vec<usize> = (0..dataset.n_rows()).filter(|&r| !in_test[r]).collect();

    let train = dataset.subset(&train_rows)?;
    let test = dataset.subset(held_out)?;
    let fold_parms = parms
        .clone()
        .with_seed(parms.seed.wrapping_add(fold as u64));
    let forest = RandomForest::fit(&train, &fold_parms)?;

    let predicted = forest.predict_classes(test.rows())?;
    let mut confusion = ClassPredictError::new(dataset.n_classes());
    for (row, &p) in predicted.iter().enumerate() {
        confusion.record_class(test.class_of(row), p)?;
    }
    Ok((confusion, forest.compute_impact()))
}

/// Population mean and standard deviation.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
