//! Out-of-bag (OOB) evaluation for the random forest.

use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::dataset::Dataset;
use crate::error::RfError;
use crate::forest::RandomForest;
use crate::predict_error::ClassPredictError;
use crate::tree::DecisionTree;

/// Out-of-bag evaluation result.
#[derive(Debug, Clone)]
pub struct OobScore {
    /// Fraction of OOB-evaluated rows predicted correctly.
    pub accuracy: f64,
    /// Expected-vs-predicted counts over the OOB-evaluated rows.
    pub confusion: ClassPredictError,
    /// Number of rows left out by at least one tree.
    pub n_oob_rows: usize,
}

/// Accuracy of `tree` on the rows of `dataset` it was not grown from.
///
/// A tree whose sample covers every row scores 1.0.
pub(crate) fn tree_oob_accuracy(tree: &DecisionTree, dataset: &Dataset) -> f64 {
    let oob = tree.oob_rows(dataset.n_rows());
    if oob.is_empty() {
        return 1.0;
    }
    let correct = oob
        .iter()
        .filter(|&&r| {
            ClassPredictError::compute_best(tree.leaf_distribution(dataset.row(r)))
                == dataset.class_of(r)
        })
        .count();
    correct as f64 / oob.len() as f64
}

impl RandomForest {
    /// Score the forest on its own out-of-bag rows.
    ///
    /// Each row is predicted by the weighted vote of only those trees whose
    /// sample left it out. Rows every tree saw are skipped. `dataset` must be
    /// the dataset the forest was trained on.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::PredictionFeatureMismatch`] | dataset width differs from the forest |
    /// | [`RfError::IndexOutOfRange`] | a tree sample refers past the dataset's last row |
    /// | [`RfError::InvalidLabel`] | a row's class is outside the forest's classes |
    /// | [`RfError::OobEvaluationFailed`] | every row is in every tree's sample |
    #[instrument(skip_all, fields(n_trees = self.trees.len(), n_rows = dataset.n_rows()))]
    pub fn oob_score(&self, dataset: &Dataset) -> Result<OobScore, RfError> {
        if dataset.n_features() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: dataset.n_features(),
            });
        }
        let n_rows = dataset.n_rows();
        if let Some(&r) = self
            .trees
            .iter()
            .flat_map(|t| t.sample())
            .find(|&&r| r >= n_rows)
        {
            return Err(RfError::IndexOutOfRange {
                what: "row",
                index: r,
                len: n_rows,
            });
        }

        let in_bag: Vec<Vec<bool>> = self
            .trees
            .par_iter()
            .map(|tree| {
                let mut mask = vec![false; n_rows];
                for &r in tree.sample() {
                    mask[r] = true;
                }
                mask
            })
            .collect();

        let predictions: Vec<Option<usize>> = (0..n_rows)
            .into_par_iter()
            .map(|r| {
                let row = dataset.row(r);
                let mut acc = vec![0.0f64; self.n_classes];
                let mut voted = false;
                for (tree, mask) in self.trees.iter().zip(&in_bag) {
                    if mask[r] {
                        continue;
                    }
                    voted = true;
                    for (a, &d) in acc.iter_mut().zip(tree.leaf_distribution(row)) {
                        *a += tree.weight * d;
                    }
                }
                voted.then(|| ClassPredictError::compute_best(&acc))
            })
            .collect();

        let mut confusion = ClassPredictError::new(self.n_classes);
        for (r, predicted) in predictions.iter().enumerate() {
            if let Some(p) = predicted {
                confusion
                    .record_class(dataset.class_of(r), *p)
                    .map_err(|_| RfError::InvalidLabel {
                        row_index: r,
                        reason: format!(
                            "class {} is outside the forest's {} classes",
                            dataset.class_of(r),
                            self.n_classes
                        ),
                    })?;
            }
        }

        let n_oob_rows = confusion.total();
        if n_oob_rows == 0 {
            return Err(RfError::OobEvaluationFailed {
                reason: "no row is out of bag for any tree".to_string(),
            });
        }

        let accuracy = confusion.accuracy();
        debug!(n_oob_rows, accuracy, "out-of-bag score computed");

        Ok(OobScore {
            accuracy,
            confusion,
            n_oob_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ForestParms, MaxFeatures};
    use crate::dataset::Dataset;
    use crate::forest::RandomForest;
    use crate::RfError;

    fn separable() -> Dataset {
        let mut features = Vec::new();
        let mut classes = Vec::new();
        for class in 0..3usize {
            for i in 0..20 {
                features.push(vec![class as f64 * 10.0 + i as f64 * 0.15, 0.5]);
                classes.push(class);
            }
        }
        Dataset::from_classes(features, &classes, 3).unwrap()
    }

    #[test]
    fn oob_score_computed() {
        let ds = separable();
        let parms = ForestParms::new(30).unwrap().with_seed(42);
        let forest = RandomForest::fit(&ds, &parms).unwrap();
        let oob = forest.oob_score(&ds).unwrap();
        assert!(oob.accuracy > 0.8, "oob accuracy = {}", oob.accuracy);
        assert!(oob.n_oob_rows > 0);
        assert_eq!(oob.confusion.n_classes(), 3);
        assert_eq!(oob.confusion.total(), oob.n_oob_rows);
    }

    #[test]
    fn tree_oob_accuracy_in_unit_range() {
        let ds = separable();
        let forest = RandomForest::fit(&ds, &ForestParms::new(5).unwrap()).unwrap();
        for tree in forest.trees() {
            let acc = super::tree_oob_accuracy(tree, &ds);
            assert!((0.0..=1.0).contains(&acc));
        }
    }

    #[test]
    fn wrong_width_rejected() {
        let ds = separable();
        let forest = RandomForest::fit(&ds, &ForestParms::new(3).unwrap()).unwrap();
        let narrow = ds.restrict(&[0]).unwrap();
        let err = forest.oob_score(&narrow).unwrap_err();
        assert!(matches!(err, RfError::PredictionFeatureMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn single_row_dataset_has_no_oob_rows() {
        let ds = Dataset::from_classes(vec![vec![1.0, 2.0]], &[0], 2).unwrap();
        let parms = ForestParms::new(3)
            .unwrap()
            .with_max_features(MaxFeatures::All);
        let forest = RandomForest::fit(&ds, &parms).unwrap();
        let err = forest.oob_score(&ds).unwrap_err();
        assert!(matches!(err, RfError::OobEvaluationFailed { .. }));
    }
}
