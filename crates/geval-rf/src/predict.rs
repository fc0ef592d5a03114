//! Voting and prediction for the random forest ensemble.

use rayon::iter::ParallelIterator;
use rayon::slice::ParallelSlice;

use crate::config::ForestParms;
use crate::error::RfError;
use crate::forest::RandomForest;
use crate::predict_error::ClassPredictError;
use crate::tree::{DecisionTree, check_vote_shape};

/// Rows per parallel prediction task.
const PREDICT_CHUNK_ROWS: usize = 64;

impl RandomForest {
    /// Add every tree's weighted vote for each row into `votes`.
    ///
    /// Trees are visited in index order, so the sums are reproducible.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::VoteShapeMismatch`] | `votes` is not `rows.len()` × `n_classes` |
    /// | [`RfError::PredictionFeatureMismatch`] | a row is not `n_features` wide |
    pub fn vote(&self, rows: &[Vec<f64>], votes: &mut [Vec<f64>]) -> Result<(), RfError> {
        check_vote_shape(rows, votes, self.n_features, self.n_classes)?;
        for tree in &self.trees {
            tree.accumulate(rows, votes, tree.weight);
        }
        Ok(())
    }

    /// Return one class-probability row per input row.
    ///
    /// Rows are split into chunks processed in parallel; each chunk sums the
    /// tree votes into its own buffer and normalizes each row to sum 1.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any row has the wrong
    /// feature count.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, RfError> {
        if let Some(bad) = rows.iter().find(|row| row.len() != self.n_features) {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: bad.len(),
            });
        }

        Ok(rows
            .par_chunks(PREDICT_CHUNK_ROWS)
            .flat_map_iter(|chunk| {
                let mut acc = vec![vec![0.0f64; self.n_classes]; chunk.len()];
                for tree in &self.trees {
                    tree.accumulate(chunk, &mut acc, tree.weight);
                }
                for row in &mut acc {
                    let total: f64 = row.iter().sum();
                    if total > 0.0 {
                        row.iter_mut().for_each(|v| *v /= total);
                    }
                }
                acc
            })
            .collect())
    }

    /// Return the predicted class of each row (best column, lowest index on ties).
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any row has the wrong
    /// feature count.
    pub fn predict_classes(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, RfError> {
        Ok(self
            .predict(rows)?
            .iter()
            .map(|p| ClassPredictError::compute_best(p))
            .collect())
    }

    /// Per-feature impact averaged over the trees, weighted by tree weight.
    ///
    /// Length is `n_features`, indexed by original feature column. Features
    /// no tree ever split on score 0.
    #[must_use]
    pub fn compute_impact(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        let mut weight_sum = 0.0f64;
        for tree in &self.trees {
            for (t, &v) in totals.iter_mut().zip(tree.compute_impact()) {
                *t += tree.weight * v;
            }
            weight_sum += tree.weight;
        }
        if weight_sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= weight_sum);
        }
        totals
    }

    /// Return the trees in build order.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the parameters the forest was trained with.
    #[must_use]
    pub fn parms(&self) -> &ForestParms {
        &self.parms
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the class names.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ForestParms, LeafVote, MaxFeatures};
    use crate::dataset::Dataset;
    use crate::forest::RandomForest;
    use crate::RfError;

    fn separable() -> Dataset {
        let mut features = Vec::new();
        let mut classes = Vec::new();
        for class in 0..3usize {
            for i in 0..20 {
                features.push(vec![class as f64 * 10.0 + i as f64 * 0.15, 0.5, i as f64]);
                classes.push(class);
            }
        }
        Dataset::from_classes(features, &classes, 3).unwrap()
    }

    fn forest(ds: &Dataset) -> RandomForest {
        let parms = ForestParms::new(15)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_leaf_vote(LeafVote::Proportional)
            .with_seed(7);
        RandomForest::fit(ds, &parms).unwrap()
    }

    #[test]
    fn predict_rows_sum_to_one() {
        let ds = separable();
        let f = forest(&ds);
        let proba = f.predict(ds.rows()).unwrap();
        assert_eq!(proba.len(), ds.n_rows());
        for row in &proba {
            assert_eq!(row.len(), 3);
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        assert_eq!(f.predict_classes(ds.rows()).unwrap(), ds.classes());
    }

    #[test]
    fn vote_matches_predict_after_normalizing() {
        let ds = separable();
        let f = forest(&ds);
        let rows = ds.rows();
        let mut votes = vec![vec![0.0; 3]; rows.len()];
        f.vote(rows, &mut votes).unwrap();
        let proba = f.predict(rows).unwrap();
        for (v, p) in votes.iter().zip(&proba) {
            let total: f64 = v.iter().sum();
            assert!((total - f.n_trees() as f64).abs() < 1e-9);
            for (a, b) in v.iter().zip(p) {
                assert!((a / total - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn predict_is_order_invariant() {
        let ds = separable();
        let f = forest(&ds);
        let rows = ds.rows().to_vec();
        let mut reversed = rows.clone();
        reversed.reverse();
        let mut a = f.predict(&rows).unwrap();
        let b = f.predict(&reversed).unwrap();
        a.reverse();
        assert_eq!(a, b);
    }

    #[test]
    fn single_row_matches_batch() {
        let ds = separable();
        let f = forest(&ds);
        let batch = f.predict(ds.rows()).unwrap();
        for (i, row) in ds.rows().iter().enumerate() {
            let single = f.predict(std::slice::from_ref(row)).unwrap();
            assert_eq!(single[0], batch[i]);
        }
    }

    #[test]
    fn feature_mismatch_rejected() {
        let ds = separable();
        let f = forest(&ds);
        let err = f.predict(&[vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, RfError::PredictionFeatureMismatch { expected: 3, got: 2 }));

        let mut votes = vec![vec![0.0; 2]];
        let err = f.vote(&[vec![1.0, 2.0, 3.0]], &mut votes).unwrap_err();
        assert!(matches!(err, RfError::VoteShapeMismatch { got_cols: 2, .. }));
    }

    #[test]
    fn impact_is_non_negative_and_sized() {
        let ds = separable();
        let f = forest(&ds);
        let impact = f.compute_impact();
        assert_eq!(impact.len(), 3);
        assert!(impact.iter().all(|&v| v >= 0.0));
        assert_eq!(impact[1], 0.0);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let ds = separable();
        let f = forest(&ds);
        assert!(f.predict(&[]).unwrap().is_empty());
    }
}
