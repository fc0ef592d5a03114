use std::sync::OnceLock;

use tracing::{debug, instrument};

use crate::{
    RfError,
    config::{ForestParms, LeafVote},
    dataset::Dataset,
    forest::RandomForest,
    node::{Node, NodeIndex, Route},
    predict_error::ClassPredictError,
    selector::FeatureSelector,
    split::{SplitCriterion, SplitResult, find_best_split},
};

/// Per-build state shared by every node of one tree.
struct TreeBuilder<'a, S> {
    columns: &'a [Vec<f64>],
    classes: &'a [usize],
    n_classes: usize,
    eligible: &'a [usize],
    max_features: usize,
    criterion: SplitCriterion,
    leaf_vote: LeafVote,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    selector: &'a mut S,
    arena: Vec<Node>,
}

/// The parent field a newly placed node's index is written into.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Root,
    Left(usize),
    Right(usize),
}

/// A node still to be grown.
struct Pending {
    rows: Vec<usize>,
    depth: usize,
    slot: Slot,
}

impl<S: FeatureSelector> TreeBuilder<'_, S> {
    /// Grow the whole tree for `sample_indices`.
    ///
    /// Nodes are placed depth-first, left before right, from an explicit work
    /// stack: the right child is pushed before the left so it is popped after
    /// the entire left subtree. Stack depth on the thread never grows with
    /// tree depth.
    fn grow(&mut self, sample_indices: Vec<usize>) {
        let mut stack = vec![Pending {
            rows: sample_indices,
            depth: 0,
            slot: Slot::Root,
        }];

        while let Some(Pending { rows, depth, slot }) = stack.pop() {
            let node_idx = self.arena.len();
            self.attach(slot, node_idx);

            if let Some(split) = self.place_node(&rows, depth) {
                stack.push(Pending {
                    rows: split.right_indices,
                    depth: depth + 1,
                    slot: Slot::Right(node_idx),
                });
                stack.push(Pending {
                    rows: split.left_indices,
                    depth: depth + 1,
                    slot: Slot::Left(node_idx),
                });
            }
        }
    }

    /// Point the parent named by `slot` at the node about to sit at `node_idx`.
    fn attach(&mut self, slot: Slot, node_idx: usize) {
        let (parent, is_left) = match slot {
            Slot::Root => return,
            Slot::Left(p) => (p, true),
            Slot::Right(p) => (p, false),
        };
        if let Node::Split { left, right, .. } = &mut self.arena[parent] {
            let child = if is_left { left } else { right };
            *child = NodeIndex::new(node_idx);
        }
    }

    /// Push the node for `sample_indices` onto the arena.
    ///
    /// Returns the chosen split when the node is interior; its children are
    /// left as placeholders until they are placed.
    fn place_node(&mut self, sample_indices: &[usize], depth: usize) -> Option<SplitResult> {
        let n_samples = sample_indices.len();

        let mut class_counts = vec![0usize; self.n_classes];
        for &si in sample_indices {
            class_counts[self.classes[si]] += 1;
        }
        let impurity = self.criterion.impurity(&class_counts, n_samples);

        let single_label = class_counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_few = n_samples < self.min_samples_split;
        let depth_exceeded = self.max_depth.is_some_and(|max_d| depth >= max_d);

        if single_label || too_few || depth_exceeded || self.eligible.is_empty() {
            self.push_leaf(&class_counts, n_samples, impurity);
            return None;
        }

        let count = self.max_features.min(self.eligible.len());
        let candidates = self.selector.choose(self.eligible, count);

        let Some(split) = find_best_split(
            self.columns,
            self.classes,
            sample_indices,
            &class_counts,
            impurity,
            self.criterion,
            &candidates,
            self.min_samples_leaf,
        ) else {
            self.push_leaf(&class_counts, n_samples, impurity);
            return None;
        };

        self.arena.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: NodeIndex::new(0),
            right: NodeIndex::new(0),
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        });
        Some(split)
    }

    fn push_leaf(
        &mut self,
        class_counts: &[usize],
        n_samples: usize,
        impurity: crate::node::Impurity,
    ) {
        let counts: Vec<f64> = class_counts.iter().map(|&c| c as f64).collect();
        let prediction = ClassPredictError::compute_best(&counts);
        let distribution = match self.leaf_vote {
            LeafVote::Majority => {
                let mut one_hot = vec![0.0; self.n_classes];
                one_hot[prediction] = 1.0;
                one_hot
            }
            LeafVote::Proportional => {
                let total = n_samples as f64;
                counts.iter().map(|&c| c / total).collect()
            }
        };
        self.arena.push(Node::Leaf {
            prediction,
            distribution,
            impurity,
            n_samples,
        });
    }
}

/// A fitted CART decision tree.
///
/// Stored as an arena-based `Vec<Node>` with index references for
/// cache-friendly traversal and flat serialization. Besides the nodes, a tree
/// remembers which feature columns it was allowed to split on, the (bootstrap)
/// rows it was grown from, and its vote weight inside a forest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
    pub(crate) eligible: Vec<usize>,
    pub(crate) sample: Vec<usize>,
    pub(crate) weight: f64,
    #[serde(skip)]
    pub(crate) impact: OnceLock<Vec<f64>>,
}

impl DecisionTree {
    /// Grow a tree on every row of `dataset`, splitting only on useful features.
    ///
    /// # Errors
    ///
    /// See [`DecisionTree::fit_sample`].
    pub fn fit<S: FeatureSelector>(
        dataset: &Dataset,
        parms: &ForestParms,
        selector: &mut S,
    ) -> Result<Self, RfError> {
        let sample: Vec<usize> = (0..dataset.n_rows()).collect();
        let eligible = RandomForest::useful_features(dataset);
        Self::fit_sample(dataset, sample, eligible, parms, selector)
    }

    /// Grow a tree on the rows listed in `sample` (duplicates allowed, as in a
    /// bootstrap draw), splitting only on the `eligible` feature columns.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                                              |
    /// |-------------------------------------|---------------------------------------------------|
    /// | [`RfError::EmptyDataset`]           | `sample` is empty                                 |
    /// | [`RfError::IndexOutOfRange`]        | a sample row or eligible feature is out of range  |
    /// | [`RfError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`                          |
    /// | [`RfError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                           |
    /// | [`RfError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                            |
    /// | [`RfError::InvalidMaxFeatures`]     | max_features resolves outside [1, n_features]     |
    #[instrument(skip_all, fields(n_samples = sample.len(), n_eligible = eligible.len()))]
    pub fn fit_sample<S: FeatureSelector>(
        dataset: &Dataset,
        sample: Vec<usize>,
        eligible: Vec<usize>,
        parms: &ForestParms,
        selector: &mut S,
    ) -> Result<Self, RfError> {
        if sample.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        if let Some(&row) = sample.iter().find(|&&r| r >= dataset.n_rows()) {
            return Err(RfError::IndexOutOfRange {
                what: "row",
                index: row,
                len: dataset.n_rows(),
            });
        }
        if let Some(&feature) = eligible.iter().find(|&&f| f >= dataset.n_features()) {
            return Err(RfError::IndexOutOfRange {
                what: "feature",
                index: feature,
                len: dataset.n_features(),
            });
        }
        let max_features = parms.validate_tree(dataset.n_features())?;

        let mut builder = TreeBuilder {
            columns: dataset.columns(),
            classes: dataset.classes(),
            n_classes: dataset.n_classes(),
            eligible: &eligible,
            max_features,
            criterion: parms.criterion,
            leaf_vote: parms.leaf_vote,
            max_depth: parms.max_depth,
            min_samples_split: parms.min_samples_split,
            min_samples_leaf: parms.min_samples_leaf,
            selector,
            arena: Vec::new(),
        };
        builder.grow(sample.clone());
        let nodes = builder.arena;

        debug!(n_nodes = nodes.len(), "decision tree built");

        Ok(DecisionTree {
            nodes,
            n_features: dataset.n_features(),
            n_classes: dataset.n_classes(),
            eligible,
            sample,
            weight: 1.0,
            impact: OnceLock::new(),
        })
    }

    /// Add this tree's leaf distribution for each row into the matching
    /// accumulator row.
    ///
    /// All shapes are checked before anything is written.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::VoteShapeMismatch`] | `votes` is not `rows.len()` × `n_classes` |
    /// | [`RfError::PredictionFeatureMismatch`] | a row is not `n_features` wide |
    pub fn vote(&self, rows: &[Vec<f64>], votes: &mut [Vec<f64>]) -> Result<(), RfError> {
        check_vote_shape(rows, votes, self.n_features, self.n_classes)?;
        self.accumulate(rows, votes, 1.0);
        Ok(())
    }

    /// Add `weight` × leaf distribution per row; shapes already checked.
    pub(crate) fn accumulate(&self, rows: &[Vec<f64>], votes: &mut [Vec<f64>], weight: f64) {
        for (row, acc) in rows.iter().zip(votes.iter_mut()) {
            for (a, &d) in acc.iter_mut().zip(self.leaf_distribution(row)) {
                *a += weight * d;
            }
        }
    }

    /// Predict the class label for a single row.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `row.len() != n_features`.
    pub fn predict(&self, row: &[f64]) -> Result<usize, RfError> {
        self.check_row(row)?;
        Ok(ClassPredictError::compute_best(self.leaf_distribution(row)))
    }

    /// Return the leaf vote distribution reached by a single row.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `row.len() != n_features`.
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, RfError> {
        self.check_row(row)?;
        Ok(self.leaf_distribution(row).to_vec())
    }

    /// Per-feature impact: summed row-weighted impurity decrease of every
    /// split on that feature.
    ///
    /// Length is `n_features`; features never split on are 0. Computed once
    /// and memoized.
    pub fn compute_impact(&self) -> &[f64] {
        self.impact.get_or_init(|| {
            let mut totals = vec![0.0f64; self.n_features];
            for (feature, decrease) in self.nodes.iter().filter_map(Node::split_gain) {
                totals[feature.index()] += decrease;
            }
            totals
        })
    }

    /// Return the rows of an `n_rows` dataset that are absent from this tree's sample.
    #[must_use]
    pub fn oob_rows(&self, n_rows: usize) -> Vec<usize> {
        let mut in_bag = vec![false; n_rows];
        for &r in &self.sample {
            if r < n_rows {
                in_bag[r] = true;
            }
        }
        (0..n_rows).filter(|&r| !in_bag[r]).collect()
    }

    /// Return the node arena; the root is at index 0.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the feature columns this tree was allowed to split on.
    #[must_use]
    pub fn eligible_features(&self) -> &[usize] {
        &self.eligible
    }

    /// Return the row indices this tree was grown from.
    #[must_use]
    pub fn sample(&self) -> &[usize] {
        &self.sample
    }

    /// Return this tree's vote weight inside its forest.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Return the number of features the tree was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree.
    ///
    /// A single-node tree (just a root leaf) has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match self.nodes[node_idx].children() {
                None => max_depth = max_depth.max(d),
                Some((left, right)) => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }

        max_depth
    }

    fn check_row(&self, row: &[f64]) -> Result<(), RfError> {
        if row.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        Ok(())
    }

    /// Walk from the root (`<=` goes left) and return the reached leaf's distribution.
    pub(crate) fn leaf_distribution(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0usize;
        loop {
            match self.nodes[idx].route(row) {
                Route::Vote(distribution) => return distribution,
                Route::Descend(child) => idx = child.index(),
            }
        }
    }

    /// Check the invariants a freshly grown tree satisfies by construction.
    ///
    /// Used on deserialized trees: every child sits after its parent, is in
    /// range, and has exactly one parent; split features are in range and
    /// split gains finite and non-negative; leaf distributions have one
    /// finite entry per class.
    pub(crate) fn validate_structure(&self) -> Result<(), RfError> {
        let corrupt = |reason: String| Err(RfError::CorruptModel { reason });

        if self.nodes.is_empty() {
            return corrupt("tree has no nodes".to_string());
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return corrupt(format!("tree weight {} is not a finite non-negative value", self.weight));
        }
        if let Some(&f) = self.eligible.iter().find(|&&f| f >= self.n_features) {
            return corrupt(format!("eligible feature {f} >= {}", self.n_features));
        }

        let mut parents = vec![0usize; self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    impurity_decrease,
                    ..
                } => {
                    if !impurity_decrease.is_finite() || *impurity_decrease < 0.0 {
                        return corrupt(format!(
                            "node {idx} has impurity decrease {impurity_decrease}"
                        ));
                    }
                    if feature.index() >= self.n_features {
                        return corrupt(format!("node {idx} splits on feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return corrupt(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [left.index(), right.index()] {
                        if child <= idx || child >= self.nodes.len() {
                            return corrupt(format!("node {idx} has invalid child {child}"));
                        }
                        parents[child] += 1;
                    }
                }
                Node::Leaf {
                    prediction,
                    distribution,
                    ..
                } => {
                    if distribution.len() != self.n_classes || *prediction >= self.n_classes {
                        return corrupt(format!("leaf {idx} does not match {} classes", self.n_classes));
                    }
                    if distribution.iter().any(|v| !v.is_finite()) {
                        return corrupt(format!("leaf {idx} has a non-finite vote"));
                    }
                }
            }
        }
        if parents[0] != 0 || parents[1..].iter().any(|&p| p != 1) {
            return corrupt("node arena is not a tree".to_string());
        }
        Ok(())
    }
}

/// Check that `votes` is `rows.len()` × `n_classes` and every row is `n_features` wide.
pub(crate) fn check_vote_shape(
    rows: &[Vec<f64>],
    votes: &[Vec<f64>],
    n_features: usize,
    n_classes: usize,
) -> Result<(), RfError> {
    if votes.len() != rows.len() {
        return Err(RfError::VoteShapeMismatch {
            expected_rows: rows.len(),
            expected_cols: n_classes,
            got_rows: votes.len(),
            got_cols: n_classes,
        });
    }
    if let Some(bad) = votes.iter().find(|acc| acc.len() != n_classes) {
        return Err(RfError::VoteShapeMismatch {
            expected_rows: rows.len(),
            expected_cols: n_classes,
            got_rows: votes.len(),
            got_cols: bad.len(),
        });
    }
    if let Some(bad) = rows.iter().find(|row| row.len() != n_features) {
        return Err(RfError::PredictionFeatureMismatch {
            expected: n_features,
            got: bad.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::NormalSelector;

    fn dataset(features: Vec<Vec<f64>>, classes: &[usize]) -> Dataset {
        let n_classes = classes.iter().max().copied().unwrap_or(0) + 1;
        Dataset::from_classes(features, classes, n_classes.max(2)).unwrap()
    }

    fn all_features() -> ForestParms {
        ForestParms::new(1)
            .unwrap()
            .with_max_features(crate::config::MaxFeatures::All)
    }

    fn separable() -> Dataset {
        dataset(
            vec![
                vec![1.0, 0.0],
                vec![2.0, 0.0],
                vec![3.0, 0.0],
                vec![10.0, 0.0],
                vec![11.0, 0.0],
                vec![12.0, 0.0],
            ],
            &[0, 0, 0, 1, 1, 1],
        )
    }

    fn fit(ds: &Dataset, parms: &ForestParms) -> DecisionTree {
        DecisionTree::fit(ds, parms, &mut NormalSelector::new(42)).unwrap()
    }

    #[test]
    fn pure_dataset_single_leaf() {
        let ds = dataset(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]], &[1, 1, 1]);
        let tree = fit(&ds, &all_features());
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict(&[2.0, 3.0]).unwrap(), 1);
        assert_eq!(tree.predict_proba(&[2.0, 3.0]).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn linearly_separable_correct_split() {
        let tree = fit(&separable(), &all_features());
        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.predict(&[2.0, 0.0]).unwrap(), 0);
        assert_eq!(tree.predict(&[11.0, 0.0]).unwrap(), 1);
        match &tree.nodes()[0] {
            Node::Split { feature, threshold, .. } => {
                assert_eq!(feature.index(), 0);
                assert!((threshold - 6.5).abs() < f64::EPSILON);
            }
            Node::Leaf { .. } => panic!("root should split"),
        }
    }

    #[test]
    fn no_improving_split_makes_leaf() {
        // XOR: no single axis-aligned threshold lowers Gini at the root.
        let ds = dataset(
            vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
            &[0, 1, 1, 0],
        );
        let tree = fit(&ds, &all_features());
        assert_eq!(tree.n_nodes(), 1);
        assert!(tree.compute_impact().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn majority_leaf_is_one_hot_best_label() {
        // Depth 1 leaves a 2:1 mix on the right.
        let ds = dataset(
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]],
            &[0, 0, 1, 1, 0],
        );
        let parms = all_features().with_max_depth(Some(1));
        let tree = fit(&ds, &parms);
        for node in tree.nodes() {
            if let Some(dist) = node.distribution() {
                assert_eq!(dist.iter().filter(|&&v| v == 1.0).count(), 1);
                assert!((dist.iter().sum::<f64>() - 1.0).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn proportional_leaf_keeps_class_frequencies() {
        let ds = dataset(vec![vec![1.0], vec![1.0], vec![1.0]], &[0, 1, 1]);
        let parms = all_features().with_leaf_vote(LeafVote::Proportional);
        let tree = fit(&ds, &parms);
        let proba = tree.predict_proba(&[1.0]).unwrap();
        assert!((proba[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((proba[1] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(tree.predict(&[1.0]).unwrap(), 1);
    }

    #[test]
    fn impact_sums_decrease_per_feature() {
        let tree = fit(&separable(), &all_features());
        let impact = tree.compute_impact();
        assert_eq!(impact.len(), 2);
        assert!((impact[0] - 3.0).abs() < 1e-12);
        assert_eq!(impact[1], 0.0);
        // Memoized: same slice on the second call.
        assert!(std::ptr::eq(impact, tree.compute_impact()));
    }

    #[test]
    fn constant_column_is_not_eligible() {
        let tree = fit(&separable(), &all_features());
        assert_eq!(tree.eligible_features(), &[0]);
    }

    #[test]
    fn vote_accumulates_into_caller_buffer() {
        let tree = fit(&separable(), &all_features());
        let rows = vec![vec![2.0, 0.0], vec![11.0, 0.0]];
        let mut votes = vec![vec![0.5, 0.0], vec![0.0, 0.0]];
        tree.vote(&rows, &mut votes).unwrap();
        tree.vote(&rows, &mut votes).unwrap();
        assert_eq!(votes, vec![vec![2.5, 0.0], vec![0.0, 2.0]]);
    }

    #[test]
    fn vote_rejects_bad_shapes_without_writing() {
        let tree = fit(&separable(), &all_features());
        let mut votes = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let err = tree
            .vote(&[vec![2.0, 0.0], vec![1.0]], &mut votes)
            .unwrap_err();
        assert!(matches!(err, RfError::PredictionFeatureMismatch { expected: 2, got: 1 }));
        assert_eq!(votes, vec![vec![0.0, 0.0], vec![0.0, 0.0]]);

        let err = tree.vote(&[vec![2.0, 0.0]], &mut votes).unwrap_err();
        assert!(matches!(err, RfError::VoteShapeMismatch { got_rows: 2, .. }));
    }

    #[test]
    fn deterministic_with_same_seed() {
        let ds = separable();
        let parms = ForestParms::new(1).unwrap().with_max_features(crate::config::MaxFeatures::Fixed(1));
        let a = DecisionTree::fit(&ds, &parms, &mut NormalSelector::new(123)).unwrap();
        let b = DecisionTree::fit(&ds, &parms, &mut NormalSelector::new(123)).unwrap();
        assert_eq!(a.nodes(), b.nodes());
    }

    #[test]
    fn prediction_feature_mismatch() {
        let tree = fit(&separable(), &all_features());
        let err = tree.predict(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            RfError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn max_depth_limits_tree() {
        let ds = dataset(
            (0..8).map(|i| vec![i as f64]).collect(),
            &[0, 1, 0, 1, 0, 1, 0, 1],
        );
        let tree = fit(&ds, &all_features().with_max_depth(Some(2)));
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn bootstrap_sample_with_duplicates() {
        let ds = separable();
        let sample = vec![0, 0, 1, 4, 4, 5];
        let tree = DecisionTree::fit_sample(
            &ds,
            sample.clone(),
            vec![0, 1],
            &all_features(),
            &mut NormalSelector::new(1),
        )
        .unwrap();
        assert_eq!(tree.sample(), sample.as_slice());
        assert_eq!(tree.oob_rows(ds.n_rows()), vec![2, 3]);
        assert_eq!(tree.nodes()[0].n_samples(), 6);
        assert_eq!(tree.predict(&[3.0, 0.0]).unwrap(), 0);
    }

    #[test]
    fn fit_sample_rejects_bad_indices() {
        let ds = separable();
        let mut sel = NormalSelector::new(1);
        let err = DecisionTree::fit_sample(&ds, vec![], vec![0], &all_features(), &mut sel).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
        let err = DecisionTree::fit_sample(&ds, vec![9], vec![0], &all_features(), &mut sel).unwrap_err();
        assert!(matches!(err, RfError::IndexOutOfRange { what: "row", .. }));
        let err = DecisionTree::fit_sample(&ds, vec![0], vec![2], &all_features(), &mut sel).unwrap_err();
        assert!(matches!(err, RfError::IndexOutOfRange { what: "feature", .. }));
    }

    #[test]
    fn fitted_tree_passes_structure_check() {
        let tree = fit(&separable(), &all_features());
        tree.validate_structure().unwrap();

        let mut broken = tree.clone();
        if let Node::Split { left, .. } = &mut broken.nodes[0] {
            *left = NodeIndex::new(0);
        }
        assert!(matches!(
            broken.validate_structure().unwrap_err(),
            RfError::CorruptModel { .. }
        ));
    }

    #[test]
    fn deep_tree_grows_without_recursion() {
        // Alternating classes along one feature force a chain of splits
        // that each peel off a single row.
        let n = 10_000;
        let features: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64]).collect();
        let classes: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let ds = dataset(features, &classes);

        // Rayon workers get the same default stack size as forest builds.
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let tree = pool.install(|| fit(&ds, &all_features()));

        assert_eq!(tree.n_leaves(), n);
        assert_eq!(tree.n_nodes(), 2 * n - 1);
        assert!(tree.depth() >= 1_000, "depth = {}", tree.depth());

        // Depth-first, left before right: a split's left child follows it.
        for (idx, node) in tree.nodes().iter().enumerate() {
            if let Some((left, right)) = node.children() {
                assert_eq!(left.index(), idx + 1);
                assert!(right.index() > left.index());
            }
        }
        for row in [0usize, 1, 4_999, 9_998, 9_999] {
            assert_eq!(tree.predict(ds.row(row)).unwrap(), classes[row]);
        }
        let restored = DecisionTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.nodes(), tree.nodes());
    }

    #[test]
    fn entropy_criterion_trains() {
        let parms = all_features().with_criterion(SplitCriterion::Entropy);
        let tree = fit(&separable(), &parms);
        assert_eq!(tree.n_nodes(), 3);
        match &tree.nodes()[0] {
            Node::Split {
                threshold,
                impurity,
                impurity_decrease,
                ..
            } => {
                assert!((threshold - 6.5).abs() < f64::EPSILON);
                assert!((impurity.value() - std::f64::consts::LN_2).abs() < 1e-12);
                assert!((impurity_decrease - 6.0 * std::f64::consts::LN_2).abs() < 1e-9);
            }
            Node::Leaf { .. } => panic!("root should split"),
        }
        assert_eq!(tree.predict(&[1.5, 0.0]).unwrap(), 0);
        assert_eq!(tree.predict(&[11.5, 0.0]).unwrap(), 1);
    }

    #[test]
    fn min_samples_leaf_bounds_every_leaf() {
        let ds = dataset(
            (1..=6).map(|v| vec![f64::from(v)]).collect(),
            &[0, 1, 1, 1, 1, 1],
        );

        // Unconstrained, the lone class-0 row is split off at 1.5.
        let loose = fit(&ds, &all_features());
        match &loose.nodes()[0] {
            Node::Split { threshold, .. } => assert!((threshold - 1.5).abs() < f64::EPSILON),
            Node::Leaf { .. } => panic!("root should split"),
        }

        let tight = fit(&ds, &all_features().with_min_samples_leaf(2));
        match &tight.nodes()[0] {
            Node::Split { threshold, .. } => assert!((threshold - 2.5).abs() < f64::EPSILON),
            Node::Leaf { .. } => panic!("root should split"),
        }
        for node in tight.nodes().iter().filter(|n| n.is_leaf()) {
            assert!(node.n_samples() >= 2, "leaf with {} rows", node.n_samples());
        }
    }
}
