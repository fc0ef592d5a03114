//! Configuration builder for forest and tree training.

use crate::error::RfError;
use crate::split::SplitCriterion;

/// Strategy for determining the number of candidate features at each split.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// Square root of total features.
    Sqrt,
    /// Log base 2 of total features.
    Log2,
    /// A fraction of total features (must be in (0.0, 1.0]).
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

impl MaxFeatures {
    /// Resolve to a concrete count for a dataset with `n_features` columns.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidMaxFeatures`] if the count falls outside `[1, n_features]`.
    pub fn resolve(self, n_features: usize) -> Result<usize, RfError> {
        let resolved = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        if resolved == 0 || resolved > n_features {
            return Err(RfError::InvalidMaxFeatures {
                max_features: resolved,
                n_features,
            });
        }
        Ok(resolved)
    }
}

/// How per-tree votes are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EnsembleMethod {
    /// Every tree votes with weight 1.
    Bagging,
    /// Each tree votes with its accuracy on its own out-of-bag rows.
    Weighted,
}

/// What a leaf stores as its vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LeafVote {
    /// One-hot vector of the majority class.
    Majority,
    /// Class frequencies of the rows reaching the leaf.
    Proportional,
}

/// Configuration for forest (and single-tree) training.
///
/// Construct via [`ForestParms::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter            | Default                 |
/// |----------------------|-------------------------|
/// | `max_features`       | `Sqrt`                  |
/// | `method`             | `Bagging`               |
/// | `seed`               | 42                      |
/// | `max_depth`          | `None`                  |
/// | `min_samples_split`  | 2                       |
/// | `min_samples_leaf`   | 1                       |
/// | `criterion`          | `Gini`                  |
/// | `leaf_vote`          | `Majority`              |
/// | `bootstrap_fraction` | 1.0                     |
/// | `n_threads`          | `None` (all cores)      |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestParms {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) method: EnsembleMethod,
    pub(crate) seed: u64,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) leaf_vote: LeafVote,
    pub(crate) bootstrap_fraction: f64,
    pub(crate) n_threads: Option<usize>,
}

impl ForestParms {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, RfError> {
        if n_trees == 0 {
            return Err(RfError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            max_features: MaxFeatures::Sqrt,
            method: EnsembleMethod::Bagging,
            seed: 42,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: SplitCriterion::Gini,
            leaf_vote: LeafVote::Majority,
            bootstrap_fraction: 1.0,
            n_threads: None,
        })
    }

    // --- Setters ---

    /// Set the candidate-features-per-split strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the ensemble aggregation method.
    #[must_use]
    pub fn with_method(mut self, method: EnsembleMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited; the root is depth 0.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of rows required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of rows required in each child after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set what leaves store as their vote.
    #[must_use]
    pub fn with_leaf_vote(mut self, leaf_vote: LeafVote) -> Self {
        self.leaf_vote = leaf_vote;
        self
    }

    /// Set the bootstrap fraction (rows drawn per tree as a share of the dataset).
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, bootstrap_fraction: f64) -> Self {
        self.bootstrap_fraction = bootstrap_fraction;
        self
    }

    /// Set the worker pool width. `None` uses rayon's global pool.
    #[must_use]
    pub fn with_n_threads(mut self, n_threads: Option<usize>) -> Self {
        self.n_threads = n_threads;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the candidate-features-per-split strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the ensemble aggregation method.
    #[must_use]
    pub fn method(&self) -> EnsembleMethod {
        self.method
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the minimum rows required to split a node.
    #[must_use]
    pub fn min_samples_split(&self) -> usize {
        self.min_samples_split
    }

    /// Return the minimum rows required in each child.
    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.min_samples_leaf
    }

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the leaf vote mode.
    #[must_use]
    pub fn leaf_vote(&self) -> LeafVote {
        self.leaf_vote
    }

    /// Return the bootstrap fraction.
    #[must_use]
    pub fn bootstrap_fraction(&self) -> f64 {
        self.bootstrap_fraction
    }

    /// Return the worker pool width, if set.
    #[must_use]
    pub fn n_threads(&self) -> Option<usize> {
        self.n_threads
    }

    /// Check every tree-level setting against a dataset with `n_features`
    /// columns and return the resolved candidate count per split.
    ///
    /// # Errors
    ///
    /// | Variant                               | When                                              |
    /// |---------------------------------------|---------------------------------------------------|
    /// | [`RfError::InvalidMaxDepth`]          | `max_depth` is `Some(0)`                          |
    /// | [`RfError::InvalidMinSamplesSplit`]   | `min_samples_split` < 2                           |
    /// | [`RfError::InvalidMinSamplesLeaf`]    | `min_samples_leaf` < 1                            |
    /// | [`RfError::InvalidMaxFeatures`]       | resolved max_features is outside [1, n_features]  |
    pub(crate) fn validate_tree(&self, n_features: usize) -> Result<usize, RfError> {
        if self.max_depth == Some(0) {
            return Err(RfError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(RfError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(RfError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        self.max_features.resolve(n_features)
    }

    /// As [`ForestParms::validate_tree`], plus the forest-only settings.
    ///
    /// # Errors
    ///
    /// Additionally [`RfError::InvalidBootstrapFraction`] and
    /// [`RfError::InvalidThreadCount`].
    pub(crate) fn validate_forest(&self, n_features: usize) -> Result<usize, RfError> {
        if self.n_trees == 0 {
            return Err(RfError::InvalidTreeCount { n_trees: 0 });
        }
        let resolved = self.validate_tree(n_features)?;
        if !(self.bootstrap_fraction > 0.0 && self.bootstrap_fraction <= 1.0) {
            return Err(RfError::InvalidBootstrapFraction {
                fraction: self.bootstrap_fraction,
            });
        }
        if self.n_threads == Some(0) {
            return Err(RfError::InvalidThreadCount { n_threads: 0 });
        }
        Ok(resolved)
    }
}
