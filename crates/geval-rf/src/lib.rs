//! Ensemble tree learning: datasets, decision trees, random forests.
//!
//! Provides a hand-rolled random forest classifier with CART decision trees,
//! pluggable per-split feature selection (uniform or importance-rooted),
//! Gini/Entropy split criteria, parallel training and prediction via rayon,
//! feature impact, out-of-bag scoring, stratified cross-validation, and
//! versioned model serialization.

mod config;
mod dataset;
mod error;
mod eval;
mod forest;
mod importance;
mod node;
mod oob;
mod predict;
mod predict_error;
mod selector;
mod serialize;
mod split;
mod tree;

pub use config::{EnsembleMethod, ForestParms, LeafVote, MaxFeatures};
pub use dataset::{Dataset, LabelEncoding, MAX_SCALAR_CLASS};
pub use error::RfError;
pub use eval::{CrossValidation, CrossValidationResult};
pub use forest::{ProgressSink, RandomForest};
pub use importance::RankedFeature;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use oob::OobScore;
pub use predict_error::{ClassMetrics, ClassPredictError};
pub use selector::{
    FeatureRanking, FeatureSelector, FeatureSelectorFactory, NormalSelector,
    NormalSelectorFactory, RootedPolicy, RootedSelector, RootedSelectorFactory,
};
pub use split::SplitCriterion;
pub use tree::DecisionTree;
