use std::path::PathBuf;

/// Errors from dataset construction, forest training, prediction, and persistence.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds the column count.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of feature columns in the dataset.
        n_features: usize,
    },

    /// Returned when bootstrap_fraction is not in (0.0, 1.0].
    #[error("bootstrap_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidBootstrapFraction {
        /// The invalid bootstrap_fraction value provided.
        fraction: f64,
    },

    /// Returned when the worker pool width is zero.
    #[error("n_threads must be at least 1, got {n_threads}")]
    InvalidThreadCount {
        /// The invalid n_threads value provided.
        n_threads: usize,
    },

    /// Returned when the factory stream runs dry before every tree has a selector.
    #[error("need one feature selector factory per tree: {n_trees} trees, {supplied} factories")]
    TooFewSelectorFactories {
        /// Number of trees requested.
        n_trees: usize,
        /// Number of factories the iterator produced.
        supplied: usize,
    },

    /// Returned when a feature ranking score is negative or non-finite.
    #[error("ranking score for feature {feature_index} must be finite and non-negative, got {score}")]
    InvalidRankingScore {
        /// The zero-based feature index.
        feature_index: usize,
        /// The offending score.
        score: f64,
    },

    /// Returned when a rooted selection policy is out of range.
    #[error("invalid rooted selection policy: {reason}")]
    InvalidRootedPolicy {
        /// Which policy field is out of range.
        reason: String,
    },

    /// Returned when n_folds is less than 2.
    #[error("n_folds must be at least 2, got {n_folds}")]
    InvalidFoldCount {
        /// The invalid n_folds value provided.
        n_folds: usize,
    },

    /// Returned when the dataset has zero rows.
    #[error("dataset has zero rows")]
    EmptyDataset,

    /// Returned when the dataset has zero feature columns.
    #[error("dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a row has a different number of features than expected.
    #[error("row {row_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the row.
        got: usize,
        /// The zero-based index of the offending row.
        row_index: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at row {row_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending row.
        row_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when the label matrix does not have one row per feature row.
    #[error("dataset has {n_rows} feature rows but {n_labels} label rows")]
    LabelCountMismatch {
        /// Number of feature rows.
        n_rows: usize,
        /// Number of label rows.
        n_labels: usize,
    },

    /// Returned when a label row is malformed (wrong width, not one-hot, not a class index).
    #[error("invalid label at row {row_index}: {reason}")]
    InvalidLabel {
        /// The zero-based index of the offending row.
        row_index: usize,
        /// What is wrong with the label row.
        reason: String,
    },

    /// Returned when a side table (names, metadata) does not match the row or column count.
    #[error("{what} has {got} entries, expected {expected}")]
    LengthMismatch {
        /// Which table was mis-sized.
        what: &'static str,
        /// The expected entry count.
        expected: usize,
        /// The actual entry count.
        got: usize,
    },

    /// Returned when a row or column index passed to a dataset view is out of range.
    #[error("{what} index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Which axis the index addresses.
        what: &'static str,
        /// The offending index.
        index: usize,
        /// The axis length.
        len: usize,
    },

    /// Returned when prediction input has a different feature count than the model.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a vote accumulator does not match the input rows or class count.
    #[error("vote accumulator is {got_rows}x{got_cols}, expected {expected_rows}x{expected_cols}")]
    VoteShapeMismatch {
        /// Number of input rows.
        expected_rows: usize,
        /// Number of classes.
        expected_cols: usize,
        /// Accumulator row count.
        got_rows: usize,
        /// Width of the first mis-sized accumulator row (or expected width when only the row count is off).
        got_cols: usize,
    },

    /// Returned when a class has fewer rows than the number of folds.
    #[error("class {class} has only {count} rows, need at least {n_folds} for stratified CV")]
    TooFewSamplesForFolds {
        /// The class index with insufficient rows.
        class: usize,
        /// The number of rows belonging to that class.
        count: usize,
        /// The requested number of folds.
        n_folds: usize,
    },

    /// Returned when OOB evaluation is impossible (no row is out of bag for any tree).
    #[error("OOB evaluation failed: {reason}")]
    OobEvaluationFailed {
        /// Human-readable description of why OOB evaluation failed.
        reason: String,
    },

    /// Returned when the rayon worker pool cannot be built.
    #[error("failed to build worker pool")]
    ThreadPool {
        /// The underlying rayon error.
        #[from]
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model")]
    DeserializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when a decoded model violates a structural invariant.
    #[error("corrupt model: {reason}")]
    CorruptModel {
        /// Which invariant was violated.
        reason: String,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version or kind.
    #[error("incompatible model: expected {expected_kind} v{expected}, found {found_kind} v{found}")]
    IncompatibleModelVersion {
        /// The format version this build expects.
        expected: u32,
        /// The format version found in the payload.
        found: u32,
        /// The payload kind this call expects ("tree" or "forest").
        expected_kind: String,
        /// The payload kind found.
        found_kind: String,
    },
}
