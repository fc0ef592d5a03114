//! Immutable training table: feature matrix, label matrix, per-row metadata.

use crate::error::RfError;
use crate::predict_error::ClassPredictError;

/// Tolerance for one-hot label rows summing to 1.
const LABEL_SUM_TOLERANCE: f64 = 1e-9;

/// Largest class index a scalar label may hold.
///
/// Every node allocates one counter per class, so the class space is bounded.
pub const MAX_SCALAR_CLASS: usize = 65_535;

/// How the label matrix encodes classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelEncoding {
    /// One column per class; each row sums to 1.
    OneHot,
    /// A single column holding the class index as a number.
    Scalar,
}

/// An immutable feature matrix plus labels, shared read-only by every tree.
///
/// Features are kept twice: row-major for per-row access and prediction,
/// column-major for split finding. Both are built once here and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<Vec<f64>>,
    columns: Vec<Vec<f64>>,
    labels: Vec<Vec<f64>>,
    classes: Vec<usize>,
    encoding: LabelEncoding,
    n_classes: usize,
    feature_names: Vec<String>,
    class_names: Vec<String>,
    metadata: Option<Vec<Vec<String>>>,
}

impl Dataset {
    /// Build a dataset from a row-major feature matrix and a label matrix.
    ///
    /// `labels` is either N×K one-hot (K ≥ 2) or N×1 scalar class indices.
    /// Feature names default to `f0..fN`; class names to `0..K`.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                                         |
    /// |-------------------------------------|----------------------------------------------|
    /// | [`RfError::EmptyDataset`]           | `features` is empty                          |
    /// | [`RfError::ZeroFeatures`]           | rows have zero feature columns               |
    /// | [`RfError::FeatureCountMismatch`]   | rows have inconsistent lengths               |
    /// | [`RfError::NonFiniteValue`]         | any feature value is NaN or infinite         |
    /// | [`RfError::LabelCountMismatch`]     | label row count differs from feature rows    |
    /// | [`RfError::InvalidLabel`]           | ragged, non-one-hot, or non-integer labels, or a scalar label above [`MAX_SCALAR_CLASS`] |
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<Vec<f64>>) -> Result<Self, RfError> {
        let n_features = validate_features(&features)?;
        let n_rows = features.len();

        if labels.len() != n_rows {
            return Err(RfError::LabelCountMismatch {
                n_rows,
                n_labels: labels.len(),
            });
        }

        let width = labels[0].len();
        let encoding = match width {
            0 => {
                return Err(RfError::InvalidLabel {
                    row_index: 0,
                    reason: "label row is empty".to_string(),
                });
            }
            1 => LabelEncoding::Scalar,
            _ => LabelEncoding::OneHot,
        };

        let mut classes = Vec::with_capacity(n_rows);
        for (row_index, row) in labels.iter().enumerate() {
            if row.len() != width {
                return Err(RfError::InvalidLabel {
                    row_index,
                    reason: format!("label row has {} columns, expected {width}", row.len()),
                });
            }
            let class = match encoding {
                LabelEncoding::OneHot => {
                    let sum: f64 = row.iter().sum();
                    if !sum.is_finite() || (sum - 1.0).abs() > LABEL_SUM_TOLERANCE {
                        return Err(RfError::InvalidLabel {
                            row_index,
                            reason: format!("one-hot row sums to {sum}"),
                        });
                    }
                    ClassPredictError::compute_best(row)
                }
                LabelEncoding::Scalar => {
                    let value = row[0];
                    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                        return Err(RfError::InvalidLabel {
                            row_index,
                            reason: format!("scalar label {value} is not a class index"),
                        });
                    }
                    if value > MAX_SCALAR_CLASS as f64 {
                        return Err(RfError::InvalidLabel {
                            row_index,
                            reason: format!(
                                "scalar label {value} exceeds the largest class index {MAX_SCALAR_CLASS}"
                            ),
                        });
                    }
                    value as usize
                }
            };
            classes.push(class);
        }

        let n_classes = match encoding {
            LabelEncoding::OneHot => width,
            LabelEncoding::Scalar => {
                let max_class = classes.iter().max().copied().unwrap_or(0);
                max_class.checked_add(1).ok_or_else(|| RfError::InvalidLabel {
                    row_index: 0,
                    reason: format!("class index {max_class} leaves no room for a class count"),
                })?
            }
        };

        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
            .collect();

        Ok(Self {
            rows: features,
            columns,
            labels,
            classes,
            encoding,
            n_classes,
            feature_names: (0..n_features).map(|f| format!("f{f}")).collect(),
            class_names: (0..n_classes).map(|c| c.to_string()).collect(),
            metadata: None,
        })
    }

    /// Build a one-hot dataset from class indices.
    ///
    /// # Errors
    ///
    /// As [`Dataset::new`], plus [`RfError::InvalidLabel`] when a class is
    /// `>= n_classes` or `n_classes < 2`.
    pub fn from_classes(
        features: Vec<Vec<f64>>,
        classes: &[usize],
        n_classes: usize,
    ) -> Result<Self, RfError> {
        if n_classes < 2 {
            return Err(RfError::InvalidLabel {
                row_index: 0,
                reason: format!("one-hot labels need at least 2 classes, got {n_classes}"),
            });
        }
        let mut labels = Vec::with_capacity(classes.len());
        for (row_index, &class) in classes.iter().enumerate() {
            if class >= n_classes {
                return Err(RfError::InvalidLabel {
                    row_index,
                    reason: format!("class {class} is not below {n_classes}"),
                });
            }
            let mut row = vec![0.0; n_classes];
            row[class] = 1.0;
            labels.push(row);
        }
        Self::new(features, labels)
    }

    /// Attach feature column names.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::LengthMismatch`] unless there is one name per column.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self, RfError> {
        if names.len() != self.n_features() {
            return Err(RfError::LengthMismatch {
                what: "feature names",
                expected: self.n_features(),
                got: names.len(),
            });
        }
        self.feature_names = names;
        Ok(self)
    }

    /// Attach class names.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::LengthMismatch`] unless there is one name per class.
    pub fn with_class_names(mut self, names: Vec<String>) -> Result<Self, RfError> {
        if names.len() != self.n_classes {
            return Err(RfError::LengthMismatch {
                what: "class names",
                expected: self.n_classes,
                got: names.len(),
            });
        }
        self.class_names = names;
        Ok(self)
    }

    /// Attach opaque per-row metadata. It travels with rows but is never split on.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::LengthMismatch`] unless there is one metadata row per data row.
    pub fn with_metadata(mut self, metadata: Vec<Vec<String>>) -> Result<Self, RfError> {
        if metadata.len() != self.n_rows() {
            return Err(RfError::LengthMismatch {
                what: "metadata rows",
                expected: self.n_rows(),
                got: metadata.len(),
            });
        }
        self.metadata = Some(metadata);
        Ok(self)
    }

    /// Return a dataset holding only the given feature columns, in the given order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::ZeroFeatures`] | `columns` is empty |
    /// | [`RfError::IndexOutOfRange`] | A column index is `>= n_features` |
    pub fn restrict(&self, columns: &[usize]) -> Result<Self, RfError> {
        if columns.is_empty() {
            return Err(RfError::ZeroFeatures);
        }
        for &c in columns {
            if c >= self.n_features() {
                return Err(RfError::IndexOutOfRange {
                    what: "feature",
                    index: c,
                    len: self.n_features(),
                });
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|row| columns.iter().map(|&c| row[c]).collect())
            .collect();
        let mut restricted = self.rebuild(rows, self.labels.clone())?;
        restricted.feature_names = columns.iter().map(|&c| self.feature_names[c].clone()).collect();
        restricted.metadata = self.metadata.clone();
        Ok(restricted)
    }

    /// Return a dataset holding only the given rows, in the given order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | `rows` is empty |
    /// | [`RfError::IndexOutOfRange`] | A row index is `>= n_rows` |
    pub fn subset(&self, rows: &[usize]) -> Result<Self, RfError> {
        if rows.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        for &r in rows {
            if r >= self.n_rows() {
                return Err(RfError::IndexOutOfRange {
                    what: "row",
                    index: r,
                    len: self.n_rows(),
                });
            }
        }
        let features = rows.iter().map(|&r| self.rows[r].clone()).collect();
        let labels = rows.iter().map(|&r| self.labels[r].clone()).collect();
        let mut subset = self.rebuild(features, labels)?;
        subset.feature_names = self.feature_names.clone();
        subset.metadata = self
            .metadata
            .as_ref()
            .map(|meta| rows.iter().map(|&r| meta[r].clone()).collect());
        Ok(subset)
    }

    /// Rebuild through [`Dataset::new`], keeping this dataset's class space.
    fn rebuild(&self, features: Vec<Vec<f64>>, labels: Vec<Vec<f64>>) -> Result<Self, RfError> {
        let mut rebuilt = Self::new(features, labels)?;
        // A scalar-encoded subset may not contain the highest class.
        rebuilt.n_classes = self.n_classes;
        rebuilt.class_names = self.class_names.clone();
        Ok(rebuilt)
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the label encoding.
    #[must_use]
    pub fn encoding(&self) -> LabelEncoding {
        self.encoding
    }

    /// Return one feature row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= n_rows`.
    #[must_use]
    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    /// Return the row-major feature matrix.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Return every row's value for one feature column.
    ///
    /// # Panics
    ///
    /// Panics if `feature >= n_features`.
    #[must_use]
    pub fn column(&self, feature: usize) -> &[f64] {
        &self.columns[feature]
    }

    /// Return the column-major feature matrix.
    #[must_use]
    pub(crate) fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Return one label row exactly as supplied.
    #[must_use]
    pub fn label_row(&self, index: usize) -> &[f64] {
        &self.labels[index]
    }

    /// Return the class index of one row.
    #[must_use]
    pub fn class_of(&self, index: usize) -> usize {
        self.classes[index]
    }

    /// Return the class index of every row.
    #[must_use]
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the class names.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Return one row's metadata, if metadata was attached.
    #[must_use]
    pub fn metadata(&self, index: usize) -> Option<&[String]> {
        self.metadata.as_ref().map(|meta| meta[index].as_slice())
    }
}

/// Check shape and finiteness; return the column count.
fn validate_features(features: &[Vec<f64>]) -> Result<usize, RfError> {
    if features.is_empty() {
        return Err(RfError::EmptyDataset);
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }
    for (row_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                row_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(RfError::NonFiniteValue {
                    row_index,
                    feature_index,
                });
            }
        }
    }
    Ok(n_features)
}
