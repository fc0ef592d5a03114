//! Class prediction error: best-label selection and expected-vs-predicted tallies.

use std::fmt;

use crate::error::RfError;

/// Tally of expected versus predicted classes.
///
/// Entry `matrix[expected][predicted]` counts how many rows with expected
/// class `expected` were predicted as `predicted`. Rows of probabilities or
/// votes are reduced to a class with [`ClassPredictError::compute_best`], so
/// the same tie-break applies to tree leaves, forest votes, and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPredictError {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone)]
pub struct ClassMetrics {
    /// The class index.
    pub class: usize,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no expected rows for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of expected rows in this class.
    pub support: usize,
}

impl ClassPredictError {
    /// Return the column index of the largest value in `row`.
    ///
    /// Ties go to the lowest index and NaN never wins. An empty row yields 0.
    #[must_use]
    pub fn compute_best(row: &[f64]) -> usize {
        let mut best = 0usize;
        let mut best_value = f64::NEG_INFINITY;
        for (idx, &value) in row.iter().enumerate() {
            if value > best_value {
                best = idx;
                best_value = value;
            }
        }
        best
    }

    /// Create an empty tally over `n_classes` classes.
    #[must_use]
    pub fn new(n_classes: usize) -> Self {
        Self {
            matrix: vec![vec![0usize; n_classes]; n_classes],
            n_classes,
        }
    }

    /// Build a tally from expected and predicted class indices.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | Zero classes provided |
    /// | [`RfError::LengthMismatch`] | `expected` and `predicted` differ in length |
    /// | [`RfError::IndexOutOfRange`] | A class index is `>= n_classes` |
    pub fn from_classes(
        expected: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, RfError> {
        if expected.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        if expected.len() != predicted.len() {
            return Err(RfError::LengthMismatch {
                what: "predicted classes",
                expected: expected.len(),
                got: predicted.len(),
            });
        }
        let mut tally = Self::new(n_classes);
        for (&e, &p) in expected.iter().zip(predicted) {
            tally.record_class(e, p)?;
        }
        Ok(tally)
    }

    /// Build a tally from row-aligned expected and predicted probability matrices.
    ///
    /// # Errors
    ///
    /// Same as [`ClassPredictError::from_classes`].
    pub fn from_rows(
        expected: &[Vec<f64>],
        predicted: &[Vec<f64>],
        n_classes: usize,
    ) -> Result<Self, RfError> {
        let expected: Vec<usize> = expected.iter().map(|r| Self::compute_best(r)).collect();
        let predicted: Vec<usize> = predicted.iter().map(|r| Self::compute_best(r)).collect();
        Self::from_classes(&expected, &predicted, n_classes)
    }

    /// Record one expected/predicted row pair.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::IndexOutOfRange`] if either best label is `>= n_classes`.
    pub fn record(&mut self, expected: &[f64], predicted: &[f64]) -> Result<(), RfError> {
        self.record_class(Self::compute_best(expected), Self::compute_best(predicted))
    }

    /// Record one expected/predicted class pair.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::IndexOutOfRange`] if either class is `>= n_classes`.
    pub fn record_class(&mut self, expected: usize, predicted: usize) -> Result<(), RfError> {
        for class in [expected, predicted] {
            if class >= self.n_classes {
                return Err(RfError::IndexOutOfRange {
                    what: "class",
                    index: class,
                    len: self.n_classes,
                });
            }
        }
        self.matrix[expected][predicted] += 1;
        Ok(())
    }

    /// Fold another tally over the same classes into this one.
    pub fn merge(&mut self, other: &ClassPredictError) {
        for (mine, theirs) in self.matrix.iter_mut().zip(&other.matrix) {
            for (m, t) in mine.iter_mut().zip(theirs) {
                *m += t;
            }
        }
    }

    /// Total number of recorded rows.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flat_map(|row| row.iter()).sum()
    }

    /// Proportion of rows whose predicted class matched the expected class.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Proportion of mispredicted rows (`1 - accuracy`, 0.0 when empty).
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            1.0 - self.accuracy()
        }
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.n_classes)
            .map(|c| {
                let tp = self.matrix[c][c];
                let fp: usize = (0..self.n_classes)
                    .filter(|&i| i != c)
                    .map(|i| self.matrix[i][c])
                    .sum();
                let fn_: usize = (0..self.n_classes)
                    .filter(|&j| j != c)
                    .map(|j| self.matrix[c][j])
                    .sum();
                let support = tp + fn_;
                let precision = if tp + fp == 0 {
                    0.0
                } else {
                    tp as f64 / (tp + fp) as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: c,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl fmt::Display for ClassPredictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;

        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>7}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
