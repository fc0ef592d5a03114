use crate::node::{FeatureIndex, Impurity};

/// Smallest row-weighted impurity decrease that counts as an improvement.
///
/// Decreases at or below this are rounding noise on a split that separates
/// nothing, and the node becomes a leaf instead.
pub(crate) const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// Returns [`Impurity::new(0.0)`] when `n_samples` is zero (pure node).
    ///
    /// For `Gini`: `1 - Σ(p_i²)` where `p_i = count_i / n_samples`.
    /// For `Entropy`: `-Σ(p_i · ln(p_i))` summed only over classes where `p_i > 0`.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let n = n_samples as f64;
        let value = match self {
            SplitCriterion::Gini => {
                let sum_sq: f64 = class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            SplitCriterion::Entropy => {
                -class_counts
                    .iter()
                    .filter(|&&c| c > 0)
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p.ln()
                    })
                    .sum::<f64>()
            }
        };
        Impurity::new(value)
    }
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Row-weighted impurity decrease from this split.
    pub(crate) impurity_decrease: f64,
    /// Row indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Row indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// A scanned candidate, compared by decrease, then feature, then threshold.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    decrease: f64,
    feature: usize,
    threshold: f64,
}

impl Candidate {
    /// Larger decrease wins; equal decreases go to the lower feature, then the lower threshold.
    fn beats(&self, other: &Candidate) -> bool {
        if self.decrease != other.decrease {
            return self.decrease > other.decrease;
        }
        (self.feature, self.threshold) < (other.feature, other.threshold)
    }
}

/// Threshold between two consecutive distinct sorted values.
///
/// The midpoint can round onto `hi` for adjacent floats, which would send `hi`
/// left and empty the right side; `lo` keeps the partition non-empty.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi { mid } else { lo }
}

/// Find the best split over the given candidate features.
///
/// For each candidate, sorts the node's rows by that feature and scans
/// midpoints between consecutive distinct values with incremental class
/// counts. The score is `n·I(parent) − n_l·I(left) − n_r·I(right)`.
///
/// Returns `None` when no candidate yields a decrease above
/// [`MIN_IMPURITY_DECREASE`] with both sides holding at least
/// `min_samples_leaf` rows.
///
/// # Column-major layout
///
/// `columns[feature_idx][row_idx]`; `sample_indices` index into the inner Vecs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split(
    columns: &[Vec<f64>],
    classes: &[usize],
    sample_indices: &[usize],
    class_counts: &[usize],
    parent_impurity: Impurity,
    criterion: SplitCriterion,
    candidates: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitResult> {
    let n_samples = sample_indices.len();
    if n_samples < 2 || candidates.is_empty() {
        return None;
    }

    let mut best: Option<Candidate> = None;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n_samples);

    for &feat_idx in candidates {
        let feat_col = &columns[feat_idx];

        sorted.clear();
        sorted.extend(sample_indices.iter().map(|&si| (feat_col[si], si)));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        // Left grows from empty, right shrinks from full.
        let mut left_counts = vec![0usize; class_counts.len()];
        let mut right_counts = class_counts.to_vec();

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            let class_i = classes[si];
            left_counts[class_i] += 1;
            right_counts[class_i] -= 1;

            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let left_impurity = criterion.impurity(&left_counts, n_left);
            let right_impurity = criterion.impurity(&right_counts, n_right);
            let decrease = (n_samples as f64) * parent_impurity.value()
                - (n_left as f64) * left_impurity.value()
                - (n_right as f64) * right_impurity.value();
            if decrease <= MIN_IMPURITY_DECREASE {
                continue;
            }

            let candidate = Candidate {
                decrease,
                feature: feat_idx,
                threshold: midpoint(val_i, val_next),
            };
            if best.as_ref().is_none_or(|b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }
    }

    let best = best?;

    let feat_col = &columns[best.feature];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .partition(|&&si| feat_col[si] <= best.threshold);
    if left_indices.is_empty() || right_indices.is_empty() {
        return None;
    }

    Some(SplitResult {
        feature: FeatureIndex::new(best.feature),
        threshold: best.threshold,
        impurity_decrease: best.decrease,
        left_indices,
        right_indices,
    })
}
