//! Feature impact ranking.

use crate::forest::RandomForest;

/// A ranked feature with name, importance score, and rank.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFeature {
    /// Feature name.
    pub name: String,
    /// Original feature column index.
    pub index: usize,
    /// Normalized importance score (sums to 1.0 across all features).
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Normalize `impact` to sum 1, sort descending, and assign 1-based ranks.
///
/// Equal scores keep ascending column order. An all-zero vector stays zero.
pub(crate) fn rank_impact(impact: &[f64], names: &[String]) -> Vec<RankedFeature> {
    let sum: f64 = impact.iter().sum();

    let mut features: Vec<RankedFeature> = impact
        .iter()
        .enumerate()
        .map(|(index, &value)| RankedFeature {
            name: names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("f{index}")),
            index,
            importance: if sum > 0.0 { value / sum } else { 0.0 },
            rank: 0, // set after sorting
        })
        .collect();

    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    for (i, feat) in features.iter_mut().enumerate() {
        feat.rank = i + 1;
    }

    features
}

impl RandomForest {
    /// Return [`RandomForest::compute_impact`] normalized to sum 1 and ranked.
    #[must_use]
    pub fn ranked_impact(&self) -> Vec<RankedFeature> {
        rank_impact(&self.compute_impact(), &self.feature_names)
    }
}

#[cfg(test)]
mod tests {
    use super::rank_impact;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("feat{i}")).collect()
    }

    #[test]
    fn normalizes_and_ranks() {
        let ranked = rank_impact(&[1.0, 3.0, 0.0, 4.0], &names(4));
        let order: Vec<usize> = ranked.iter().map(|f| f.index).collect();
        assert_eq!(order, vec![3, 1, 0, 2]);
        assert_eq!(ranked[0].name, "feat3");
        assert_eq!(ranked[0].rank, 1);
        assert!((ranked[0].importance - 0.5).abs() < 1e-12);
        let total: f64 = ranked.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ties_keep_column_order() {
        let ranked = rank_impact(&[2.0, 2.0, 2.0], &names(3));
        let order: Vec<usize> = ranked.iter().map(|f| f.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn all_zero_stays_zero() {
        let ranked = rank_impact(&[0.0, 0.0], &names(2));
        assert!(ranked.iter().all(|f| f.importance == 0.0));
        assert_eq!(ranked[1].rank, 2);
    }
}
