//! Candidate-feature selection strategies used at each split.
//!
//! A [`FeatureSelectorFactory`] hands every tree its own [`FeatureSelector`]
//! seeded from that tree's random stream, so trees built concurrently never
//! share random state.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::RfError;

/// Chooses which eligible features a node evaluates.
pub trait FeatureSelector {
    /// Return `min(count, eligible.len())` distinct indices drawn from
    /// `eligible`, sorted ascending.
    fn choose(&mut self, eligible: &[usize], count: usize) -> Vec<usize>;
}

/// Produces one independent [`FeatureSelector`] per tree.
pub trait FeatureSelectorFactory: Send + Sync {
    /// The selector type this factory produces.
    type Selector: FeatureSelector;

    /// Create a selector driven by `seed`.
    fn selector(&self, seed: u64) -> Self::Selector;

    /// Check that this factory can serve a dataset with `n_features` columns.
    ///
    /// Called once per factory before any tree is built.
    ///
    /// # Errors
    ///
    /// Implementations return the [`RfError`] describing the mismatch.
    fn check_feature_count(&self, n_features: usize) -> Result<(), RfError> {
        let _ = n_features;
        Ok(())
    }
}

/// Move `take` uniformly chosen entries to the front of `pool` (partial Fisher-Yates).
fn partial_shuffle(pool: &mut [usize], take: usize, rng: &mut impl Rng) {
    for i in 0..take.min(pool.len()) {
        let j = rng.gen_range(i..pool.len());
        pool.swap(i, j);
    }
}

/// Uniform sampling without replacement.
#[derive(Debug, Clone)]
pub struct NormalSelector {
    rng: ChaCha8Rng,
}

impl NormalSelector {
    /// Create a selector seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl FeatureSelector for NormalSelector {
    fn choose(&mut self, eligible: &[usize], count: usize) -> Vec<usize> {
        let mut pool = eligible.to_vec();
        if count < pool.len() {
            partial_shuffle(&mut pool, count, &mut self.rng);
            pool.truncate(count);
        }
        pool.sort_unstable();
        pool
    }
}

/// Factory for [`NormalSelector`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalSelectorFactory;

impl FeatureSelectorFactory for NormalSelectorFactory {
    type Selector = NormalSelector;

    fn selector(&self, seed: u64) -> NormalSelector {
        NormalSelector::new(seed)
    }
}

/// Externally supplied importance score per feature column.
///
/// Scores are non-negative; 0 means the feature is unranked. Typically the
/// impact vector of a previously trained forest or a ranking table read from
/// disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRanking {
    scores: Vec<f64>,
}

impl FeatureRanking {
    /// Build a ranking from one score per feature column.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidRankingScore`] if any score is negative or non-finite.
    pub fn from_scores(scores: Vec<f64>) -> Result<Self, RfError> {
        for (feature_index, &score) in scores.iter().enumerate() {
            if !score.is_finite() || score < 0.0 {
                return Err(RfError::InvalidRankingScore {
                    feature_index,
                    score,
                });
            }
        }
        Ok(Self { scores })
    }

    /// Build a ranking from features listed best-first.
    ///
    /// The first listed feature scores `order.len()`, the next one less, and so
    /// on; unlisted features score 0.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::IndexOutOfRange`] if a listed feature is `>= n_features`.
    pub fn from_order(order: &[usize], n_features: usize) -> Result<Self, RfError> {
        let mut scores = vec![0.0; n_features];
        for (position, &feature) in order.iter().enumerate() {
            if feature >= n_features {
                return Err(RfError::IndexOutOfRange {
                    what: "feature",
                    index: feature,
                    len: n_features,
                });
            }
            scores[feature] = (order.len() - position) as f64;
        }
        Ok(Self { scores })
    }

    /// Return the score of a feature; features beyond the table score 0.
    #[must_use]
    pub fn score(&self, feature: usize) -> f64 {
        self.scores.get(feature).copied().unwrap_or(0.0)
    }

    /// Return every score, indexed by feature.
    #[must_use]
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }
}

/// Tunables for [`RootedSelector`].
///
/// | Field             | Default | Meaning                                              |
/// |-------------------|---------|------------------------------------------------------|
/// | `min_score`       | 0.0     | score a feature needs (and must exceed 0) to count as ranked |
/// | `ranked_fraction` | 1.0     | share of each draw taken from ranked features        |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootedPolicy {
    min_score: f64,
    ranked_fraction: f64,
}

impl RootedPolicy {
    /// Create a policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_score: 0.0,
            ranked_fraction: 1.0,
        }
    }

    /// Set the minimum score for a feature to count as ranked.
    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Set the share of each draw taken from ranked features.
    #[must_use]
    pub fn with_ranked_fraction(mut self, ranked_fraction: f64) -> Self {
        self.ranked_fraction = ranked_fraction;
        self
    }

    /// Return the minimum ranked score.
    #[must_use]
    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// Return the ranked share of each draw.
    #[must_use]
    pub fn ranked_fraction(&self) -> f64 {
        self.ranked_fraction
    }

    fn validate(&self) -> Result<(), RfError> {
        if !self.min_score.is_finite() || self.min_score < 0.0 {
            return Err(RfError::InvalidRootedPolicy {
                reason: format!("min_score must be finite and >= 0, got {}", self.min_score),
            });
        }
        if !(0.0..=1.0).contains(&self.ranked_fraction) {
            return Err(RfError::InvalidRootedPolicy {
                reason: format!(
                    "ranked_fraction must be in [0, 1], got {}",
                    self.ranked_fraction
                ),
            });
        }
        Ok(())
    }
}

impl Default for RootedPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Sampling biased toward highly ranked features.
///
/// Each call takes `ceil(count * ranked_fraction)` features from the ranked
/// pool by weighted sampling without replacement (weight = score), then fills
/// the rest uniformly from the eligible features not yet chosen.
#[derive(Debug, Clone)]
pub struct RootedSelector {
    ranking: Arc<FeatureRanking>,
    policy: RootedPolicy,
    rng: ChaCha8Rng,
}

impl RootedSelector {
    fn is_ranked(&self, feature: usize) -> bool {
        let score = self.ranking.score(feature);
        score > 0.0 && score >= self.policy.min_score
    }
}

impl FeatureSelector for RootedSelector {
    fn choose(&mut self, eligible: &[usize], count: usize) -> Vec<usize> {
        let take = count.min(eligible.len());
        if take == eligible.len() {
            let mut all = eligible.to_vec();
            all.sort_unstable();
            return all;
        }

        let ranked: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|&f| self.is_ranked(f))
            .collect();
        let n_ranked = ((take as f64 * self.policy.ranked_fraction).ceil() as usize)
            .min(ranked.len())
            .min(take);

        // Efraimidis-Spirakis: the largest ln(u) / w keys form a weighted sample.
        let mut keyed: Vec<(f64, usize)> = ranked
            .iter()
            .map(|&f| {
                let u: f64 = self.rng.r#gen();
                (u.ln() / self.ranking.score(f), f)
            })
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut chosen: Vec<usize> = keyed.iter().take(n_ranked).map(|&(_, f)| f).collect();
        chosen.sort_unstable();

        let mut rest: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|f| chosen.binary_search(f).is_err())
            .collect();
        let need = take - chosen.len();
        partial_shuffle(&mut rest, need, &mut self.rng);
        chosen.extend_from_slice(&rest[..need]);
        chosen.sort_unstable();
        chosen
    }
}

/// Factory for [`RootedSelector`]s sharing one ranking table.
#[derive(Debug, Clone)]
pub struct RootedSelectorFactory {
    ranking: Arc<FeatureRanking>,
    policy: RootedPolicy,
}

impl RootedSelectorFactory {
    /// Create a factory over `ranking` with the given policy.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidRootedPolicy`] if the policy is out of range.
    pub fn new(ranking: Arc<FeatureRanking>, policy: RootedPolicy) -> Result<Self, RfError> {
        policy.validate()?;
        Ok(Self { ranking, policy })
    }

    /// Return the ranking table.
    #[must_use]
    pub fn ranking(&self) -> &FeatureRanking {
        &self.ranking
    }
}

impl FeatureSelectorFactory for RootedSelectorFactory {
    type Selector = RootedSelector;

    fn selector(&self, seed: u64) -> RootedSelector {
        RootedSelector {
            ranking: Arc::clone(&self.ranking),
            policy: self.policy,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The ranking must hold exactly one score per dataset column.
    fn check_feature_count(&self, n_features: usize) -> Result<(), RfError> {
        let got = self.ranking.scores().len();
        if got != n_features {
            return Err(RfError::LengthMismatch {
                what: "feature ranking",
                expected: n_features,
                got,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(chosen: &[usize], eligible: &[usize], count: usize) {
        assert_eq!(chosen.len(), count.min(eligible.len()));
        assert!(chosen.windows(2).all(|w| w[0] < w[1]), "not sorted/distinct: {chosen:?}");
        assert!(chosen.iter().all(|f| eligible.contains(f)));
    }

    #[test]
    fn normal_returns_distinct_eligible_subset() {
        let eligible = vec![1, 3, 4, 7, 9];
        let mut sel = NormalSelectorFactory.selector(7);
        for count in 0..7 {
            let chosen = sel.choose(&eligible, count);
            assert_valid(&chosen, &eligible, count);
        }
    }

    #[test]
    fn normal_is_reproducible_per_seed() {
        let eligible: Vec<usize> = (0..20).collect();
        let mut a = NormalSelector::new(11);
        let mut b = NormalSelector::new(11);
        for _ in 0..10 {
            assert_eq!(a.choose(&eligible, 4), b.choose(&eligible, 4));
        }
    }

    #[test]
    fn normal_covers_every_feature_eventually() {
        let eligible: Vec<usize> = (0..6).collect();
        let mut sel = NormalSelector::new(3);
        let mut seen = [false; 6];
        for _ in 0..200 {
            for f in sel.choose(&eligible, 2) {
                seen[f] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn ranking_rejects_negative_scores() {
        let err = FeatureRanking::from_scores(vec![1.0, -0.5]).unwrap_err();
        assert!(matches!(err, RfError::InvalidRankingScore { feature_index: 1, .. }));
    }

    #[test]
    fn ranking_from_order() {
        let ranking = FeatureRanking::from_order(&[2, 0], 4).unwrap();
        assert_eq!(ranking.scores(), &[1.0, 0.0, 2.0, 0.0]);
        assert_eq!(ranking.score(10), 0.0);
    }

    #[test]
    fn rooted_always_takes_sole_ranked_feature() {
        let ranking = Arc::new(FeatureRanking::from_scores(vec![0.0, 0.0, 5.0, 0.0, 0.0]).unwrap());
        let factory = RootedSelectorFactory::new(ranking, RootedPolicy::new()).unwrap();
        let mut sel = factory.selector(1);
        let eligible: Vec<usize> = (0..5).collect();
        for _ in 0..50 {
            let chosen = sel.choose(&eligible, 2);
            assert_valid(&chosen, &eligible, 2);
            assert!(chosen.contains(&2), "ranked feature missing: {chosen:?}");
        }
    }

    #[test]
    fn rooted_favours_heavier_scores() {
        let ranking = Arc::new(FeatureRanking::from_scores(vec![100.0, 1.0, 1.0, 1.0]).unwrap());
        let factory = RootedSelectorFactory::new(ranking, RootedPolicy::new()).unwrap();
        let mut sel = factory.selector(5);
        let eligible: Vec<usize> = (0..4).collect();
        let hits = (0..200)
            .filter(|_| sel.choose(&eligible, 1) == vec![0])
            .count();
        assert!(hits > 150, "heavy feature chosen only {hits}/200 times");
    }

    #[test]
    fn rooted_min_score_excludes_weak_features() {
        let ranking = Arc::new(FeatureRanking::from_scores(vec![0.5, 3.0, 0.5, 0.5]).unwrap());
        let policy = RootedPolicy::new().with_min_score(1.0);
        let factory = RootedSelectorFactory::new(ranking, policy).unwrap();
        let mut sel = factory.selector(9);
        let eligible: Vec<usize> = (0..4).collect();
        for _ in 0..20 {
            let chosen = sel.choose(&eligible, 3);
            assert_valid(&chosen, &eligible, 3);
            assert!(chosen.contains(&1));
        }
    }

    #[test]
    fn rooted_falls_back_when_nothing_ranked() {
        let ranking = Arc::new(FeatureRanking::from_scores(vec![0.0; 8]).unwrap());
        let factory = RootedSelectorFactory::new(ranking, RootedPolicy::new()).unwrap();
        let mut sel = factory.selector(2);
        let eligible = vec![0, 2, 4, 6];
        let chosen = sel.choose(&eligible, 3);
        assert_valid(&chosen, &eligible, 3);
    }

    #[test]
    fn rooted_ranking_must_cover_every_column() {
        let ranking = Arc::new(FeatureRanking::from_scores(vec![1.0, 2.0]).unwrap());
        let factory = RootedSelectorFactory::new(ranking, RootedPolicy::new()).unwrap();
        assert!(factory.check_feature_count(2).is_ok());
        assert!(matches!(
            factory.check_feature_count(3),
            Err(RfError::LengthMismatch { expected: 3, got: 2, .. })
        ));
        assert!(NormalSelectorFactory.check_feature_count(3).is_ok());
    }

    #[test]
    fn rooted_policy_validated() {
        let ranking = Arc::new(FeatureRanking::from_scores(vec![1.0]).unwrap());
        let bad = RootedPolicy::new().with_ranked_fraction(1.5);
        assert!(matches!(
            RootedSelectorFactory::new(ranking, bad).unwrap_err(),
            RfError::InvalidRootedPolicy { .. }
        ));
    }
}
