use std::fmt;

macro_rules! arena_index {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(usize);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index)
            }

            /// Return the zero-based position.
            #[must_use]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_index!(
    /// Feature column a split tests.
    FeatureIndex
);

arena_index!(
    /// Position of a node in its tree's arena.
    NodeIndex
);

/// Gini or entropy impurity of the rows reaching a node.
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// One entry of a decision tree's node arena.
///
/// The root sits at index 0 and every child index is greater than its
/// parent's, so a tree is a flat table that persists without pointer fix-up.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// Interior test `row[feature] <= threshold`.
    Split {
        feature: FeatureIndex,
        threshold: f64,
        /// Taken when the test holds.
        left: NodeIndex,
        right: NodeIndex,
        impurity: Impurity,
        /// Training rows that reached this node, duplicates included.
        n_samples: usize,
        /// `n·I(parent) − n_l·I(left) − n_r·I(right)`.
        impurity_decrease: f64,
    },
    /// Terminal vote.
    Leaf {
        /// Best label: argmax of the class counts, lowest index on ties.
        prediction: usize,
        /// Vote added for every row that lands here; sums to 1.
        distribution: Vec<f64>,
        impurity: Impurity,
        n_samples: usize,
    },
}

/// Outcome of testing a row at one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Route<'a> {
    /// Continue at this child.
    Descend(NodeIndex),
    /// The row has reached a leaf with this vote.
    Vote(&'a [f64]),
}

impl Node {
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// The leaf's vote distribution, or `None` for a split.
    #[must_use]
    pub fn distribution(&self) -> Option<&[f64]> {
        match self {
            Node::Leaf { distribution, .. } => Some(distribution),
            Node::Split { .. } => None,
        }
    }

    /// `(left, right)` children of a split, `None` for a leaf.
    #[must_use]
    pub fn children(&self) -> Option<(NodeIndex, NodeIndex)> {
        match self {
            Node::Split { left, right, .. } => Some((*left, *right)),
            Node::Leaf { .. } => None,
        }
    }

    /// Feature and impurity decrease credited to a split, `None` for a leaf.
    #[must_use]
    pub fn split_gain(&self) -> Option<(FeatureIndex, f64)> {
        match self {
            Node::Split {
                feature,
                impurity_decrease,
                ..
            } => Some((*feature, *impurity_decrease)),
            Node::Leaf { .. } => None,
        }
    }

    /// Test `row` here. The caller guarantees `row` is wide enough.
    pub(crate) fn route(&self, row: &[f64]) -> Route<'_> {
        match self {
            Node::Leaf { distribution, .. } => Route::Vote(distribution),
            Node::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                if row[feature.index()] <= *threshold {
                    Route::Descend(*left)
                } else {
                    Route::Descend(*right)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Impurity, Node, NodeIndex, Route};

    fn leaf(distribution: Vec<f64>) -> Node {
        Node::Leaf {
            prediction: 1,
            distribution,
            impurity: Impurity::new(0.32),
            n_samples: 10,
        }
    }

    fn split() -> Node {
        Node::Split {
            feature: FeatureIndex::new(2),
            threshold: 3.5,
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            impurity: Impurity::new(0.48),
            n_samples: 20,
            impurity_decrease: 3.2,
        }
    }

    #[test]
    fn threshold_is_inclusive_on_the_left() {
        let node = split();
        assert_eq!(node.route(&[0.0, 0.0, 3.5]), Route::Descend(NodeIndex::new(1)));
        assert_eq!(node.route(&[9.0, 9.0, 3.6]), Route::Descend(NodeIndex::new(2)));
    }

    #[test]
    fn leaf_routes_to_its_vote() {
        let node = leaf(vec![0.0, 1.0]);
        assert_eq!(node.route(&[]), Route::Vote(&[0.0, 1.0]));
        assert!(node.children().is_none());
        assert!(node.split_gain().is_none());
    }

    #[test]
    fn split_exposes_children_and_gain() {
        let node = split();
        assert!(!node.is_leaf());
        assert_eq!(node.n_samples(), 20);
        assert_eq!(node.children(), Some((NodeIndex::new(1), NodeIndex::new(2))));
        assert_eq!(node.split_gain(), Some((FeatureIndex::new(2), 3.2)));
        assert!(node.distribution().is_none());
    }

    #[test]
    fn indices_print_as_plain_numbers() {
        assert_eq!(FeatureIndex::new(3).to_string(), "3");
        assert!(NodeIndex::new(10) < NodeIndex::new(20));
        assert_eq!(Impurity::new(0.0).to_string(), "0.000000");
    }
}
