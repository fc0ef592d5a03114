//! Model serialization and deserialization via bincode.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::error::RfError;
use crate::forest::RandomForest;
use crate::tree::DecisionTree;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

const TREE_KIND: &str = "tree";
const FOREST_KIND: &str = "forest";

/// Envelope prefix, decoded on its own before the payload.
#[derive(serde::Deserialize)]
struct EnvelopeHeader {
    format_version: u32,
    kind: String,
}

/// Versioned envelope as written. Encodes identically to header + payload.
#[derive(serde::Serialize)]
struct EnvelopeRef<'a, T> {
    format_version: u32,
    kind: &'a str,
    payload: &'a T,
}

/// Versioned envelope as read back.
#[derive(serde::Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    format_version: u32,
    #[allow(dead_code)]
    kind: String,
    payload: T,
}

fn encode<T: Serialize>(kind: &str, payload: &T) -> Result<Vec<u8>, RfError> {
    let envelope = EnvelopeRef {
        format_version: FORMAT_VERSION,
        kind,
        payload,
    };
    bincode::serialize(&envelope).map_err(|e| RfError::SerializeModel { source: e })
}

fn decode<T: DeserializeOwned>(kind: &str, bytes: &[u8]) -> Result<T, RfError> {
    let header: EnvelopeHeader =
        bincode::deserialize(bytes).map_err(|e| RfError::DeserializeModel { source: e })?;
    if header.format_version != FORMAT_VERSION || header.kind != kind {
        return Err(RfError::IncompatibleModelVersion {
            expected: FORMAT_VERSION,
            found: header.format_version,
            expected_kind: kind.to_string(),
            found_kind: header.kind,
        });
    }
    let envelope: Envelope<T> =
        bincode::deserialize(bytes).map_err(|e| RfError::DeserializeModel { source: e })?;
    Ok(envelope.payload)
}

impl DecisionTree {
    /// Encode the tree as a versioned bincode envelope.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::SerializeModel`] if bincode encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RfError> {
        encode(TREE_KIND, self)
    }

    /// Decode a tree written by [`DecisionTree::to_bytes`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::DeserializeModel`] | bincode decoding failed |
    /// | [`RfError::IncompatibleModelVersion`] | format version or kind mismatch |
    /// | [`RfError::CorruptModel`] | the decoded tree is structurally invalid |
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RfError> {
        let tree: DecisionTree = decode(TREE_KIND, bytes)?;
        tree.validate_structure()?;
        Ok(tree)
    }
}

impl RandomForest {
    /// Encode the forest as a versioned bincode envelope.
    ///
    /// Identical forests encode to identical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::SerializeModel`] if bincode encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RfError> {
        encode(FOREST_KIND, self)
    }

    /// Decode a forest written by [`RandomForest::to_bytes`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::DeserializeModel`] | bincode decoding failed |
    /// | [`RfError::IncompatibleModelVersion`] | format version or kind mismatch |
    /// | [`RfError::CorruptModel`] | a tree is invalid or disagrees with the forest's shape |
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RfError> {
        let forest: RandomForest = decode(FOREST_KIND, bytes)?;
        forest.validate_structure()?;
        Ok(forest)
    }

    /// Save the model to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::SerializeModel`] | bincode encoding failed |
    /// | [`RfError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RfError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        std::fs::write(path, &bytes).map_err(|e| RfError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_trees = self.trees.len(),
            "model saved"
        );

        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::ReadModel`] | file read failed |
    /// | [`RfError::DeserializeModel`] | bincode decoding failed |
    /// | [`RfError::IncompatibleModelVersion`] | format version or kind mismatch |
    /// | [`RfError::CorruptModel`] | the decoded forest is structurally invalid |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| RfError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        let forest = Self::from_bytes(&bytes)?;

        debug!(
            n_trees = forest.trees.len(),
            n_features = forest.n_features,
            n_classes = forest.n_classes,
            "model loaded"
        );

        Ok(forest)
    }

    fn validate_structure(&self) -> Result<(), RfError> {
        if self.trees.is_empty() {
            return Err(RfError::CorruptModel {
                reason: "forest has no trees".to_string(),
            });
        }
        if self.parms.n_trees != self.trees.len() {
            return Err(RfError::CorruptModel {
                reason: format!(
                    "{} trees stored for n_trees = {}",
                    self.trees.len(),
                    self.parms.n_trees
                ),
            });
        }
        if self.feature_names.len() != self.n_features {
            return Err(RfError::CorruptModel {
                reason: format!(
                    "{} feature names for {} features",
                    self.feature_names.len(),
                    self.n_features
                ),
            });
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.n_features != self.n_features || tree.n_classes != self.n_classes {
                return Err(RfError::CorruptModel {
                    reason: format!("tree {i} shape differs from the forest"),
                });
            }
            tree.validate_structure()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::{EnsembleMethod, ForestParms};
    use crate::dataset::Dataset;
    use crate::node::{Node, NodeIndex};
    use crate::selector::NormalSelector;

    fn dataset() -> Dataset {
        let features = vec![
            vec![1.0, 0.0, 4.0],
            vec![2.0, 1.0, 3.0],
            vec![3.0, 0.0, 2.0],
            vec![10.0, 1.0, 5.0],
            vec![11.0, 0.0, 1.0],
            vec![12.0, 1.0, 0.0],
        ];
        Dataset::from_classes(features, &[0, 0, 0, 1, 1, 1], 2).unwrap()
    }

    fn train_simple_model() -> RandomForest {
        let parms = ForestParms::new(5)
            .unwrap()
            .with_method(EnsembleMethod::Weighted)
            .with_seed(42);
        RandomForest::fit(&dataset(), &parms).unwrap()
    }

    #[test]
    fn round_trip_identical_predictions() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("test_model.bin");

        let forest = train_simple_model();
        forest.save(&model_path).unwrap();
        let loaded = RandomForest::load(&model_path).unwrap();

        let rows = vec![vec![1.5, 0.0, 2.0], vec![11.0, 1.0, 3.0], vec![5.0, 0.5, 9.0]];
        assert_eq!(forest.predict(&rows).unwrap(), loaded.predict(&rows).unwrap());
        assert_eq!(forest.compute_impact(), loaded.compute_impact());
        assert_eq!(forest.parms(), loaded.parms());
        assert_eq!(forest.to_bytes().unwrap(), loaded.to_bytes().unwrap());
    }

    #[test]
    fn tree_round_trip() {
        let ds = dataset();
        let parms = ForestParms::new(1).unwrap();
        let tree = DecisionTree::fit(&ds, &parms, &mut NormalSelector::new(3)).unwrap();
        let restored = DecisionTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
        assert_eq!(tree.nodes(), restored.nodes());
        assert_eq!(tree.compute_impact(), restored.compute_impact());

        let mut a = vec![vec![0.0; 2]; ds.n_rows()];
        let mut b = a.clone();
        tree.vote(ds.rows(), &mut a).unwrap();
        restored.vote(ds.rows(), &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn kind_mismatch_rejected() {
        let forest = train_simple_model();
        let err = DecisionTree::from_bytes(&forest.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            RfError::IncompatibleModelVersion { ref found_kind, .. } if found_kind == "forest"
        ));
    }

    #[test]
    fn version_mismatch_rejected() {
        let mut bytes = train_simple_model().to_bytes().unwrap();
        // format_version is the leading little-endian u32.
        bytes[0] = 99;
        let err = RandomForest::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            RfError::IncompatibleModelVersion { expected: 1, found: 99, .. }
        ));
    }

    #[test]
    fn corrupt_tree_rejected() {
        let mut forest = train_simple_model();
        let tree = &mut forest.trees[0];
        let last = tree.nodes.len();
        tree.nodes[0] = Node::Split {
            feature: crate::node::FeatureIndex::new(0),
            threshold: 1.0,
            left: NodeIndex::new(last + 5),
            right: NodeIndex::new(last + 6),
            impurity: tree.nodes[0].impurity(),
            n_samples: 6,
            impurity_decrease: 0.1,
        };
        let err = RandomForest::from_bytes(&forest.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, RfError::CorruptModel { .. }));
    }

    #[test]
    fn negative_split_gain_rejected() {
        let mut forest = train_simple_model();
        let tree = forest
            .trees
            .iter_mut()
            .find(|t| !t.nodes[0].is_leaf())
            .expect("some tree should split");
        if let Node::Split {
            impurity_decrease, ..
        } = &mut tree.nodes[0]
        {
            *impurity_decrease = -2.0;
        }
        let err = RandomForest::from_bytes(&forest.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, RfError::CorruptModel { ref reason } if reason.contains("impurity decrease")));
    }

    #[test]
    fn tree_count_must_match_parms() {
        let mut forest = train_simple_model();
        forest.trees.pop();
        let err = RandomForest::from_bytes(&forest.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, RfError::CorruptModel { ref reason } if reason.contains("n_trees")));
    }

    #[test]
    fn load_nonexistent_file_error() {
        let dir = TempDir::new().unwrap();
        let err = RandomForest::load(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, RfError::ReadModel { .. }));
    }

    #[test]
    fn load_corrupt_file_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"not a valid bincode file").unwrap();
        let err = RandomForest::load(&path).unwrap_err();
        assert!(matches!(err, RfError::DeserializeModel { .. }));
    }
}
