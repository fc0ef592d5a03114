//! Delimited table reader producing a training [`Dataset`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geval_rf::Dataset;
use tracing::{debug, info, instrument};

use crate::IoError;

/// How the label column is turned into classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
    /// Each distinct label string is a class; classes are numbered in sorted
    /// string order and the strings become class names.
    Categorical,
    /// The label is a non-negative integer class index.
    Scalar,
}

/// Reads a delimited table with a header row into a [`Dataset`].
///
/// Every column that is neither the label column nor a metadata column is a
/// numeric feature, in header order.
///
/// # Defaults
///
/// | Setting            | Default         |
/// |--------------------|-----------------|
/// | `delimiter`        | `b'\t'`         |
/// | `label_column`     | `"label"`       |
/// | `metadata_columns` | none            |
/// | `label_mode`       | `Categorical`   |
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed record |
/// | [`IoError::MissingColumn`] | Label or metadata column absent from the header |
/// | [`IoError::NoFeatureColumns`] | No column is left for features |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Feature or scalar label is NaN, Inf, or unparseable |
/// | [`IoError::Dataset`] | The dataset constructor rejects the labels |
#[derive(Debug, Clone)]
pub struct TableReader {
    path: PathBuf,
    delimiter: u8,
    label_column: String,
    metadata_columns: Vec<String>,
    label_mode: LabelMode,
}

/// Where each header column goes.
struct Layout {
    label: usize,
    metadata: Vec<usize>,
    features: Vec<usize>,
    feature_names: Vec<String>,
    width: usize,
}

impl TableReader {
    /// Create a new reader for the given table path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            delimiter: b'\t',
            label_column: "label".to_string(),
            metadata_columns: Vec::new(),
            label_mode: LabelMode::Categorical,
        }
    }

    /// Set the field delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the name of the label column.
    #[must_use]
    pub fn with_label_column(mut self, name: impl Into<String>) -> Self {
        self.label_column = name.into();
        self
    }

    /// Set the columns carried as per-row metadata instead of features.
    #[must_use]
    pub fn with_metadata_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_columns = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set how labels become classes.
    #[must_use]
    pub fn with_label_mode(mut self, label_mode: LabelMode) -> Self {
        self.label_mode = label_mode;
        self
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    fn layout(&self, header: &csv::StringRecord) -> Result<Layout, IoError> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| IoError::MissingColumn {
                    path: self.path.clone(),
                    column: name.to_string(),
                })
        };
        let label = find(self.label_column.as_str())?;
        let metadata = self
            .metadata_columns
            .iter()
            .map(|name| find(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let features: Vec<usize> = (0..header.len())
            .filter(|&c| c != label && !metadata.contains(&c))
            .collect();
        if features.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let feature_names = features.iter().map(|&c| header[c].to_string()).collect();

        Ok(Layout {
            label,
            metadata,
            features,
            feature_names,
            width: header.len(),
        })
    }

    fn parse_number(&self, raw: &str, row_index: usize, column: &str) -> Result<f64, IoError> {
        let non_finite = || IoError::NonFiniteValue {
            path: self.path.clone(),
            row_index,
            column: column.to_string(),
            raw: raw.to_string(),
        };
        let value: f64 = raw.trim().parse().map_err(|_| non_finite())?;
        if !value.is_finite() {
            return Err(non_finite());
        }
        Ok(value)
    }

    /// Read and validate the table, returning a [`Dataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so the InconsistentRowLength check fires instead of a
        // low-level parse error.
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        let layout = self.layout(&header)?;
        debug!(
            n_columns = layout.width,
            n_features = layout.features.len(),
            "read table header"
        );

        let mut features = Vec::new();
        let mut raw_labels = Vec::new();
        let mut metadata = Vec::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            if record.len() != layout.width {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: layout.width,
                    got: record.len(),
                });
            }

            let row = layout
                .features
                .iter()
                .map(|&c| self.parse_number(&record[c], row_index, &header[c]))
                .collect::<Result<Vec<f64>, _>>()?;
            features.push(row);
            raw_labels.push(record[layout.label].trim().to_string());
            metadata.push(
                layout
                    .metadata
                    .iter()
                    .map(|&c| record[c].to_string())
                    .collect::<Vec<_>>(),
            );
        }

        if features.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }
        let n_rows = features.len();

        let dataset = match self.label_mode {
            LabelMode::Categorical => {
                let mut class_index: BTreeMap<&str, usize> =
                    raw_labels.iter().map(|l| (l.as_str(), 0)).collect();
                for (i, index) in class_index.values_mut().enumerate() {
                    *index = i;
                }
                let classes: Vec<usize> = raw_labels
                    .iter()
                    .map(|l| class_index[l.as_str()])
                    .collect();
                let class_names: Vec<String> =
                    class_index.keys().map(|k| (*k).to_string()).collect();
                Dataset::from_classes(features, &classes, class_names.len())?
                    .with_class_names(class_names)?
            }
            LabelMode::Scalar => {
                let labels = raw_labels
                    .iter()
                    .enumerate()
                    .map(|(row_index, raw)| {
                        self.parse_number(raw, row_index, &self.label_column)
                            .map(|v| vec![v])
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Dataset::new(features, labels)?
            }
        };
        let dataset = dataset.with_feature_names(layout.feature_names)?;
        let dataset = if layout.metadata.is_empty() {
            dataset
        } else {
            dataset.with_metadata(metadata)?
        };

        info!(
            n_rows,
            n_features = dataset.n_features(),
            n_classes = dataset.n_classes(),
            "dataset loaded"
        );

        Ok(dataset)
    }
}
