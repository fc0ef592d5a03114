//! Feature-ranking tables: `feature<TAB>score[<TAB>rank]` with a header row.

use std::path::{Path, PathBuf};

use geval_rf::{FeatureRanking, RankedFeature};
use tracing::{debug, info, instrument, warn};

use crate::IoError;

/// Reads a ranking table into a [`FeatureRanking`] aligned to a feature list.
///
/// The first column names a feature, the second holds its non-negative
/// score; further columns are ignored. Names not in the feature list are
/// skipped with a warning and features absent from the table score 0.
#[derive(Debug, Clone)]
pub struct RankingReader {
    path: PathBuf,
    delimiter: u8,
}

impl RankingReader {
    /// Create a reader for the given tab-delimited table.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            delimiter: b'\t',
        }
    }

    /// Set the field delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read the table, scoring each of `feature_names` by position.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
    /// | [`IoError::CsvParse`] | Malformed record |
    /// | [`IoError::InconsistentRowLength`] | Row has fewer than two columns |
    /// | [`IoError::NonFiniteValue`] | Score is NaN, Inf, or unparseable |
    /// | [`IoError::Dataset`] | A score is negative |
    #[instrument(skip_all, fields(path = %self.path.display(), n_features = feature_names.len()))]
    pub fn read(&self, feature_names: &[String]) -> Result<FeatureRanking, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let mut scores = vec![0.0f64; feature_names.len()];
        let mut n_matched = 0usize;

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;
            if record.len() < 2 {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: 2,
                    got: record.len(),
                });
            }

            let name = record[0].trim();
            let raw = record[1].trim();
            let score: f64 = raw
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| IoError::NonFiniteValue {
                    path: self.path.clone(),
                    row_index,
                    column: "score".to_string(),
                    raw: raw.to_string(),
                })?;

            match feature_names.iter().position(|f| f == name) {
                Some(index) => {
                    scores[index] = score;
                    n_matched += 1;
                }
                None => warn!(feature = name, row_index, "ranked feature not in dataset; skipped"),
            }
        }

        debug!(n_matched, "ranking table read");
        Ok(FeatureRanking::from_scores(scores)?)
    }
}

/// Write ranked features as `feature<TAB>score<TAB>rank`, in the given order.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::WriteFile`] | The file cannot be created or flushed |
/// | [`IoError::WriteRecord`] | A record cannot be written |
#[instrument(skip_all, fields(path = %path.as_ref().display(), n_features = ranked.len()))]
pub fn write_ranking(path: impl AsRef<Path>, ranked: &[RankedFeature]) -> Result<(), IoError> {
    let path = path.as_ref();
    let record_error = |e: csv::Error| IoError::WriteRecord {
        path: path.to_path_buf(),
        source: e,
    };

    let file = std::fs::File::create(path).map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(file);

    wtr.write_record(["feature", "score", "rank"])
        .map_err(record_error)?;
    for feature in ranked {
        let score = feature.importance.to_string();
        let rank = feature.rank.to_string();
        wtr.write_record([feature.name.as_str(), score.as_str(), rank.as_str()])
            .map_err(record_error)?;
    }
    wtr.flush().map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    info!(path = %path.display(), "ranking written");
    Ok(())
}
