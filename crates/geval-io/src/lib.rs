//! Table loading and feature-ranking files for the geval engine.

mod error;
mod ranking;
mod table_reader;

pub use error::IoError;
pub use ranking::{RankingReader, write_ranking};
pub use table_reader::{LabelMode, TableReader};
