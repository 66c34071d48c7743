//! Error types for loading a GTFS feed.

use thiserror::Error;

/// Failure while reading the static tables of a feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// A table the analysis cannot run without is absent
    #[error("required table {0} is missing from the feed")]
    MissingTable(&'static str),

    /// A table exists but a row could not be decoded
    #[error("failed to read {table}: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    /// The archive itself could not be opened or walked
    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
