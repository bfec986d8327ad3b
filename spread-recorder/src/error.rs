use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::partition::PartitionKey;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to create directory {path} for partition {key}: {source}")]
    CreateDir {
        key: PartitionKey,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open file {path} for partition {key}: {source}")]
    OpenFile {
        key: PartitionKey,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write header for partition {key}: {source}")]
    WriteHeader {
        key: PartitionKey,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write record for partition {key}: {source}")]
    WriteRecord {
        key: PartitionKey,
        #[source]
        source: csv::Error,
    },
    #[error("failed to flush partition {key}: {source}")]
    Flush {
        key: PartitionKey,
        #[source]
        source: io::Error,
    },
}
