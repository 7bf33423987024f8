use std::path::PathBuf;

use thiserror::Error;

/// Inbound payload could not be parsed
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Failure while enumerating, writing or finalizing an archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("finalize failed: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("archive worker failed: {0}")]
    Worker(String),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single peer write failed; never aborts delivery to other peers
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("unknown peer {0}")]
    UnknownPeer(u64),
    #[error("peer {0} is not keeping up, frame dropped")]
    Busy(u64),
    #[error("peer {0} is closed")]
    Closed(u64),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
