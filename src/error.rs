use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The container could not be opened or lacks its main content part.
    #[error("cannot read package: {0}")]
    PackageRead(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The main content part exists but is not usable XML.
    #[error("malformed XML in {0}")]
    XmlParse(String),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("{0} documents are not yet supported")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker error: {0}")]
    Worker(String),

    /// A conversion that failed on a worker thread, keeping its original kind.
    #[error("task {task_id} failed: {message}")]
    Offloaded {
        task_id: uuid::Uuid,
        kind: ErrorKind,
        message: String,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PackageRead(_) | Error::Zip(_) | Error::Io(_) => ErrorKind::PackageRead,
            Error::XmlParse(_) | Error::Xml(_) => ErrorKind::XmlParse,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Json(_) => ErrorKind::Serialization,
            Error::Config(_) => ErrorKind::Config,
            Error::Worker(_) => ErrorKind::Worker,
            Error::Offloaded { kind, .. } => *kind,
        }
    }
}

/// Serializable error summary carried back across the worker boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    PackageRead,
    XmlParse,
    UnsupportedFormat,
    Serialization,
    Config,
    Worker,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::PackageRead => "PackageReadError",
            ErrorKind::XmlParse => "XmlParseError",
            ErrorKind::UnsupportedFormat => "UnsupportedFormatError",
            ErrorKind::Serialization => "SerializationError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Worker => "WorkerError",
        };
        f.write_str(name)
    }
}
