//! Failure normalization.
//!
//! Stores and backends return [`UploadError`]; nothing past the contract
//! boundary ever sees it. [`guard`] runs a unit of work, logs whatever went
//! wrong and hands the caller a plain [`Failure`] value instead.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use tracing::{error, warn};

/// Every way a unit of publishing work can fail.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("cannot reach {endpoint}: {message}")]
    Connect { endpoint: String, message: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("HTTP {status} {code}: {message}")]
    Client {
        status: u16,
        code: String,
        message: String,
    },
    #[error("HTTP {status} {code}: {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },
    #[error("{}: {source}", path.display())]
    LocalFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("object of {size} bytes exceeds the {limit} byte single upload limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("'{0}' is reserved for the generated index")]
    ReservedName(String),
    #[error("project folder not created")]
    FolderNotCreated,
    #[error("not connected to the storage service")]
    NotConnected,
    #[error("failed to render template: {0}")]
    Template(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UploadError {
    pub fn local_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UploadError::LocalFile {
            path: path.into(),
            source,
        }
    }

    /// Error category name, as it appears in log lines.
    pub fn class(&self) -> &'static str {
        match self {
            UploadError::Connect { .. } => "ConnectError",
            UploadError::Timeout(_) => "TimeoutError",
            UploadError::Client { .. } => "ClientError",
            UploadError::Server { .. } => "ServerError",
            UploadError::LocalFile { .. } => "LocalFileError",
            UploadError::TooLarge { .. } => "EntityTooLarge",
            UploadError::ReservedName(_) => "ReservedName",
            UploadError::FolderNotCreated => "FolderNotCreated",
            UploadError::NotConnected => "NotConnected",
            UploadError::Template(_) => "TemplateError",
            UploadError::Other(_) => "Error",
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            UploadError::Connect { .. } | UploadError::Timeout(_) | UploadError::NotConnected => {
                FailureKind::Connectivity
            }
            UploadError::Client { .. }
            | UploadError::Server { .. }
            | UploadError::TooLarge { .. } => FailureKind::Remote,
            UploadError::LocalFile { .. } => FailureKind::LocalResource,
            UploadError::ReservedName(_)
            | UploadError::FolderNotCreated
            | UploadError::Template(_)
            | UploadError::Other(_) => FailureKind::Unclassified,
        }
    }
}

/// Coarse failure taxonomy shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The storage service could not be reached.
    Connectivity,
    /// The service rejected a write, delete or create.
    Remote,
    /// A local file was missing or unreadable.
    LocalResource,
    Unclassified,
}

/// What the caller of a contract operation gets back on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub operation: &'static str,
    pub kind: FailureKind,
    pub class: &'static str,
    pub message: String,
}

impl Failure {
    pub fn from_error(operation: &'static str, err: &UploadError) -> Self {
        let message = match err {
            // Keep the whole context chain, not just the outermost message.
            UploadError::Other(inner) => format!("{:#}", inner),
            other => other.to_string(),
        };
        Self {
            operation,
            kind: err.kind(),
            class: err.class(),
            message,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({}) {}", self.operation, self.class, self.message)
    }
}

impl std::error::Error for Failure {}

/// Outcome of a contract operation.
pub type Published = Result<(), Failure>;

/// Run one unit of publishing work. Any error is logged with the provider,
/// the operation name, the error class and its message, and comes back as a
/// [`Failure`].
pub async fn guard<T, F>(provider: &str, operation: &'static str, work: F) -> Result<T, Failure>
where
    F: Future<Output = Result<T, UploadError>>,
{
    match work.await {
        Ok(value) => Ok(value),
        Err(err) => {
            let failure = Failure::from_error(operation, &err);
            match failure.kind {
                FailureKind::Connectivity => warn!(
                    provider,
                    operation,
                    "{} {} error: ({}) {}",
                    provider,
                    operation,
                    failure.class,
                    failure.message
                ),
                FailureKind::LocalResource => error!(
                    provider,
                    operation,
                    "{} local file not readable in {}: ({}) {}",
                    provider,
                    operation,
                    failure.class,
                    failure.message
                ),
                FailureKind::Remote | FailureKind::Unclassified => error!(
                    provider,
                    operation,
                    "{} {} error: ({}) {}",
                    provider,
                    operation,
                    failure.class,
                    failure.message
                ),
            }
            Err(failure)
        }
    }
}
