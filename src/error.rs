use crate::config::ConfigError;
use crate::credentials::CredentialsError;
use crate::metadata::MetadataError;
use crate::range::RangeError;
use thiserror::Error;

/// Main error type for a streaming run.
/// Every fatal condition ends the run and is reported once through this type.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid range format '{0}'")]
    InvalidRangeFormat(String),

    #[error("Range '{0}' has no end row")]
    UnboundedRange(String),

    #[error("Sheet '{title}' not found in spreadsheet '{source_id}'")]
    SheetNotFound { source_id: String, title: String },

    #[error("Failed to resolve sheet metadata: {0}")]
    MetadataResolution(#[source] MetadataError),

    #[error("{0:#}")]
    FetchFailure(#[source] anyhow::Error),

    #[error("Record rejected by sink: {0:#}")]
    SinkRejected(#[source] anyhow::Error),

    // Host configuration errors
    #[error("{0}")]
    ConfigError(#[from] ConfigError),

    #[error("{0}")]
    CredentialsError(#[from] CredentialsError),
}

/// Discriminant of [`StreamError`], for hosts that branch on the failure class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRangeFormat,
    UnboundedRange,
    SheetNotFound,
    MetadataResolution,
    FetchFailure,
    SinkRejected,
    Config,
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRangeFormat(_) => ErrorKind::InvalidRangeFormat,
            Self::UnboundedRange(_) => ErrorKind::UnboundedRange,
            Self::SheetNotFound { .. } => ErrorKind::SheetNotFound,
            Self::MetadataResolution(_) => ErrorKind::MetadataResolution,
            Self::FetchFailure(_) => ErrorKind::FetchFailure,
            Self::SinkRejected(_) => ErrorKind::SinkRejected,
            Self::ConfigError(_) | Self::CredentialsError(_) => ErrorKind::Config,
        }
    }
}

impl From<RangeError> for StreamError {
    fn from(error: RangeError) -> Self {
        match error {
            RangeError::FormatError(range) => Self::InvalidRangeFormat(range),
            RangeError::Unbounded(range) => Self::UnboundedRange(range),
        }
    }
}

impl From<MetadataError> for StreamError {
    fn from(error: MetadataError) -> Self {
        match error {
            MetadataError::SheetNotFound { source_id, title } => Self::SheetNotFound { source_id, title },
            error => Self::MetadataResolution(error),
        }
    }
}
