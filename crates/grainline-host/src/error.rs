//! Errors raised by the execution host and the tag they carry across the
//! message boundary.

use std::fmt;

use grainline_pipeline::PipelineError;
use serde::{Deserialize, Serialize};

/// Errors that can occur while the host handles a request.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Decoding or processing failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The backend has no drawing context to read a handle through.
    #[error("drawing surface unavailable: {0}")]
    CanvasUnavailable(String),

    /// A process request carried neither pixels nor a handle.
    #[error("process request carried no image data")]
    NoImageData,

    /// The host failed outside normal error handling, or is gone.
    #[error("worker fault: {0}")]
    WorkerFault(String),
}

impl HostError {
    /// The boundary tag for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Pipeline(err) => ErrorKind::from_pipeline(err),
            Self::CanvasUnavailable(_) => ErrorKind::CanvasUnavailable,
            Self::NoImageData => ErrorKind::NoImageData,
            Self::WorkerFault(_) => ErrorKind::WorkerFault,
        }
    }
}

/// Error category carried by `ERROR` responses.
///
/// The typed source of a [`HostError`] does not survive a thread or
/// worker hop, so responses carry this tag plus the display message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`PipelineError::UnsupportedFormat`].
    UnsupportedFormat,
    /// See [`PipelineError::FileTooLarge`].
    FileTooLarge,
    /// See [`PipelineError::InvalidDimensions`].
    InvalidDimensions,
    /// See [`PipelineError::DecodeFailed`].
    DecodeFailed,
    /// See [`PipelineError::EmptyInput`].
    EmptyInput,
    /// See [`PipelineError::InvalidConfig`].
    InvalidConfig,
    /// See [`HostError::CanvasUnavailable`].
    CanvasUnavailable,
    /// See [`HostError::NoImageData`].
    NoImageData,
    /// See [`HostError::WorkerFault`].
    WorkerFault,
}

impl ErrorKind {
    const fn from_pipeline(err: &PipelineError) -> Self {
        match err {
            PipelineError::UnsupportedFormat(_) => Self::UnsupportedFormat,
            PipelineError::FileTooLarge { .. } => Self::FileTooLarge,
            PipelineError::InvalidDimensions { .. } => Self::InvalidDimensions,
            PipelineError::DecodeFailed(_) => Self::DecodeFailed,
            PipelineError::EmptyInput => Self::EmptyInput,
            PipelineError::InvalidConfig(_) => Self::InvalidConfig,
        }
    }

    /// Stable name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::FileTooLarge => "FileTooLarge",
            Self::InvalidDimensions => "InvalidDimensions",
            Self::DecodeFailed => "DecodeFailed",
            Self::EmptyInput => "EmptyInput",
            Self::InvalidConfig => "InvalidConfig",
            Self::CanvasUnavailable => "CanvasUnavailable",
            Self::NoImageData => "NoImageData",
            Self::WorkerFault => "WorkerFault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_keep_their_kind() {
        let err = HostError::from(PipelineError::FileTooLarge { size: 20, limit: 10 });
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
        assert_eq!(err.to_string(), "file is 20 bytes, larger than the 10 byte limit");
    }

    #[test]
    fn host_errors_have_their_own_kinds() {
        assert_eq!(HostError::NoImageData.kind(), ErrorKind::NoImageData);
        assert_eq!(
            HostError::CanvasUnavailable("no 2d context".into()).kind(),
            ErrorKind::CanvasUnavailable
        );
        assert_eq!(HostError::WorkerFault("boom".into()).kind(), ErrorKind::WorkerFault);
    }

    #[test]
    fn kind_serializes_as_its_wire_name() {
        for kind in [ErrorKind::DecodeFailed, ErrorKind::NoImageData, ErrorKind::WorkerFault] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let parsed: ErrorKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
