//! Error types shared by the capture and recording paths

use std::fmt;

use thiserror::Error;

/// Logical media source a permission or acquisition error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Screen / tab / window video
    Display,
    /// Microphone input
    Microphone,
    /// System or display audio
    SystemAudio,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Display => "display",
            SourceKind::Microphone => "microphone",
            SourceKind::SystemAudio => "system audio",
        };
        f.write_str(name)
    }
}

/// Main error type for capture and recording operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The user refused a capture / microphone / audio prompt
    #[error("Permission denied for {source_kind}: {reason}")]
    PermissionDenied {
        /// Which source was refused
        source_kind: SourceKind,
        /// Platform-provided reason
        reason: String,
    },

    /// No usable source remained after acquisition
    #[error("No audio source available")]
    NoSourceAvailable,

    /// A second capture or recording was requested while one is running
    #[error("{operation} already in progress")]
    OperationInProgress {
        /// The busy operation ("capture", "recording")
        operation: &'static str,
    },

    /// The audio mixer could not combine the sources
    #[error("Audio mixing failed: {reason}")]
    MixingFailure {
        /// Failure reason
        reason: String,
    },

    /// Image encoding, duration repair or PCM packaging failed
    #[error("Encoding failed: {format} - {reason}")]
    EncodingFailure {
        /// Target format
        format: String,
        /// Failure reason
        reason: String,
    },

    /// Stop/pause/resume without an active session
    #[error("No recording in progress")]
    NoRecordingInProgress,

    /// The operation was cancelled by the user or the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// The external page rasterizer failed
    #[error("Rasterization failed: {reason}")]
    Rasterize {
        /// Failure reason
        reason: String,
    },

    /// A platform capture/encode primitive failed
    #[error("Platform error: {reason}")]
    Platform {
        /// Failure reason
        reason: String,
    },

    /// Requested feature is not supported by this engine
    #[error("Unsupported: {what}")]
    Unsupported {
        /// What was requested
        what: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Preference store read/write failed
    #[error("Preference store error: {message}")]
    Preferences {
        /// Error message
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn permission_denied(source_kind: SourceKind, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            source_kind,
            reason: reason.into(),
        }
    }

    pub fn in_progress(operation: &'static str) -> Self {
        Self::OperationInProgress { operation }
    }

    pub fn mixing(reason: impl Into<String>) -> Self {
        Self::MixingFailure {
            reason: reason.into(),
        }
    }

    pub fn encoding(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EncodingFailure {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub fn platform(reason: impl Into<String>) -> Self {
        Self::Platform {
            reason: reason.into(),
        }
    }

    pub fn rasterize(reason: impl Into<String>) -> Self {
        Self::Rasterize {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the caller's promise should be rejected with this error.
    ///
    /// Everything else is absorbed internally with a best-effort fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied { .. }
                | CaptureError::NoSourceAvailable
                | CaptureError::OperationInProgress { .. }
                | CaptureError::Cancelled
                | CaptureError::Unsupported { .. }
                | CaptureError::InvalidConfig { .. }
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CaptureError>;
