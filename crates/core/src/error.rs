use crate::files::format_file_size;

/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The supplied bytes could not be decoded as audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// The file failed the MIME check before any decode was attempted.
    #[error("unsupported file type `{mime}`")]
    UnsupportedFileType { mime: String },
    /// The file exceeds the configured maximum size.
    #[error("file is {size} bytes, limit is {limit} bytes")]
    OversizeFile { size: u64, limit: u64 },
    /// Frequency analysis was requested before the audio graph exists.
    #[error("frequency analysis is not available yet")]
    AnalysisUnavailable,
    /// Capabilities required for the whole session are missing.
    #[error("platform is missing required capabilities: {}", missing.join(", "))]
    BackendUnsupported { missing: Vec<String> },
    /// A loop region outside the track or shorter than the minimum length.
    #[error("invalid loop region [{start}, {end}]")]
    InvalidLoopRegion { start: f64, end: f64 },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Free-form error, mostly used for poisoned locks.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Text shown to the user in the dismissible error notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFileType { .. } => {
                "The selected file is not an audio file".to_string()
            }
            Self::OversizeFile { limit, .. } => format!(
                "The file is too large (please keep it under {})",
                format_file_size(*limit)
            ),
            Self::Decode(_) | Self::Fft(_) => {
                "Failed to process the audio file".to_string()
            }
            Self::BackendUnsupported { missing } => format!(
                "This environment is not supported. Required features: {}",
                missing.join(", ")
            ),
            Self::Config(_) => "Failed to initialise the application".to_string(),
            Self::Io(err) => format!("Failed to load the file: {err}"),
            Self::AnalysisUnavailable
            | Self::InvalidLoopRegion { .. }
            | Self::InvalidInput(_)
            | Self::Message(_) => self.to_string(),
        }
    }

    /// Only a missing platform capability ends the session.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::BackendUnsupported { .. })
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_errors_are_fatal() {
        let fatal = PlayerError::BackendUnsupported {
            missing: vec!["audio clock".to_string()],
        };
        assert!(!fatal.is_recoverable());
        assert!(fatal.user_message().contains("audio clock"));
        assert!(PlayerError::Decode("bad header".into()).is_recoverable());
    }

    #[test]
    fn oversize_notice_quotes_the_configured_limit() {
        let err = PlayerError::OversizeFile {
            size: 30 * 1024 * 1024,
            limit: 25 * 1024 * 1024,
        };
        assert_eq!(
            err.user_message(),
            "The file is too large (please keep it under 25 MB)"
        );
    }

    #[test]
    fn decode_errors_surface_a_processing_message() {
        let err = PlayerError::Decode("bad header".into());
        assert_eq!(err.user_message(), "Failed to process the audio file");
        assert!(err.to_string().contains("bad header"));
    }
}
