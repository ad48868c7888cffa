//! Error types for the SubWatch pipeline service.
//!
//! This module defines the `SubWatchError` enum covering the error conditions
//! that can occur during file watching, media probing, speech recognition,
//! translation, metadata resolution and general job execution.
//!
//! It also provides helper methods to construct errors and map them to
//! process exit codes.
use thiserror::Error;

/// Represents all possible errors in the SubWatch service.
///
/// Each variant carries enough context to classify the failure at the stage
/// boundary where it surfaces.
#[derive(Error, Debug)]
pub enum SubWatchError {
    /// I/O operation failed during file system access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error due to invalid or missing settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Subtitle parsing or structural error.
    #[error("Subtitle error [{format}]: {message}")]
    Subtitle {
        /// The subtitle format involved (e.g. "SRT")
        format: String,
        /// Detailed error message describing the issue
        message: String,
    },

    /// Speech recognition error, including vendor error envelopes.
    #[error("ASR error: {0}")]
    Asr(String),

    /// Translation pipeline error.
    #[error("Translation error: {0}")]
    Translation(String),

    /// Chat-completion service error.
    #[error("Chat service error: {0}")]
    ChatService(String),

    /// Object storage error (upload, URL signing, delete).
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Metadata provider or merge error.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Media tool (ffmpeg/ffprobe) invocation error.
    #[error("Media tool error: {message}")]
    MediaTool {
        /// Description of the subprocess failure
        message: String,
    },

    /// The specified path does not exist on the filesystem.
    #[error("Path not found: {0}")]
    PathNotFound(std::path::PathBuf),

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

// Convert reqwest errors to the service that initiated the call via helpers;
// the blanket conversion lands on the chat service, the most common caller.
impl From<reqwest::Error> for SubWatchError {
    fn from(err: reqwest::Error) -> Self {
        SubWatchError::ChatService(err.to_string())
    }
}

impl From<serde_json::Error> for SubWatchError {
    fn from(err: serde_json::Error) -> Self {
        SubWatchError::Config {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}

impl From<walkdir::Error> for SubWatchError {
    fn from(err: walkdir::Error) -> Self {
        SubWatchError::Io(std::io::Error::other(err.to_string()))
    }
}

impl From<rusqlite::Error> for SubWatchError {
    fn from(err: rusqlite::Error) -> Self {
        SubWatchError::Translation(format!("cache backend: {}", err))
    }
}

impl From<config::ConfigError> for SubWatchError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => SubWatchError::Config {
                message: format!("Configuration file not found: {}", path),
            },
            config::ConfigError::Message(msg) => SubWatchError::Config { message: msg },
            _ => SubWatchError::Config {
                message: format!("Configuration error: {}", err),
            },
        }
    }
}

impl From<hound::Error> for SubWatchError {
    fn from(err: hound::Error) -> Self {
        SubWatchError::MediaTool {
            message: format!("WAV processing: {}", err),
        }
    }
}

/// Specialized `Result` type for SubWatch operations.
pub type SubWatchResult<T> = Result<T, SubWatchError>;

impl SubWatchError {
    /// Create a configuration error with the given message.
    pub fn config<S: Into<String>>(message: S) -> Self {
        SubWatchError::Config {
            message: message.into(),
        }
    }

    /// Create a subtitle error for the given format and message.
    pub fn subtitle<S1, S2>(format: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        SubWatchError::Subtitle {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create a speech recognition error with the given message.
    pub fn asr<S: Into<String>>(message: S) -> Self {
        SubWatchError::Asr(message.into())
    }

    /// Create a translation error with the given message.
    pub fn translation<S: Into<String>>(message: S) -> Self {
        SubWatchError::Translation(message.into())
    }

    /// Create a chat-service error with the given message.
    pub fn chat_service<S: Into<String>>(message: S) -> Self {
        SubWatchError::ChatService(message.into())
    }

    /// Create an object-store error with the given message.
    pub fn object_store<S: Into<String>>(message: S) -> Self {
        SubWatchError::ObjectStore(message.into())
    }

    /// Create a metadata error with the given message.
    pub fn metadata<S: Into<String>>(message: S) -> Self {
        SubWatchError::Metadata(message.into())
    }

    /// Create a media tool error with the given message.
    pub fn media_tool<S: Into<String>>(message: S) -> Self {
        SubWatchError::MediaTool {
            message: message.into(),
        }
    }

    /// Return the corresponding exit code for this error variant.
    pub fn exit_code(&self) -> i32 {
        match self {
            SubWatchError::Io(_) => 1,
            SubWatchError::Config { .. } => 2,
            SubWatchError::ChatService(_) => 3,
            SubWatchError::Subtitle { .. } => 4,
            SubWatchError::Asr(_) => 5,
            SubWatchError::Translation(_) => 6,
            SubWatchError::MediaTool { .. } => 7,
            SubWatchError::ObjectStore(_) => 8,
            SubWatchError::Metadata(_) => 9,
            _ => 1,
        }
    }

    /// Return a user-friendly error message with suggested remedies.
    pub fn user_friendly_message(&self) -> String {
        match self {
            SubWatchError::Config { message } => format!(
                "Configuration error: {}\nHint: check the config file and SUBWATCH_* environment variables",
                message
            ),
            SubWatchError::Asr(msg) => format!(
                "ASR error: {}\nHint: check network connection and ASR API key settings",
                msg
            ),
            SubWatchError::ChatService(msg) => format!(
                "Chat service error: {}\nHint: check network connection and LLM API key settings",
                msg
            ),
            SubWatchError::Subtitle { message, .. } => format!(
                "Subtitle processing error: {}\nHint: check file format and encoding",
                message
            ),
            SubWatchError::MediaTool { message } => format!(
                "Media tool error: {}\nHint: ensure ffmpeg and ffprobe are installed and the media file is intact",
                message
            ),
            _ => format!("Error: {}", self),
        }
    }
}

// Unit test: SubWatchError error types and helper methods
#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_creation() {
        let error = SubWatchError::config("test config error");
        assert!(matches!(error, SubWatchError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_subtitle_error_creation() {
        let error = SubWatchError::subtitle("SRT", "invalid timestamp");
        assert!(matches!(error, SubWatchError::Subtitle { .. }));
        let msg = error.to_string();
        assert!(msg.contains("SRT"));
        assert!(msg.contains("invalid timestamp"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: SubWatchError = io_error.into();
        assert!(matches!(err, SubWatchError::Io(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SubWatchError::config("x").exit_code(), 2);
        assert_eq!(SubWatchError::subtitle("SRT", "x").exit_code(), 4);
        assert_eq!(SubWatchError::asr("x").exit_code(), 5);
        assert_eq!(SubWatchError::translation("x").exit_code(), 6);
    }

    #[test]
    fn test_user_friendly_messages() {
        let config_error = SubWatchError::config("missing key");
        let message = config_error.user_friendly_message();
        assert!(message.contains("Configuration error:"));
        assert!(message.contains("SUBWATCH_"));

        let asr_error = SubWatchError::asr("network failure");
        let message = asr_error.user_friendly_message();
        assert!(message.contains("ASR error:"));
        assert!(message.contains("check network connection"));
    }
}
