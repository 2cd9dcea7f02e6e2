/*!
Common error types for the Camera Link core.
*/

use thiserror::Error;

/// Common result type used throughout the core library
pub type Result<T> = std::result::Result<T, ClinkError>;

/// Error type for every fallible core operation.
///
/// The per-cycle functions themselves are total; these errors only arise
/// when building components, decoding byte streams, or loading settings.
#[derive(Error, Debug)]
pub enum ClinkError {
    /// I/O errors (stream files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A raw value does not fit in a 28-bit wire word
    #[error("Invalid wire word: {0:#010x} has bits above bit 27")]
    InvalidWord(u32),

    /// Malformed wire word byte stream
    #[error("Invalid word stream: {0}")]
    InvalidStream(String),

    /// Window text could not be parsed
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Out-of-range construction parameter (coordinate width, shift)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// ROI engine index outside the grabber
    #[error("No ROI engine at index {index} (grabber has {count})")]
    EngineIndex { index: usize, count: usize },

    /// Serializer vector without the link clock pattern on lane 0
    #[error("Clock lane pattern {0:07b} does not match the link clock")]
    ClockPattern(u8),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClinkError {
    /// Create a new invalid stream error
    pub fn invalid_stream(msg: impl Into<String>) -> Self {
        Self::InvalidStream(msg.into())
    }

    /// Create a new invalid window error
    pub fn invalid_window(msg: impl Into<String>) -> Self {
        Self::InvalidWindow(msg.into())
    }

    /// Create a new invalid parameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
