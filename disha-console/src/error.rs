//! Error types for DishaConsole

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`] values.
///
/// Front ends use this to decide how loudly to report a failure. None of the
/// kinds trigger a retry inside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The byte stream itself failed (open/read/write)
    Transport,
    /// The response did not arrive in time; partial data may be attached
    Timeout,
    /// The response arrived but could not be parsed
    Protocol,
    /// The caller asked for something the session cannot do right now
    Usage,
}

/// DishaConsole error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Read timed out before the terminator arrived
    #[error("Response timeout (partial: {partial:?})")]
    Timeout {
        /// Bytes received before the deadline, terminator absent
        partial: String,
    },

    /// Response could not be parsed into the expected shape
    #[error("Protocol error for '{command}': {reason} (response: {response:?})")]
    Protocol {
        /// Request line that produced the response
        command: String,
        /// Response text with the terminator stripped
        response: String,
        /// What was wrong with it
        reason: String,
    },

    /// Another exchange or calibration run is in progress
    #[error("Busy: {0}")]
    Busy(&'static str),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Intent text that does not name a known action
    #[error("Unknown intent: {0}")]
    UnknownIntent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Serial(_) | Error::Io(_) => ErrorKind::Transport,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Busy(_)
            | Error::InvalidParameter(_)
            | Error::UnknownIntent(_)
            | Error::Config(_) => ErrorKind::Usage,
        }
    }

    pub(crate) fn protocol(command: &str, response: &str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            command: command.to_string(),
            response: response.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
