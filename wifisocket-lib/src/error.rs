use std::array::TryFromSliceError;
use std::io;
use thiserror::Error;

/// The primary error type for the `wifisocket` library.
#[derive(Error, Debug)]
pub enum WsError {
    #[error("Timeout: no valid reply from the socket")]
    Timeout,

    #[error("Bad return data: reply failed frame validation")]
    BadReturnData,

    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid block size: {0} bytes is not a multiple of 16")]
    InvalidBlockSize(usize),

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<TryFromSliceError> for WsError {
    fn from(_: TryFromSliceError) -> Self {
        WsError::MalformedFrame("Failed to convert slice to array".to_string())
    }
}

pub type Result<T> = std::result::Result<T, WsError>;
