//! Error types for the heart rate monitor
//! Every failure the core can report is a value of one of these types; nothing
//! crosses the adapter boundary as a panic.

use serde::Serialize;
use thiserror::Error;

/// Failure conditions surfaced to the event sink
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[error("Scan timed out before a heart rate peripheral was found")]
    ScanTimeout,

    #[error("Connection attempt timed out")]
    ConnectTimeout,

    #[error("Heart Rate service not found on peripheral")]
    ServiceNotFound,

    #[error("Heart Rate Measurement characteristic not found")]
    CharacteristicNotFound,

    #[error("Malformed heart rate measurement frame")]
    MalformedFrame,

    #[error("Peripheral disconnected")]
    AdapterDisconnected,
}

/// Reasons a Heart Rate Measurement payload could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Empty payload")]
    Empty,

    #[error("Payload too short: flags 0x{flags:02X} require {required} bytes, got {actual}")]
    Truncated {
        flags: u8,
        required: usize,
        actual: usize,
    },

    #[error("RR-interval section has {0} trailing bytes, expected an even count")]
    UnalignedRrIntervals(usize),
}

impl FrameError {
    /// The error kind reported to the event sink for this failure
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedFrame
    }
}

impl From<FrameError> for ErrorKind {
    fn from(err: FrameError) -> Self {
        err.kind()
    }
}
