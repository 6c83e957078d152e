//! Error type for named pipe channel operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::fifo::Direction;

/// Error type for `PipeChannel` operations
#[derive(Debug, Error)]
pub enum PipeError {
    /// The direction text was not one of the accepted modes
    #[error("unknown mode: {value:?} (expected \"r\" or \"w\")")]
    InvalidDirection { value: String },

    /// `mkfifo` failed for a reason other than the node already existing
    #[error("failed to create named pipe {}: {source}", .path.display())]
    PipeCreationFailed {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    /// A read was attempted on a write channel, or vice versa
    #[error("attempted to {} a {actual}-only named pipe", .expected.operation())]
    WrongDirection {
        expected: Direction,
        actual: Direction,
    },

    /// The OS failed during open/read/write/close, or while managing the write worker
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reader completed the session before the deadline; the worker was killed
    #[error("write to {} timed out after {timeout:?}", .path.display())]
    WriteTimedOut { path: PathBuf, timeout: Duration },
}

impl PipeError {
    /// Whether this error is the write deadline elapsing
    pub fn is_timeout(&self) -> bool {
        matches!(self, PipeError::WriteTimedOut { .. })
    }
}

impl From<nix::Error> for PipeError {
    fn from(err: nix::Error) -> Self {
        PipeError::Io(err.into())
    }
}

/// Result type alias using PipeError
pub type Result<T> = std::result::Result<T, PipeError>;
