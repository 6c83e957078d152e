//! One end of a named pipe, fixed to a single direction
//!
//! The FIFO node on disk is shared by every process that knows the path, so
//! a `PipeChannel` only records the path and its direction. Each `read` or
//! `write` call opens its own session and closes it before returning.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use super::direction::Direction;
use super::worker::WriteWorker;
use crate::error::{PipeError, Result};

/// Permission bits used when creating the node (before umask)
pub const DEFAULT_PERMISSIONS: u32 = 0o666;

/// Convert a signed timeout in seconds to an optional deadline
///
/// Negative (or NaN) means wait forever.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        None
    } else {
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }
}

/// Handle on a named pipe path with a fixed direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeChannel {
    path: PathBuf,
    direction: Direction,
}

impl PipeChannel {
    /// Ensure a FIFO exists at `path` and bind it to `direction`
    ///
    /// An existing node at `path` is reused as-is.
    pub fn new(path: impl AsRef<Path>, direction: Direction) -> Result<Self> {
        Self::with_permissions(path, direction, DEFAULT_PERMISSIONS)
    }

    /// Like [`PipeChannel::new`], with the direction given as text (`"r"` or `"w"`)
    ///
    /// The mode is validated before anything is created on disk.
    pub fn with_mode(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let direction: Direction = mode.parse()?;
        Self::new(path, direction)
    }

    /// Like [`PipeChannel::new`], creating the node with explicit permission bits
    pub fn with_permissions(
        path: impl AsRef<Path>,
        direction: Direction,
        permissions: u32,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mode = Mode::from_bits_truncate(permissions as libc::mode_t);

        match mkfifo(path.as_path(), mode) {
            Ok(()) => tracing::debug!("Created named pipe {}", path.display()),
            // Cooperating processes race to create the same node
            Err(Errno::EEXIST) => tracing::debug!("Reusing named pipe {}", path.display()),
            Err(source) => return Err(PipeError::PipeCreationFailed { path, source }),
        }

        Ok(Self { path, direction })
    }

    /// Path of the FIFO node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Direction fixed at construction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Read one whole payload as text
    ///
    /// Blocks until a writer opens the pipe, then until every writer has
    /// closed it. Never times out.
    pub fn read(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| {
            PipeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Read one whole payload as raw bytes
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        self.ensure_direction(Direction::Read)?;

        // open blocks until a writer also opens
        let mut fifo = File::open(&self.path)?;
        let mut buf = Vec::new();
        // read_to_end blocks until the writer closes
        fifo.read_to_end(&mut buf)?;

        tracing::debug!("Read {} bytes from {}", buf.len(), self.path.display());
        Ok(buf)
    }

    /// Deliver `data` to one reader session
    ///
    /// Blocks until a reader opens the pipe and the payload is written and
    /// closed. With `Some(timeout)` the whole session, including waiting for
    /// the reader, is bounded: on expiry the blocked attempt is killed and
    /// [`PipeError::WriteTimedOut`] is returned. `None` waits forever.
    ///
    /// Success means the write and close completed, not that the reader has
    /// finished consuming the data.
    pub fn write(&self, data: &str, timeout: Option<Duration>) -> Result<()> {
        self.write_bytes(data.as_bytes(), timeout)
    }

    /// Raw-bytes variant of [`PipeChannel::write`]
    pub fn write_bytes(&self, data: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.ensure_direction(Direction::Write)?;

        let worker = WriteWorker::spawn(&self.path, data)?;
        worker.wait(timeout)?;

        tracing::debug!("Wrote {} bytes to {}", data.len(), self.path.display());
        Ok(())
    }

    fn ensure_direction(&self, expected: Direction) -> Result<()> {
        if self.direction != expected {
            return Err(PipeError::WrongDirection {
                expected,
                actual: self.direction,
            });
        }
        Ok(())
    }
}
