//! Forked write worker
//!
//! `open(O_WRONLY)` on a FIFO blocks until a reader shows up and cannot be
//! interrupted from another thread. The open+write+close session therefore
//! runs in a forked child that the parent can `SIGKILL` when the deadline
//! passes, so the stuck call really goes away instead of being abandoned.

use std::ffi::{CString, c_int};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::error::{PipeError, Result};

/// How often the parent checks on a worker that has a deadline
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// First descriptor the child closes; stdio stays open
const FIRST_INHERITED_FD: c_int = 3;

/// How a worker ended
#[derive(Debug)]
enum Outcome {
    /// The child exited or was signalled on its own
    Finished(WaitStatus),
    /// The deadline elapsed and the child was killed and reaped
    Killed,
}

/// A child process performing one write session on a FIFO
pub(crate) struct WriteWorker {
    pid: Pid,
    /// Set once `waitpid` has collected the child
    reaped: bool,
    path: PathBuf,
}

impl WriteWorker {
    /// Fork a child that opens `path` for writing, writes `data`, and closes
    ///
    /// Everything the child touches is allocated before `fork`; the child
    /// itself only makes async-signal-safe calls and leaves via `_exit`.
    pub(crate) fn spawn(path: &Path, data: &[u8]) -> Result<Self> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            PipeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "named pipe path contains a NUL byte",
            ))
        })?;

        // SAFETY: the child branch never returns into Rust code that could
        // allocate or take locks; it only calls libc and then `_exit`.
        match unsafe { fork() }? {
            ForkResult::Child => {
                let code = unsafe { run_session(&c_path, data) };
                unsafe { libc::_exit(code) }
            }
            ForkResult::Parent { child } => {
                tracing::debug!("Spawned write worker {} for {}", child, path.display());
                Ok(Self {
                    pid: child,
                    reaped: false,
                    path: path.to_path_buf(),
                })
            }
        }
    }

    /// Wait for the session to finish, killing the child once `timeout` elapses
    ///
    /// `None` waits indefinitely.
    pub(crate) fn wait(mut self, timeout: Option<Duration>) -> Result<()> {
        let pid = self.pid;

        // On error the child is still ours and `Drop` kills it
        let outcome = match timeout {
            None => Outcome::Finished(wait_blocking(pid)?),
            Some(limit) => wait_with_deadline(pid, limit)?,
        };
        self.reaped = true;

        match outcome {
            Outcome::Finished(status) => status_to_result(status),
            Outcome::Killed => {
                let timeout = timeout.unwrap_or_default();
                tracing::warn!(
                    "Write to {} timed out after {:?}, worker {} killed",
                    self.path.display(),
                    timeout,
                    pid
                );
                Err(PipeError::WriteTimedOut {
                    path: self.path.clone(),
                    timeout,
                })
            }
        }
    }
}

impl Drop for WriteWorker {
    fn drop(&mut self) {
        // Never leave a worker behind holding the pipe's write slot
        if !self.reaped {
            let _ = kill_and_reap(self.pid);
        }
    }
}

/// The child's whole job; returns the process exit code
///
/// 0 on success, otherwise the errno of the failing step.
unsafe fn run_session(path: &CString, data: &[u8]) -> c_int {
    close_inherited_fds();

    // Blocks until a reader opens the other end. O_TRUNC only matters when a
    // regular file sits at the path; it is ignored for FIFOs.
    let fd = libc::open(
        path.as_ptr(),
        libc::O_WRONLY | libc::O_TRUNC | libc::O_CLOEXEC,
    );
    if fd < 0 {
        return exit_code_for_errno();
    }

    let mut written = 0usize;
    while written < data.len() {
        let rest = &data[written..];
        let n = libc::write(fd, rest.as_ptr().cast(), rest.len());
        if n < 0 {
            if Errno::last_raw() == libc::EINTR {
                continue;
            }
            let code = exit_code_for_errno();
            libc::close(fd);
            return code;
        }
        written += n as usize;
    }

    if libc::close(fd) < 0 {
        return exit_code_for_errno();
    }
    0
}

/// Drop descriptors inherited from the parent
///
/// Otherwise the child could hold read ends of unrelated FIFOs open, which
/// would let other writers rendezvous with it.
unsafe fn close_inherited_fds() {
    #[cfg(target_os = "linux")]
    {
        let rc = libc::syscall(
            libc::SYS_close_range,
            FIRST_INHERITED_FD as libc::c_uint,
            libc::c_uint::MAX,
            0 as libc::c_uint,
        );
        if rc == 0 {
            return;
        }
    }

    let max = match libc::sysconf(libc::_SC_OPEN_MAX) {
        n if n > 0 => n.min(65_536) as c_int,
        _ => 1024,
    };
    for fd in FIRST_INHERITED_FD..max {
        libc::close(fd);
    }
}

fn exit_code_for_errno() -> c_int {
    match Errno::last_raw() {
        code @ 1..=255 => code,
        _ => libc::EIO,
    }
}

fn wait_blocking(pid: Pid) -> Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            other => return Ok(other?),
        }
    }
}

/// Poll the child until it exits or `limit` elapses
fn wait_with_deadline(pid: Pid, limit: Duration) -> Result<Outcome> {
    let start = Instant::now();
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => {}
            Ok(status) => return Ok(Outcome::Finished(status)),
            Err(e) => return Err(e.into()),
        }

        if start.elapsed() >= limit {
            let status = kill_and_reap(pid)?;
            return Ok(match status {
                WaitStatus::Signaled(_, Signal::SIGKILL, _) => Outcome::Killed,
                // The child got there first between the last poll and the kill
                other => Outcome::Finished(other),
            });
        }

        thread::sleep(POLL_INTERVAL.min(limit.saturating_sub(start.elapsed())));
    }
}

fn kill_and_reap(pid: Pid) -> Result<WaitStatus> {
    match signal::kill(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(e.into()),
    }
    wait_blocking(pid)
}

fn status_to_result(status: WaitStatus) -> Result<()> {
    match status {
        WaitStatus::Exited(_, 0) => Ok(()),
        WaitStatus::Exited(_, code) => Err(std::io::Error::from_raw_os_error(code).into()),
        WaitStatus::Signaled(_, Signal::SIGPIPE, _) => Err(PipeError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "reader closed the named pipe before the payload was written",
        ))),
        WaitStatus::Signaled(_, sig, _) => Err(PipeError::Io(std::io::Error::other(format!(
            "write worker terminated by {}",
            sig
        )))),
        other => Err(PipeError::Io(std::io::Error::other(format!(
            "unexpected write worker status: {:?}",
            other
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_to_result_success() {
        assert!(status_to_result(WaitStatus::Exited(Pid::from_raw(1), 0)).is_ok());
    }

    #[test]
    fn test_status_to_result_maps_errno() {
        let err = status_to_result(WaitStatus::Exited(Pid::from_raw(1), libc::ENOENT))
            .unwrap_err();
        match err {
            PipeError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_status_to_result_sigpipe_is_broken_pipe() {
        let err = status_to_result(WaitStatus::Signaled(
            Pid::from_raw(1),
            Signal::SIGPIPE,
            false,
        ))
        .unwrap_err();
        match err {
            PipeError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_worker_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");

        // No FIFO at all: open(O_WRONLY) fails with ENOENT instead of blocking
        let worker = WriteWorker::spawn(&path, b"data").unwrap();
        let err = worker.wait(Some(Duration::from_secs(5))).unwrap_err();
        match err {
            PipeError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_worker_writes_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "0123456789").unwrap();

        // Old content is replaced, not overwritten in place
        let worker = WriteWorker::spawn(&path, b"ab").unwrap();
        worker.wait(None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ab");
    }

    #[test]
    fn test_finished_worker_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "").unwrap();

        let worker = WriteWorker::spawn(&path, b"x").unwrap();
        let pid = worker.pid;
        worker.wait(Some(Duration::from_secs(5))).unwrap();

        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }

    #[test]
    fn test_dropped_worker_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        nix::unistd::mkfifo(path.as_path(), nix::sys::stat::Mode::S_IRWXU).unwrap();

        let worker = WriteWorker::spawn(&path, b"never read").unwrap();
        let pid = worker.pid;
        drop(worker);

        // Reaped by drop, so the pid is no longer our child
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }
}
