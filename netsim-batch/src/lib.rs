//! Accumulates the many small shell commands a router's setup needs into a single script and
//! executes it once via `bash`, instead of paying a `fork`+`exec` per command.
//!
//! The script lives in POSIX shared memory (`/dev/shm`) rather than a regular temp file so
//! that a privilege-dropped child can still read it after the parent has moved on.

mod error;
mod shm;

pub use error::BatchError;

use std::ffi::CString;
use std::os::fd::AsRawFd;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, dup2_stderr, execv, fork, ForkResult};
use shm::SharedBuffer;
use tracing::{debug, trace};

const DEFAULT_CAPACITY: usize = 1024 * 1024;
const SHEBANG: &[u8] = b"#!/bin/bash\nset -e\n";

/// A script of `ip netns exec <ns> <command>` lines, staged in shared memory for one
/// `BatchScript::execute` call.
pub struct BatchScript {
    buffer: SharedBuffer,
    len: usize,
    capacity: usize,
}

impl BatchScript {
    /// Creates a new batch with `capacity` bytes of script buffer (1 MiB if `None`).
    pub fn new(capacity: Option<usize>) -> Result<Self, BatchError> {
        let capacity = capacity.unwrap_or(DEFAULT_CAPACITY);
        let name = format!("/tsim_batch_{}_{}", std::process::id(), shm::unique_suffix());
        let buffer = SharedBuffer::create(&name, capacity)?;

        buffer.as_mut_slice()[..SHEBANG.len()].copy_from_slice(SHEBANG);

        Ok(Self {
            buffer,
            len: SHEBANG.len(),
            capacity,
        })
    }

    /// Appends `ip netns exec <namespace> <command>`, or the bare command if `namespace` is
    /// `None` (used for the hidden-mesh commands that run in the root namespace).
    pub fn add(&mut self, namespace: Option<&str>, command: &str) -> Result<(), BatchError> {
        let line = match namespace {
            Some(ns) => format!("ip netns exec {ns} {command}\n"),
            None => format!("{command}\n"),
        };

        if self.len + line.len() > self.capacity {
            return Err(BatchError::BufferFull {
                capacity: self.capacity,
            });
        }

        let slice = self.buffer.as_mut_slice();
        slice[self.len..self.len + line.len()].copy_from_slice(line.as_bytes());
        self.len += line.len();
        trace!(namespace, command, "queued batch command");

        Ok(())
    }

    /// Number of commands-worth of bytes currently queued, including the shebang header.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len <= SHEBANG.len()
    }

    /// Executes the accumulated script with `bash`, by forking so the call can be interrupted
    /// mid-run. Returns the child's exit code, or `None` if it was killed by a signal.
    ///
    /// When `verbose` is `false`, the child's stderr is redirected to `/dev/null` — matching
    /// the original tool's default of hiding `ip`/`iptables` diagnostic noise.
    pub fn execute(&self, verbose: bool) -> Result<Option<i32>, BatchError> {
        let script_path = self.buffer.shm_path();
        debug!(path = %script_path, bytes = self.len, "executing batch script");

        // SAFETY: `fork` is safe here because the child immediately either `execv`s or
        // `_exit`s without touching any state shared with the parent beyond the fds closed
        // below.
        match unsafe { fork() }.map_err(BatchError::Fork)? {
            ForkResult::Child => {
                if !verbose {
                    if let Ok(devnull) = nix::fcntl::open(
                        "/dev/null",
                        nix::fcntl::OFlag::O_WRONLY,
                        nix::sys::stat::Mode::empty(),
                    ) {
                        let _ = dup2_stderr(&devnull);
                        let _ = close(devnull.as_raw_fd());
                    }
                }

                let bash = CString::new("/bin/bash").expect("no interior NUL");
                let path = CString::new(script_path.clone()).expect("no interior NUL");
                let _ = execv(&bash, &[bash.clone(), path]);
                std::process::exit(127);
            }
            ForkResult::Parent { child } => match waitpid(child, None).map_err(BatchError::Wait)? {
                WaitStatus::Exited(_, code) => Ok(Some(code)),
                _ => Ok(None),
            },
        }
    }
}

/// Stages an opaque blob (an `iptables-save`/`ipset save` dump) in shared memory and returns
/// its `/dev/shm/...` path, for use in a restore command queued onto a [`BatchScript`].
pub struct ShmBlob {
    buffer: SharedBuffer,
}

impl ShmBlob {
    /// `name_hint` is normally `<kind>_<namespace>` (e.g. `ipset_routerA`), giving a final
    /// shared-memory name of `/tsim_ipset_routerA_<suffix>`.
    pub fn write(name_hint: &str, content: &[u8]) -> Result<Self, BatchError> {
        let name = format!("/tsim_{name_hint}_{}", shm::unique_suffix());
        let buffer = SharedBuffer::create(&name, content.len().max(1))?;
        buffer.as_mut_slice()[..content.len()].copy_from_slice(content);
        Ok(Self { buffer })
    }

    pub fn path(&self) -> String {
        self.buffer.shm_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_accumulates_and_runs_true() {
        let mut batch = BatchScript::new(Some(4096)).unwrap();
        batch.add(None, "true").unwrap();
        assert!(batch.len() > SHEBANG.len());

        let status = batch.execute(true).unwrap();
        assert_eq!(status, Some(0));
    }

    #[test]
    fn batch_reports_nonzero_exit() {
        let mut batch = BatchScript::new(None).unwrap();
        batch.add(None, "exit 7").unwrap();
        let status = batch.execute(true).unwrap();
        assert_eq!(status, Some(7));
    }

    #[test]
    fn overflowing_capacity_is_rejected() {
        let mut batch = BatchScript::new(Some(32)).unwrap();
        let err = batch.add(None, "echo this line does not fit in thirty two bytes");
        assert!(matches!(err, Err(BatchError::BufferFull { .. })));
    }

    #[test]
    fn blob_round_trips_through_cat() {
        let blob = ShmBlob::write("test", b"hello world\n").unwrap();
        let mut batch = BatchScript::new(None).unwrap();
        batch.add(None, &format!("cat {} > /dev/null", blob.path())).unwrap();
        let status = batch.execute(true).unwrap();
        assert_eq!(status, Some(0));
    }
}
