use std::os::fd::{AsFd, OwnedFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use crate::error::BatchError;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A monotonically-varying suffix for shared memory object names, unique enough within one
/// process's lifetime that two batches created back-to-back never collide.
pub(crate) fn unique_suffix() -> String {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{epoch}_{seq}")
}

/// A named `mmap`ed POSIX shared memory segment, unlinked on drop.
pub(crate) struct SharedBuffer {
    name: String,
    _fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
}

impl SharedBuffer {
    pub(crate) fn create(name: &str, len: usize) -> Result<Self, BatchError> {
        let fd = mman::shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o600),
        )
        .map_err(|e| BatchError::Create(name.to_string(), e))?;

        ftruncate(fd.as_fd(), len as i64).map_err(|e| BatchError::Truncate(len, e))?;

        let nonzero_len = std::num::NonZeroUsize::new(len).expect("len is checked non-zero by callers");
        // SAFETY: `fd` is a freshly sized shared memory object; the mapping is released by
        // `Drop` below.
        let addr = unsafe {
            mman::mmap(None, nonzero_len, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE, MapFlags::MAP_SHARED, &fd, 0)
        }
        .map_err(BatchError::Mmap)?;

        Ok(Self {
            name: name.to_string(),
            _fd: fd,
            ptr: addr.cast(),
            len,
        })
    }

    pub(crate) fn as_mut_slice(&self) -> &mut [u8] {
        // SAFETY: `ptr` is valid for `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn shm_path(&self) -> String {
        format!("/dev/shm{}", self.name)
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        let len = std::num::NonZeroUsize::new(self.len).unwrap_or(std::num::NonZeroUsize::MIN);
        // SAFETY: matches the `mmap` call in `create`.
        unsafe {
            let _ = mman::munmap(self.ptr.cast(), len.get());
        }
        let _ = mman::shm_unlink(self.name.as_str());
    }
}
