//! Namespace lifecycle, reimplementing what `ip netns add`/`del` do under the hood: a bind
//! mount of a fresh `/proc/self/ns/net` onto a file under `/var/run/netns/`, which pins the
//! namespace alive independently of any process living inside it.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{setns, unshare, CloneFlags};
use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult};

use crate::error::TopologyError;

const NETNS_DIR: &str = "/var/run/netns";

pub fn netns_path(name: &str) -> PathBuf {
    Path::new(NETNS_DIR).join(name)
}

pub fn namespace_exists(name: &str) -> bool {
    netns_path(name).exists()
}

/// Creates namespace `name` if it doesn't already exist. Idempotent: an existing namespace
/// (including one from a previous, interrupted run) is left alone.
pub fn create_namespace(name: &str) -> Result<(), TopologyError> {
    if namespace_exists(name) {
        return Ok(());
    }

    fs::create_dir_all(NETNS_DIR)
        .map_err(|e| TopologyError::NamespaceCreate(name.to_string(), nix::Error::from_raw(e.raw_os_error().unwrap_or(libc::EIO))))?;

    let path = netns_path(name);
    File::create(&path).map_err(|e| {
        TopologyError::NamespaceCreate(name.to_string(), nix::Error::from_raw(e.raw_os_error().unwrap_or(libc::EIO)))
    })?;

    // A bind mount of a freshly-unshared /proc/self/ns/net keeps the namespace alive after
    // the child that created it exits; do the unshare in a throwaway child so our own process
    // never leaves the root network namespace.
    // SAFETY: the child only calls async-signal-safe syscalls before `_exit`.
    match unsafe { fork() }.map_err(|e| TopologyError::NamespaceCreate(name.to_string(), e))? {
        ForkResult::Child => {
            let result = unshare(CloneFlags::CLONE_NEWNET).and_then(|()| {
                mount(
                    Some("/proc/self/ns/net"),
                    &path,
                    None::<&str>,
                    MsFlags::MS_BIND,
                    None::<&str>,
                )
            });
            std::process::exit(if result.is_ok() { 0 } else { 1 });
        }
        ForkResult::Parent { child } => {
            let status = waitpid(child, None).map_err(|e| TopologyError::NamespaceCreate(name.to_string(), e))?;
            if !matches!(status, nix::sys::wait::WaitStatus::Exited(_, 0)) {
                let _ = fs::remove_file(&path);
                return Err(TopologyError::NamespaceCreate(name.to_string(), nix::Error::EIO));
            }
        }
    }

    Ok(())
}

/// Unmounts and removes the namespace's pin file, releasing the namespace once its last
/// process (if any) exits.
pub fn delete_namespace(name: &str) {
    let path = netns_path(name);
    let _ = umount2(&path, MntFlags::MNT_DETACH);
    let _ = fs::remove_file(&path);
}

/// Moves the calling thread into `name`'s network namespace for the lifetime of the guard,
/// restoring the original namespace on drop.
///
/// Must be used from a single-threaded context (or a thread dedicated to this namespace):
/// `setns` affects only the calling thread, but every further syscall on that thread observes
/// the new namespace until the guard is dropped.
pub struct NetnsGuard {
    original: File,
}

impl NetnsGuard {
    pub fn enter(name: &str) -> Result<Self, TopologyError> {
        let original = File::open("/proc/self/ns/net")
            .map_err(|e| TopologyError::NamespaceOpen("/proc/self/ns/net".into(), e))?;

        let target_path = netns_path(name);
        let target = File::open(&target_path)
            .map_err(|e| TopologyError::NamespaceOpen(target_path.clone(), e))?;

        setns(&target, CloneFlags::CLONE_NEWNET)
            .map_err(|e| TopologyError::NamespaceEnter(name.to_string(), e))?;

        Ok(Self { original })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        let _ = setns(&self.original, CloneFlags::CLONE_NEWNET);
    }
}

/// Writes a namespaced `/proc/sys/net/...` knob (e.g. `ip_forward`) from inside `name`'s
/// namespace. Best-effort: a sysctl that the running kernel doesn't expose is not fatal.
pub fn write_sysctl_in_netns(name: &str, path: &str, value: &str) -> Result<(), TopologyError> {
    let _guard = NetnsGuard::enter(name)?;
    let _ = fs::write(path, value);
    Ok(())
}

