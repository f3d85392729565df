//! POSIX shared-memory registry of deterministic short codes (`r000`..`r999` for routers,
//! `i000`..`i999` per-router for interfaces) and of the bridges created for each subnet.
//!
//! The registry is attached by name (`/tsim_registry`) so that a forked batch of per-router
//! setup children all see the same router/interface/bridge codes without IPC beyond `mmap`.

mod error;
mod layout;

pub use error::RegistryError;
pub use layout::{MAX_BRIDGES, MAX_INTERFACES_PER_ROUTER, MAX_ROUTERS, REGISTRY_SHM_NAME};

use std::os::fd::OwnedFd;
use std::ptr::NonNull;
use std::sync::atomic::{fence, Ordering};

use layout::{read_fixed, write_fixed, Registry, REGISTRY_SIZE};
use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use tracing::debug;

/// Handle onto the shared registry segment.
///
/// Dropping the handle unmaps the segment; the segment itself (and its name in `/dev/shm`)
/// outlives the handle unless [`SharedRegistry::destroy`] is called. Multiple processes can
/// hold a handle onto the same segment simultaneously; see the module docs for the
/// single-writer assumption this registry relies on instead of locking.
pub struct SharedRegistry {
    fd: OwnedFd,
    ptr: NonNull<Registry>,
}

// SAFETY: the pointee lives in a `MAP_SHARED` segment backed by a file descriptor that
// outlives every mapping of it; access patterns here never take interior references across
// an `await` point or a thread boundary without the caller's own synchronization.
unsafe impl Send for SharedRegistry {}

impl SharedRegistry {
    /// Creates a fresh registry, unlinking any stale segment left behind by a previous run.
    pub fn create() -> Result<Self, RegistryError> {
        let _ = mman::shm_unlink(REGISTRY_SHM_NAME);

        let fd = mman::shm_open(
            REGISTRY_SHM_NAME,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o666),
        )
        .map_err(|e| RegistryError::Shm("create", REGISTRY_SHM_NAME, e))?;

        ftruncate(&fd, REGISTRY_SIZE as i64)
            .map_err(|e| RegistryError::Truncate(REGISTRY_SIZE, e))?;

        let ptr = Self::map(&fd)?;

        // SAFETY: freshly truncated pages are zero-filled by the kernel, but we zero
        // explicitly so the layout doesn't depend on that guarantee, then stamp the header.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, 1);
            (*ptr.as_ptr()).version = 1;
        }
        fence(Ordering::Release);

        debug!(size = REGISTRY_SIZE, "created shared registry");
        Ok(Self { fd, ptr })
    }

    /// Attaches to an already-created registry segment (used by forked per-router workers).
    pub fn attach() -> Result<Self, RegistryError> {
        let fd = mman::shm_open(
            REGISTRY_SHM_NAME,
            OFlag::O_RDWR,
            Mode::from_bits_truncate(0o666),
        )
        .map_err(|e| RegistryError::Shm("attach", REGISTRY_SHM_NAME, e))?;

        let ptr = Self::map(&fd)?;
        fence(Ordering::Acquire);
        Ok(Self { fd, ptr })
    }

    /// Attaches to an existing registry, or creates a fresh one if no run has populated one
    /// yet. Used by `--cleanup`, which must be safe to run against a partially-built or
    /// entirely unstarted topology rather than failing outright when nothing was ever set up.
    pub fn attach_or_create() -> Result<Self, RegistryError> {
        match Self::attach() {
            Ok(reg) => Ok(reg),
            Err(RegistryError::Shm(_, _, nix::Error::ENOENT)) => Self::create(),
            Err(e) => Err(e),
        }
    }

    fn map(fd: &OwnedFd) -> Result<NonNull<Registry>, RegistryError> {
        let len = std::num::NonZeroUsize::new(REGISTRY_SIZE).expect("registry size is non-zero");
        // SAFETY: `fd` refers to a POSIX shared memory object sized to exactly `REGISTRY_SIZE`
        // bytes by the caller; the mapping is dropped by `munmap` in our `Drop` impl.
        let addr = unsafe {
            mman::mmap(None, len, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE, MapFlags::MAP_SHARED, fd, 0)
        }
        .map_err(RegistryError::Mmap)?;
        Ok(addr.cast())
    }

    fn reg(&self) -> &Registry {
        // SAFETY: the pointer is valid for the lifetime of `self` and the pointee's layout
        // is `#[repr(C)]` plain data with no invalid bit patterns.
        unsafe { self.ptr.as_ref() }
    }

    #[allow(clippy::mut_from_ref)]
    fn reg_mut(&self) -> &mut Registry {
        // SAFETY: see `reg`; callers are expected to serialize writers themselves (the
        // topology engine does all registry mutation from the sequential phase-A pass).
        unsafe { &mut *self.ptr.as_ptr() }
    }

    /// Returns `router_name`'s short code, assigning the next free one (`r000`, `r001`, ...)
    /// if this is the first time the router has been seen.
    pub fn get_or_create_router_code(&self, router_name: &str) -> Result<String, RegistryError> {
        let reg = self.reg_mut();

        for entry in reg.routers.iter().take(reg.router_count as usize + 10) {
            if entry.active != 0 && read_fixed(&entry.router_name) == router_name {
                return Ok(read_fixed(&entry.router_code).to_string());
            }
        }

        if reg.router_count as usize >= MAX_ROUTERS {
            return Err(RegistryError::RouterTableFull(MAX_ROUTERS));
        }

        let slot = reg
            .routers
            .iter_mut()
            .find(|e| e.active == 0)
            .ok_or(RegistryError::RouterTableFull(MAX_ROUTERS))?;

        let code = format!("r{:03}", reg.next_router_code);
        write_fixed(&mut slot.router_name, router_name);
        write_fixed(&mut slot.router_code, &code);
        slot.active = 1;
        reg.next_router_code += 1;
        reg.router_count += 1;
        fence(Ordering::Release);

        Ok(code)
    }

    /// Returns `interface_name`'s short code under `router_code`, assigning the next free one
    /// (`i000`, `i001`, ... per router) if unseen.
    pub fn get_or_create_interface_code(
        &self,
        router_code: &str,
        interface_name: &str,
    ) -> Result<String, RegistryError> {
        let router_idx = router_index(router_code)?;
        let reg = self.reg_mut();

        let base = router_idx * MAX_INTERFACES_PER_ROUTER;
        let slots = &mut reg.interfaces[base..base + MAX_INTERFACES_PER_ROUTER];

        for entry in slots.iter() {
            if entry.active != 0
                && read_fixed(&entry.router_code) == router_code
                && read_fixed(&entry.interface_name) == interface_name
            {
                return Ok(read_fixed(&entry.interface_code).to_string());
            }
        }

        let slot = slots
            .iter_mut()
            .find(|e| e.active == 0)
            .ok_or_else(|| RegistryError::InterfaceTableFull(router_code.to_string(), MAX_INTERFACES_PER_ROUTER))?;

        let code = format!("i{:03}", reg.next_interface_codes[router_idx]);
        write_fixed(&mut slot.router_code, router_code);
        write_fixed(&mut slot.interface_name, interface_name);
        write_fixed(&mut slot.interface_code, &code);
        slot.active = 1;
        reg.next_interface_codes[router_idx] += 1;
        reg.interface_count += 1;
        fence(Ordering::Release);

        Ok(code)
    }

    /// Registers a bridge for `subnet`, returning its slot index. Idempotent: calling again
    /// with the same `bridge_name` returns the same slot.
    pub fn register_bridge(&self, bridge_name: &str, subnet: &str) -> Result<usize, RegistryError> {
        let reg = self.reg_mut();

        for (i, entry) in reg.bridges.iter().take(reg.bridge_count as usize + 10).enumerate() {
            if entry.active != 0 && read_fixed(&entry.bridge_name) == bridge_name {
                return Ok(i);
            }
        }

        let (idx, slot) = reg
            .bridges
            .iter_mut()
            .enumerate()
            .find(|(_, e)| e.active == 0)
            .ok_or(RegistryError::BridgeTableFull(MAX_BRIDGES))?;

        write_fixed(&mut slot.bridge_name, bridge_name);
        write_fixed(&mut slot.subnet, subnet);
        slot.created = 0;
        slot.active = 1;
        reg.bridge_count += 1;
        fence(Ordering::Release);

        Ok(idx)
    }

    /// Marks a previously registered bridge as created in the kernel.
    pub fn mark_bridge_created(&self, bridge_name: &str) {
        let reg = self.reg_mut();
        if let Some(slot) = reg
            .bridges
            .iter_mut()
            .find(|e| e.active != 0 && read_fixed(&e.bridge_name) == bridge_name)
        {
            slot.created = 1;
            fence(Ordering::Release);
        }
    }

    /// Looks up the bridge registered for `subnet`, if any, returning `(bridge_name, created)`.
    pub fn find_bridge_by_subnet(&self, subnet: &str) -> Option<(String, bool)> {
        self.reg()
            .bridges
            .iter()
            .find(|e| e.active != 0 && read_fixed(&e.subnet) == subnet)
            .map(|e| (read_fixed(&e.bridge_name).to_string(), e.created != 0))
    }

    /// Wipes every entry back to an empty registry, keeping the segment mapped.
    pub fn clear(&self) {
        let reg = self.reg_mut();
        // SAFETY: `Registry` is plain `#[repr(C)]` data; zeroing it is always a valid state.
        unsafe { std::ptr::write_bytes(reg as *mut Registry, 0, 1) };
        reg.version = 1;
        fence(Ordering::Release);
    }

    /// Unmaps and unlinks the segment, removing it from `/dev/shm`. Call once, from whichever
    /// process owns the registry's lifetime (normally the `tsim-setup` parent).
    pub fn destroy(self) {
        let _ = mman::shm_unlink(REGISTRY_SHM_NAME);
    }
}

impl Drop for SharedRegistry {
    fn drop(&mut self) {
        let len = std::num::NonZeroUsize::new(REGISTRY_SIZE).expect("registry size is non-zero");
        // SAFETY: `self.ptr` was produced by `mmap` with exactly this length in `map`.
        unsafe {
            let _ = mman::munmap(self.ptr.cast(), len.get());
        }
    }
}

fn router_index(router_code: &str) -> Result<usize, RegistryError> {
    router_code
        .strip_prefix('r')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&i| i < MAX_ROUTERS)
        .ok_or_else(|| RegistryError::MalformedRouterCode(router_code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The registry is a single global POSIX name; serialize tests that touch it.
    static REGISTRY_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn assigns_and_reuses_router_codes() {
        let _guard = REGISTRY_TEST_LOCK.lock().unwrap();
        let reg = SharedRegistry::create().unwrap();

        let code_a = reg.get_or_create_router_code("routerA").unwrap();
        let code_b = reg.get_or_create_router_code("routerB").unwrap();
        let code_a_again = reg.get_or_create_router_code("routerA").unwrap();

        assert_eq!(code_a, "r000");
        assert_eq!(code_b, "r001");
        assert_eq!(code_a, code_a_again);

        reg.destroy();
    }

    #[test]
    fn interface_codes_are_scoped_per_router() {
        let _guard = REGISTRY_TEST_LOCK.lock().unwrap();
        let reg = SharedRegistry::create().unwrap();

        let r0 = reg.get_or_create_router_code("routerA").unwrap();
        let r1 = reg.get_or_create_router_code("routerB").unwrap();

        let eth0_a = reg.get_or_create_interface_code(&r0, "eth0").unwrap();
        let eth0_b = reg.get_or_create_interface_code(&r1, "eth0").unwrap();
        let eth1_a = reg.get_or_create_interface_code(&r0, "eth1").unwrap();

        assert_eq!(eth0_a, "i000");
        assert_eq!(eth0_b, "i000");
        assert_eq!(eth1_a, "i001");

        reg.destroy();
    }

    #[test]
    fn bridge_lookup_round_trips() {
        let _guard = REGISTRY_TEST_LOCK.lock().unwrap();
        let reg = SharedRegistry::create().unwrap();

        let idx = reg.register_bridge("b010001001000024", "10.1.1.0/24").unwrap();
        let idx_again = reg.register_bridge("b010001001000024", "10.1.1.0/24").unwrap();
        assert_eq!(idx, idx_again);

        let (name, created) = reg.find_bridge_by_subnet("10.1.1.0/24").unwrap();
        assert_eq!(name, "b010001001000024");
        assert!(!created);

        reg.mark_bridge_created(&name);
        let (_, created) = reg.find_bridge_by_subnet("10.1.1.0/24").unwrap();
        assert!(created);

        reg.destroy();
    }

    #[test]
    fn clear_resets_counts() {
        let _guard = REGISTRY_TEST_LOCK.lock().unwrap();
        let reg = SharedRegistry::create().unwrap();
        reg.get_or_create_router_code("routerA").unwrap();
        reg.clear();
        assert_eq!(reg.get_or_create_router_code("routerA").unwrap(), "r000");
        reg.destroy();
    }
}
