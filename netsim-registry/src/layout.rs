//! Fixed, `#[repr(C)]` layout of the shared memory segment, mirroring the original
//! `shared_registry.h` struct-of-arrays design: fixed-size slots, linear-scan lookup, no
//! pointers, safe to share verbatim between unrelated processes via `mmap`.

pub const REGISTRY_SHM_NAME: &str = "/tsim_registry";
pub const MAX_ROUTERS: usize = 1024;
pub const MAX_INTERFACES_PER_ROUTER: usize = 64;
pub const MAX_BRIDGES: usize = 2048;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SUBNET_LEN: usize = 32;
pub const MAX_BRIDGE_NAME_LEN: usize = 32;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct RouterEntry {
    pub router_name: [u8; MAX_NAME_LEN],
    pub router_code: [u8; 8],
    pub active: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct InterfaceEntry {
    pub router_code: [u8; 8],
    pub interface_name: [u8; MAX_NAME_LEN],
    pub interface_code: [u8; 8],
    pub active: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct BridgeEntry {
    pub bridge_name: [u8; MAX_BRIDGE_NAME_LEN],
    pub subnet: [u8; MAX_SUBNET_LEN],
    pub created: i32,
    pub active: i32,
}

#[repr(C)]
pub struct Registry {
    pub version: i32,
    pub router_count: i32,
    pub interface_count: i32,
    pub bridge_count: i32,

    pub routers: [RouterEntry; MAX_ROUTERS],
    pub interfaces: [InterfaceEntry; MAX_ROUTERS * MAX_INTERFACES_PER_ROUTER],
    pub bridges: [BridgeEntry; MAX_BRIDGES],

    pub next_router_code: i32,
    pub next_interface_codes: [i32; MAX_ROUTERS],
}

pub const REGISTRY_SIZE: usize = std::mem::size_of::<Registry>();

/// Reads a NUL-terminated (or fully-occupied) fixed-size byte buffer as a `&str`, ignoring
/// any trailing garbage past the first NUL — the same convention as the C struct fields.
pub fn read_fixed(buf: &[u8]) -> &str {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..len]).unwrap_or("")
}

/// Writes `value` into a fixed-size buffer, truncating to fit and NUL-terminating unless the
/// value fills the buffer exactly (matching `strncpy`'s behavior in the original).
pub fn write_fixed(buf: &mut [u8], value: &str) {
    buf.fill(0);
    let bytes = value.as_bytes();
    let n = bytes.len().min(buf.len().saturating_sub(1));
    buf[..n].copy_from_slice(&bytes[..n]);
}
