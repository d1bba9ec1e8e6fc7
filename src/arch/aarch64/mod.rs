//! ARM64/AArch64 backends for the collaborator traits
//!
//! EL2 runs with an identity map of the host physical address space, so
//! register blocks and the resource table page are reached by casting the
//! physical address.

pub mod cache;
pub mod mmio;

pub use cache::Dcache;
pub use mmio::MmioBlock;

use crate::platform::PAGE_SIZE;

/// Map one physical page for byte access.
///
/// # Safety
///
/// `pa` must be page-aligned, identity-mapped at EL2, and not aliased by any
/// other mutable reference for the lifetime of the program.
pub unsafe fn map_identity_page(pa: u64) -> &'static mut [u8] {
    core::slice::from_raw_parts_mut(pa as usize as *mut u8, PAGE_SIZE)
}
