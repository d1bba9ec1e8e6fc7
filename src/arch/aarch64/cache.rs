//! Data cache maintenance by virtual address.

use crate::arch::traits::DcacheOps;

/// Line size assumed on hosts without CTR_EL0.
#[cfg(not(target_arch = "aarch64"))]
const DEFAULT_DCACHE_LINE: usize = 64;

/// Point-of-coherency data cache maintenance.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dcache;

impl Dcache {
    #[cfg(target_arch = "aarch64")]
    fn line_size() -> usize {
        let ctr: u64;
        unsafe {
            core::arch::asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack));
        }
        // DminLine: log2 of the number of words in the smallest line.
        4 << ((ctr >> 16) & 0xF)
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn line_size() -> usize {
        DEFAULT_DCACHE_LINE
    }

    /// Clean and invalidate `[start, start + len)`.
    pub fn flush_range(start: usize, len: usize) {
        if len == 0 {
            return;
        }
        let line = Self::line_size();
        let mut addr = start & !(line - 1);
        let end = start.saturating_add(len);
        while addr < end {
            Self::civac(addr);
            addr += line;
        }
        Self::dsb();
    }

    #[cfg(target_arch = "aarch64")]
    #[inline]
    fn civac(addr: usize) {
        unsafe {
            core::arch::asm!("dc civac, {addr}", addr = in(reg) addr, options(nostack));
        }
    }

    #[cfg(not(target_arch = "aarch64"))]
    #[inline]
    fn civac(_addr: usize) {}

    #[cfg(target_arch = "aarch64")]
    #[inline]
    fn dsb() {
        unsafe { core::arch::asm!("dsb sy", options(nostack)) };
    }

    #[cfg(not(target_arch = "aarch64"))]
    #[inline]
    fn dsb() {
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

impl DcacheOps for Dcache {
    fn clean_and_invalidate(&self, region: &[u8]) {
        Self::flush_range(region.as_ptr() as usize, region.len());
    }
}
