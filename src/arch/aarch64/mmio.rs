//! Volatile 32-bit register block.

use crate::arch::traits::MmioRegs;

/// A device register window at a fixed base address.
pub struct MmioBlock {
    base: usize,
    len: usize,
}

impl MmioBlock {
    /// # Safety
    ///
    /// `base..base + len` must be device memory mapped at EL2 and owned by
    /// the caller.
    pub const unsafe fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn reg_ptr(&self, offset: usize) -> Option<usize> {
        if offset.checked_add(4)? > self.len || offset % 4 != 0 {
            return None;
        }
        Some(self.base + offset)
    }
}

impl MmioRegs for MmioBlock {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        match self.reg_ptr(offset) {
            Some(addr) => unsafe { core::ptr::read_volatile(addr as *const u32) },
            None => {
                log::error!(target: "mmio", "read outside register block: {:#x}", offset);
                0
            }
        }
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        match self.reg_ptr(offset) {
            Some(addr) => unsafe { core::ptr::write_volatile(addr as *mut u32, value) },
            None => log::error!(target: "mmio", "write outside register block: {:#x}", offset),
        }
    }
}
