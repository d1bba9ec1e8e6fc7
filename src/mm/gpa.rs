//! Guest-physical to machine address translation for vring setup.
//!
//! A guest hands us an IPA that ends up in a structure the companion
//! processor DMAs into, so the address must either be RAM the guest owns
//! read-write, or fall inside an explicitly allowed identity-mapped window.

use crate::arch::traits::{GuestMemory, P2mType, PageRef};
use crate::error::{Result, RprocError};
use crate::platform::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};
use crate::DomainId;

/// Maximum number of identity-mapped DMA windows.
pub const MAX_DIRECT_MAP_RANGES: usize = 4;

/// Why a guest address was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Guest RAM mapped read-write; machine address comes from the page.
    GuestRam,
    /// Allowed identity-mapped window; machine address equals the IPA.
    IdentityMappedIo,
}

/// Result of a successful translation. Holds the page reference (if any)
/// that keeps the backing page alive.
pub struct TranslatedAddress<R> {
    maddr: u64,
    provenance: Provenance,
    page: Option<R>,
}

impl<R> TranslatedAddress<R> {
    pub fn maddr(&self) -> u64 {
        self.maddr
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Hand the page reference over to whoever keeps the mapping alive.
    pub fn into_page(self) -> Option<R> {
        self.page
    }
}

/// Physical ranges for which `P2mType::MmioDirect` is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectMapAllowList {
    ranges: [(u64, u64); MAX_DIRECT_MAP_RANGES],
    count: usize,
}

impl DirectMapAllowList {
    pub const fn new() -> Self {
        Self {
            ranges: [(0, 0); MAX_DIRECT_MAP_RANGES],
            count: 0,
        }
    }

    /// Add `[base, base + size)`. Returns false if the list is full or the
    /// range is empty or wraps.
    pub fn add(&mut self, base: u64, size: u64) -> bool {
        if size == 0 || base.checked_add(size).is_none() || self.count == MAX_DIRECT_MAP_RANGES {
            return false;
        }
        self.ranges[self.count] = (base, size);
        self.count += 1;
        true
    }

    /// Whether `[addr, addr + len)` lies inside a single allowed range.
    pub fn contains(&self, addr: u64, len: u64) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        self.ranges()
            .iter()
            .any(|&(base, size)| addr >= base && end <= base + size)
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges[..self.count]
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for DirectMapAllowList {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate `gpa` for `domain` and produce the machine address to publish.
///
/// Any page reference taken during the lookup is released on every error
/// path.
pub fn translate_vring_addr<M: GuestMemory>(
    mem: &M,
    domain: DomainId,
    gpa: u64,
    allow: &DirectMapAllowList,
    dma_limit: u64,
) -> Result<TranslatedAddress<M::Page>> {
    let (page, p2mt) = mem.get_page(domain, gpa >> PAGE_SHIFT);

    let (maddr, provenance) = match (p2mt, page.as_ref()) {
        (P2mType::MmioDirect, _) if allow.contains(gpa & !PAGE_MASK, PAGE_SIZE as u64) => {
            (gpa, Provenance::IdentityMappedIo)
        }
        (P2mType::RamRw, Some(pg)) => (pg.maddr(), Provenance::GuestRam),
        _ => {
            log::warn!(
                target: "rproc",
                "d{}: rejecting vring address {:#x} ({:?})",
                domain, gpa, p2mt
            );
            return Err(RprocError::InvalidAddress(gpa));
        }
    };

    log::debug!(target: "rproc", "d{}: vring pa = {:#x}", domain, maddr);

    if maddr > dma_limit {
        log::error!(target: "rproc", "provided page {:#x} is above the DMA limit", maddr);
        return Err(RprocError::AddressOutOfRange(maddr));
    }

    Ok(TranslatedAddress {
        maddr,
        provenance,
        page,
    })
}
