//! Runtime configuration of the pass-through.
//!
//! Defaults come from `platform.rs`; the host DTB may widen the trusted
//! direct-mapped DMA windows. The allow-list starts empty, so no
//! identity-mapped address is accepted unless the platform asks for it.

use fdt::Fdt;

use crate::dtb;
use crate::mm::DirectMapAllowList;
use crate::platform::{GUEST_MFIS_SPI, RPROC_DMA_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RprocConfig {
    /// SPI injected into the bound guest on a channel interrupt.
    pub guest_spi: u32,
    /// Highest machine address the companion processor can reach.
    pub dma_limit: u64,
    pub direct_map: DirectMapAllowList,
}

impl Default for RprocConfig {
    fn default() -> Self {
        Self {
            guest_spi: GUEST_MFIS_SPI,
            dma_limit: RPROC_DMA_LIMIT,
            direct_map: DirectMapAllowList::new(),
        }
    }
}

impl RprocConfig {
    /// Defaults overlaid with what the host DTB describes.
    pub fn from_fdt(fdt: &Fdt<'_>) -> Self {
        let mut config = Self::default();
        let added = dtb::direct_dma_ranges(fdt, &mut config.direct_map);
        if added > 0 {
            log::info!(target: "rproc", "{} direct DMA window(s) trusted", added);
        }
        config
    }

    pub fn with_direct_map(mut self, base: u64, size: u64) -> Self {
        if !self.direct_map.add(base, size) {
            log::warn!(target: "rproc", "ignoring direct DMA window {:#x}+{:#x}", base, size);
        }
        self
    }

    pub fn with_guest_spi(mut self, spi: u32) -> Self {
        self.guest_spi = spi;
        self
    }
}
