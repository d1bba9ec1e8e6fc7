//! Host DTB (Device Tree Blob) probe inputs
//!
//! Extracts what the MFIS driver and the resource table parser need from
//! the host device tree: register windows, the channel list and per-channel
//! interrupts. Node discovery itself belongs to the hypervisor; this module
//! only reads properties of the nodes matching our compatibles.
//!
//! The `fdt` crate does zero-copy parsing, no heap allocation needed.

use fdt::node::FdtNode;
use fdt::Fdt;

use crate::error::{Result, RprocError};
use crate::mm::DirectMapAllowList;
use crate::platform::*;

/// Size in bytes of one GIC interrupt specifier (3 cells).
const GIC_IRQ_SPEC_LEN: usize = 12;

/// MFIS block as described by the host DTB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfisNode {
    pub base: u64,
    pub len: u64,
    /// Channels wired to this host, clamped to `MFIS_MAX_CHANNELS`.
    pub chan_cnt: usize,
    pub chan_ids: [u32; MFIS_MAX_CHANNELS],
    /// Host irq of each listed channel, 0 if the DTB has none.
    pub irqs: [u32; MFIS_MAX_CHANNELS],
}

/// Resource table window as described by the host DTB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RprocNode {
    pub base: u64,
    pub len: u64,
}

fn be32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let cell = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
}

fn be64_at(bytes: &[u8], offset: usize) -> Option<u64> {
    let hi = be32_at(bytes, offset)? as u64;
    let lo = be32_at(bytes, offset + 4)? as u64;
    Some((hi << 32) | lo)
}

fn first_reg(node: &FdtNode<'_, '_>) -> Result<(u64, u64)> {
    let reg = node
        .reg()
        .and_then(|mut regs| regs.next())
        .ok_or(RprocError::MissingProperty("reg"))?;
    Ok((reg.starting_address as u64, reg.size.unwrap_or(0) as u64))
}

/// Host irq of the `index`-th GIC specifier in `interrupts`.
fn gic_irq(interrupts: &[u8], index: usize) -> u32 {
    let Some(base) = index.checked_mul(GIC_IRQ_SPEC_LEN) else {
        return 0;
    };
    let (Some(kind), Some(num)) = (be32_at(interrupts, base), be32_at(interrupts, base.saturating_add(4)))
    else {
        return 0;
    };
    match kind {
        GIC_SPI => num.checked_add(GIC_SPI_BASE).unwrap_or(0),
        GIC_PPI => num.checked_add(GIC_PPI_BASE).unwrap_or(0),
        _ => 0,
    }
}

impl MfisNode {
    pub fn from_fdt(fdt: &Fdt<'_>) -> Result<Self> {
        let node = fdt
            .find_compatible(&[MFIS_COMPATIBLE])
            .ok_or(RprocError::MissingProperty(MFIS_COMPATIBLE))?;

        let (base, len) = first_reg(&node).map_err(|e| {
            log::error!(target: "mfis", "cannot read MFIS base address");
            e
        })?;

        let channels = node
            .property(MFIS_CHANNELS_PROP)
            .map(|p| p.value)
            .filter(|v| v.len() >= 4)
            .ok_or(RprocError::MissingProperty(MFIS_CHANNELS_PROP))?;

        let chan_cnt = (channels.len() / 4).min(MFIS_MAX_CHANNELS);
        let interrupts = node.property("interrupts").map(|p| p.value).unwrap_or(&[]);

        let mut chan_ids = [0u32; MFIS_MAX_CHANNELS];
        let mut irqs = [0u32; MFIS_MAX_CHANNELS];
        for i in 0..chan_cnt {
            let id = be32_at(channels, i * 4).unwrap_or(u32::MAX);
            chan_ids[i] = id;
            irqs[i] = gic_irq(interrupts, id as usize);
        }

        Ok(Self {
            base,
            len,
            chan_cnt,
            chan_ids,
            irqs,
        })
    }
}

impl RprocNode {
    pub fn from_fdt(fdt: &Fdt<'_>) -> Result<Self> {
        let node = fdt
            .find_compatible(&[RPROC_COMPATIBLE])
            .ok_or(RprocError::MissingProperty(RPROC_COMPATIBLE))?;
        let (base, len) = first_reg(&node).map_err(|e| {
            log::error!(target: "rproc", "cannot read rproc resource table addr");
            e
        })?;
        Ok(Self { base, len })
    }
}

/// Append the `xen,direct-dma-ranges` windows of the rproc node to `list`.
/// Returns the number of ranges added.
pub fn direct_dma_ranges(fdt: &Fdt<'_>, list: &mut DirectMapAllowList) -> usize {
    let Some(prop) = fdt
        .find_compatible(&[RPROC_COMPATIBLE])
        .and_then(|node| node.property(RPROC_DIRECT_DMA_PROP))
    else {
        return 0;
    };

    let mut added = 0;
    for pair in prop.value.chunks_exact(16) {
        let (Some(base), Some(size)) = (be64_at(pair, 0), be64_at(pair, 8)) else {
            continue;
        };
        if list.add(base, size) {
            added += 1;
        } else {
            log::warn!(target: "rproc", "ignoring direct DMA window {:#x}+{:#x}", base, size);
        }
    }
    added
}
