//! Platform/Board Constants (Renesas R-Car Gen4)
//!
//! All board-specific numbers used by the remoteproc pass-through live here
//! so they can be changed in one place when targeting a different SoC.

// ── MFIS (interrupt multiplexer) ─────────────────────────────────────
/// Hardware upper bound on MFIS channels.
pub const MFIS_MAX_CHANNELS: usize = 8;

/// Device-tree compatible of the MFIS block.
pub const MFIS_COMPATIBLE: &str = "renesas,mfis";

/// Property listing the channel ids wired to this host.
pub const MFIS_CHANNELS_PROP: &str = "renesas,mfis-channels";

// ── Companion processor resource table ───────────────────────────────
/// Device-tree compatible of the resource table node.
pub const RPROC_COMPATIBLE: &str = "renesas,rproc";

/// Optional `<base size>` pairs of identity-mapped DMA windows.
pub const RPROC_DIRECT_DMA_PROP: &str = "xen,direct-dma-ranges";

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

// ── Guest view ───────────────────────────────────────────────────────
/// SPI raised in a bound guest when its MFIS channel fires.
pub const GUEST_MFIS_SPI: u32 = 112;

/// The companion processor only sees the low 4GB.
pub const RPROC_DMA_LIMIT: u64 = 0xFFFF_FFFF;

// ── GIC interrupt specifier types ────────────────────────────────────
pub const GIC_SPI: u32 = 0;
pub const GIC_PPI: u32 = 1;
pub const GIC_SPI_BASE: u32 = 32;
pub const GIC_PPI_BASE: u32 = 16;
