//! Collaborator Trait Definitions
//!
//! These traits abstract the hypervisor services the remoteproc
//! pass-through depends on but does not own: register access, host irq
//! registration, virtual GIC, guest P2M lookups and cache maintenance.
//! The core logic is written against them only.

use crate::DomainId;

/// 32-bit register block (MFIS).
pub trait MmioRegs: Send + Sync {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

/// Physical interrupt registration on the host
pub trait HostIrq {
    fn request_irq(&self, irq: u32) -> Result<(), &'static str>;
    fn release_irq(&self, irq: u32);
}

/// Virtual interrupt delivery into guests (vGIC).
pub trait VirqController: Send + Sync {
    /// Reserve `virq` in the domain's vGIC. Reserving a line the domain
    /// already owns must succeed.
    fn reserve_virq(&self, domain: DomainId, virq: u32) -> Result<(), &'static str>;
    fn inject_virq(&self, domain: DomainId, virq: u32);
}

/// P2M type of a guest frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2mType {
    RamRw,
    RamRo,
    /// Cacheable direct MMIO mapping (IPA == PA)
    MmioDirect,
    Invalid,
}

/// A counted reference on a guest page. Dropping it releases the reference.
pub trait PageRef: Send {
    /// Machine address of the page.
    fn maddr(&self) -> u64;
}

/// Guest physical memory lookups.
pub trait GuestMemory: Send + Sync {
    type Page: PageRef;

    /// Look up `gfn` in the domain's P2M, taking a reference on the backing
    /// page if there is one.
    fn get_page(&self, domain: DomainId, gfn: u64) -> (Option<Self::Page>, P2mType);
}

/// Data cache maintenance.
pub trait DcacheOps: Send + Sync {
    /// Clean and invalidate to the point of coherency.
    fn clean_and_invalidate(&self, region: &[u8]);
}

/// The full set of services one host platform provides.
pub trait Platform: 'static {
    type Regs: MmioRegs;
    type Memory: GuestMemory;
    type Vgic: VirqController;
    type Cache: DcacheOps;
}
