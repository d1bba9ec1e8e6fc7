//! Remoteproc pass-through: the operation set published once both the MFIS
//! block and the resource table are up.
//!
//! `Rproc` ties the three pieces together: the MFIS driver for doorbells and
//! interrupts, the resource table holding the vdevs, and the channel table
//! saying which guest owns which channel.

pub mod channels;
pub mod rtable;
pub mod smc;

use spin::mutex::TicketMutex;

use crate::arch::traits::{GuestMemory, Platform, VirqController};
use crate::config::RprocConfig;
use crate::error::{Result, RprocError};
use crate::mfis::Mfis;
use crate::mm::translate_vring_addr;
use crate::platform::MFIS_MAX_CHANNELS;
use crate::DomainId;

use self::channels::ChannelTable;
use self::rtable::{RsrcTable, MAX_VRINGS};

type PageOf<P> = <<P as Platform>::Memory as GuestMemory>::Page;

/// Hypervisor services handed to the pass-through at construction.
pub struct Services<P: Platform> {
    pub memory: P::Memory,
    pub vgic: P::Vgic,
    pub cache: P::Cache,
}

pub struct Rproc<P: Platform> {
    mfis: Mfis<P::Regs>,
    table: RsrcTable,
    channels: ChannelTable,
    /// Page references backing each configured vring. Taken before the
    /// channel table's update lock, never after it.
    vring_pages: TicketMutex<[[Option<PageOf<P>>; MAX_VRINGS]; MFIS_MAX_CHANNELS]>,
    services: Services<P>,
    config: RprocConfig,
}

impl<P: Platform> Rproc<P> {
    pub fn new(mfis: Mfis<P::Regs>, table: RsrcTable, services: Services<P>, config: RprocConfig) -> Self {
        let channels = ChannelTable::new(mfis.chan_cnt(), table.vdev_count());
        Self {
            mfis,
            table,
            channels,
            vring_pages: TicketMutex::new(core::array::from_fn(|_| [None, None])),
            services,
            config,
        }
    }

    pub fn mfis(&self) -> &Mfis<P::Regs> {
        &self.mfis
    }

    pub fn table(&self) -> &RsrcTable {
        &self.table
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn config(&self) -> &RprocConfig {
        &self.config
    }

    pub fn find_channel(&self, domain: DomainId) -> Option<usize> {
        self.channels.find_channel(domain)
    }

    /// Give `domain` exclusive use of `chan`.
    pub fn assign(&self, domain: DomainId, chan: usize) -> Result<()> {
        let spi = self.config.guest_spi;
        self.channels.assign(domain, chan, || {
            self.services
                .vgic
                .reserve_virq(domain, spi)
                .map_err(RprocError::Virq)
        })?;
        log::info!(target: "rproc", "added chan {} for domain {}", chan, domain);
        Ok(())
    }

    /// Release whatever channel `domain` holds. No-op if it holds none.
    pub fn remove(&self, domain: DomainId) {
        // Held across unbind and reset: the channel must not be handed to
        // another domain while its vdev still points at our pages.
        let mut pages = self.vring_pages.lock();
        let Some(chan) = self.channels.remove(domain) else {
            return;
        };

        // The companion must stop using the rings before the pages go.
        self.table.reset_vdev(chan, &self.services.cache);
        for page in pages[chan].iter_mut() {
            *page = None;
        }
        log::info!(target: "rproc", "removed chan {} from domain {}", chan, domain);
    }

    /// Ring the doorbell of the channel `domain` holds.
    pub fn trigger(&self, domain: DomainId) -> Result<()> {
        let chan = self.channels.find_channel(domain).ok_or(RprocError::NoBinding)?;
        self.mfis.ring(chan)
    }

    /// Host interrupt for one of the MFIS channels.
    pub fn on_irq(&self, irq: u32) {
        let Some(chan) = self.mfis.ack(irq) else {
            return;
        };
        match self.channels.bound_domain(chan) {
            Some(domain) => self.services.vgic.inject_virq(domain, self.config.guest_spi),
            None => log::warn!(target: "mfis", "irq for chan {} without domain", chan),
        }
    }

    /// Point vring `ring` of the caller's vdev at `gpa`.
    pub fn set_vring_data(&self, domain: DomainId, ring: usize, gpa: u64, notifyid: u32) -> Result<()> {
        let chan = self.channels.find_channel(domain).ok_or(RprocError::NoBinding)?;
        let slot = self.table.slot(chan).ok_or(RprocError::NoSuchChannel(chan))?;
        if ring >= slot.num_vrings as usize {
            return Err(RprocError::InvalidRing(ring));
        }

        let translated = translate_vring_addr(
            &self.services.memory,
            domain,
            gpa,
            &self.config.direct_map,
            self.config.dma_limit,
        )?;

        let mut pages = self.vring_pages.lock();
        if self.channels.bound_domain(chan) != Some(domain) {
            return Err(RprocError::NoBinding);
        }
        // dma_limit keeps the address within 32 bits.
        let da = u32::try_from(translated.maddr())
            .map_err(|_| RprocError::AddressOutOfRange(translated.maddr()))?;
        self.table
            .set_vring(chan, ring, da, notifyid, &self.services.cache)?;
        pages[chan][ring] = translated.into_page();
        Ok(())
    }

    /// Whether a page reference is held for `(chan, ring)`.
    pub fn holds_vring_page(&self, chan: usize, ring: usize) -> bool {
        self.vring_pages
            .lock()
            .get(chan)
            .and_then(|rings| rings.get(ring))
            .is_some_and(Option::is_some)
    }
}
