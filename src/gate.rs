//! Composition gate and the hypervisor-facing hooks.
//!
//! The MFIS block and the resource table are probed independently and in no
//! particular order. Each probe parks its half under the gate lock; whichever
//! completes second builds the [`Rproc`] operation set and publishes it. The
//! published set is never replaced. Every hook checks for it and fails fast
//! with `NotReady` when it is missing.

use spin::mutex::TicketMutex;
use spin::Once;

use crate::arch::traits::{HostIrq, Platform};
use crate::config::RprocConfig;
use crate::dtb::{MfisNode, RprocNode};
use crate::error::{Result, RprocError};
use crate::mfis::Mfis;
use crate::platform::MFIS_MAX_CHANNELS;
use crate::rproc::rtable::RsrcTable;
use crate::rproc::{Rproc, Services};
use crate::smccc::SmcRegs;
use crate::DomainId;

/// Administrative (domain control) commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domctl {
    /// Give the domain exclusive use of MFIS channel `chan_id`.
    EnableRproc { chan_id: i32 },
    /// Some other domctl; not ours.
    Other(u32),
}

/// Halves collected before publication.
struct Pending<P: Platform> {
    mfis: Option<Mfis<P::Regs>>,
    table: Option<RsrcTable>,
    services: Option<Services<P>>,
    config: RprocConfig,
    mfis_probed: bool,
    table_probed: bool,
}

pub struct RprocGate<P: Platform> {
    pending: TicketMutex<Pending<P>>,
    ops: Once<Rproc<P>>,
}

impl<P: Platform> RprocGate<P> {
    pub fn new(services: Services<P>, config: RprocConfig) -> Self {
        Self {
            pending: TicketMutex::new(Pending {
                mfis: None,
                table: None,
                services: Some(services),
                config,
                mfis_probed: false,
                table_probed: false,
            }),
            ops: Once::new(),
        }
    }

    /// MFIS probe. A failed probe may be retried. Fails with
    /// `OutOfChannels` if an already parsed table has more vdevs than the
    /// block has channels; no irq is requested then.
    pub fn probe_mfis<I: HostIrq>(&self, regs: P::Regs, node: &MfisNode, host: &I) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.mfis_probed {
            return Err(RprocError::AlreadyProbed);
        }
        let chan_cnt = node.chan_cnt.min(MFIS_MAX_CHANNELS);
        if let Some(table) = &pending.table {
            if table.vdev_count() > chan_cnt {
                log::error!(
                    target: "rproc",
                    "{} vdevs but only {} MFIS channels",
                    table.vdev_count(),
                    chan_cnt
                );
                return Err(RprocError::OutOfChannels);
            }
        }
        let mfis = Mfis::probe(regs, node, host)?;
        pending.mfis = Some(mfis);
        pending.mfis_probed = true;
        self.try_publish(&mut pending);
        Ok(())
    }

    /// Resource table probe. `page` is the mapped table page. Once the MFIS
    /// block is up, the table may not hold more vdevs than it has channels.
    pub fn probe_rproc(&self, page: &'static mut [u8], node: &RprocNode) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.table_probed {
            return Err(RprocError::AlreadyProbed);
        }
        let max_channels = pending
            .mfis
            .as_ref()
            .map_or(MFIS_MAX_CHANNELS, |mfis| mfis.chan_cnt());
        let table = RsrcTable::probe(page, node.len, max_channels)?;
        pending.table = Some(table);
        pending.table_probed = true;
        self.try_publish(&mut pending);
        Ok(())
    }

    fn try_publish(&self, pending: &mut Pending<P>) {
        if pending.mfis.is_none() || pending.table.is_none() {
            return;
        }
        let (Some(mfis), Some(table), Some(services)) =
            (pending.mfis.take(), pending.table.take(), pending.services.take())
        else {
            return;
        };
        let config = pending.config;
        self.ops
            .call_once(|| Rproc::new(mfis, table, services, config));
        log::info!(target: "rproc", "rproc ops installed");
    }

    pub fn is_ready(&self) -> bool {
        self.ops.is_completed()
    }

    /// The published operation set.
    pub fn ops(&self) -> Result<&Rproc<P>> {
        self.ops.get().ok_or(RprocError::NotReady)
    }

    /// Guest SMC trap. Returns `false` when the call is not handled here.
    pub fn handle_smc(&self, domain: DomainId, regs: &mut SmcRegs) -> bool {
        match self.ops() {
            Ok(ops) => ops.handle_smc(domain, regs),
            Err(_) => {
                log::debug!(target: "rproc", "not initialized, SMC {:#x} left to others", regs.x0);
                false
            }
        }
    }

    pub fn do_domctl(&self, domain: DomainId, cmd: Domctl) -> Result<()> {
        match cmd {
            Domctl::EnableRproc { chan_id } => {
                let ops = self.ops().map_err(|err| {
                    log::warn!(target: "rproc", "d{}: enable rproc before init", domain);
                    err
                })?;
                let chan =
                    usize::try_from(chan_id).map_err(|_| RprocError::InvalidChannelId(chan_id))?;
                ops.assign(domain, chan)
            }
            Domctl::Other(_) => Err(RprocError::NotSupported),
        }
    }

    /// Domain teardown. Releases whatever the domain held, if anything.
    pub fn domain_destroy(&self, domain: DomainId) {
        if let Ok(ops) = self.ops() {
            ops.remove(domain);
        }
    }

    /// Host interrupt on one of the MFIS lines.
    pub fn handle_irq(&self, irq: u32) {
        match self.ops() {
            Ok(ops) => ops.on_irq(irq),
            Err(_) => log::warn!(target: "mfis", "irq {} before init, dropped", irq),
        }
    }
}
