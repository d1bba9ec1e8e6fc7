//! MFIS (Multifunctional Interface) interrupt multiplexer driver.
//!
//! Each channel has an inter-core interrupt control register (IICR) used as
//! the doorbell towards the companion processor, and an external interrupt
//! control register (EICR) latching doorbells coming back. All register
//! traffic goes through one lock: the doorbell path and the irq path both
//! touch per-channel registers.

use spin::mutex::TicketMutex;

use crate::arch::traits::{HostIrq, MmioRegs};
use crate::dtb::MfisNode;
use crate::error::{Result, RprocError};
use crate::platform::MFIS_MAX_CHANNELS;

/// Doorbell register of channel `k`.
pub const fn mfis_iicr(k: usize) -> usize {
    0x1400 + 0x1008 * k
}

/// Incoming interrupt status/clear register of channel `i`.
pub const fn mfis_eicr(i: usize) -> usize {
    0x9404 + 0x8 * i
}

/// IICR: doorbell raised and not yet consumed by the companion.
pub const MFIS_IICR_BUSY: u32 = 1 << 0;
/// EICR: interrupt pending.
pub const MFIS_EICR_PENDING: u32 = 1 << 0;

pub struct Mfis<R: MmioRegs> {
    regs: TicketMutex<R>,
    chan_cnt: usize,
    irqs: [u32; MFIS_MAX_CHANNELS],
}

impl<R: MmioRegs> Mfis<R> {
    /// Bring up the block described by `node`, requesting one host irq per
    /// channel. Any irq already requested is released if probing fails.
    pub fn probe<I: HostIrq>(regs: R, node: &MfisNode, host: &I) -> Result<Self> {
        let chan_cnt = node.chan_cnt.min(MFIS_MAX_CHANNELS);
        log::info!(target: "mfis", "found {} channels", chan_cnt);

        let mut irqs = [0u32; MFIS_MAX_CHANNELS];
        for i in 0..chan_cnt {
            let chan_id = node.chan_ids[i];
            let irq = node.irqs[i];

            let requested = if chan_id as usize != i {
                log::error!(target: "mfis", "setup where index {} != chan_id {} is not supported", i, chan_id);
                Err(RprocError::UnsupportedChannelMap { index: i, id: chan_id })
            } else if irq == 0 {
                log::error!(target: "mfis", "can't get irq for chan {}", chan_id);
                Err(RprocError::IrqUnavailable(irq))
            } else {
                host.request_irq(irq).map_err(|e| {
                    log::error!(target: "mfis", "can't request irq {} for chan {}: {}", irq, chan_id, e);
                    RprocError::IrqUnavailable(irq)
                })
            };

            if let Err(err) = requested {
                for &irq in &irqs[..i] {
                    host.release_irq(irq);
                }
                return Err(err);
            }

            log::info!(target: "mfis", "chan {} irq {}", chan_id, irq);
            irqs[i] = irq;
        }

        Ok(Self {
            regs: TicketMutex::new(regs),
            chan_cnt,
            irqs,
        })
    }

    pub fn chan_cnt(&self) -> usize {
        self.chan_cnt
    }

    pub fn irq(&self, chan: usize) -> Option<u32> {
        (chan < self.chan_cnt).then(|| self.irqs[chan])
    }

    pub fn channel_for_irq(&self, irq: u32) -> Option<usize> {
        self.irqs[..self.chan_cnt].iter().position(|&i| i == irq)
    }

    /// Raise the doorbell of `chan`. Fails with `Busy` while the previous
    /// one is still pending; the register is left untouched then.
    pub fn ring(&self, chan: usize) -> Result<()> {
        if chan >= self.chan_cnt {
            return Err(RprocError::NoSuchChannel(chan));
        }
        let regs = self.regs.lock();
        if regs.read32(mfis_iicr(chan)) & MFIS_IICR_BUSY != 0 {
            return Err(RprocError::Busy);
        }
        regs.write32(mfis_iicr(chan), MFIS_IICR_BUSY);
        Ok(())
    }

    /// Acknowledge `irq` in hardware. Returns the channel whose pending flag
    /// was cleared, or `None` for a spurious interrupt.
    pub fn ack(&self, irq: u32) -> Option<usize> {
        let Some(chan) = self.channel_for_irq(irq) else {
            log::warn!(target: "mfis", "irq {} does not belong to any channel", irq);
            return None;
        };

        let regs = self.regs.lock();
        let val = regs.read32(mfis_eicr(chan));
        if val & MFIS_EICR_PENDING == 0 {
            log::warn!(target: "mfis", "spurious irq for chan {}", chan);
            return None;
        }
        regs.write32(mfis_eicr(chan), val & !MFIS_EICR_PENDING);
        Some(chan)
    }
}
