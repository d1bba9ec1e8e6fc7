//! Guest SMC dispatch for the MFIS and rpmsg vendor calls.
//!
//! Each handler fills the guest's result registers itself; the `Result` it
//! returns only feeds the debug log. Requests from a guest without a
//! channel are answered with a not-available code, never an error.

use crate::arch::traits::Platform;
use crate::error::{Result, RprocError};
use crate::smccc::*;
use crate::DomainId;

use super::rtable::MAX_VRINGS;
use super::Rproc;

impl<P: Platform> Rproc<P> {
    /// Serve a trapped SMC. Returns `false` if the function id is not ours,
    /// in which case `regs` is left untouched.
    pub fn handle_smc(&self, domain: DomainId, regs: &mut SmcRegs) -> bool {
        let (name, result) = match regs.function_id() {
            MFIS_SMC_TRIG => ("trigger", self.smc_trigger(domain, regs)),
            RPMSG_SMC_GET_VDEV_INFO => ("get_vdev_info", self.smc_get_vdev_info(domain, regs)),
            RPMSG_SMC_GET_VRING_INFO => ("get_vring_info", self.smc_get_vring_info(domain, regs)),
            RPMSG_SMC_SET_VRING_DATA => ("set_vring_data", self.smc_set_vring_data(domain, regs)),
            _ => return false,
        };
        if let Err(err) = result {
            log::debug!(target: "rproc", "d{}: {} failed: {}", domain, name, err);
        }
        true
    }

    fn smc_trigger(&self, domain: DomainId, regs: &mut SmcRegs) -> Result<()> {
        let result = self.trigger(domain);
        regs.x0 = match result {
            Ok(()) => ARM_SMCCC_SUCCESS,
            Err(RprocError::Busy) => MFIS_SMC_ERR_BUSY,
            Err(RprocError::NoBinding) => MFIS_SMC_ERR_NOT_AVAILABLE,
            Err(_) => ARM_SMCCC_ERR_UNKNOWN_FUNCTION,
        };
        result
    }

    fn smc_get_vdev_info(&self, domain: DomainId, regs: &mut SmcRegs) -> Result<()> {
        let vdev = self
            .find_channel(domain)
            .ok_or(RprocError::NoBinding)
            .and_then(|chan| self.table().vdev(chan).ok_or(RprocError::NoSuchChannel(chan)));

        match vdev {
            Ok(vdev) => {
                regs.x0 = ARM_SMCCC_SUCCESS;
                regs.x1 = vdev.id.get() as u64;
                regs.x2 = vdev.dfeatures.get() as u64;
                regs.x3 = vdev.gfeatures.get() as u64;
                Ok(())
            }
            Err(err) => {
                regs.x0 = RPROC_SMC_ERR_NOT_AVAILABLE;
                Err(err)
            }
        }
    }

    fn smc_get_vring_info(&self, domain: DomainId, regs: &mut SmcRegs) -> Result<()> {
        // 32-bit calling convention: only the low word carries arguments.
        let ring = regs.x1 as u32 as usize;

        let vring = self
            .find_channel(domain)
            .ok_or(RprocError::NoBinding)
            .and_then(|chan| {
                if ring >= MAX_VRINGS {
                    return Err(RprocError::InvalidRing(ring));
                }
                self.table().vring(chan, ring).ok_or(RprocError::InvalidRing(ring))
            });

        match vring {
            Ok(vring) => {
                regs.x0 = ARM_SMCCC_SUCCESS;
                regs.x1 = vring.align.get() as u64;
                regs.x2 = vring.num.get() as u64;
                regs.x3 = vring.notifyid.get() as u64;
                Ok(())
            }
            Err(err) => {
                regs.x0 = RPROC_SMC_ERR_NOT_AVAILABLE;
                Err(err)
            }
        }
    }

    fn smc_set_vring_data(&self, domain: DomainId, regs: &mut SmcRegs) -> Result<()> {
        let ring = regs.x1 as u32 as usize;
        let gpa = regs.x2;
        let notifyid = regs.x3 as u32;

        let result = self.set_vring_data(domain, ring, gpa, notifyid);
        regs.x0 = match result {
            Ok(()) => ARM_SMCCC_SUCCESS,
            Err(_) => RPROC_SMC_ERR_NOT_AVAILABLE,
        };
        result
    }
}
