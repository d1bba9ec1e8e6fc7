//! R-Car remoteproc pass-through for an EL2 hypervisor.
//!
//! Lets guests drive the companion Cortex-R processor through the MFIS
//! doorbells and the firmware's rpmsg resource table, one channel per
//! guest.

#![cfg_attr(not(test), no_std)]

use core::fmt;

pub mod arch;
pub mod config;
pub mod dtb;
pub mod error;
pub mod gate;
pub mod mfis;
pub mod mm;
pub mod platform;
pub mod rproc;
pub mod smccc;
pub mod uart;

pub use config::RprocConfig;
pub use error::{Result, RprocError};
pub use gate::{Domctl, RprocGate};
pub use rproc::{Rproc, Services};
pub use smccc::SmcRegs;

/// Hypervisor domain (guest) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainId(pub u16);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
