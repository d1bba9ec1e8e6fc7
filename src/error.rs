//! Error taxonomy for the remoteproc pass-through.
//!
//! Probe-time errors abort only this subsystem's setup. Per-call protocol
//! errors never leave the SMC dispatcher; they are turned into guest result
//! codes there.

use thiserror::Error;

use crate::DomainId;

pub const EINVAL: i32 = 22;
pub const EBUSY: i32 = 16;
pub const ENODEV: i32 = 19;
pub const ENOENT: i32 = 2;
pub const ENOSYS: i32 = 38;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RprocError {
    /// MFIS or resource table not probed yet.
    #[error("remoteproc is not initialized")]
    NotReady,
    #[error("no such channel {0}")]
    NoSuchChannel(usize),
    #[error("invalid channel id {0}")]
    InvalidChannelId(i32),
    #[error("channel {channel} conflicts with binding of domain {domain}")]
    AlreadyBound { channel: usize, domain: DomainId },
    #[error("vdev has no vring {0}")]
    InvalidRing(usize),
    #[error("domain holds no channel")]
    NoBinding,
    /// Previous doorbell still pending in hardware.
    #[error("doorbell busy")]
    Busy,
    #[error("guest address {0:#x} is not usable for a vring")]
    InvalidAddress(u64),
    #[error("machine address {0:#x} is above the companion's DMA limit")]
    AddressOutOfRange(u64),
    #[error("unsupported resource table version {0}")]
    UnsupportedFormat(u32),
    #[error("more vdev entries than channels")]
    OutOfChannels,
    #[error("resource table entry out of bounds")]
    MalformedTable,
    #[error("resource table of {0} bytes does not fit into a page")]
    TableTooLarge(u64),
    #[error("missing device-tree property {0}")]
    MissingProperty(&'static str),
    #[error("channel index {index} maps to id {id}")]
    UnsupportedChannelMap { index: usize, id: u32 },
    #[error("can't get irq {0}")]
    IrqUnavailable(u32),
    #[error("virtual interrupt: {0}")]
    Virq(&'static str),
    #[error("device already probed")]
    AlreadyProbed,
    #[error("operation not supported")]
    NotSupported,
}

impl RprocError {
    /// Negative errno returned to the domain-control caller.
    pub fn errno(&self) -> i32 {
        match self {
            RprocError::NotReady => -ENODEV,
            RprocError::NoBinding => -ENOENT,
            RprocError::AlreadyBound { .. } | RprocError::Busy => -EBUSY,
            RprocError::NotSupported => -ENOSYS,
            _ => -EINVAL,
        }
    }
}

pub type Result<T> = core::result::Result<T, RprocError>;
