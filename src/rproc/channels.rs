//! Channel binding table: which guest owns which MFIS channel.
//!
//! The interrupt handler reads the table without locking, so each slot is an
//! atomic holding the bound domain id. Writers (assign/remove, control path
//! only) serialize on a ticket lock so the check-then-bind sequence is atomic
//! with respect to each other.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::mutex::TicketMutex;

use crate::error::{Result, RprocError};
use crate::platform::MFIS_MAX_CHANNELS;
use crate::DomainId;

const UNBOUND: u32 = u32::MAX;

/// A (guest, channel) pair currently in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestBinding {
    pub domain: DomainId,
    pub channel: usize,
}

pub struct ChannelTable {
    bound: [AtomicU32; MFIS_MAX_CHANNELS],
    /// Channels that exist in hardware and have a vdev.
    bindable: usize,
    update: TicketMutex<()>,
}

impl ChannelTable {
    pub fn new(chan_cnt: usize, vdev_cnt: usize) -> Self {
        Self {
            bound: core::array::from_fn(|_| AtomicU32::new(UNBOUND)),
            bindable: chan_cnt.min(vdev_cnt).min(MFIS_MAX_CHANNELS),
            update: TicketMutex::new(()),
        }
    }

    pub fn bindable(&self) -> usize {
        self.bindable
    }

    /// Guest bound to `chan`, if any.
    pub fn bound_domain(&self, chan: usize) -> Option<DomainId> {
        if chan >= self.bindable {
            return None;
        }
        match self.bound[chan].load(Ordering::Acquire) {
            UNBOUND => None,
            id => Some(DomainId(id as u16)),
        }
    }

    /// Channel held by `domain`. A domain holds at most one.
    pub fn find_channel(&self, domain: DomainId) -> Option<usize> {
        (0..self.bindable).find(|&chan| self.bound_domain(chan) == Some(domain))
    }

    /// Bind `domain` to `chan`. `on_bind` runs under the table lock before a
    /// new binding becomes visible; if it fails nothing is recorded.
    /// Re-binding the same pair succeeds without calling `on_bind`.
    pub fn assign<F>(&self, domain: DomainId, chan: usize, on_bind: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        if chan >= self.bindable {
            return Err(RprocError::NoSuchChannel(chan));
        }

        let _guard = self.update.lock();

        match self.bound_domain(chan) {
            Some(owner) if owner == domain => return Ok(()),
            Some(owner) => {
                return Err(RprocError::AlreadyBound {
                    channel: chan,
                    domain: owner,
                })
            }
            None => {}
        }

        if let Some(held) = self.find_channel(domain) {
            return Err(RprocError::AlreadyBound {
                channel: held,
                domain,
            });
        }

        on_bind()?;
        self.bound[chan].store(domain.0 as u32, Ordering::Release);
        Ok(())
    }

    /// Drop the binding of `domain`. Returns the channel it held.
    pub fn remove(&self, domain: DomainId) -> Option<usize> {
        let _guard = self.update.lock();
        let chan = self.find_channel(domain)?;
        self.bound[chan].store(UNBOUND, Ordering::Release);
        Some(chan)
    }

    pub fn bindings(&self) -> impl Iterator<Item = GuestBinding> + '_ {
        (0..self.bindable).filter_map(move |channel| {
            self.bound_domain(channel)
                .map(|domain| GuestBinding { domain, channel })
        })
    }
}
