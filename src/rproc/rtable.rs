//! Companion processor resource table.
//!
//! The firmware publishes a versioned table of typed entries in one page of
//! shared memory. Only `RSC_VDEV` entries matter here: each one becomes the
//! descriptor of the next MFIS channel. The page stays the single copy of
//! every vdev; guests update vring fields in place and the companion reads
//! them back through a non-coherent path.

use core::mem::size_of;

use spin::RwLock;
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::arch::traits::DcacheOps;
use crate::error::{Result, RprocError};
use crate::platform::{MFIS_MAX_CHANNELS, PAGE_SIZE};

#[allow(non_camel_case_types)]
type u32_le = zerocopy::U32<zerocopy::LittleEndian>;

pub const RSC_TABLE_VERSION: u32 = 1;

pub const RSC_CARVEOUT: u32 = 0;
pub const RSC_DEVMEM: u32 = 1;
pub const RSC_TRACE: u32 = 2;
pub const RSC_VDEV: u32 = 3;

/// Vrings per vdev this transport understands.
pub const MAX_VRINGS: usize = 2;

/// Driver has used its parts of the config, and is happy
pub const VIRTIO_CONFIG_S_DRIVER_OK: u8 = 4;

/// Table header. Followed by `num` little-endian u32 entry offsets.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ResourceTableHeader {
    pub ver: u32_le,
    pub num: u32_le,
    pub reserved: [u32_le; 2],
}

const_assert_eq!(size_of::<ResourceTableHeader>(), 16);

#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FwRscHdr {
    pub kind: u32_le,
}

const_assert_eq!(size_of::<FwRscHdr>(), 4);

/// `RSC_VDEV` body. Followed by `num_of_vrings` [`FwRscVdevVring`]s.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FwRscVdev {
    pub id: u32_le,
    pub notifyid: u32_le,
    pub dfeatures: u32_le,
    pub gfeatures: u32_le,
    pub config_len: u32_le,
    pub status: u8,
    pub num_of_vrings: u8,
    pub reserved: [u8; 2],
}

const_assert_eq!(size_of::<FwRscVdev>(), 24);

#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FwRscVdevVring {
    /// Device address of the ring, written by the hypervisor.
    pub da: u32_le,
    pub align: u32_le,
    /// Queue depth
    pub num: u32_le,
    pub notifyid: u32_le,
    pub pa: u32_le,
}

const_assert_eq!(size_of::<FwRscVdevVring>(), 20);

/// Location of a parsed vdev inside the table page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdevSlot {
    /// Byte offset of the `FwRscVdev` body.
    pub offset: usize,
    pub num_vrings: u8,
}

impl VdevSlot {
    fn vring_offset(&self, ring: usize) -> usize {
        self.offset + size_of::<FwRscVdev>() + ring * size_of::<FwRscVdevVring>()
    }
}

/// One decoded table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEntry {
    Carveout,
    DevMem,
    Trace,
    Vdev(VdevSlot),
    Unknown(u32),
}

/// Outcome of walking a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub entries_examined: usize,
    pub vdevs: [Option<VdevSlot>; MFIS_MAX_CHANNELS],
    pub vdev_count: usize,
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes = buf.get(offset..).ok_or(RprocError::MalformedTable)?;
    u32_le::read_from_prefix(bytes)
        .map(|(v, _)| v.get())
        .map_err(|_| RprocError::MalformedTable)
}

/// Decode the entry starting at `offset`.
pub fn decode_entry(buf: &[u8], offset: usize) -> Result<ResourceEntry> {
    let kind = read_u32(buf, offset)?;
    let entry = match kind {
        RSC_CARVEOUT => ResourceEntry::Carveout,
        RSC_DEVMEM => ResourceEntry::DevMem,
        RSC_TRACE => ResourceEntry::Trace,
        RSC_VDEV => {
            let body = offset + size_of::<FwRscHdr>();
            let bytes = buf.get(body..).ok_or(RprocError::MalformedTable)?;
            let (vdev, _) =
                FwRscVdev::read_from_prefix(bytes).map_err(|_| RprocError::MalformedTable)?;
            let num_vrings = vdev.num_of_vrings as usize;
            if num_vrings > MAX_VRINGS {
                log::error!(target: "rproc", "vdev {} has {} vrings", vdev.id.get(), num_vrings);
                return Err(RprocError::MalformedTable);
            }
            let slot = VdevSlot {
                offset: body,
                num_vrings: vdev.num_of_vrings,
            };
            if slot.vring_offset(num_vrings) > buf.len() {
                return Err(RprocError::MalformedTable);
            }
            ResourceEntry::Vdev(slot)
        }
        other => ResourceEntry::Unknown(other),
    };
    Ok(entry)
}

/// Walk the whole table. Vdevs are assigned channel slots in table order.
pub fn parse(buf: &[u8], max_channels: usize) -> Result<ParsedTable> {
    let (header, _) =
        ResourceTableHeader::read_from_prefix(buf).map_err(|_| RprocError::MalformedTable)?;

    let ver = header.ver.get();
    if ver != RSC_TABLE_VERSION {
        log::error!(target: "rproc", "unknown resource table version {}", ver);
        return Err(RprocError::UnsupportedFormat(ver));
    }

    let num = header.num.get() as usize;
    let offsets_end = num
        .checked_mul(size_of::<u32>())
        .and_then(|n| n.checked_add(size_of::<ResourceTableHeader>()))
        .ok_or(RprocError::MalformedTable)?;
    if offsets_end > buf.len() {
        log::error!(target: "rproc", "{} entries do not fit into the table", num);
        return Err(RprocError::MalformedTable);
    }

    log::info!(target: "rproc", "found {} entries", num);

    let max_channels = max_channels.min(MFIS_MAX_CHANNELS);
    let mut parsed = ParsedTable {
        entries_examined: 0,
        vdevs: [None; MFIS_MAX_CHANNELS],
        vdev_count: 0,
    };

    for entry in 0..num {
        let offset = read_u32(buf, size_of::<ResourceTableHeader>() + entry * 4)? as usize;
        parsed.entries_examined += 1;

        match decode_entry(buf, offset)? {
            // Nothing is reserved for these yet.
            ResourceEntry::Carveout | ResourceEntry::DevMem | ResourceEntry::Trace => {
                log::debug!(target: "rproc", "entry {} left unhandled, nothing reserved", entry);
            }
            ResourceEntry::Vdev(slot) => {
                if parsed.vdev_count == max_channels {
                    log::error!(target: "rproc", "no channel left for vdev entry {}", entry);
                    return Err(RprocError::OutOfChannels);
                }
                parsed.vdevs[parsed.vdev_count] = Some(slot);
                parsed.vdev_count += 1;
            }
            ResourceEntry::Unknown(kind) => {
                log::info!(target: "rproc", "found unknown entry {}. Skipping", kind);
            }
        }
    }

    Ok(parsed)
}

/// The mapped resource table and the channel -> vdev assignment.
pub struct RsrcTable {
    page: RwLock<&'static mut [u8]>,
    vdevs: [Option<VdevSlot>; MFIS_MAX_CHANNELS],
    vdev_count: usize,
    entries_examined: usize,
}

impl RsrcTable {
    /// Parse a firmware table of `len` bytes mapped at `page`, allowing at
    /// most `max_channels` vdevs. Nothing past `len` is read.
    pub fn probe(page: &'static mut [u8], len: u64, max_channels: usize) -> Result<Self> {
        if len > PAGE_SIZE as u64 {
            log::error!(target: "rproc", "resource table does not fit into page");
            return Err(RprocError::TableTooLarge(len));
        }
        let end = (len as usize).min(page.len());
        let parsed = parse(&page[..end], max_channels)?;
        Ok(Self::with_parsed(page, parsed))
    }

    pub fn from_page(page: &'static mut [u8], max_channels: usize) -> Result<Self> {
        let parsed = parse(&page[..], max_channels)?;
        Ok(Self::with_parsed(page, parsed))
    }

    fn with_parsed(page: &'static mut [u8], parsed: ParsedTable) -> Self {
        Self {
            page: RwLock::new(page),
            vdevs: parsed.vdevs,
            vdev_count: parsed.vdev_count,
            entries_examined: parsed.entries_examined,
        }
    }

    pub fn vdev_count(&self) -> usize {
        self.vdev_count
    }

    pub fn entries_examined(&self) -> usize {
        self.entries_examined
    }

    pub fn slot(&self, chan: usize) -> Option<VdevSlot> {
        self.vdevs.get(chan).copied().flatten()
    }

    /// Snapshot of the vdev bound to `chan`.
    pub fn vdev(&self, chan: usize) -> Option<FwRscVdev> {
        let slot = self.slot(chan)?;
        let page = self.page.read();
        FwRscVdev::read_from_prefix(&page[slot.offset..]).ok().map(|(v, _)| v)
    }

    /// Snapshot of vring `ring` of the vdev bound to `chan`.
    pub fn vring(&self, chan: usize, ring: usize) -> Option<FwRscVdevVring> {
        let slot = self.slot(chan)?;
        if ring >= slot.num_vrings as usize {
            return None;
        }
        let page = self.page.read();
        FwRscVdevVring::read_from_prefix(&page[slot.vring_offset(ring)..])
            .ok()
            .map(|(v, _)| v)
    }

    /// Publish a guest-configured vring. Ring 0 doubles as the driver-ready
    /// signal. The page is flushed before returning.
    pub fn set_vring<C: DcacheOps>(
        &self,
        chan: usize,
        ring: usize,
        da: u32,
        notifyid: u32,
        cache: &C,
    ) -> Result<()> {
        let slot = self.slot(chan).ok_or(RprocError::NoSuchChannel(chan))?;
        if ring >= slot.num_vrings as usize {
            return Err(RprocError::InvalidRing(ring));
        }

        let mut page = self.page.write();
        {
            let (vring, _) = FwRscVdevVring::mut_from_prefix(&mut page[slot.vring_offset(ring)..])
                .map_err(|_| RprocError::MalformedTable)?;
            vring.notifyid.set(notifyid);
            vring.da.set(da);
        }
        if ring == 0 {
            let (vdev, _) = FwRscVdev::mut_from_prefix(&mut page[slot.offset..])
                .map_err(|_| RprocError::MalformedTable)?;
            vdev.status |= VIRTIO_CONFIG_S_DRIVER_OK;
        }
        cache.clean_and_invalidate(&page[..]);
        Ok(())
    }

    /// Take the vdev of `chan` out of service: clear its status and ring
    /// addresses so the companion stops touching guest memory.
    pub fn reset_vdev<C: DcacheOps>(&self, chan: usize, cache: &C) {
        let Some(slot) = self.slot(chan) else {
            return;
        };
        let mut page = self.page.write();
        for ring in 0..slot.num_vrings as usize {
            if let Ok((vring, _)) =
                FwRscVdevVring::mut_from_prefix(&mut page[slot.vring_offset(ring)..])
            {
                vring.da.set(0);
            }
        }
        if let Ok((vdev, _)) = FwRscVdev::mut_from_prefix(&mut page[slot.offset..]) {
            vdev.status = 0;
        }
        cache.clean_and_invalidate(&page[..]);
    }
}
