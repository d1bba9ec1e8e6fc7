//! Host-side fakes for the collaborator traits, plus builders for resource
//! tables and device-tree blobs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rproc_mediator::arch::traits::*;
use rproc_mediator::config::RprocConfig;
use rproc_mediator::dtb::{MfisNode, RprocNode};
use rproc_mediator::platform::{MFIS_MAX_CHANNELS, PAGE_SIZE};
use rproc_mediator::rproc::rtable::{RsrcTable, RSC_TABLE_VERSION, RSC_VDEV};
use rproc_mediator::{DomainId, RprocGate, Services};

pub const DOM_A: DomainId = DomainId(1);
pub const DOM_B: DomainId = DomainId(2);

// ── Register file ────────────────────────────────────────────────────

/// Sparse 32-bit register file. Clones share state, so a test keeps one
/// handle while the driver owns another.
#[derive(Clone, Default)]
pub struct FakeRegs {
    values: Arc<Mutex<HashMap<usize, u32>>>,
    writes: Arc<Mutex<Vec<(usize, u32)>>>,
}

impl FakeRegs {
    pub fn get(&self, offset: usize) -> u32 {
        self.values.lock().unwrap().get(&offset).copied().unwrap_or(0)
    }

    /// Set a register as the hardware would, without recording a write.
    pub fn set(&self, offset: usize, value: u32) {
        self.values.lock().unwrap().insert(offset, value);
    }

    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.writes.lock().unwrap().clone()
    }
}

impl MmioRegs for FakeRegs {
    fn read32(&self, offset: usize) -> u32 {
        self.get(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        self.writes.lock().unwrap().push((offset, value));
        self.values.lock().unwrap().insert(offset, value);
    }
}

// ── Host irq ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeHostIrq {
    pub requested: Mutex<Vec<u32>>,
    pub released: Mutex<Vec<u32>>,
    pub refuse: Option<u32>,
}

impl FakeHostIrq {
    pub fn refusing(irq: u32) -> Self {
        Self {
            refuse: Some(irq),
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<u32> {
        self.released.lock().unwrap().clone()
    }
}

impl HostIrq for FakeHostIrq {
    fn request_irq(&self, irq: u32) -> Result<(), &'static str> {
        if self.refuse == Some(irq) {
            return Err("irq in use");
        }
        self.requested.lock().unwrap().push(irq);
        Ok(())
    }

    fn release_irq(&self, irq: u32) {
        self.released.lock().unwrap().push(irq);
    }
}

// ── vGIC ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct VgicLog {
    reserved: Vec<(DomainId, u32)>,
    injected: Vec<(DomainId, u32)>,
    refuse_reserve: bool,
}

#[derive(Clone, Default)]
pub struct RecordingVgic {
    log: Arc<Mutex<VgicLog>>,
}

impl RecordingVgic {
    pub fn reserved(&self) -> Vec<(DomainId, u32)> {
        self.log.lock().unwrap().reserved.clone()
    }

    pub fn injected(&self) -> Vec<(DomainId, u32)> {
        self.log.lock().unwrap().injected.clone()
    }

    pub fn refuse_reserve(&self, refuse: bool) {
        self.log.lock().unwrap().refuse_reserve = refuse;
    }
}

impl VirqController for RecordingVgic {
    fn reserve_virq(&self, domain: DomainId, virq: u32) -> Result<(), &'static str> {
        let mut log = self.log.lock().unwrap();
        if log.refuse_reserve {
            return Err("virq taken");
        }
        log.reserved.push((domain, virq));
        Ok(())
    }

    fn inject_virq(&self, domain: DomainId, virq: u32) {
        self.log.lock().unwrap().injected.push((domain, virq));
    }
}

// ── Guest memory ─────────────────────────────────────────────────────

/// P2M of every test domain with per-page reference counts.
#[derive(Clone, Default)]
pub struct FakeMemory {
    p2m: Arc<Mutex<HashMap<(DomainId, u64), (Option<u64>, P2mType)>>>,
    refs: Arc<Mutex<HashMap<u64, i64>>>,
}

impl FakeMemory {
    /// Back guest frame `gfn` with machine frame `mfn`.
    pub fn map_ram(&self, domain: DomainId, gfn: u64, mfn: u64, p2mt: P2mType) {
        self.p2m
            .lock()
            .unwrap()
            .insert((domain, gfn), (Some(mfn << 12), p2mt));
    }

    /// Identity-mapped device memory: no page to reference.
    pub fn map_direct(&self, domain: DomainId, gfn: u64) {
        self.p2m
            .lock()
            .unwrap()
            .insert((domain, gfn), (None, P2mType::MmioDirect));
    }

    pub fn refcount(&self, maddr: u64) -> i64 {
        self.refs.lock().unwrap().get(&maddr).copied().unwrap_or(0)
    }

    pub fn total_refs(&self) -> i64 {
        self.refs.lock().unwrap().values().sum()
    }
}

pub struct FakePage {
    maddr: u64,
    refs: Arc<Mutex<HashMap<u64, i64>>>,
}

impl PageRef for FakePage {
    fn maddr(&self) -> u64 {
        self.maddr
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        *self.refs.lock().unwrap().entry(self.maddr).or_default() -= 1;
    }
}

impl GuestMemory for FakeMemory {
    type Page = FakePage;

    fn get_page(&self, domain: DomainId, gfn: u64) -> (Option<FakePage>, P2mType) {
        let Some(&(maddr, p2mt)) = self.p2m.lock().unwrap().get(&(domain, gfn)) else {
            return (None, P2mType::Invalid);
        };
        let page = maddr.map(|maddr| {
            *self.refs.lock().unwrap().entry(maddr).or_default() += 1;
            FakePage {
                maddr,
                refs: self.refs.clone(),
            }
        });
        (page, p2mt)
    }
}

// ── Dcache ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct CountingDcache {
    flushes: Arc<AtomicUsize>,
    last_len: Arc<AtomicUsize>,
}

impl CountingDcache {
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn last_len(&self) -> usize {
        self.last_len.load(Ordering::SeqCst)
    }
}

impl DcacheOps for CountingDcache {
    fn clean_and_invalidate(&self, region: &[u8]) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.last_len.store(region.len(), Ordering::SeqCst);
    }
}

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Regs = FakeRegs;
    type Memory = FakeMemory;
    type Vgic = RecordingVgic;
    type Cache = CountingDcache;
}

// ── Resource tables ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RingLayout {
    pub align: u32,
    pub num: u32,
    pub notifyid: u32,
}

pub const RING0: RingLayout = RingLayout { align: 0x1000, num: 256, notifyid: 0 };
pub const RING1: RingLayout = RingLayout { align: 0x1000, num: 256, notifyid: 1 };

/// Lays out a resource table the way remoteproc firmware does: header,
/// offset array, then the entries back to back.
pub struct TableBuilder {
    version: u32,
    entries: Vec<Vec<u8>>,
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            version: RSC_TABLE_VERSION,
            entries: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn vdev(mut self, id: u32, dfeatures: u32, gfeatures: u32, rings: &[RingLayout]) -> Self {
        let mut e = Vec::new();
        push_u32(&mut e, RSC_VDEV);
        push_u32(&mut e, id);
        push_u32(&mut e, 0); // notifyid
        push_u32(&mut e, dfeatures);
        push_u32(&mut e, gfeatures);
        push_u32(&mut e, 0); // config_len
        e.push(0); // status
        e.push(rings.len() as u8);
        e.extend_from_slice(&[0, 0]);
        for ring in rings {
            push_u32(&mut e, 0); // da
            push_u32(&mut e, ring.align);
            push_u32(&mut e, ring.num);
            push_u32(&mut e, ring.notifyid);
            push_u32(&mut e, 0); // pa
        }
        self.entries.push(e);
        self
    }

    /// An entry of `kind` with an opaque body.
    pub fn entry(mut self, kind: u32, body_len: usize) -> Self {
        let mut e = Vec::new();
        push_u32(&mut e, kind);
        e.resize(4 + body_len, 0xAA);
        self.entries.push(e);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut page = Vec::new();
        push_u32(&mut page, self.version);
        push_u32(&mut page, self.entries.len() as u32);
        push_u32(&mut page, 0);
        push_u32(&mut page, 0);

        let mut offset = 16 + 4 * self.entries.len();
        for e in &self.entries {
            push_u32(&mut page, offset as u32);
            offset += e.len();
        }
        for e in &self.entries {
            page.extend_from_slice(e);
        }
        assert!(page.len() <= PAGE_SIZE, "test table overflows the page");
        page.resize(PAGE_SIZE, 0);
        page
    }

    pub fn leak(&self) -> &'static mut [u8] {
        leak_page(self.build())
    }
}

pub fn leak_page(bytes: Vec<u8>) -> &'static mut [u8] {
    Box::leak(bytes.into_boxed_slice())
}

/// Little-endian word at `offset` of a table page.
pub fn u32_at(page: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(page[offset..offset + 4].try_into().unwrap())
}

// ── Probe inputs ─────────────────────────────────────────────────────

pub const MFIS_IRQ_BASE: u32 = 200;

/// MFIS node with channels `0..chan_cnt` and irqs 200, 201, ...
pub fn mfis_node(chan_cnt: usize) -> MfisNode {
    let mut chan_ids = [0u32; MFIS_MAX_CHANNELS];
    let mut irqs = [0u32; MFIS_MAX_CHANNELS];
    for i in 0..chan_cnt.min(MFIS_MAX_CHANNELS) {
        chan_ids[i] = i as u32;
        irqs[i] = MFIS_IRQ_BASE + i as u32;
    }
    MfisNode {
        base: 0xe626_0000,
        len: 0x1_0000,
        chan_cnt,
        chan_ids,
        irqs,
    }
}

pub fn rproc_node() -> RprocNode {
    RprocNode {
        base: 0x4000_0000,
        len: PAGE_SIZE as u64,
    }
}

/// Handles on every fake the gate gets built from.
pub struct Harness {
    pub gate: RprocGate<TestPlatform>,
    pub regs: FakeRegs,
    pub mem: FakeMemory,
    pub vgic: RecordingVgic,
    pub cache: CountingDcache,
    pub host: FakeHostIrq,
}

impl Harness {
    pub fn new(config: RprocConfig) -> Self {
        let mem = FakeMemory::default();
        let vgic = RecordingVgic::default();
        let cache = CountingDcache::default();
        let services = Services::<TestPlatform> {
            memory: mem.clone(),
            vgic: vgic.clone(),
            cache: cache.clone(),
        };
        Self {
            gate: RprocGate::new(services, config),
            regs: FakeRegs::default(),
            mem,
            vgic,
            cache,
            host: FakeHostIrq::default(),
        }
    }

    /// Gate with both halves probed: `chan_cnt` channels, `table` as the
    /// resource table.
    pub fn ready(chan_cnt: usize, table: &TableBuilder) -> Self {
        Self::ready_with(chan_cnt, table, RprocConfig::default())
    }

    pub fn ready_with(chan_cnt: usize, table: &TableBuilder, config: RprocConfig) -> Self {
        let h = Self::new(config);
        h.gate
            .probe_mfis(h.regs.clone(), &mfis_node(chan_cnt), &h.host)
            .unwrap();
        h.gate.probe_rproc(table.leak(), &rproc_node()).unwrap();
        assert!(h.gate.is_ready());
        h
    }
}

/// Parse a table built in a test, for the parser tests.
pub fn table_of(builder: &TableBuilder) -> RsrcTable {
    RsrcTable::probe(builder.leak(), PAGE_SIZE as u64, MFIS_MAX_CHANNELS).unwrap()
}

// ── Device tree blobs ────────────────────────────────────────────────

const FDT_MAGIC: u32 = 0xd00d_feed;
const FDT_BEGIN_NODE: u32 = 1;
const FDT_END_NODE: u32 = 2;
const FDT_PROP: u32 = 3;
const FDT_END: u32 = 9;

/// Minimal flattened device tree writer (version 17).
pub struct FdtBuilder {
    structure: Vec<u8>,
    strings: Vec<u8>,
}

fn push_be32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

pub fn cells(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

impl FdtBuilder {
    /// Root node with 2 address cells and 2 size cells already open.
    pub fn new() -> Self {
        let mut b = Self {
            structure: Vec::new(),
            strings: Vec::new(),
        };
        b.begin_node("");
        b.prop("#address-cells", &cells(&[2]));
        b.prop("#size-cells", &cells(&[2]));
        b
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        push_be32(&mut self.structure, FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        pad4(&mut self.structure);
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        push_be32(&mut self.structure, FDT_END_NODE);
        self
    }

    pub fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let nameoff = self.string_offset(name);
        push_be32(&mut self.structure, FDT_PROP);
        push_be32(&mut self.structure, value.len() as u32);
        push_be32(&mut self.structure, nameoff);
        self.structure.extend_from_slice(value);
        pad4(&mut self.structure);
        self
    }

    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.prop(name, &bytes)
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let needle: Vec<u8> = name.bytes().chain(Some(0)).collect();
        let mut start = 0;
        while start < self.strings.len() {
            let end = start
                + self.strings[start..]
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap()
                + 1;
            if self.strings[start..end] == needle[..] {
                return start as u32;
            }
            start = end;
        }
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(&needle);
        off
    }

    /// Close the root node and serialize.
    pub fn finish(mut self) -> Vec<u8> {
        self.end_node();
        push_be32(&mut self.structure, FDT_END);

        let header_len = 40;
        let rsvmap_len = 16;
        let off_rsvmap = header_len;
        let off_struct = off_rsvmap + rsvmap_len;
        let off_strings = off_struct + self.structure.len();
        let total = off_strings + self.strings.len();

        let mut blob = Vec::with_capacity(total);
        push_be32(&mut blob, FDT_MAGIC);
        push_be32(&mut blob, total as u32);
        push_be32(&mut blob, off_struct as u32);
        push_be32(&mut blob, off_strings as u32);
        push_be32(&mut blob, off_rsvmap as u32);
        push_be32(&mut blob, 17); // version
        push_be32(&mut blob, 16); // last_comp_version
        push_be32(&mut blob, 0); // boot_cpuid_phys
        push_be32(&mut blob, self.strings.len() as u32);
        push_be32(&mut blob, self.structure.len() as u32);
        blob.extend_from_slice(&[0u8; 16]);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }
}
