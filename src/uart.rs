//! PL011 UART console and the `log` backend on top of it
//!
//! Everything in this crate logs through the `log` facade; the hypervisor
//! points it at its console once with [`init_logger`].

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::mutex::TicketMutex;
use spin::Once;

use crate::arch::aarch64::MmioBlock;
use crate::arch::traits::MmioRegs;

/// PL011 registers
const UART_DR: usize = 0x00; // Data Register
const UART_FR: usize = 0x18; // Flag Register

/// Flag Register bits
const UART_FR_TXFF: u32 = 1 << 5; // Transmit FIFO full

/// Size of the PL011 register window.
pub const PL011_WINDOW: usize = 0x1000;

/// Polled, transmit-only PL011.
pub struct Pl011Console<R: MmioRegs> {
    regs: R,
}

impl<R: MmioRegs> Pl011Console<R> {
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Write a byte to the UART
    pub fn putc(&self, c: u8) {
        // Wait until TX FIFO is not full
        while self.regs.read32(UART_FR) & UART_FR_TXFF != 0 {
            core::hint::spin_loop();
        }
        self.regs.write32(UART_DR, c as u32);
    }

    pub fn puts(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.putc(b'\r');
            }
            self.putc(byte);
        }
    }
}

impl<R: MmioRegs> fmt::Write for Pl011Console<R> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}

/// `log` backend writing one line per record to `W`.
pub struct UartLogger<W> {
    out: TicketMutex<W>,
    level: LevelFilter,
}

impl<W: Write + Send> UartLogger<W> {
    pub const fn new(out: W, level: LevelFilter) -> Self {
        Self {
            out: TicketMutex::new(out),
            level,
        }
    }

    /// Hand the writer back, e.g. to inspect captured output.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Error => "[ERROR]",
        Level::Warn => "[WARN ]",
        Level::Info => "[INFO ]",
        Level::Debug => "[DEBUG]",
        Level::Trace => "[TRACE]",
    }
}

impl<W: Write + Send> Log for UartLogger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut out = self.out.lock();
        let _ = writeln!(
            out,
            "{} {}: {}",
            level_str(record.level()),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: Once<UartLogger<Pl011Console<MmioBlock>>> = Once::new();

/// Route the `log` facade to the PL011 at `base`. Later calls are ignored.
///
/// # Safety
///
/// `base` must be the PL011 register window, mapped at EL2.
pub unsafe fn init_logger(base: usize, level: LevelFilter) {
    let logger = LOGGER.call_once(|| {
        // SAFETY: guaranteed by the caller.
        let regs = unsafe { MmioBlock::new(base, PL011_WINDOW) };
        UartLogger::new(Pl011Console::new(regs), level)
    });
    log::set_logger(logger)
        .map(|()| log::set_max_level(level))
        .ok();
}
