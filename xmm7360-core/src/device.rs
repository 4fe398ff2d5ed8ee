//! Top-level device state: owns the register banks,
//! control page, all sixteen TD rings, all eight queue pairs, and the
//! network scheduler, generalized over the `Clock`/`DmaAllocator`/
//! `Logger`/`IpSink` seams so the same state machine runs against real
//! hardware or the `mock` harness. Shaped like `Vmxnet3Device` in
//! `drivers/vmware/vmxnet3.rs`: one struct, methods grouped by concern,
//! no separate owning wrapper per subsystem.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::cmd_ring::CommandRing;
use crate::control_page::{
    ControlPage, CMD_RING_CLOSE, CMD_RING_OPEN, CMD_WAKEUP, NUM_TD_RINGS, RING_OPEN_MAGIC,
};
use crate::drv_println;
use crate::error::{DriverError, DriverResult};
use crate::hal::{Clock, DmaAllocator, DmaRegion, IpSink};
use crate::logging::Logger;
use crate::mux;
use crate::net_sched::NetScheduler;
use crate::queue_pair::{Channel, QueuePairEntry};
use crate::regs::{self, Bar};
use crate::td_ring::TdRing;

pub const NUM_QUEUE_PAIRS: usize = 8;

struct QpRoleConfig {
    role: Channel,
    depth: u32,
    page_size: u32,
}

/// Channel assignments. QPs 5 and 6 are silent in the known
/// role table; treated as the same AT-port shape as their neighbors 4
/// and 7 (see DESIGN.md).
const QP_ROLES: [QpRoleConfig; NUM_QUEUE_PAIRS] = [
    QpRoleConfig { role: Channel::Network, depth: 128, page_size: 16384 },
    QpRoleConfig { role: Channel::Raw, depth: 16, page_size: 16384 },
    QpRoleConfig { role: Channel::Terminal, depth: 8, page_size: 4096 },
    QpRoleConfig { role: Channel::Raw, depth: 16, page_size: 16384 },
    QpRoleConfig { role: Channel::Terminal, depth: 8, page_size: 4096 },
    QpRoleConfig { role: Channel::Terminal, depth: 8, page_size: 4096 },
    QpRoleConfig { role: Channel::Terminal, depth: 8, page_size: 4096 },
    QpRoleConfig { role: Channel::Terminal, depth: 8, page_size: 4096 },
];

const NETWORK_QP: usize = 0;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PollFlags: u8 {
        const READABLE = 0b001;
        const WRITABLE = 0b010;
        const HANGUP   = 0b100;
    }
}

/// ~1s in 10ms steps, matching `xmm7360_cmd_ring_init`'s mode-change poll.
const MODE_POLL_TIMEOUT_US: u64 = 1_000_000;
const MODE_POLL_SLICE_US: u64 = 10_000;
/// 20s in 200ms steps, matching the probe routine's boot-status poll.
const BOOT_POLL_TIMEOUT_US: u64 = 20_000_000;
const BOOT_POLL_SLICE_US: u64 = 200_000;
/// Slice used while blocked in `qp_read` waiting for RX data.
const READ_POLL_SLICE_US: u64 = 200;

pub struct XmmDevice<C: Clock, A: DmaAllocator, L: Logger, S: IpSink> {
    bar0: Bar,
    bar2: Bar,
    cp: ControlPage,
    cp_region: DmaRegion,
    td: [TdRing; NUM_TD_RINGS],
    qp: [QueuePairEntry; NUM_QUEUE_PAIRS],
    error: AtomicBool,
    net: NetScheduler,
    clock: C,
    alloc: A,
    logger: L,
    ip_sink: S,
}

impl<C: Clock, A: DmaAllocator, L: Logger, S: IpSink> XmmDevice<C, A, L, S> {
    /// Builds device state without talking to hardware yet; call
    /// [`boot`](Self::boot) afterward to run the mode handshake.
    ///
    /// # Safety
    /// `bar0`/`bar2` must be live MMIO mappings of the device's BAR0 and
    /// BAR2 windows for the lifetime of the returned value.
    pub unsafe fn new(bar0: Bar, bar2: Bar, alloc: A, clock: C, logger: L, ip_sink: S) -> Self {
        let cp_region = alloc.alloc(ControlPage::SIZE, 8);
        let cp = ControlPage::new(cp_region);

        let td = core::array::from_fn(|i| TdRing::new(i as u8));
        let qp = core::array::from_fn(|i| {
            QueuePairEntry::new(i as u8, QP_ROLES[i].role, QP_ROLES[i].depth, QP_ROLES[i].page_size)
        });
        let net = NetScheduler::new(QP_ROLES[NETWORK_QP].page_size as usize, 0);

        Self {
            bar0,
            bar2,
            cp,
            cp_region,
            td,
            qp,
            error: AtomicBool::new(false),
            net,
            clock,
            alloc,
            logger,
            ip_sink,
        }
    }

    #[cfg(test)]
    pub fn test_control_page(&self) -> ControlPage {
        self.cp
    }

    #[cfg(test)]
    pub fn test_clock(&self) -> &C {
        &self.clock
    }

    fn command_ring(&self) -> CommandRing<'_> {
        CommandRing { cp: self.cp, bar0: self.bar0, bar2: self.bar2, error: &self.error }
    }

    fn ding(&self, bell: u32) {
        self.command_ring().ding(bell);
    }

    pub fn is_gone(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }

    /// Boot sequence: program the control page address, step the
    /// device through its two-phase mode handshake, wake it, then wait
    /// for the steady-state status word.
    pub fn boot(&self) -> DriverResult<()> {
        let phys = self.cp.phys();
        self.bar2.write(regs::bar2::CONTROL, phys as u32);
        self.bar2.write(regs::bar2::CONTROLH, (phys >> 32) as u32);

        self.bar0.write(regs::bar0::MODE, 1);
        self.poll_until(MODE_POLL_TIMEOUT_US, MODE_POLL_SLICE_US, || self.bar2.read(regs::bar2::MODE) != 0)?;

        self.bar2.write(regs::bar2::BLANK0, 0);
        self.bar2.write(regs::bar2::BLANK1, 0);
        self.bar2.write(regs::bar2::BLANK2, 0);
        self.bar2.write(regs::bar2::BLANK3, 0);

        self.bar0.write(regs::bar0::MODE, 2);
        self.poll_until(MODE_POLL_TIMEOUT_US, MODE_POLL_SLICE_US, || self.bar2.read(regs::bar2::MODE) == 2)?;

        self.command_ring().execute(&self.clock, CMD_WAKEUP, 0, 0, 0, 0)?;

        self.poll_until(BOOT_POLL_TIMEOUT_US, BOOT_POLL_SLICE_US, || {
            let status = self.bar2.read(regs::bar2::STATUS);
            if status == regs::STATUS_CRASHED {
                self.error.store(true, Ordering::SeqCst);
                true
            } else {
                status == regs::STATUS_READY
            }
        })?;

        if self.is_gone() {
            return Err(DriverError::DeviceGone);
        }
        drv_println!(&self.logger, "xmm7360: device ready");
        Ok(())
    }

    fn poll_until(&self, timeout_us: u64, slice_us: u64, mut done: impl FnMut() -> bool) -> DriverResult<()> {
        let deadline = self.clock.now_us() + timeout_us;
        loop {
            if done() {
                return Ok(());
            }
            if self.clock.now_us() >= deadline {
                return Err(DriverError::Timeout);
            }
            self.clock.delay_us(slice_us);
        }
    }

    // --- queue pair lifecycle ---

    pub fn qp_start(&self, index: usize) -> DriverResult<()> {
        let qp = &self.qp[index];
        if qp.is_open(&self.clock) {
            return Err(DriverError::Busy);
        }
        if self.is_gone() {
            return Err(DriverError::DeviceGone);
        }

        let tx_id = qp.tx_ring_id();
        let rx_id = qp.rx_ring_id();
        let tx_ring = &self.td[tx_id as usize];
        let rx_ring = &self.td[rx_id as usize];

        let tx_phys = tx_ring.prepare(qp.depth, qp.page_size, &self.alloc);
        self.cp.reset_ring_pointers(tx_id as usize);
        if let Err(e) = self.open_ring(tx_id, qp.depth, tx_phys) {
            tx_ring.teardown(&self.alloc);
            return Err(e);
        }

        let rx_phys = rx_ring.prepare(qp.depth, qp.page_size, &self.alloc);
        self.cp.reset_ring_pointers(rx_id as usize);
        if let Err(e) = self.open_ring(rx_id, qp.depth, rx_phys) {
            let _ = self.close_ring(tx_id);
            tx_ring.teardown(&self.alloc);
            rx_ring.teardown(&self.alloc);
            return Err(e);
        }

        rx_ring.prefill(&self.cp);
        self.ding(regs::DOORBELL_TD);
        qp.set_open(&self.clock, true);
        Ok(())
    }

    fn open_ring(&self, ring_id: u8, depth: u32, descs_phys: u64) -> DriverResult<()> {
        self.command_ring().execute(&self.clock, CMD_RING_OPEN, ring_id, depth as u16, descs_phys, RING_OPEN_MAGIC)
    }

    fn close_ring(&self, ring_id: u8) -> DriverResult<()> {
        self.command_ring().execute(&self.clock, CMD_RING_CLOSE, ring_id, 0, 0, 0)
    }

    pub fn qp_stop(&self, index: usize) -> DriverResult<()> {
        let qp = &self.qp[index];
        if !qp.is_open(&self.clock) {
            return Err(DriverError::NotOpen);
        }

        // Best-effort: a dead device can't ack a close, but we still
        // tear down host-side state.
        let _ = self.close_ring(qp.tx_ring_id());
        let _ = self.close_ring(qp.rx_ring_id());

        self.td[qp.tx_ring_id() as usize].teardown(&self.alloc);
        self.td[qp.rx_ring_id() as usize].teardown(&self.alloc);
        qp.set_open(&self.clock, false);
        Ok(())
    }

    // --- queue pair byte-stream ops ---

    pub fn qp_can_write(&self, index: usize) -> bool {
        let qp = &self.qp[index];
        qp.is_open(&self.clock) && !self.td[qp.tx_ring_id() as usize].is_full(&self.cp)
    }

    pub fn qp_has_data(&self, index: usize) -> bool {
        let qp = &self.qp[index];
        qp.is_open(&self.clock) && self.td[qp.rx_ring_id() as usize].has_data(&self.cp)
    }

    /// Single-descriptor write; returns `Ok(0)` (not an error) if the TX
    /// ring is momentarily full, matching the "0 bytes if TX full" contract.
    pub fn qp_write(&self, index: usize, bytes: &[u8]) -> DriverResult<usize> {
        if self.is_gone() {
            return Err(DriverError::DeviceGone);
        }
        let qp = &self.qp[index];
        if !qp.is_open(&self.clock) {
            return Err(DriverError::NotOpen);
        }
        let page_size = qp.page_size as usize;
        let n = bytes.len().min(page_size);
        match self.td[qp.tx_ring_id() as usize].write(&self.cp, &bytes[..n]) {
            Ok(()) => {
                self.ding(regs::DOORBELL_TD);
                Ok(n)
            }
            Err(DriverError::Busy) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn qp_try_read(&self, index: usize, out: &mut [u8]) -> DriverResult<Option<usize>> {
        if self.is_gone() {
            return Err(DriverError::DeviceGone);
        }
        let qp = &self.qp[index];
        if !qp.is_open(&self.clock) {
            return Err(DriverError::NotOpen);
        }
        if !self.td[qp.rx_ring_id() as usize].has_data(&self.cp) {
            return Ok(None);
        }
        let n = self.td[qp.rx_ring_id() as usize].read(&self.cp, out)?;
        Ok(Some(n))
    }

    /// Blocks until data arrives, the device is declared gone, or
    /// `cancelled` returns true (the stand-in for signal delivery, which
    /// lives outside this crate).
    pub fn qp_read(&self, index: usize, out: &mut [u8], mut cancelled: impl FnMut() -> bool) -> DriverResult<usize> {
        loop {
            if let Some(n) = self.qp_try_read(index, out)? {
                return Ok(n);
            }
            if cancelled() {
                return Err(DriverError::Interrupted);
            }
            self.clock.delay_us(READ_POLL_SLICE_US);
        }
    }

    pub fn qp_poll(&self, index: usize) -> PollFlags {
        if self.is_gone() {
            return PollFlags::HANGUP;
        }
        let mut flags = PollFlags::empty();
        if self.qp_has_data(index) {
            flags |= PollFlags::READABLE;
        }
        if self.qp_can_write(index) {
            flags |= PollFlags::WRITABLE;
        }
        flags
    }

    // --- network channel ---

    fn network_write(&self, bytes: &[u8]) -> bool {
        match self.td[self.qp[NETWORK_QP].tx_ring_id() as usize].write(&self.cp, bytes) {
            Ok(()) => {
                self.ding(regs::DOORBELL_TD);
                true
            }
            Err(_) => false,
        }
    }

    pub fn net_send(&self, payload: &[u8]) -> DriverResult<()> {
        if self.is_gone() {
            return Err(DriverError::DeviceGone);
        }
        let now = self.clock.now_us();
        self.net.enqueue(&self.clock, now, payload, |bytes| self.network_write(bytes))
    }

    pub fn net_deadline_us(&self) -> Option<u64> {
        self.net.deadline_us(&self.clock)
    }

    pub fn net_tick(&self) -> DriverResult<()> {
        let now = self.clock.now_us();
        self.net.flush_if_due(&self.clock, now, |bytes| self.network_write(bytes))
    }

    fn network_ingress(&self) {
        let mut buf = [0u8; 16384];
        while let Ok(Some(n)) = self.qp_try_read(NETWORK_QP, &mut buf) {
            let sink = &self.ip_sink;
            let result = mux::decode(&buf[..n], |packet| {
                if let Some(version) = mux::ip_version(packet) {
                    sink.deliver(version, packet);
                }
            });
            if result.is_err() {
                drv_println!(&self.logger, "xmm7360: dropped unrecognized mux frame");
            }
        }
    }

    // --- interrupt handling, kept inline rather than split into
    // a free function: it needs every field on `self`. ---

    /// Services one device interrupt. Re-checks device health, wakes
    /// every open queue pair, drains terminal channels, decodes network
    /// ingress, and retries a stalled network flush.
    pub fn handle_interrupt(&self) {
        self.command_ring().ding(0);
        if self.bar2.read(regs::bar2::STATUS) == regs::STATUS_CRASHED
            || self.cp.status_code() == regs::STATUS_CRASHED
        {
            self.error.store(true, Ordering::SeqCst);
        }

        for i in 0..NUM_QUEUE_PAIRS {
            let qp = &self.qp[i];
            if !qp.is_open(&self.clock) {
                continue;
            }
            qp.bump_generation();
            match qp.role {
                Channel::Terminal => self.drain_terminal(i),
                Channel::Network => {
                    self.network_ingress();
                    let _ = self.net.retry(&self.clock, |bytes| self.network_write(bytes));
                }
                Channel::Raw => {}
            }
        }
    }

    fn drain_terminal(&self, index: usize) {
        let mut buf = [0u8; 4096];
        while let Ok(Some(_)) = self.qp_try_read(index, &mut buf) {
            // The terminal/tty presentation itself is an external
            // collaborator; draining here only keeps the ring from
            // filling up between reads.
        }
    }

    pub fn teardown(&self) {
        self.error.store(true, Ordering::SeqCst);
        for i in 0..NUM_QUEUE_PAIRS {
            if self.qp[i].is_open(&self.clock) {
                let _ = self.qp_stop(i);
            }
        }
        self.alloc.free(self.cp_region);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::mock::{CapturingLogger, MockClock, MockDmaAllocator};
    use crate::regs::Bar;

    fn leak_bank(words: usize) -> Bar {
        let buf = std::vec![0u32; words].into_boxed_slice();
        unsafe { Bar::new(std::boxed::Box::into_raw(buf) as *mut u32) }
    }

    /// Pre-seeds bar2's mode/status registers as if the device had
    /// already stepped through its side of the handshake, and installs
    /// a clock tick hook that instantly acks the `WAKEUP` command, since
    /// nothing else plays the device's side of the command ring here
    /// (that handshake is exercised on its own in `cmd_ring`'s tests).
    #[test]
    fn cold_boot_against_a_pre_ready_device_succeeds() {
        let bar0 = leak_bank(64);
        let bar2 = leak_bank(64);
        bar2.write(regs::bar2::MODE, 2);
        bar2.write(regs::bar2::STATUS, regs::STATUS_READY);

        let alloc = MockDmaAllocator::new();
        let clock = MockClock::new();
        let logger = CapturingLogger::new();
        let dev = unsafe { XmmDevice::new(bar0, bar2, alloc, clock, logger, crate::hal::NullIpSink) };

        let cp = dev.test_control_page();
        dev.test_clock().set_tick_hook(move || cp.test_set_c_rptr(cp.c_wptr()));

        assert!(dev.boot().is_ok());
        assert!(!dev.is_gone());
    }

    #[test]
    fn crashed_status_during_boot_surfaces_device_gone() {
        let bar0 = leak_bank(64);
        let bar2 = leak_bank(64);
        bar2.write(regs::bar2::MODE, 2);
        bar2.write(regs::bar2::STATUS, regs::STATUS_CRASHED);

        let alloc = MockDmaAllocator::new();
        let clock = MockClock::new();
        let logger = CapturingLogger::new();
        let dev = unsafe { XmmDevice::new(bar0, bar2, alloc, clock, logger, crate::hal::NullIpSink) };
        assert_eq!(dev.boot().err(), Some(DriverError::DeviceGone));
    }

    /// Same pre-ready-device setup as `cold_boot_against_a_pre_ready_device_succeeds`,
    /// then boots all the way so `qp_start`/`qp_write`/`handle_interrupt` have a
    /// live command ring to execute `RING_OPEN`/`RING_CLOSE` against.
    fn boot_ready_device() -> XmmDevice<MockClock, MockDmaAllocator, CapturingLogger, crate::hal::NullIpSink> {
        let bar0 = leak_bank(64);
        let bar2 = leak_bank(64);
        bar2.write(regs::bar2::MODE, 2);
        bar2.write(regs::bar2::STATUS, regs::STATUS_READY);

        let alloc = MockDmaAllocator::new();
        let clock = MockClock::new();
        let logger = CapturingLogger::new();
        let dev = unsafe { XmmDevice::new(bar0, bar2, alloc, clock, logger, crate::hal::NullIpSink) };

        let cp = dev.test_control_page();
        dev.test_clock().set_tick_hook(move || cp.test_set_c_rptr(cp.c_wptr()));
        dev.boot().unwrap();
        dev
    }

    #[test]
    fn qp_start_write_stop_lifecycle() {
        let dev = boot_ready_device();

        assert!(dev.qp_start(1).is_ok());
        assert!(dev.qp_can_write(1));
        assert_eq!(dev.qp_write(1, b"hello").unwrap(), 5);

        assert_eq!(dev.qp_start(1).err(), Some(DriverError::Busy));
        assert!(dev.qp_stop(1).is_ok());
        assert_eq!(dev.qp_write(1, b"x").err(), Some(DriverError::NotOpen));
        assert_eq!(dev.qp_stop(1).err(), Some(DriverError::NotOpen));
    }

    #[test]
    fn crash_after_boot_propagates_device_gone_everywhere() {
        let dev = boot_ready_device();
        dev.qp_start(1).unwrap();

        dev.test_control_page().test_set_status_code(regs::STATUS_CRASHED);
        dev.handle_interrupt();

        assert!(dev.is_gone());
        assert_eq!(dev.qp_write(1, b"x").err(), Some(DriverError::DeviceGone));
        assert_eq!(dev.net_send(&[0x45, 0x00]).err(), Some(DriverError::DeviceGone));
        assert_eq!(dev.qp_poll(1), PollFlags::HANGUP);
    }

    #[test]
    fn net_send_arms_a_deadline_and_handle_interrupt_delivers_ingress() {
        let dev = boot_ready_device();
        assert_eq!(dev.net_deadline_us(), None);

        dev.net_send(&[0x45, 0x00, 0x00, 0x14]).unwrap();
        assert!(dev.net_deadline_us().is_some());

        // handle_interrupt drains terminal/network ingress without a real
        // modem on the other end; it must not panic on an empty RX ring.
        dev.handle_interrupt();
        assert!(!dev.is_gone());
    }
}
