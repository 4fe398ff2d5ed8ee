//! Command ring: submit host→device control commands and await
//! completion. A thin, `Copy`-friendly view constructed on demand by
//! [`crate::device::XmmDevice`] rather than a long-lived owner of its
//! own lifetime parameter — `ControlPage` and `Bar` are themselves
//! `Copy` handles, so there is nothing expensive about rebuilding this
//! view per call.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::control_page::{CmdRingEntry, ControlPage, CMD_FLAG_READY, CMD_RING_SIZE};
use crate::error::{DriverError, DriverResult};
use crate::hal::Clock;
use crate::regs::{self, Bar};

/// 1 second, matching `xmm7360_cmd_ring_wait`'s `msecs_to_jiffies(1000)`.
pub const COMMAND_TIMEOUT_US: u64 = 1_000_000;
/// Poll granularity while waiting; short enough that the 1 s budget is
/// observed with good precision, long enough not to hammer the cache
/// line the device is also touching.
const POLL_SLICE_US: u64 = 50;

pub struct CommandRing<'a> {
    pub cp: ControlPage,
    pub bar0: Bar,
    pub bar2: Bar,
    pub error: &'a AtomicBool,
}

impl<'a> CommandRing<'a> {
    /// Mirrors `xmm7360_poll`: either the status word going to the crash
    /// sentinel or the steady-state register reading anything but ready
    /// latches the device as gone.
    fn poll_status(&self) {
        if self.cp.status_code() == regs::STATUS_CRASHED
            || self.bar2.read(regs::bar2::STATUS) != regs::STATUS_READY
        {
            self.error.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) fn ding(&self, bell: u32) {
        if self.cp.status_asleep() {
            self.bar0.write(regs::bar0::WAKEUP, 1);
        }
        self.bar0.write(regs::bar0::DOORBELL, bell);
        self.poll_status();
    }

    fn is_gone(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }

    /// Reserve the slot at the local `wptr`, fill it, flip `READY`, and
    /// ring the command doorbell. Fails with [`DriverError::Busy`] if the
    /// ring is full, [`DriverError::DeviceGone`] if already latched dead.
    pub fn submit(&self, cmd: u8, parm: u8, len: u16, ptr: u64, extra: u32) -> DriverResult<()> {
        if self.is_gone() {
            return Err(DriverError::DeviceGone);
        }

        let wptr = self.cp.c_wptr() as usize % CMD_RING_SIZE;
        let new_wptr = (wptr + 1) % CMD_RING_SIZE;
        if new_wptr as u32 == self.cp.c_rptr() {
            return Err(DriverError::Busy);
        }

        self.cp.write_cmd_entry(
            wptr,
            CmdRingEntry {
                ptr,
                len,
                parm,
                cmd,
                extra,
                unk: 0,
                flags: CMD_FLAG_READY,
            },
        );
        self.cp.set_c_wptr(new_wptr as u32);
        self.ding(regs::DOORBELL_CMD);
        Ok(())
    }

    /// Block until `c_rptr == c_wptr` or the device errors, with a
    /// [`COMMAND_TIMEOUT_US`] budget. No real wait-queue is available,
    /// so this polls in [`POLL_SLICE_US`] slices via the clock.
    pub fn wait<C: Clock>(&self, clock: &C) -> DriverResult<()> {
        let deadline = clock.now_us() + COMMAND_TIMEOUT_US;
        loop {
            if self.is_gone() {
                return Err(DriverError::DeviceGone);
            }
            if self.cp.c_rptr() == self.cp.c_wptr() {
                return Ok(());
            }
            if clock.now_us() >= deadline {
                return Err(DriverError::Timeout);
            }
            clock.delay_us(POLL_SLICE_US);
        }
    }

    /// `submit` followed by `wait`. The only externally exposed entry
    /// point; callers must already hold whatever lock serializes
    /// submission (the QP lock during ring create/destroy, or sole
    /// ownership during init).
    pub fn execute<C: Clock>(&self, clock: &C, cmd: u8, parm: u8, len: u16, ptr: u64, extra: u32) -> DriverResult<()> {
        self.submit(cmd, parm, len, ptr, extra)?;
        self.wait(clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockModem;

    #[test]
    fn execute_succeeds_when_device_drains_ring() {
        let modem = MockModem::new();
        let ring = modem.command_ring();
        ring.submit(crate::control_page::CMD_WAKEUP, 0, 1, 0, 0).unwrap();
        modem.advance_command_ring();
        ring.wait(&modem.clock).unwrap();
    }

    #[test]
    fn execute_times_out_when_device_never_drains() {
        let modem = MockModem::new();
        let ring = modem.command_ring();
        ring.submit(crate::control_page::CMD_WAKEUP, 0, 1, 0, 0).unwrap();
        // Device never advances c_rptr.
        let result = ring.wait(&modem.clock);
        assert_eq!(result, Err(DriverError::Timeout));
    }

    #[test]
    fn submit_reports_busy_when_ring_full() {
        let modem = MockModem::new();
        let ring = modem.command_ring();
        for _ in 0..CMD_RING_SIZE - 1 {
            ring.submit(crate::control_page::CMD_RING_FLUSH, 0, 0, 0, 0).unwrap();
        }
        let result = ring.submit(crate::control_page::CMD_RING_FLUSH, 0, 0, 0, 0);
        assert_eq!(result, Err(DriverError::Busy));
    }

    #[test]
    fn crashed_status_latches_device_gone() {
        let modem = MockModem::new();
        let ring = modem.command_ring();
        ring.submit(crate::control_page::CMD_WAKEUP, 0, 1, 0, 0).unwrap();
        modem.crash();
        let result = ring.wait(&modem.clock);
        assert_eq!(result, Err(DriverError::DeviceGone));
    }
}
