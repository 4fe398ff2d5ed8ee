//! Network egress scheduler: coalesces outbound IP packets into
//! mux frames, flushing either when a frame can't fit another packet or
//! when a short deadline elapses. There is no OS timer service to hang
//! a callback off of, so the 100 µs deadline is a plain value the
//! embedder polls — `deadline_us()` plus `flush_if_due()` — the same
//! shape the reference userspace mux's `select()`-timeout loop uses,
//! inverted so the caller drives it instead of libc.

use crate::error::{DriverError, DriverResult};
use crate::hal::Clock;
use crate::mux::{Frame, TAG_ADBH};
use crate::sync::IrqSafeMutex;

pub const COALESCE_US: u64 = 100;

struct State {
    frame: Frame,
    sequence: u16,
    channel_extra: u16,
    deadline_us: Option<u64>,
    /// `finish_adth` has already run on `frame`; a retry must resend the
    /// same bytes rather than append another trailer.
    finished: bool,
    /// A push attempt returned "no room"; new packets are refused until
    /// `retry` succeeds.
    stopped: bool,
}

pub struct NetScheduler {
    state: IrqSafeMutex<State>,
}

impl NetScheduler {
    pub fn new(max_frame: usize, channel_extra: u16) -> Self {
        Self {
            state: IrqSafeMutex::new(State {
                frame: Frame::new(max_frame),
                sequence: 0,
                channel_extra,
                deadline_us: None,
                finished: false,
                stopped: false,
            }),
        }
    }

    pub fn deadline_us<C: Clock>(&self, clock: &C) -> Option<u64> {
        self.state.lock(clock).deadline_us
    }

    pub fn is_stopped<C: Clock>(&self, clock: &C) -> bool {
        self.state.lock(clock).stopped
    }

    /// Finishes and hands the current frame to `write` if it has
    /// anything queued. `write` returns whether the TX ring accepted it.
    fn try_push(st: &mut State, write: &mut dyn FnMut(&[u8]) -> bool) -> DriverResult<()> {
        if st.frame.n_packets() == 0 && !st.finished {
            st.deadline_us = None;
            return Ok(());
        }
        if !st.finished {
            st.frame.finish_adth(st.channel_extra)?;
            st.finished = true;
        }
        let bytes = st.frame.finish();
        if write(bytes) {
            st.sequence = st.sequence.wrapping_add(1);
            st.frame.reinit(st.sequence);
            st.finished = false;
            st.stopped = false;
            st.deadline_us = None;
            Ok(())
        } else {
            st.stopped = true;
            Err(DriverError::Busy)
        }
    }

    /// Appends `payload` to the current frame, forcing a flush first if
    /// it wouldn't fit. Arms the coalescing deadline on the first packet
    /// of a fresh frame. Returns **Busy** if the scheduler is currently
    /// stalled on backpressure (`retry` hasn't succeeded yet).
    pub fn enqueue<C: Clock>(
        &self,
        clock: &C,
        now_us: u64,
        payload: &[u8],
        mut write: impl FnMut(&[u8]) -> bool,
    ) -> DriverResult<()> {
        let mut st = self.state.lock(clock);
        if st.stopped {
            return Err(DriverError::Busy);
        }

        if st.frame.n_packets() == 0 {
            let sequence = st.sequence;
            st.frame.reinit(sequence);
            st.frame.add_tag(TAG_ADBH, 0, &[])?;
        }

        match st.frame.append_packet(payload) {
            Ok(()) => {}
            Err(DriverError::NoSpace) => {
                Self::try_push(&mut st, &mut write)?;
                let sequence = st.sequence;
                st.frame.reinit(sequence);
                st.frame.add_tag(TAG_ADBH, 0, &[])?;
                st.frame.append_packet(payload)?;
            }
            Err(e) => return Err(e),
        }

        if st.deadline_us.is_none() {
            st.deadline_us = Some(now_us + COALESCE_US);
        }
        Ok(())
    }

    /// Called from the embedder's tick/idle loop once `deadline_us` has
    /// elapsed.
    pub fn flush_if_due<C: Clock>(
        &self,
        clock: &C,
        now_us: u64,
        mut write: impl FnMut(&[u8]) -> bool,
    ) -> DriverResult<()> {
        let mut st = self.state.lock(clock);
        match st.deadline_us {
            Some(deadline) if now_us >= deadline => Self::try_push(&mut st, &mut write),
            _ => Ok(()),
        }
    }

    /// Called from the interrupt path once the TX ring has drained, to
    /// resend a frame that was previously refused.
    pub fn retry<C: Clock>(&self, clock: &C, mut write: impl FnMut(&[u8]) -> bool) -> DriverResult<()> {
        let mut st = self.state.lock(clock);
        if !st.stopped {
            return Ok(());
        }
        Self::try_push(&mut st, &mut write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClock;
    use crate::mux::decode;
    extern crate std;
    use std::vec::Vec as StdVec;

    #[test]
    fn single_packet_flushes_once_deadline_elapses() {
        let clock = MockClock::new();
        let sched = NetScheduler::new(4096, 0);
        sched.enqueue(&clock, clock.now_us(), &[0x45u8; 100], |_| true).unwrap();
        // Deadline hasn't elapsed yet: no-op.
        sched.flush_if_due(&clock, clock.now_us(), |_| true).unwrap();

        let mut pushed: StdVec<StdVec<u8>> = StdVec::new();
        sched
            .flush_if_due(&clock, clock.now_us() + COALESCE_US, |bytes| {
                decode(bytes, |p| pushed.push(p.to_vec())).unwrap();
                true
            })
            .unwrap();
        assert_eq!(pushed.len(), 1);
    }

    #[test]
    fn ten_packets_within_the_window_coalesce_into_one_frame() {
        let clock = MockClock::new();
        let sched = NetScheduler::new(8192, 0);
        for i in 0..10u8 {
            sched.enqueue(&clock, clock.now_us(), &[i; 100], |_| true).unwrap();
            clock.delay_us(5);
        }
        let mut frames = 0;
        let mut packets = 0;
        sched
            .flush_if_due(&clock, clock.now_us() + COALESCE_US, |bytes| {
                frames += 1;
                decode(bytes, |_| packets += 1).unwrap();
                true
            })
            .unwrap();
        assert_eq!(frames, 1);
        assert_eq!(packets, 10);
    }

    #[test]
    fn refused_write_marks_stopped_and_retry_clears_it() {
        let clock = MockClock::new();
        let sched = NetScheduler::new(4096, 0);
        sched.enqueue(&clock, clock.now_us(), &[0x45u8; 10], |_| true).unwrap();

        let result = sched.flush_if_due(&clock, clock.now_us() + COALESCE_US, |_| false);
        assert_eq!(result, Err(DriverError::Busy));
        assert!(sched.is_stopped(&clock));

        // A second packet while stopped is refused outright.
        let refused = sched.enqueue(&clock, clock.now_us(), &[0x45u8; 10], |_| true);
        assert_eq!(refused, Err(DriverError::Busy));

        sched.retry(&clock, |_| true).unwrap();
        assert!(!sched.is_stopped(&clock));
    }
}
