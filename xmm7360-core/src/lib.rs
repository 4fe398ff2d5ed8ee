//! Transport core for the Intel XMM7360 PCIe LTE modem.
//!
//! Generalized over the embedder's clock, DMA allocator, logger, and IP
//! delivery sink (see [`hal`]) so it builds and tests standalone, outside
//! any particular kernel tree. The kernel-specific glue (PCI probe, MSI
//! wiring, concrete trait impls) lives in the embedder, not here.
#![no_std]

extern crate alloc;

pub mod cmd_ring;
pub mod control_page;
pub mod device;
pub mod error;
pub mod hal;
pub mod logging;
pub mod mux;
pub mod net_sched;
pub mod queue_pair;
pub mod regs;
pub mod sync;
pub mod td_ring;

#[cfg(test)]
pub mod mock;

pub use device::{PollFlags, XmmDevice};
pub use error::{DriverError, DriverResult};
pub use hal::{Clock, DmaAllocator, DmaRegion, IpSink, NullIpSink};
pub use logging::{Logger, NullLogger};
pub use queue_pair::Channel;
