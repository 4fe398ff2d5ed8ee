//! Error taxonomy for the transport core.
//!
//! Shaped after the kernel's `KError`/`KResult` pair (`kernel/src/util.rs`):
//! a flat, `Copy` enum with no payload, propagated with `?` rather than
//! boxed or downcast.

#![allow(dead_code)]

/// Failure modes of the command/TD ring transport and the mux framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Device status latched as crashed or otherwise unrecognized; sticky
    /// until a full teardown/reprobe.
    DeviceGone,
    /// A command-ring wait or a mode-change poll exceeded its budget.
    Timeout,
    /// Ring full at submission, or queue pair already open.
    Busy,
    /// Operation attempted on a closed queue pair.
    NotOpen,
    /// Mux encoder cannot fit a tag or packet; caller must flush first.
    NoSpace,
    /// Blocking read cancelled by signal.
    Interrupted,
    /// Ingress decoder received an unexpected tag; frame dropped.
    BadTag,
    /// Caller violated a ring discipline invariant (e.g. wrote to an odd
    /// ring, or exceeded page size). Fatal in debug builds.
    ContractViolation,
}

pub type DriverResult<T> = core::result::Result<T, DriverError>;
