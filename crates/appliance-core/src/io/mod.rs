//! I/O subsystem: interrupt ports and the bus-wide ready queue.

/// Interrupt-routing bus with the FIFO ready-to-handle queue.
pub mod bus;
/// Device-facing port handles.
pub mod port;

pub use bus::{IoBus, IoBusError, IoInterrupt};
pub use port::IoPort;
