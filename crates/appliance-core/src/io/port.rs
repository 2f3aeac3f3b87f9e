//! Device-facing interrupt port handle.

use std::sync::Arc;

use super::bus::IoBus;

/// Addressable interrupt port attached to an [`IoBus`].
///
/// A port owns at most one pending interrupt at a time; setting a new one
/// discards the old through the same release path. The pending interrupt is
/// in the bus's ready-to-handle queue exactly while interrupts are enabled, a
/// pending interrupt exists, and it has not yet been dispatched to a core.
/// Every transition happens under the bus-wide lock. Dropping the port
/// detaches it from the bus.
#[derive(Debug)]
pub struct IoPort {
    address: u16,
    bus: Arc<IoBus>,
}

impl IoPort {
    pub(super) fn new(address: u16, bus: Arc<IoBus>) -> Self {
        Self { address, bus }
    }

    /// Port address on the bus.
    #[must_use]
    pub const fn address(&self) -> u16 {
        self.address
    }

    /// Allows the pending interrupt (if any) into the ready queue.
    pub fn enable_interrupts(&self) {
        let mut state = self.bus.lock();
        if let Some(port) = state.ports.get_mut(&self.address) {
            port.enabled = true;
        }
        state.sync_queue(self.address);
    }

    /// Withdraws the port from the ready queue without discarding any
    /// pending interrupt.
    pub fn disable_interrupts(&self) {
        let mut state = self.bus.lock();
        if let Some(port) = state.ports.get_mut(&self.address) {
            port.enabled = false;
        }
        state.sync_queue(self.address);
    }

    /// Returns `true` while interrupts are enabled.
    #[must_use]
    pub fn interrupts_enabled(&self) -> bool {
        self.bus
            .lock()
            .ports
            .get(&self.address)
            .is_some_and(|port| port.enabled)
    }

    /// Raises a pending interrupt with `status`, superseding any existing
    /// one. The replacement is transactional: the old interrupt is released
    /// and the new one queued under a single lock acquisition.
    pub fn set_pending_interrupt(&self, status: u32) {
        let mut state = self.bus.lock();
        if let Some(port) = state.ports.get_mut(&self.address) {
            port.pending = Some(status);
            port.dispatched = false;
        }
        state.sync_queue(self.address);
    }

    /// Clears the pending interrupt, removing it from the ready queue if it
    /// was still queued.
    pub fn release_pending_interrupt(&self) {
        let mut state = self.bus.lock();
        if let Some(port) = state.ports.get_mut(&self.address) {
            port.pending = None;
            port.dispatched = false;
        }
        state.sync_queue(self.address);
    }

    /// Status code of the pending interrupt, if one exists.
    #[must_use]
    pub fn pending_interrupt(&self) -> Option<u32> {
        self.bus
            .lock()
            .ports
            .get(&self.address)
            .and_then(|port| port.pending)
    }
}

impl Drop for IoPort {
    fn drop(&mut self) {
        self.bus.detach_port(self.address);
    }
}
