//! Interrupt-routing I/O bus.
//!
//! All port and queue state lives behind one bus-wide mutex: interrupt
//! mutation can originate from a device thread concurrently with a core
//! thread polling, and every operation here is O(1) and rare relative to
//! instruction execution, so a single coarse lock is the documented design.
//!
//! Dispatch order is FIFO by enqueue time; ports carry no priority field.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use super::port::IoPort;

/// Error raised while attaching a port to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum IoBusError {
    /// Another port already claims the address.
    #[error("port address {0:#06x} is already attached")]
    PortAddressInUse(u16),
}

/// One delivered hardware interrupt, handed to a core for acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IoInterrupt {
    /// Address of the raising port.
    pub port: u16,
    /// Device-defined status code.
    pub status: u32,
}

#[derive(Debug, Default)]
pub(super) struct PortState {
    pub(super) enabled: bool,
    pub(super) pending: Option<u32>,
    /// Set once the pending interrupt has been handed to a core; the port
    /// stays out of the ready queue until released or superseded.
    pub(super) dispatched: bool,
}

impl PortState {
    pub(super) const fn should_be_queued(&self) -> bool {
        self.enabled && self.pending.is_some() && !self.dispatched
    }
}

#[derive(Debug, Default)]
pub(super) struct IoBusState {
    pub(super) ports: HashMap<u16, PortState>,
    pub(super) ready: VecDeque<u16>,
}

impl IoBusState {
    /// Re-establishes the queue-membership invariant for one port. Must be
    /// called after every mutation of that port's state, while the bus lock
    /// is still held.
    pub(super) fn sync_queue(&mut self, address: u16) {
        let should_queue = self
            .ports
            .get(&address)
            .is_some_and(PortState::should_be_queued);
        let position = self.ready.iter().position(|entry| *entry == address);
        match (should_queue, position) {
            (true, None) => self.ready.push_back(address),
            (false, Some(index)) => {
                self.ready.remove(index);
            }
            _ => {}
        }
    }
}

/// Interrupt-routing bus shared between device components and cores.
#[derive(Debug, Default)]
pub struct IoBus {
    guard: Mutex<IoBusState>,
}

impl IoBus {
    /// Creates an empty bus behind a shared handle.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, IoBusState> {
        self.guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Attaches a new port at `address` and returns the device-facing handle.
    ///
    /// # Errors
    ///
    /// [`IoBusError::PortAddressInUse`] when the address is already taken.
    pub fn attach_port(self: &Arc<Self>, address: u16) -> Result<IoPort, IoBusError> {
        let mut state = self.lock();
        if state.ports.contains_key(&address) {
            return Err(IoBusError::PortAddressInUse(address));
        }
        state.ports.insert(address, PortState::default());
        drop(state);
        Ok(IoPort::new(address, Arc::clone(self)))
    }

    pub(super) fn detach_port(&self, address: u16) {
        let mut state = self.lock();
        state.ports.remove(&address);
        state.sync_queue(address);
    }

    /// Removes and returns the highest-priority ready interrupt, if any.
    ///
    /// The returned interrupt stays owned by its port until the handling
    /// core calls [`IoPort::release_pending_interrupt`].
    #[must_use]
    pub fn poll_interrupt(&self) -> Option<IoInterrupt> {
        let mut state = self.lock();
        let address = state.ready.pop_front()?;
        let port = state
            .ports
            .get_mut(&address)
            .unwrap_or_else(|| unreachable!("queued port must have state"));
        port.dispatched = true;
        let status = port
            .pending
            .unwrap_or_else(|| unreachable!("queued port must hold a pending interrupt"));
        Some(IoInterrupt {
            port: address,
            status,
        })
    }

    /// Number of interrupts currently ready to handle.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }
}
