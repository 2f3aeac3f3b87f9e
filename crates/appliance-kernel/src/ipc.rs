//! Message-passing IPC and the guest system-call surface.
//!
//! A *service* is a named, versioned publication; the *server* behind it is
//! the message-queue endpoint. Clients resolve the name to a handle, send
//! typed messages through the handle, and wait for the handler to post a
//! completion. Backpressure is part of the contract: a full server backlog
//! blocks senders until the handler drains the queue.
//!
//! Every call takes the kernel lock once, blocks only on the kernel's
//! condition variables (releasing the lock while waiting), and checks the
//! calling thread's cancellation token at entry and after every wake-up.

use std::sync::PoisonError;
use std::time::Instant;

use appliance_core::TimeInterval;
use tracing::debug;

use crate::errno::{KErrno, KResult};
use crate::object::{HandleEntry, KernelState, ObjectBody, Oid};
use crate::thread::GuestContext;

/// Type atom posted to a server when a client opens a handle to one of its
/// services.
pub const HANDLE_OPENED_ATOM: &str = "system.handle-opened";

/// Type atom posted to a server when a handle to one of its services closes.
pub const HANDLE_CLOSED_ATOM: &str = "system.handle-closed";

/// Per-process reference to a service, valid only inside the opening
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

/// One typed message parameter.
///
/// Parameters are plain data: an [`ParamValue::Oid`] payload names an object
/// without holding a counted reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// 32-bit unsigned value.
    U32(u32),
    /// 64-bit unsigned value.
    U64(u64),
    /// Object identifier payload.
    Oid(Oid),
    /// Opaque byte payload.
    Bytes(Vec<u8>),
}

/// Bound on a blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait until a message arrives or the thread is cancelled.
    Infinite,
    /// Wait at most this long, then fail with [`KErrno::TimedOut`].
    Bounded(TimeInterval),
}

/// A received message, snapshotted for the handling thread.
///
/// The handler owns one counted reference to `message` (transferred from the
/// server queue) and must settle it with
/// [`GuestContext::complete_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// The message object awaiting completion.
    pub message: Oid,
    /// Process that sent the message.
    pub sender: Oid,
    /// Handle the sender used, as seen by the sender's process.
    pub sender_handle: Handle,
    /// Interned type atom classifying the message.
    pub type_atom: Oid,
    /// Ordered message parameters.
    pub params: Vec<ParamValue>,
}

impl KernelState {
    fn service_of_handle(&self, process: Oid, handle: Handle) -> KResult<Oid> {
        match self.slot(process).map(|slot| &slot.body) {
            Some(ObjectBody::Process { handles, .. }) => handles
                .get(&handle)
                .map(|entry| entry.service)
                .ok_or(KErrno::InvalidHandle),
            _ => Err(KErrno::InvalidHandle),
        }
    }

    fn service_target(&self, service: Oid) -> KResult<(Oid, usize)> {
        match self.slot(service).map(|slot| &slot.body) {
            Some(ObjectBody::Service {
                server, max_params, ..
            }) => Ok((*server, *max_params)),
            _ => Err(KErrno::InvalidHandle),
        }
    }

    fn backlog_has_space(&self, server: Oid) -> bool {
        match self.slot(server).map(|slot| &slot.body) {
            Some(ObjectBody::Server {
                backlog_limit,
                queue,
            }) => queue.len() < *backlog_limit,
            _ => false,
        }
    }

    fn enqueue_message(&mut self, server: Oid, message: Oid) {
        if let Some(slot) = self.slot_mut(server) {
            if let ObjectBody::Server { queue, .. } = &mut slot.body {
                queue.push_back(message);
            }
        }
    }

    fn dequeue_message(&mut self, server: Oid) -> Option<Oid> {
        match self.slot_mut(server).map(|slot| &mut slot.body) {
            Some(ObjectBody::Server { queue, .. }) => queue.pop_front(),
            _ => None,
        }
    }

    fn snapshot_message(&self, message: Oid) -> PendingMessage {
        let Some(ObjectBody::Message {
            sender,
            sender_handle,
            type_atom,
            params,
            ..
        }) = self.slot(message).map(|slot| &slot.body)
        else {
            unreachable!("queued OID must be a registered message")
        };
        PendingMessage {
            message,
            sender: *sender,
            sender_handle: *sender_handle,
            type_atom: *type_atom,
            params: params.clone(),
        }
    }

    /// Installs a fresh handle in `process` owning one already counted
    /// service reference.
    fn install_handle(&mut self, process: Oid, service: Oid) -> Handle {
        let slot = self
            .slot_mut(process)
            .unwrap_or_else(|| unreachable!("handle install into unregistered process"));
        let ObjectBody::Process {
            handles,
            next_handle,
            ..
        } = &mut slot.body
        else {
            unreachable!("handle install into a non-process object")
        };
        let handle = Handle(*next_handle);
        *next_handle += 1;
        handles.insert(handle, HandleEntry { service });
        handle
    }

    /// Queues a handle-opened / handle-closed notification, exempt from the
    /// backlog limit. The queue ends up holding the only message reference.
    fn post_handle_notification(&mut self, atom: &str, sender: Oid, handle: Handle, server: Oid) {
        let type_atom = self.intern_atom(atom);
        self.retain(sender);
        let note = self.alloc(ObjectBody::Message {
            sender,
            sender_handle: handle,
            type_atom,
            params: Vec::new(),
            completion: None,
        });
        self.retain(note);
        self.enqueue_message(server, note);
        self.release(note);
    }
}

impl GuestContext {
    /// Interns `name` and returns the atom's OID with a counted reference
    /// for the caller.
    pub fn get_atom(&self, name: &str) -> KResult<Oid> {
        self.check_cancelled()?;
        Ok(self.kernel.lock_state().intern_atom(name))
    }

    /// Publishes a service under `name` and returns the serving handle.
    ///
    /// The handle is the receive side: the caller drains the service's
    /// backlog with [`Self::get_message`]. Fails with
    /// [`KErrno::AlreadyExists`] when the name is taken and
    /// [`KErrno::InvalidParameter`] when `backlog` is zero.
    pub fn create_service(
        &self,
        name: &str,
        version: u32,
        max_params: usize,
        backlog: usize,
    ) -> KResult<Handle> {
        self.check_cancelled()?;
        if backlog == 0 {
            return Err(KErrno::InvalidParameter);
        }
        let mut state = self.kernel.lock_state();
        if state.services_by_name.contains_key(name) {
            return Err(KErrno::AlreadyExists);
        }
        // Caller's atom reference and the server's seeded reference are
        // both handed to the service, which releases them when destroyed.
        let name_atom = state.intern_atom(name);
        let server = state.alloc(ObjectBody::Server {
            backlog_limit: backlog,
            queue: std::collections::VecDeque::new(),
        });
        let service = state.alloc(ObjectBody::Service {
            name_atom,
            server,
            version,
            max_params,
        });
        // Name index is not counted; services stay destructible while
        // published.
        state.services_by_name.insert(name.to_owned(), service);
        // The service's seeded reference becomes the handle's reference.
        let handle = state.install_handle(self.process, service);
        debug!(
            service = service.0,
            server = server.0,
            name,
            version,
            "service created"
        );
        Ok(handle)
    }

    /// Resolves a published service by name and opens a handle to it.
    ///
    /// The serving side receives a [`HANDLE_OPENED_ATOM`] notification.
    pub fn open_handle(&self, service_name: &str) -> KResult<Handle> {
        self.check_cancelled()?;
        let mut state = self.kernel.lock_state();
        let service = *state
            .services_by_name
            .get(service_name)
            .ok_or(KErrno::NotFound)?;
        let (server, _) = state.service_target(service)?;
        // Handle's counted reference to the service.
        state.retain(service);
        let handle = state.install_handle(self.process, service);
        state.post_handle_notification(HANDLE_OPENED_ATOM, self.process, handle, server);
        drop(state);
        self.kernel.messages_available.notify_all();
        debug!(service = service.0, name = service_name, "handle opened");
        Ok(handle)
    }

    /// Closes `handle`, notifying the serving side with
    /// [`HANDLE_CLOSED_ATOM`] before the handle's service reference drops.
    pub fn close_handle(&self, handle: Handle) -> KResult<()> {
        self.check_cancelled()?;
        let mut state = self.kernel.lock_state();
        let service = state.service_of_handle(self.process, handle)?;
        let (server, _) = state.service_target(service)?;
        if let Some(slot) = state.slot_mut(self.process) {
            if let ObjectBody::Process { handles, .. } = &mut slot.body {
                handles.remove(&handle);
            }
        }
        state.post_handle_notification(HANDLE_CLOSED_ATOM, self.process, handle, server);
        state.release(service);
        drop(state);
        self.kernel.messages_available.notify_all();
        debug!(service = service.0, "handle closed");
        Ok(())
    }

    /// Sends a typed message through `handle`, blocking while the target
    /// backlog is full.
    ///
    /// Returns the message OID; the caller owns one counted reference to it
    /// and settles it with [`Self::wait_completion`]. Fails with
    /// [`KErrno::InvalidParameter`] when `type_atom` is not an atom or
    /// `params` exceeds the service's parameter limit.
    pub fn send_message(
        &self,
        handle: Handle,
        type_atom: Oid,
        params: Vec<ParamValue>,
    ) -> KResult<Oid> {
        self.check_cancelled()?;
        let mut state = self.kernel.lock_state();
        loop {
            // Re-resolve after every wake-up: the service can disappear
            // while the sender is blocked.
            let service = state.service_of_handle(self.process, handle)?;
            let (server, max_params) = state.service_target(service)?;
            validate_payload(&state, type_atom, &params, max_params)?;
            if state.backlog_has_space(server) {
                let message = self.allocate_message(&mut state, server, handle, type_atom, params);
                drop(state);
                self.kernel.messages_available.notify_all();
                return Ok(message);
            }
            state = self
                .kernel
                .backlog_space
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            self.check_cancelled()?;
        }
    }

    /// Non-blocking variant of [`Self::send_message`]: fails with
    /// [`KErrno::LimitReached`] instead of waiting for backlog space.
    pub fn try_send_message(
        &self,
        handle: Handle,
        type_atom: Oid,
        params: Vec<ParamValue>,
    ) -> KResult<Oid> {
        self.check_cancelled()?;
        let mut state = self.kernel.lock_state();
        let service = state.service_of_handle(self.process, handle)?;
        let (server, max_params) = state.service_target(service)?;
        validate_payload(&state, type_atom, &params, max_params)?;
        if !state.backlog_has_space(server) {
            return Err(KErrno::LimitReached);
        }
        let message = self.allocate_message(&mut state, server, handle, type_atom, params);
        drop(state);
        self.kernel.messages_available.notify_all();
        Ok(message)
    }

    /// Receives the oldest queued message for the service behind `handle`.
    ///
    /// The returned snapshot carries one counted message reference,
    /// transferred from the server queue to the handler.
    pub fn get_message(&self, handle: Handle, timeout: Timeout) -> KResult<PendingMessage> {
        self.check_cancelled()?;
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Bounded(interval) => Some(Instant::now() + interval.as_duration()),
        };
        let mut state = self.kernel.lock_state();
        loop {
            let service = state.service_of_handle(self.process, handle)?;
            let (server, _) = state.service_target(service)?;
            if let Some(message) = state.dequeue_message(server) {
                let pending = state.snapshot_message(message);
                drop(state);
                // Draining one slot frees backlog space.
                self.kernel.backlog_space.notify_all();
                debug!(message = message.0, server = server.0, "message received");
                return Ok(pending);
            }
            state = match deadline {
                None => self
                    .kernel
                    .messages_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(KErrno::TimedOut);
                    }
                    self.kernel
                        .messages_available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
            self.check_cancelled()?;
        }
    }

    /// Posts the completion for a received message and drops the handler's
    /// message reference.
    ///
    /// Fails with [`KErrno::InvalidParameter`] when `message` is not an
    /// uncompleted message.
    pub fn complete_message(
        &self,
        message: Oid,
        errno: KErrno,
        params: Vec<ParamValue>,
    ) -> KResult<()> {
        self.check_cancelled()?;
        let mut state = self.kernel.lock_state();
        match state.slot_mut(message).map(|slot| &mut slot.body) {
            Some(ObjectBody::Message {
                completion: completion @ None,
                ..
            }) => {
                *completion = Some((errno, params));
            }
            _ => return Err(KErrno::InvalidParameter),
        }
        // Handler's reference, transferred from the queue by get_message.
        state.release(message);
        drop(state);
        self.kernel.completion_posted.notify_all();
        debug!(message = message.0, %errno, "message completed");
        Ok(())
    }

    /// Blocks until the handler completes `message`, then returns the posted
    /// status and reply parameters and drops the sender's message reference.
    pub fn wait_completion(&self, message: Oid) -> KResult<(KErrno, Vec<ParamValue>)> {
        self.check_cancelled()?;
        let mut state = self.kernel.lock_state();
        loop {
            match state.slot(message).map(|slot| &slot.body) {
                Some(ObjectBody::Message {
                    completion: Some(completion),
                    ..
                }) => {
                    let completion = completion.clone();
                    // Sender's reference; usually the last one.
                    state.release(message);
                    return Ok(completion);
                }
                Some(ObjectBody::Message { .. }) => {}
                _ => return Err(KErrno::InvalidParameter),
            }
            state = self
                .kernel
                .completion_posted
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            self.check_cancelled()?;
        }
    }

    /// Registers a message holding counted references to its sender process
    /// and type atom, seeds the sender's reference, and queues it with the
    /// queue's own reference.
    fn allocate_message(
        &self,
        state: &mut KernelState,
        server: Oid,
        handle: Handle,
        type_atom: Oid,
        params: Vec<ParamValue>,
    ) -> Oid {
        state.retain(self.process);
        state.retain(type_atom);
        let message = state.alloc(ObjectBody::Message {
            sender: self.process,
            sender_handle: handle,
            type_atom,
            params,
            completion: None,
        });
        state.retain(message);
        state.enqueue_message(server, message);
        debug!(message = message.0, server = server.0, "message sent");
        message
    }
}

fn validate_payload(
    state: &KernelState,
    type_atom: Oid,
    params: &[ParamValue],
    max_params: usize,
) -> KResult<()> {
    let is_atom = matches!(
        state.slot(type_atom).map(|slot| &slot.body),
        Some(ObjectBody::Atom { .. })
    );
    if !is_atom || params.len() > max_params {
        return Err(KErrno::InvalidParameter);
    }
    Ok(())
}
