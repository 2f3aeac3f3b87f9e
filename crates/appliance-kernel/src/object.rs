//! Kernel object model.
//!
//! Every object is exclusively owned by one [`Kernel`] and identified by a
//! kernel-unique OID. One kernel-wide mutex guards all object state; the
//! reference counts decide lifetime only, never mutual exclusion. An object
//! is registered in exactly one of the live/dead tables from construction to
//! destruction, and destruction happens only when its count reaches zero
//! with the kernel lock held.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::ipc::{Handle, ParamValue};

/// Kernel-unique object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(pub u64);

/// Classification of a kernel object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Interned, name-keyed symbolic key.
    Atom,
    /// Namespace node.
    Node,
    /// Device object.
    Device,
    /// Guest process.
    Process,
    /// Guest thread.
    Thread,
    /// Message-queue endpoint.
    Server,
    /// Named, versioned publication of a server.
    Service,
    /// One in-flight RPC message.
    Message,
}

/// Handle-table entry: a per-opener reference to a service, counted
/// independently of the service's own reference count.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HandleEntry {
    pub(crate) service: Oid,
}

#[derive(Debug)]
pub(crate) enum ObjectBody {
    Atom {
        name: String,
    },
    Node,
    Device,
    Process {
        name: String,
        threads: Vec<Oid>,
        main_thread: Option<Oid>,
        handles: HashMap<Handle, HandleEntry>,
        next_handle: u32,
    },
    Thread {
        process: Oid,
    },
    Server {
        backlog_limit: usize,
        queue: VecDeque<Oid>,
    },
    Service {
        name_atom: Oid,
        server: Oid,
        version: u32,
        max_params: usize,
    },
    Message {
        sender: Oid,
        sender_handle: Handle,
        type_atom: Oid,
        params: Vec<ParamValue>,
        completion: Option<(crate::KErrno, Vec<ParamValue>)>,
    },
}

impl ObjectBody {
    pub(crate) const fn kind(&self) -> ObjectKind {
        match self {
            Self::Atom { .. } => ObjectKind::Atom,
            Self::Node => ObjectKind::Node,
            Self::Device => ObjectKind::Device,
            Self::Process { .. } => ObjectKind::Process,
            Self::Thread { .. } => ObjectKind::Thread,
            Self::Server { .. } => ObjectKind::Server,
            Self::Service { .. } => ObjectKind::Service,
            Self::Message { .. } => ObjectKind::Message,
        }
    }

    /// Counted references this object holds on other objects, released when
    /// the object is destroyed.
    fn held_references(&self) -> Vec<Oid> {
        match self {
            Self::Atom { .. } | Self::Node | Self::Device => Vec::new(),
            Self::Process {
                threads,
                main_thread,
                handles,
                ..
            } => {
                let mut held = threads.clone();
                if let Some(main) = main_thread {
                    held.push(*main);
                }
                held.extend(handles.values().map(|entry| entry.service));
                held
            }
            Self::Thread { process } => vec![*process],
            Self::Server { queue, .. } => queue.iter().copied().collect(),
            Self::Service {
                name_atom, server, ..
            } => vec![*name_atom, *server],
            Self::Message {
                sender, type_atom, ..
            } => vec![*sender, *type_atom],
        }
    }
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) body: ObjectBody,
    pub(crate) refs: u32,
}

#[derive(Debug, Default)]
pub(crate) struct KernelState {
    next_oid: u64,
    pub(crate) live: HashMap<Oid, Slot>,
    pub(crate) dead: HashMap<Oid, Slot>,
    pub(crate) atoms_by_name: HashMap<String, Oid>,
    pub(crate) services_by_name: HashMap<String, Oid>,
}

impl KernelState {
    /// Allocates a fresh OID and registers the object in the live table with
    /// its count seeded to 1 for the creator's reference.
    pub(crate) fn alloc(&mut self, body: ObjectBody) -> Oid {
        self.next_oid += 1;
        let oid = Oid(self.next_oid);
        trace!(oid = oid.0, kind = ?body.kind(), "object created");
        self.live.insert(oid, Slot { body, refs: 1 });
        oid
    }

    pub(crate) fn slot(&self, oid: Oid) -> Option<&Slot> {
        self.live.get(&oid).or_else(|| self.dead.get(&oid))
    }

    pub(crate) fn slot_mut(&mut self, oid: Oid) -> Option<&mut Slot> {
        if self.live.contains_key(&oid) {
            self.live.get_mut(&oid)
        } else {
            self.dead.get_mut(&oid)
        }
    }

    pub(crate) fn retain(&mut self, oid: Oid) {
        let slot = self
            .slot_mut(oid)
            .unwrap_or_else(|| unreachable!("retain of unregistered object"));
        slot.refs += 1;
    }

    /// Moves a still-referenced object from the live table to the dead table.
    pub(crate) fn mark_dead(&mut self, oid: Oid) {
        if let Some(slot) = self.live.remove(&oid) {
            self.dead.insert(oid, slot);
        }
    }

    /// Interns `name` under the held lock. The returned OID carries a
    /// counted reference for the caller; on first creation the atom registry
    /// takes its own reference as well.
    pub(crate) fn intern_atom(&mut self, name: &str) -> Oid {
        if let Some(&existing) = self.atoms_by_name.get(name) {
            self.retain(existing);
            return existing;
        }
        let oid = self.alloc(ObjectBody::Atom {
            name: name.to_owned(),
        });
        // Registry reference on top of the caller's seeded one.
        self.retain(oid);
        self.atoms_by_name.insert(name.to_owned(), oid);
        debug!(oid = oid.0, name, "atom interned");
        oid
    }

    /// Drops one reference; at zero the object is destroyed, removed from
    /// whichever table holds it, and the references it held are released in
    /// turn.
    pub(crate) fn release(&mut self, oid: Oid) {
        let slot = self
            .slot_mut(oid)
            .unwrap_or_else(|| unreachable!("release of unregistered object"));
        debug_assert!(slot.refs > 0, "release would drive count negative");
        slot.refs -= 1;
        if slot.refs > 0 {
            return;
        }

        let slot = self
            .live
            .remove(&oid)
            .or_else(|| self.dead.remove(&oid))
            .unwrap_or_else(|| unreachable!("destroyed object must be registered"));
        trace!(oid = oid.0, kind = ?slot.body.kind(), "object destroyed");

        match &slot.body {
            ObjectBody::Atom { name } => {
                self.atoms_by_name.remove(name);
            }
            ObjectBody::Service { .. } => {
                self.services_by_name.retain(|_, service| *service != oid);
            }
            _ => {}
        }

        for held in slot.body.held_references() {
            self.release(held);
        }
    }
}

/// The software-emulated kernel owning every kernel object.
///
/// All object state lives behind `state`; the condition variables signal
/// message arrival, completion posting, and backlog space for the blocking
/// system calls in [`crate::ipc`].
pub struct Kernel {
    pub(crate) state: Mutex<KernelState>,
    pub(crate) messages_available: Condvar,
    pub(crate) completion_posted: Condvar,
    pub(crate) backlog_space: Condvar,
}

impl Default for Kernel {
    fn default() -> Self {
        Self {
            state: Mutex::new(KernelState::default()),
            messages_available: Condvar::new(),
            completion_posted: Condvar::new(),
            backlog_space: Condvar::new(),
        }
    }
}

impl Kernel {
    /// Creates an empty kernel behind a shared handle.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, KernelState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Wakes every blocked system call so it can observe cancellation.
    pub(crate) fn wake_all_waiters(&self) {
        self.messages_available.notify_all();
        self.completion_posted.notify_all();
        self.backlog_space.notify_all();
    }

    /// Creates a guest process; the caller receives the seeded reference.
    pub fn create_process(&self, name: impl Into<String>) -> Oid {
        let name = name.into();
        let mut state = self.lock_state();
        let oid = state.alloc(ObjectBody::Process {
            name: name.clone(),
            threads: Vec::new(),
            main_thread: None,
            handles: HashMap::new(),
            next_handle: 1,
        });
        debug!(oid = oid.0, name, "process created");
        oid
    }

    /// Creates a namespace node.
    pub fn create_node(&self) -> Oid {
        self.lock_state().alloc(ObjectBody::Node)
    }

    /// Creates a device object.
    pub fn create_device(&self) -> Oid {
        self.lock_state().alloc(ObjectBody::Device)
    }

    /// Adds one counted reference to `oid`.
    pub fn retain(&self, oid: Oid) {
        self.lock_state().retain(oid);
    }

    /// Drops one counted reference to `oid`, destroying it at zero.
    pub fn release(&self, oid: Oid) {
        self.lock_state().release(oid);
    }

    /// Current reference count, if the object is registered.
    #[must_use]
    pub fn ref_count(&self, oid: Oid) -> Option<u32> {
        self.lock_state().slot(oid).map(|slot| slot.refs)
    }

    /// Object classification, if registered.
    #[must_use]
    pub fn kind(&self, oid: Oid) -> Option<ObjectKind> {
        self.lock_state().slot(oid).map(|slot| slot.body.kind())
    }

    /// Number of objects in the live table.
    #[must_use]
    pub fn live_object_count(&self) -> usize {
        self.lock_state().live.len()
    }

    /// Number of retired-but-referenced objects in the dead table.
    #[must_use]
    pub fn dead_object_count(&self) -> usize {
        self.lock_state().dead.len()
    }

    /// Interns `name`, creating the atom on first use. The returned OID
    /// carries a counted reference for the caller; the atom registry holds
    /// its own reference for as long as the kernel lives.
    pub fn intern_atom(&self, name: &str) -> Oid {
        self.lock_state().intern_atom(name)
    }

    /// Name of an atom, if `oid` refers to one.
    #[must_use]
    pub fn atom_name(&self, oid: Oid) -> Option<String> {
        let state = self.lock_state();
        match state.slot(oid).map(|slot| &slot.body) {
            Some(ObjectBody::Atom { name }) => Some(name.clone()),
            _ => None,
        }
    }
}

/// Owned counted reference to a kernel object, released on drop.
///
/// This is the unforgeable side of the symmetric retain/release discipline:
/// holders that keep one of these cannot leak or double-release the count.
pub struct ObjRef {
    kernel: Arc<Kernel>,
    oid: Oid,
}

impl ObjRef {
    /// Takes ownership of an already counted reference (for example, the
    /// seeded reference returned by a create call).
    #[must_use]
    pub const fn adopt(kernel: Arc<Kernel>, oid: Oid) -> Self {
        Self { kernel, oid }
    }

    /// Adds a fresh counted reference and owns it.
    #[must_use]
    pub fn retain(kernel: Arc<Kernel>, oid: Oid) -> Self {
        kernel.retain(oid);
        Self { kernel, oid }
    }

    /// Referenced OID.
    #[must_use]
    pub const fn oid(&self) -> Oid {
        self.oid
    }
}

impl Clone for ObjRef {
    fn clone(&self) -> Self {
        Self::retain(Arc::clone(&self.kernel), self.oid)
    }
}

impl Drop for ObjRef {
    fn drop(&mut self) {
        self.kernel.release(self.oid);
    }
}

#[cfg(test)]
mod tests {
    use super::{Kernel, ObjRef, ObjectKind};

    #[test]
    fn created_object_has_reference_count_one() {
        let kernel = Kernel::new();
        let process = kernel.create_process("init");
        assert_eq!(kernel.ref_count(process), Some(1));
        assert_eq!(kernel.kind(process), Some(ObjectKind::Process));
        assert_eq!(kernel.live_object_count(), 1);
    }

    #[test]
    fn retain_release_pairs_return_the_object_to_destruction() {
        let kernel = Kernel::new();
        let process = kernel.create_process("init");
        kernel.retain(process);
        kernel.retain(process);
        assert_eq!(kernel.ref_count(process), Some(3));
        kernel.release(process);
        kernel.release(process);
        assert_eq!(kernel.ref_count(process), Some(1));
        kernel.release(process);
        assert_eq!(kernel.ref_count(process), None);
        assert_eq!(kernel.live_object_count(), 0);
    }

    #[test]
    fn nodes_and_devices_are_plain_counted_objects() {
        let kernel = Kernel::new();
        let node = kernel.create_node();
        let device = kernel.create_device();
        assert_eq!(kernel.kind(node), Some(ObjectKind::Node));
        assert_eq!(kernel.kind(device), Some(ObjectKind::Device));
        kernel.release(node);
        kernel.release(device);
        assert_eq!(kernel.live_object_count(), 0);
    }

    #[test]
    fn atoms_are_interned_by_name() {
        let kernel = Kernel::new();
        let first = kernel.intern_atom("system.console");
        let second = kernel.intern_atom("system.console");
        assert_eq!(first, second);
        // Caller refs: 2, registry ref: 1.
        assert_eq!(kernel.ref_count(first), Some(3));
        assert_eq!(kernel.atom_name(first).as_deref(), Some("system.console"));

        kernel.release(first);
        kernel.release(first);
        // Registry keeps the atom alive.
        assert_eq!(kernel.ref_count(first), Some(1));
        assert_eq!(kernel.live_object_count(), 1);
    }

    #[test]
    fn obj_ref_guard_releases_on_drop() {
        let kernel = Kernel::new();
        let process = kernel.create_process("guarded");
        {
            let guard = ObjRef::retain(kernel.clone(), process);
            assert_eq!(kernel.ref_count(guard.oid()), Some(2));
            let cloned = guard.clone();
            assert_eq!(kernel.ref_count(cloned.oid()), Some(3));
        }
        assert_eq!(kernel.ref_count(process), Some(1));

        let owner = ObjRef::adopt(kernel.clone(), process);
        drop(owner);
        assert_eq!(kernel.ref_count(process), None);
    }
}
