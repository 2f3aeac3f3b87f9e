//! Emulated guest kernel: object model, message-passing IPC, and the
//! system-call surface guest threads run against.
//!
//! The kernel owns every object behind one coarse lock and tracks lifetime
//! with explicit reference counts observable from tests. Guest threads run
//! on native threads through [`NativeThread`]; blocking system calls park on
//! condition variables and honor cooperative cancellation.

pub mod errno;
pub mod ipc;
pub mod object;
pub mod thread;

pub use errno::{KErrno, KResult};
pub use ipc::{
    Handle, ParamValue, PendingMessage, Timeout, HANDLE_CLOSED_ATOM, HANDLE_OPENED_ATOM,
};
pub use object::{Kernel, ObjRef, ObjectKind, Oid};
pub use thread::{CancellationToken, GuestContext, NativeThread};

#[cfg(test)]
use rstest as _;
