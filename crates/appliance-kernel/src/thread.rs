//! Native-thread backing for guest threads, with cooperative cancellation.
//!
//! Termination is a control transfer, not an error: a cancellation request
//! sets a flag plus an exit code, every system call checks the flag at its
//! suspension points, and a set flag unwinds the call stack back to the
//! thread runner as an ordinary `Err(KErrno::Cancelled)` result.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::errno::{KErrno, KResult};
use crate::object::{Kernel, ObjectBody, Oid};

/// Asynchronous termination request shared between a supervisor and one
/// guest thread.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    exit_code: AtomicI32,
}

impl CancellationToken {
    /// Requests termination with `exit_code`. Idempotent; the first request
    /// wins the exit code.
    pub fn request(&self, exit_code: i32) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.exit_code.store(exit_code, Ordering::Release);
        }
    }

    /// Returns `true` once termination has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Exit code stored by the winning termination request.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire)
    }
}

/// Per-thread guest execution context: the identity every system call runs
/// under.
pub struct GuestContext {
    pub(crate) kernel: Arc<Kernel>,
    pub(crate) process: Oid,
    pub(crate) token: Arc<CancellationToken>,
}

impl GuestContext {
    /// Builds a context for host-driven calls outside a spawned thread.
    #[must_use]
    pub fn host(kernel: Arc<Kernel>, process: Oid) -> Self {
        Self {
            kernel,
            process,
            token: Arc::new(CancellationToken::default()),
        }
    }

    /// Owning kernel.
    #[must_use]
    pub const fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Calling process.
    #[must_use]
    pub const fn process(&self) -> Oid {
        self.process
    }

    /// Short-circuits with [`KErrno::Cancelled`] once termination has been
    /// requested. Called by every system call at entry and after each
    /// blocking wait.
    pub(crate) fn check_cancelled(&self) -> KResult<()> {
        if self.token.is_cancelled() {
            Err(KErrno::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Kernel {
    /// Creates a guest thread object bound to `process`.
    ///
    /// The thread holds a counted reference to its process; the process
    /// holds counted references to the thread and, when `main` is set, an
    /// additional one for its designated main thread.
    pub fn create_thread(&self, process: Oid, main: bool) -> Oid {
        let mut state = self.lock_state();
        state.retain(process);
        let thread = state.alloc(ObjectBody::Thread { process });
        if let Some(slot) = state.slot_mut(process) {
            if let ObjectBody::Process {
                threads,
                main_thread,
                ..
            } = &mut slot.body
            {
                threads.push(thread);
                if main {
                    *main_thread = Some(thread);
                }
            }
        }
        state.retain(thread);
        if main {
            state.retain(thread);
        }
        debug!(thread = thread.0, process = process.0, main, "thread created");
        thread
    }

    /// Retires an exited thread: moves it to the dead table, detaches it
    /// from its process, and drops every reference the process held on it.
    pub fn retire_thread(&self, thread: Oid) {
        let mut state = self.lock_state();
        let Some(slot) = state.slot(thread) else {
            return;
        };
        let ObjectBody::Thread { process } = slot.body else {
            return;
        };

        state.mark_dead(thread);

        let mut releases = 0_u32;
        if let Some(slot) = state.slot_mut(process) {
            if let ObjectBody::Process {
                threads,
                main_thread,
                ..
            } = &mut slot.body
            {
                if let Some(index) = threads.iter().position(|entry| *entry == thread) {
                    threads.remove(index);
                    releases += 1;
                }
                if *main_thread == Some(thread) {
                    *main_thread = None;
                    releases += 1;
                }
            }
        }
        for _ in 0..releases {
            state.release(thread);
        }
        // Creator reference; at zero the thread releases its process.
        state.release(thread);
        debug!(thread = thread.0, process = process.0, "thread retired");
    }
}

/// A spawned native thread backing one guest thread.
pub struct NativeThread {
    kernel: Arc<Kernel>,
    thread: Oid,
    token: Arc<CancellationToken>,
    join_handle: Option<JoinHandle<i32>>,
}

impl NativeThread {
    /// Spawns a native thread running `body` under a fresh guest context.
    ///
    /// The runner translates the body's result into an exit code: `Ok(code)`
    /// passes through, `Err(KErrno::Cancelled)` reports the cancellation
    /// token's stored exit code, and any other errno is negated.
    pub fn spawn<F>(kernel: &Arc<Kernel>, process: Oid, name: &str, main: bool, body: F) -> Self
    where
        F: FnOnce(&GuestContext) -> KResult<i32> + Send + 'static,
    {
        let thread = kernel.create_thread(process, main);
        let token = Arc::new(CancellationToken::default());
        let context = GuestContext {
            kernel: Arc::clone(kernel),
            process,
            token: Arc::clone(&token),
        };
        let runner_token = Arc::clone(&token);
        let join_handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || match body(&context) {
                Ok(code) => code,
                Err(KErrno::Cancelled) => runner_token.exit_code(),
                #[allow(clippy::cast_possible_wrap)]
                Err(errno) => -(errno.as_u32() as i32),
            })
            .unwrap_or_else(|error| unreachable!("thread spawn failed: {error}"));
        Self {
            kernel: Arc::clone(kernel),
            thread,
            token,
            join_handle: Some(join_handle),
        }
    }

    /// OID of the backing guest thread object.
    #[must_use]
    pub const fn thread_oid(&self) -> Oid {
        self.thread
    }

    /// Requests cooperative termination with `exit_code` and wakes every
    /// blocked system call so the thread can observe the request.
    pub fn cancel(&self, exit_code: i32) {
        self.token.request(exit_code);
        self.kernel.wake_all_waiters();
    }

    /// Joins the native thread and retires the guest thread object.
    ///
    /// Returns the exit code reported by the runner.
    #[must_use]
    pub fn join(mut self) -> i32 {
        let code = self
            .join_handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(i32::MIN);
        self.kernel.retire_thread(self.thread);
        code
    }
}

#[cfg(test)]
mod tests {
    use super::{CancellationToken, NativeThread};
    use crate::object::{Kernel, ObjectKind};

    #[test]
    fn first_cancellation_request_wins_the_exit_code() {
        let token = CancellationToken::default();
        assert!(!token.is_cancelled());
        token.request(17);
        token.request(99);
        assert!(token.is_cancelled());
        assert_eq!(token.exit_code(), 17);
    }

    #[test]
    fn spawned_thread_reports_its_exit_code_and_is_retired() {
        let kernel = Kernel::new();
        let process = kernel.create_process("guest");
        let thread = NativeThread::spawn(&kernel, process, "worker", true, |_ctx| Ok(42));
        let thread_oid = thread.thread_oid();
        assert_eq!(kernel.kind(thread_oid), Some(ObjectKind::Thread));
        assert_eq!(thread.join(), 42);
        assert_eq!(kernel.kind(thread_oid), None);
        // The process is back to only the creator's reference.
        assert_eq!(kernel.ref_count(process), Some(1));
    }
}
