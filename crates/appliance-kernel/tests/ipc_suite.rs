//! End-to-end IPC scenarios: a served name under backpressure with real
//! client threads, cooperative cancellation of blocked receivers, and
//! bounded receive timeouts.

#![allow(clippy::pedantic, clippy::nursery)]

use std::sync::Arc;
use std::time::Duration;

use appliance_core::{TimeInterval, TimeUnit};
use appliance_kernel::{
    GuestContext, KErrno, Kernel, NativeThread, ParamValue, Timeout, HANDLE_OPENED_ATOM,
};
use rstest as _;
use thiserror as _;
use tracing as _;

const SERVICE: &str = "console";
const WRITE_ATOM: &str = "console.write";

#[test]
fn backlogged_service_round_trips_under_client_pressure() {
    let kernel = Kernel::new();
    let server_process = kernel.create_process("console-server");
    let client_process = kernel.create_process("console-client");

    let server = GuestContext::host(Arc::clone(&kernel), server_process);
    let serving = server
        .create_service(SERVICE, 1, 4, 1)
        .expect("fresh service name");

    // The client fills the single-slot backlog with its first write; the
    // second send blocks inside the kernel until the drain below frees the
    // slot.
    let client = NativeThread::spawn(&kernel, client_process, "console-client", true, |ctx| {
        let handle = ctx.open_handle(SERVICE)?;
        let write = ctx.get_atom(WRITE_ATOM)?;
        let first = ctx.send_message(handle, write, vec![ParamValue::U32(1)])?;
        let second = ctx.send_message(handle, write, vec![ParamValue::U32(2)])?;
        let (first_errno, first_reply) = ctx.wait_completion(first)?;
        let (second_errno, second_reply) = ctx.wait_completion(second)?;
        ctx.close_handle(handle)?;
        ctx.kernel().release(write);
        let echoed = first_reply == vec![ParamValue::U32(1)]
            && second_reply == vec![ParamValue::U32(2)];
        if first_errno == KErrno::Ok && second_errno == KErrno::Ok && echoed {
            Ok(0)
        } else {
            Ok(1)
        }
    });

    // Drain until both writes are settled: the handle-opened notification
    // arrives first, then the two echoed requests.
    let mut writes_completed = 0;
    let mut notifications = 0;
    while writes_completed < 2 {
        let pending = server
            .get_message(serving, Timeout::Bounded(TimeInterval::new(5, TimeUnit::S)))
            .expect("client traffic arrives");
        let type_name = kernel.atom_name(pending.type_atom).expect("typed message");
        if type_name == WRITE_ATOM {
            let echo = pending.params.clone();
            server
                .complete_message(pending.message, KErrno::Ok, echo)
                .expect("uncompleted request");
            writes_completed += 1;
        } else {
            if type_name == HANDLE_OPENED_ATOM {
                notifications += 1;
            }
            server
                .complete_message(pending.message, KErrno::Ok, Vec::new())
                .expect("uncompleted notification");
        }
    }
    assert_eq!(notifications, 1);

    assert_eq!(client.join(), 0);

    // Unpublish and tear down; nothing may linger half-destroyed.
    server.close_handle(serving).expect("serving handle open");
    assert_eq!(kernel.dead_object_count(), 0);
    assert_eq!(kernel.ref_count(server_process), Some(1));
    assert_eq!(kernel.ref_count(client_process), Some(1));
}

#[test]
fn cancellation_unwinds_a_blocked_receiver() {
    let kernel = Kernel::new();
    let process = kernel.create_process("receiver");
    let host = GuestContext::host(Arc::clone(&kernel), process);
    let serving = host.create_service("idle", 1, 0, 1).expect("fresh name");

    let receiver = NativeThread::spawn(&kernel, process, "receiver", false, move |ctx| {
        // Blocks indefinitely; only a termination request releases it.
        ctx.get_message(serving, Timeout::Infinite).map(|_| 0)
    });

    std::thread::sleep(Duration::from_millis(20));
    receiver.cancel(7);
    assert_eq!(receiver.join(), 7);

    host.close_handle(serving).expect("serving handle open");
    assert_eq!(kernel.ref_count(process), Some(1));
}

#[test]
fn bounded_receive_times_out_with_an_empty_backlog() {
    let kernel = Kernel::new();
    let process = kernel.create_process("poller");
    let host = GuestContext::host(Arc::clone(&kernel), process);
    let serving = host.create_service("idle", 1, 0, 1).expect("fresh name");

    let poller = NativeThread::spawn(&kernel, process, "poller", false, move |ctx| {
        ctx.get_message(serving, Timeout::Bounded(TimeInterval::new(10, TimeUnit::Ms)))
            .map(|_| 0)
    });

    // The runner negates a non-cancellation errno into the exit code.
    assert_eq!(poller.join(), -(KErrno::TimedOut.as_u32() as i32));
}
