//! Async I/O task — reactor-driven bridge between a transport and the
//! protocol actors.
//!
//! Runs on one thread using `edge-executor` for cooperative scheduling
//! and `async-io-mini` timers (no busy-spinning). Two concurrent futures:
//!
//! 1. **Inbound**: drains the transport every 1ms, dispatches each
//!    packet, writes the reply packet if there is one
//! 2. **Autosend**: sleeps for the current interval, runs one tick,
//!    writes the batch if anything changed
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────┐
//!  │  I/O Thread                                          │
//!  │  ┌────────────────────────────────────────────────┐  │
//!  │  │  futures_lite::block_on                        │  │
//!  │  │  ┌──────────────────────────────────────────┐  │  │
//!  │  │  │  edge_executor::LocalExecutor            │  │  │
//!  │  │  │   ┌───────────┐      ┌──────────────┐    │  │  │
//!  │  │  │   │ Inbound   │      │ Autosend     │    │  │  │
//!  │  │  │   │ 1ms ⏱     │      │ interval ⏱   │    │  │  │
//!  │  │  │   └───────────┘      └──────────────┘    │  │  │
//!  │  │  └──────────────────────────────────────────┘  │  │
//!  │  └────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────┘
//! ```
//!
//! Both futures share the transport through `Rc<RefCell<_>>`; neither
//! holds the borrow across an await point.

use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::autosend::Autosender;

use super::engine::Dispatcher;
use super::transport::Transport;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Cooperative stop flag shared with whoever owns the I/O thread.
pub type Shutdown = Arc<AtomicBool>;

type SharedTransport<T> = Rc<RefCell<T>>;

fn send<T: Transport>(transport: &SharedTransport<T>, packet: &[u8], what: &str) {
    let mut t = transport.borrow_mut();
    match t.write(packet).and_then(|_| t.flush()) {
        Ok(()) => debug!("IO: {} sent ({} bytes)", what, packet.len()),
        Err(e) => warn!("IO: {} write failed: {:?}", what, e),
    }
}

/// Inbound task. A read error ends the session.
async fn inbound_loop<T: Transport>(
    transport: SharedTransport<T>,
    dispatcher: Rc<Dispatcher>,
    max_packet_len: usize,
    shutdown: Shutdown,
) {
    let mut buf = vec![0u8; max_packet_len];
    while !shutdown.load(Ordering::Relaxed) {
        loop {
            let read = transport.borrow_mut().read(&mut buf);
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    info!("IO: transport closed: {:?}", e);
                    shutdown.store(true, Ordering::Relaxed);
                    return;
                }
            };
            debug!("IO: packet in ({} bytes)", n);
            if let Some(reply) = dispatcher.handle_inbound(&buf[..n]) {
                send(&transport, &reply, "reply");
            }
        }
        async_io_mini::Timer::after(POLL_INTERVAL).await;
    }
}

/// Autosend task. The interval is re-read every cycle so a write to the
/// control address takes effect on the next sleep.
async fn autosend_loop<T: Transport>(
    transport: SharedTransport<T>,
    autosender: Autosender,
    shutdown: Shutdown,
) {
    while !shutdown.load(Ordering::Relaxed) {
        async_io_mini::Timer::after(autosender.interval()).await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if let Some(packet) = autosender.tick_packet() {
            send(&transport, &packet, "autosend");
        }
    }
}

/// Drive `transport` until `shutdown` is raised or the transport fails.
pub fn run<T: Transport>(
    transport: T,
    dispatcher: Dispatcher,
    autosender: Option<Autosender>,
    max_packet_len: usize,
    shutdown: Shutdown,
) {
    let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();
    let transport: SharedTransport<T> = Rc::new(RefCell::new(transport));

    executor
        .spawn(inbound_loop(
            transport.clone(),
            Rc::new(dispatcher),
            max_packet_len,
            shutdown.clone(),
        ))
        .detach();
    if let Some(autosender) = autosender {
        executor
            .spawn(autosend_loop(transport.clone(), autosender, shutdown.clone()))
            .detach();
    }

    info!("IO task started (async, reactor-driven)");
    futures_lite::future::block_on(executor.run(async {
        while !shutdown.load(Ordering::Relaxed) {
            async_io_mini::Timer::after(SHUTDOWN_POLL).await;
        }
    }));
    info!("IO task stopped");
}

/// Run the I/O task on a dedicated thread.
pub fn spawn<T: Transport + Send + 'static>(
    transport: T,
    dispatcher: Dispatcher,
    autosender: Option<Autosender>,
    max_packet_len: usize,
    shutdown: Shutdown,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("osc-io".into())
        .spawn(move || run(transport, dispatcher, autosender, max_packet_len, shutdown))
}
