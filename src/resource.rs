//! Single-outstanding-request access to a slow peripheral.
//!
//! A conversion is started, the requester suspends, and some other
//! context (an interrupt on hardware, a conversion thread in simulation)
//! delivers the result. One request at a time per resource:
//!
//! ```text
//!   requester A ──lock──▶ start(ticket) ──wait(signal | timeout)──▶ unlock
//!   requester B ──lock (queued behind A) ...
//!   completion ctx ──────────────▶ complete(ticket, value) ──▶ signal
//! ```
//!
//! Every request gets a fresh ticket. A completion carrying any other
//! ticket belongs to a request that already timed out and is dropped.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::debug;

/// Mutex-guarded completion slot.
pub struct CompletionSlot<T: Send> {
    lock: Mutex<CriticalSectionRawMutex, ()>,
    done: Signal<CriticalSectionRawMutex, (u32, T)>,
    next_ticket: AtomicU32,
}

impl<T: Send> Default for CompletionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> CompletionSlot<T> {
    pub const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            done: Signal::new(),
            next_ticket: AtomicU32::new(0),
        }
    }

    /// Start a request and await its completion.
    ///
    /// `start` runs with the slot held and receives the ticket the
    /// completion must carry. Returns `None` if no matching completion
    /// arrives within `timeout`.
    pub async fn request(&self, start: impl FnOnce(u32), timeout: Duration) -> Option<T> {
        let _guard = self.lock.lock().await;
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.done.reset();
        start(ticket);

        let completed = async {
            loop {
                let (from, value) = self.done.wait().await;
                if from == ticket {
                    return Some(value);
                }
                debug!("IO: dropped late completion for ticket {} (waiting on {})", from, ticket);
            }
        };
        let expired = async {
            async_io_mini::Timer::after(timeout).await;
            None
        };
        let result = future::or(completed, expired).await;
        if result.is_none() {
            debug!("IO: request timed out after {:?}", timeout);
        }
        result
    }

    /// Blocking wrapper for synchronous callers (handlers, getters).
    pub fn request_blocking(&self, start: impl FnOnce(u32), timeout: Duration) -> Option<T> {
        future::block_on(self.request(start, timeout))
    }

    /// Deliver the result for `ticket`. Callable from any thread.
    pub fn complete(&self, ticket: u32, value: T) {
        self.done.signal((ticket, value));
    }
}
