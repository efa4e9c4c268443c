//! Counting gate that serializes access to the debugging session.
//!
//! Admits at most `capacity` concurrent holders; excess acquirers suspend and
//! are resumed in strict arrival order, one per release. A successful
//! [`acquire`](Gate::acquire) hands back a [`GateGuard`] that returns the
//! permit on drop, so neither an error path nor a cancelled holder can
//! strand the queue behind it. There is no timeout: a waiter whose matching
//! release never happens suspends indefinitely.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

struct GateState {
    /// Remaining capacity. Negative values count queued waiters.
    remaining: i64,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// FIFO counting semaphore. `remaining + live queue length` is conserved
/// across every acquire/release pair.
pub struct Gate {
    state: Mutex<GateState>,
}

impl Gate {
    pub fn new(capacity: i64) -> Self {
        Self {
            state: Mutex::new(GateState {
                remaining: capacity,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Takes one unit of capacity, suspending until a release resumes this
    /// caller when none is available. The returned guard releases on drop.
    pub async fn acquire(&self) -> GateGuard<'_> {
        let receiver = {
            let mut state = self.state.lock();
            state.remaining -= 1;
            if state.remaining >= 0 {
                return GateGuard { gate: self };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        PendingAcquire {
            gate: self,
            receiver,
            granted: false,
        }
        .await;

        GateGuard { gate: self }
    }

    /// Returns one unit of capacity, resuming the head waiter if any are
    /// queued. Releasing more often than acquiring simply grows capacity.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.remaining += 1;
        while state.remaining <= 0 {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            if waiter.send(()).is_ok() {
                break;
            }
            // The waiter was cancelled while queued; undo its reservation
            // and try the next one.
            state.remaining += 1;
        }
    }
}

/// A held permit. Dropping it releases the gate, which is what guarantees
/// the exactly-once release even when the holder's future is dropped
/// mid-flight.
#[must_use = "dropping the guard releases the gate immediately"]
pub struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// A queued acquire. Cancellation while queued leaves a dead entry that
/// `release()` compensates for; a grant that arrives in the same instant the
/// future is dropped is handed straight back.
struct PendingAcquire<'a> {
    gate: &'a Gate,
    receiver: oneshot::Receiver<()>,
    granted: bool,
}

impl Future for PendingAcquire<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A closed channel means the gate itself is gone; nothing is left to
        // contend for, so proceed either way.
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(_) => {
                self.granted = true;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        if self.receiver.try_recv().is_ok() {
            self.gate.release();
        }
    }
}
