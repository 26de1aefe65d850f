//! Per-camera link between a capture worker and the controller.
//!
//! Samples travel over a bounded channel. Next to it sits a counting
//! readiness signal: the publisher raises it after each send, the controller
//! waits on it and lowers it once the sample is consumed. Because the count
//! only moves under its mutex, a raise that lands while the controller is
//! between cycles is never lost.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Condvar, Mutex};

use super::messages::DisplacementSample;

#[derive(Default)]
struct Readiness {
    /// Samples sent but not yet acknowledged.
    pending: u64,
    /// The publisher is gone; nothing more will be signalled.
    closed: bool,
}

#[derive(Default)]
struct Signal {
    state: Mutex<Readiness>,
    cond: Condvar,
}

/// The receiving side hung up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// Worker half of a camera link.
pub struct SamplePublisher {
    sender: Sender<DisplacementSample>,
    signal: Arc<Signal>,
}

/// Controller half of a camera link.
pub struct SampleSubscriber {
    receiver: Receiver<DisplacementSample>,
    signal: Arc<Signal>,
}

/// Create a link whose channel holds at most `capacity` unconsumed samples.
pub fn camera_link(capacity: usize) -> (SamplePublisher, SampleSubscriber) {
    let (sender, receiver) = bounded(capacity);
    let signal = Arc::new(Signal::default());
    (
        SamplePublisher {
            sender,
            signal: signal.clone(),
        },
        SampleSubscriber { receiver, signal },
    )
}

impl SamplePublisher {
    /// Send a sample, blocking while the channel is full, then signal it.
    pub fn publish(&self, sample: DisplacementSample) -> Result<(), Disconnected> {
        self.sender.send(sample).map_err(|_| Disconnected)?;
        let mut state = self.signal.state.lock();
        state.pending += 1;
        self.signal.cond.notify_all();
        Ok(())
    }
}

impl Drop for SamplePublisher {
    fn drop(&mut self) {
        let mut state = self.signal.state.lock();
        state.closed = true;
        self.signal.cond.notify_all();
    }
}

impl SampleSubscriber {
    /// Block until at least one sample is pending, or the publisher is gone.
    pub fn wait_ready(&self) {
        let mut state = self.signal.state.lock();
        while state.pending == 0 && !state.closed {
            self.signal.cond.wait(&mut state);
        }
    }

    /// Samples signalled and not yet acknowledged.
    pub fn pending(&self) -> u64 {
        self.signal.state.lock().pending
    }

    /// Next sample in publication order.
    ///
    /// A publisher that vanished without its end-of-stream marker reads as
    /// end-of-stream.
    pub fn take(&self) -> DisplacementSample {
        self.receiver
            .recv()
            .unwrap_or(DisplacementSample::EndOfStream { cycles: 0 })
    }

    /// Consume one readiness signal after its sample has been handled.
    pub fn acknowledge(&self) {
        let mut state = self.signal.state.lock();
        state.pending = state.pending.saturating_sub(1);
    }
}
