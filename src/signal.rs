//! Flush-due signaling between a reference and its owning store.
//!
//! The owning store subscribes to a reference and receives a
//! [`FlushNotice`] whenever a coalesced flush resolves. Serializing and
//! writing bytes, and any file-level throttling beyond the reference-level
//! coalescing, stay on the store's side.

use crate::types::StoreFileType;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::time::Duration;

/// Buffered notices per subscriber before it is dropped as a slow consumer.
const SIGNAL_BUFFER: usize = 256;

/// A flush became due on a reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushNotice {
    /// Store file id to persist.
    pub id: String,

    /// Revision the flush reached.
    pub rev: u64,

    /// Which reference kind emitted the notice.
    pub kind: StoreFileType,
}

/// Handle for receiving flush notices from one reference.
pub struct FlushSignal {
    receiver: Receiver<FlushNotice>,
}

impl FlushSignal {
    /// Receive the next notice (blocking).
    pub fn recv(&self) -> Result<FlushNotice, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notice (non-blocking).
    pub fn try_recv(&self) -> Result<FlushNotice, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<FlushNotice, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Fans notices out to subscribers.
///
/// Subscribers that disconnect or stop draining are dropped rather than
/// blocking the mutation path. Emitting with no subscribers is a no-op.
pub(crate) struct Notifier {
    senders: Mutex<Vec<Sender<FlushNotice>>>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Open a new subscription.
    pub(crate) fn subscribe(&self) -> FlushSignal {
        let (sender, receiver) = bounded(SIGNAL_BUFFER);
        self.senders.lock().push(sender);
        FlushSignal { receiver }
    }

    /// Emit a notice to every live subscriber.
    pub(crate) fn emit(&self, notice: FlushNotice) {
        let mut senders = self.senders.lock();
        senders.retain(|sender| sender.try_send(notice.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.senders.lock().len()
    }
}
