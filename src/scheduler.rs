//! Coalescing flush scheduler shared by both reference kinds.
//!
//! The entire state is one pending flag plus a sticky dirty marker. A
//! mutation claims the pending slot and waits (the configured debounce, or
//! the next scheduling tick); further non-immediate mutations inside the
//! window coalesce into the already-claimed flush. An immediate flush may
//! steal the slot from a waiting delayed one, which then detects the consumed
//! slot on resume and aborts. Last write wins, at most one flush per window.

use std::time::Duration;

/// Decides whether a mutation triggers an immediate, delayed, or suppressed
/// flush notification.
#[derive(Debug)]
pub(crate) struct FlushScheduler {
    /// Configured debounce interval; `None` flushes on the next tick.
    debounce: Option<Duration>,

    /// A flush is claimed but not yet resolved.
    pending: bool,

    /// Some mutation has not been acknowledged as persisted yet.
    /// Set on every mutation, cleared only by the owner.
    dirty: bool,
}

impl FlushScheduler {
    pub(crate) fn new(debounce: Option<Duration>) -> Self {
        Self {
            debounce,
            pending: false,
            dirty: false,
        }
    }

    /// Claim the pending slot for a new flush.
    ///
    /// Returns `false` when a flush is already pending and this call is not
    /// immediate: the upcoming flush picks up the latest state, nothing else
    /// to do. An immediate call always proceeds, converting a waiting delayed
    /// flush into one that resolves now.
    pub(crate) fn begin(&mut self, immediate: bool) -> bool {
        self.dirty = true;
        if !immediate && self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    /// How long a claimed flush waits before resolving.
    ///
    /// `None` means the shortest schedulable unit: yield and resume on the
    /// next tick.
    pub(crate) fn wait(&self, immediate: bool) -> Option<Duration> {
        if immediate {
            None
        } else {
            self.debounce
        }
    }

    /// Resolve a claimed flush after its wait.
    ///
    /// Returns `false` when a faster flush already consumed the pending slot
    /// while this one was waiting; the caller must abort without touching the
    /// context.
    pub(crate) fn commit(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        true
    }

    /// Whether some mutation has not been acknowledged as persisted.
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Owner acknowledgement that flushed bytes reached storage.
    pub(crate) fn acknowledge_persisted(&mut self) {
        self.dirty = false;
    }
}

/// Suspend the current task until a claimed flush becomes due.
pub(crate) async fn flush_wait(wait: Option<Duration>) {
    match wait {
        Some(interval) => tokio::time::sleep(interval).await,
        None => tokio::task::yield_now().await,
    }
}
