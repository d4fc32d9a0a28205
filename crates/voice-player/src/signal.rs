//! Control signals and session cancellation.
//!
//! - [`SignalSlot`]: single-slot conduit for user commands; a new signal replaces a
//!   pending one, except that a pending `Stop`/`Error` is never downgraded.
//! - [`CancelToken`]: session-wide cancellation that can be awaited in `select!`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select};

/// Preemption request for the active track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    /// Restart from the queue's current track.
    Reload,
    /// Move to the next track.
    Skip,
    /// End the session.
    Stop,
    /// End the session with a user-visible error.
    Error(String),
}

impl ControlSignal {
    /// `true` for signals that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ControlSignal::Stop | ControlSignal::Error(_))
    }
}

/// At most one in-flight [`ControlSignal`] plus a doorbell channel.
///
/// Stages poll [`SignalSlot::take`] at frame boundaries and may block on
/// [`SignalSlot::doorbell`] inside `select!`. A doorbell ring can be spurious, so the
/// slot is the source of truth.
pub struct SignalSlot {
    slot: Mutex<Option<ControlSignal>>,
    bell_tx: Sender<()>,
    bell_rx: Receiver<()>,
}

impl SignalSlot {
    pub fn new() -> Self {
        let (bell_tx, bell_rx) = bounded(1);
        Self {
            slot: Mutex::new(None),
            bell_tx,
            bell_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ControlSignal>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a signal, replacing any pending non-terminal one.
    pub fn raise(&self, signal: ControlSignal) {
        {
            let mut slot = self.lock();
            let keep_pending = matches!(&*slot, Some(pending) if pending.is_terminal())
                && !signal.is_terminal();
            if keep_pending {
                tracing::debug!(?signal, "signal dropped behind pending terminal signal");
            } else {
                *slot = Some(signal);
            }
        }
        let _ = self.bell_tx.try_send(());
    }

    /// Consume the pending signal, if any.
    pub fn take(&self) -> Option<ControlSignal> {
        // Drain the bell before reading the slot so a concurrent raise always leaves a ring.
        while self.bell_rx.try_recv().is_ok() {}
        self.lock().take()
    }

    /// Look at the pending signal without consuming it.
    pub fn peek(&self) -> Option<ControlSignal> {
        self.lock().clone()
    }

    /// Receiver that becomes ready when a signal may be pending.
    pub fn doorbell(&self) -> &Receiver<()> {
        &self.bell_rx
    }
}

impl Default for SignalSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable cancellation flag for one playback session.
///
/// Cancelling drops the internal sender, so [`CancelToken::channel`] turns
/// permanently ready (disconnected) for every clone.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Cancel the session. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            let mut tx = self.inner.tx.lock().unwrap_or_else(PoisonError::into_inner);
            tx.take();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that never yields a value and disconnects on cancel.
    pub fn channel(&self) -> &Receiver<()> {
        &self.inner.rx
    }

    /// Sleep for `timeout` or until cancelled. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        select! {
            recv(self.channel()) -> _ => true,
            default(timeout) => self.is_cancelled(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
