//! Per-session player handle.
//!
//! [`Player`] is what request handlers talk to: it owns the queue, the signal slot and
//! the session flag, and spawns at most one controller thread at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use voice_player_types::{ExhaustPolicy, PlaybackEndReason, PlayerState, PlayerStatus, Track};

use crate::config::PlayerConfig;
use crate::controller::Controller;
use crate::error::QueueError;
use crate::notify::{Notifier, notify_user};
use crate::queue::TrackQueue;
use crate::signal::{CancelToken, ControlSignal, SignalSlot};
use crate::transport::VoiceGateway;

/// State shared between the handle and the controller thread.
pub(crate) struct Shared {
    pub(crate) queue: Arc<TrackQueue>,
    pub(crate) signals: SignalSlot,
    pub(crate) frames_sent: Arc<AtomicU64>,
    session: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    playing: bool,
    state: PlayerState,
    end_reason: Option<PlaybackEndReason>,
    cancel: Option<CancelToken>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update_state(&self, f: impl FnOnce(PlayerState) -> PlayerState) {
        let mut session = self.lock();
        if session.playing {
            session.state = f(session.state);
        }
    }

    /// Called once by the controller thread on its way out.
    pub(crate) fn finish_session(&self, reason: PlaybackEndReason) {
        let mut session = self.lock();
        session.playing = false;
        session.state = PlayerState::Stopped;
        session.end_reason = Some(reason);
        if let Some(cancel) = session.cancel.take() {
            cancel.cancel();
        }
        tracing::info!(?reason, "playback session ended");
    }
}

/// Cloneable handle to one voice session's playback.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
    config: Arc<PlayerConfig>,
    controller: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Player {
    /// Player with an empty ephemeral queue.
    pub fn new(config: PlayerConfig) -> Self {
        Self::with_queue(config, Arc::new(TrackQueue::new(ExhaustPolicy::Clear)))
    }

    /// Player driving an existing queue.
    pub fn with_queue(config: PlayerConfig, queue: Arc<TrackQueue>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue,
                signals: SignalSlot::new(),
                frames_sent: Arc::new(AtomicU64::new(0)),
                session: Mutex::new(SessionState::default()),
            }),
            config: Arc::new(config),
            controller: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the playback loop. Returns `false` (and does nothing) if already playing.
    pub fn start(&self, notifier: Arc<dyn Notifier>, gateway: Arc<dyn VoiceGateway>) -> bool {
        let cancel = CancelToken::new();
        {
            let mut session = self.shared.lock();
            if session.playing {
                return false;
            }
            // Signals are only raised while `playing`, so none can slip in before the flag flips.
            if let Some(stale) = self.shared.signals.take() {
                tracing::debug!(signal = ?stale, "dropping signal from previous session");
            }
            session.playing = true;
            session.state = PlayerState::Starting;
            session.end_reason = None;
            session.cancel = Some(cancel.clone());
        }
        self.shared.frames_sent.store(0, Ordering::Relaxed);

        let mut slot = self.controller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            // Already past `finish_session`; joins promptly.
            let _ = previous.join();
        }
        let controller = Controller {
            shared: self.shared.clone(),
            config: self.config.clone(),
            notifier: notifier.clone(),
            cancel,
        };
        let spawned = thread::Builder::new()
            .name("playback-controller".into())
            .spawn(move || controller.run(gateway));
        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                tracing::info!("playback session started");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn playback controller");
                self.shared.finish_session(PlaybackEndReason::Error);
                notify_user(notifier.as_ref(), &format!("playback failed to start: {err}"));
                false
            }
        }
    }

    /// Append a track to the queue.
    pub fn queue_append(&self, track: Track) {
        tracing::debug!(track = %track.id(), "queued");
        self.shared.queue.append(track);
    }

    /// Insert a track at `index` (past the end appends).
    pub fn queue_insert(&self, index: isize, track: Track) -> Result<(), QueueError> {
        self.shared.queue.insert(index, track)
    }

    /// Replace the queue with a repeating playlist and restart from its first track.
    pub fn set_queue(&self, tracks: Vec<Track>) {
        self.shared.queue.replace(tracks, ExhaustPolicy::Wrap);
        if self.is_playing() {
            self.shared.signals.raise(ControlSignal::Reload);
        }
    }

    /// Skip the current track. Without an active session this just advances the queue.
    pub fn skip(&self) {
        if self.is_playing() {
            self.shared.signals.raise(ControlSignal::Skip);
        } else {
            self.shared.queue.skip_next();
        }
    }

    /// Restart the current track from the queue. No-op without an active session.
    pub fn reload(&self) {
        if self.is_playing() {
            self.shared.signals.raise(ControlSignal::Reload);
        }
    }

    /// End the session. No-op without an active session.
    pub fn stop(&self) {
        if self.is_playing() {
            self.shared.signals.raise(ControlSignal::Stop);
        }
    }

    /// Abort the session with a user-visible error.
    pub fn abort(&self, cause: impl Into<String>) {
        if self.is_playing() {
            self.shared.signals.raise(ControlSignal::Error(cause.into()));
        }
    }

    /// Current track and the whole queue.
    pub fn currently_playing(&self) -> Result<(Track, Vec<Track>), QueueError> {
        self.shared.queue.current()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().playing
    }

    pub fn state(&self) -> PlayerState {
        self.shared.lock().state
    }

    pub fn queue(&self) -> &Arc<TrackQueue> {
        &self.shared.queue
    }

    /// Snapshot for status reporting.
    pub fn status(&self) -> PlayerStatus {
        let (state, playing, end_reason) = {
            let session = self.shared.lock();
            (session.state, session.playing, session.end_reason)
        };
        let queue = &self.shared.queue;
        PlayerStatus {
            state,
            playing,
            now_playing: queue.current().ok().map(|(track, _)| track),
            queue: queue.snapshot(),
            policy: queue.policy(),
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
            end_reason,
        }
    }

    /// Block until the current controller thread (if any) exits.
    pub fn wait(&self) -> Option<PlaybackEndReason> {
        let handle = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("playback controller panicked");
            }
        }
        self.shared.lock().end_reason
    }
}
