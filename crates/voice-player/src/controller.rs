//! Playback controller: the per-session loop tying queue, decode and transport together.
//!
//! One controller thread runs per session. It starts the transport stage once, then
//! decodes the queue's current track, reacting to the decode outcome:
//! - `TrackEnded` / `Skip` / `DecodeFailed`: advance the queue
//! - `DecodeFailed` for every track of a repeating queue in a row: end the session
//! - `Reload`: re-read the current track
//! - `Stop` / `Error` / `Stopped`: tear the session down
//!
//! While the queue is empty the loop polls it; the transport's idle timeout eventually
//! cancels the session if nothing is queued.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use voice_player_types::{ExhaustPolicy, PlaybackEndReason, PlayerState};

use crate::config::PlayerConfig;
use crate::decode::{DecodeOutcome, DecodeStage, Frame};
use crate::error::{PlaybackError, QueueError, TransportError};
use crate::notify::{Notifier, notify_user};
use crate::player::Shared;
use crate::signal::{CancelToken, ControlSignal};
use crate::transport::{TransportExit, TransportStage, VoiceGateway};

/// How the play loop ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// A Stop signal ended the session.
    Stopped,
    /// The session token was cancelled (the transport exited).
    Cancelled,
}

pub(crate) struct Controller {
    pub(crate) shared: Arc<Shared>,
    pub(crate) config: Arc<PlayerConfig>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) cancel: CancelToken,
}

impl Controller {
    /// Run the session to completion. Clears the session's playing flag on return.
    pub(crate) fn run(self, gateway: Arc<dyn VoiceGateway>) {
        let mut session = SessionGuard {
            shared: &self.shared,
            reason: PlaybackEndReason::Error,
        };
        let (tx, rx) = bounded::<Frame>(self.config.frame_queue_capacity);

        let transport = match self.spawn_transport(gateway, rx.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                self.report(&err);
                return;
            }
        };

        let exit = self.play_loop(&tx, &rx);
        self.cancel.cancel();
        drop(tx);
        drop(rx);
        let transport_result = match transport.join() {
            Ok(result) => result.map_err(PlaybackError::from),
            Err(_) => Err(PlaybackError::Panicked("voice transport")),
        };

        session.reason = match (exit, transport_result) {
            (Err(err), transport_result) => {
                if let Err(transport_err) = transport_result {
                    tracing::warn!(error = %transport_err, "transport also failed");
                }
                self.report(&err);
                PlaybackEndReason::Error
            }
            (Ok(LoopExit::Stopped), transport_result) => {
                if let Err(err) = transport_result {
                    tracing::warn!(error = %err, "transport failed during stop");
                }
                tracing::info!("playback stopped");
                PlaybackEndReason::Stopped
            }
            (Ok(LoopExit::Cancelled), Ok(exit)) => {
                tracing::info!(?exit, "voice transport finished");
                PlaybackEndReason::Idle
            }
            (Ok(LoopExit::Cancelled), Err(err)) => {
                self.report(&err);
                PlaybackEndReason::Error
            }
        };
    }

    fn spawn_transport(
        &self,
        gateway: Arc<dyn VoiceGateway>,
        frames: Receiver<Frame>,
    ) -> Result<JoinHandle<Result<TransportExit, TransportError>>, PlaybackError> {
        let stage = TransportStage::new(&self.config, frames, self.cancel.clone())
            .with_counter(self.shared.frames_sent.clone());
        let shared = self.shared.clone();
        thread::Builder::new()
            .name("voice-transport".into())
            .spawn(move || {
                stage.run(gateway.as_ref(), || {
                    shared.update_state(|state| match state {
                        PlayerState::Starting => PlayerState::Playing,
                        other => other,
                    })
                })
            })
            .map_err(|source| PlaybackError::Thread {
                name: "voice-transport",
                source,
            })
    }

    fn play_loop(
        &self,
        frames: &Sender<Frame>,
        backlog: &Receiver<Frame>,
    ) -> Result<LoopExit, PlaybackError> {
        let stage = DecodeStage {
            config: &self.config,
            frames,
            backlog,
            signals: &self.shared.signals,
            cancel: &self.cancel,
        };
        let queue = &self.shared.queue;
        // Consecutive decode failures; a repeating queue that fails all the way round stops.
        let mut failures = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }
            let track = match queue.current() {
                Ok((track, _)) => track,
                Err(QueueError::NoSongs) => {
                    self.shared.update_state(|state| match state {
                        PlayerState::Playing => PlayerState::Idle,
                        other => other,
                    });
                    match self.shared.signals.take() {
                        Some(ControlSignal::Stop) => return Ok(LoopExit::Stopped),
                        Some(ControlSignal::Error(cause)) => {
                            return Err(PlaybackError::Aborted(cause));
                        }
                        Some(stale) => tracing::debug!(signal = ?stale, "ignoring signal, queue empty"),
                        None => {}
                    }
                    if self.cancel.wait_timeout(self.config.empty_queue_poll) {
                        return Ok(LoopExit::Cancelled);
                    }
                    continue;
                }
                Err(err) => {
                    tracing::error!(error = %err, "queue integrity error");
                    return Err(err.into());
                }
            };

            self.shared.update_state(|state| match state {
                PlayerState::Idle => PlayerState::Playing,
                other => other,
            });
            tracing::info!(track = %track.id(), name = %track.display_name(), "playing track");

            let outcome = stage.run(&track)?;
            if !matches!(outcome, DecodeOutcome::DecodeFailed(_)) {
                failures = 0;
            }
            match outcome {
                DecodeOutcome::TrackEnded => {
                    let (next, ended) = queue.skip_next();
                    if ended {
                        tracing::info!("queue finished");
                    } else if let Some(next) = next {
                        tracing::debug!(next = %next.id(), "track ended, advancing");
                    }
                }
                DecodeOutcome::Skip => {
                    queue.skip_next();
                }
                DecodeOutcome::Reload => {
                    tracing::debug!("reloading current track");
                }
                DecodeOutcome::Stop => return Ok(LoopExit::Stopped),
                DecodeOutcome::Stopped => return Ok(LoopExit::Cancelled),
                DecodeOutcome::Error(cause) => return Err(PlaybackError::Aborted(cause)),
                DecodeOutcome::DecodeFailed(err) => {
                    failures += 1;
                    let len = queue.len();
                    if queue.policy() == ExhaustPolicy::Wrap && failures >= len {
                        tracing::warn!(track = %track.id(), error = %err, failures, "no playable track left");
                        return Err(PlaybackError::NothingPlayable(len));
                    }
                    tracing::warn!(track = %track.id(), error = %err, "decode failed, skipping");
                    notify_user(
                        self.notifier.as_ref(),
                        &format!("couldn't play {}: {err}", track.display_name()),
                    );
                    queue.skip_next();
                }
            }
        }
    }

    fn report(&self, err: &PlaybackError) {
        tracing::error!(error = %err, "playback session failed");
        notify_user(self.notifier.as_ref(), &format!("playback stopped: {err}"));
    }
}

/// Marks the session finished exactly once, even if the controller panics.
struct SessionGuard<'a> {
    shared: &'a Shared,
    reason: PlaybackEndReason,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.shared.finish_session(self.reason);
    }
}
