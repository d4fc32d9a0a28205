//! Decode stage: one external decoder process per track.
//!
//! The decoder writes Ogg/Opus to stdout. A reader thread demuxes it into packets,
//! and the stage forwards them onto the bounded frame queue. Each frame boundary
//! checks cancellation and the signal slot. The child is killed on every exit path.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Select, Sender, bounded, select};
use voice_player_types::Track;

use crate::config::PlayerConfig;
use crate::error::{DecodeError, OggError};
use crate::ogg::OggPacketReader;
use crate::signal::{CancelToken, ControlSignal, SignalSlot};

/// One encoded audio frame (an Opus packet).
pub type Frame = Vec<u8>;

/// Packets buffered between the reader thread and the stage.
const READER_BACKLOG: usize = 8;

/// How long a decoder may linger after closing stdout before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);
const EXIT_POLL: Duration = Duration::from_millis(10);

/// Why a decode stage returned.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Decoder reached end of stream.
    TrackEnded,
    Reload,
    Skip,
    Stop,
    /// The session was cancelled (transport gone).
    Stopped,
    /// An `Error` control signal arrived.
    Error(String),
    /// The decoder output could not be read or parsed.
    DecodeFailed(DecodeError),
}

impl From<ControlSignal> for DecodeOutcome {
    fn from(signal: ControlSignal) -> Self {
        match signal {
            ControlSignal::Reload => DecodeOutcome::Reload,
            ControlSignal::Skip => DecodeOutcome::Skip,
            ControlSignal::Stop => DecodeOutcome::Stop,
            ControlSignal::Error(cause) => DecodeOutcome::Error(cause),
        }
    }
}

impl DecodeOutcome {
    /// `true` when a control signal cut the track short.
    fn is_preempted(&self) -> bool {
        matches!(
            self,
            DecodeOutcome::Reload
                | DecodeOutcome::Skip
                | DecodeOutcome::Stop
                | DecodeOutcome::Error(_)
        )
    }
}

/// Borrowed wiring for running decode stages on the controller thread.
pub struct DecodeStage<'a> {
    pub config: &'a PlayerConfig,
    /// Producer side of the bounded frame queue.
    pub frames: &'a Sender<Frame>,
    /// Consumer handle used only to discard frames of a preempted track.
    pub backlog: &'a Receiver<Frame>,
    pub signals: &'a SignalSlot,
    pub cancel: &'a CancelToken,
}

impl DecodeStage<'_> {
    /// Decode `track` until it ends or is preempted.
    ///
    /// `Err` means the decoder could not be started at all.
    pub fn run(&self, track: &Track) -> Result<DecodeOutcome, DecodeError> {
        let source = track.media_source();
        let decoder = &self.config.decoder;
        let child = decoder
            .command(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DecodeError::Spawn {
                program: decoder.program.clone(),
                source,
            })?;
        let mut child = ChildGuard(child);
        tracing::debug!(track = %track.id(), pid = child.0.id(), "decoder started");

        if let Some(stderr) = child.0.stderr.take() {
            forward_stderr(stderr, track.id().to_string());
        }
        let stdout = child.0.stdout.take().ok_or(DecodeError::NoStdout)?;
        let packets = spawn_packet_reader(stdout);

        let mut forwarded = 0;
        let mut outcome = self.pump(&packets, &mut forwarded);
        if outcome.is_preempted() {
            let dropped = self.backlog.try_iter().count();
            tracing::debug!(track = %track.id(), dropped, "discarded queued frames");
        }
        if matches!(outcome, DecodeOutcome::TrackEnded) {
            match child.reap(EXIT_GRACE) {
                Some(status) if !status.success() && forwarded == 0 => {
                    outcome = DecodeOutcome::DecodeFailed(DecodeError::Exited(status));
                }
                Some(status) if !status.success() => {
                    tracing::warn!(track = %track.id(), %status, forwarded, "decoder exited uncleanly");
                }
                Some(_) => {}
                None => tracing::debug!(track = %track.id(), "decoder closed stdout but kept running"),
            }
        }
        tracing::debug!(track = %track.id(), forwarded, ?outcome, "decoder finished");
        Ok(outcome)
    }

    fn pump(
        &self,
        packets: &Receiver<Result<Frame, OggError>>,
        forwarded: &mut usize,
    ) -> DecodeOutcome {
        let mut to_skip = self.config.skip_leading_frames;
        loop {
            if self.cancel.is_cancelled() {
                return DecodeOutcome::Stopped;
            }
            if let Some(signal) = self.signals.take() {
                return signal.into();
            }
            let packet = select! {
                recv(self.cancel.channel()) -> _ => return DecodeOutcome::Stopped,
                recv(self.signals.doorbell()) -> _ => continue,
                recv(packets) -> msg => match msg {
                    Ok(Ok(packet)) => packet,
                    Ok(Err(err)) => return DecodeOutcome::DecodeFailed(err.into()),
                    Err(_) => return DecodeOutcome::TrackEnded,
                },
            };
            if to_skip > 0 {
                to_skip -= 1;
                continue;
            }
            if let Some(outcome) = self.forward(packet) {
                return outcome;
            }
            *forwarded += 1;
        }
    }

    /// Block until the frame is queued or something preempts the track.
    fn forward(&self, frame: Frame) -> Option<DecodeOutcome> {
        loop {
            let mut sel = Select::new();
            let cancelled = sel.recv(self.cancel.channel());
            sel.recv(self.signals.doorbell());
            let accepted = sel.send(self.frames);
            let op = sel.select();
            let index = op.index();
            if index == accepted {
                return match op.send(self.frames, frame) {
                    Ok(()) => None,
                    // Transport side dropped the queue.
                    Err(_) => Some(DecodeOutcome::Stopped),
                };
            }
            if index == cancelled {
                let _ = op.recv(self.cancel.channel());
                return Some(DecodeOutcome::Stopped);
            }
            let _ = op.recv(self.signals.doorbell());
            if let Some(signal) = self.signals.take() {
                return Some(signal.into());
            }
        }
    }
}

/// Kills and reaps the decoder when dropped.
struct ChildGuard(Child);

impl ChildGuard {
    /// Exit status once the child has exited, polling for at most `grace`.
    fn reap(&mut self, grace: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + grace;
        loop {
            match self.0.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!(pid = self.0.id(), error = %err, "failed to poll decoder");
                    return None;
                }
            }
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(Some(status)) = self.0.try_wait() {
            tracing::debug!(pid = self.0.id(), %status, "decoder exited");
            return;
        }
        if let Err(err) = self.0.kill() {
            tracing::warn!(pid = self.0.id(), error = %err, "failed to kill decoder");
        }
        let _ = self.0.wait();
    }
}

/// Demux stdout on a detached thread. The channel disconnects at end of stream.
///
/// Killing the child closes the pipe, which unblocks the read and ends the thread.
fn spawn_packet_reader<R: Read + Send + 'static>(
    stdout: R,
) -> Receiver<Result<Frame, OggError>> {
    let (tx, rx) = bounded(READER_BACKLOG);
    let spawned = thread::Builder::new()
        .name("decoder-reader".into())
        .spawn(move || {
            let mut reader = OggPacketReader::new(BufReader::with_capacity(16 * 1024 * 4, stdout));
            loop {
                match reader.next_packet() {
                    Ok(Some(packet)) => {
                        if tx.send(Ok(packet)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        return;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        tracing::error!(error = %err, "failed to spawn decoder reader thread");
    }
    rx
}

fn forward_stderr<R: Read + Send + 'static>(stderr: R, track: String) {
    let spawned = thread::Builder::new()
        .name("decoder-stderr".into())
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) if !line.trim().is_empty() => {
                        tracing::debug!(track = %track, "decoder: {line}");
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "failed to spawn decoder stderr thread");
    }
}
