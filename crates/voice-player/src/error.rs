//! Error types for the playback pipeline.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Queue access failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no songs in player queue")]
    NoSongs,
    #[error("invalid queue index {0}: index cannot be below zero")]
    InvalidIndex(isize),
    /// Cursor outside the list. Indicates a locking bug.
    #[error("queue cursor {current} out of range for {len} tracks")]
    Corrupted { current: usize, len: usize },
}

/// Ogg container parse failures.
#[derive(Debug, Error)]
pub enum OggError {
    #[error("missing OggS capture pattern")]
    BadCapture,
    #[error("unsupported ogg stream structure version {0}")]
    BadVersion(u8),
    #[error("truncated ogg page")]
    Truncated,
    #[error("unexpected logical stream serial {found:#x} (expected {expected:#x})")]
    UnexpectedSerial { expected: u32, found: u32 },
    #[error("continuation page without a pending packet")]
    OrphanContinuation,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Decode stage failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to spawn decoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("decoder stdout unavailable")]
    NoStdout,
    #[error("decoder output: {0}")]
    Demux(#[from] OggError),
    /// The decoder exited unsuccessfully without producing any audio.
    #[error("decoder exited with {0}")]
    Exited(ExitStatus),
}

/// Voice transport failures. All of them end the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to join voice channel: {0}")]
    Join(String),
    #[error("voice connection not ready after {0:?}")]
    NotReady(Duration),
    #[error("voice connection did not accept a frame within {0:?}")]
    Stalled(Duration),
    #[error("voice connection closed its send path")]
    Closed,
}

/// Reasons a playback session terminated abnormally.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// An `Error` control signal was raised for the session.
    #[error("playback aborted: {0}")]
    Aborted(String),
    /// Every track of a repeating queue failed to decode in a row.
    #[error("none of the {0} queued tracks could be played")]
    NothingPlayable(usize),
    #[error("{0} thread panicked")]
    Panicked(&'static str),
    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Playlist book failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaylistError {
    #[error("playlist title cannot be empty")]
    EmptyTitle,
    #[error("playlist category cannot be empty")]
    EmptyCategory,
    #[error("playlist `{0}` already exists")]
    PlaylistExists(String),
    #[error("playlist `{0}` not found")]
    PlaylistNotFound(String),
}

/// Session registry failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(u64),
    #[error("no session for guild `{0}`")]
    GuildNotFound(String),
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("no voice gateway bound to session")]
    NoGateway,
}

/// Track resolution failures surfaced by a [`crate::Resolver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("could not resolve `{query}`: {reason}")]
    ResolutionFailed { query: String, reason: String },
}
