use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A resolved, playable media reference.
///
/// The URL doubles as the track identity: two tracks are equal when their ids match,
/// regardless of display metadata or where the media was resolved to on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Track {
    /// Source URL (or any stable reference the resolver hands out).
    pub url: String,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Uploader/artist, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    /// Local media path once the resolver has fetched the track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Track {
    /// Build a track that only carries its identity.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a resolved local media path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Resolution-independent identity of the track.
    pub fn id(&self) -> &str {
        &self.url
    }

    /// Name shown to users: display name when known, else the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Reference handed to the decoder: the local path when resolved, else the URL.
    pub fn media_source(&self) -> &str {
        match self.path.as_deref().and_then(Path::to_str) {
            Some(path) => path,
            None => &self.url,
        }
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Track {}

/// What a queue does when its cursor advances past the last track.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustPolicy {
    /// Ephemeral queue: drop every track and report that the queue ended.
    #[default]
    Clear,
    /// Playlist-backed queue: wrap to the first track and keep going.
    Wrap,
}

/// Lifecycle state of a playback session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// No loop running, or the loop is waiting for tracks.
    #[default]
    Idle,
    /// Loop started, voice transport not ready yet.
    Starting,
    /// A track is being decoded and forwarded.
    Playing,
    /// The loop has terminated.
    Stopped,
}

/// Reason the last playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// The voice transport went idle or the queue ran dry and the session timed out.
    Idle,
    /// Playback was explicitly stopped by a command.
    Stopped,
    /// A decoder, transport, or queue error ended the session.
    Error,
}

/// Point-in-time view of a session, suitable for status commands and JSON output.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Current lifecycle state.
    pub state: PlayerState,
    /// `true` while a playback loop is running.
    pub playing: bool,
    /// Track under the queue cursor.
    pub now_playing: Option<Track>,
    /// Ordered queue contents.
    pub queue: Vec<Track>,
    /// Queue exhaust policy.
    pub policy: ExhaustPolicy,
    /// Frames forwarded to the transport during the current session.
    pub frames_sent: u64,
    /// End reason of the last finished session.
    pub end_reason: Option<PlaybackEndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_equality_uses_id_only() {
        let a = Track::new("https://example/a").with_name("A");
        let b = Track::new("https://example/a").with_path("/tmp/a.opus");
        let c = Track::new("https://example/c").with_name("A");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn media_source_prefers_resolved_path() {
        let t = Track::new("https://example/a");
        assert_eq!(t.media_source(), "https://example/a");
        let t = t.with_path("/music/a.ogg");
        assert_eq!(t.media_source(), "/music/a.ogg");
    }

    #[test]
    fn display_name_falls_back_to_id() {
        assert_eq!(Track::new("x").display_name(), "x");
        assert_eq!(Track::new("x").with_name("Song").display_name(), "Song");
    }

    #[test]
    fn track_serializes_without_empty_fields() {
        let json = serde_json::to_string(&Track::new("u")).unwrap();
        assert_eq!(json, r#"{"url":"u"}"#);
    }

    #[test]
    fn enums_use_snake_case() {
        assert_eq!(serde_json::to_string(&ExhaustPolicy::Wrap).unwrap(), "\"wrap\"");
        assert_eq!(serde_json::to_string(&PlayerState::Starting).unwrap(), "\"starting\"");
    }
}
