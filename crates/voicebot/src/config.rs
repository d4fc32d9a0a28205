//! Configuration loading and parsing.
//!
//! The TOML file is optional; every value has a default and CLI flags win over it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use voice_player::{DecoderCommand, Playlist, PlayerConfig, Track};

use crate::cli::Args;

const DEFAULT_BIND: &str = "0.0.0.0:0";
const DEFAULT_TARGET: &str = "127.0.0.1:5004";

/// Top-level bot configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Local UDP bind address.
    pub bind: Option<String>,
    /// Destination for Opus packets.
    pub target: Option<String>,
    /// Directory for relative track paths.
    pub media_dir: Option<PathBuf>,
    /// External decoder override.
    pub decoder: Option<DecoderConfig>,
    /// Pipeline timings.
    pub playback: Option<PlaybackConfig>,
    /// Playlists seeded into every session.
    #[serde(default)]
    pub playlists: Vec<PlaylistConfig>,
}

/// Decoder program and argument list (`{input}` is replaced with the track source).
#[derive(Debug, Deserialize)]
pub struct DecoderConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Pipeline tuning, all optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaybackConfig {
    pub frame_queue_capacity: Option<usize>,
    pub skip_leading_frames: Option<usize>,
    pub ready_timeout_ms: Option<u64>,
    pub ready_poll_interval_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub empty_queue_poll_ms: Option<u64>,
}

/// Playlist definition from TOML.
#[derive(Debug, Deserialize)]
pub struct PlaylistConfig {
    pub title: String,
    pub category: String,
    /// Track URLs or file paths.
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Settings after merging file and CLI.
#[derive(Debug)]
pub struct Resolved {
    pub bind: SocketAddr,
    pub target: SocketAddr,
    pub media_dir: Option<PathBuf>,
    pub player: PlayerConfig,
    pub playlists: Vec<Playlist>,
}

impl BotConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg =
            toml::from_str::<BotConfig>(&raw).with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Load `path` if given, else defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Merge with CLI overrides and parse addresses.
    pub fn resolve(self, args: &Args) -> Result<Resolved> {
        let bind = match args.bind {
            Some(addr) => addr,
            None => parse_addr(self.bind.as_deref().unwrap_or(DEFAULT_BIND), "bind")?,
        };
        let target = match args.target {
            Some(addr) => addr,
            None => parse_addr(self.target.as_deref().unwrap_or(DEFAULT_TARGET), "target")?,
        };

        let mut player = PlayerConfig::default();
        if let Some(decoder) = self.decoder {
            player.decoder = DecoderCommand::new(decoder.program, decoder.args);
        }
        let playback = self.playback.unwrap_or_default();
        if let Some(cap) = playback.frame_queue_capacity {
            player.frame_queue_capacity = cap.max(1);
        }
        if let Some(skip) = playback.skip_leading_frames {
            player.skip_leading_frames = skip;
        }
        if let Some(ms) = playback.ready_timeout_ms {
            player.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = playback.ready_poll_interval_ms {
            player.ready_poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = playback.idle_timeout_ms {
            player.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = playback.send_timeout_ms {
            player.send_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = playback.empty_queue_poll_ms {
            player.empty_queue_poll = Duration::from_millis(ms);
        }
        if let Some(secs) = args.idle_timeout_secs {
            player.idle_timeout = Duration::from_secs(secs);
        }

        let playlists = self
            .playlists
            .into_iter()
            .map(|pl| {
                let tracks = pl.tracks.into_iter().map(Track::new).collect();
                Playlist::new(pl.title.clone(), pl.category, tracks)
                    .with_context(|| format!("playlist {:?}", pl.title))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Resolved {
            bind,
            target,
            media_dir: args.media_dir.clone().or(self.media_dir),
            player,
            playlists,
        })
    }
}

fn parse_addr(raw: &str, field: &str) -> Result<SocketAddr> {
    raw.parse()
        .with_context(|| format!("parse {field} address {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["voicebot"];
        argv.extend_from_slice(extra);
        argv.push("playlists");
        Args::parse_from(argv)
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let resolved = BotConfig::default().resolve(&args(&[])).unwrap();
        assert_eq!(resolved.target, DEFAULT_TARGET.parse().unwrap());
        assert_eq!(resolved.player.frame_queue_capacity, 64);
        assert!(resolved.playlists.is_empty());
    }

    #[test]
    fn file_values_apply_and_cli_wins() {
        let file = write_config(
            r#"
target = "10.0.0.2:6000"
media_dir = "/srv/music"

[decoder]
program = "opusenc-wrapper"
args = ["{input}"]

[playback]
ready_poll_interval_ms = 200
idle_timeout_ms = 5000
send_timeout_ms = 250

[[playlists]]
title = "chill"
category = "mood"
tracks = ["https://example.com/a.ogg"]
"#,
        );
        let cfg = BotConfig::load(file.path()).unwrap();
        let resolved = cfg
            .resolve(&args(&["--target", "127.0.0.1:7000", "--idle-timeout-secs", "9"]))
            .unwrap();
        assert_eq!(resolved.target, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(resolved.media_dir, Some(PathBuf::from("/srv/music")));
        assert_eq!(resolved.player.decoder.program, "opusenc-wrapper");
        assert_eq!(resolved.player.send_timeout, Duration::from_millis(250));
        assert_eq!(resolved.player.ready_poll_interval, Duration::from_millis(200));
        assert_eq!(resolved.player.idle_timeout, Duration::from_secs(9));
        assert_eq!(resolved.playlists.len(), 1);
        assert_eq!(resolved.playlists[0].tracks[0].id(), "https://example.com/a.ogg");
    }

    #[test]
    fn invalid_playlist_is_an_error() {
        let file = write_config("[[playlists]]\ntitle = \"\"\ncategory = \"x\"\n");
        let cfg = BotConfig::load(file.path()).unwrap();
        assert!(cfg.resolve(&args(&[])).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("colour = \"blue\"\n");
        assert!(BotConfig::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_mentions_path() {
        let err = BotConfig::load(Path::new("/nonexistent/voicebot.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("voicebot.toml"));
    }
}
