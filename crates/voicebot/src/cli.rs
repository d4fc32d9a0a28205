use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "voicebot", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML config file; CLI flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// UDP address that receives the Opus packets, e.g. 127.0.0.1:5004
    #[arg(long)]
    pub target: Option<SocketAddr>,

    /// Local UDP bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Directory searched for relative track paths
    #[arg(long)]
    pub media_dir: Option<PathBuf>,

    /// Session key (one player per guild)
    #[arg(long, default_value = "local")]
    pub guild: String,

    /// Leave the voice channel after this many seconds without audio
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Queue tracks (or a configured playlist) and play them
    Play {
        /// Local files or http(s) URLs
        inputs: Vec<String>,

        /// Play a playlist from the config file instead of (or before) the inputs
        #[arg(long)]
        playlist: Option<String>,

        /// Read control commands from stdin while playing
        #[arg(long)]
        interactive: bool,
    },

    /// List playlists defined in the config file
    Playlists,
}
