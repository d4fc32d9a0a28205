//! voicebot: streams queued tracks as Opus over UDP, controllable from a console.
//!
//! Each track is transcoded by an external decoder (ffmpeg by default) into Ogg/Opus;
//! the player demuxes it and paces 20 ms packets to `--target`. Skip, reload and stop
//! take effect at the next frame boundary.

mod cli;
mod config;
mod console;
mod resolver;
mod runtime;
mod udp;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,voicebot=info,voice_player=info")
        }))
        .init();

    let resolved = config::BotConfig::load_optional(args.config.as_deref())?.resolve(&args)?;
    tracing::info!(
        bind = %resolved.bind,
        target = %resolved.target,
        decoder = %resolved.player.decoder.program,
        playlists = resolved.playlists.len(),
        "configuration loaded"
    );
    runtime::run(&args, resolved)
}
