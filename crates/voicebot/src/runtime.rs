//! Wires config, session registry, UDP transport and console together.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use voice_player::{Notifier, NotifyError, Resolver, SessionRegistry, VoiceGateway};

use crate::cli::{Args, Command};
use crate::config::Resolved;
use crate::console;
use crate::resolver::LocalResolver;
use crate::udp::UdpGateway;

/// Prints bot messages to stdout.
struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let mut out = io::stdout().lock();
        writeln!(out, "[voicebot] {text}")?;
        Ok(())
    }
}

pub fn run(args: &Args, resolved: Resolved) -> Result<()> {
    match &args.cmd {
        Command::Playlists => {
            if resolved.playlists.is_empty() {
                println!("no playlists configured");
            }
            for playlist in &resolved.playlists {
                println!(
                    "{} [{}] {} tracks",
                    playlist.title,
                    playlist.category,
                    playlist.tracks.len()
                );
            }
            Ok(())
        }
        Command::Play {
            inputs,
            playlist,
            interactive,
        } => play(args, resolved, inputs, playlist.as_deref(), *interactive),
    }
}

fn play(
    args: &Args,
    resolved: Resolved,
    inputs: &[String],
    playlist: Option<&str>,
    interactive: bool,
) -> Result<()> {
    if inputs.is_empty() && playlist.is_none() && !interactive {
        bail!("nothing to play: pass inputs, --playlist, or --interactive");
    }

    let registry = SessionRegistry::new(resolved.player.clone(), resolved.playlists.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(StdoutNotifier);
    let gateway: Arc<dyn VoiceGateway> = Arc::new(UdpGateway {
        bind: resolved.bind,
        target: resolved.target,
    });
    let (session, session_id) = registry.from_or_create(&args.guild, notifier.clone(), gateway);
    tracing::info!(
        session = session_id,
        guild = %args.guild,
        target = %resolved.target,
        "session ready"
    );

    {
        let player = session.player().clone();
        ctrlc::set_handler(move || {
            tracing::info!("interrupted, stopping playback");
            player.stop();
            player.wait();
            std::process::exit(130);
        })
        .context("install ctrl-c handler")?;
    }

    let resolver = LocalResolver::new(resolved.media_dir.clone());
    if let Some(title) = playlist {
        session
            .set_playlist(title)
            .with_context(|| format!("load playlist {title:?}"))?;
    }
    let (tracks, failures) = resolver.resolve_all(inputs);
    for err in &failures {
        if let Err(e) = notifier.notify(&err.to_string()) {
            tracing::warn!(error = %e, "notify failed");
        }
    }
    if tracks.is_empty() && playlist.is_none() && !interactive {
        bail!("none of the inputs could be resolved");
    }
    for track in tracks {
        session.queue_single(track).context("queue track")?;
    }

    if interactive {
        println!("{}", console::HELP);
        console::run(io::stdin().lock(), io::stdout(), &session, &resolver)?;
        session.player().stop();
    }

    let reason = session.player().wait();
    tracing::info!(?reason, "playback finished");
    Ok(())
}
