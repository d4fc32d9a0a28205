//! Line-oriented control console (stdin or any `BufRead`).

use std::io::{BufRead, Write};

use anyhow::Result;
use voice_player::{Resolver, Session};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Add(String),
    Insert(isize, String),
    Skip,
    Reload,
    Stop,
    Queue,
    Status,
    Playlist(String),
    Playlists,
    Toggle,
    Help,
    Quit,
}

pub const HELP: &str = "commands: add <query> | insert <index> <query> | skip | reload | stop | \
queue | status | playlist <title> | playlists | toggle | help | quit";

/// Parse a console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let require = |what: &str| {
        if rest.is_empty() {
            Err(format!("{verb}: missing {what}"))
        } else {
            Ok(rest.to_string())
        }
    };
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "add" | "play" => ConsoleCommand::Add(require("query")?),
        "insert" => {
            let (index, query) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("{verb}: expected <index> <query>"))?;
            let index = index
                .parse::<isize>()
                .map_err(|_| format!("{verb}: invalid index {index:?}"))?;
            ConsoleCommand::Insert(index, query.trim().to_string())
        }
        "skip" | "next" => ConsoleCommand::Skip,
        "reload" => ConsoleCommand::Reload,
        "stop" => ConsoleCommand::Stop,
        "queue" | "q" => ConsoleCommand::Queue,
        "status" => ConsoleCommand::Status,
        "playlist" => ConsoleCommand::Playlist(require("title")?),
        "playlists" => ConsoleCommand::Playlists,
        "toggle" => ConsoleCommand::Toggle,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command {other:?}; try `help`")),
    };
    Ok(Some(cmd))
}

/// Drive `session` from `input` until EOF or `quit`, writing replies to `out`.
pub fn run<R: BufRead, W: Write>(
    input: R,
    mut out: W,
    session: &Session,
    resolver: &dyn Resolver,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                writeln!(out, "{msg}")?;
                continue;
            }
        };
        if cmd == ConsoleCommand::Quit {
            break;
        }
        execute(&cmd, &mut out, session, resolver)?;
    }
    Ok(())
}

fn execute<W: Write>(
    cmd: &ConsoleCommand,
    out: &mut W,
    session: &Session,
    resolver: &dyn Resolver,
) -> Result<()> {
    let player = session.player();
    match cmd {
        ConsoleCommand::Add(query) => match resolver.resolve(query) {
            Ok(track) => {
                writeln!(out, "queued {}", track.display_name())?;
                if let Err(err) = session.queue_single(track) {
                    writeln!(out, "cannot start playback: {err}")?;
                }
            }
            Err(err) => writeln!(out, "{err}")?,
        },
        ConsoleCommand::Insert(index, query) => match resolver.resolve(query) {
            Ok(track) => match player.queue_insert(*index, track) {
                Ok(()) => writeln!(out, "inserted at {index}")?,
                Err(err) => writeln!(out, "{err}")?,
            },
            Err(err) => writeln!(out, "{err}")?,
        },
        ConsoleCommand::Skip => player.skip(),
        ConsoleCommand::Reload => player.reload(),
        ConsoleCommand::Stop => player.stop(),
        ConsoleCommand::Queue => match player.currently_playing() {
            Ok((current, tracks)) => {
                for (i, track) in tracks.iter().enumerate() {
                    let marker = if *track == current { ">" } else { " " };
                    writeln!(out, "{marker} {i:>3} {}", track.display_name())?;
                }
            }
            Err(err) => writeln!(out, "{err}")?,
        },
        ConsoleCommand::Status => {
            writeln!(out, "{}", serde_json::to_string_pretty(&player.status())?)?;
        }
        ConsoleCommand::Playlist(title) => {
            if let Err(err) = session.set_playlist(title) {
                writeln!(out, "{err}")?;
            }
        }
        ConsoleCommand::Playlists => {
            for playlist in session.playlists() {
                writeln!(
                    out,
                    "{} [{}] {} tracks",
                    playlist.title,
                    playlist.category,
                    playlist.tracks.len()
                )?;
            }
        }
        ConsoleCommand::Toggle => {
            let policy = player.queue().toggle_exhaust_policy();
            writeln!(out, "queue exhaust policy: {policy:?}")?;
        }
        ConsoleCommand::Help => writeln!(out, "{HELP}")?,
        ConsoleCommand::Quit => {}
    }
    Ok(())
}
