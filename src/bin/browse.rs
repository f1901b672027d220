#![forbid(unsafe_code)]

//! Terminal front end for the lesson catalog.
//!
//! Shows one catalog level at a time, like the sidebar: pick a number to open
//! it, `b` to go back. Once videos are published, `p` opens the player panel
//! which drives a simulated embedded player through the same controls as the
//! web view.

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Instant,
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use lesson_catalog::{
    catalog::{CatalogClient, CatalogSource},
    config::{RuntimeOverrides, resolve_runtime_settings},
    logging::init_tracing,
    navigation::{NavState, Navigator, Selection},
    playback::playback_state,
    player::{EmbeddedPlayer, PlayerController, SimulatedPlayer, embed_url},
};

#[derive(Debug, Parser)]
#[command(about = "Browse the lesson catalog from a terminal")]
struct BrowseArgs {
    /// Base URL of the relay server (RELAY_URL).
    #[arg(long)]
    relay_url: Option<String>,
    /// Upstream API base URL (CATALOG_API_BASE).
    #[arg(long)]
    api_base: Option<String>,
    /// Upstream API key (CATALOG_API_KEY).
    #[arg(long)]
    api_key: Option<String>,
    /// Alternate env file.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Report fetch failures instead of showing sample data.
    #[arg(long)]
    strict: bool,
    /// Length in seconds of every simulated video.
    #[arg(long, default_value_t = 600.0)]
    video_length: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum NavCommand {
    /// Zero-based index into the displayed list.
    Select(usize),
    Back,
    Player,
    Retry,
    Help,
    Quit,
}

fn parse_nav_command(line: &str) -> Result<NavCommand> {
    let line = line.trim();
    Ok(match line {
        "b" | "back" => NavCommand::Back,
        "p" | "play" => NavCommand::Player,
        "r" | "retry" => NavCommand::Retry,
        "h" | "help" | "?" => NavCommand::Help,
        "q" | "quit" | "exit" => NavCommand::Quit,
        other => {
            let number: usize = other
                .parse()
                .map_err(|_| anyhow!("unknown command `{other}`; try `help`"))?;
            if number == 0 {
                bail!("entries are numbered from 1");
            }
            NavCommand::Select(number - 1)
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum PlayerCommand {
    Toggle,
    Forward,
    Rewind,
    Scrub(f64),
    Rate(f64),
    Fullscreen,
    Note(String),
    SaveNote,
    ReportNote,
    Status,
    Leave,
}

fn parse_player_command(line: &str) -> Result<PlayerCommand> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));
    Ok(match verb {
        "" | "s" | "status" => PlayerCommand::Status,
        "t" | "toggle" => PlayerCommand::Toggle,
        "f" | "forward" => PlayerCommand::Forward,
        "r" | "rewind" => PlayerCommand::Rewind,
        "seek" => PlayerCommand::Scrub(
            rest.trim_end_matches('%')
                .parse()
                .context("seek expects a percentage, e.g. `seek 40`")?,
        ),
        "rate" => PlayerCommand::Rate(
            rest.trim_end_matches('x')
                .parse()
                .context("rate expects a number, e.g. `rate 1.5`")?,
        ),
        "fs" | "fullscreen" => PlayerCommand::Fullscreen,
        "note" => PlayerCommand::Note(rest.to_string()),
        "save" => PlayerCommand::SaveNote,
        "report" => PlayerCommand::ReportNote,
        "x" | "q" | "back" => PlayerCommand::Leave,
        other => bail!("unknown player command `{other}`"),
    })
}

const NAV_HELP: &str = "\
  <n>      open entry n
  b        back
  p        open the player for the selected videos
  r        retry loading the catalog
  q        quit";

const PLAYER_HELP: &str = "\
  t        play / pause
  f, r     skip forward / back 10s
  seek <%> jump to a share of the video
  rate <x> 0.5, 1, 1.5 or 2
  fs       toggle fullscreen
  note <text>, save, report
  x        back to the catalog";

fn render_level<S: CatalogSource>(nav: &mut Navigator<S>, out: &mut impl Write) -> Result<()> {
    writeln!(out)?;
    match nav.state() {
        NavState::Loading => writeln!(out, "Loading...")?,
        NavState::Error => writeln!(out, "Error loading tree (r to retry)")?,
        NavState::ShowingRoot | NavState::ShowingLevel => {
            let back = if nav.path().is_empty() { "" } else { "< " };
            writeln!(out, "{back}{}", nav.title())?;
            for (index, node) in nav.nodes().iter().enumerate() {
                let marker = if node.has_children() { " >" } else { "" };
                writeln!(out, "{:>3}. {}{marker}", index + 1, node.label)?;
            }
        }
    }
    for toast in nav.toasts().active(Instant::now()) {
        writeln!(out, "! {}", toast.text)?;
    }
    Ok(())
}

fn render_player<P: EmbeddedPlayer>(
    player: &PlayerController<P>,
    out: &mut impl Write,
) -> Result<()> {
    let state = if player.is_playing() { "playing" } else { "paused" };
    let fullscreen = if player.is_fullscreen() {
        " [fullscreen]"
    } else {
        ""
    };
    writeln!(
        out,
        "[{state}] {} ({:.0}%) {}x{fullscreen}",
        player.time_label(),
        player.progress_percent(),
        player.rate()
    )?;
    Ok(())
}

fn run_player<P: EmbeddedPlayer>(
    player: &mut PlayerController<P>,
    lines: &mut impl Iterator<Item = io::Result<String>>,
    out: &mut impl Write,
) -> Result<()> {
    let video = player.sync_source().to_string();
    player.tick(Instant::now());
    writeln!(out, "Now playing {video}: {}", embed_url(&video))?;
    writeln!(out, "{PLAYER_HELP}")?;

    loop {
        render_player(player, out)?;
        write!(out, "player> ")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let command = match parse_player_command(&line?) {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{err:#}")?;
                continue;
            }
        };
        match command {
            PlayerCommand::Toggle => player.toggle_play(),
            PlayerCommand::Forward => player.skip_forward(),
            PlayerCommand::Rewind => player.skip_back(),
            PlayerCommand::Scrub(percent) => player.seek_percent(percent),
            PlayerCommand::Rate(rate) => {
                if let Err(err) = player.set_rate(rate) {
                    writeln!(out, "{err:#}")?;
                }
            }
            PlayerCommand::Fullscreen => player.toggle_fullscreen(),
            PlayerCommand::Note(text) => {
                player.note().open();
                player.note().set_text(text);
            }
            PlayerCommand::SaveNote => player.note().save(),
            PlayerCommand::ReportNote => player.note().report(),
            PlayerCommand::Status => {}
            PlayerCommand::Leave => return Ok(()),
        }
        player.tick(Instant::now());
    }
}

fn main() -> Result<()> {
    init_tracing("warn");
    let args = BrowseArgs::parse();
    let settings = resolve_runtime_settings(RuntimeOverrides {
        api_base: args.api_base.clone(),
        api_key: args.api_key.clone(),
        relay_url: args.relay_url.clone(),
        env_path: args.env_file.clone(),
        ..RuntimeOverrides::default()
    })?;

    let mut client = CatalogClient::from_settings(&settings);
    if args.strict {
        client = client.strict();
    }
    let (writer, reader) = playback_state();
    let mut nav = Navigator::new(client, writer);
    let mut player = PlayerController::new(SimulatedPlayer::new(args.video_length), reader);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut lines = io::stdin().lock().lines();

    writeln!(out, "Relay: {}", settings.relay_url)?;
    writeln!(out, "{NAV_HELP}")?;
    // A failed root load is rendered as the error state.
    let _ = nav.load_root();

    loop {
        render_level(&mut nav, &mut out)?;
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let command = match parse_nav_command(&line?) {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{err:#}")?;
                continue;
            }
        };
        match command {
            NavCommand::Select(index) => match nav.select(index) {
                Selection::Published(ids) => {
                    writeln!(out, "Selected {} video(s); `p` to play", ids.len())?
                }
                Selection::Ignored => writeln!(out, "no entry {}", index + 1)?,
                Selection::Expanded { .. } | Selection::Notified => {}
            },
            NavCommand::Back => {
                nav.back();
            }
            NavCommand::Player => run_player(&mut player, &mut lines, &mut out)?,
            NavCommand::Retry => {
                let _ = nav.load_root();
            }
            NavCommand::Help => writeln!(out, "{NAV_HELP}")?,
            NavCommand::Quit => break,
        }
    }

    Ok(())
}
