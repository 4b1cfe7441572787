use coedit_common::telemetry::{self, TelemetryConfig};
use coedit_common::{CoeditError, EngineConfig, FileStore, ParseError};
use coedit_core::{
    ChannelEvent, EditorStateTracker, MemoryVersionSource, Role, RopeBuffer,
    SerializedEditorState, TrackerEvent, Version, VersionContext,
};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use tracing::Level;

use clap::{Parser, Subcommand};

type Tracker = EditorStateTracker<fn(&SerializedEditorState) -> RopeBuffer, MemoryVersionSource>;

#[derive(Parser)]
#[command(version, about = "coedit - replay and inspect co-editing channel logs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to engine config file (.json)
    #[arg(long, global = true, env = "COEDIT_CONFIG")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a channel log (one JSON event per line) and print every buffer
    Replay {
        /// Channel log to replay
        log: PathBuf,

        /// Historical snapshots: {"<version>": {"<editor id>": {"contents": ...}}}
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Show this version once the log is replayed
        #[arg(long)]
        at: Option<u64>,

        /// Local role, overriding the config
        #[arg(long, value_parser = parse_role)]
        role: Option<Role>,

        /// Print buffers as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a file reference such as `main.py:L10-L12` against a replayed log
    Find {
        /// Channel log to replay
        log: PathBuf,

        /// Free-text file reference
        reference: String,
    },
    /// Write a config file with default settings
    InitConfig {
        /// Where to write it (.json)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    telemetry::init(TelemetryConfig::from_env("coedit-cli").with_level(level));

    match cli.command {
        Commands::Replay {
            log,
            snapshots,
            at,
            role,
            json,
        } => {
            let mut config = load_config(cli.config.as_deref()).await?;
            if let Some(role) = role {
                config.role = role;
            }
            let source = match snapshots {
                Some(path) => load_snapshots(&path)?,
                None => MemoryVersionSource::new(),
            };

            let mut tracker = replay(read_events(&log)?, source, &config).await?;
            if let Some(version) = at {
                tracker
                    .set_version(
                        Version::At(version),
                        None,
                        VersionContext::new(config.role),
                    )
                    .await
                    .map_err(CoeditError::from)?;
            }

            if json {
                let states = tracker.serialize_editor_states();
                println!("{}", serde_json::to_string_pretty(&states).into_diagnostic()?);
            } else {
                print!("{}", render_buffers(&tracker));
            }
        }
        Commands::Find { log, reference } => {
            let config = load_config(cli.config.as_deref()).await?;
            let tracker = replay(read_events(&log)?, MemoryVersionSource::new(), &config).await?;
            println!("{}", find(&tracker, &reference)?);
        }
        Commands::InitConfig { path } => {
            EngineConfig::default().save(&FileStore::new(&path)).await?;
            println!("Config written to: {}", path.display());
        }
    }

    Ok(())
}

fn parse_role(s: &str) -> std::result::Result<Role, String> {
    match s {
        "editor" => Ok(Role::Editor),
        "observer" => Ok(Role::Observer),
        other => Err(format!("unknown role {other:?}, expected editor or observer")),
    }
}

async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(&FileStore::new(path)).await?,
        None => EngineConfig::default(),
    };
    config.with_env()
}

fn read_events(path: &Path) -> Result<Vec<ChannelEvent>> {
    let text = std::fs::read_to_string(path)
        .map_err(CoeditError::from)
        .map_err(|e| miette::Report::new(e).wrap_err(format!("reading {}", path.display())))?;
    Ok(parse_events(&path.display().to_string(), &text)?)
}

/// One channel event per line. Blank lines are skipped.
fn parse_events(name: &str, text: &str) -> std::result::Result<Vec<ChannelEvent>, CoeditError> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event = ChannelEvent::from_json(line).map_err(|e| {
            ParseError::json(name, index + 1, line, e)
                .with_advice("each line must be one JSON object with an `event` tag")
        })?;
        events.push(event);
    }
    Ok(events)
}

fn load_snapshots(path: &Path) -> Result<MemoryVersionSource> {
    let text = std::fs::read_to_string(path).map_err(CoeditError::from)?;
    let source = serde_json::from_str(&text).map_err(|e| {
        let line = e.line();
        CoeditError::from(ParseError::json(path.display().to_string(), line, &text, e))
    })?;
    Ok(source)
}

fn rope_host(_: &SerializedEditorState) -> RopeBuffer {
    RopeBuffer::new()
}

/// Feed every event through a fresh tracker.
async fn replay(
    events: Vec<ChannelEvent>,
    source: MemoryVersionSource,
    config: &EngineConfig,
) -> std::result::Result<Tracker, CoeditError> {
    let host: fn(&SerializedEditorState) -> RopeBuffer = rope_host;
    let mut tracker = EditorStateTracker::new(host, source)
        .with_fuzzy_config(config.fuzzy.clone())
        .with_role(config.role);
    let mut notifications = tracker.subscribe();

    let total = events.len();
    for mut event in events {
        // Our own cursor echoes come back over the channel too.
        if let (ChannelEvent::Cursor(cursor), Some(me)) = (&mut event, &config.local_user) {
            cursor.user.is_me |= cursor.user.id == me.id;
        }
        tracker.dispatch(event).await?;
    }

    while let Ok(notification) = notifications.try_recv() {
        match notification {
            TrackerEvent::EditorOpened(id) => tracing::debug!(editor = %id, "editor opened"),
            TrackerEvent::VersionChanged { version, .. } => {
                tracing::info!(%version, "version changed")
            }
        }
    }
    tracing::info!(events = total, editors = tracker.len(), "replay finished");
    Ok(tracker)
}

fn find(tracker: &Tracker, reference: &str) -> Result<String> {
    let (editor, lines) = tracker
        .resolve_file_reference(reference)
        .ok_or_else(|| miette::miette!(code = "coedit::find", "no buffer matches {reference:?}"))?;
    let lines = lines
        .map(|(start, end)| format!(" lines {start}-{end}"))
        .unwrap_or_default();
    Ok(format!("{} {}{}", editor.id(), editor.title(), lines))
}

fn render_buffers(tracker: &Tracker) -> String {
    let mut out = String::new();
    for editor in tracker.get_all_editors() {
        let mut flags = vec![if editor.is_open() { "open" } else { "closed" }];
        if editor.is_modified() {
            flags.push("modified");
        }
        if !editor.version().is_current() {
            flags.push("historical");
        }
        out.push_str(&format!(
            "== {} {} [{}]\n{}\n",
            editor.id(),
            editor.title(),
            flags.join(", "),
            editor.text()
        ));
    }
    out
}

fn init_miette() {
    let hook = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    if let Err(error) = hook {
        eprintln!("couldn't set the miette hook: {error}");
    }
    miette::set_panic_hook();
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"{"event":"editor-opened","state":{"id":1}}
{"event":"editor-opened","state":{"id":2}}

{"event":"delta","id":1,"type":"edit","timestamp":200,"changes":[{"oldRange":[0,5],"newRange":[0,2],"oldText":"hello","newText":"hi"}]}
{"event":"delta","id":1,"type":"open","timestamp":100,"grammarName":"Plain Text","title":"main.py","contents":"hello"}
{"event":"delta","id":2,"type":"open","timestamp":150,"grammarName":"Plain Text","title":"utils.py","contents":"x = 1"}
{"event":"delta","id":2,"type":"modified","timestamp":160,"oldModified":false,"modified":true}
{"event":"cursor","id":2,"cursorId":"c1","user":{"id":"me"},"type":"position","position":1}
"#;

    #[test]
    fn test_parse_events_reports_line() {
        let text = "{\"event\":\"user-left\",\"user\":{\"id\":\"a\"}}\n{\"event\":\n";
        let err = parse_events("log.jsonl", text).unwrap_err();
        match err {
            CoeditError::Parse(parse) => assert_eq!(parse.line(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("observer"), Ok(Role::Observer));
        assert!(parse_role("admin").is_err());
    }

    #[tokio::test]
    async fn test_replay_log() {
        let events = parse_events("log.jsonl", LOG).unwrap();
        let config = EngineConfig {
            local_user: Some(coedit_core::ChatUser::me("me", "Me")),
            ..EngineConfig::default()
        };
        let tracker = replay(events, MemoryVersionSource::new(), &config)
            .await
            .unwrap();

        assert_eq!(
            render_buffers(&tracker),
            "== 1 main.py [open]\nhi\n== 2 utils.py [open, modified]\nx = 1\n"
        );
        // The local user's cursor is not drawn.
        let utils = tracker.get_editor_state(coedit_core::EditorId(2)).unwrap();
        assert!(utils.remote_cursors().is_empty());

        assert_eq!(find(&tracker, "utils:L3").unwrap(), "2 utils.py lines 3-3");
        let miss = find(&tracker, "zzzzzzzz").unwrap_err();
        assert_eq!(miss.to_string(), "no buffer matches \"zzzzzzzz\"");
    }
}
