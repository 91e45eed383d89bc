use anyhow::{Context, Result};
use clap::Parser;
use podcast_core::orchestrator::{SessionHandle, spawn_session};
use podcast_core::{Command, TranscriptEvent};
use podcast_service::config::Config;
use podcast_service::{build_reviewer, document};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

/// Runs one podcast session over a transcript read from stdin.
///
/// Each line is one utterance. Lines starting with `AI:` are the host's own
/// words, `@<topic-id> ` attributes a line to a topic, and `/reset`,
/// `/snapshot` and `/transcript` control the session.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// JSON file with the document's topics
    #[arg(long)]
    topics: PathBuf,
    /// Namespace correlating the session with its source document
    #[arg(long)]
    namespace: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Line {
    Event(TranscriptEvent),
    Reset,
    Snapshot,
    Transcript,
}

fn parse_line(raw: &str) -> Option<Line> {
    let line = raw.trim();
    match line {
        "" => None,
        "/reset" => Some(Line::Reset),
        "/snapshot" => Some(Line::Snapshot),
        "/transcript" => Some(Line::Transcript),
        _ => {
            if let Some(text) = line.strip_prefix("AI:") {
                return Some(Line::Event(TranscriptEvent::agent(text.trim())));
            }
            if let Some(rest) = line.strip_prefix('@') {
                if let Some((topic_id, text)) = rest.split_once(char::is_whitespace) {
                    return Some(Line::Event(
                        TranscriptEvent::user(text.trim()).for_topic(topic_id),
                    ));
                }
            }
            Some(Line::Event(TranscriptEvent::user(line)))
        }
    }
}

/// Feeds stdin into the session until EOF. Dropping the handle afterwards
/// lets the actor drain its queue and stop.
async fn read_transcript(handle: SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(raw) = lines.next_line().await? {
        match parse_line(&raw) {
            None => continue,
            Some(Line::Event(event)) => handle.submit(event).await?,
            Some(Line::Reset) => {
                handle.reset().await;
                println!("[session reset]");
            }
            Some(Line::Snapshot) => {
                let snapshot = serde_json::to_string_pretty(&handle.snapshot().await)?;
                println!("{snapshot}");
            }
            Some(Line::Transcript) => println!("{}", handle.transcript().await),
        }
    }
    tracing::info!("Reached end of transcript input");
    Ok(())
}

fn print_command(command: &Command) {
    match command {
        Command::SpeakText(text) => println!("HOST: {text}"),
        Command::TopicChanged { from, to: Some(to) } => println!("[topic] {from} -> {to}"),
        Command::TopicChanged { from, to: None } => println!("[topic] {from} -> (done)"),
        Command::SessionComplete(message) => println!("HOST: {message}\n[session complete]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // Logs go to stderr so stdout stays a clean stream of host output.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting podcast service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    let doc = document::load_document(&args.topics)?;
    if let Some(summary) = &doc.summary {
        tracing::info!("Document summary: {}", summary);
    }

    // --- 4. Start the Session ---
    let reviewer = build_reviewer(&config)?;
    let (handle, mut commands, actor) = spawn_session(reviewer, config.policy.clone());
    handle
        .start(doc.topics, args.namespace)
        .await
        .context("Failed to start podcast session")?;

    let reader = tokio::spawn(async move {
        if let Err(e) = read_transcript(handle).await {
            tracing::error!("Transcript reader failed: {:#}", e);
        }
    });

    // --- 5. Main Event Loop ---
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    print_command(&command);
                    if matches!(command, Command::SessionComplete(_)) {
                        break;
                    }
                }
                None => {
                    tracing::info!("Session actor stopped");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down.");
                break;
            }
        }
    }

    reader.abort();
    actor.abort();
    Ok(())
}
