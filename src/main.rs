//! # recap
//!
//! Chat summarization server and one-shot CLI.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use recap_core::{CompletionService, ConversationId, MessageRecord};
use recap_engine::{SummaryService, SummaryStatus};
use recap_llm::{ApiKey, MessagesApiConfig, MessagesApiProvider};
use recap_settings::RecapSettings;
use recap_telemetry::{init_telemetry, recap_home, TelemetryConfig, TelemetryGuard};

const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Group chat summarizer.
#[derive(Parser, Debug)]
#[command(name = "recap", about = "Group chat summarizer")]
struct Cli {
    /// Settings file (defaults to ~/.recap/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API until Ctrl-C.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Summarize a JSONL transcript (one message record per line) and print the result.
    Summarize {
        #[arg(long)]
        input: PathBuf,

        /// Conversation id used for permalinks.
        #[arg(long, allow_hyphen_values = true)]
        conversation: String,

        #[arg(long, default_value_t = 50, allow_negative_numbers = true)]
        count: i64,

        #[arg(long)]
        tone: Option<String>,
    },
}

fn load_settings(path: Option<&Path>) -> Result<RecapSettings> {
    let settings = match path {
        Some(path) => recap_settings::load_settings_from_path(path),
        None => recap_settings::load_settings(),
    };
    settings.context("failed to load settings")
}

fn telemetry(settings: &RecapSettings) -> TelemetryGuard {
    let log_level = settings.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    init_telemetry(TelemetryConfig {
        log_level,
        json: settings.logging.json,
        log_to_sqlite: settings.logging.persist_warnings,
        log_db_path: recap_home().join("database").join("logs.db"),
        ..Default::default()
    })
}

fn completion_backend(settings: &RecapSettings) -> Result<Arc<dyn CompletionService>> {
    let key = ApiKey::from_env(API_KEY_VAR).with_context(|| format!("{API_KEY_VAR} is not set"))?;
    let config = MessagesApiConfig {
        api_url: settings.api.base_url.clone(),
        api_version: settings.api.anthropic_version.clone(),
        model: settings.generation.model.clone(),
        request_timeout: Duration::from_millis(settings.api.request_timeout_ms),
    };
    let provider = MessagesApiProvider::new(key, config).context("failed to build completion backend")?;
    Ok(Arc::new(provider))
}

fn read_transcript(path: &Path) -> Result<Vec<MessageRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid message record", path.display(), i + 1))
        })
        .collect()
}

async fn serve(settings: RecapSettings, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = recap_server::ServerConfig {
        host: host.unwrap_or_else(|| settings.server.host.clone()),
        port: port.unwrap_or(settings.server.port),
    };
    let backend = completion_backend(&settings)?;
    let service = SummaryService::new(backend, settings).context("failed to build summary service")?;

    let handle = recap_server::start(config, Arc::new(service))
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port(), "recap server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    handle.shutdown();
    handle.wait().await;
    Ok(())
}

async fn summarize_file(
    settings: RecapSettings,
    input: &Path,
    conversation: &str,
    count: i64,
    tone: Option<&str>,
) -> Result<()> {
    let records = read_transcript(input)?;
    let backend = completion_backend(&settings)?;
    let service = SummaryService::new(backend, settings).context("failed to build summary service")?;

    let conversation_id = ConversationId::from_raw(conversation);
    let total = records.len();
    let mut skipped = 0;
    for record in records {
        if !service.store_message(&conversation_id, record)?.stored() {
            skipped += 1;
        }
    }
    tracing::info!(total, skipped, "transcript loaded");

    let outcome = service.summarize(&conversation_id, count, tone).await?;
    println!("{}", outcome.text);
    if outcome.status == SummaryStatus::Failed {
        bail!("summarization failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;
    let _telemetry = telemetry(&settings);

    match cli.command {
        Command::Serve { host, port } => serve(settings, host, port).await,
        Command::Summarize {
            input,
            conversation,
            count,
            tone,
        } => summarize_file(settings, &input, &conversation, count, tone.as_deref()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn summarize_accepts_negative_counts_for_validation_downstream() {
        let cli = Cli::try_parse_from([
            "recap",
            "summarize",
            "--input",
            "chat.jsonl",
            "--conversation",
            "-100123",
            "--count",
            "-2",
        ])
        .unwrap();
        let Command::Summarize { count, conversation, .. } = cli.command else {
            panic!("expected summarize");
        };
        assert_eq!(count, -2);
        assert_eq!(conversation, "-100123");
    }

    #[test]
    fn transcript_lines_are_parsed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.jsonl");
        std::fs::write(
            &path,
            "{\"id\":1,\"sender\":\"a\",\"text\":\"hi\"}\n\n{\"id\":2,\"sender\":\"b\",\"hasImage\":true}\n",
        )
        .unwrap();
        let records = read_transcript(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].has_image);

        std::fs::write(&path, "{\"id\":1}\n").unwrap();
        let err = read_transcript(&path).unwrap_err().to_string();
        assert!(err.contains(":1: invalid message record"), "{err}");
    }
}
