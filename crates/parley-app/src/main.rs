//! Parley terminal client - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Open the local SQLite store (user record + session records)
//! 3. Build the HTTP conversation client
//! 4. Activate a `ChatWidget` and drive it from stdin

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_chat::{ChatError, ChatWidget, SendOutcome};
use parley_client::HttpConversationClient;
use parley_core::config::ParleyConfig;
use parley_core::types::{Message, Role};
use parley_storage::{KeyValueStore, SqliteKeyValueStore};

use cli::CliArgs;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if let Some(rest) = data_dir
        .strip_prefix("~/")
        .or_else(|| data_dir.strip_prefix("~\\"))
    {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(data_dir)
    }
}

fn print_message(message: &Message) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    println!("{:>9}: {}", speaker, message.text);
}

/// Print the session state after activation.
fn print_banner(widget: &ChatWidget) -> Result<(), ChatError> {
    let snapshot = widget.snapshot()?;
    match &snapshot.session_id {
        Some(id) => println!("-- resumed conversation {} --", id),
        None => println!("-- new conversation --"),
    }
    for message in &snapshot.transcript {
        print_message(message);
    }
    if let Some(error) = &snapshot.error {
        println!("! {}", error);
    }
    println!("(commands: /reset, /voice, /quit)");
    Ok(())
}

/// Messages that follow the last user message of a reconciled transcript.
fn reply_tail(transcript: &[Message]) -> &[Message] {
    match transcript.iter().rposition(|m| m.role == Role::User) {
        Some(last_user) => &transcript[last_user + 1..],
        None => transcript,
    }
}

async fn send_line(widget: &ChatWidget, line: &str) -> Result<(), ChatError> {
    widget.set_input(line)?;

    match widget.submit().await {
        Ok(SendOutcome::Delivered { .. }) => {
            let snapshot = widget.snapshot()?;
            for message in reply_tail(&snapshot.transcript) {
                print_message(message);
            }
        }
        Ok(SendOutcome::Discarded) => {
            tracing::debug!("Reply arrived for a discarded session");
        }
        Err(ChatError::Service(e)) => {
            let inline = widget.snapshot()?.error.unwrap_or_else(|| e.to_string());
            println!("! {}", inline);
        }
        Err(ChatError::EmptyMessage) => {}
        Err(e) => return Err(e),
    }
    Ok(())
}

fn toggle_voice(widget: &ChatWidget) -> Result<(), ChatError> {
    match widget.toggle_listening() {
        Ok(true) => println!("-- listening --"),
        Ok(false) => println!("-- stopped listening --"),
        Err(ChatError::SpeechUnavailable) => {
            if let Some(notice) = widget.snapshot()?.notice {
                println!("! {}", notice);
            }
        }
        Err(ChatError::Speech(reason)) => println!("! voice input failed: {}", reason),
        Err(e) => return Err(e),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ParleyConfig::load_or_default(&config_file);
    args.apply(&mut config);

    // Tracing.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("parley.db");
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&db_path)?);

    // Conversation service.
    let client = Arc::new(HttpConversationClient::from_config(&config.service)?);
    tracing::info!(base_url = %client.base_url(), "Conversation service configured");

    let widget = ChatWidget::new(client, store, &config);
    let tier = widget.activate(args.identity.as_deref()).await?;
    tracing::info!(tier = ?tier, "Conversation ready");
    print_banner(&widget)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                widget.reset()?;
                println!("-- new conversation --");
            }
            "/voice" => toggle_voice(&widget)?,
            text => send_line(&widget, text).await?,
        }
    }

    widget.deactivate()?;
    tracing::info!("Parley stopped");
    Ok(())
}
