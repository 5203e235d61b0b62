//! # webstore
//!
//! Command-line entry point: runs the WebSocket backend or talks to one.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use webstore_client::{DocOps, Webstore};
use webstore_rpc::{WebRpc, WsSession, WsSessionConfig};
use webstore_server::ServerConfig;
use webstore_settings::WebstoreSettings;
use webstore_telemetry::{init_telemetry, TelemetryConfig};

/// Document store with path-scoped watches.
#[derive(Parser, Debug)]
#[command(name = "webstore", about = "Document store with path-scoped watches")]
struct Cli {
    /// Settings file (defaults to `~/.webstore/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Backend WebSocket URL (overrides settings).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log level (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WebSocket backend.
    Serve {
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// Send development-mode change reports to watching clients.
        #[arg(long)]
        dev_mode: bool,
    },
    /// Read the value at a path.
    Get {
        collection: String,
        doc_id: String,
        #[arg(default_value = "$")]
        path: String,
    },
    /// Write a value. `VALUE` is parsed as JSON, falling back to a plain string.
    Set {
        collection: String,
        doc_id: String,
        path: String,
        value: String,
    },
    /// Store the backend's current time at a path.
    SetDate {
        collection: String,
        doc_id: String,
        path: String,
    },
    Delete {
        collection: String,
        doc_id: String,
        path: String,
    },
    /// Move the value at `FROM` to `TO`.
    Move {
        collection: String,
        doc_id: String,
        from: String,
        to: String,
    },
    /// List document ids in `START..=END`.
    Find {
        collection: String,
        start: String,
        end: String,
    },
    /// Print every change at a path until interrupted.
    Watch {
        collection: String,
        doc_id: String,
        #[arg(default_value = "$")]
        path: String,
    },
}

fn load_settings(cli: &Cli) -> Result<WebstoreSettings> {
    let mut settings = match &cli.settings {
        Some(path) => webstore_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => webstore_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(url) = &cli.url {
        settings.client.url.clone_from(url);
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    if let Command::Serve {
        host,
        port,
        dev_mode,
    } = &cli.command
    {
        if let Some(host) = host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = port {
            settings.server.port = *port;
        }
        settings.server.dev_mode |= *dev_mode;
    }
    Ok(settings)
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn connect(settings: &WebstoreSettings) -> Result<Webstore> {
    let config = WsSessionConfig {
        url: settings.client.url.clone(),
        connect_timeout: settings.client.connect_timeout(),
    };
    let session = Arc::new(WsSession::new(config));
    let rpc = Arc::new(WebRpc::new(session));
    rpc.open()
        .await
        .with_context(|| format!("Failed to connect to {}", settings.client.url))?;
    Ok(Webstore::new(rpc))
}

async fn apply(ops: DocOps) -> Result<()> {
    let value = ops.apply().await.context("apply failed")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn serve(settings: &WebstoreSettings) -> Result<()> {
    let config = ServerConfig::from_settings(&settings.server);
    let handle = webstore_server::start(config)
        .await
        .context("Failed to start server")?;
    tracing::info!(port = handle.port, "webstore server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    handle.shutdown();
    Ok(())
}

async fn watch(store: &Webstore, collection: &str, doc_id: &str, path: &str) -> Result<()> {
    let handle = store
        .get_ref(collection, doc_id)
        .watch(path, |notice| match notice.value {
            Some(value) => println!("{} {}", notice.path, value),
            None => println!("{} <no value yet>", notice.path),
        })
        .with_context(|| format!("Invalid path {path}"))?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    handle.unsubscribe();
    // Let the removeWatch frame leave before the connection drops.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let _ = init_telemetry(&TelemetryConfig::from_settings(&settings.logging));

    match cli.command {
        Command::Serve { .. } => serve(&settings).await,
        Command::Get {
            collection,
            doc_id,
            path,
        } => {
            let store = connect(&settings).await?;
            apply(store.get_ref(&collection, &doc_id).get(&path)).await
        }
        Command::Set {
            collection,
            doc_id,
            path,
            value,
        } => {
            let store = connect(&settings).await?;
            apply(store.get_ref(&collection, &doc_id).set(&path, parse_value(&value))).await
        }
        Command::SetDate {
            collection,
            doc_id,
            path,
        } => {
            let store = connect(&settings).await?;
            apply(store.get_ref(&collection, &doc_id).set_date(&path)).await
        }
        Command::Delete {
            collection,
            doc_id,
            path,
        } => {
            let store = connect(&settings).await?;
            apply(store.get_ref(&collection, &doc_id).delete(&path)).await
        }
        Command::Move {
            collection,
            doc_id,
            from,
            to,
        } => {
            let store = connect(&settings).await?;
            apply(store.get_ref(&collection, &doc_id).move_value(&from, &to)).await
        }
        Command::Find {
            collection,
            start,
            end,
        } => {
            let store = connect(&settings).await?;
            for doc in store.find_ref(&collection, &start, &end).await? {
                println!("{}", doc.doc_id());
            }
            Ok(())
        }
        Command::Watch {
            collection,
            doc_id,
            path,
        } => {
            let store = connect(&settings).await?;
            watch(&store, &collection, &doc_id, &path).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_as_json_or_fall_back_to_strings() {
        assert_eq!(parse_value("42"), serde_json::json!(42));
        assert_eq!(parse_value(r#"{"a": [1]}"#), serde_json::json!({"a": [1]}));
        assert_eq!(parse_value("moon"), serde_json::json!("moon"));
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9000, "host": "0.0.0.0"}}"#).unwrap();

        let cli = Cli::parse_from([
            "webstore",
            "--settings",
            path.to_str().unwrap(),
            "--log-level",
            "debug",
            "serve",
            "--port",
            "9100",
            "--dev-mode",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(settings.server.dev_mode);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn client_commands_parse() {
        let cli = Cli::parse_from(["webstore", "--url", "ws://h:1/ws", "move", "c", "d", "$.a", "$.b"]);
        assert!(matches!(cli.command, Command::Move { ref from, ref to, .. } if from == "$.a" && to == "$.b"));
        assert_eq!(cli.url.as_deref(), Some("ws://h:1/ws"));
    }
}
