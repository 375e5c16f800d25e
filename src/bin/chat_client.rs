/// Terminal chat client
///
/// Keeps an RSA identity in a local key directory, publishes the public key
/// once, and exchanges encrypted direct messages with one peer.
///
/// Usage:
/// ```bash
/// cargo run --bin chat-client -- --user <uuid> --peer <uuid> [OPTIONS]
/// ```
///
/// Options:
/// - `--server <url>`: Server base URL (default: http://127.0.0.1:5000)
/// - `--keys-dir <path>`: Local key store directory (default: .chat-keys)
use anyhow::{bail, Context, Result};
use crypto_core::{FileKeyStore, HttpKeyPublisher, KeyManager};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ClientConfig {
    server: String,
    user: Uuid,
    peer: Uuid,
    keys_dir: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerIdentity {
    username: String,
    public_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    from_self: bool,
    body: String,
    media_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = parse_args()?;
    let server = config.server.trim_end_matches('/').to_string();

    let mut keys = KeyManager::new(
        config.user.to_string(),
        Arc::new(FileKeyStore::new(&config.keys_dir)),
    );
    if keys.ensure_keys().context("Failed to load or create local keys")? {
        info!(keys_dir = %config.keys_dir, "generated a new identity keypair");
    }

    let publisher = HttpKeyPublisher::new(server.clone());
    if let Err(e) = keys.publish_public_key(&publisher).await {
        // Retried automatically on the next start
        warn!(error = %e, "could not publish public key");
    }

    let http = reqwest::Client::new();
    let peer: PeerIdentity = http
        .get(format!("{server}/api/identity/{}", config.peer))
        .send()
        .await?
        .error_for_status()
        .context("Peer lookup failed")?
        .json()
        .await?;
    if peer.public_key.is_none() {
        println!("! {} has no public key yet; messages are sent unencrypted", peer.username);
    }

    let history: Vec<HistoryEntry> = http
        .post(format!("{server}/api/history/fetch"))
        .json(&json!({ "from": config.user, "to": config.peer }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    for entry in &history {
        // Own messages were encrypted for the peer and cannot be read back
        let text = if entry.from_self {
            "(sent, encrypted)".to_string()
        } else {
            keys.decrypt_own(&entry.body)
        };
        let who = if entry.from_self { "me" } else { peer.username.as_str() };
        match &entry.media_url {
            Some(url) => println!("[{who}] {text} <{url}>"),
            None => println!("[{who}] {text}"),
        }
    }

    let ws_url = format!("{}/ws", server.replacen("http", "ws", 1));
    let (socket, _) = connect_async(ws_url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {ws_url}"))?;
    let (mut sink, mut stream) = socket.split();

    sink.send(WsMessage::Text(
        json!({ "type": "announce-identity", "userId": config.user })
            .to_string()
            .into(),
    ))
    .await?;

    println!("connected as {}; chatting with {}", config.user, peer.username);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let body = keys.encrypt_for(peer.public_key.as_deref(), line)?;
                sink.send(WsMessage::Text(
                    json!({
                        "type": "send-direct",
                        "to": config.peer,
                        "from": config.user,
                        "body": body,
                    })
                    .to_string()
                    .into(),
                ))
                .await?;

                http.post(format!("{server}/api/history/append"))
                    .json(&json!({ "from": config.user, "to": config.peer, "body": body }))
                    .send()
                    .await?
                    .error_for_status()
                    .context("Failed to store message")?;
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_event(&keys, &peer, text.as_str());
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        println!("connection closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => bail!("WebSocket error: {e}"),
                }
            }
        }
    }

    Ok(())
}

fn handle_event(keys: &KeyManager, peer: &PeerIdentity, raw: &str) {
    let Ok(event) = serde_json::from_str::<serde_json::Value>(raw) else {
        warn!(frame = raw, "unparsable frame from server");
        return;
    };

    match event["type"].as_str() {
        Some("receive-direct") => {
            let body = event["body"].as_str().unwrap_or_default();
            let text = keys.decrypt_own(body);
            match event["mediaUrl"].as_str() {
                Some(url) => println!("[{}] {text} <{url}>", peer.username),
                None => println!("[{}] {text}", peer.username),
            }
        }
        Some("delivery-report") => {
            if event["delivered"] == false {
                println!("  (peer offline; message stored)");
            }
        }
        Some("error") => {
            println!("! {}", event["error"].as_str().unwrap_or("unknown error"));
        }
        _ => {}
    }
}

fn parse_args() -> Result<ClientConfig> {
    let args: Vec<String> = std::env::args().collect();
    let mut server = String::from("http://127.0.0.1:5000");
    let mut keys_dir = String::from(".chat-keys");
    let mut user = None;
    let mut peer = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => server = arg_value(&args, i)?.to_string(),
            "--keys-dir" => keys_dir = arg_value(&args, i)?.to_string(),
            "--user" => {
                user = Some(
                    Uuid::parse_str(arg_value(&args, i)?).context("Invalid UUID for --user")?,
                )
            }
            "--peer" => {
                peer = Some(
                    Uuid::parse_str(arg_value(&args, i)?).context("Invalid UUID for --peer")?,
                )
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {other}"),
        }
        i += 2;
    }

    Ok(ClientConfig {
        server,
        user: user.context("--user is required")?,
        peer: peer.context("--peer is required")?,
        keys_dir,
    })
}

fn arg_value(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} requires a value", args[i]))
}

fn print_help() {
    println!("chat-client --user <uuid> --peer <uuid> [--server <url>] [--keys-dir <path>]");
}
