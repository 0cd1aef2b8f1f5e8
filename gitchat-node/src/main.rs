//! Small interactive CLI driving one [`GitChatNode`] for manual/integration
//! testing — the command-line analog of `wichain-backend`'s Tauri command
//! surface, minus the desktop shell.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use gitchat_mesh::{InMemoryStore, MeshConfig};
use gitchat_node::{GitChatNode, NodeConfig};
use gitchat_transport::{ClusteredHub, ClusteredRadio, Transport};
use tokio::sync::Mutex;
use tracing::{error, info};

/// All nodes launched by one process share this in-process rendezvous,
/// standing in for real radio hardware (spec §4.1 clustered radio).
static DEMO_HUB: std::sync::OnceLock<Arc<ClusteredHub>> = std::sync::OnceLock::new();

fn demo_hub() -> Arc<ClusteredHub> {
    Arc::clone(DEMO_HUB.get_or_init(ClusteredHub::new))
}

async fn load_node_config(self_name: &str) -> NodeConfig {
    match gitchat_node::load_from_file(Path::new("gitchat.toml")) {
        Ok(Some(config)) => {
            info!(path = "gitchat.toml", "loaded config overrides");
            config
        }
        Ok(None) => NodeConfig { self_name: self_name.to_string(), device_model: "GitChat Node".to_string(), mesh: MeshConfig::default() },
        Err(e) => {
            error!(error = %e, "failed to parse gitchat.toml, falling back to defaults");
            NodeConfig { self_name: self_name.to_string(), device_model: "GitChat Node".to_string(), mesh: MeshConfig::default() }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let self_name = std::env::args().nth(1).unwrap_or_else(|| "node".to_string());
    let config = load_node_config(&self_name).await;

    let radio = ClusteredRadio::new(demo_hub(), &config.self_name, &config.self_name).await;
    let transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(radio));
    let store = Arc::new(InMemoryStore::new());

    let node = GitChatNode::from_config(config, transport, store);
    node.start().await.context("failed to start mesh engine")?;
    info!(name = node.mesh().self_name(), "node started");

    run_repl(&node).await;

    node.stop().await.context("failed to stop mesh engine")?;
    Ok(())
}

/// Reads one command per line from stdin. Supported commands:
/// `send <to> <body>`, `peers`, `snapshot`, `call <video|audio>`,
/// `answer`, `hangup`, `quit`.
async fn run_repl(node: &Arc<GitChatNode>) {
    let stdin = io::stdin();
    print!("> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            print!("> ");
            let _ = io::stdout().flush();
            continue;
        }
        if !dispatch(node, line).await {
            break;
        }
        print!("> ");
        let _ = io::stdout().flush();
    }
}

async fn dispatch(node: &Arc<GitChatNode>, line: &str) -> bool {
    let mut parts = line.splitn(3, ' ');
    match parts.next().unwrap_or("") {
        "quit" | "exit" => return false,
        "peers" => {
            for peer in node.mesh().peers().list().await {
                println!("{} ({:?}, connected={})", peer.endpoint_id, peer.estimated_distance, peer.is_connected);
            }
        }
        "snapshot" => match serde_json::to_string_pretty(&node.snapshot().await) {
            Ok(json) => println!("{json}"),
            Err(e) => error!(error = %e, "failed to serialize snapshot"),
        },
        "send" => {
            let Some(to) = parts.next() else {
                println!("usage: send <to> <body>");
                return true;
            };
            let body = parts.next().unwrap_or("");
            match node.send_text(to, body, None).await {
                Ok(message) => println!("sent {}", message.id),
                Err(e) => error!(error = %e, "send failed"),
            }
        }
        "call" => {
            let video = parts.next() == Some("video");
            match node.call().start_call(video).await {
                Ok(()) => println!("calling..."),
                Err(e) => error!(error = %e, "call failed to start"),
            }
        }
        "answer" => {
            if let Err(e) = node.call().answer_call().await {
                error!(error = %e, "answer failed");
            }
        }
        "hangup" => node.call().end_call().await,
        other => println!("unknown command: {other}"),
    }
    true
}
