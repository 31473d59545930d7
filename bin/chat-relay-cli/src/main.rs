//! chat-relay – terminal client for a chat-relay server.
//!
//! Sends each prompt through the relay client loop, printing deltas as they
//! arrive. When the server is unreachable the prompt goes straight to the
//! model API instead; nothing is persisted on that path.

use std::io::Write;

use anyhow::Result;
use chat_relay_core::client::{BackendTransport, ChatTransport, DirectTransport};
use chat_relay_core::upstream::{DEFAULT_MODEL, DIRECT_UPSTREAM_URL};
use chat_relay_core::{ChatExchange, RelayClient, UpstreamConfig, energy_level};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(about = "Chat with a model through a chat-relay server")]
struct Args {
    /// Base URL of the chat-relay server
    #[arg(long, env = "CHAT_RELAY_SERVER", default_value = "http://localhost:5000")]
    server: String,

    /// Model API endpoint used when the server is unreachable
    #[arg(long, env = "CHAT_RELAY_DIRECT_URL", default_value = DIRECT_UPSTREAM_URL)]
    direct_url: String,

    /// Model requested on the direct path
    #[arg(long, env = "CHAT_RELAY_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Never bypass the server
    #[arg(long)]
    no_fallback: bool,

    /// `tracing` filter for diagnostics on stderr
    #[arg(long, env = "CHAT_RELAY_LOG", default_value = "warn")]
    log: String,

    /// Send this prompt and exit; without it, prompts are read from stdin
    prompt: Vec<String>,
}

impl Args {
    fn client(&self) -> RelayClient {
        let mut transports: Vec<Box<dyn ChatTransport>> =
            vec![Box::new(BackendTransport::new(self.server.clone()))];
        if !self.no_fallback {
            let direct = UpstreamConfig {
                model: self.model.clone(),
                ..UpstreamConfig::direct().with_url(self.direct_url.clone())
            };
            transports.push(Box::new(DirectTransport::new(direct)));
        }
        RelayClient::new(transports)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = args
        .log
        .parse::<tracing_subscriber::EnvFilter>()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = args.client();
    debug!(?client, "relay client ready");

    if !args.prompt.is_empty() {
        let prompt = args.prompt.join(" ");
        return match send(&client, &prompt).await {
            Some(_) => Ok(()),
            None => anyhow::bail!("chat exchange failed"),
        };
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt_marker()?;
    while let Some(line) = lines.next_line().await? {
        let prompt = line.trim();
        if !prompt.is_empty() {
            send(&client, prompt).await;
        }
        prompt_marker()?;
    }
    Ok(())
}

/// Run one exchange, streaming deltas to stdout. Failures are reported on
/// stderr from the client's typing state.
async fn send(client: &RelayClient, prompt: &str) -> Option<ChatExchange> {
    let result = client
        .send_message_with(prompt, |delta| {
            let mut stdout = std::io::stdout().lock();
            // A closed stdout only loses the live echo; the summary still prints.
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        })
        .await;

    match result {
        Ok(exchange) => {
            println!();
            println!("{}", summary(&exchange));
            Some(exchange)
        }
        Err(e) => {
            println!();
            let reason = client.state().error.unwrap_or_else(|| e.to_string());
            eprintln!("error: {reason}");
            None
        }
    }
}

fn prompt_marker() -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(b"> ")?;
    stdout.flush()
}

/// One-line footer shown under an assistant reply.
fn summary(exchange: &ChatExchange) -> String {
    let ai = &exchange.ai_message;
    let mut line = match ai.response_time {
        Some(ms) => format!("[{ms} ms, energy {}%", energy_level(ms)),
        None => "[".to_owned(),
    };
    if let Some(tags) = ai.agentic_actions.as_deref().filter(|t| !t.is_empty()) {
        if line.len() > 1 {
            line.push_str(", ");
        }
        line.push_str(&tags.join(" | "));
    }
    line.push(']');
    line
}
