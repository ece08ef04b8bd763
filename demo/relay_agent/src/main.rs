mod config;
use config::RelayAgentConfig;
use relay_core::telemetry::init_tracing;
use relay_core::{
    ChatMessage, CredentialResolver, InferenceClient, Relay, RelayError, Role, UserInput,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing("info,relay_core=info,relay_agent=info");

    info!(target: "relay_agent", "Starting relay agent: stdin → credentials → inference → stdout");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = RelayAgentConfig::load();

    let resolver = Arc::new(CredentialResolver::new(cfg.credentials.clone()));
    let _resolution = resolver.start();

    // Report the outcome once resolution settles
    {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            match resolver.ensure_ready().await {
                Ok(()) => info!(target: "relay_agent", strategy = ?resolver.active_strategy(), "Credentials ready"),
                Err(e) => warn!(target: "relay_agent", error = %e, "Credentials unavailable; replies will be degraded"),
            }
        });
    }

    let inference_resolver = cfg.inference_uses_resolver.then(|| Arc::clone(&resolver));
    let client = InferenceClient::new(cfg.inference.clone(), inference_resolver)?;
    let relay = Relay::new(Arc::new(client));

    println!("Type a message, or /health, /refresh, /secret <name>. Ctrl-C to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                info!(target: "relay_agent", "Ctrl-C received; shutting down");
                break;
            }
        };
        let Some(line) = line else { break };
        let line = line.trim();

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("/health", _) => {
                println!("{}", serde_json::to_string_pretty(&resolver.health_status())?);
            }
            ("/refresh", _) => match resolver.refresh_credentials().await {
                Ok(()) => println!("refreshed: {:?}", resolver.active_strategy()),
                Err(e) => {
                    error!(target: "relay_agent", error = %e, "Refresh failed");
                    println!("refresh failed");
                }
            },
            ("/secret", name) if !name.is_empty() => match resolver.get_secret(name).await {
                // never echo the value itself
                Ok(value) => println!("{name}: {} chars", value.chars().count()),
                Err(e) if e.is_not_found() => println!("{name}: not found"),
                Err(e) => {
                    error!(target: "relay_agent", error = %e, secret = %name, "Secret lookup failed");
                    println!("{name}: unavailable");
                }
            },
            _ => {
                let reply = relay.handle(UserInput::Text(line.to_string()), &history).await;
                println!("{}", reply.text);
                if !reply.degraded && !reply.text.is_empty() {
                    history.push(ChatMessage::new(Role::User, line));
                    history.push(ChatMessage::new(Role::Assistant, reply.text));
                    let keep = cfg.history_turns * 2;
                    if history.len() > keep {
                        history.drain(..history.len() - keep);
                    }
                }
            }
        }
    }

    info!(target: "relay_agent", "Relay agent stopped");
    Ok(())
}
