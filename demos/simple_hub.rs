//! Session hub demo over the scripted protocol client
//!
//! Run with: cargo run --example simple_hub
//!
//! Environment:
//!   LOG_LEVEL=debug          log level (trace, debug, info, warn, error)
//!   LOG_FORMAT=json          JSON log lines instead of plain text
//!   HUB_CODE_WAIT_SECS=15    see `HubConfig::from_env`
//!
//! The demo restores one persisted device, pairs a second one through a
//! scripted code exchange, injects a few inbound messages and prints every
//! event as JSON until Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use session_hub::protocol::mock::{MockClient, MockFactory, PairingStep};
use session_hub::protocol::{InboundMessage, MessageContent, ProtocolEvent};
use session_hub::storage::{CredentialRecord, MemoryStore};
use session_hub::{HubConfig, Identity, SendRequest, SessionSupervisor, StatusResponse};
use tracing::Level;

fn init_logging() {
    let raw = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let (level, invalid) = match raw.parse::<Level>() {
        Ok(level) => (level, false),
        Err(_) => (Level::INFO, true),
    };

    let level = level.as_str().to_ascii_lowercase();
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "session_hub={level},simple_hub={level}"
    ));

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if invalid {
        tracing::warn!(value = %raw, "Invalid LOG_LEVEL, using info");
    }
}

fn inbound(sender: &str, text: &str) -> ProtocolEvent {
    ProtocolEvent::Message(InboundMessage {
        sender: sender.into(),
        chat: sender.into(),
        push_name: "Demo Contact".into(),
        timestamp: Utc::now(),
        content: MessageContent::Text(text.into()),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let store = Arc::new(MemoryStore::with_records([
        CredentialRecord::new("34600111222:1@s.whatsapp.net").with_display_name("Front desk"),
    ]));

    let factory = Arc::new(MockFactory::new());
    let paired = Identity::new("34600333444:1@s.whatsapp.net");
    factory.queue_device(MockClient::pairing(vec![
        PairingStep::Code("2@demo-code-1".into()),
        PairingStep::Delay(Duration::from_secs(2)),
        PairingStep::Code("2@demo-code-2".into()),
        PairingStep::Delay(Duration::from_secs(2)),
        PairingStep::Success(paired.clone()),
    ]));

    let config = HubConfig::from_env().settle_delay(Duration::from_millis(200));
    let supervisor = Arc::new(SessionSupervisor::new(config, store, factory.clone()));

    let mut events = supervisor.stream_events();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("failed to encode event: {e}"),
            }
        }
    });

    let driver = {
        let supervisor = Arc::clone(&supervisor);
        let factory = Arc::clone(&factory);
        tokio::spawn(async move {
            // Let startup restore the persisted device
            tokio::time::sleep(Duration::from_millis(100)).await;

            let login = supervisor.start_login().await;
            println!("login: {}", serde_json::to_string(&login).unwrap_or_default());

            tokio::time::sleep(Duration::from_secs(5)).await;
            match serde_json::to_string(&supervisor.list_devices().await.unwrap_or_default()) {
                Ok(devices) => println!("devices: {devices}"),
                Err(e) => eprintln!("failed to encode devices: {e}"),
            }

            if let Some(client) = factory.client_for(&"34600111222:1@s.whatsapp.net".into()) {
                client.emit(inbound("34699000111", "hello front desk")).await;
            }
            if let Some(client) = factory.client_for(&paired) {
                client.emit(inbound("34699000222", "hello new device")).await;
            }

            let reply = SendRequest::text("34699000111", "thanks!").from_device("34600111222");
            let status = StatusResponse::from(supervisor.send_message(reply).await);
            println!("send: {}", serde_json::to_string(&status).unwrap_or_default());
        })
    };

    println!("Session hub running, press Ctrl+C to stop");

    supervisor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await;

    driver.abort();
    println!("Shut down");

    Ok(())
}
