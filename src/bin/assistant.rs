//! Voice Assistant Client
//!
//! Connects the default microphone and speakers to a remote voice agent
//! over WebSocket and holds the conversation until Ctrl+C.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicewire::{
    audio::list_devices,
    config::AppConfig,
    transport::WsTransport,
    SessionState, VoiceSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Voicewire Assistant");

    // Load config from the first argument, or the platform default path
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppConfig::default_path);
    let config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    // List available devices
    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}", device.name, device_type, default_marker);
    }
    println!();

    tracing::info!("Agent endpoint: {}", config.transport.url);

    let transport = WsTransport::new(config.transport.url.clone());
    let mut session = VoiceSession::new(config, Arc::new(transport));

    session.start().await?;
    tracing::info!("Session started - press Ctrl+C to stop");

    // Run until Ctrl+C or the session ends on its own
    let mut state_rx = session.subscribe();
    let mut stats_timer = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                if matches!(state, SessionState::Closed | SessionState::Error) {
                    tracing::info!("Session ended: {}", state);
                    break;
                }
            }
            _ = stats_timer.tick() => {
                let stats = session.stats();
                if stats.state == SessionState::Active {
                    tracing::info!(
                        "Stats: {} frames sent ({} dropped), {} chunks received ({} bad), {} interruptions, playback at {:.1}s",
                        stats.frames_queued,
                        stats.frames_dropped,
                        stats.chunks_received,
                        stats.chunks_dropped,
                        stats.interruptions,
                        stats.playback_position_secs
                    );
                }
            }
        }
    }

    session.stop().await;
    tracing::info!("Session closed");
    Ok(())
}
