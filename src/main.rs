//! Deckhand - Entry Point
//!
//! `deckhand list` prints the supported devices that are plugged in;
//! `deckhand run` connects them and logs their input until Ctrl-C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deckhand::core::config::Config;
use deckhand::core::events::{CoreEvent, CoreEventSender};
use deckhand::deck::Deck;
use deckhand::hid::DeckManager;
use deckhand::screen::{EventTrigger, LogAction, ToggleTrigger, Trigger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "deckhand", about = "Stream Deck driver daemon")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected devices
    List,
    /// Connect every device and log its input until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::List => list(cli.config),
        Commands::Run => run(cli.config).await,
    };
    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
}

fn list(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let (events, _rx) = CoreEventSender::channel();
    let manager = DeckManager::new(config, events)?;

    let devices = manager.list_devices()?;
    if devices.is_empty() {
        println!("No supported devices found");
    }
    for device in devices {
        println!("{:<24} {:<12} {}", device.serial, device.model.to_string(), device.path);
    }
    Ok(())
}

async fn run(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let (events, mut rx) = CoreEventSender::channel();
    let manager = DeckManager::new(config, events).context("Failed to start device manager")?;
    manager.start_monitor();
    info!("Waiting for devices (Ctrl-C to quit)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    CoreEvent::DeviceConnected { serial, .. } => {
                        if let Some(deck) = manager.deck(&serial) {
                            if let Err(e) = log_inputs(&deck) {
                                warn!("Could not set up logging on {}: {:#}", serial, e);
                            }
                        }
                    }
                    CoreEvent::ProtocolViolation { serial, message } => {
                        warn!("{}: {}", serial, message);
                    }
                    CoreEvent::DeviceAvailable { .. } | CoreEvent::DeviceDisconnected { .. } => {}
                }
            }
        }
    }

    shutdown(manager).await
}

/// Stop the monitor and dispose every deck off the async runtime, since both
/// join threads
async fn shutdown(manager: DeckManager) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        manager.stop_monitor();
        manager.disconnect_all();
    })
    .await
    .context("Shutdown task failed")?;
    info!("All devices released");
    Ok(())
}

/// Put a logging trigger for every event each input supports on the root screen
fn log_inputs(deck: &Deck) -> Result<()> {
    let screen = deck.current_screen();
    let triggers: Vec<Arc<dyn Trigger>> = vec![
        Arc::new(ToggleTrigger),
        Arc::new(EventTrigger::button_released()),
        Arc::new(EventTrigger::encoder_pressed()),
        Arc::new(EventTrigger::encoder_twisted()),
        Arc::new(EventTrigger::touch_pressed()),
        Arc::new(EventTrigger::touch_long_pressed()),
        Arc::new(EventTrigger::touch_swiped()),
    ];

    for input in deck.inputs() {
        let item = match screen.item(input.index()) {
            Some(item) => item,
            None => screen.create_item(input.index())?,
        };
        for trigger in triggers.iter().filter(|t| t.is_applicable_to(input.capabilities())) {
            item.add_trigger(Arc::clone(trigger))?
                .add_action(Arc::new(LogAction));
        }
    }
    info!("Logging input of {} ({} positions)", deck.serial(), deck.inputs().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand::hid::mock::MockBackend;
    use deckhand::protocol::DeviceModel;

    #[tokio::test]
    async fn test_shutdown_releases_devices() {
        let backend = MockBackend::new();
        let handle = backend.add_device(DeviceModel::Mini, "MINI");
        let (events, _rx) = CoreEventSender::channel();
        let manager = DeckManager::with_backend(Arc::new(backend), Config::default(), events);
        let deck = manager.connect("MINI").unwrap();
        manager.start_monitor();

        shutdown(manager).await.unwrap();
        assert!(!deck.is_alive());
        assert!(!handle.is_open());
    }
}
