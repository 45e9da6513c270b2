//! HID handler daemon entry point.
//!
//! Loads the configuration and layout files, opens the USB transport, starts
//! the handler and logs every decoded event until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! hid-handler [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Configuration file [env: HID_HANDLER_CONFIG]
//!   --layouts-dir <DIR>    Layout directory, overrides the configuration
//!   --log-level <LEVEL>    Log level when RUST_LOG is unset
//!   --list-layouts         Print the available layouts and exit
//! ```
//!
//! A real USB transport requires building with `--features libusb`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hid_handler::infrastructure::storage::config::{config_file_path, load_config};
use hid_handler::infrastructure::storage::layouts::load_layouts;
use hid_handler::infrastructure::usb::UsbTransport;
use hid_handler::{HidHandler, Notification};
use hid_handler_core::Topic;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// User-space USB HID handler.
#[derive(Debug, Parser)]
#[command(name = "hid-handler", about = "User-space USB HID driver layer", version)]
struct Cli {
    /// Configuration file.  Defaults to the platform config directory.
    #[arg(long, env = "HID_HANDLER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of layout files, overriding `layouts.dir`.
    #[arg(long, env = "HID_HANDLER_LAYOUTS")]
    layouts_dir: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set, overriding
    /// `handler.log_level`.
    #[arg(long)]
    log_level: Option<String>,

    /// Print the names of the available layouts and exit.
    #[arg(long)]
    list_layouts: bool,
}

#[cfg(feature = "libusb")]
fn open_transport() -> anyhow::Result<Arc<dyn UsbTransport>> {
    let transport = hid_handler::infrastructure::usb::libusb::LibusbTransport::new()
        .context("failed to initialise libusb")?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "libusb"))]
fn open_transport() -> anyhow::Result<Arc<dyn UsbTransport>> {
    anyhow::bail!("no USB transport compiled in; rebuild with `--features libusb`")
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::Hid {
            topic: Topic::Event,
            event,
        } => info!("{event}"),
        Notification::Hid { topic, event } => {
            debug!("{topic} {}#{}", event.device, event.interface)
        }
        Notification::Usb { action, device } => info!("usb {} {device}", action.as_str()),
        Notification::End => {}
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("cannot locate the configuration file")?,
    };
    let mut config = load_config(&config_path)
        .with_context(|| format!("cannot load configuration {}", config_path.display()))?;

    // `RUST_LOG` wins over the CLI, the CLI over the configuration file.
    let level = cli
        .log_level
        .unwrap_or_else(|| config.handler.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)))
        .init();

    info!("HID handler starting, configuration {}", config_path.display());

    if let Some(dir) = cli.layouts_dir {
        config.layouts.dir = Some(dir);
    }
    let layouts = load_layouts(&config.layouts);
    if cli.list_layouts {
        for name in layouts.layout_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut handler = HidHandler::new(open_transport()?).with_layouts(layouts);

    let mut events = handler.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(notification) => log_notification(&notification),
                Err(RecvError::Lagged(missed)) => warn!("event logger lagged, {missed} event(s) dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    handler
        .start(Some(config.to_handler_config()))
        .await
        .context("failed to start the HID handler")?;
    info!("HID handler ready.  Press Ctrl-C to exit.");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        // Only the wait is raced; a received notification is always handled
        // to completion so teardown is never cut short.
        let notification = tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!("cannot listen for Ctrl-C: {e}");
                }
                info!("shutdown signal received");
                break;
            }
            next = handler.next_notification() => next,
        };
        match notification {
            Some(notification) => handler.handle_notification(notification).await,
            None => break,
        }
    }

    handler.stop().await.context("error while stopping the HID handler")?;
    info!("HID handler stopped");
    Ok(())
}
