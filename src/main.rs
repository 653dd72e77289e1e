//! LED effect preview CLI
//!
//! Loads scripted effects from a pack, checks them and runs them headless or
//! in an interactive terminal preview.

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use led_preview::config::PreviewConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The terminal preview owns the screen; only warnings get through
    let level = match (&cli.command, cli.verbose) {
        (Commands::Preview { .. }, _) => "warn",
        (_, true) => "debug",
        (_, false) => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("led_preview={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => PreviewConfig::load(path)?,
        None => PreviewConfig::load_default()?,
    };
    if let Some(effects) = cli.effects {
        config.effects_root = effects;
    }
    if let Some(devices) = cli.devices {
        config.devices_root = devices;
    }
    debug!(?config, "configuration");

    match cli.command {
        Commands::List => {
            commands::effect::list(&config).await?;
        }
        Commands::Show { id, ui } => {
            commands::effect::show(&config, &id, ui.unwrap_or(config.ui_mode)).await?;
        }
        Commands::Check { id, ui } => {
            commands::effect::check(&config, &id, ui.unwrap_or(config.ui_mode)).await?;
        }
        Commands::Run {
            id,
            frames,
            leds,
            builtin,
            policy,
        } => {
            if let Some(policy) = policy {
                config.tick_error_policy = policy;
            }
            commands::preview::run(&config, &id, frames, leds, builtin).await?;
        }
        Commands::Preview {
            id,
            device,
            leds,
            ui,
            builtin,
            policy,
            fps,
        } => {
            if let Some(ui) = ui {
                config.ui_mode = ui;
            }
            if let Some(policy) = policy {
                config.tick_error_policy = policy;
            }
            if let Some(fps) = fps {
                config.preview_fps = fps;
            }
            commands::preview::preview(&config, &id, device, leds, builtin).await?;
        }
    }

    Ok(())
}
