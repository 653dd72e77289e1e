//! CLI command handlers that drive an effect machine.

use anyhow::Context;
use led_preview::config::PreviewConfig;
use led_preview::device::{self, DeviceConfig};
use led_preview::effect::preview as terminal;
use led_preview::effect::registry::effect_registry;
use led_preview::effect::{LedBuffer, MachineStatus};
use led_preview::session::{PreviewSession, SessionOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::CommandResult;

/// Build a session for `id`, from the compiled-in registry or the pack.
async fn open_session(
    config: &PreviewConfig,
    id: &str,
    builtin: bool,
    options: SessionOptions,
) -> Result<PreviewSession, Box<dyn std::error::Error>> {
    if builtin {
        let factory = effect_registry()
            .find(id)
            .ok_or_else(|| format!("unknown builtin effect: {id}"))?;
        return Ok(PreviewSession::new(factory.as_ref(), None, options)?);
    }

    let loaded = super::loader(config, config.type_check)?
        .load(id, config.ui_mode)
        .await
        .map_err(|e| format!("{}: {e}", e.kind()))?;
    for diagnostic in &loaded.diagnostics {
        warn!(effect_id = id, "{diagnostic}");
    }
    Ok(PreviewSession::from_loaded(&loaded, options)?)
}

/// Run an effect headless and print `frames` frames as hex triplets.
pub async fn run(
    config: &PreviewConfig,
    id: &str,
    frames: usize,
    leds: Option<usize>,
    builtin: bool,
) -> CommandResult {
    let options = SessionOptions {
        led_count: leds.unwrap_or(config.default_led_count),
        device: None,
        policy: config.tick_error_policy,
    };
    let session = open_session(config, id, builtin, options).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    session.scheduler().subscribe_frames(move |frame| {
        let _ = tx.send(LedBuffer::from_bytes(frame.to_vec()));
    });
    let mut errors = session.scheduler().take_errors();
    let mut status = session.scheduler().watch_status();

    println!(
        "{}: {} LEDs, {} ms per frame",
        session.effect_id(),
        session.leds().led_count(),
        session.speed()
    );
    session.toggle_run()?;

    let mut printed = 0;
    while printed < frames {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                println!("{printed:>4}  {}", frame.to_hex());
                printed += 1;
            }

            Some(e) = errors.recv() => {
                println!("{printed:>4}  error: {e}");
            }

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                // Halted by a failing tick
                if *status.borrow() == MachineStatus::Paused {
                    let error = session
                        .scheduler()
                        .last_error()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "machine paused".to_string());
                    session.close()?;
                    return Err(format!("{id}: {error}").into());
                }
            }
        }
    }

    session.close()?;
    Ok(())
}

/// Device to draw on: the requested one, or the pack's only device.
async fn select_device(
    config: &PreviewConfig,
    requested: Option<String>,
) -> anyhow::Result<Option<DeviceConfig>> {
    let source = super::devices_source(config)?;
    let id = match requested {
        Some(id) => id,
        None => match device::load_manifest(source.as_ref()).await {
            Ok(manifest) => match manifest.auto_select() {
                Some(id) => id.to_string(),
                None => return Ok(None),
            },
            Err(e) => {
                debug!(error = %e, "no device manifest");
                return Ok(None);
            }
        },
    };
    let device = device::load_device(source.as_ref(), &id)
        .await
        .with_context(|| format!("load device {id}"))?;
    Ok(Some(device))
}

/// Interactive terminal preview.
///
/// An explicit `--leds` skips device auto-selection.
pub async fn preview(
    config: &PreviewConfig,
    id: &str,
    device: Option<String>,
    leds: Option<usize>,
    builtin: bool,
) -> CommandResult {
    let device = if device.is_some() || leds.is_none() {
        select_device(config, device).await?
    } else {
        None
    };
    if let Some(device) = &device {
        info!(device = %device.id, leds = device.led_count(), "using device");
    }

    let options = SessionOptions {
        led_count: leds.unwrap_or(config.default_led_count),
        device,
        policy: config.tick_error_policy,
    };
    let mut session = open_session(config, id, builtin, options).await?;
    session.toggle_run()?;

    terminal::run(&mut session, config.frame_interval()).await?;

    session.close()?;
    Ok(())
}
