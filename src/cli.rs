// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use led_preview::loader::UiMode;
use led_preview::scheduler::TickErrorPolicy;

#[derive(Parser)]
#[command(name = "led-preview")]
#[command(author, version, about = "Load, check and preview scripted LED effects")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ~/.config/led-preview/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Effect pack directory or http(s) base URL
    #[arg(long, global = true, value_name = "PATH|URL")]
    pub effects: Option<String>,

    /// Device pack directory or http(s) base URL
    #[arg(long, global = true, value_name = "PATH|URL")]
    pub devices: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available effects
    #[command(visible_alias = "ls")]
    List,

    /// Show metadata and the compiled panel of an effect
    Show {
        /// Effect id
        id: String,
        /// Panel source to compile
        #[arg(long)]
        ui: Option<UiMode>,
    },

    /// Load an effect with type checking and report diagnostics
    Check {
        /// Effect id
        id: String,
        /// Panel source to check alongside the logic
        #[arg(long)]
        ui: Option<UiMode>,
    },

    /// Run an effect headless and print each frame as hex
    Run {
        /// Effect id
        id: String,
        /// Frames to print
        #[arg(short = 'n', long, default_value = "10")]
        frames: usize,
        /// LED count (default from config)
        #[arg(long)]
        leds: Option<usize>,
        /// Use the compiled-in effect instead of loading the script
        #[arg(long)]
        builtin: bool,
        /// What a failing tick does
        #[arg(long)]
        policy: Option<TickErrorPolicy>,
    },

    /// Preview an effect interactively in the terminal
    Preview {
        /// Effect id
        id: String,
        /// Device geometry to draw on (auto-selected when the pack has one)
        #[arg(long)]
        device: Option<String>,
        /// LED count when no device is used
        #[arg(long)]
        leds: Option<usize>,
        /// Panel source
        #[arg(long)]
        ui: Option<UiMode>,
        /// Use the compiled-in effect (no panel)
        #[arg(long)]
        builtin: bool,
        /// What a failing tick does
        #[arg(long)]
        policy: Option<TickErrorPolicy>,
        /// Redraw cap (frames per second)
        #[arg(long)]
        fps: Option<u32>,
    },
}
