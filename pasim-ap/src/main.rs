//! Announcement player (pasim-ap) - Main entry point
//!
//! Runs the exam-day public-address simulation: loads config and catalog,
//! opens the audio device, and drives the simulator from stdin commands until
//! `quit`, end of input, or Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pasim_ap::audio::{AudioOutput, RoutingFetcher, SymphoniaDecoder};
use pasim_ap::catalog::{Catalog, SoundLibrary};
use pasim_ap::config::{AppConfig, ConfigOverrides};
use pasim_ap::console::{self, Command};
use pasim_ap::playback::{OutputBus, PlaybackEngine};
use pasim_ap::simulator::{DayPlan, Simulator};
use pasim_common::events::EventBus;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pasim-ap
#[derive(Parser, Debug)]
#[command(name = "pasim-ap")]
#[command(about = "Exam-day public-address simulator")]
#[command(version)]
struct Args {
    /// Configuration file (overrides PASIM_CONFIG and platform locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory or http(s) base URL with the announcement sounds
    #[arg(long, env = "PASIM_SOUND_ROOT")]
    sound_root: Option<String>,

    /// Time the day starts at (HH:MM:SS)
    #[arg(long)]
    start: Option<String>,

    /// Clock speed multiplier
    #[arg(long)]
    speed: Option<u32>,

    /// Schedule catalog TOML (built-in exam-day schedule otherwise)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Listening broadcast track for the first period that has one
    #[arg(long)]
    listening: Option<String>,

    /// Run without an audio device
    #[arg(long)]
    no_audio: bool,

    /// Start the day immediately instead of waiting for `toggle`
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load config")?;
    config
        .apply_overrides(ConfigOverrides {
            sound_root: args.sound_root.clone(),
            start_time: args.start.clone(),
            speed: args.speed,
            catalog: args.catalog.clone(),
        })
        .context("Invalid command-line option")?;

    // Initialize tracing
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pasim_ap={level},pasim_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting pasim-ap v{}", env!("CARGO_PKG_VERSION"));
    info!("Sound root: {}", config.sound_root);

    let catalog = match &config.catalog {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => Catalog::builtin().context("Built-in catalog is invalid")?,
    };
    info!("Catalog: {} periods", catalog.len());

    // Audio device; falls back to a silent bus so the clock still runs
    let mut output = if args.no_audio {
        None
    } else {
        match AudioOutput::open(config.audio.device.as_deref(), config.audio.buffer_size) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("Audio output unavailable, continuing without sound: {}", e);
                None
            }
        }
    };
    let sample_rate = output
        .as_ref()
        .map(|o| o.sample_rate())
        .unwrap_or(config.audio.sample_rate);
    let bus = OutputBus::new(sample_rate);
    if let Some(out) = output.as_mut() {
        out.start(bus.clone()).context("Failed to start audio stream")?;
    }

    let events = EventBus::new(256);
    let engine = PlaybackEngine::new(
        bus,
        Arc::new(RoutingFetcher::new(None).context("Failed to build HTTP client")?),
        Arc::new(SymphoniaDecoder::new(sample_rate)),
        events.clone(),
        config.effects,
    );
    let sim = Arc::new(Simulator::new(
        DayPlan::from(&config),
        config.speed,
        catalog,
        SoundLibrary::new(config.sound_root.clone(), config.sound_extension.clone()),
        engine,
        events.clone(),
    ));
    info!("Playback engine initialized at {}Hz", sample_rate);

    if let Some(path) = args.listening.clone() {
        match sim.listening_subjects().first().map(|s| s.to_string()) {
            Some(subject) => sim
                .set_listening_track(&subject, Some(path))
                .context("Failed to attach listening track")?,
            None => warn!("Catalog has no listening broadcast; --listening ignored"),
        }
    }

    let printer = tokio::spawn(print_events(events.clone()));

    let preload = {
        let sim = Arc::clone(&sim);
        tokio::spawn(async move {
            sim.preload_all().await;
        })
    };

    if args.autostart {
        sim.toggle();
    }
    println!("{}", console::HELP);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_line(&sim, &line) {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    preload.abort();
    sim.shutdown();
    printer.abort();
    if let Some(mut out) = output.take() {
        if let Err(e) = out.stop() {
            warn!("Failed to stop audio stream: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Execute one input line. Returns false to quit.
fn handle_line(sim: &Simulator, line: &str) -> bool {
    let command = match Command::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    let engine = sim.engine();
    let result = match command {
        Command::Toggle => {
            println!("{:?}", sim.toggle());
            Ok(())
        }
        Command::Pause => {
            sim.pause();
            Ok(())
        }
        Command::Resume => {
            sim.resume();
            Ok(())
        }
        Command::Speed(n) => {
            sim.set_speed(n);
            Ok(())
        }
        Command::Jump(hh_mm) => sim.jump_to(&hh_mm),
        Command::Stage(subject) => sim.jump_to_stage(&subject),
        Command::Volume(v) => {
            engine.set_volume(v);
            Ok(())
        }
        Command::Position(position) => {
            engine.set_position(position);
            Ok(())
        }
        Command::Effects(update) => {
            engine.set_effect_params(&update);
            Ok(())
        }
        Command::Spatial => {
            let on = engine.toggle_spatial();
            println!("spatial {}", if on { "on" } else { "off" });
            Ok(())
        }
        Command::ResetEffects => {
            engine.reset_effects();
            Ok(())
        }
        Command::Listen(resource) => match sim.listening_subjects().first() {
            Some(subject) => {
                let subject = subject.to_string();
                sim.set_listening_track(&subject, resource)
            }
            None => {
                println!("no period has a listening broadcast");
                Ok(())
            }
        },
        Command::Status => {
            println!("{}", console::format_status(&sim.status()));
            Ok(())
        }
        Command::StatusJson => match serde_json::to_string_pretty(&sim.status()) {
            Ok(json) => {
                println!("{}", json);
                Ok(())
            }
            Err(e) => {
                println!("failed to encode status: {}", e);
                Ok(())
            }
        },
        Command::Help => {
            println!("{}", console::HELP);
            Ok(())
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        println!("{}", e);
    }
    true
}

/// Print every simulation event as a terminal notification
async fn print_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => println!("{}", console::notification(&event)),
            Err(RecvError::Lagged(skipped)) => warn!("Dropped {} notifications", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
