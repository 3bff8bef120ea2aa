//! driftwave - run and render binaural-beat and noise sessions
//!
//! Subcommands:
//! - `driftwave play <mode>` - Run a session in real time, printing state as JSON
//! - `driftwave render <mode>` - Render a mode to a WAV file
//! - `driftwave modes` - List the accepted mode strings
//! - `driftwave config` - Print the effective configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use driftconf::DriftConfig;
use driftwave::{
    render_to_wav, CarrierPreset, ControllerOptions, LoggingMediaSession, ManagerSettings,
    MonotonicClock, NoiseVariant, OfflineContextFactory, SampleBuffer, SessionController,
    SessionDriver, SessionMode, SessionState, Visibility,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "driftwave")]
#[command(about = "Binaural beat and ambient noise sessions")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./driftwave.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session and print every state change as JSON
    Play {
        /// Mode, e.g. tone:10, tone:6@productivity, pure:432, noise:pink, chant
        mode: String,

        /// Session length in seconds (0 = open-ended; default from config)
        #[arg(short, long)]
        duration: Option<u64>,

        /// WAV file for chant mode
        #[arg(long)]
        track: Option<PathBuf>,

        /// Simulate the app going to the background after this many seconds
        #[arg(long)]
        hide_after: Option<u64>,

        /// Simulate the app coming back after this many seconds
        #[arg(long)]
        show_after: Option<u64>,
    },

    /// Render a mode to a 16-bit stereo WAV file
    Render {
        mode: String,

        /// Output path
        #[arg(short, long, default_value = "driftwave.wav")]
        output: PathBuf,

        /// Length in seconds
        #[arg(short, long, default_value = "10")]
        seconds: f64,

        /// WAV file for chant mode
        #[arg(long)]
        track: Option<PathBuf>,
    },

    /// List mode strings
    Modes,

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DriftConfig::load_from(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play {
            mode,
            duration,
            track,
            hide_after,
            show_after,
        } => play(&config, &mode, duration, track, hide_after, show_after).await,
        Commands::Render {
            mode,
            output,
            seconds,
            track,
        } => {
            let mode = parse_mode(&config, &mode, track)?;
            let stats = render_to_wav(
                &mode,
                seconds,
                config.audio.sample_rate,
                ManagerSettings::from_config(&config),
                &output,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Modes => {
            println!("tone:<1-40>[@ambient|@productivity|@<hz>]");
            println!("pure:<hz>");
            for variant in NoiseVariant::ALL {
                println!("noise:{}", variant.as_str());
            }
            println!("chant --track <file.wav>");
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml());
            Ok(())
        }
    }
}

fn parse_mode(config: &DriftConfig, mode: &str, track: Option<PathBuf>) -> Result<SessionMode> {
    let track = match track {
        Some(path) => Some(Arc::new(
            SampleBuffer::from_wav_file(&path)
                .with_context(|| format!("loading track {}", path.display()))?,
        )),
        None => None,
    };
    Ok(SessionMode::parse(
        mode,
        CarrierPreset::from_config(&config.audio),
        track,
    )?)
}

async fn play(
    config: &DriftConfig,
    mode: &str,
    duration: Option<u64>,
    track: Option<PathBuf>,
    hide_after: Option<u64>,
    show_after: Option<u64>,
) -> Result<()> {
    let mode = parse_mode(config, mode, track)?;

    let controller = SessionController::new(
        Arc::new(OfflineContextFactory::new(config.audio.sample_rate)),
        Arc::new(LoggingMediaSession),
        Arc::new(MonotonicClock::new()),
        ControllerOptions::from_config(config),
    )
    .with_completion(|done| {
        info!(label = %done.label, elapsed_secs = done.elapsed_seconds, "session complete");
    });

    let (handle, driver) = SessionDriver::spawn(controller);
    let mut status = handle.subscribe();

    if let Some(secs) = duration {
        handle.set_duration((secs > 0).then(|| Duration::from_secs(secs)))?;
    }
    handle.select_mode(mode)?;
    handle.play()?;

    let visibility = handle.clone();
    tokio::spawn(async move {
        if let Some(secs) = hide_after {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = visibility.set_visibility(Visibility::Hidden);
        }
        if let Some(secs) = show_after {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = visibility.set_visibility(Visibility::Visible);
        }
    });

    let mut started = false;
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&current)?);
                if let Some(err) = &current.last_error {
                    if !started {
                        anyhow::bail!("session failed to start: {}", err);
                    }
                }
                match current.snapshot.state {
                    SessionState::Playing | SessionState::Backgrounded => started = true,
                    SessionState::Idle if started => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping session");
                handle.stop()?;
            }
        }
    }

    drop(status);
    drop(handle);
    driver.await.context("session driver panicked")?;
    Ok(())
}
