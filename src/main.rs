use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use restream::config::{DEFAULT_EXTENSION, DEFAULT_TRANSCODER};
use restream::{Config, StreamController, StreamEvent, TokioLauncher};

const FFMPEG_DOWNLOAD_URL: &str = "https://ffmpeg.org/download.html";

#[derive(Parser)]
#[command(name = "restream", version, about = "Re-stream the newest video in a folder to a live ingest")]
struct Cli {
    /// Directory holding config.json
    #[arg(long, env = "RESTREAM_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Transcoder binary
    #[arg(long, default_value = DEFAULT_TRANSCODER, global = true)]
    ffmpeg: String,

    /// Seconds to wait for the transcoder to exit before killing it
    #[arg(long, default_value_t = 5, global = true)]
    stop_timeout: u64,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the transcoder is installed
    Check,
    /// Show or change the destination
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print the file that would be streamed
    Newest {
        folder: PathBuf,
        #[arg(long, default_value = DEFAULT_EXTENSION)]
        extension: String,
    },
    /// Stream the newest file until Ctrl+C or until it ends
    Stream {
        folder: PathBuf,
        #[arg(long, default_value = DEFAULT_EXTENSION)]
        extension: String,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        url: String,
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_config_dir()
            .context("Could not determine a per-user configuration directory")?,
    };
    let mut config = Config::new(config_dir);
    config.transcoder = cli.ffmpeg;
    config.stop_timeout = Duration::from_secs(cli.stop_timeout);

    match cli.command {
        Commands::Check => check(&config),
        Commands::Settings { action } => settings(&config, action).await,
        Commands::Newest { folder, extension } => {
            config.extension = extension;
            newest(&config, folder).await
        }
        Commands::Stream { folder, extension } => {
            config.extension = extension;
            stream(&config, folder).await
        }
    }
}

fn check(config: &Config) -> Result<()> {
    let controller = StreamController::new(config, Arc::new(TokioLauncher));
    if !controller.supervisor().preflight_check() {
        bail!(
            "{} is required but was not found. Install it from {}",
            config.transcoder,
            FFMPEG_DOWNLOAD_URL
        );
    }
    println!("{} found", config.transcoder);
    Ok(())
}

async fn settings(config: &Config, action: SettingsAction) -> Result<()> {
    let controller = StreamController::new(config, Arc::new(TokioLauncher));

    if let SettingsAction::Set { url, key } = action {
        controller
            .save_settings(&url, &key)
            .await
            .context("Failed to save settings")?;
    }

    let settings = controller
        .load_settings()
        .await
        .context("Failed to load settings")?;
    println!("Destination: {}", settings.destination_base_url);
    println!("Stream key:  {}", settings.masked_key());
    Ok(())
}

async fn newest(config: &Config, folder: PathBuf) -> Result<()> {
    let mut controller = StreamController::new(config, Arc::new(TokioLauncher));
    controller.select_folder(folder);

    match controller.newest_file().await? {
        Some(path) => println!("{}", path.display()),
        None => bail!("No {} files found in the selected folder", config.extension),
    }
    Ok(())
}

async fn stream(config: &Config, folder: PathBuf) -> Result<()> {
    // Missing transcoder is fatal before anything else happens.
    check(config)?;

    let mut controller = StreamController::new(config, Arc::new(TokioLauncher));
    controller.select_folder(folder);
    let mut events = controller.subscribe();

    let session = controller
        .start_newest()
        .await
        .context("Failed to start streaming")?;
    info!("{} (Ctrl+C to stop)", controller.status().await);

    match wait_for_end(&mut events, tokio::signal::ctrl_c()).await {
        Ending::Interrupted => {
            controller.stop().await;
            info!("Stream stopped");
            Ok(())
        }
        Ending::Finished { file_name } => {
            info!("Finished streaming {}", file_name);
            Ok(())
        }
        Ending::Failed { code } => {
            let output = controller.supervisor().recent_output().await;
            bail!(
                "Transcoder exited with code {:?} while streaming {}\n{}",
                code,
                session.file_name,
                output.join("\n")
            );
        }
        Ending::Closed => Ok(()),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Ending {
    Interrupted,
    Finished { file_name: String },
    Failed { code: Option<i32> },
    Closed,
}

/// Waits for the user to interrupt or for the transcoder to exit. If the
/// interrupt handler cannot be installed, only the transcoder can end the wait.
async fn wait_for_end<F>(events: &mut broadcast::Receiver<StreamEvent>, interrupt: F) -> Ending
where
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(interrupt);
    let mut listening = true;

    loop {
        tokio::select! {
            signal = &mut interrupt, if listening => match signal {
                Ok(()) => return Ending::Interrupted,
                Err(e) => {
                    warn!("Failed to listen for Ctrl+C, streaming until the file ends: {}", e);
                    listening = false;
                }
            },
            event = events.recv() => match event {
                Ok(StreamEvent::Exited { file_name, code: Some(0) }) => {
                    return Ending::Finished { file_name };
                }
                Ok(StreamEvent::Exited { code, .. }) => return Ending::Failed { code },
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ending::Closed,
            },
        }
    }
}
