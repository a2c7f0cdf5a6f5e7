use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facelive::{
    config, replay, runner, storage, CancelToken, CapturedImage, Controller, ControllerSettings,
    LivenessError, TickOutcome,
};
use facelive_vision::{model, ModelState};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facelive")]
#[command(version, about = "Guided liveness capture: right, left and straight face shots")]
struct Cli {
    /// Config file (defaults to the system config path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the guided capture from the camera
    Capture {
        /// Directory to write the capture session into
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run the capture sequence against a recorded pose trace
    Replay {
        /// JSON pose trace
        trace: PathBuf,
        /// Directory to write the capture session into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())
        .map_err(LivenessError::config)
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Capture { output, timeout } => capture(&cfg, output, timeout),
        Commands::Replay { trace, output } => run_replay(&cfg, &trace, output),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn capture(cfg: &config::Config, output: Option<PathBuf>, timeout: Option<u64>) -> Result<()> {
    info!("Loading vision model: {}", cfg.model.display());
    let model = model::spawn_onnx(cfg.model.clone(), cfg.model_input_size);

    let (tx, rx) = crossbeam_channel::bounded::<Vec<CapturedImage>>(1);
    let mut controller = Controller::new(
        model,
        ControllerSettings::from_config(cfg),
        Box::new(move |images| {
            let _ = tx.send(images);
        }),
    );

    let cancel = CancelToken::new();
    if let Some(secs) = timeout {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            cancel.cancel();
        });
    }

    let display = (cfg.display.width, cfg.display.height);
    loop {
        info!("Opening camera: {}", cfg.camera);
        match runner::run_camera(&mut controller, &cfg.camera, display, &cancel) {
            Ok(runner::RunEnd::Completed) => break,
            Ok(runner::RunEnd::Cancelled) => anyhow::bail!("Capture cancelled before completion"),
            Err(err @ LivenessError::ResourceAcquisition { .. }) => {
                let cause = std::error::Error::source(&err)
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                warn!("{}: {}", err, cause);
                if !ask_retry()? {
                    return Err(err).context("Failed to open camera");
                }
            }
            Err(err) => return Err(err).context("Capture failed"),
        }
    }

    let images = rx
        .try_recv()
        .context("capture finished without delivering images")?;
    let dir = storage::save_session(
        &output.unwrap_or_else(|| cfg.output_dir()),
        &images,
        &controller.settings().thresholds,
    )
    .context("Failed to save capture session")?;

    info!("✓ Captured {} images into {}", images.len(), dir.display());
    Ok(())
}

fn ask_retry() -> Result<bool> {
    print!("Camera unavailable. Retry? [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn run_replay(cfg: &config::Config, trace: &Path, output: Option<PathBuf>) -> Result<()> {
    let entries = replay::load_trace(trace)?;
    info!("Replaying {} samples from {}", entries.len(), trace.display());

    let (tx, rx) = crossbeam_channel::bounded::<Vec<CapturedImage>>(1);
    let mut controller = Controller::new(
        ModelState::Ready(replay::TraceModel::new(&entries)),
        ControllerSettings::from_config(cfg),
        Box::new(move |images| {
            let _ = tx.send(images);
        }),
    );

    let display = (cfg.display.width, cfg.display.height);
    let outcomes = replay::replay(&mut controller, &entries, display)?;
    for (t, outcome) in &outcomes {
        if let TickOutcome::Captured(step) = outcome {
            info!("{:>6}ms  captured {}", t, step);
        }
    }

    let Ok(images) = rx.try_recv() else {
        anyhow::bail!(
            "Trace ended at step {} without completing the sequence",
            controller.step()
        );
    };
    let dir = storage::save_session(
        &output.unwrap_or_else(|| cfg.output_dir()),
        &images,
        &controller.settings().thresholds,
    )?;
    info!("✓ Replay complete, captures written to {}", dir.display());
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
