use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use facegate_core::OnnxAnalyzer;
use facegate_hw::{AccessLines, Camera, SysfsLine};
use std::path::PathBuf;

mod config;
mod controller;
mod logging;
mod shutdown;
mod store;

use config::Config;
use controller::{AccessController, ControllerError, ThreadSleeper, Timing};
use shutdown::ShutdownFlag;
use store::FilesystemFaceStore;

const EXIT_QUIT: i32 = 0;
const EXIT_FAILURE: i32 = -2;

#[derive(Parser, Debug)]
#[command(
    name = "facegate",
    about = "Door access controller driven by face recognition",
    disable_version_flag = true
)]
struct Cli {
    /// Device index or path, 0 by default
    #[arg(short = 'c', long = "camera", value_name = "CAMERA", default_value = "0")]
    camera: String,

    /// Path to the face database, <cwd>/db by default
    #[arg(short = 'd', long = "db_dir", value_name = "DB_DIR")]
    db_dir: Option<PathBuf>,

    /// Show version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

type DoorController = AccessController<Camera, OnnxAnalyzer, SysfsLine, FilesystemFaceStore>;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            let _ = e.print();
            std::process::exit(EXIT_QUIT);
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_FAILURE);
        }
    };

    if cli.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = Config::from_env(cli.camera, cli.db_dir);
    let log_folder = logging::init(&config.log_dir);
    logging::banner(&log_folder, &config.db_dir, &config.camera);

    std::process::exit(run(&config));
}

fn run(config: &Config) -> i32 {
    let mut controller = {
        let span = tracing::info_span!("startup");
        let _entered = span.enter();
        match shutdown::install_handlers()
            .context("failed to install signal handlers")
            .and_then(|flag| prepare(config, flag))
        {
            Ok(controller) => controller,
            Err(e) => {
                tracing::error!("startup failed: {e:#}");
                return EXIT_FAILURE;
            }
        }
    };

    match controller.run() {
        Ok(()) => {
            tracing::info!("tumbler switch was pressed, exiting");
            EXIT_QUIT
        }
        Err(e) => {
            if matches!(e, ControllerError::Interrupted) {
                tracing::error!("program was interrupted");
            } else {
                tracing::error!(error = %e, "something went wrong");
            }
            e.exit_code()
        }
    }
}

/// Open every collaborator, load the enrolled faces and configure the lines.
fn prepare(config: &Config, shutdown: ShutdownFlag) -> Result<DoorController> {
    let store = FilesystemFaceStore::open(&config.db_dir)?;
    let enrolled = store
        .load_all()
        .context("failed to read enrolled face images")?;

    let analyzer = OnnxAnalyzer::load(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
        config.similarity_threshold,
    )
    .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;

    let camera = Camera::open(&config.camera).context("camera unavailable")?;

    let lines = AccessLines::sysfs(&config.gpio_root);
    let timing = Timing {
        lock_hold: config.lock_hold,
        debounce_poll: config.debounce_poll,
    };

    let mut controller =
        AccessController::new(camera, analyzer, lines, store, ThreadSleeper, timing, shutdown);
    controller.start(enrolled)?;
    Ok(controller)
}
