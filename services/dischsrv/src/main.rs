//! Discharge Service (dischsrv)
//!
//! Runs one discharge profile against an SCPI electronic load, or against
//! the built-in simulator with `--test-mode`.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::{init_logging, LogConfig};
use dischsrv::core::profile::ProfileLibrary;
use dischsrv::core::session::SessionMode;
use dischsrv::core::transport::TcpTransport;
use dischsrv::{
    ControllerSettings, CsvReportSink, DischargeConfig, DischargeController, DischargeService,
    MemoryStore, OperatorCommand,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Profile library (JSON), overrides storage.profiles_file
    #[arg(long, value_name = "FILE")]
    profiles: Option<PathBuf>,

    /// Log level, overrides logging.level
    #[arg(long, env = "DISCHSRV_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a discharge profile
    Run {
        /// Profile name
        #[arg(short, long)]
        profile: String,

        /// Registration number of the unit under test
        #[arg(short, long)]
        registration: String,

        /// Use the simulated load instead of the instrument
        #[arg(long)]
        test_mode: bool,

        /// Free-text comment stored with the session
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Query identification and one reading from the instrument
    Verify,

    /// List the profile library
    Profiles,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = DischargeConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&LogConfig {
        service_name: "dischsrv".to_string(),
        level: config.logging.level.clone(),
        log_dir: config.logging.directory.clone(),
        ansi: config.logging.ansi,
    })
    .context("Failed to initialize logging")?;

    let profiles_path = args
        .profiles
        .clone()
        .unwrap_or_else(|| config.storage.profiles_file.clone());
    let library = match ProfileLibrary::load(&profiles_path) {
        Ok(library) => library,
        Err(e) => {
            warn!(
                "Profile library {} unusable ({e}), using built-in profiles",
                profiles_path.display()
            );
            ProfileLibrary::defaults()
        },
    };

    let result = match args.command {
        Commands::Profiles => {
            list_profiles(&library);
            Ok(())
        },
        Commands::Verify => verify(&config).await,
        Commands::Run {
            profile,
            registration,
            test_mode,
            comment,
        } => run(&config, &library, &profile, &registration, test_mode, &comment).await,
    };

    if let Err(e) = &result {
        error!("{e:#}");
    }
    common::logging::shutdown_logging();
    result
}

fn build_controller(config: &DischargeConfig) -> DischargeController {
    DischargeController::new(
        ControllerSettings::from(config),
        Box::new(TcpTransport::new(config.instrument.read_buffer)),
        Arc::new(MemoryStore::new()),
        Arc::new(CsvReportSink::new(config.storage.report_directory.clone())),
    )
}

fn list_profiles(library: &ProfileLibrary) {
    for profile in library.iter() {
        println!("{}", profile.name);
        for (index, step) in profile.steps.iter().enumerate() {
            println!("  {}. {}", index + 1, step.describe());
        }
    }
}

async fn verify(config: &DischargeConfig) -> anyhow::Result<()> {
    let mut controller = build_controller(config);
    let results = controller
        .verify_instrument()
        .await
        .with_context(|| {
            format!(
                "Instrument at {}:{} did not answer",
                config.instrument.host, config.instrument.port
            )
        })?;
    for (query, response) in results {
        println!("{query:<20} {response}");
    }
    controller.disconnect().await;
    Ok(())
}

async fn run(
    config: &DischargeConfig,
    library: &ProfileLibrary,
    profile_name: &str,
    registration: &str,
    test_mode: bool,
    comment: &str,
) -> anyhow::Result<()> {
    let profile = library.get(profile_name)?.clone();
    let mode = if test_mode {
        SessionMode::Test
    } else {
        SessionMode::Real
    };

    let mut controller = build_controller(config);
    controller.set_test_mode(test_mode).await?;
    controller.connect().await.with_context(|| {
        format!(
            "Cannot reach instrument at {}:{}",
            config.instrument.host, config.instrument.port
        )
    })?;
    let session_id = controller
        .start_discharge(&profile, registration, mode, comment)
        .await?;
    info!("Session {session_id} running; keys: p pause/resume, s stop, r resume after reconnect, q quit");

    let (tx, rx) = mpsc::channel(16);
    spawn_operator_input(tx);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            ctrl_c.cancel();
        }
    });

    let mut service = DischargeService::new(controller, config.tick_interval());
    service.run(rx, shutdown).await?;

    let mut controller = service.into_controller();
    info!(
        "Final state: {}, {:.4} kWh",
        controller.status_line(),
        controller.total_energy_kwh()
    );
    if let Some(path) = controller.last_report() {
        println!("Certificate: {}", path.display());
    }
    controller.disconnect().await;

    if controller.state() == dischsrv::ControllerState::Aborted {
        bail!("Discharge aborted");
    }
    Ok(())
}

/// Map stdin lines to operator commands on a plain thread
///
/// A blocking read here never holds up runtime shutdown.
fn spawn_operator_input(tx: mpsc::Sender<OperatorCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let command = match line.trim().to_ascii_lowercase().as_str() {
                "p" => OperatorCommand::TogglePause,
                "s" | "e" => OperatorCommand::Stop {
                    generate_report: true,
                },
                "r" => OperatorCommand::ConfirmResume,
                "n" => OperatorCommand::DeclineResume,
                "q" => OperatorCommand::Shutdown,
                "" => continue,
                other => {
                    warn!("Unknown key '{other}' (p, s, r, n, q)");
                    continue;
                },
            };
            let quit = command == OperatorCommand::Shutdown;
            if tx.blocking_send(command).is_err() || quit {
                break;
            }
        }
    });
}
