//! Runs the video loop-count check against an app on the iOS Simulator.
//!
//! # Usage
//!
//! ```bash
//! # Full check: launch the app, tap the video, read the counter, wait, read again
//! loopcheck run
//!
//! # App already in the foreground; print the report as JSON
//! loopcheck run --no-launch --format json
//!
//! # Point at a different agent and shorten the wait
//! loopcheck --host 127.0.0.1 --port 9000 --wait-secs 3 run
//!
//! # Read the counter once (the video must already be playing)
//! loopcheck read
//!
//! # Offline: what number would this label parse to?
//! loopcheck extract "Loop count 12"
//!
//! # List simulators
//! loopcheck devices
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use loopcheck_core::agent_driver::AgentDriver;
use loopcheck_core::app::{AppManager, SimctlLauncher};
use loopcheck_core::config::ScenarioConfig;
use loopcheck_core::loop_count::extract_count;
use loopcheck_core::simctl::Simctl;
use loopcheck_core::verifier::{LoopCountVerifier, ScenarioError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Loop-count UI check for a looping video player.
#[derive(Parser)]
#[command(name = "loopcheck")]
#[command(about = "Check that a looping video's on-screen loop counter keeps going up")]
#[command(version)]
struct Cli {
    /// Agent host
    #[arg(long, global = true, env = "LOOPCHECK_HOST")]
    host: Option<String>,

    /// Agent port
    #[arg(long, global = true, env = "LOOPCHECK_PORT")]
    port: Option<u16>,

    /// Bundle identifier of the app under test
    #[arg(long, global = true)]
    bundle_id: Option<String>,

    /// Accessibility identifier of the loop counter label
    #[arg(long, global = true)]
    counter_id: Option<String>,

    /// Accessibility label of the button that opens the video
    #[arg(long, global = true)]
    button: Option<String>,

    /// Seconds to let the video play between the two readings
    #[arg(long, global = true)]
    wait_secs: Option<u64>,

    /// How long to wait for the counter label to appear, in milliseconds
    #[arg(long, global = true)]
    element_timeout_ms: Option<u64>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full check
    Run {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
        /// Skip launching the app through simctl
        #[arg(long)]
        no_launch: bool,
    },

    /// Read the loop counter once and print it
    Read,

    /// Print the number a counter label would parse to
    Extract {
        /// Label text, e.g. "Loop count 7"
        text: String,
    },

    /// List available simulators
    Devices,
}

#[derive(Debug)]
enum CliError {
    Scenario(ScenarioError),
    Connection(String),
    Io(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Scenario(e) => ExitCode::from(e.exit_code()),
            CliError::Connection(_) => ExitCode::from(3),
            CliError::Io(_) => ExitCode::from(4),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Scenario(e) => write!(f, "{}", e),
            CliError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CliError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl From<ScenarioError> for CliError {
    fn from(e: ScenarioError) -> Self {
        CliError::Scenario(e)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_logging(log_file: Option<&Path>) -> Result<(), CliError> {
    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| CliError::Io(format!("not a file path: {}", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| CliError::Io(format!("{}: {}", dir.display(), e)))?;

    let file_appender = tracing_appender::rolling::never(&dir, file_name);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(file_appender)
        .with_ansi(false)
        .init();
    Ok(())
}

/// Config file values with command-line overrides applied on top.
fn resolve_config(cli: &Cli) -> ScenarioConfig {
    let mut config = ScenarioConfig::load();
    if let Some(host) = &cli.host {
        config.agent_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.agent_port = port;
    }
    if let Some(bundle_id) = &cli.bundle_id {
        config.bundle_id = bundle_id.clone();
    }
    if let Some(counter_id) = &cli.counter_id {
        config.loop_counter_identifier = counter_id.clone();
    }
    if let Some(button) = &cli.button {
        config.play_button_label = button.clone();
    }
    if let Some(secs) = cli.wait_secs {
        config.playback_wait_secs = secs;
    }
    if let Some(ms) = cli.element_timeout_ms {
        config.element_timeout_ms = ms;
    }
    config
}

async fn connect(config: &ScenarioConfig) -> Result<AgentDriver, CliError> {
    let driver = AgentDriver::connect(&config.agent_host, config.agent_port)
        .await
        .map_err(|e| CliError::Connection(format!("{}:{}: {}", config.agent_host, config.agent_port, e)))?;
    info!(host = %config.agent_host, port = config.agent_port, "connected to agent");
    Ok(driver)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        eprintln!("Error: {}", e);
        return e.exit_code();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Extract { text } => {
            println!("{}", extract_count(text));
            Ok(())
        }

        Command::Devices => {
            let devices = Simctl::list_devices().map_err(|e| CliError::Io(e.to_string()))?;
            for device in devices {
                let marker = if device.is_booted() { "*" } else { " " };
                println!("{} {} ({}) {}", marker, device.name, device.udid, device.state);
            }
            Ok(())
        }

        Command::Read => {
            let config = resolve_config(&cli);
            let driver = connect(&config).await?;
            let verifier = LoopCountVerifier::new(Arc::new(driver), config);
            let count = verifier.read_loop_count().await?;
            println!("{}", count);
            Ok(())
        }

        Command::Run { format, no_launch } => {
            let config = resolve_config(&cli);
            debug!(?config, "resolved config");

            // The agent only answers once the app is up.
            let app = (!*no_launch).then(|| {
                let launcher = SimctlLauncher::new(config.device_udid.clone());
                Arc::new(AppManager::new(config.bundle_id.clone(), launcher))
            });
            if let Some(app) = &app {
                app.launch_if_needed().await.map_err(ScenarioError::from)?;
            }
            let driver = connect(&config).await?;

            let mut verifier = LoopCountVerifier::new(Arc::new(driver), config);
            if let Some(app) = app {
                verifier = verifier.with_app_manager(app);
            }

            let (report, result) = match verifier.run_scenario().await {
                Ok(report) => (report, Ok(())),
                Err(failure) => (failure.report, Err(CliError::Scenario(failure.error))),
            };

            match format {
                OutputFormat::Text => print!("{}", report.to_text()),
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&report).map_err(|e| CliError::Io(e.to_string()))?;
                    println!("{}", json);
                }
            }
            result
        }
    }
}
