//! devicerun agent binary
//!
//! Runs episodes on one device and prints one `[episode ...]` line per episode
//! on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use devicerun_adb::AdbBackend;
use devicerun_agent::{run_agent, AgentConfig};
use devicerun_trace::TraceConfig;

/// Run evaluation episodes against an Android device
#[derive(Parser)]
#[command(name = "devicerun-agent")]
#[command(about = "Execute a planned task on one device with retries", long_about = None)]
struct Cli {
    /// Number of episodes to run
    #[arg(long, default_value_t = 5)]
    episodes: usize,

    /// Natural language prompt, planned into a single task
    #[arg(long, default_value = "search for qualgent test")]
    prompt: String,

    /// Retries per episode after the first attempt
    #[arg(long, default_value_t = 1)]
    retries: u32,

    /// Device serial (falls back to ANDROID_SERIAL)
    #[arg(long, env = "ANDROID_SERIAL")]
    serial: Option<String>,

    /// Path to the adb executable
    #[arg(long, default_value = "adb")]
    adb: String,

    /// Directory for run records and screenshots
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Directory for trace logs
    #[arg(long, default_value = "observability")]
    trace_dir: PathBuf,

    /// Run id (defaults to run_<unix seconds>)
    #[arg(long)]
    run_id: Option<String>,

    /// Do not mirror span records to stdout
    #[arg(long)]
    no_span_mirror: bool,
}

impl Cli {
    fn into_config(self) -> AgentConfig {
        let mut config = AgentConfig {
            adb_path: self.adb,
            serial: self.serial,
            episodes: self.episodes,
            prompt: self.prompt,
            max_retries: self.retries,
            run_id: self.run_id,
            trace: TraceConfig::new(self.trace_dir).with_mirror_stdout(!self.no_span_mirror),
            ..AgentConfig::default()
        };
        config.executor.results_dir = self.results_dir;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; stdout is reserved for episode lines
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Cli::parse().into_config();

    let mut backend = AdbBackend::new(config.adb_path.clone());
    if let Some(serial) = &config.serial {
        backend = backend.with_serial(serial.as_str());
    }

    info!(
        serial = ?backend.serial(),
        episodes = config.episodes,
        prompt = %config.prompt,
        "Starting devicerun agent"
    );

    let run = run_agent(&config, Arc::new(backend), |record| {
        println!("{}", record.result.summary_line(record.episode));
    })
    .await?;

    if let Some(artifacts) = &run.artifacts {
        info!(
            run_id = %run.run_id,
            json = %artifacts.json.display(),
            html = %artifacts.html.display(),
            "Run complete"
        );
    }
    Ok(())
}
