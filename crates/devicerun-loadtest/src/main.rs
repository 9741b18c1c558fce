//! devicerun load test binary

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use devicerun_agent::AgentConfig;
use devicerun_core::RunId;
use devicerun_loadtest::registry::DEFAULT_TUNNEL_MANIFEST;
use devicerun_loadtest::{
    DeviceRegistry, InProcessLauncher, LoadOrchestrator, LoadPlan, OrchestratorConfig,
    ProcessLauncher, StaticRegistry, TunnelManifest, WorkerLauncher,
};
use devicerun_trace::{TraceConfig, Tracer};

/// Load test agents across a pool of devices
#[derive(Parser)]
#[command(name = "devicerun-loadtest")]
#[command(about = "Run one agent worker per device and report throughput", long_about = None)]
struct Cli {
    /// Episodes per worker
    #[arg(long, default_value_t = 5)]
    episodes: u32,

    /// Number of concurrent workers (limited to available devices)
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Prompt for all episodes
    #[arg(long, default_value = "search for load test")]
    prompt: String,

    /// Overall timeout in seconds
    #[arg(long, default_value_t = 600)]
    timeout: u64,

    /// Per-worker timeout in seconds
    #[arg(long, default_value_t = 300)]
    worker_timeout: u64,

    /// Comma separated device list; overrides the tunnel manifest
    #[arg(long, value_delimiter = ',')]
    devices: Vec<String>,

    /// Tunnel manifest listing forwarded devices
    #[arg(long, default_value = DEFAULT_TUNNEL_MANIFEST)]
    tunnels: PathBuf,

    /// Agent executable (defaults to devicerun-agent next to this binary)
    #[arg(long)]
    agent: Option<PathBuf>,

    /// Run workers inside this process instead of spawning agents
    #[arg(long)]
    in_process: bool,

    /// Path to the adb executable, for in-process workers
    #[arg(long, default_value = "adb")]
    adb: String,

    /// Directory for reports
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Directory for trace logs
    #[arg(long, default_value = "observability")]
    trace_dir: PathBuf,
}

fn default_agent_path() -> PathBuf {
    std::env::current_exe()
        .map(|exe| exe.with_file_name("devicerun-agent"))
        .unwrap_or_else(|_| PathBuf::from("devicerun-agent"))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let trace_config = TraceConfig::new(&cli.trace_dir).with_mirror_stdout(false);

    let registry: Arc<dyn DeviceRegistry> = if cli.devices.is_empty() {
        Arc::new(TunnelManifest::new(&cli.tunnels))
    } else {
        Arc::new(StaticRegistry::new(cli.devices.iter().map(|d| d.trim().to_string())))
    };

    let launcher: Arc<dyn WorkerLauncher> = if cli.in_process {
        let mut template = AgentConfig {
            adb_path: cli.adb.clone(),
            write_records: false,
            trace: trace_config.clone(),
            ..AgentConfig::default()
        };
        template.executor.results_dir = cli.results_dir.clone();
        Arc::new(InProcessLauncher::adb(template))
    } else {
        let agent = cli.agent.clone().unwrap_or_else(default_agent_path);
        Arc::new(
            ProcessLauncher::new(agent)
                .with_arg("--adb")
                .with_arg(cli.adb.clone())
                .with_arg("--results-dir")
                .with_arg(cli.results_dir.to_string_lossy())
                .with_arg("--trace-dir")
                .with_arg(cli.trace_dir.to_string_lossy())
                .with_arg("--no-span-mirror"),
        )
    };

    let load_id = RunId::for_load_test(chrono::Utc::now().timestamp());
    let tracer = Arc::new(Tracer::open(&trace_config, load_id, None)?);

    let config = OrchestratorConfig {
        worker_timeout: Duration::from_secs(cli.worker_timeout),
        global_timeout: Duration::from_secs(cli.timeout),
        results_dir: cli.results_dir.clone(),
        write_report: true,
    };
    let plan = LoadPlan {
        requested_workers: cli.concurrency,
        episodes_per_worker: cli.episodes,
        prompt: cli.prompt,
    };

    println!(
        "Starting load test: {} workers x {} episodes",
        plan.requested_workers, plan.episodes_per_worker
    );

    let orchestrator = LoadOrchestrator::new(registry, launcher, config).with_tracer(tracer);
    let report = orchestrator.run_load_test(&plan).await?;

    let summary = &report.summary;
    println!("{}", "=".repeat(50));
    println!("LOAD TEST SUMMARY");
    println!("{}", "=".repeat(50));
    println!(
        "Workers: {}/{} successful",
        summary.successful_workers, summary.total_workers
    );
    println!("Duration: {:.1}s", summary.total_duration_sec);
    println!("Episodes/sec: {:.2}", summary.episodes_per_second);
    println!("Results saved to: {}", cli.results_dir.display());

    info!(passed = report.passed(), "Load test complete");
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
