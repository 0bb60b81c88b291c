//! fragprobe
//!
//! Measures download speed through a list of candidate addresses, with an
//! optionally fragmented TLS ClientHello.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::FmtSubscriber;

use fragprobe_client::build_orchestrator;
use fragprobe_client::candidates::load_candidates;
use fragprobe_client::config::ClientConfig;
use fragprobe_client::report::render_table;

/// fragprobe - download speed probe over fragmented TLS
#[derive(Parser, Debug)]
#[command(name = "fragprobe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Candidate list, one `ip[,latency_ms]` per line
    #[arg(short = 'f', long)]
    candidates: PathBuf,

    /// URL to download
    #[arg(long)]
    url: Option<String>,

    /// Per-candidate timeout in seconds
    #[arg(short, long)]
    timeout: Option<i64>,

    /// Number of qualifying candidates to collect
    #[arg(short = 'n', long)]
    count: Option<i64>,

    /// Minimum download speed in MB/s
    #[arg(long)]
    min_speed: Option<f64>,

    /// TLS fingerprint to imitate
    #[arg(long)]
    fingerprint: Option<String>,

    /// Fragment the ClientHello with this policy
    #[arg(long, value_name = "POLICY")]
    fragment: Option<String>,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.url {
            config.probe.url = url.clone();
        }
        if let Some(timeout) = self.timeout {
            config.probe.timeout_secs = timeout;
        }
        if let Some(count) = self.count {
            config.probe.count = count;
        }
        if let Some(min_speed) = self.min_speed {
            config.probe.min_speed = min_speed;
        }
        if let Some(fingerprint) = &self.fingerprint {
            config.tls.fingerprint = fingerprint.clone();
        }
        if let Some(policy) = &self.fragment {
            config.fragment.enabled = true;
            config.fragment.policy = policy.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the level
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("fragprobe v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = ClientConfig::load(path).await?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        None => ClientConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let candidates = load_candidates(&args.candidates)
        .await
        .with_context(|| format!("Failed to load {}", args.candidates.display()))?;
    info!("Loaded {} candidates", candidates.len());

    let orchestrator = build_orchestrator(&config)?;
    let results = orchestrator.run(candidates).await;

    print!("{}", render_table(&results));

    Ok(())
}
