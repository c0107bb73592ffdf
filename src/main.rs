use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tracing::{info, Level};
use tracing_subscriber;

use keygate::config::{KeygateConfig, SimulationConfig, Strategy};
use keygate::ratelimit::AdmissionControl;

const RED: &str = "\x1b[91m";
const GREEN: &str = "\x1b[92m";
const BLUE: &str = "\x1b[94m";
const RESET: &str = "\x1b[0m";

/// Per-key admission control demo driver.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Override the configured admission strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum StrategyArg {
    SlidingWindow,
    FixedInterval,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::SlidingWindow => Strategy::SlidingWindow,
            StrategyArg::FixedInterval => Strategy::FixedInterval,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Keygate admission control demo");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => KeygateConfig::from_file(path)?,
        None => KeygateConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }
    info!(strategy = ?config.strategy, "Configuration loaded");

    let limiter = config.build_limiter();
    run_simulation(limiter, &config.simulation).await;

    Ok(())
}

/// Replay two phases of synthetic traffic through the limiter, separated by
/// a pause long enough for some history to age out.
async fn run_simulation(limiter: Arc<dyn AdmissionControl>, sim: &SimulationConfig) {
    println!("{BLUE}\n=== Simulating a message stream ==={RESET}");
    run_phase(&limiter, sim, 1).await;

    println!("{GREEN}\nWaiting {:.0} seconds...{RESET}", sim.pause_secs);
    tokio::time::sleep(Duration::from_secs_f64(sim.pause_secs)).await;

    println!("{BLUE}\n=== New message series after the wait ==={RESET}");
    run_phase(&limiter, sim, sim.messages_per_phase + 1).await;
}

async fn run_phase(limiter: &Arc<dyn AdmissionControl>, sim: &SimulationConfig, first_id: u32) {
    let users = sim.simulated_users.max(1);
    for message_id in first_id..first_id + sim.messages_per_phase {
        let user_id = (message_id % users + 1).to_string();

        let admitted = limiter.record_message(&user_id);
        let wait = limiter.time_until_next_allowed(&user_id);

        let status = if admitted {
            format!("{GREEN}\u{2713}{RESET}")
        } else {
            format!("{RED}\u{00d7}{RESET} (wait {:.1}s)", wait.as_secs_f64())
        };
        println!("Message {message_id:2} | User {user_id} | {status}");

        let jitter = rand::thread_rng().gen_range(0.1..1.0);
        tokio::time::sleep(Duration::from_secs_f64(jitter)).await;
    }
}
