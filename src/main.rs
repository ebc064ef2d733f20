use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use diffbot_zenoh_runtime::config::{ENCODER_CPR, MOTOR_PORT};
use diffbot_zenoh_runtime::link::ZenohTransport;
use diffbot_zenoh_runtime::motor::{MotorDriver, SimulatedBase, TickCounter};
use diffbot_zenoh_runtime::runtime;

/// Differential-drive wheel control runtime
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Drive a simulated wheel plant instead of the motor bridge
    #[arg(long)]
    sim: bool,

    /// Serial port of the motor bridge
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// Zenoh router endpoint (e.g. tcp/192.168.1.10:7447); peer mode if omitted
    #[arg(long)]
    connect: Option<String>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn start(args: Args) -> Result<(), BoxError> {
    let transport = match &args.connect {
        Some(endpoint) => ZenohTransport::client(endpoint)?,
        None => ZenohTransport::peer(),
    };

    let left = Arc::new(TickCounter::new());
    let right = Arc::new(TickCounter::new());
    let counters = [Arc::clone(&left), Arc::clone(&right)];

    if args.sim {
        info!("Running against simulated wheels");
        let base = SimulatedBase::start(left, right, ENCODER_CPR)?;
        runtime::run(transport, base, counters).await;
    } else {
        let driver = MotorDriver::new(&args.port)?;
        // Detached: a reader that dies marks the counters faulted, which stops the loop
        let _edges = driver.start_encoders(left, right)?;
        runtime::run(transport, driver, counters).await;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    if let Err(e) = start(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
