// Keyboard teleop: W/S drive, A/D turn, R/F speed, Q quit
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use diffbot_zenoh_runtime::config::TOPIC_CMD_VEL;
use diffbot_zenoh_runtime::messages::VelocityCommand;

const LINEAR_SPEEDS: [f32; 3] = [0.1, 0.3, 0.6]; // m/s
const ANGULAR_SPEEDS: [f32; 3] = [0.5, 1.5, 3.0]; // rad/s
const SPEED_LABELS: [&str; 3] = ["LOW", "MED", "HIGH"];
// Zero velocities after this long with no input
const INPUT_TIMEOUT: Duration = Duration::from_millis(100);
const PUBLISH_PERIOD: Duration = Duration::from_millis(20); // ~50Hz

/// Publish velocity commands from the keyboard
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Zenoh router endpoint; peer mode if omitted
    #[arg(long)]
    connect: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut config = zenoh::Config::default();
    if let Some(endpoint) = &args.connect {
        config.insert_json5("mode", r#""client""#)?;
        config.insert_json5("connect/endpoints", &format!(r#"["{}"]"#, endpoint))?;
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(config).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_VEL).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, Q=quit");
    info!("Speed: {}", SPEED_LABELS[0]);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut cmd = VelocityCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        if event::poll(PUBLISH_PERIOD)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        cmd.linear = LINEAR_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd.linear = -LINEAR_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        cmd.angular = ANGULAR_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd.angular = -ANGULAR_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        info!("Speed: {}", SPEED_LABELS[speed_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        info!("Speed: {}", SPEED_LABELS[speed_idx]);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > INPUT_TIMEOUT {
            cmd = VelocityCommand::default();
        }

        // Always publish, the runtime watchdog expects a steady stream
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}
