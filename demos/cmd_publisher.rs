// Keyboard teleop for serve mode: W/S drive, A/D turn, R/F arm, +/- step size, Q quit
//
// Usage: cargo run --example cmd_publisher
// Each key press publishes one command; the robot runs them in order.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use nxt_timed_motion::config::{TOPIC_CMD_MOTION, TOPIC_MOTION_REPORT};
use nxt_timed_motion::messages::{MotionCommand, MotionReport};
use std::time::Duration;
use tracing::{info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::sample::Sample;

const DISTANCES: [u32; 3] = [50, 100, 250]; // mm
const ANGLES: [u32; 3] = [15, 45, 90]; // degrees

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOTION).await?;
    let reports = session.declare_subscriber(TOPIC_MOTION_REPORT).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=arm up/down, +/-=step, Q=quit");
    print_step(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher, &reports).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
    reports: &zenoh::pubsub::Subscriber<FifoChannelHandler<Sample>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut step_idx: usize = 0;

    loop {
        // Show any reports that came back since the last key
        while let Ok(Some(sample)) = reports.try_recv() {
            match serde_json::from_slice::<MotionReport>(&sample.payload().to_bytes()) {
                Ok(report) => info!("Robot: {} -> {:?}", report.command, report.outcome),
                Err(e) => warn!("Unreadable report: {}", e),
            }
        }

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let cmd = match code {
            KeyCode::Char('w') => MotionCommand::DriveForward {
                distance: DISTANCES[step_idx],
            },
            KeyCode::Char('s') => MotionCommand::DriveBackward {
                distance: DISTANCES[step_idx],
            },
            KeyCode::Char('a') => MotionCommand::TurnLeft {
                degrees: ANGLES[step_idx],
            },
            KeyCode::Char('d') => MotionCommand::TurnRight {
                degrees: ANGLES[step_idx],
            },
            KeyCode::Char('r') => MotionCommand::ArmUp,
            KeyCode::Char('f') => MotionCommand::ArmDown,

            KeyCode::Char('+') => {
                step_idx = (step_idx + 1).min(2);
                print_step(step_idx);
                continue;
            }
            KeyCode::Char('-') => {
                step_idx = step_idx.saturating_sub(1);
                print_step(step_idx);
                continue;
            }

            // Quit
            KeyCode::Char('q') | KeyCode::Esc => break,

            _ => continue,
        };

        info!("Sending {}", cmd);
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_step(idx: usize) {
    info!("Step: {} mm / {} deg", DISTANCES[idx], ANGLES[idx]);
}
