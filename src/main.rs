use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nxt_timed_motion::config::{Calibration, BRICK_PORT, MOTOR_ENABLED};
use nxt_timed_motion::interrupt::{self, Interrupt, InterruptHandle};
use nxt_timed_motion::messages::MotionCommand;
use nxt_timed_motion::motor::{Actuator, Journal, NxtBrick};
use nxt_timed_motion::runtime::{self, Runtime};
use nxt_timed_motion::MotionController;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(version, about = "Timed open-loop motion for an NXT robot")]
struct Cli {
    /// Serial port of the brick
    #[arg(long, default_value = BRICK_PORT)]
    port: String,

    /// Log motor calls instead of talking to the brick
    #[arg(long, default_value_t = !MOTOR_ENABLED)]
    simulate: bool,

    /// JSON file overriding the calibration constants
    #[arg(long)]
    calibration: Option<PathBuf>,

    #[command(subcommand)]
    verb: Verb,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Verb {
    /// Drive forward by a distance in millimeters
    Forward { distance: u32 },
    /// Drive backward by a distance in millimeters
    Backward { distance: u32 },
    /// Turn left in place by an angle in degrees
    Left { degrees: u32 },
    /// Turn right in place by an angle in degrees
    Right { degrees: u32 },
    /// Raise the catch bar
    Up,
    /// Lower the catch bar
    Down,
    /// Execute commands received over zenoh until Ctrl-C
    Serve,
}

impl Verb {
    fn command(self) -> Option<MotionCommand> {
        match self {
            Verb::Forward { distance } => Some(MotionCommand::DriveForward { distance }),
            Verb::Backward { distance } => Some(MotionCommand::DriveBackward { distance }),
            Verb::Left { degrees } => Some(MotionCommand::TurnLeft { degrees }),
            Verb::Right { degrees } => Some(MotionCommand::TurnRight { degrees }),
            Verb::Up => Some(MotionCommand::ArmUp),
            Verb::Down => Some(MotionCommand::ArmDown),
            Verb::Serve => None,
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let calibration = match &cli.calibration {
        Some(path) => Calibration::from_file(path)?,
        None => Calibration::default(),
    };

    let (handle, interrupt) = interrupt::pair();
    let shutdown = handle.subscribe();
    watch_ctrl_c(handle);

    if cli.simulate {
        info!("Simulating motors");
        let journal = Journal::new();
        let controller = MotionController::new(
            journal.motor("left"),
            journal.motor("right"),
            journal.motor("arm"),
            calibration,
            interrupt,
        );
        dispatch(controller, cli.verb, shutdown).await
    } else {
        info!("Connecting to brick on {}", cli.port);
        let mut brick = NxtBrick::open(&cli.port)?;
        let millivolts = brick.battery_millivolts()?;
        info!("Brick responding, battery at {} mV", millivolts);

        // Catch bar on A, right wheel on B, left wheel on C
        let [arm, right, left] = brick.split();
        let controller = MotionController::new(left, right, arm, calibration, interrupt);
        dispatch(controller, cli.verb, shutdown).await
    }
}

async fn dispatch<A: Actuator>(
    mut controller: MotionController<A>,
    verb: Verb,
    shutdown: Interrupt,
) -> Result<(), BoxError> {
    match verb.command() {
        Some(command) => {
            let report = controller.execute(command).await;
            if report.outcome.is_interrupted() {
                warn!("{} cut short: {:?}", command, report.outcome);
            }
            println!("done");
            Ok(())
        }
        None => runtime::run(Runtime::new(controller), shutdown).await,
    }
}

/// Ctrl-C interrupts the running command; motors still get stopped
fn watch_ctrl_c(handle: InterruptHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                handle.trigger();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });
}
