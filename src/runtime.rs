// Serve loop: motion commands in over zenoh, one report out per command
// Commands queue in the subscriber and run strictly in arrival order; a new
// command never starts before the previous one has stopped its motors.

use tracing::{info, warn};

use crate::config::{TOPIC_CMD_MOTION, TOPIC_MOTION_REPORT};
use crate::interrupt::Interrupt;
use crate::messages::{MotionCommand, MotionReport};
use crate::motion::MotionController;
use crate::motor::Actuator;

pub struct Runtime<A: Actuator> {
    controller: MotionController<A>,
    executed: u64,
}

impl<A: Actuator> Runtime<A> {
    pub fn new(controller: MotionController<A>) -> Self {
        Self {
            controller,
            executed: 0,
        }
    }

    /// Number of commands run so far
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Decode and run one command payload
    pub async fn on_payload(&mut self, payload: &[u8]) -> Option<MotionReport> {
        let cmd = match serde_json::from_slice::<MotionCommand>(payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Failed to parse command: {}", e);
                return None;
            }
        };

        info!("Received command: {:?}", &cmd);
        let report = self.controller.execute(cmd).await;
        self.executed += 1;
        Some(report)
    }
}

pub async fn run<A: Actuator>(
    mut runtime: Runtime<A>,
    mut shutdown: Interrupt,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let pub_report = session.declare_publisher(TOPIC_MOTION_REPORT).await?;

    info!("Subscribed to: {}", TOPIC_CMD_MOTION);
    info!("Publishing to: {}", TOPIC_MOTION_REPORT);

    loop {
        let sample = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            sample = subscriber.recv_async() => sample?,
        };

        let payload = sample.payload().to_bytes();
        if let Some(report) = runtime.on_payload(&payload).await {
            let report_json = serde_json::to_string(&report)?;
            pub_report.put(report_json).await?;
        }
    }

    info!("Shutting down after {} command(s)", runtime.executed());
    Ok(())
}
