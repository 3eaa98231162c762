// Define message types for the controller and the serve loop

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Command from CLI/teleop -> controller
// Tagged by "command" so payloads read {"command":"drive_forward","distance":100}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MotionCommand {
    DriveForward { distance: u32 },
    DriveBackward { distance: u32 },
    TurnLeft { degrees: u32 },
    TurnRight { degrees: u32 },
    ArmUp,
    ArmDown,
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DriveForward { distance } => write!(f, "forward {} mm", distance),
            Self::DriveBackward { distance } => write!(f, "backward {} mm", distance),
            Self::TurnLeft { degrees } => write!(f, "left {} deg", degrees),
            Self::TurnRight { degrees } => write!(f, "right {} deg", degrees),
            Self::ArmUp => write!(f, "arm up"),
            Self::ArmDown => write!(f, "arm down"),
        }
    }
}

/// How the blocking wait of a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Interrupted { elapsed_ms: u64 },
}

impl Outcome {
    pub fn interrupted(elapsed: Duration) -> Self {
        Self::Interrupted {
            elapsed_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

// Report from controller -> serve loop publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionReport {
    pub command: MotionCommand,
    pub planned_ms: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}
