// Timed motion controller
//
// Open loop: each command engages motors, waits for a duration derived from
// the calibration, then stops them. There is no position feedback, so slip or
// battery sag shows up as uncorrected error.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::Calibration;
use crate::interrupt::Interrupt;
use crate::messages::{MotionCommand, MotionReport, Outcome};
use crate::motor::Actuator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Motors that are running until this guard goes out of scope.
///
/// Dropping it stops every motor it holds, whether the wait finished, was
/// interrupted, or the command future was dropped mid-wait.
struct Engaged<'a, A: Actuator, const N: usize> {
    motors: [&'a mut A; N],
}

impl<'a, A: Actuator, const N: usize> Engaged<'a, A, N> {
    fn engage(motors: [(&'a mut A, Direction); N]) -> Self {
        let directions = motors.each_ref().map(|(_, direction)| *direction);
        let mut engaged = Self {
            motors: motors.map(|(motor, _)| motor),
        };

        for (motor, direction) in engaged.motors.iter_mut().zip(directions) {
            let result = match direction {
                Direction::Forward => motor.forward(),
                Direction::Backward => motor.backward(),
            };
            if let Err(e) = result {
                warn!("Failed to start motor {:?}: {}", direction, e);
            }
        }
        engaged
    }
}

impl<A: Actuator, const N: usize> Drop for Engaged<'_, A, N> {
    fn drop(&mut self) {
        for motor in self.motors.iter_mut() {
            if let Err(e) = motor.stop() {
                warn!("Failed to stop motor: {}", e);
            }
        }
        debug!("Stopped {} motor(s)", N);
    }
}

/// Sleep for `duration` unless the interrupt fires first
async fn timed_wait(duration: Duration, interrupt: &mut Interrupt) -> Outcome {
    let started = Instant::now();
    tokio::select! {
        _ = sleep(duration) => Outcome::Completed,
        _ = interrupt.triggered() => {
            let elapsed = started.elapsed();
            warn!("Wait interrupted after {:?} of {:?}", elapsed, duration);
            Outcome::interrupted(elapsed)
        }
    }
}

/// Drives the two-wheeled base and the catch-bar arm.
///
/// Every operation takes `&mut self`, so commands run strictly one at a time.
pub struct MotionController<A: Actuator> {
    left: A,
    right: A,
    arm: A,
    calibration: Calibration,
    interrupt: Interrupt,
}

impl<A: Actuator> MotionController<A> {
    /// Take ownership of the three motors and apply the calibrated speeds
    pub fn new(left: A, right: A, arm: A, calibration: Calibration, interrupt: Interrupt) -> Self {
        let mut controller = Self {
            left,
            right,
            arm,
            calibration,
            interrupt,
        };

        let speeds = [
            (&mut controller.left, calibration.drive_speed),
            (&mut controller.right, calibration.drive_speed),
            (&mut controller.arm, calibration.arm_speed),
        ];
        for (motor, speed) in speeds {
            if let Err(e) = motor.set_speed(speed) {
                warn!("Failed to set motor speed {}: {}", speed, e);
            }
        }
        controller
    }

    /// Wait the given command will block for
    pub fn planned_duration(&self, command: MotionCommand) -> Duration {
        match command {
            MotionCommand::DriveForward { distance } | MotionCommand::DriveBackward { distance } => {
                self.calibration.drive_duration(distance)
            }
            MotionCommand::TurnLeft { degrees } | MotionCommand::TurnRight { degrees } => {
                self.calibration.turn_duration(degrees)
            }
            MotionCommand::ArmUp | MotionCommand::ArmDown => self.calibration.arm_duration(),
        }
    }

    /// Run one command to completion (or interruption)
    pub async fn execute(&mut self, command: MotionCommand) -> MotionReport {
        let planned = self.planned_duration(command);
        info!("Executing {} ({:?})", command, planned);

        let outcome = match command {
            MotionCommand::DriveForward { distance } => self.drive(distance, true).await,
            MotionCommand::DriveBackward { distance } => self.drive(distance, false).await,
            MotionCommand::TurnLeft { degrees } => self.turn_left(degrees).await,
            MotionCommand::TurnRight { degrees } => self.turn_right(degrees).await,
            MotionCommand::ArmUp => self.set_arm(false).await,
            MotionCommand::ArmDown => self.set_arm(true).await,
        };

        info!("Finished {}: {:?}", command, outcome);
        MotionReport {
            command,
            planned_ms: planned.as_millis().try_into().unwrap_or(u64::MAX),
            outcome,
        }
    }

    /// Drive straight for `distance` millimeters
    pub async fn drive(&mut self, distance: u32, forward: bool) -> Outcome {
        let direction = if forward {
            Direction::Forward
        } else {
            Direction::Backward
        };
        let wait = self.calibration.drive_duration(distance);

        let _engaged = Engaged::engage([
            (&mut self.left, direction),
            (&mut self.right, direction),
        ]);
        timed_wait(wait, &mut self.interrupt).await
    }

    pub async fn turn_left(&mut self, degrees: u32) -> Outcome {
        self.turn(degrees, Direction::Forward, Direction::Backward).await
    }

    pub async fn turn_right(&mut self, degrees: u32) -> Outcome {
        self.turn(degrees, Direction::Backward, Direction::Forward).await
    }

    /// Spin in place with the wheels in opposite directions
    async fn turn(&mut self, degrees: u32, left: Direction, right: Direction) -> Outcome {
        let wait = self.calibration.turn_duration(degrees);

        let _engaged = Engaged::engage([(&mut self.left, left), (&mut self.right, right)]);
        timed_wait(wait, &mut self.interrupt).await
    }

    /// Lower (`down = true`) or raise the catch bar.
    ///
    /// The arm has a hard end stop, so moving towards a side it already rests
    /// on just stalls against it for the travel time.
    pub async fn set_arm(&mut self, down: bool) -> Outcome {
        let direction = if down {
            Direction::Forward
        } else {
            Direction::Backward
        };
        let wait = self.calibration.arm_duration();

        let _engaged = Engaged::engage([(&mut self.arm, direction)]);
        timed_wait(wait, &mut self.interrupt).await
    }
}
