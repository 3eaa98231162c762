// Motor outputs for the NXT robot
//
// Provides:
// - The Actuator trait the controller drives
// - LEGO NXT direct-command protocol over a serial link
// - A simulated backend that journals every call

pub mod nxt;
pub mod sim;

pub use nxt::{NxtBrick, NxtError, NxtMotor, OutputPort};
pub use sim::{Journal, MotorCall, MotorEvent, SimulatedMotor};

/// A single motor output.
///
/// Calls are fire-and-forget from the controller's point of view: it logs a
/// failed call and carries on, so a stop is always attempted.
pub trait Actuator {
    type Error: std::fmt::Display;

    fn forward(&mut self) -> Result<(), Self::Error>;
    fn backward(&mut self) -> Result<(), Self::Error>;
    fn stop(&mut self) -> Result<(), Self::Error>;
    /// Speed in degrees per second for later forward/backward calls
    fn set_speed(&mut self, speed: u16) -> Result<(), Self::Error>;
}
