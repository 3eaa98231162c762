// Open-loop timed motion control for a two-wheeled NXT robot with a catch-bar arm

pub mod config;
pub mod interrupt;
pub mod messages;
pub mod motion;
pub mod motor;
pub mod runtime;

pub use motion::MotionController;
