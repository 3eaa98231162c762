// Simulated motors for dry runs and tests
//
// Every call is logged and appended to a shared journal with the tokio
// clock's timestamp, so a paused-clock test can check ordering and waits.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::info;

use super::Actuator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCall {
    SetSpeed(u16),
    Forward,
    Backward,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorEvent {
    pub motor: &'static str,
    pub call: MotorCall,
    pub at: Instant,
}

/// Shared record of every call made on the motors created from it
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<MotorEvent>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a motor that records into this journal
    pub fn motor(&self, name: &'static str) -> SimulatedMotor {
        SimulatedMotor {
            name,
            journal: self.clone(),
        }
    }

    pub fn events(&self) -> Vec<MotorEvent> {
        self.lock().clone()
    }

    /// Calls made on one motor, in order
    pub fn calls(&self, motor: &str) -> Vec<MotorCall> {
        self.lock()
            .iter()
            .filter(|event| event.motor == motor)
            .map(|event| event.call)
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn record(&self, motor: &'static str, call: MotorCall) {
        self.lock().push(MotorEvent {
            motor,
            call,
            at: Instant::now(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MotorEvent>> {
        // A panic elsewhere cannot corrupt a Vec of Copy events
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct SimulatedMotor {
    name: &'static str,
    journal: Journal,
}

impl SimulatedMotor {
    fn record(&self, call: MotorCall) -> Result<(), Infallible> {
        info!("[sim] {} motor: {:?}", self.name, call);
        self.journal.record(self.name, call);
        Ok(())
    }
}

impl Actuator for SimulatedMotor {
    type Error = Infallible;

    fn forward(&mut self) -> Result<(), Infallible> {
        self.record(MotorCall::Forward)
    }

    fn backward(&mut self) -> Result<(), Infallible> {
        self.record(MotorCall::Backward)
    }

    fn stop(&mut self) -> Result<(), Infallible> {
        self.record(MotorCall::Stop)
    }

    fn set_speed(&mut self, speed: u16) -> Result<(), Infallible> {
        self.record(MotorCall::SetSpeed(speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_journal_records_per_motor() {
        let journal = Journal::new();
        let mut left = journal.motor("left");
        let mut arm = journal.motor("arm");

        left.set_speed(100).unwrap();
        arm.backward().unwrap();
        left.forward().unwrap();

        assert_eq!(
            journal.calls("left"),
            vec![MotorCall::SetSpeed(100), MotorCall::Forward]
        );
        assert_eq!(journal.calls("arm"), vec![MotorCall::Backward]);
        assert_eq!(journal.events().len(), 3);

        journal.clear();
        assert!(journal.events().is_empty());
    }
}
