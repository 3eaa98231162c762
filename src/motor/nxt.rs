// LEGO NXT direct-command protocol over a Bluetooth serial link
//
// Packet format: [len_lo, len_hi, CommandType, Opcode, Params...]
// The length prefix counts the telegram bytes that follow it. It is part of
// the Bluetooth framing only; USB bulk transfers carry bare telegrams and are
// not supported here.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::Actuator;

/// Default serial configuration for the NXT Bluetooth port
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Largest power magnitude the firmware accepts
pub const MAX_POWER: u8 = 100;

/// Rotation speed reached at full regulated power
pub const MAX_SPEED_DEG_PER_SEC: u16 = 900;

/// Telegram type byte
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum CommandType {
    DirectReply = 0x00,
    DirectNoReply = 0x80,
    Reply = 0x02,
}

/// Direct-command opcodes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    SetOutputState = 0x04,
    GetBatteryLevel = 0x0B,
}

/// Output ports on the brick
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPort {
    A = 0x00,
    B = 0x01,
    C = 0x02,
}

// Output mode bits
const MODE_MOTORON: u8 = 0x01;
const MODE_BRAKE: u8 = 0x02;
const MODE_REGULATED: u8 = 0x04;

const REGULATION_MOTOR_SPEED: u8 = 0x01;
const RUN_STATE_RUNNING: u8 = 0x20;

/// Error types for NXT communication
#[derive(Debug, thiserror::Error)]
pub enum NxtError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reply to {opcode:?}: {reason}")]
    InvalidReply { opcode: Opcode, reason: String },

    #[error("Brick returned error status 0x{status:02X} for {opcode:?}")]
    Status { opcode: Opcode, status: u8 },

    #[error("Timeout waiting for reply to {opcode:?}")]
    Timeout { opcode: Opcode },

    #[error("Brick lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, NxtError>;

/// Connection to one NXT brick
pub struct NxtBrick<T = Box<dyn SerialPort>> {
    port: T,
}

impl NxtBrick {
    /// Open a new connection to the brick
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<T: Read + Write> NxtBrick<T> {
    /// Wrap an already open transport
    pub fn new(port: T) -> Self {
        Self { port }
    }

    /// Build a length-prefixed packet
    fn build_packet(kind: CommandType, opcode: Opcode, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u16; // type + opcode + params
        let mut packet = Vec::with_capacity(4 + params.len());

        packet.extend_from_slice(&length.to_le_bytes());
        packet.push(kind as u8);
        packet.push(opcode as u8);
        packet.extend_from_slice(params);

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Fill `buf`, reporting a serial timeout as a missing reply to `opcode`
    fn recv_exact(&mut self, buf: &mut [u8], opcode: Opcode) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                NxtError::Timeout { opcode }
            } else {
                NxtError::Io(e)
            }
        })
    }

    /// Read a reply telegram, returning the payload after the status byte
    fn read_reply(&mut self, opcode: Opcode) -> Result<Vec<u8>> {
        let mut prefix = [0u8; 2];
        self.recv_exact(&mut prefix, opcode)?;

        let length = u16::from_le_bytes(prefix) as usize;
        if length < 3 {
            return Err(NxtError::InvalidReply {
                opcode,
                reason: format!("Reply too short: {} bytes", length),
            });
        }

        let mut telegram = vec![0u8; length];
        self.recv_exact(&mut telegram, opcode)?;

        if telegram[0] != CommandType::Reply as u8 {
            return Err(NxtError::InvalidReply {
                opcode,
                reason: format!("Not a reply telegram: 0x{:02X}", telegram[0]),
            });
        }

        if telegram[1] != opcode as u8 {
            return Err(NxtError::InvalidReply {
                opcode,
                reason: format!("Opcode mismatch: got 0x{:02X}", telegram[1]),
            });
        }

        let status = telegram[2];
        if status != 0 {
            return Err(NxtError::Status { opcode, status });
        }

        Ok(telegram[3..].to_vec())
    }

    /// Drive one output at a signed power, braking when power is zero
    pub fn set_power(&mut self, output: OutputPort, power: i8) -> Result<()> {
        let power = power.clamp(-(MAX_POWER as i8), MAX_POWER as i8);
        let params = [
            output as u8,
            power as u8,
            MODE_MOTORON | MODE_BRAKE | MODE_REGULATED,
            REGULATION_MOTOR_SPEED,
            0, // turn ratio
            RUN_STATE_RUNNING,
            0, // tacho limit (u32 LE), 0 = run forever
            0,
            0,
            0,
        ];
        let packet = Self::build_packet(CommandType::DirectNoReply, Opcode::SetOutputState, &params);
        debug!("Set output {:?}: power={}", output, power);
        self.send_packet(&packet)
    }

    /// Battery voltage, also used as a connectivity check
    pub fn battery_millivolts(&mut self) -> Result<u16> {
        let packet = Self::build_packet(CommandType::DirectReply, Opcode::GetBatteryLevel, &[]);
        self.send_packet(&packet)?;

        let payload = self.read_reply(Opcode::GetBatteryLevel)?;
        if payload.len() < 2 {
            return Err(NxtError::InvalidReply {
                opcode: Opcode::GetBatteryLevel,
                reason: format!("Expected 2 bytes, got {}", payload.len()),
            });
        }
        Ok(u16::from_le_bytes([payload[0], payload[1]]))
    }

    /// Hand out one motor handle per output port: [A, B, C]
    pub fn split(self) -> [NxtMotor<T>; 3] {
        let brick = Arc::new(Mutex::new(self));
        [OutputPort::A, OutputPort::B, OutputPort::C]
            .map(|output| NxtMotor::new(Arc::clone(&brick), output))
    }
}

/// One motor output sharing the brick connection
pub struct NxtMotor<T: Read + Write = Box<dyn SerialPort>> {
    brick: Arc<Mutex<NxtBrick<T>>>,
    output: OutputPort,
    power: i8,
}

impl<T: Read + Write> NxtMotor<T> {
    pub fn new(brick: Arc<Mutex<NxtBrick<T>>>, output: OutputPort) -> Self {
        Self {
            brick,
            output,
            power: 0,
        }
    }

    fn set_power(&mut self, power: i8) -> Result<()> {
        self.brick
            .lock()
            .map_err(|_| NxtError::Poisoned)?
            .set_power(self.output, power)
    }
}

impl<T: Read + Write> Actuator for NxtMotor<T> {
    type Error = NxtError;

    fn forward(&mut self) -> Result<()> {
        self.set_power(self.power)
    }

    fn backward(&mut self) -> Result<()> {
        self.set_power(-self.power)
    }

    fn stop(&mut self) -> Result<()> {
        self.set_power(0)
    }

    fn set_speed(&mut self, speed: u16) -> Result<()> {
        self.power = speed_to_power(speed);
        debug!("Output {:?}: {} deg/s -> power {}", self.output, speed, self.power);
        Ok(())
    }
}

impl<T: Read + Write> Drop for NxtMotor<T> {
    fn drop(&mut self) {
        // Never leave an output running once its handle is gone
        if let Err(e) = self.stop() {
            warn!("Failed to stop output {:?} on drop: {}", self.output, e);
        }
    }
}

/// Regulated power for a speed in degrees per second, scaled so that
/// `MAX_SPEED_DEG_PER_SEC` maps to full power
pub fn speed_to_power(speed: u16) -> i8 {
    let power = u32::from(speed) * u32::from(MAX_POWER) / u32::from(MAX_SPEED_DEG_PER_SEC);
    power.min(u32::from(MAX_POWER)) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Calibration;
    use crate::interrupt::Interrupt;
    use crate::motion::MotionController;
    use std::io::Cursor;

    /// In-memory transport: records writes, serves canned reply bytes and
    /// times out once they run dry, like a serial port with a read timeout
    struct FakeLink {
        written: Arc<Mutex<Vec<u8>>>,
        reply: Cursor<Vec<u8>>,
    }

    impl FakeLink {
        fn new(reply: Vec<u8>) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let link = Self {
                written: Arc::clone(&written),
                reply: Cursor::new(reply),
            };
            (link, written)
        }
    }

    impl Read for FakeLink {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.reply.read(buf)?;
            if n == 0 && !buf.is_empty() {
                return Err(std::io::ErrorKind::TimedOut.into());
            }
            Ok(n)
        }
    }

    impl Write for FakeLink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn set_output_packet(output: u8, power: u8) -> Vec<u8> {
        vec![
            12, 0, 0x80, 0x04, output, power, 0x07, 0x01, 0, 0x20, 0, 0, 0, 0,
        ]
    }

    #[test]
    fn test_build_packet() {
        let packet =
            NxtBrick::<FakeLink>::build_packet(CommandType::DirectReply, Opcode::GetBatteryLevel, &[]);
        assert_eq!(packet, vec![2, 0, 0x00, 0x0B]);
    }

    #[test]
    fn test_set_power_packet() {
        let (link, written) = FakeLink::new(Vec::new());
        let mut brick = NxtBrick::new(link);
        brick.set_power(OutputPort::B, -100).unwrap();
        assert_eq!(*written.lock().unwrap(), set_output_packet(0x01, 0x9C));
    }

    #[test]
    fn test_set_power_clamps() {
        let (link, written) = FakeLink::new(Vec::new());
        let mut brick = NxtBrick::new(link);
        brick.set_power(OutputPort::A, 127).unwrap();
        assert_eq!(*written.lock().unwrap(), set_output_packet(0x00, 100));
    }

    #[test]
    fn test_battery_reply() {
        // 7400 mV = 0x1CE8
        let (link, written) = FakeLink::new(vec![5, 0, 0x02, 0x0B, 0x00, 0xE8, 0x1C]);
        let mut brick = NxtBrick::new(link);
        assert_eq!(brick.battery_millivolts().unwrap(), 7400);
        assert_eq!(*written.lock().unwrap(), vec![2, 0, 0x00, 0x0B]);
    }

    #[test]
    fn test_battery_reply_bad_status() {
        let (link, _) = FakeLink::new(vec![5, 0, 0x02, 0x0B, 0xEC, 0, 0]);
        let mut brick = NxtBrick::new(link);
        assert!(matches!(
            brick.battery_millivolts(),
            Err(NxtError::Status { status: 0xEC, .. })
        ));
    }

    #[test]
    fn test_battery_reply_wrong_opcode() {
        let (link, _) = FakeLink::new(vec![5, 0, 0x02, 0x04, 0x00, 0, 0]);
        let mut brick = NxtBrick::new(link);
        assert!(matches!(
            brick.battery_millivolts(),
            Err(NxtError::InvalidReply { .. })
        ));
    }

    #[test]
    fn test_battery_reply_not_a_reply() {
        let (link, _) = FakeLink::new(vec![5, 0, 0x00, 0x0B, 0x00, 0, 0]);
        let mut brick = NxtBrick::new(link);
        assert!(matches!(
            brick.battery_millivolts(),
            Err(NxtError::InvalidReply { .. })
        ));
    }

    #[test]
    fn test_motor_directions_follow_speed() {
        let (link, written) = FakeLink::new(Vec::new());
        let [_a, mut b, _c] = NxtBrick::new(link).split();
        // 450 deg/s is half of full speed
        b.set_speed(450).unwrap();
        b.forward().unwrap();
        b.backward().unwrap();
        b.stop().unwrap();

        let bytes = written.lock().unwrap().clone();
        let packets: Vec<&[u8]> = bytes.chunks(14).collect();
        assert_eq!(packets[0], set_output_packet(0x01, 50).as_slice());
        assert_eq!(packets[1], set_output_packet(0x01, 0xCE).as_slice()); // -50
        assert_eq!(packets[2], set_output_packet(0x01, 0).as_slice());
    }

    #[test]
    fn test_speed_to_power() {
        assert_eq!(speed_to_power(0), 0);
        assert_eq!(speed_to_power(50), 5);
        assert_eq!(speed_to_power(100), 11);
        assert_eq!(speed_to_power(900), 100);
        assert_eq!(speed_to_power(u16::MAX), 100);
    }

    #[test]
    fn test_silent_brick_times_out() {
        let (link, _) = FakeLink::new(Vec::new());
        let mut brick = NxtBrick::new(link);
        assert!(matches!(
            brick.battery_millivolts(),
            Err(NxtError::Timeout {
                opcode: Opcode::GetBatteryLevel
            })
        ));
    }

    #[test]
    fn test_truncated_reply_times_out() {
        // Prefix announces 5 bytes, only 2 arrive
        let (link, _) = FakeLink::new(vec![5, 0, 0x02, 0x0B]);
        let mut brick = NxtBrick::new(link);
        assert!(matches!(
            brick.battery_millivolts(),
            Err(NxtError::Timeout {
                opcode: Opcode::GetBatteryLevel
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_runs_outputs_at_calibrated_speed() {
        let (link, written) = FakeLink::new(Vec::new());
        let [arm, right, left] = NxtBrick::new(link).split();
        let mut controller = MotionController::new(
            left,
            right,
            arm,
            Calibration::default(),
            Interrupt::never(),
        );

        controller.drive(100, true).await;
        controller.set_arm(true).await;

        let bytes = written.lock().unwrap().clone();
        let packets: Vec<&[u8]> = bytes.chunks(14).collect();
        // 100 deg/s on both wheels, 50 deg/s on the arm
        assert_eq!(
            packets,
            vec![
                set_output_packet(0x02, 11).as_slice(),
                set_output_packet(0x01, 11).as_slice(),
                set_output_packet(0x02, 0).as_slice(),
                set_output_packet(0x01, 0).as_slice(),
                set_output_packet(0x00, 5).as_slice(),
                set_output_packet(0x00, 0).as_slice(),
            ]
        );
    }

    #[test]
    fn test_dropped_motor_stops_its_output() {
        let (link, written) = FakeLink::new(Vec::new());
        let [a, b, c] = NxtBrick::new(link).split();
        drop(a);
        assert_eq!(*written.lock().unwrap(), set_output_packet(0x00, 0));
        drop(b);
        drop(c);
    }
}
