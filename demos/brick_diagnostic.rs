// Brick diagnostic: READ-ONLY check of the NXT link
//
// Only queries the battery level; no motor is driven.
// Run this before pointing the CLI at real hardware.
//
// Usage: cargo run --example brick_diagnostic -- [port]
// Example: cargo run --example brick_diagnostic -- /dev/rfcomm0

use nxt_timed_motion::config::BRICK_PORT;
use nxt_timed_motion::motor::{NxtBrick, NxtError};

// Below this the drive timings drift noticeably
const LOW_BATTERY_MV: u16 = 7000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| BRICK_PORT.to_string());

    println!("NXT brick diagnostic (read-only)");
    println!("Serial port: {}", port);
    println!();

    println!("Step 1: Opening serial port...");
    let mut brick = match NxtBrick::open(&port) {
        Ok(brick) => {
            println!("  ✓ Serial port opened");
            brick
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Pair the brick and bind it with `rfcomm bind`");
            println!("  - Check the port path is correct");
            println!("  - Make sure the brick is switched on");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Reading battery level...");
    match brick.battery_millivolts() {
        Ok(mv) if mv < LOW_BATTERY_MV => {
            println!("  ⚠ Battery low: {} mV", mv);
            println!("    Timed moves will fall short until batteries are replaced.");
        }
        Ok(mv) => println!("  ✓ Battery: {} mV", mv),
        Err(NxtError::Timeout { .. }) => {
            println!("  ✗ No reply from brick (port open, brick silent)");
        }
        Err(e) => {
            println!("  ✗ Error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
