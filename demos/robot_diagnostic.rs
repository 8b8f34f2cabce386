// Robot diagnostic: query identity and telemetry without driving the motors
//
// Sends only data requests (the drive bytes stay at neutral), so the robot
// does not move. Use this first to verify the link before running the runtime.
//
// Usage: cargo run --example robot_diagnostic -- [port]
// Example: cargo run --example robot_diagnostic -- /dev/ttyUSB0

use std::thread::sleep;
use std::time::Duration;

use rover_zenoh_runtime::config::DEFAULT_PORT;
use rover_zenoh_runtime::protocol::ProProtocol;
use rover_zenoh_runtime::transport::TransportKind;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PORT.to_string());

    println!("=== Rover diagnostic (no motion) ===");
    println!("Port: {}", port);
    println!();

    println!("Step 1: Opening transport...");
    let protocol = match ProProtocol::new(&port, TransportKind::Serial) {
        Ok(protocol) => {
            println!("  ok: transport open");
            protocol
        }
        Err(e) => {
            println!("  FAILED: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            println!("  - Check your user is in the dialout group");
            return Err(e.into());
        }
    };

    println!("Step 2: Requesting robot identity...");
    protocol.translate_send_robot_info_request();
    poll_for(&protocol, Duration::from_millis(500));

    let info = protocol.translate_send_robot_info_request();
    if info.firmware_build == 0 {
        println!("  no identity response yet (robot powered?)");
    } else {
        let (major, minor, patch) = info.firmware_version();
        println!("  model:    {}", info.model);
        println!("  serial:   {}", info.serial);
        println!("  firmware: {}.{:02}.{:02}", major, minor, patch);
    }
    println!();

    println!("Step 3: Requesting telemetry...");
    protocol.translate_send_robot_status_request();
    poll_for(&protocol, Duration::from_millis(500));

    let status = protocol.translate_send_robot_status_request();
    println!("  battery:     {:.1} V", status.battery_voltage);
    println!("  total draw:  {:.1} A", status.total_current);
    println!(
        "  motor rpm:   left={:.0} right={:.0} flipper={:.0}",
        status.motor_rpms[0], status.motor_rpms[1], status.motor_rpms[2]
    );
    println!(
        "  motor temp:  left={:.1} C right={:.1} C",
        status.motor_temps[0], status.motor_temps[1]
    );
    println!("  fault flags: {:#06x}", status.fault_flags);
    println!();

    println!(
        "Connection: {}",
        if protocol.is_connected() {
            "RESPONSIVE"
        } else {
            "no response - check power and wiring"
        }
    );
    println!();
    println!("Next step: run the runtime and drive with the cmd_publisher teleop");

    Ok(())
}

/// Drain inbound telemetry for a while.
fn poll_for(protocol: &ProProtocol, duration: Duration) {
    let steps = duration.as_millis() / 20;
    for _ in 0..steps {
        protocol.poll_comm();
        sleep(Duration::from_millis(20));
    }
}
