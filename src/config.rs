// Timeouts, topics, motor and frame configuration
use std::time::Duration;

use crate::control::PidGains;
use crate::protocol::codec::{ChecksumKind, FrameLayout};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Robot is considered unresponsive after this much silence on the wire
pub const COMM_TIMEOUT: Duration = Duration::from_millis(1000);

// How often (in loop ticks) the runtime polls the robot for a fresh status frame
pub const STATUS_REQUEST_TICKS: u64 = 10;

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "rover/cmd/base"; // per-motor velocity commands
pub const TOPIC_CMD_ESTOP: &str = "rover/cmd/estop"; // software estop
pub const TOPIC_CMD_TRIM: &str = "rover/cmd/trim"; // drive trim adjustment
pub const TOPIC_STATUS: &str = "rover/state/status"; // robot telemetry
pub const TOPIC_HEALTH: &str = "rover/state/health"; // health status

// Serial port for the robot's main board
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const SERIAL_BAUDRATE: u32 = 57600;
pub const SERIAL_TIMEOUT_MS: u64 = 100;

// Motor command space: 0 = full reverse, 125 = neutral, 250 = full forward
pub const MOTOR_NEUTRAL: i32 = 125;
pub const MOTOR_MAX: i32 = 250;
pub const MOTOR_MIN: i32 = 0;
pub const MOTOR_DEADBAND: i32 = 9;

// Velocity envelope (m/s) accepted at the command boundary
pub const MAX_VELOCITY: f64 = 3.0;

// Meters traveled per wheel revolution, for RPM feedback conversion
pub const WHEEL_CIRCUMFERENCE: f64 = 0.64;

// Default velocity-loop gains for the Pro drivetrain
pub const DEFAULT_PID_GAINS: PidGains = PidGains {
    kp: 20.0,
    ki: 40.0,
    kd: 0.0,
};

// Closed-loop control on by default for the Pro family
pub const USE_CLOSED_LOOP: bool = true;

/// Wire layout for the Pro hardware family.
///
/// The byte-field assignment is board firmware configuration, not something the
/// abstract protocol defines; a different board revision supplies a different
/// layout here.
pub const PRO_FRAME_LAYOUT: FrameLayout = FrameLayout {
    start_marker: 253,
    command_len: 7,
    response_len: 5,
    checksum: ChecksumKind::ComplementSum,
};

// CAN identifier used for outbound command frames when the transport is a CAN bus
pub const CAN_COMMAND_ID: u16 = 0x201;
