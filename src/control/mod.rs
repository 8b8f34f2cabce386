// Closed-loop velocity control for the drivetrain
//
// Provides:
// - Per-motor PID with acceleration-limited velocity filtering
// - Safety overrides (estop always wins) and command-space bounding

mod odom;

pub use odom::{ControlDiagnostics, OdomControl, PidGains};
