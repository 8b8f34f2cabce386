// Define message types for the runtime

use serde::{Deserialize, Serialize};

// Command from teleop/scripts -> runtime
// One commanded velocity (m/s) per driven motor; the flipper axis is unused on
// two-motor chassis and those simply ignore it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorCommand {
    pub left: f64,
    pub right: f64,
    pub flipper: f64,
}

// Software estop from any supervisor -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EstopCommand {
    pub active: bool,
}

// Drive trim adjustment, applied as a left/right bias before control
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrimCommand {
    pub trim: f64,
}

// Actuation handed to the protocol layer each tick
// Has default values because we don't always have a command to act on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct BaseActuation {
    pub left: f64,
    pub right: f64,
    pub flipper: f64,
}

impl From<&MotorCommand> for BaseActuation {
    fn from(cmd: &MotorCommand) -> Self {
        Self {
            left: cmd.left,
            right: cmd.right,
            flipper: cmd.flipper,
        }
    }
}

impl BaseActuation {
    /// Velocities in the order the protocol layer drives its motors.
    pub fn as_array(&self) -> [f64; 3] {
        [self.left, self.right, self.flipper]
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Disconnected,
}
