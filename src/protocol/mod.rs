// Robot protocol layer
//
// Provides:
// - The closed set of hardware families behind one dispatch type
// - Frame encoding/decoding per family
// - Cached robot telemetry (StatusData / RobotInfo)

pub mod codec;
mod pro;
mod status;
mod zero;

pub use pro::{PRO_MOTOR_COUNT, ProProtocol};
pub use status::{DataElement, RobotInfo, StatusData};
pub use zero::ZeroProtocol;

use crate::transport::{TransportError, TransportKind};

/// Error types for protocol construction and binding
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    #[error("Cannot rebind the transport while one is bound")]
    RebindWhileBound,
}

/// Hardware families this driver speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotFamily {
    /// Full closed-loop three-motor platform
    Pro,
    /// Placeholder family, accepts the interface and does nothing
    Zero,
}

/// One robot, one protocol: the uniform command/status interface over the
/// closed set of hardware families. Adding a family is a new variant plus
/// its codec, nothing else changes for callers.
pub enum ProtocolObject {
    Pro(ProProtocol),
    Zero(ZeroProtocol),
}

impl ProtocolObject {
    /// Construct the protocol object for a family, opening its transport.
    pub fn new(
        family: RobotFamily,
        device: &str,
        kind: TransportKind,
    ) -> Result<Self, ProtocolError> {
        match family {
            RobotFamily::Pro => Ok(Self::Pro(ProProtocol::new(device, kind)?)),
            RobotFamily::Zero => Ok(Self::Zero(ZeroProtocol::new(device, kind)?)),
        }
    }

    pub fn update_drivetrim(&self, delta: f64) {
        match self {
            Self::Pro(p) => p.update_drivetrim(delta),
            Self::Zero(z) => z.update_drivetrim(delta),
        }
    }

    pub fn translate_send_estop(&self, active: bool) {
        match self {
            Self::Pro(p) => p.translate_send_estop(active),
            Self::Zero(z) => z.translate_send_estop(active),
        }
    }

    pub fn translate_send_speed(&self, velocities: [f64; 3]) {
        match self {
            Self::Pro(p) => p.translate_send_speed(velocities),
            Self::Zero(z) => z.translate_send_speed(velocities),
        }
    }

    pub fn translate_send_robot_status_request(&self) -> StatusData {
        match self {
            Self::Pro(p) => p.translate_send_robot_status_request(),
            Self::Zero(z) => z.translate_send_robot_status_request(),
        }
    }

    pub fn translate_send_robot_info_request(&self) -> RobotInfo {
        match self {
            Self::Pro(p) => p.translate_send_robot_info_request(),
            Self::Zero(z) => z.translate_send_robot_info_request(),
        }
    }

    pub fn unpack_comm_response(&self, bytes: &[u8]) {
        match self {
            Self::Pro(p) => p.unpack_comm_response(bytes),
            Self::Zero(z) => z.unpack_comm_response(bytes),
        }
    }

    /// Drain available transport bytes through `unpack_comm_response`.
    pub fn poll_comm(&self) {
        match self {
            Self::Pro(p) => p.poll_comm(),
            Self::Zero(z) => z.poll_comm(),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::Pro(p) => p.is_connected(),
            Self::Zero(z) => z.is_connected(),
        }
    }

    pub fn register_comm_base(&self, device: &str) -> Result<(), ProtocolError> {
        match self {
            Self::Pro(p) => p.register_comm_base(device),
            Self::Zero(z) => z.register_comm_base(device),
        }
    }
}
