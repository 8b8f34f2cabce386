// Zero hardware family: placeholder chassis with no protocol translation
//
// The Zero line accepts the full command interface but performs no real
// translation and drives no motors. Keeping every operation a deliberate
// no-op (rather than an error) lets the runtime and tooling run unchanged
// against a chassis that has nothing to say.

use tracing::info;

use super::ProtocolError;
use super::status::{RobotInfo, StatusData};
use crate::transport::TransportKind;

pub struct ZeroProtocol;

impl ZeroProtocol {
    pub fn new(device: &str, kind: TransportKind) -> Result<Self, ProtocolError> {
        info!("Zero protocol stub on {} over {:?}", device, kind);
        Ok(Self)
    }

    pub fn update_drivetrim(&self, _delta: f64) {}

    pub fn translate_send_estop(&self, _active: bool) {}

    pub fn translate_send_speed(&self, _velocities: [f64; 3]) {}

    pub fn translate_send_robot_status_request(&self) -> StatusData {
        StatusData::default()
    }

    pub fn translate_send_robot_info_request(&self) -> RobotInfo {
        RobotInfo::default()
    }

    pub fn unpack_comm_response(&self, _bytes: &[u8]) {}

    pub fn poll_comm(&self) {}

    pub fn is_connected(&self) -> bool {
        false
    }

    pub fn register_comm_base(&self, _device: &str) -> Result<(), ProtocolError> {
        Ok(())
    }
}
