// Telemetry decoded from the robot
//
// Element ids and raw-value scales are Pro board firmware configuration.
// Raw electrical values arrive in tenths of their engineering unit; RPM
// values are two's-complement signed.

use serde::{Deserialize, Serialize};

use super::codec::ResponseRecord;

/// Telemetry element ids the Pro board reports
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataElement {
    TotalCurrent = 0,
    MotorRpmLeft = 2,
    MotorRpmRight = 4,
    MotorRpmFlipper = 6,
    MotorCurrentLeft = 10,
    MotorCurrentRight = 12,
    MotorCurrentFlipper = 14,
    MotorTempLeft = 20,
    MotorTempRight = 22,
    BatteryVoltage = 24,
    FaultFlags = 30,
    BuildNumber = 40,
    RobotModel = 42,
    RobotSerial = 44,
}

impl TryFrom<u8> for DataElement {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::TotalCurrent,
            2 => Self::MotorRpmLeft,
            4 => Self::MotorRpmRight,
            6 => Self::MotorRpmFlipper,
            10 => Self::MotorCurrentLeft,
            12 => Self::MotorCurrentRight,
            14 => Self::MotorCurrentFlipper,
            20 => Self::MotorTempLeft,
            22 => Self::MotorTempRight,
            24 => Self::BatteryVoltage,
            30 => Self::FaultFlags,
            40 => Self::BuildNumber,
            42 => Self::RobotModel,
            44 => Self::RobotSerial,
            other => return Err(other),
        })
    }
}

/// Robot-wide telemetry snapshot.
///
/// The default value is the well-defined "nothing heard yet" record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct StatusData {
    pub battery_voltage: f64,
    pub total_current: f64,
    /// Amps per motor: left, right, flipper
    pub motor_currents: [f64; 3],
    /// Signed RPM per motor: left, right, flipper
    pub motor_rpms: [f64; 3],
    /// Degrees C: left drive board, right drive board
    pub motor_temps: [f64; 2],
    pub fault_flags: u16,
    pub firmware_build: i32,
}

impl StatusData {
    /// Fold one decoded record into the snapshot. Unknown elements are
    /// ignored; the caller logs them.
    pub fn apply(&mut self, element: DataElement, raw: u16) {
        match element {
            DataElement::TotalCurrent => self.total_current = tenths(raw),
            DataElement::MotorRpmLeft => self.motor_rpms[0] = signed(raw),
            DataElement::MotorRpmRight => self.motor_rpms[1] = signed(raw),
            DataElement::MotorRpmFlipper => self.motor_rpms[2] = signed(raw),
            DataElement::MotorCurrentLeft => self.motor_currents[0] = tenths(raw),
            DataElement::MotorCurrentRight => self.motor_currents[1] = tenths(raw),
            DataElement::MotorCurrentFlipper => self.motor_currents[2] = tenths(raw),
            DataElement::MotorTempLeft => self.motor_temps[0] = tenths(raw),
            DataElement::MotorTempRight => self.motor_temps[1] = tenths(raw),
            DataElement::BatteryVoltage => self.battery_voltage = tenths(raw),
            DataElement::FaultFlags => self.fault_flags = raw,
            DataElement::BuildNumber => self.firmware_build = i32::from(raw),
            DataElement::RobotModel | DataElement::RobotSerial => {}
        }
    }
}

/// Static identity telemetry.
///
/// Same lifecycle as [`StatusData`], refreshed far less often; the default
/// value means the robot has not identified itself yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct RobotInfo {
    pub model: u16,
    pub serial: u16,
    /// aabbcc build number
    pub firmware_build: i32,
}

impl RobotInfo {
    pub fn apply(&mut self, element: DataElement, raw: u16) {
        match element {
            DataElement::RobotModel => self.model = raw,
            DataElement::RobotSerial => self.serial = raw,
            DataElement::BuildNumber => self.firmware_build = i32::from(raw),
            _ => {}
        }
    }

    /// (major, minor, patch) from the aabbcc build number
    pub fn firmware_version(&self) -> (i32, i32, i32) {
        (
            self.firmware_build / 10000,
            self.firmware_build / 100 % 100,
            self.firmware_build % 100,
        )
    }
}

fn tenths(raw: u16) -> f64 {
    f64::from(raw) / 10.0
}

fn signed(raw: u16) -> f64 {
    f64::from(raw as i16)
}

/// Route a record to whichever snapshots care about it.
pub(crate) fn apply_record(status: &mut StatusData, info: &mut RobotInfo, record: &ResponseRecord) {
    match DataElement::try_from(record.element) {
        Ok(element) => {
            status.apply(element, record.value);
            info.apply(element, record.value);
        }
        Err(other) => tracing::trace!("Ignoring unknown telemetry element {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_fold_into_snapshot() {
        let mut status = StatusData::default();
        status.apply(DataElement::BatteryVoltage, 162);
        status.apply(DataElement::MotorRpmLeft, (-300i16) as u16);
        status.apply(DataElement::FaultFlags, 0b101);

        assert_eq!(status.battery_voltage, 16.2);
        assert_eq!(status.motor_rpms[0], -300.0);
        assert_eq!(status.fault_flags, 0b101);
    }

    #[test]
    fn firmware_version_splits_build_number() {
        let info = RobotInfo {
            model: 2,
            serial: 1881,
            firmware_build: 10207,
        };
        assert_eq!(info.firmware_version(), (1, 2, 7));
    }
}
