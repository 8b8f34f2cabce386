// Pro hardware family: full closed-loop three-motor platform
//
// Owns the transport handle, the frame codec and one velocity controller per
// motor. Command issuance and response intake may run from different tasks;
// everything mutable sits behind one lock so a partially built frame is never
// sent and a status read never observes a half-applied record.

use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use super::ProtocolError;
use super::codec::{CommandKind, ProFrameCodec};
use super::status::{DataElement, RobotInfo, StatusData, apply_record};
use crate::config::{
    COMM_TIMEOUT, DEFAULT_PID_GAINS, MOTOR_MAX, MOTOR_MIN, MOTOR_NEUTRAL, PRO_FRAME_LAYOUT,
    USE_CLOSED_LOOP, WHEEL_CIRCUMFERENCE,
};
use crate::control::OdomControl;
use crate::transport::{Transport, TransportKind, open_transport};

/// Motors the Pro chassis drives: left, right, flipper
pub const PRO_MOTOR_COUNT: usize = 3;

/// Elements polled by a status request
const STATUS_ELEMENTS: [DataElement; 11] = [
    DataElement::TotalCurrent,
    DataElement::MotorRpmLeft,
    DataElement::MotorRpmRight,
    DataElement::MotorRpmFlipper,
    DataElement::MotorCurrentLeft,
    DataElement::MotorCurrentRight,
    DataElement::MotorCurrentFlipper,
    DataElement::MotorTempLeft,
    DataElement::MotorTempRight,
    DataElement::BatteryVoltage,
    DataElement::FaultFlags,
];

/// Elements polled by an info request
const INFO_ELEMENTS: [DataElement; 3] = [
    DataElement::BuildNumber,
    DataElement::RobotModel,
    DataElement::RobotSerial,
];

pub struct ProProtocol {
    inner: Mutex<ProInner>,
}

struct ProInner {
    comm: Option<Box<dyn Transport>>,
    kind: TransportKind,
    codec: ProFrameCodec,
    controllers: [OdomControl; PRO_MOTOR_COUNT],
    motor_speeds: [u8; PRO_MOTOR_COUNT],
    trim: f64,
    estop: bool,
    status: StatusData,
    info: RobotInfo,
    last_rx: Option<Instant>,
    last_speed_tick: Option<Instant>,
}

impl ProProtocol {
    /// Open the device and stand up the protocol object.
    pub fn new(device: &str, kind: TransportKind) -> Result<Self, ProtocolError> {
        let comm = open_transport(kind, device)?;
        info!("Pro protocol bound to {} over {:?}", device, kind);
        Ok(Self::assemble(Some(comm), kind))
    }

    /// Stand up the protocol object on an already-open transport.
    pub fn from_transport(comm: Box<dyn Transport>) -> Self {
        Self::assemble(Some(comm), TransportKind::Serial)
    }

    fn assemble(comm: Option<Box<dyn Transport>>, kind: TransportKind) -> Self {
        Self {
            inner: Mutex::new(ProInner {
                comm,
                kind,
                codec: ProFrameCodec::new(PRO_FRAME_LAYOUT),
                controllers: std::array::from_fn(|_| {
                    OdomControl::new(USE_CLOSED_LOOP, DEFAULT_PID_GAINS, MOTOR_MAX, MOTOR_MIN)
                }),
                motor_speeds: [MOTOR_NEUTRAL as u8; PRO_MOTOR_COUNT],
                trim: 0.0,
                estop: false,
                status: StatusData::default(),
                info: RobotInfo::default(),
                last_rx: None,
                last_speed_tick: None,
            }),
        }
    }

    /// Adjust the left/right bias applied before motor command computation.
    /// Takes effect on the next speed translation.
    pub fn update_drivetrim(&self, delta: f64) {
        let mut inner = self.inner.lock();
        inner.trim += delta;
        debug!("Drive trim now {:+.3}", inner.trim);
    }

    /// Current accumulated trim bias.
    pub fn drivetrim(&self) -> f64 {
        self.inner.lock().trim
    }

    /// Engage or release the software estop.
    ///
    /// Engaging forces every controller through its estop branch and puts a
    /// neutral-motors frame on the wire immediately; any speed command racing
    /// this call observes the flag and also emits neutral.
    pub fn translate_send_estop(&self, active: bool) {
        let inner = &mut *self.inner.lock();
        inner.estop = active;
        if !active {
            info!("Estop released");
            return;
        }

        info!("Estop engaged, forcing neutral");
        let build = inner.status.firmware_build;
        for ctrl in &mut inner.controllers {
            ctrl.run(true, ctrl.use_control(), 0.0, 0.0, 0.0, build);
        }
        inner.motor_speeds = [MOTOR_NEUTRAL as u8; PRO_MOTOR_COUNT];
        send_frame(inner, CommandKind::Drive, 0);
    }

    /// Translate one commanded velocity per motor into a drive frame.
    ///
    /// The first call only establishes the controller time base (dt is not
    /// yet defined) and emits the previous command.
    pub fn translate_send_speed(&self, velocities: [f64; PRO_MOTOR_COUNT]) {
        let inner = &mut *self.inner.lock();

        if inner.estop {
            // Estop wins over any speed command still arriving
            inner.motor_speeds = [MOTOR_NEUTRAL as u8; PRO_MOTOR_COUNT];
            send_frame(inner, CommandKind::Drive, 0);
            return;
        }

        let now = Instant::now();
        let dt = inner
            .last_speed_tick
            .map(|t| (now - t).as_secs_f64())
            .unwrap_or(0.0);
        inner.last_speed_tick = Some(now);

        let mut commanded = velocities;
        commanded[0] += inner.trim;
        commanded[1] -= inner.trim;

        let measured = measured_velocities(&inner.status);
        let build = inner.status.firmware_build;
        for i in 0..PRO_MOTOR_COUNT {
            let ctrl = &mut inner.controllers[i];
            let v = commanded[i].clamp(-ctrl.max_velocity(), ctrl.max_velocity());
            inner.motor_speeds[i] = ctrl.run(false, ctrl.use_control(), v, measured[i], dt, build);
            trace!("Motor {} control state: {:?}", i, ctrl.diagnostics());
        }

        send_frame(inner, CommandKind::Drive, 0);
    }

    /// Put status element requests on the wire and return the most recently
    /// decoded snapshot (the default "unknown" record until the robot has
    /// answered at least once).
    pub fn translate_send_robot_status_request(&self) -> StatusData {
        let inner = &mut *self.inner.lock();
        for element in STATUS_ELEMENTS {
            send_frame(inner, CommandKind::DataRequest, element as i32);
        }
        inner.status
    }

    /// Same pattern as the status request, for the identity elements.
    pub fn translate_send_robot_info_request(&self) -> RobotInfo {
        let inner = &mut *self.inner.lock();
        for element in INFO_ELEMENTS {
            send_frame(inner, CommandKind::DataRequest, element as i32);
        }
        inner.info
    }

    /// Response intake: feed raw transport bytes through the codec and fold
    /// decoded records into the cached snapshots.
    pub fn unpack_comm_response(&self, bytes: &[u8]) {
        let inner = &mut *self.inner.lock();
        ingest(inner, bytes);
    }

    /// Polling variant of the inbound path: drain whatever the transport has.
    pub fn poll_comm(&self) {
        let inner = &mut *self.inner.lock();
        let bytes = match inner.comm.as_mut() {
            Some(comm) => match comm.read_available() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Transport read failed, marking disconnected: {}", e);
                    inner.comm = None;
                    return;
                }
            },
            None => return,
        };
        if !bytes.is_empty() {
            ingest(inner, &bytes);
        }
    }

    /// Whether the transport is open and the robot has answered recently.
    /// A disconnected device is a normal, reportable state.
    pub fn is_connected(&self) -> bool {
        let inner = self.inner.lock();
        let open = inner.comm.as_ref().is_some_and(|c| c.is_open());
        match inner.last_rx {
            Some(at) => open && at.elapsed() < COMM_TIMEOUT,
            None => open,
        }
    }

    /// Bind the transport to a device. Rebinding while a transport is bound
    /// is reported, not attempted; commands may be in flight on it.
    pub fn register_comm_base(&self, device: &str) -> Result<(), ProtocolError> {
        let inner = &mut *self.inner.lock();
        if inner.comm.is_some() {
            return Err(ProtocolError::RebindWhileBound);
        }
        inner.comm = Some(open_transport(inner.kind, device)?);
        inner.last_rx = None;
        info!("Pro protocol rebound to {}", device);
        Ok(())
    }
}

/// Frame the staged motor bytes plus command parameters and hand the frame to
/// the transport. Write failures are absorbed: the handle is dropped and
/// `is_connected` turns false.
fn send_frame(inner: &mut ProInner, kind: CommandKind, arg: i32) {
    let frame = match inner.codec.encode_command(inner.motor_speeds, kind, arg) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping command: {}", e);
            return;
        }
    };

    let Some(comm) = inner.comm.as_mut() else {
        trace!("No transport bound, dropping frame");
        return;
    };
    if let Err(e) = comm.write(&frame) {
        warn!("Transport write failed, marking disconnected: {}", e);
        inner.comm = None;
    }
}

fn ingest(inner: &mut ProInner, bytes: &[u8]) {
    let records = inner.codec.feed(bytes);
    if records.is_empty() {
        return;
    }
    inner.last_rx = Some(Instant::now());
    for record in &records {
        apply_record(&mut inner.status, &mut inner.info, record);
    }
    debug!("Ingested {} telemetry records", records.len());
}

/// Wheel-surface velocity (m/s) per motor from reported RPM.
fn measured_velocities(status: &StatusData) -> [f64; PRO_MOTOR_COUNT] {
    status.motor_rpms.map(|rpm| rpm * WHEEL_CIRCUMFERENCE / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn pro_on_mock() -> (ProProtocol, MockTransport) {
        let mock = MockTransport::new();
        let pro = ProProtocol::from_transport(Box::new(mock.clone()));
        (pro, mock)
    }

    fn frames(bytes: &[u8]) -> Vec<&[u8]> {
        bytes.chunks(7).collect()
    }

    #[test]
    fn estop_sends_neutral_frame_and_wins_over_speed() {
        let (pro, mock) = pro_on_mock();

        pro.translate_send_estop(true);
        let written = mock.written();
        let frame = frames(&written)[0];
        assert_eq!(frame[0], 253);
        assert_eq!(&frame[1..4], &[125, 125, 125]);

        // A speed command arriving after estop must still emit neutral
        mock.clear_written();
        pro.translate_send_speed([2.0, 2.0, 0.0]);
        let written = mock.written();
        let frame = frames(&written)[0];
        assert_eq!(&frame[1..4], &[125, 125, 125]);
    }

    #[test]
    fn speed_commands_flow_again_after_estop_release() {
        let (pro, mock) = pro_on_mock();

        pro.translate_send_estop(true);
        pro.translate_send_estop(false);
        mock.clear_written();

        // First call establishes the time base, second one controls
        pro.translate_send_speed([1.0, 1.0, 0.0]);
        std::thread::sleep(std::time::Duration::from_millis(20));
        pro.translate_send_speed([1.0, 1.0, 0.0]);

        let written = mock.written();
        let all = frames(&written);
        let last = all.last().unwrap();
        assert!(last[1] > 125, "left motor should push forward");
        assert!(last[2] > 125, "right motor should push forward");
    }

    #[test]
    fn status_request_returns_unknown_until_a_response_decodes() {
        let (pro, mock) = pro_on_mock();

        assert_eq!(
            pro.translate_send_robot_status_request(),
            StatusData::default()
        );

        // Robot answers the battery element; poll path decodes it
        let codec = ProFrameCodec::new(PRO_FRAME_LAYOUT);
        mock.queue_response(&codec.encode_response(DataElement::BatteryVoltage as u8, 162));
        pro.poll_comm();

        let status = pro.translate_send_robot_status_request();
        assert_eq!(status.battery_voltage, 16.2);
    }

    #[test]
    fn status_request_frames_carry_the_data_request_kind() {
        let (pro, mock) = pro_on_mock();
        pro.translate_send_robot_status_request();

        let written = mock.written();
        let all = frames(&written);
        assert_eq!(all.len(), STATUS_ELEMENTS.len());
        for frame in all {
            assert_eq!(frame[4], CommandKind::DataRequest as u8);
        }
    }

    #[test]
    fn info_request_caches_identity_records() {
        let (pro, _mock) = pro_on_mock();

        let codec = ProFrameCodec::new(PRO_FRAME_LAYOUT);
        let mut bytes = codec.encode_response(DataElement::BuildNumber as u8, 10207);
        bytes.extend_from_slice(&codec.encode_response(DataElement::RobotModel as u8, 2));
        pro.unpack_comm_response(&bytes);

        let info = pro.translate_send_robot_info_request();
        assert_eq!(info.firmware_build, 10207);
        assert_eq!(info.model, 2);
        assert_eq!(info.firmware_version(), (1, 2, 7));
    }

    #[test]
    fn trim_accumulates() {
        let (pro, _mock) = pro_on_mock();
        pro.update_drivetrim(0.05);
        pro.update_drivetrim(-0.02);
        assert!((pro.drivetrim() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn write_failure_is_absorbed_as_disconnected() {
        let (pro, mock) = pro_on_mock();
        assert!(pro.is_connected());

        mock.fail_writes(true);
        pro.translate_send_estop(true);

        assert!(!pro.is_connected());
        // Safety path stays callable while disconnected
        pro.translate_send_estop(true);
        pro.translate_send_speed([1.0, 0.0, 0.0]);
    }

    #[test]
    fn rebind_while_bound_is_reported() {
        let (pro, _mock) = pro_on_mock();
        assert!(matches!(
            pro.register_comm_base("/dev/ttyUSB1"),
            Err(ProtocolError::RebindWhileBound)
        ));
    }
}
