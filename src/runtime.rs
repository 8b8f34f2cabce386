// 50 Hz loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. without it if teleop crashes and stops sending commands, the runtime would keep
// replaying the last velocity command at the robot forever

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, DEFAULT_PORT, LOOP_HZ, STATUS_REQUEST_TICKS, TOPIC_CMD_BASE, TOPIC_CMD_ESTOP,
    TOPIC_CMD_TRIM, TOPIC_HEALTH, TOPIC_STATUS,
};
use crate::messages::{BaseActuation, EstopCommand, MotorCommand, RuntimeHealth, TrimCommand};
use crate::protocol::{ProtocolObject, RobotFamily};
use crate::transport::TransportKind;

/// Which robot to bind and over what link
pub struct RuntimeOptions {
    pub device: String,
    pub family: RobotFamily,
    pub transport: TransportKind,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            device: DEFAULT_PORT.to_string(),
            family: RobotFamily::Pro,
            transport: TransportKind::Serial,
        }
    }
}

pub struct Runtime {
    latest_cmd: Option<MotorCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    fn on_command(&mut self, cmd: MotorCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Compute actuation based on watchdog state
    fn compute_actuation(&mut self, connected: bool) -> BaseActuation {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            BaseActuation::default() // Zero velocity
        } else if let Some(ref cmd) = self.latest_cmd {
            self.health = if connected {
                RuntimeHealth::Ok
            } else {
                RuntimeHealth::Disconnected
            };
            BaseActuation::from(cmd)
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            BaseActuation::default()
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run(options: RuntimeOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_estop = session.declare_subscriber(TOPIC_CMD_ESTOP).await?;
    let sub_trim = session.declare_subscriber(TOPIC_CMD_TRIM).await?;
    let pub_status = session.declare_publisher(TOPIC_STATUS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    // A robot that cannot be opened is a reportable state, not a crash:
    // fall back to the placeholder family and keep serving topics.
    let protocol = match ProtocolObject::new(options.family, &options.device, options.transport) {
        Ok(protocol) => protocol,
        Err(e) => {
            warn!(
                "Could not open {} ({}), falling back to the Zero family",
                options.device, e
            );
            ProtocolObject::new(RobotFamily::Zero, &options.device, options.transport)?
        }
    };

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let mut ticks: u64 = 0;

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}, {}", TOPIC_CMD_BASE, TOPIC_CMD_ESTOP, TOPIC_CMD_TRIM);
    info!("Publishing to: {}, {}", TOPIC_STATUS, TOPIC_HEALTH);

    loop {
        tick.tick().await;
        ticks += 1;

        // 1. Drain all pending velocity commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotorCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Estop and trim are rare; hand them to the protocol immediately
        while let Ok(Some(sample)) = sub_estop.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<EstopCommand>(&payload) {
                Ok(cmd) => {
                    info!("Estop command: active={}", cmd.active);
                    protocol.translate_send_estop(cmd.active);
                }
                Err(e) => warn!("Failed to parse estop: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_trim.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TrimCommand>(&payload) {
                Ok(cmd) => protocol.update_drivetrim(cmd.trim),
                Err(e) => warn!("Failed to parse trim: {}", e),
            }
        }

        // 3. Compute actuation (includes watchdog logic) and drive the motors
        let actuation = runtime.compute_actuation(protocol.is_connected());
        protocol.translate_send_speed(actuation.as_array());

        // 4. Drain inbound telemetry bytes
        protocol.poll_comm();

        // 5. Publish status and health
        if ticks % STATUS_REQUEST_TICKS == 0 {
            let status = protocol.translate_send_robot_status_request();
            pub_status.put(serde_json::to_string(&status)?).await?;
        }
        pub_health.put(serde_json::to_string(&runtime.health)?).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(left: f64, right: f64) -> MotorCommand {
        MotorCommand {
            left,
            right,
            flipper: 0.0,
        }
    }

    #[test]
    fn fresh_command_passes_through() {
        let mut runtime = Runtime::new();
        runtime.on_command(cmd(0.5, -0.5));

        let actuation = runtime.compute_actuation(true);
        assert_eq!(actuation.left, 0.5);
        assert_eq!(actuation.right, -0.5);
        assert_eq!(runtime.health, RuntimeHealth::Ok);
    }

    #[test]
    fn stale_command_zeroes_actuation() {
        let mut runtime = Runtime::new();
        runtime.on_command(cmd(0.5, 0.5));
        runtime.cmd_received_at = Instant::now() - 2 * CMD_TIMEOUT;

        let actuation = runtime.compute_actuation(true);
        assert_eq!(actuation.left, 0.0);
        assert_eq!(actuation.right, 0.0);
        assert_eq!(runtime.health, RuntimeHealth::CmdStale);
    }

    #[test]
    fn no_command_ever_received_is_stale() {
        let mut runtime = Runtime::new();
        let actuation = runtime.compute_actuation(true);
        assert_eq!(actuation.left, 0.0);
        assert_eq!(runtime.health, RuntimeHealth::CmdStale);
    }

    #[test]
    fn disconnected_robot_is_reported_but_still_actuated() {
        let mut runtime = Runtime::new();
        runtime.on_command(cmd(0.2, 0.2));

        let actuation = runtime.compute_actuation(false);
        assert_eq!(actuation.left, 0.2);
        assert_eq!(runtime.health, RuntimeHealth::Disconnected);
    }
}
