// Per-motor velocity controller
//
// One instance per driven motor. Each tick takes the commanded and measured
// velocity plus elapsed time and produces a bounded actuator command in the
// 0..=250 space (125 = neutral). The estop branch is evaluated before any
// control branch on every tick and unconditionally forces neutral.

use crate::config::{MAX_VELOCITY, MOTOR_DEADBAND, MOTOR_NEUTRAL};

/// Firmware builds reporting 1.00.xx use the old 2-tap measurement blend
const LEGACY_FILTER_BUILD: i32 = 100;

/// Commanded-zero settle threshold on the filtered velocity (m/s)
const STOP_VELOCITY_THRESHOLD: f64 = 0.3;

/// PID tuning triple. Supplied at construction and not mutated by the
/// controller itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Controller internals snapshot for telemetry logging.
#[derive(Debug, Clone, Copy)]
pub struct ControlDiagnostics {
    pub velocity_commanded: f64,
    pub velocity_measured: f64,
    pub velocity_filtered: f64,
    pub velocity_error: f64,
    pub integral_error: f64,
    pub differential_error: f64,
    pub motor_speed: i32,
}

/// Closed-loop velocity controller for a single motor.
pub struct OdomControl {
    // Configuration
    motor_max: i32,
    motor_min: i32,
    motor_deadband: i32,
    max_accel_cutoff: f64,
    min_velocity: f64,
    max_velocity: f64,
    gains: PidGains,
    use_control: bool,

    // Velocity histories, newest first. Lengths are invariant for the life of
    // the controller: the derivative term reads [0] and [1], the acceleration
    // limit reads [0], the low-pass blend reads [0]..=[3].
    filtered_history: [f64; 5],
    raw_history: [f64; 3],

    // Running state
    velocity_error: f64,
    integral_error: f64,
    differential_error: f64,
    velocity_commanded: f64,
    velocity_measured: f64,
    velocity_filtered: f64,
    motor_speed: i32,
    at_max_motor_speed: bool,
    at_min_motor_speed: bool,
    stop_integrating: bool,
}

impl OdomControl {
    pub fn new(use_control: bool, gains: PidGains, max: i32, min: i32) -> Self {
        Self {
            motor_max: max,
            motor_min: min,
            motor_deadband: MOTOR_DEADBAND,
            max_accel_cutoff: 5.0,
            min_velocity: 0.03,
            max_velocity: MAX_VELOCITY,
            gains,
            use_control,
            filtered_history: [0.0; 5],
            raw_history: [0.0; 3],
            velocity_error: 0.0,
            integral_error: 0.0,
            differential_error: 0.0,
            velocity_commanded: 0.0,
            velocity_measured: 0.0,
            velocity_filtered: 0.0,
            motor_speed: MOTOR_NEUTRAL,
            at_max_motor_speed: false,
            at_min_motor_speed: false,
            stop_integrating: false,
        }
    }

    /// One control tick.
    ///
    /// `firmware_build` is the robot's aabbcc build number; only the aabb part
    /// selects the measurement filter, the patch field is ignored.
    ///
    /// A tick with `dt <= 0` performs no filtering or control and re-emits the
    /// last command; estop still wins on such a tick.
    pub fn run(
        &mut self,
        e_stop_on: bool,
        control_on: bool,
        commanded_vel: f64,
        measured_vel: f64,
        dt: f64,
        firmware_build: i32,
    ) -> u8 {
        self.velocity_commanded = commanded_vel;
        self.velocity_measured = measured_vel;

        if dt > 0.0 {
            let build_trunc = firmware_build / 100;
            self.velocity_filtered = self.filter(measured_vel, dt, build_trunc);
        }

        // Estop is checked before every other branch, unconditionally.
        if e_stop_on {
            self.reset();
            return MOTOR_NEUTRAL as u8;
        }

        if dt <= 0.0 {
            return self.motor_speed as u8;
        }

        // If stopping, settle to neutral once the wheel has actually slowed.
        if commanded_vel == 0.0 && self.velocity_filtered.abs() < STOP_VELOCITY_THRESHOLD {
            self.integral_error = 0.0;
            if self.has_zero_history() {
                self.motor_speed = MOTOR_NEUTRAL;
                return MOTOR_NEUTRAL as u8;
            }
        }

        if control_on {
            self.velocity_error = commanded_vel - self.velocity_filtered;
            self.motor_speed = self.pid(self.velocity_error, dt);
        } else {
            self.motor_speed = self.feed_through();
        }

        self.motor_speed = self.bound_motor_speed(self.motor_speed);
        self.motor_speed as u8
    }

    /// Clear all control state back to neutral.
    pub fn reset(&mut self) {
        self.integral_error = 0.0;
        self.velocity_error = 0.0;
        self.velocity_commanded = 0.0;
        self.velocity_measured = 0.0;
        self.velocity_filtered = 0.0;
        self.filtered_history = [0.0; 5];
        self.motor_speed = MOTOR_NEUTRAL;
    }

    /// Push a command further from neutral to overcome static friction.
    ///
    /// Not applied inside `run`; callers opt in per command. A command exactly
    /// at neutral is returned unchanged.
    pub fn deadband_offset(&self, motor_speed: i32) -> i32 {
        if motor_speed > MOTOR_NEUTRAL {
            motor_speed + self.motor_deadband
        } else if motor_speed < MOTOR_NEUTRAL {
            motor_speed - self.motor_deadband
        } else {
            motor_speed
        }
    }

    /// Largest commanded velocity (m/s) this controller is tuned for; the
    /// command boundary clamps into this envelope.
    pub fn max_velocity(&self) -> f64 {
        self.max_velocity
    }

    /// Whether this controller was configured for closed-loop control.
    pub fn use_control(&self) -> bool {
        self.use_control
    }

    /// Snapshot the loop internals for a telemetry trace.
    pub fn diagnostics(&self) -> ControlDiagnostics {
        ControlDiagnostics {
            velocity_commanded: self.velocity_commanded,
            velocity_measured: self.velocity_measured,
            velocity_filtered: self.velocity_filtered,
            velocity_error: self.velocity_error,
            integral_error: self.integral_error,
            differential_error: self.differential_error,
            motor_speed: self.motor_speed,
        }
    }

    /// Whether the last tick clamped the command at the top of the range.
    pub fn at_max_motor_speed(&self) -> bool {
        self.at_max_motor_speed
    }

    /// Whether the last tick clamped the command at the bottom of the range.
    pub fn at_min_motor_speed(&self) -> bool {
        self.at_min_motor_speed
    }

    fn pid(&mut self, error: f64, dt: f64) -> i32 {
        let p_val = self.gains.kp * error;
        let i_val = self.integrate(error, dt);
        let d_val = self.differentiate(dt);
        let pid_val = p_val + i_val + d_val;

        // Freeze integration while the output is saturated past half range,
        // otherwise the integral winds up against the clamp.
        self.stop_integrating = pid_val.abs() > f64::from(self.motor_max) / 2.0;

        (pid_val + f64::from(MOTOR_NEUTRAL)).round() as i32
    }

    fn integrate(&mut self, error: f64, dt: f64) -> f64 {
        if !self.stop_integrating {
            self.integral_error += error * dt;
        }
        self.gains.ki * self.integral_error
    }

    fn differentiate(&mut self, dt: f64) -> f64 {
        self.differential_error = (self.filtered_history[0] - self.filtered_history[1]) / dt;
        self.gains.kd * self.differential_error
    }

    /// Open-loop mapping of commanded velocity into the command space.
    fn feed_through(&self) -> i32 {
        ((self.velocity_commanded + f64::from(MOTOR_NEUTRAL)).round() as i32) % self.motor_max
    }

    /// Measurement filter. Runs every tick, even under estop, so the history
    /// stays warm across an estop window.
    fn filter(&mut self, velocity: f64, dt: f64, build_trunc: i32) -> f64 {
        let accel = (velocity - self.filtered_history[0]) / dt;
        push_front(&mut self.raw_history, velocity);

        if build_trunc == LEGACY_FILTER_BUILD {
            self.velocity_filtered = 0.9 * velocity + 0.1 * self.filtered_history[0];
        } else {
            // An impossible acceleration means a bad measurement; cap the
            // input at what moving at the cutoff rate for this tick allows.
            let mut velocity = velocity;
            if accel > self.max_accel_cutoff {
                velocity = self.filtered_history[0] + 0.5 * dt * self.max_accel_cutoff;
            } else if accel < -self.max_accel_cutoff {
                velocity = self.filtered_history[0] - 0.5 * dt * self.max_accel_cutoff;
            }

            self.velocity_filtered = 0.10 * velocity
                + 0.25 * self.filtered_history[0]
                + 0.30 * self.filtered_history[1]
                + 0.25 * self.filtered_history[2]
                + 0.10 * self.filtered_history[3];
        }

        push_front(&mut self.filtered_history, self.velocity_filtered);
        self.velocity_filtered
    }

    /// The wheel has effectively stopped when the recent raw measurements
    /// average below the minimum meaningful velocity.
    fn has_zero_history(&self) -> bool {
        let avg = self.raw_history.iter().map(|v| v.abs()).sum::<f64>()
            / self.raw_history.len() as f64;
        avg < self.min_velocity
    }

    fn bound_motor_speed(&mut self, motor_speed: i32) -> i32 {
        self.at_max_motor_speed = false;
        self.at_min_motor_speed = false;

        let mut bounded = motor_speed;
        if bounded > self.motor_max {
            bounded = self.motor_max;
            self.at_max_motor_speed = true;
        }
        if bounded < self.motor_min {
            bounded = self.motor_min;
            self.at_min_motor_speed = true;
        }
        bounded
    }
}

/// Insert at the front, dropping the oldest entry. O(1) allocation-free;
/// history length never changes.
fn push_front(history: &mut [f64], value: f64) {
    history.rotate_right(1);
    history[0] = value;
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.1;

    fn controller(gains: PidGains) -> OdomControl {
        OdomControl::new(true, gains, 250, 0)
    }

    fn p_only() -> OdomControl {
        controller(PidGains {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
        })
    }

    #[test]
    fn estop_returns_neutral_and_resets() {
        let mut ctrl = p_only();

        // Build up some state first
        for _ in 0..5 {
            ctrl.run(false, true, 1.0, 0.2, DT, 0);
        }
        assert!(ctrl.integral_error != 0.0);

        let cmd = ctrl.run(true, true, 1.0, 0.2, DT, 0);
        assert_eq!(cmd, 125);
        assert_eq!(ctrl.integral_error, 0.0);
        assert_eq!(ctrl.velocity_error, 0.0);
        assert_eq!(ctrl.motor_speed, MOTOR_NEUTRAL);
        assert_eq!(ctrl.filtered_history, [0.0; 5]);
    }

    #[test]
    fn estop_is_idempotent() {
        let mut ctrl = p_only();
        for _ in 0..3 {
            ctrl.run(false, true, 2.0, 0.5, DT, 0);
        }

        let first = ctrl.run(true, true, 2.0, 0.5, DT, 0);
        let integral_after_first = ctrl.integral_error;
        let second = ctrl.run(true, true, 2.0, 0.5, DT, 0);

        assert_eq!(first, 125);
        assert_eq!(second, 125);
        assert_eq!(integral_after_first, ctrl.integral_error);
        assert_eq!(ctrl.filtered_history, [0.0; 5]);
    }

    #[test]
    fn history_lengths_are_fixed() {
        let mut ctrl = p_only();
        for i in 0..100 {
            let estop = i % 7 == 0;
            ctrl.run(estop, true, 0.5, 0.1 * (i % 3) as f64, DT, 0);
            assert_eq!(ctrl.filtered_history.len(), 5);
            assert_eq!(ctrl.raw_history.len(), 3);
        }
    }

    #[test]
    fn feed_through_extreme_command_stays_bounded() {
        let mut ctrl = OdomControl::new(
            false,
            PidGains {
                kp: 0.0,
                ki: 0.0,
                kd: 0.0,
            },
            250,
            0,
        );

        let cmd = ctrl.run(false, false, 1000.0, 0.0, DT, 0);
        assert!((0..=250).contains(&i32::from(cmd)));

        let cmd = ctrl.run(false, false, -1000.0, 0.0, DT, 0);
        assert!((0..=250).contains(&i32::from(cmd)));
    }

    #[test]
    fn feed_through_maps_small_commands_near_neutral() {
        let mut ctrl = OdomControl::new(
            false,
            PidGains {
                kp: 0.0,
                ki: 0.0,
                kd: 0.0,
            },
            250,
            0,
        );

        let cmd = ctrl.run(false, false, 3.0, 0.0, DT, 0);
        assert_eq!(cmd, 128);
    }

    #[test]
    fn integral_freezes_while_saturated() {
        let mut ctrl = controller(PidGains {
            kp: 0.0,
            ki: 100.0,
            kd: 0.0,
        });

        // Constant error of 1.0 m/s; integral grows by 0.1 per tick until the
        // combined output passes half range (125), then must freeze.
        let mut frozen_value = None;
        for _ in 0..30 {
            ctrl.run(false, true, 1.0, 0.0, DT, 0);
            if ctrl.stop_integrating {
                let value = frozen_value.get_or_insert(ctrl.integral_error);
                assert_eq!(*value, ctrl.integral_error);
            }
        }
        assert!(frozen_value.is_some(), "saturation never froze integration");
    }

    #[test]
    fn converges_toward_forward_command() {
        let mut ctrl = p_only();

        let mut prev = 125u8;
        for _ in 0..10 {
            let cmd = ctrl.run(false, true, 1.0, 0.0, DT, 0);
            assert!(cmd > 125, "command {} did not move forward", cmd);
            assert!(cmd <= 250);
            assert!(cmd >= prev, "command moved away from the setpoint");
            prev = cmd;
        }
    }

    #[test]
    fn stop_settles_to_neutral() {
        let mut ctrl = p_only();

        // Spin up against a real measurement first
        for _ in 0..10 {
            ctrl.run(false, true, 1.0, 0.8, DT, 0);
        }

        // Commanded zero while the wheel coasts down
        let mut measured = 0.8;
        let mut last = 0u8;
        for _ in 0..20 {
            last = ctrl.run(false, true, 0.0, measured, DT, 0);
            measured *= 0.4;
        }
        assert_eq!(last, 125);

        // And it stays there
        for _ in 0..5 {
            assert_eq!(ctrl.run(false, true, 0.0, 0.0, DT, 0), 125);
        }
    }

    #[test]
    fn legacy_firmware_uses_two_tap_blend() {
        let mut ctrl = p_only();

        // 1.00.07 truncates to 100 and takes the legacy blend; one tick from
        // rest must pass 90% of the measurement through.
        ctrl.run(false, true, 0.0, 1.0, DT, 10007);
        assert!((ctrl.velocity_filtered - 0.9).abs() < 1e-12);
    }

    #[test]
    fn acceleration_cutoff_limits_filter_input() {
        let mut ctrl = p_only();

        // A 1.0 m/s jump in 0.1 s is 10 m/s^2, past the 5.0 cutoff; the blend
        // input gets capped at 0.5 * dt * cutoff = 0.25, so the filtered value
        // is 0.10 * 0.25 = 0.025.
        ctrl.run(false, true, 0.0, 1.0, DT, 0);
        assert!((ctrl.velocity_filtered - 0.025).abs() < 1e-12);
    }

    #[test]
    fn dt_zero_is_a_noop_tick() {
        let mut ctrl = p_only();
        let before = ctrl.run(false, true, 1.0, 0.0, DT, 0);
        let history = ctrl.filtered_history;

        let cmd = ctrl.run(false, true, 5.0, 3.0, 0.0, 0);
        assert_eq!(cmd, before);
        assert_eq!(ctrl.filtered_history, history);

        // Estop still wins on a zero-dt tick
        assert_eq!(ctrl.run(true, true, 5.0, 3.0, 0.0, 0), 125);
    }

    #[test]
    fn bounding_reports_which_limit_was_hit() {
        let mut ctrl = controller(PidGains {
            kp: 1000.0,
            ki: 0.0,
            kd: 0.0,
        });

        let cmd = ctrl.run(false, true, 3.0, 0.0, DT, 0);
        assert_eq!(cmd, 250);
        assert!(ctrl.at_max_motor_speed());
        assert!(!ctrl.at_min_motor_speed());

        let cmd = ctrl.run(false, true, -3.0, 0.0, DT, 0);
        assert_eq!(cmd, 0);
        assert!(ctrl.at_min_motor_speed());
        assert!(!ctrl.at_max_motor_speed());
    }

    #[test]
    fn deadband_offset_pushes_away_from_neutral() {
        let ctrl = p_only();
        assert_eq!(ctrl.deadband_offset(130), 139);
        assert_eq!(ctrl.deadband_offset(120), 111);
        assert_eq!(ctrl.deadband_offset(125), 125);
    }
}
