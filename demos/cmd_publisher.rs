// Keyboard teleop: W/S drive, A/D turn, Z/X flipper, SPACE estop, R/F speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::info;

use rover_zenoh_runtime::config::{TOPIC_CMD_BASE, TOPIC_CMD_ESTOP};

const SPEEDS: [f64; 3] = [0.3, 0.8, 1.5]; // m/s
const TURN_BIAS: f64 = 0.5; // fraction of speed shed on the inner wheel
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_cmd = session.declare_publisher(TOPIC_CMD_BASE).await?;
    let pub_estop = session.declare_publisher(TOPIC_CMD_ESTOP).await?;

    info!("Controls: W/S=drive, A/D=turn, Z/X=flipper, SPACE=estop toggle, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_cmd, &pub_estop).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_cmd: &zenoh::pubsub::Publisher<'_>,
    pub_estop: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut estop = false;

    // Persistent velocity state
    let mut drive = 0.0;
    let mut turn = 0.0;
    let mut flipper = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Drive - update velocity and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        drive = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        drive = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Turn by shedding speed on one side
                    KeyCode::Char('a') if pressed => {
                        turn = -TURN_BIAS * SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        turn = TURN_BIAS * SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Flipper
                    KeyCode::Char('z') if pressed => {
                        flipper = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        flipper = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Estop toggle
                    KeyCode::Char(' ') if pressed => {
                        estop = !estop;
                        info!("Estop: {}", if estop { "ENGAGED" } else { "released" });
                        pub_estop.put(json!({ "active": estop }).to_string()).await?;
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            drive = 0.0;
            turn = 0.0;
            flipper = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = json!({
            "left": drive + turn,
            "right": drive - turn,
            "flipper": flipper
        });
        pub_cmd.put(cmd.to_string()).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
