use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use rover_zenoh_runtime::config::DEFAULT_PORT;
use rover_zenoh_runtime::protocol::RobotFamily;
use rover_zenoh_runtime::runtime::{self, RuntimeOptions};
use rover_zenoh_runtime::transport::TransportKind;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FamilyArg {
    Pro,
    Zero,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Serial,
    Can,
}

/// Rover base driver runtime
#[derive(Parser)]
struct Args {
    /// Serial device or CAN interface of the robot's main board
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,

    /// Hardware family to speak
    #[arg(long, value_enum, default_value_t = FamilyArg::Pro)]
    family: FamilyArg,

    /// Link carrying the protocol
    #[arg(long, value_enum, default_value_t = TransportArg::Serial)]
    transport: TransportArg,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let options = RuntimeOptions {
        device: args.port,
        family: match args.family {
            FamilyArg::Pro => RobotFamily::Pro,
            FamilyArg::Zero => RobotFamily::Zero,
        },
        transport: match args.transport {
            TransportArg::Serial => TransportKind::Serial,
            TransportArg::Can => TransportKind::Can,
        },
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
