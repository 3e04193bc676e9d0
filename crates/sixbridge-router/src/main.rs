use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sixbridge_interfaces::{DeviceSerial, SerialConfig, TunConfig, TunInterface};
use sixbridge_router::{BorderRouter, RouterConfig, parse_suffix, router_address};

#[derive(Parser)]
#[command(
    name = "border_router",
    about = "6LoWPAN border router for a node attached over a serial line"
)]
struct Cli {
    /// Last 16 bits of the node address, in hex (e.g. `2a` or `0x1234`)
    #[arg(value_parser = parse_suffix)]
    node_suffix: u16,

    /// Name of the TUN interface to create
    tun_if: String,

    /// Serial device the node is attached to
    serial_device: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match RouterConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => RouterConfig::default(),
    };

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        sixbridge_router::logging::init_json(&config.logging.level);
    } else {
        sixbridge_router::logging::init(&config.logging.level);
    }

    let mut serial_config = SerialConfig::new(&cli.serial_device);
    serial_config.baud_rate = config.serial.baud_rate;
    let serial = match DeviceSerial::open(serial_config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to open {}: {e}", cli.serial_device.display());
            std::process::exit(1);
        }
    };
    let tun = TunInterface::new(TunConfig::new(&cli.tun_if));

    let addr = router_address(cli.node_suffix);
    let router = match BorderRouter::new(config, addr, serial, tun) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            tracing::error!("failed to create border router: {e}");
            std::process::exit(1);
        }
    };

    // Spawn signal handler
    let handle = Arc::clone(&router);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received SIGINT, shutting down");
        handle.request_shutdown();
    });

    if let Err(e) = router.initialize().await {
        tracing::error!("failed to start border router: {e}");
        std::process::exit(1);
    }

    router.stopped().await;
    router.shutdown().await;
}
