use amethyst_log::AmethystLogger;
use clap::Parser;
use log::{error, info, logger, Level};
use raknet::RakNetServerConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use tokio::time::Instant;

pub mod config;
pub mod listener;

use listener::RakNetListener;

#[derive(Parser, Debug)]
#[command(name = "amethyst", about = "A RakNet session core for MCPE 0.12.x")]
struct Cli {
    /// Raise the log level to debug.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.debug { Level::Debug } else { Level::Info };
    AmethystLogger::init(level).expect("logger already initialized");

    let start_time = Instant::now();

    let config = match config::handle() {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let bind_addr = SocketAddr::from_str(&config.network.address)
        .expect("config.validate() already rejected an unparsable bind address");

    let server_guid: u64 = rand::random();
    let advertisement = format!(
        "MCPE;{};{};0.12;0;{};{}",
        config.server.name, raknet::consts::RAKNET_PROTOCOL_VERSION, config.server.max_players, server_guid
    )
    .into_bytes();

    let mut server_config = RakNetServerConfig::new(server_guid, config.raknet.max_connections, advertisement);
    server_config.mtu_ceiling = config.raknet.mtu_ceiling;
    if let Err(e) = server_config.validate() {
        error!("invalid raknet configuration: {e}");
        std::process::exit(1);
    }

    info!(
        "{} loaded in {:.2}s, guid={:#x}",
        config.server.name,
        start_time.elapsed().as_secs_f64(),
        server_guid
    );

    let listener = match RakNetListener::bind(bind_addr, server_config).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {bind_addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = listener.run().await {
        error!("listener terminated: {e}");
    }
    logger().flush();
}
