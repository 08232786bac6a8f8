//! Example: LAN Host Discovery
//!
//! Starts a discovery responder that answers with a small server
//! description, then looks for it the way a client on the LAN would.
//!
//! Run with: `cargo run --example lan_discovery`
//! Pass `server` or `client` to run only one side, e.g. on two machines:
//! `cargo run --example lan_discovery -- server`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use netwire::config::{DiscoveryConfig, DiscoveryMode, LoggingConfig};
use netwire::core::serialization::{JsonCodec, Payload};
use netwire::discovery::{DiscoveryRequester, DiscoveryResponder, ExpectPayload, ReplyWith};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ServerAnnouncement {
    id: i32,
    game_name: String,
    player_name: String,
}

impl Payload for ServerAnnouncement {
    const TYPE_TAG: &'static str = "demo.ServerAnnouncement";
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    netwire::utils::logging::init_logging(&LoggingConfig::default())?;

    let role = std::env::args().nth(1).unwrap_or_else(|| "both".to_string());
    let mut config = DiscoveryConfig {
        mode: DiscoveryMode::CollectAll,
        ..Default::default()
    };

    match role.as_str() {
        "server" => {
            let handle = start_server(&config).await?;
            println!("Answering discovery requests on {}", handle.local_addr());
            println!("Press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            handle.stop().await?;
        }
        "client" => find_servers(config).await?,
        _ => {
            // Loopback only, so the demo works without a LAN
            config.broadcast_targets = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
            config.include_interface_broadcasts = false;
            config.bind_address = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

            let handle = start_server(&config).await?;
            find_servers(config).await?;
            handle.stop().await?;
        }
    }

    Ok(())
}

async fn start_server(
    config: &DiscoveryConfig,
) -> netwire::Result<netwire::discovery::ResponderHandle> {
    let handler = ReplyWith::new(|from: SocketAddr| {
        println!("Discovery request from {from}");
        Some(ServerAnnouncement {
            id: 42,
            game_name: "gameName".to_string(),
            player_name: "playerName".to_string(),
        })
    });

    DiscoveryResponder::from_config(config, JsonCodec::default(), handler)
        .await?
        .spawn()
}

async fn find_servers(config: DiscoveryConfig) -> netwire::Result<()> {
    let port = config.port;
    let requester = DiscoveryRequester::new(JsonCodec::default(), config);
    let mut handler = ExpectPayload::<ServerAnnouncement>::new();

    let hosts = requester
        .discover_hosts(port, Duration::from_millis(1500), &mut handler)
        .await?;

    if hosts.is_empty() {
        println!("No servers answered");
    }
    for (endpoint, announcement) in handler.received() {
        println!(
            "Found {} hosted by {} at {endpoint}",
            announcement.game_name, announcement.player_name
        );
    }

    requester.metrics().log_summary();
    Ok(())
}
