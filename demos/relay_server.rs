//! Relay server example
//!
//! Run with: cargo run --example relay_server [PORT]
//!
//! Environment:
//!   RELAY_KEY, RELAY_SALT   enable encrypted relay links when both are set
//!   ICE_SERVERS             comma separated list, e.g. stun:stun.l.google.com:19302
//!
//! Examples:
//!   cargo run --example relay_server                            # port 5000, plain
//!   RELAY_KEY=k RELAY_SALT=s cargo run --example relay_server   # encrypted
//!
//! Reaped sessions are printed as the liveness monitor reports them.

use rtc_relay::{RelayServer, ServerConfig};

fn print_usage() {
    eprintln!("Usage: relay_server [PORT]");
    eprintln!();
    eprintln!("Environment: RELAY_KEY, RELAY_SALT, ICE_SERVERS");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let port = match args.get(1) {
        Some(port) => match port.parse::<u16>() {
            Ok(port) => port,
            Err(e) => {
                eprintln!("Error: invalid port '{}': {}", port, e);
                print_usage();
                std::process::exit(1);
            }
        },
        None => rtc_relay::server::config::DEFAULT_PORT,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtc_relay=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let ice_servers: Vec<String> = std::env::var("ICE_SERVERS")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let mut config = ServerConfig::with_port(port).ice_servers(ice_servers);
    if let (Ok(key), Ok(salt)) = (std::env::var("RELAY_KEY"), std::env::var("RELAY_SALT")) {
        config = config.crypto(key, salt);
    }

    let server = RelayServer::init(config).await?;
    println!(
        "Relay listening on {} ({})",
        server.local_addr(),
        if server.is_encrypted() { "encrypted" } else { "plain" }
    );

    let mut reaped = server
        .take_clean_channel()
        .ok_or("cleanup channel already taken")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
            session = reaped.recv() => match session {
                Some(session) => println!("Session ended: {}", session),
                None => break,
            },
        }
    }

    server.close().await;
    Ok(())
}
