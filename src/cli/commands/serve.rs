//! Web server command.

use std::net::SocketAddr;

use anyhow::Context;
use console::style;

use kycscan::config::{Settings, DEFAULT_BIND};
use kycscan::extract::SchemaCatalog;
use kycscan::server::AppState;

/// Start the web server.
pub async fn cmd_serve(settings: Settings, catalog: SchemaCatalog, bind: &str) -> anyhow::Result<()> {
    let addr = parse_bind_address(bind)?;

    if settings.api_key.is_none() {
        println!(
            "{} {} is not set; extraction requests will fail until it is",
            style("!").yellow(),
            settings.api_key_env
        );
    }

    let state = AppState::from_settings(settings, catalog)?;

    println!("{} Starting kycscan server at http://{}", style("→").cyan(), addr);
    println!("  Press Ctrl+C to stop");

    kycscan::server::serve(state, addr).await
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:3030
/// - Host and port: "0.0.0.0:3030" -> 0.0.0.0:3030
fn parse_bind_address(bind: &str) -> anyhow::Result<SocketAddr> {
    let default_port = DEFAULT_BIND
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .unwrap_or(3030);

    // Try parsing as just a port number
    if let Ok(port) = bind.parse::<u16>() {
        return Ok(SocketAddr::from(([127, 0, 0, 1], port)));
    }

    // Try parsing as host:port
    if let Ok(addr) = bind.parse::<SocketAddr>() {
        return Ok(addr);
    }

    // Must be just a host, use default port
    format!("{}:{}", bind, default_port)
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind))
}
