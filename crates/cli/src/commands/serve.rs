//! `toolbridge serve`: Start the HTTP chat gateway.

use std::path::Path;

use super::{CommandResult, load_config};

pub async fn run(
    explicit: Option<&Path>,
    port_override: Option<u16>,
    host_override: Option<String>,
) -> CommandResult {
    let mut config = load_config(explicit)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }

    println!("🔧 toolbridge gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Tool layer: {}", config.tools.base_url);
    println!("   Model:      {}", config.reasoning.model);

    toolbridge_gateway::start(config).await
}
