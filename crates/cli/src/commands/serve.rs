//! `parley serve`: Start the gateway.

use parley_config::AppConfig;

pub async fn run(mut config: AppConfig, port_override: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("parley gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:      {}", config.model);
    println!(
        "   Auth:       {}",
        if config.gateway.api_key.is_some() { "api key required" } else { "open" }
    );

    parley_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("Gateway failed: {e}"))
}
