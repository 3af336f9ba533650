//! `parley status`: Show configuration and provider status.

use parley_config::AppConfig;
use parley_core::provider::Provider;
use parley_memory::ContextStore;
use parley_providers::OpenAiCompatProvider;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("parley status");
    println!("=============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  API URL:      {}", config.api_url);
    println!("  Model:        {}", config.model);
    println!("  Temperature:  {}", config.llm.temperature);
    println!("  Max tokens:   {}", config.llm.max_tokens);
    println!("  Window:       {} exchange(s)", config.agent.context_window);
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  Code exec:    {}",
        if config.tools.allow_code_execution { "ENABLED (unsandboxed)" } else { "disabled" }
    );

    let state_file = config.storage.state_file();
    let store = ContextStore::new();
    if store.load_from(&state_file) {
        println!("  History:      {} exchange(s) in {}", store.len(), state_file.display());
    } else {
        println!("  History:      none saved");
    }

    let provider = OpenAiCompatProvider::from_config(config);
    println!();
    if !provider.is_configured() {
        println!("  Provider:     not initialized (no API key)");
        return Ok(());
    }
    match provider.health_check().await {
        Ok(true) => println!("  Provider:     reachable"),
        Ok(false) => println!("  Provider:     responded with an error"),
        Err(e) => println!("  Provider:     unreachable ({e})"),
    }

    Ok(())
}
