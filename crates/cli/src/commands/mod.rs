pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod doctor;

use std::sync::Arc;

use concierge_config::AppConfig;
use concierge_orchestrator::Assistant;

/// Load config and wire an assistant over the configured provider.
pub fn build_assistant() -> Result<(AppConfig, Assistant), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for an API key early and give a clear error
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CONCIERGE_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY    = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = concierge_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let registry = Arc::new(concierge_capabilities::default_registry());

    let assistant = Assistant::builder(provider, registry)
        .config(config.clone())
        .build();
    Ok((config, assistant))
}
