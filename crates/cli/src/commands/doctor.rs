//! `concierge doctor`: diagnose configuration and provider reachability.

use concierge_config::AppConfig;
use concierge_core::provider::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug)]
struct Check {
    status: Status,
    label: String,
}

impl Check {
    fn new(status: Status, label: impl Into<String>) -> Self {
        Self {
            status,
            label: label.into(),
        }
    }

    fn marker(&self) -> &'static str {
        match self.status {
            Status::Ok => "[ok]  ",
            Status::Warn => "[warn]",
            Status::Fail => "[fail]",
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Concierge Doctor: System Diagnostics");
    println!("====================================\n");

    let config_path = AppConfig::config_dir().join("config.toml");
    let mut checks = Vec::new();

    if !config_path.exists() {
        checks.push(Check::new(
            Status::Warn,
            format!("No config file at {}, using defaults", config_path.display()),
        ));
    }

    match AppConfig::load() {
        Ok(config) => {
            checks.push(Check::new(Status::Ok, "Configuration valid"));
            checks.extend(config_checks(&config));

            let router = concierge_providers::build_from_config(&config);
            match router.default() {
                Some(provider) => checks.push(provider_check(provider.as_ref()).await),
                None => checks.push(Check::new(Status::Fail, "No default provider configured")),
            }
        }
        Err(e) => checks.push(Check::new(Status::Fail, format!("Configuration invalid: {e}"))),
    }

    for check in &checks {
        println!("  {} {}", check.marker(), check.label);
    }

    let issues = checks.iter().filter(|c| c.status != Status::Ok).count();
    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

fn config_checks(config: &AppConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    if config.has_api_key() || config.default_provider == "ollama" {
        checks.push(Check::new(Status::Ok, "API key configured"));
    } else {
        checks.push(Check::new(
            Status::Fail,
            "No API key configured: set CONCIERGE_API_KEY or api_key in config.toml",
        ));
    }

    if config.memory.extraction_enabled {
        checks.push(Check::new(
            Status::Ok,
            format!(
                "Memory extraction on ({} concurrent)",
                config.memory.extraction_concurrency
            ),
        ));
    } else {
        checks.push(Check::new(Status::Warn, "Memory extraction disabled"));
    }

    checks
}

async fn provider_check(provider: &dyn Provider) -> Check {
    match provider.health_check().await {
        Ok(true) => Check::new(Status::Ok, format!("Provider '{}' reachable", provider.name())),
        Ok(false) => Check::new(
            Status::Fail,
            format!("Provider '{}' answered but refused the health check", provider.name()),
        ),
        Err(e) => Check::new(
            Status::Fail,
            format!("Provider '{}' unreachable: {e}", provider.name()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_core::error::ProviderError;
    use concierge_core::provider::{ProviderRequest, ProviderResponse};

    struct StubProvider {
        health: Result<bool, ProviderError>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("stub".into()))
        }

        async fn health_check(&self) -> Result<bool, ProviderError> {
            match &self.health {
                Ok(healthy) => Ok(*healthy),
                Err(e) => Err(ProviderError::Network(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn reachable_provider_passes() {
        let check = provider_check(&StubProvider { health: Ok(true) }).await;
        assert_eq!(check.status, Status::Ok);
        assert!(check.label.contains("'stub' reachable"));
    }

    #[tokio::test]
    async fn refused_health_check_fails() {
        let check = provider_check(&StubProvider { health: Ok(false) }).await;
        assert_eq!(check.status, Status::Fail);
    }

    #[tokio::test]
    async fn network_error_fails_with_reason() {
        let stub = StubProvider {
            health: Err(ProviderError::Network("connection refused".into())),
        };
        let check = provider_check(&stub).await;
        assert_eq!(check.status, Status::Fail);
        assert!(check.label.contains("connection refused"));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = AppConfig::default();
        let checks = config_checks(&config);
        assert_eq!(checks[0].status, Status::Fail);
        assert!(checks[0].label.contains("CONCIERGE_API_KEY"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = AppConfig {
            default_provider: "ollama".into(),
            ..AppConfig::default()
        };
        assert_eq!(config_checks(&config)[0].status, Status::Ok);
    }
}
