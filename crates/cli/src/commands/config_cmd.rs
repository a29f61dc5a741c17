//! `concierge config`: show the default configuration.

use concierge_config::AppConfig;

pub fn run(path: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path {
        println!("{}", config_path().display());
    } else {
        println!("# Save as {}", config_path().display());
        println!("{}", AppConfig::default_toml());
    }
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        assert!(config_path().to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn default_toml_has_every_section() {
        let text = AppConfig::default_toml();
        for section in ["[orchestrator]", "[cache]", "[memory]"] {
            assert!(text.contains(section), "missing {section}");
        }
    }
}
