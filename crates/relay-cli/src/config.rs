use anyhow::Result;
use relay_core::{RelayConfig, mask_secret};
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
}

/// Resolve configuration: an explicit path must exist, the default file is
/// used when present, and the environment is the fallback.
pub fn load(custom_path: Option<&Path>) -> Result<RelayConfig> {
    if let Some(path) = custom_path {
        return RelayConfig::load(path);
    }
    load_from_dir(&config_dir())
}

fn load_from_dir(dir: &Path) -> Result<RelayConfig> {
    let path = dir.join("config.toml");
    if path.exists() {
        debug!("Loading config from {}", path.display());
        RelayConfig::load(&path)
    } else {
        debug!("No config at {}, reading environment", path.display());
        Ok(RelayConfig::from_env())
    }
}

/// Copy of `config` that is safe to print
pub fn masked(config: &RelayConfig) -> RelayConfig {
    let mut masked = config.clone();
    for settings in [
        &mut masked.providers.openai,
        &mut masked.providers.gemini,
        &mut masked.providers.perplexity,
    ] {
        settings.api_key = mask_secret(&settings.api_key);
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_keys() {
        let mut config = RelayConfig::default();
        config.providers.openai.api_key = "sk-1234567890abcdef".to_string();
        let shown = masked(&config);
        assert_eq!(shown.providers.openai.api_key, "sk-...cdef");
        assert_eq!(shown.providers.gemini.api_key, "(empty)");
        assert_eq!(config.providers.openai.api_key, "sk-1234567890abcdef");
    }

    #[test]
    fn test_load_prefers_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[providers]\norder = [\"gemini\"]\n",
        )
        .unwrap();
        let config = load_from_dir(dir.path()).unwrap();
        assert_eq!(config.providers.order, vec!["gemini".to_string()]);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
