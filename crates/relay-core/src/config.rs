//! Configuration for providers and generation defaults
//!
//! Configuration is consumed, not owned, by the orchestrator: it arrives either
//! from environment-style key/value pairs ([`RelayConfig::from_env`]) or from a
//! TOML file whose `${VAR}` references are expanded first ([`RelayConfig::load`]).
//! A provider whose `api_key` is empty is registered as disabled.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

pub const OPENAI: &str = "openai";
pub const GEMINI: &str = "gemini";
pub const PERPLEXITY: &str = "perplexity";

/// Default per-provider budget for one attempt
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Free-text completion defaults, applied by adapters when a request leaves them unset
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Structured extraction favours determinism over creativity
pub const DEFAULT_STRUCTURED_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub defaults: GenerationDefaults,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDefaults {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_structured_temperature")]
    pub structured_temperature: f32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_structured_temperature() -> f32 {
    DEFAULT_STRUCTURED_TEMPERATURE
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            structured_temperature: DEFAULT_STRUCTURED_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Fallback priority; the first entry is tried first
    #[serde(default = "default_order")]
    pub order: Vec<String>,
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub gemini: ProviderSettings,
    #[serde(default)]
    pub perplexity: ProviderSettings,
}

fn default_order() -> Vec<String> {
    vec![OPENAI.to_string(), GEMINI.to_string(), PERPLEXITY.to_string()]
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            openai: ProviderSettings::default(),
            gemini: ProviderSettings::default(),
            perplexity: ProviderSettings::default(),
        }
    }
}

impl ProvidersConfig {
    /// Settings for a provider id, if the id is known
    pub fn settings(&self, id: &str) -> Option<&ProviderSettings> {
        match id {
            OPENAI => Some(&self.openai),
            GEMINI => Some(&self.gemini),
            PERPLEXITY => Some(&self.perplexity),
            _ => None,
        }
    }

    fn settings_mut(&mut self, id: &str) -> Option<&mut ProviderSettings> {
        match id {
            OPENAI => Some(&mut self.openai),
            GEMINI => Some(&mut self.gemini),
            PERPLEXITY => Some(&mut self.perplexity),
            _ => None,
        }
    }
}

/// Per-provider settings. `base_url` and `model` fall back to the adapter's
/// own defaults; `max_tokens` and `temperature` fall back to
/// [`GenerationDefaults`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ProviderSettings {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn max_tokens_or(&self, defaults: &GenerationDefaults) -> u32 {
        self.max_tokens.unwrap_or(defaults.max_tokens)
    }

    pub fn temperature_or(&self, defaults: &GenerationDefaults) -> f32 {
        self.temperature.unwrap_or(defaults.temperature)
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

impl RelayConfig {
    /// Build configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    ///
    /// Recognised keys: `<PROVIDER>_API_KEY`, `<PROVIDER>_MODEL`,
    /// `<PROVIDER>_BASE_URL`, `<PROVIDER>_TIMEOUT_MS`, `<PROVIDER>_MAX_TOKENS`,
    /// `<PROVIDER>_TEMPERATURE` for `OPENAI`, `GEMINI`, and `PERPLEXITY`
    /// (`GOOGLE_AI_API_KEY` is accepted for Gemini), plus
    /// `RELAY_PROVIDER_ORDER`, `RELAY_DEFAULT_MAX_TOKENS`,
    /// `RELAY_DEFAULT_TEMPERATURE`, and `RELAY_STRUCTURED_TEMPERATURE`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(order) = get("RELAY_PROVIDER_ORDER") {
            config.providers.order = order
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = parse_value::<u32>("RELAY_DEFAULT_MAX_TOKENS", get("RELAY_DEFAULT_MAX_TOKENS")) {
            config.defaults.max_tokens = v;
        }
        if let Some(v) = parse_value::<f32>("RELAY_DEFAULT_TEMPERATURE", get("RELAY_DEFAULT_TEMPERATURE")) {
            config.defaults.temperature = v;
        }
        if let Some(v) = parse_value::<f32>(
            "RELAY_STRUCTURED_TEMPERATURE",
            get("RELAY_STRUCTURED_TEMPERATURE"),
        ) {
            config.defaults.structured_temperature = v;
        }

        for id in [OPENAI, GEMINI, PERPLEXITY] {
            let prefix = id.to_uppercase();
            let key = |suffix: &str| format!("{}_{}", prefix, suffix);
            let Some(settings) = config.providers.settings_mut(id) else {
                continue;
            };

            let mut api_key = get(&key("API_KEY"));
            if api_key.is_none() && id == GEMINI {
                api_key = get("GOOGLE_AI_API_KEY");
            }
            settings.api_key = api_key.unwrap_or_default();
            settings.base_url = get(&key("BASE_URL"));
            settings.model = get(&key("MODEL"));

            let timeout_key = key("TIMEOUT_MS");
            if let Some(ms) = parse_value::<u64>(&timeout_key, get(&timeout_key)) {
                if ms > 0 {
                    settings.timeout_ms = ms;
                } else {
                    warn!("{} must be positive, keeping {}ms", timeout_key, settings.timeout_ms);
                }
            }
            let max_tokens_key = key("MAX_TOKENS");
            settings.max_tokens = parse_value(&max_tokens_key, get(&max_tokens_key));
            let temperature_key = key("TEMPERATURE");
            settings.temperature = parse_value(&temperature_key, get(&temperature_key));
        }

        config.sanitize();
        config
    }

    /// Load a TOML config file, expanding `${VAR}` references first
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        let expanded = expand_env_vars(&content, |key| std::env::var(key).ok());

        let mut config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        for id in &config.providers.order {
            if let Some(settings) = config.providers.settings(id) {
                if settings.has_credentials() && !settings.api_key.contains("${") {
                    if content.contains(&settings.api_key) {
                        warn!(
                            "API key for {} is hardcoded in {}. Use an environment variable reference instead: api_key = \"${{{}_API_KEY}}\"",
                            id,
                            path.display(),
                            id.to_uppercase()
                        );
                    }
                }
            }
        }

        config.sanitize();
        Ok(config)
    }

    /// Reset generation values no provider accepts, keeping the defaults
    fn sanitize(&mut self) {
        let defaults = &mut self.defaults;
        if !valid_max_tokens(defaults.max_tokens) {
            warn!("Default max_tokens must be positive, using {}", DEFAULT_MAX_TOKENS);
            defaults.max_tokens = DEFAULT_MAX_TOKENS;
        }
        if !valid_temperature(defaults.temperature) {
            warn!(
                "Default temperature {} is outside [0, 2], using {}",
                defaults.temperature, DEFAULT_TEMPERATURE
            );
            defaults.temperature = DEFAULT_TEMPERATURE;
        }
        if !valid_temperature(defaults.structured_temperature) {
            warn!(
                "Structured temperature {} is outside [0, 2], using {}",
                defaults.structured_temperature, DEFAULT_STRUCTURED_TEMPERATURE
            );
            defaults.structured_temperature = DEFAULT_STRUCTURED_TEMPERATURE;
        }

        for id in [OPENAI, GEMINI, PERPLEXITY] {
            let Some(settings) = self.providers.settings_mut(id) else {
                continue;
            };
            if let Some(max_tokens) = settings.max_tokens.filter(|&v| !valid_max_tokens(v)) {
                warn!("{} max_tokens {} must be positive, ignoring", id, max_tokens);
                settings.max_tokens = None;
            }
            if let Some(temperature) = settings.temperature.filter(|&t| !valid_temperature(t)) {
                warn!("{} temperature {} is outside [0, 2], ignoring", id, temperature);
                settings.temperature = None;
            }
            if settings.timeout_ms == 0 {
                warn!("{} timeout_ms must be positive, using {}ms", id, DEFAULT_TIMEOUT_MS);
                settings.timeout_ms = DEFAULT_TIMEOUT_MS;
            }
        }
    }
}

/// Same limits `ChatRequest::validate` applies to caller-set values
fn valid_temperature(t: f32) -> bool {
    t.is_finite() && (0.0..=2.0).contains(&t)
}

fn valid_max_tokens(v: u32) -> bool {
    v > 0
}

fn parse_value<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable value for {}: {:?}", key, raw);
            None
        }
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_AI_API_KEY",
    "PERPLEXITY_API_KEY",
    "HOME",
    "USER",
];

fn expand_env_vars<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = RelayConfig::from_lookup(|_| None);
        assert_eq!(config.providers.order, vec!["openai", "gemini", "perplexity"]);
        assert_eq!(config.defaults.max_tokens, 2000);
        assert_eq!(config.defaults.temperature, 0.7);
        assert_eq!(config.defaults.structured_temperature, 0.3);
        assert!(!config.providers.openai.has_credentials());
        assert_eq!(config.providers.gemini.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_env_keys_populate_providers() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_TIMEOUT_MS", "1500"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("PERPLEXITY_API_KEY", "pplx-test"),
            ("PERPLEXITY_MAX_TOKENS", "512"),
            ("RELAY_PROVIDER_ORDER", "Perplexity, openai"),
            ("RELAY_STRUCTURED_TEMPERATURE", "0.1"),
        ]));
        assert_eq!(config.providers.order, vec!["perplexity", "openai"]);
        assert_eq!(config.providers.openai.api_key, "sk-test");
        assert_eq!(config.providers.openai.timeout_ms, 1500);
        assert_eq!(config.providers.openai.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.providers.perplexity.max_tokens, Some(512));
        assert!(!config.providers.gemini.has_credentials());
        assert_eq!(config.defaults.structured_temperature, 0.1);
    }

    #[test]
    fn test_gemini_accepts_google_key_name() {
        let config = RelayConfig::from_lookup(lookup_from(&[("GOOGLE_AI_API_KEY", "AIza-test")]));
        assert_eq!(config.providers.gemini.api_key, "AIza-test");
    }

    #[test]
    fn test_bad_numbers_fall_back_to_defaults() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("OPENAI_TIMEOUT_MS", "soon"),
            ("GEMINI_TIMEOUT_MS", "0"),
            ("RELAY_DEFAULT_MAX_TOKENS", "-3"),
        ]));
        assert_eq!(config.providers.openai.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.providers.gemini.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.defaults.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_blank_key_is_not_a_credential() {
        let config = RelayConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "   ")]));
        assert!(!config.providers.openai.has_credentials());
    }

    #[test]
    fn test_settings_fall_back_to_generation_defaults() {
        let defaults = GenerationDefaults::default();
        let mut settings = ProviderSettings::default();
        assert_eq!(settings.max_tokens_or(&defaults), 2000);
        assert_eq!(settings.temperature_or(&defaults), 0.7);
        settings.max_tokens = Some(64);
        settings.temperature = Some(1.2);
        assert_eq!(settings.max_tokens_or(&defaults), 64);
        assert_eq!(settings.temperature_or(&defaults), 1.2);
    }

    #[test]
    fn test_expand_env_vars_allowlist() {
        let lookup = lookup_from(&[("OPENAI_API_KEY", "sk-abc"), ("SECRET", "nope")]);
        let out = expand_env_vars("a = \"${OPENAI_API_KEY}\"\nb = \"${SECRET}\"", lookup);
        assert_eq!(out, "a = \"sk-abc\"\nb = \"${SECRET}\"");
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[defaults]
temperature = 0.5

[providers]
order = ["gemini", "openai"]

[providers.gemini]
api_key = "AIza-file-key"
timeout_ms = 5000
model = "gemini-1.5-pro"
"#
        )
        .unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.providers.order, vec!["gemini", "openai"]);
        assert_eq!(config.providers.gemini.timeout_ms, 5000);
        assert_eq!(config.providers.gemini.model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(config.providers.openai.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.defaults.temperature, 0.5);
        assert_eq!(config.defaults.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_out_of_range_env_values_keep_defaults() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("RELAY_STRUCTURED_TEMPERATURE", "2.5"),
            ("RELAY_DEFAULT_TEMPERATURE", "NaN"),
            ("RELAY_DEFAULT_MAX_TOKENS", "0"),
            ("OPENAI_MAX_TOKENS", "0"),
            ("GEMINI_TEMPERATURE", "-0.1"),
            ("PERPLEXITY_TEMPERATURE", "inf"),
        ]));
        assert_eq!(config.defaults.structured_temperature, DEFAULT_STRUCTURED_TEMPERATURE);
        assert_eq!(config.defaults.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.defaults.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.providers.openai.max_tokens, None);
        assert_eq!(config.providers.gemini.temperature, None);
        assert_eq!(config.providers.perplexity.temperature, None);
    }

    #[test]
    fn test_in_range_boundaries_are_kept() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("RELAY_STRUCTURED_TEMPERATURE", "0"),
            ("RELAY_DEFAULT_TEMPERATURE", "2"),
            ("OPENAI_MAX_TOKENS", "1"),
        ]));
        assert_eq!(config.defaults.structured_temperature, 0.0);
        assert_eq!(config.defaults.temperature, 2.0);
        assert_eq!(config.providers.openai.max_tokens, Some(1));
    }

    #[test]
    fn test_out_of_range_file_values_keep_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[defaults]
max_tokens = 0
temperature = nan
structured_temperature = 2.5

[providers.openai]
max_tokens = 0
temperature = 3.0
timeout_ms = 0
"#
        )
        .unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.defaults.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.defaults.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.defaults.structured_temperature, DEFAULT_STRUCTURED_TEMPERATURE);
        assert_eq!(config.providers.openai.max_tokens, None);
        assert_eq!(config.providers.openai.temperature, None);
        assert_eq!(config.providers.openai.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = RelayConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_debug_masks_key() {
        let settings = ProviderSettings {
            api_key: "sk-very-secret-key".to_string(),
            ..ProviderSettings::default()
        };
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("sk-very-secret-key"));
        assert!(debug.contains("sk-...-key"));
    }

    #[test]
    fn test_mask_secret_short_and_empty() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("abc"), "***");
    }
}
