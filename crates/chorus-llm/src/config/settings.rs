use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::credentials::CredentialSource;
use crate::llm::{CompletionError, GenerationParams, Provider, RetryPolicy};

/// Environment override for the local server's base URL
pub const LOCAL_AI_URL_ENV: &str = "LOCAL_AI_URL";

/// Client configuration, usually loaded from `chorus.toml`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default)]
    pub providers: HashMap<Provider, ProviderSettings>,

    /// User presets; these shadow the built-in ones of the same name
    #[serde(default)]
    pub presets: HashMap<String, GenerationParams>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// Inline key; prefer `api_key_env` outside of local setups
    #[serde(default)]
    pub api_key: Option<String>,

    /// Env var holding the key (defaults to the provider's conventional name)
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_provider() -> String {
    Provider::OpenAI.id().to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: HashMap::new(),
            presets: HashMap::new(),
            retry: RetryPolicy::default(),
            http: HttpSettings::default(),
        }
    }
}

/// Presets shipped with the client
pub fn builtin_presets() -> HashMap<String, GenerationParams> {
    [
        ("precise", 0.2, 1024),
        ("balanced", 0.7, 2048),
        ("creative", 1.0, 4096),
    ]
    .into_iter()
    .map(|(name, temperature, max_tokens)| {
        (
            name.to_string(),
            GenerationParams {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
            },
        )
    })
    .collect()
}

impl ClientConfig {
    /// Load config from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, CompletionError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|e| {
            CompletionError::Configuration(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CompletionError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CompletionError::Configuration(format!("failed to parse TOML config: {}", e)))?;
        config.default_provider.parse::<Provider>()?;
        Ok(config)
    }

    /// Built-in presets overlaid with the configured ones
    pub fn preset_table(&self) -> HashMap<String, GenerationParams> {
        let mut table = builtin_presets();
        table.extend(self.presets.iter().map(|(k, v)| (k.clone(), *v)));
        table
    }

    fn settings(&self, provider: Provider) -> Option<&ProviderSettings> {
        self.providers.get(&provider)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CredentialSource for ClientConfig {
    fn api_key(&self, provider: Provider) -> Option<String> {
        let settings = self.settings(provider);
        if let Some(key) = non_empty(settings.and_then(|s| s.api_key.clone())) {
            return Some(key);
        }

        let env_name = settings
            .and_then(|s| s.api_key_env.as_deref())
            .or_else(|| provider.api_key_env())?;
        non_empty(std::env::var(env_name).ok())
    }

    fn default_model(&self, provider: Provider) -> String {
        non_empty(self.settings(provider).and_then(|s| s.model.clone()))
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    fn default_provider_id(&self) -> String {
        self.default_provider.clone()
    }

    fn base_url(&self, provider: Provider) -> Option<String> {
        let configured = non_empty(self.settings(provider).and_then(|s| s.base_url.clone()));
        if provider == Provider::Local {
            return non_empty(std::env::var(LOCAL_AI_URL_ENV).ok()).or(configured);
        }
        configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
default_provider = "anthropic"

[providers.anthropic]
api_key = "sk-inline"
model = "claude-haiku"

[providers.openai]
api_key_env = "CHORUS_TEST_UNSET_KEY_VAR"

[providers.gemini]
base_url = "http://gemini.mock"

[presets.terse]
max_tokens = 64

[presets.precise]
temperature = 0.0

[retry]
max_retries = 1
delays_ms = [250]
"#;

    #[test]
    fn test_parse_sample() {
        let config = ClientConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.default_provider_id(), "anthropic");
        assert_eq!(config.api_key(Provider::Anthropic).as_deref(), Some("sk-inline"));
        assert!(config.api_key(Provider::OpenAI).is_none());
        assert_eq!(config.default_model(Provider::Anthropic), "claude-haiku");
        assert_eq!(config.default_model(Provider::OpenAI), "gpt-4o");
        assert_eq!(config.base_url(Provider::Gemini).as_deref(), Some("http://gemini.mock"));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.http.timeout_secs, 120);
    }

    #[test]
    fn test_preset_table_overlays_builtins() {
        let config = ClientConfig::from_toml(SAMPLE).unwrap();
        let table = config.preset_table();
        assert_eq!(table["terse"].max_tokens, Some(64));
        assert_eq!(table["precise"].temperature, Some(0.0));
        assert_eq!(table["precise"].max_tokens, None);
        assert!(table.contains_key("creative"));
    }

    #[test]
    fn test_unknown_default_provider_rejected() {
        let err = ClientConfig::from_toml("default_provider = \"mystery\"").unwrap_err();
        assert!(matches!(err, CompletionError::Configuration(_)));
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ClientConfig::load(None).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.default_provider, "anthropic");
    }

    #[test]
    fn test_local_ai_url_env_beats_config() {
        let config =
            ClientConfig::from_toml("[providers.local]\nbase_url = \"http://cfg:1\"\n").unwrap();
        let saved = std::env::var(LOCAL_AI_URL_ENV).ok();

        std::env::remove_var(LOCAL_AI_URL_ENV);
        assert_eq!(config.base_url(Provider::Local).as_deref(), Some("http://cfg:1"));

        std::env::set_var(LOCAL_AI_URL_ENV, "http://env:2/v1/chat/completions");
        let base = config.base_url(Provider::Local);
        let endpoint = Provider::Local.endpoint(base.as_deref(), "local-model", true);

        match saved {
            Some(v) => std::env::set_var(LOCAL_AI_URL_ENV, v),
            None => std::env::remove_var(LOCAL_AI_URL_ENV),
        }
        assert_eq!(base.as_deref(), Some("http://env:2/v1/chat/completions"));
        assert_eq!(endpoint, "http://env:2/v1/chat/completions");
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = ClientConfig::load(Some(Path::new("/nonexistent/chorus.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
