use std::collections::HashMap;

use crate::llm::Provider;

/// Read-only source of provider credentials and defaults.
///
/// Consulted once per call at request-build time; implementations must not
/// block on I/O.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self, provider: Provider) -> Option<String>;

    fn default_model(&self, provider: Provider) -> String;

    fn default_provider_id(&self) -> String;

    /// Base URL override for a provider's endpoint
    fn base_url(&self, _provider: Provider) -> Option<String> {
        None
    }
}

/// In-memory credentials, handy for embedding and tests
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    default_provider: Provider,
    keys: HashMap<Provider, String>,
    models: HashMap<Provider, String>,
    base_urls: HashMap<Provider, String>,
}

impl StaticCredentials {
    pub fn new(default_provider: Provider) -> Self {
        Self {
            default_provider,
            keys: HashMap::new(),
            models: HashMap::new(),
            base_urls: HashMap::new(),
        }
    }

    pub fn with_key(mut self, provider: Provider, key: &str) -> Self {
        self.keys.insert(provider, key.to_string());
        self
    }

    pub fn with_model(mut self, provider: Provider, model: &str) -> Self {
        self.models.insert(provider, model.to_string());
        self
    }

    pub fn with_base_url(mut self, provider: Provider, url: &str) -> Self {
        self.base_urls.insert(provider, url.to_string());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self, provider: Provider) -> Option<String> {
        self.keys.get(&provider).filter(|k| !k.is_empty()).cloned()
    }

    fn default_model(&self, provider: Provider) -> String {
        self.models
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    fn default_provider_id(&self) -> String {
        self.default_provider.id().to_string()
    }

    fn base_url(&self, provider: Provider) -> Option<String> {
        self.base_urls.get(&provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials() {
        let creds = StaticCredentials::new(Provider::Anthropic)
            .with_key(Provider::Anthropic, "sk-ant")
            .with_key(Provider::OpenAI, "")
            .with_model(Provider::Anthropic, "claude-haiku");

        assert_eq!(creds.api_key(Provider::Anthropic).as_deref(), Some("sk-ant"));
        assert!(creds.api_key(Provider::OpenAI).is_none());
        assert_eq!(creds.default_model(Provider::Anthropic), "claude-haiku");
        assert_eq!(creds.default_model(Provider::Gemini), "gemini-2.0-flash");
        assert_eq!(creds.default_provider_id(), "anthropic");
        assert!(creds.base_url(Provider::Local).is_none());
    }
}
