use anyhow::Result;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Chorus Configuration
default_provider = "openai"

# Keys are read from the named env var unless api_key is set inline.
[providers.openai]
api_key_env = "OPENAI_API_KEY"
model = "gpt-4o"

[providers.openrouter]
api_key_env = "OPENROUTER_API_KEY"

[providers.anthropic]
api_key_env = "ANTHROPIC_API_KEY"
model = "claude-sonnet-4-20250514"

[providers.gemini]
api_key_env = "GEMINI_API_KEY"

# LOCAL_AI_URL overrides base_url when set
[providers.local]
base_url = "http://localhost:1234"

[presets.terse]
temperature = 0.3
max_tokens = 256

[retry]
max_retries = 2
delays_ms = [1000, 2000]

[http]
timeout_secs = 120
connect_timeout_secs = 10
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    println!("Created config at {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_llm::{ClientConfig, CredentialSource, Provider};

    #[test]
    fn test_starter_config_parses() {
        let config = ClientConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.default_provider_id(), "openai");
        assert_eq!(config.default_model(Provider::Anthropic), "claude-sonnet-4-20250514");
        assert_eq!(config.preset_table()["terse"].max_tokens, Some(256));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chorus.toml");
        run_init(&path).unwrap();
        assert!(path.exists());
        assert!(run_init(&path).is_err());
    }
}
