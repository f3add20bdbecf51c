use anyhow::{Context, Result};
use chorus_llm::ClientConfig;
use std::path::{Path, PathBuf};

/// Load config from file or use defaults
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::default());
    };

    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
    ClientConfig::load(Some(&expanded))
        .with_context(|| format!("Failed to load config from {:?}", expanded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_llm::CredentialSource;
    use std::io::Write;

    #[test]
    fn test_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.default_provider_id(), "openai");
    }

    #[test]
    fn test_loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = \"local\"").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.default_provider_id(), "local");
    }

    #[test]
    fn test_bad_file_has_context() {
        let err = load_config(Some(Path::new("/nonexistent/chorus.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load config"));
    }
}
