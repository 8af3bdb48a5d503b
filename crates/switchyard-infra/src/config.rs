//! Router configuration loader.
//!
//! Reads `config.toml` (by default from the data directory) and deserializes
//! it into [`RouterConfig`]. A missing file yields the defaults; a file that
//! exists but cannot be read, parsed or validated is an error, so a typo
//! never silently turns into a default setup.

use std::path::{Path, PathBuf};

use switchyard_types::config::RouterConfig;
use switchyard_types::error::ConfigError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SWITCHYARD_DATA_DIR";

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "SWITCHYARD_CONFIG";

const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory: `SWITCHYARD_DATA_DIR`, else the platform data
/// directory, else `./.switchyard`.
pub fn data_dir() -> PathBuf {
    resolve_data_dir(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn resolve_data_dir(from_env: Option<PathBuf>) -> PathBuf {
    from_env
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| dirs::data_dir().map(|d| d.join("switchyard")))
        .unwrap_or_else(|| PathBuf::from(".switchyard"))
}

/// Resolve the config path: explicit flag, else `SWITCHYARD_CONFIG`, else
/// `<data_dir>/config.toml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    resolve_config_path(
        explicit,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        &data_dir(),
    )
}

fn resolve_config_path(explicit: Option<&Path>, from_env: Option<PathBuf>, data_dir: &Path) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or(from_env.filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE))
}

/// Load and validate the router configuration at `path`.
pub async fn load_router_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(RouterConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    let config = parse_router_config(&content)?;
    tracing::debug!(
        path = %path.display(),
        providers = config.providers.len(),
        selection = %config.selection,
        "loaded router config"
    );
    Ok(config)
}

/// Parse and validate a TOML document.
pub fn parse_router_config(content: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_types::config::SelectionPolicy;
    use switchyard_types::llm::ProviderType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_router_config(&tmp.path().join("config.toml"))
            .await
            .unwrap();
        assert_eq!(config, RouterConfig::default());
        assert_eq!(config.providers[0].provider_type, ProviderType::Ollama);
    }

    #[tokio::test]
    async fn test_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
primary = "local"
fallbacks = ["cloud"]
selection = "round_robin"
request_deadline_secs = 120

[[providers]]
name = "local"
provider_type = "ollama"
[providers.model]
model = "llama3.2"

[[providers]]
name = "cloud"
provider_type = "openai_compatible"
api_key_env = "CLOUD_KEY"
[providers.model]
model = "gpt-4o-mini"
context_window = 128000

[sessions]
snapshots = false
"#,
        )
        .await
        .unwrap();

        let config = load_router_config(&path).await.unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.primary.as_deref(), Some("local"));
        assert_eq!(config.selection, SelectionPolicy::RoundRobin);
        assert_eq!(config.request_deadline_secs, 120);
        assert_eq!(config.providers[1].model.context_window, 128_000);
        assert!(!config.sessions.snapshots);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();
        let err = load_router_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_inconsistent_config_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "primary = \"nowhere\"\n").await.unwrap();
        let err = load_router_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_directory_path_is_read_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_router_config(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_data_dir_resolution() {
        assert_eq!(
            resolve_data_dir(Some(PathBuf::from("/tmp/yard"))),
            PathBuf::from("/tmp/yard")
        );
        let fallback = resolve_data_dir(Some(PathBuf::new()));
        assert!(fallback.ends_with("switchyard") || fallback.ends_with(".switchyard"));
    }

    #[test]
    fn test_config_path_precedence() {
        let data = Path::new("/data");
        let flag = Path::new("/flag.toml");
        assert_eq!(
            resolve_config_path(Some(flag), Some("/env.toml".into()), data),
            PathBuf::from("/flag.toml")
        );
        assert_eq!(
            resolve_config_path(None, Some("/env.toml".into()), data),
            PathBuf::from("/env.toml")
        );
        assert_eq!(
            resolve_config_path(None, None, data),
            PathBuf::from("/data/config.toml")
        );
    }
}
