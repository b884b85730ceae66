use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const API_URL_ENV: &str = "BLOGHUB_API_URL";

/// Resolved runtime settings for the client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_url: Url,
    pub timeout: Duration,
    pub storage_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => {
                format!("BlogHub is not configured: {detail}. Update bloghub.yaml.")
            }
        }
    }
}

impl ClientSettings {
    /// Load `bloghub.yaml` when present, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match locate_config_file() {
            Some(path) => {
                let contents = fs::read_to_string(&path).map_err(|err| {
                    ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
                })?;
                serde_yaml::from_str(&contents)
                    .map_err(|err| ConfigError::Invalid(format!("invalid bloghub.yaml: {err}")))?
            }
            None => BlogHubConfig::default(),
        };
        resolve_settings(file, std::env::var(API_URL_ENV).ok())
    }

    /// Settings pointed at an arbitrary backend, ignoring file and environment.
    pub fn for_api(api_url: &str) -> Result<Self, ConfigError> {
        let api = ApiSection {
            base_url: Some(api_url.to_string()),
            timeout_secs: None,
        };
        resolve_settings(
            BlogHubConfig {
                api: Some(api),
                storage: None,
            },
            None,
        )
    }
}

fn resolve_settings(
    config: BlogHubConfig,
    env_api_url: Option<String>,
) -> Result<ClientSettings, ConfigError> {
    let api = config.api.unwrap_or_default();
    let raw_url = env_api_url
        .filter(|value| !value.trim().is_empty())
        .or(api.base_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api_url = Url::parse(raw_url.trim())
        .map_err(|err| ConfigError::Invalid(format!("invalid api url `{raw_url}`: {err}")))?;
    if !matches!(api_url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "api url `{raw_url}` must use http or https"
        )));
    }

    let timeout_secs = api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
    }

    let storage_path = config
        .storage
        .and_then(|storage| storage.path)
        .unwrap_or_else(default_storage_path);

    Ok(ClientSettings {
        api_url,
        timeout: Duration::from_secs(timeout_secs),
        storage_path,
    })
}

fn default_storage_path() -> PathBuf {
    ProjectDirs::from("", "", "bloghub")
        .map(|dirs| dirs.data_dir().join("session.json"))
        .unwrap_or_else(|| PathBuf::from(".bloghub").join("session.json"))
}

fn locate_config_file() -> Option<PathBuf> {
    bloghub_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn bloghub_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("bloghub");
        paths.push(config_dir.join("bloghub.yaml"));
        paths.push(config_dir.join("bloghub.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".bloghub").join("bloghub.yaml"));
        paths.push(home_dir.join(".bloghub").join("bloghub.yml"));
    } else {
        paths.push(PathBuf::from("bloghub.yaml"));
        paths.push(PathBuf::from("bloghub.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
struct BlogHubConfig {
    api: Option<ApiSection>,
    storage: Option<StorageSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSection {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    path: Option<PathBuf>,
}
