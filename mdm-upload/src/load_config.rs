/// `load_config` module: reads the CLI config file and release plugin settings,
/// injecting secrets from the environment.
///
/// This is the only place configuration is read. Everything downstream gets a
/// [`ClientConfig`] or [`ReleaseSettings`] passed in explicitly.
///
/// # Responsibilities
/// - Parse the config file (JSON; YAML is accepted too since JSON is a subset)
/// - Fill or override the bearer token from `MDM_API_TOKEN`, and a missing
///   API URL from `MDM_API_URL`
/// - Fail with a message naming every missing value
///
/// # Errors
/// Missing values surface as [`Error::Config`] wrapped in `anyhow`, so the CLI
/// boundary can still downcast them.
use anyhow::{Context, Result};
use mdm_upload_core::config::ClientConfig;
use mdm_upload_core::release::{ReleaseEnv, ReleaseSettings, API_TOKEN_VAR, API_URL_VAR};
use mdm_upload_core::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    api_token: Option<String>,
}

fn read_file(path_ref: &Path) -> Result<String> {
    info!(config_path = ?path_ref, "Loading configuration from file");
    match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            Ok(content)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_var(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

/// Loads the CLI config file and returns the client configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let path_ref = path.as_ref();
    let content = read_file(path_ref)?;

    let raw: RawConfig = match serde_yaml::from_str(&content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config file successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config file");
            return Err(anyhow::anyhow!("Failed to parse config file: {e}"));
        }
    };

    let api_url = non_empty(raw.api_url).or_else(|| env_var(API_URL_VAR));
    let api_token = match env_var(API_TOKEN_VAR) {
        Some(token) => {
            info!("{API_TOKEN_VAR} found in env");
            Some(token)
        }
        None => non_empty(raw.api_token),
    };

    match (api_url, api_token) {
        (Some(api_url), Some(api_token)) => {
            let config = ClientConfig::new(api_url, api_token);
            config.trace_loaded();
            Ok(config)
        }
        (api_url, api_token) => {
            let mut missing = Vec::new();
            if api_url.is_none() {
                missing.push(format!("api_url (or {API_URL_VAR})"));
            }
            if api_token.is_none() {
                missing.push(format!("api_token (or {API_TOKEN_VAR})"));
            }
            error!(?missing, "Configuration incomplete");
            Err(Error::Config(format!("missing {}", missing.join(", "))).into())
        }
    }
}

/// Loads the release plugin settings file.
pub fn load_release_settings<P: AsRef<Path>>(path: P) -> Result<ReleaseSettings> {
    let path_ref = path.as_ref();
    let content = read_file(path_ref)?;
    let settings: ReleaseSettings = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse release settings {path_ref:?}"))?;
    info!(
        app_id = settings.app_id.as_deref(),
        release = settings.release,
        pre_release = settings.pre_release,
        script_lines = settings.postinstall_script.len(),
        "Loaded release settings"
    );
    Ok(settings)
}

/// Environment values the release plugin depends on.
pub fn release_env() -> ReleaseEnv {
    ReleaseEnv {
        api_url: env_var(API_URL_VAR),
        api_token: env_var(API_TOKEN_VAR),
    }
}

/// Reads a post-install script file into lines.
pub fn load_script_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read post-install script {path_ref:?}"))?;
    Ok(content.lines().map(str::to_string).collect())
}
