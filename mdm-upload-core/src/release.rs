//! Release-automation lifecycle: verify, prepare, publish.
//!
//! A release tool calls these at its own lifecycle steps. `verify` and
//! `prepare` never touch the network; `publish` runs the upload workflow
//! only when the release flags allow it for the current branch.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::asset::resolve_asset;
use crate::config::{AttachPolicy, ClientConfig};
use crate::contract::{CustomApp, Transport};
use crate::error::{Error, Result};
use crate::upload::upload_with_postinstall;

pub const API_URL_VAR: &str = "MDM_API_URL";
pub const API_TOKEN_VAR: &str = "MDM_API_TOKEN";

fn default_true() -> bool {
    true
}

/// Plugin settings as written in the release configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseSettings {
    #[serde(default)]
    pub app_id: Option<String>,
    /// Asset path template, e.g. `dist/Agent-${version}-*.pkg`.
    #[serde(default)]
    pub asset_path: Option<String>,
    /// Publish from regular release branches.
    #[serde(default = "default_true")]
    pub release: bool,
    /// Publish from pre-release branches.
    #[serde(default)]
    pub pre_release: bool,
    #[serde(default)]
    pub postinstall_script: Vec<String>,
}

/// Environment values the plugin depends on, looked up by the caller.
#[derive(Debug, Clone, Default)]
pub struct ReleaseEnv {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
}

/// Settings that passed [`verify_conditions`].
#[derive(Debug, Clone)]
pub struct VerifiedRelease {
    pub app_id: String,
    pub asset_path: String,
    pub release: bool,
    pub pre_release: bool,
    pub postinstall_script: Vec<String>,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Flags do not allow publishing from this branch; nothing was sent.
    Skipped,
    Published(CustomApp),
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Check that every required setting and environment variable is present.
/// Reports all missing names at once.
pub fn verify_conditions(settings: &ReleaseSettings, env: &ReleaseEnv) -> Result<VerifiedRelease> {
    let mut missing = Vec::new();
    if present(&settings.app_id).is_none() {
        missing.push("app_id");
    }
    if present(&settings.asset_path).is_none() {
        missing.push("asset_path");
    }
    if present(&env.api_url).is_none() {
        missing.push(API_URL_VAR);
    }
    if present(&env.api_token).is_none() {
        missing.push(API_TOKEN_VAR);
    }

    match (
        present(&settings.app_id),
        present(&settings.asset_path),
        present(&env.api_url),
        present(&env.api_token),
    ) {
        (Some(app_id), Some(asset_path), Some(api_url), Some(api_token)) => {
            info!(app_id, asset_path, "Release conditions verified");
            Ok(VerifiedRelease {
                app_id: app_id.to_string(),
                asset_path: asset_path.to_string(),
                release: settings.release,
                pre_release: settings.pre_release,
                postinstall_script: settings.postinstall_script.clone(),
                client: ClientConfig::new(api_url, api_token),
            })
        }
        _ => Err(Error::Config(format!(
            "missing required settings: {}",
            missing.join(", ")
        ))),
    }
}

/// Resolve the asset for `version`. Fails on zero or several matches.
pub fn prepare(verified: &VerifiedRelease, version: &str) -> Result<PathBuf> {
    resolve_asset(&verified.asset_path, version)
}

/// Whether this branch may publish under the given flags.
pub fn should_publish(release: bool, pre_release: bool, branch_is_prerelease: bool) -> bool {
    if branch_is_prerelease {
        pre_release
    } else {
        release
    }
}

/// Upload the prepared asset and apply the post-install script, if the
/// flags allow publishing from this branch.
pub async fn publish<T>(
    transport: &T,
    policy: &AttachPolicy,
    verified: &VerifiedRelease,
    version: &str,
    branch_is_prerelease: bool,
) -> Result<PublishOutcome>
where
    T: Transport + ?Sized,
{
    if !should_publish(verified.release, verified.pre_release, branch_is_prerelease) {
        info!(
            release = verified.release,
            pre_release = verified.pre_release,
            branch_is_prerelease,
            "Publishing disabled for this branch, skipping"
        );
        return Ok(PublishOutcome::Skipped);
    }

    let asset = prepare(verified, version)?;
    publish_asset(transport, policy, verified, &asset).await
}

async fn publish_asset<T>(
    transport: &T,
    policy: &AttachPolicy,
    verified: &VerifiedRelease,
    asset: &Path,
) -> Result<PublishOutcome>
where
    T: Transport + ?Sized,
{
    info!(app_id = %verified.app_id, asset = %asset.display(), "Publishing release asset");
    let app = upload_with_postinstall(
        transport,
        policy,
        asset,
        &verified.app_id,
        &verified.postinstall_script,
    )
    .await?;
    Ok(PublishOutcome::Published(app))
}
