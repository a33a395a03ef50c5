//! Upload workflow: get a local build artifact attached to a custom app.
//!
//! The sequence is fixed and strictly sequential:
//!   1. request a signed upload target for the file's name
//!   2. push the file to storage (fatal on failure, never repeated)
//!   3. patch the app's `file_key`, waiting out the backend's
//!      "still being processed" 503 up to [`AttachPolicy::max_retries`] times
//!
//! A failure in step 3 leaves the object in storage but unattached; it is
//! reported as [`Error::Unattached`] so callers can tell it apart from a
//! failed upload.

use std::path::Path;

use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::AttachPolicy;
use crate::contract::{AppPatch, CustomApp, Transport};
use crate::error::{Error, Result};

/// State of one attach loop. Lives only for the duration of one upload.
#[derive(Debug)]
pub struct UploadAttempt<'a> {
    pub app_id: &'a str,
    pub file_key: &'a str,
    /// Attempts made so far.
    pub attempt: u32,
    pub max_retries: u32,
    pub retry_delay: std::time::Duration,
}

impl<'a> UploadAttempt<'a> {
    pub fn new(app_id: &'a str, file_key: &'a str, policy: &AttachPolicy) -> Self {
        Self {
            app_id,
            file_key,
            attempt: 0,
            max_retries: policy.max_retries,
            retry_delay: policy.retry_delay,
        }
    }

    /// Retries already spent; the initial attempt does not count.
    fn retries_spent(&self) -> u32 {
        self.attempt.saturating_sub(1)
    }
}

/// Upload `file_path` and attach it to the custom app `app_id`.
pub async fn upload_app<T>(
    transport: &T,
    policy: &AttachPolicy,
    file_path: &Path,
    app_id: &str,
) -> Result<CustomApp>
where
    T: Transport + ?Sized,
{
    let (app, _) = store_and_attach(transport, policy, file_path, app_id).await?;
    Ok(app)
}

/// The upload workflow, also returning the file key that got attached.
async fn store_and_attach<T>(
    transport: &T,
    policy: &AttachPolicy,
    file_path: &Path,
    app_id: &str,
) -> Result<(CustomApp, String)>
where
    T: Transport + ?Sized,
{
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(file_path.to_path_buf()))?;

    let span = tracing::info_span!(
        "upload",
        upload_id = %Uuid::new_v4(),
        app_id,
        filename
    );
    async move {
        info!(path = %file_path.display(), "Starting upload");

        let target = transport.request_upload_target(filename).await.map_err(|e| {
            error!(error = %e, "Failed to obtain signed upload target");
            e
        })?;

        transport
            .push_to_storage(file_path, &target)
            .await
            .map_err(|e| {
                error!(error = %e, file_key = %target.file_key, "Storage push failed");
                e
            })?;
        info!(file_key = %target.file_key, "File stored, attaching to app");

        let mut attempt = UploadAttempt::new(app_id, &target.file_key, policy);
        attach(transport, &mut attempt)
            .await
            .map_err(|source| {
                error!(
                    error = %source,
                    file_key = %target.file_key,
                    "Storage object uploaded but not attached"
                );
                Error::Unattached {
                    app_id: app_id.to_string(),
                    file_key: target.file_key.clone(),
                    source: Box::new(source),
                }
            })
            .map(|app| (app, target.file_key.clone()))
    }
    .instrument(span)
    .await
}

/// Patch the app's `file_key` until the backend accepts it.
///
/// Retries only on [`Error::is_still_processing`]. Once the retry budget is
/// spent, the next failure of any kind becomes
/// [`Error::ConvergenceTimeout`].
pub async fn attach<T>(transport: &T, state: &mut UploadAttempt<'_>) -> Result<CustomApp>
where
    T: Transport + ?Sized,
{
    let patch = AppPatch::file_key(state.file_key);
    loop {
        state.attempt += 1;
        info!(attempt = state.attempt, file_key = state.file_key, "Attach attempt");

        let err = match transport.patch_app(state.app_id, &patch).await {
            Ok(app) => {
                info!(attempt = state.attempt, "Custom app updated with new file");
                return Ok(app);
            }
            Err(e) => e,
        };

        if state.retries_spent() >= state.max_retries {
            error!(attempts = state.attempt, error = %err, "Attach retries exhausted");
            return Err(Error::ConvergenceTimeout {
                attempts: state.attempt,
            });
        }
        if !err.is_still_processing() {
            return Err(err);
        }

        warn!(
            attempt = state.attempt,
            delay_ms = state.retry_delay.as_millis() as u64,
            "Upload still being processed, retrying"
        );
        tokio::time::sleep(state.retry_delay).await;
    }
}

/// Set the app's post-install script to `lines` joined by newlines.
///
/// Runs after a successful attach; a failure here does not undo it.
pub async fn apply_postinstall_script<T, S>(
    transport: &T,
    app_id: &str,
    lines: &[S],
) -> Result<CustomApp>
where
    T: Transport + ?Sized,
    S: AsRef<str>,
{
    let script = lines
        .iter()
        .map(|line| line.as_ref())
        .collect::<Vec<&str>>()
        .join("\n");
    info!(app_id, lines = lines.len(), "Updating post-install script");
    transport
        .patch_app(app_id, &AppPatch::postinstall_script(script))
        .await
        .map_err(|e| {
            error!(app_id, error = %e, "Post-install script update failed; file remains attached");
            e
        })
}

/// [`upload_app`] followed by [`apply_postinstall_script`] when `lines` is
/// non-empty.
///
/// A script failure after a successful attach comes back as
/// [`Error::PostinstallScript`]; the file stays attached.
pub async fn upload_with_postinstall<T, S>(
    transport: &T,
    policy: &AttachPolicy,
    file_path: &Path,
    app_id: &str,
    lines: &[S],
) -> Result<CustomApp>
where
    T: Transport + ?Sized,
    S: AsRef<str>,
{
    let (app, file_key) = store_and_attach(transport, policy, file_path, app_id).await?;
    if lines.is_empty() {
        return Ok(app);
    }
    apply_postinstall_script(transport, app_id, lines)
        .await
        .map_err(|source| Error::PostinstallScript {
            app_id: app_id.to_string(),
            file_key,
            source: Box::new(source),
        })
}
