//! # contract: data model and the transport seam
//!
//! Plain data types exchanged with the custom app library API and the
//! [`Transport`] trait the upload workflow is written against.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so tests can script every call
//!   the workflow makes, including the exact sequence of attach responses.
//!
//! ## Implementations
//! - [`crate::transport::HttpTransport`] talks to the real API over reqwest.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A custom app record in the device-management library.
///
/// Only `id` is owned by the caller; everything else is server-side state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomApp {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub file_key: Option<String>,
    #[serde(default)]
    pub postinstall_script: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Short-lived upload destination handed out by the backend.
///
/// Consumed by exactly one storage push and never reused.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignedUploadTarget {
    pub post_url: String,
    pub file_key: String,
    /// Extra form fields demanded by the storage POST policy.
    #[serde(default)]
    pub post_data: BTreeMap<String, serde_json::Value>,
}

/// What the storage backend answered to a successful push.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageReceipt {
    pub status: u16,
    pub body: String,
}

/// PATCH body for a custom app. Unset fields are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postinstall_script: Option<String>,
}

impl AppPatch {
    pub fn file_key(key: impl Into<String>) -> Self {
        Self {
            file_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn postinstall_script(script: impl Into<String>) -> Self {
        Self {
            postinstall_script: Some(script.into()),
            ..Self::default()
        }
    }
}

/// One authenticated call per method against the custom app library API.
///
/// Implementations must not retry: the attach loop in [`crate::upload`]
/// owns the retry policy and needs to see every failure as it happened.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one custom app by id.
    async fn get_app(&self, app_id: &str) -> Result<CustomApp>;

    /// List all custom apps in the library.
    async fn list_apps(&self) -> Result<Vec<CustomApp>>;

    /// Ask the backend for a signed storage destination for `filename`.
    async fn request_upload_target(&self, filename: &str) -> Result<SignedUploadTarget>;

    /// Stream the file at `file_path` to the signed storage destination.
    async fn push_to_storage(
        &self,
        file_path: &Path,
        target: &SignedUploadTarget,
    ) -> Result<StorageReceipt>;

    /// Patch fields of a custom app and return the updated record.
    async fn patch_app(&self, app_id: &str, patch: &AppPatch) -> Result<CustomApp>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_serializes_only_the_field_being_set() {
        let body = serde_json::to_value(AppPatch::file_key("k1")).unwrap();
        assert_eq!(body, serde_json::json!({ "file_key": "k1" }));

        let body = serde_json::to_value(AppPatch::postinstall_script("echo hi")).unwrap();
        assert_eq!(body, serde_json::json!({ "postinstall_script": "echo hi" }));
    }

    #[test]
    fn custom_app_tolerates_missing_and_unknown_fields() {
        let app: CustomApp = serde_json::from_value(serde_json::json!({
            "id": "app-123",
            "name": "Agent",
            "install_type": "package",
            "show_in_self_service": false
        }))
        .unwrap();
        assert_eq!(app.id, "app-123");
        assert_eq!(app.name.as_deref(), Some("Agent"));
        assert!(app.file_key.is_none());
    }

    #[test]
    fn signed_target_defaults_empty_post_data() {
        let target: SignedUploadTarget = serde_json::from_value(serde_json::json!({
            "post_url": "https://s3/x",
            "file_key": "k1"
        }))
        .unwrap();
        assert!(target.post_data.is_empty());
    }
}
