//! reqwest-backed [`Transport`] for the custom app library API.
//!
//! Every API call carries the bearer token and JSON headers; failures are
//! normalized into [`Error::Api`] with the server payload left intact so the
//! attach loop can inspect status and message. The storage push goes
//! straight to the signed URL without the token.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::config::ClientConfig;
use crate::contract::{AppPatch, CustomApp, SignedUploadTarget, StorageReceipt, Transport};
use crate::error::{Error, Result};

const APPS_PATH: &str = "/api/v1/library/custom-apps";
const UPLOAD_PATH: &str = "/api/v1/library/custom-apps/upload";

fn user_agent() -> String {
    format!("mdm-upload/{}", env!("CARGO_PKG_VERSION"))
}

pub struct HttpTransport {
    client: Client,
    api_url: String,
    api_token: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(Duration::from_secs(300))
            .build()?;
        tracing::info!(
            api_url = %config.api_url,
            token_set = !config.api_token.is_empty(),
            "Initialized HTTP transport"
        );
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// One authenticated JSON call. No retries.
    async fn request<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%method, %url, has_body = body.is_some(), "Sending API request");

        let mut req = self
            .client
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        handle_response(response).await
    }
}

async fn handle_response<R: DeserializeOwned>(response: Response) -> Result<R> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let payload = serde_json::from_str::<serde_json::Value>(&text).ok();
        let message = error_message(payload.as_ref(), &text)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_default();
        tracing::debug!(status = status.as_u16(), %message, "API request failed");
        return Err(Error::Api {
            status: status.as_u16(),
            message,
            payload,
        });
    }

    serde_json::from_str(&text).map_err(|e| Error::Decode(format!("{e}: {text}")))
}

/// Human-readable message from an error body: the first string found in
/// `detail`, `message` or `error`, else the raw text.
fn error_message(payload: Option<&serde_json::Value>, raw: &str) -> Option<String> {
    if let Some(obj) = payload.and_then(|p| p.as_object()) {
        for field in ["detail", "message", "error"] {
            if let Some(s) = obj.get(field).and_then(|v| v.as_str()) {
                return Some(s.to_string());
            }
        }
    }
    if let Some(s) = payload.and_then(|p| p.as_str()) {
        return Some(s.to_string());
    }
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Text fields of the storage form in send order: the canonical `key`
/// first, then every policy field except a duplicate `key`. The backend
/// includes `key` in `post_data` as well; sending it twice breaks the
/// policy check.
pub fn storage_form_fields(target: &SignedUploadTarget) -> Vec<(String, String)> {
    let mut fields = vec![("key".to_string(), target.file_key.clone())];
    for (name, value) in &target.post_data {
        if name == "key" {
            continue;
        }
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        fields.push((name.clone(), value));
    }
    fields
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AppList {
    Bare(Vec<CustomApp>),
    Paged { results: Vec<CustomApp> },
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_app(&self, app_id: &str) -> Result<CustomApp> {
        tracing::info!(app_id, "Fetching custom app");
        self.request::<(), _>(Method::GET, &format!("{APPS_PATH}/{app_id}"), None)
            .await
    }

    async fn list_apps(&self) -> Result<Vec<CustomApp>> {
        tracing::info!("Listing custom apps");
        let list: AppList = self.request::<(), _>(Method::GET, APPS_PATH, None).await?;
        let apps = match list {
            AppList::Bare(apps) => apps,
            AppList::Paged { results } => results,
        };
        tracing::info!(count = apps.len(), "Fetched custom apps");
        Ok(apps)
    }

    async fn request_upload_target(&self, filename: &str) -> Result<SignedUploadTarget> {
        tracing::info!(filename, "Requesting signed upload target");
        let response = self
            .client
            .post(self.url(UPLOAD_PATH))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .header(ACCEPT, "application/json")
            .form(&[("name", filename)])
            .send()
            .await?;
        let target: SignedUploadTarget = handle_response(response).await?;
        tracing::info!(
            file_key = %target.file_key,
            post_fields = target.post_data.len(),
            "Received signed upload target"
        );
        Ok(target)
    }

    async fn push_to_storage(
        &self,
        file_path: &Path,
        target: &SignedUploadTarget,
    ) -> Result<StorageReceipt> {
        let io_err = |source| Error::Io {
            path: file_path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(file_path).await.map_err(io_err)?;
        let length = file.metadata().await.map_err(io_err)?.len();
        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(file_path.to_path_buf()))?
            .to_string();

        let mut form = Form::new();
        for (name, value) in storage_form_fields(target) {
            form = form.text(name, value);
        }
        let file_part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(filename);
        form = form.part("file", file_part);

        tracing::info!(
            post_url = %target.post_url,
            file_key = %target.file_key,
            bytes = length,
            "Pushing file to storage"
        );
        let response = self
            .client
            .post(&target.post_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), %body, "Storage upload rejected");
            return Err(Error::StorageUpload {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(status = status.as_u16(), "Storage upload accepted");
        Ok(StorageReceipt {
            status: status.as_u16(),
            body,
        })
    }

    async fn patch_app(&self, app_id: &str, patch: &AppPatch) -> Result<CustomApp> {
        tracing::info!(
            app_id,
            file_key = patch.file_key.as_deref(),
            postinstall_script = patch.postinstall_script.is_some(),
            "Patching custom app"
        );
        self.request(Method::PATCH, &format!("{APPS_PATH}/{app_id}"), Some(patch))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn target(post_data: serde_json::Value) -> SignedUploadTarget {
        let post_data: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(post_data).unwrap();
        SignedUploadTarget {
            post_url: "https://s3/x".into(),
            file_key: "k1".into(),
            post_data,
        }
    }

    #[test]
    fn storage_fields_put_key_first_and_skip_duplicate_key() {
        let fields = storage_form_fields(&target(json!({
            "key": "server-copy",
            "policy": "p",
            "x-amz-signature": "sig"
        })));

        assert_eq!(fields[0], ("key".to_string(), "k1".to_string()));
        assert_eq!(fields.iter().filter(|(name, _)| name == "key").count(), 1);
        assert!(fields.contains(&("policy".to_string(), "p".to_string())));
        assert!(fields.contains(&("x-amz-signature".to_string(), "sig".to_string())));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn storage_fields_stringify_non_string_values() {
        let fields = storage_form_fields(&target(json!({ "success_action_status": 201 })));
        assert_eq!(
            fields[1],
            ("success_action_status".to_string(), "201".to_string())
        );
    }

    #[test]
    fn error_message_prefers_structured_fields() {
        let payload = json!({ "detail": "object is still being processed" });
        assert_eq!(
            error_message(Some(&payload), "ignored").as_deref(),
            Some("object is still being processed")
        );

        let payload = json!({ "error": "resource not found" });
        assert_eq!(
            error_message(Some(&payload), "ignored").as_deref(),
            Some("resource not found")
        );
    }

    #[test]
    fn error_message_falls_back_to_raw_text() {
        assert_eq!(
            error_message(None, "  Bad Gateway \n").as_deref(),
            Some("Bad Gateway")
        );
        let payload = json!({ "code": 7 });
        assert_eq!(
            error_message(Some(&payload), "{\"code\":7}").as_deref(),
            Some("{\"code\":7}")
        );
        assert_eq!(error_message(None, ""), None);
    }
}
