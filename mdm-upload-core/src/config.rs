use std::time::Duration;
use tracing::{debug, info};

/// Base URL and bearer token for the remote API.
///
/// Collaborators build this from a config file or the environment and hand it
/// to [`crate::transport::HttpTransport::new`]; nothing in this crate reads
/// configuration on its own.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_token: String,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            api_url = %self.api_url,
            token_set = !self.api_token.is_empty(),
            "Loaded client config"
        );
    }
}

// Keep the token out of debug output and logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Bounds of the attach loop.
#[derive(Debug, Clone)]
pub struct AttachPolicy {
    /// Retries allowed after the initial attach attempt.
    pub max_retries: u32,
    /// Fixed wait between attempts.
    pub retry_delay: Duration,
}

impl AttachPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 10;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

    pub fn trace_loaded(&self) {
        debug!(
            max_retries = self.max_retries,
            retry_delay_ms = self.retry_delay.as_millis() as u64,
            "Attach policy"
        );
    }
}

impl Default for AttachPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash_from_api_url() {
        let conf = ClientConfig::new("https://tenant.example.com/", "secret");
        assert_eq!(conf.api_url, "https://tenant.example.com");
    }

    #[test]
    fn debug_output_redacts_token() {
        let conf = ClientConfig::new("https://tenant.example.com", "secret");
        let rendered = format!("{conf:?}");
        assert!(!rendered.contains("secret"), "token leaked: {rendered}");
    }

    #[test]
    fn default_policy_is_ten_retries_five_seconds_apart() {
        let policy = AttachPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.retry_delay, Duration::from_secs(5));
    }
}
