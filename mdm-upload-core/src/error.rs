//! Error taxonomy shared by the transport, the upload workflow and the
//! release lifecycle.

use std::path::PathBuf;
use thiserror::Error;

/// Marker the backend puts in its 503 message while an uploaded object is
/// not yet attachable. Matched literally; if the backend rewords it the
/// attach loop stops retrying.
pub const STILL_PROCESSING_MARKER: &str = "still being processed";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("asset pattern {pattern:?} matched {} files, expected exactly one{}", .matches.len(), format_matches(.matches))]
    AssetResolution {
        pattern: String,
        matches: Vec<PathBuf>,
    },

    #[error("invalid upload path: {0:?}")]
    InvalidPath(PathBuf),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        message: String,
        payload: Option<serde_json::Value>,
    },

    #[error("storage upload failed with status {status}: {body}")]
    StorageUpload { status: u16, body: String },

    #[error("unable to verify updated resource after {attempts} attempts")]
    ConvergenceTimeout { attempts: u32 },

    #[error("file uploaded to storage as {file_key} but not attached to app {app_id}")]
    Unattached {
        app_id: String,
        file_key: String,
        #[source]
        source: Box<Error>,
    },

    #[error("file {file_key} attached to app {app_id} but the post-install script was not updated")]
    PostinstallScript {
        app_id: String,
        file_key: String,
        #[source]
        source: Box<Error>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl Error {
    /// The one failure the attach loop waits out: a 503 whose message says
    /// the uploaded object is still being processed.
    pub fn is_still_processing(&self) -> bool {
        match self {
            Error::Api {
                status: 503,
                message,
                ..
            } => message.contains(STILL_PROCESSING_MARKER),
            _ => false,
        }
    }

    /// The underlying failure, looking through [`Error::Unattached`] and
    /// [`Error::PostinstallScript`].
    pub fn root(&self) -> &Error {
        match self {
            Error::Unattached { source, .. } | Error::PostinstallScript { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}

fn format_matches(matches: &[PathBuf]) -> String {
    if matches.is_empty() {
        return String::new();
    }
    let listed: Vec<String> = matches.iter().map(|p| p.display().to_string()).collect();
    format!(": {}", listed.join(", "))
}
