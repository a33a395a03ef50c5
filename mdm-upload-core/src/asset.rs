//! Resolve a templated asset path such as `dist/Agent-${version}-*.pkg` to
//! the single build artifact it names.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};

pub const VERSION_PLACEHOLDER: &str = "${version}";

/// Substitute the release version into the pattern.
pub fn render_pattern(template: &str, version: &str) -> String {
    template.replace(VERSION_PLACEHOLDER, version)
}

/// Render `template` for `version` and glob it. Exactly one file must match.
pub fn resolve_asset(template: &str, version: &str) -> Result<PathBuf> {
    let pattern = render_pattern(template, version);
    debug!(%pattern, "Resolving asset pattern");

    let entries = glob::glob(&pattern)
        .map_err(|e| Error::Config(format!("invalid asset pattern {pattern:?}: {e}")))?;

    let mut matches = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => matches.push(path),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(Error::Io {
                    path,
                    source: e.into(),
                });
            }
        }
    }

    if matches.len() != 1 {
        return Err(Error::AssetResolution { pattern, matches });
    }
    let asset = matches.remove(0);
    info!(asset = %asset.display(), "Resolved release asset");
    Ok(asset)
}
