//! Tunnel access tokens.
//!
//! Cloud-mode endpoints sit behind an access proxy that expects a
//! `CF_Authorization` cookie. The proxy client drops fresh tokens into a
//! folder; the newest file whose name starts with the service prefix wins.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No token files starting with '{prefix}' found in {}", .folder.display())]
    NotFound { folder: PathBuf, prefix: String },

    #[error("IO error reading tokens: {0}")]
    Io(#[from] std::io::Error),
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Read the newest token file in `folder` whose name starts with `prefix`.
pub fn latest_token(folder: &Path, prefix: &str) -> Result<String, CredentialError> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(prefix) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
            newest = Some((modified, entry.path()));
        }
    }

    let (_, path) = newest.ok_or_else(|| CredentialError::NotFound {
        folder: folder.to_path_buf(),
        prefix: prefix.to_string(),
    })?;

    debug!("[CONFIG] Using token file {}", path.display());
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Cookie header value for a tunnel token
pub fn tunnel_cookie(token: &str) -> String {
    format!("CF_Authorization={}", token)
}
