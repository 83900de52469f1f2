//! Configuration loading and remote URL construction.
//!
//! The config is a JSON file holding the account credentials plus a few
//! optional knobs. Lookup order: explicit `--config` path, then
//! `./cos.config.json`, then `~/.cos.config.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DEFAULT_SLICE_WORKERS, DEFAULT_TRANSFER_WORKERS};

const CONFIG_FILE: &str = "cos.config.json";
const HOME_CONFIG_FILE: &str = ".cos.config.json";

const DEFAULT_API_ENDPOINT: &str = "https://web.file.myqcloud.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosConfig {
    pub app_id: u64,
    pub secret_id: String,
    pub secret_key: String,
    pub bucket: String,

    /// Override for the JSON API host (list/stat/upload/delete/move).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,

    /// Override for the object download host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_endpoint: Option<String>,

    /// Cap on concurrent whole-file transfers (default 20).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_workers: Option<usize>,

    /// Cap on concurrent slice uploads within one large file (default 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_workers: Option<usize>,
}

impl CosConfig {
    /// Load the config, returning it together with the path it came from.
    pub fn load(explicit: Option<&Path>) -> Result<(CosConfig, PathBuf)> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => Self::discover()?,
        };
        let config = Self::load_from(&path)?;
        Ok((config, path))
    }

    fn discover() -> Result<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }
        if let Some(home) = dirs::home_dir() {
            let fallback = home.join(HOME_CONFIG_FILE);
            if fallback.exists() {
                return Ok(fallback);
            }
        }
        Err(Error::Config(format!(
            "no {CONFIG_FILE} in the current directory and no ~/{HOME_CONFIG_FILE}"
        )))
    }

    pub fn load_from(path: &Path) -> Result<CosConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn transfer_workers(&self) -> usize {
        self.transfer_workers.unwrap_or(DEFAULT_TRANSFER_WORKERS)
    }

    pub fn slice_workers(&self) -> usize {
        self.slice_workers.unwrap_or(DEFAULT_SLICE_WORKERS)
    }

    /// Resource id embedded in single-use signatures: `/{app_id}/{bucket}{path}`.
    pub fn file_id(&self, path: &str) -> String {
        format!("/{}/{}{}", self.app_id, self.bucket, path)
    }

    /// URL of the JSON API resource for `path`.
    pub fn api_url(&self, path: &str) -> String {
        let base = self
            .api_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_API_ENDPOINT);
        format!(
            "{}/files/v2/{}/{}{}",
            base.trim_end_matches('/'),
            self.app_id,
            self.bucket,
            encode_path(path)
        )
    }

    /// URL an object's bytes are fetched from.
    pub fn download_url(&self, path: &str) -> String {
        match self.download_endpoint.as_deref() {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), encode_path(path)),
            None => format!(
                "https://{}-{}.cos.myqcloud.com{}",
                self.bucket,
                self.app_id,
                encode_path(path)
            ),
        }
    }
}

/// Percent-encode each path segment individually, keeping `/` as separator.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a user-supplied remote path to start with `/`.
pub fn normalize_remote(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
