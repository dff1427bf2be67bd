//! Fetch and store collaborators, and the filters that use them
//!
//! The evaluator never touches the network or the filesystem itself. These
//! traits are the only way in; `fetch`, `download` and `store` filters exist
//! only on registries built with [`FilterRegistry::install_remote`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FilterError, RegistryError};
use crate::filters::{map_text, FilterRegistry};
use crate::value::Value;

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FilterError>;
}

pub trait Storer: Send + Sync {
    /// Persists `value` under `path` and returns the path it was written to.
    /// `fetched` tells whether the bytes came from a fetch or from the
    /// extracted value itself.
    fn store(&self, value: &[u8], path: &str, fetched: bool) -> Result<String, FilterError>;
}

/// Blocking HTTP fetcher
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(timeout_secs)))
                .user_agent(user_agent)
                .build(),
        );
        Self { agent }
    }
}

impl Fetcher for UreqFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FilterError> {
        let resp = self
            .agent
            .get(url)
            .call()
            .map_err(|e| FilterError::External(format!("Failed to fetch {}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(FilterError::External(format!("HTTP {} for {}", resp.status(), url)));
        }
        resp.into_body()
            .read_to_vec()
            .map_err(|e| FilterError::External(format!("Failed to read {}: {}", url, e)))
    }
}

/// Writes files below a root directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FilterError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(FilterError::InvalidParams(format!("store path `{}` escapes the root", path)));
        }
        Ok(self.root.join(relative))
    }
}

impl Storer for FsStore {
    fn store(&self, value: &[u8], path: &str, fetched: bool) -> Result<String, FilterError> {
        let target = self.resolve(path)?;
        let io = |e: std::io::Error| FilterError::External(format!("Failed to write {}: {}", target.display(), e));

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(&target, value).map_err(io)?;

        tracing::debug!(path = %target.display(), bytes = value.len(), fetched, "stored value");
        Ok(target.to_string_lossy().into_owned())
    }
}

/// Last path segment of a URL, used when `download` gets no path
fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(String::from)
}

impl FilterRegistry {
    /// Adds the `fetch`, `download` and `store` filters bound to the given
    /// collaborators
    pub fn install_remote(
        &mut self,
        fetcher: Arc<dyn Fetcher>,
        storer: Arc<dyn Storer>,
    ) -> Result<&mut Self, RegistryError> {
        let fetch_with = Arc::clone(&fetcher);
        let store_download = Arc::clone(&storer);

        self.register("fetch", "Replace a URL with the body it points to", "fetch", move |value, _| {
            map_text(value, |url| {
                let body = fetch_with.fetch(url)?;
                Ok(String::from_utf8_lossy(&body).into_owned())
            })
        })?
        .register(
            "download",
            "Download the URL and store it; the value becomes the stored path",
            "download(images/a.png)",
            move |value, params| {
                map_text(value, |url| {
                    let path = if params.is_empty() {
                        file_name_from_url(url).ok_or_else(|| {
                            FilterError::InvalidParams(format!("no file name in `{}`", url))
                        })?
                    } else {
                        params.to_string()
                    };
                    let body = fetcher.fetch(url)?;
                    store_download.store(&body, &path, true)
                })
            },
        )?
        .register(
            "store",
            "Store the value as a file; the value becomes the stored path",
            "store(pages/a.html)",
            move |value, params| {
                if params.is_empty() {
                    return Err(FilterError::InvalidParams("store needs a path".to_string()));
                }
                map_text(value, |text| storer.store(text.as_bytes(), params, false))
            },
        )?;
        Ok(self)
    }
}
