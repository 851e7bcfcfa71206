//! Builtin filesystem provider.
//!
//! Serves the capabilities every analysis needs regardless of language:
//! - `file`: glob match over paths in the source tree
//! - `filecontent`: regex search over file contents
//! - `xml`: element-path query over XML documents
//! - `json`: dotted key-path query over JSON documents
//!
//! Out-of-process providers (language servers, dependency resolvers) expose
//! richer capabilities behind the same [`ServiceClient`] trait; this one is
//! in-process and synchronous under the hood.

mod content;
mod file;
mod json;
mod xml;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Deserializer};
use tracing::debug;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::client::{Provider, ServiceClient};
use crate::error::{ProviderError, Result};
use crate::types::{Capability, Dependency, EvaluationResponse, ProviderConfig};

/// Name conditions use to reference this provider.
pub const PROVIDER_NAME: &str = "builtin";

/// Factory for [`BuiltinClient`].
pub struct BuiltinProvider;

#[async_trait]
impl Provider for BuiltinProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> Vec<Capability> {
        builtin_capabilities()
    }

    async fn init(&self, config: ProviderConfig) -> Result<Arc<dyn ServiceClient>> {
        Ok(Arc::new(BuiltinClient::new(config.location)))
    }
}

fn builtin_capabilities() -> Vec<Capability> {
    vec![
        Capability::new("file"),
        Capability::new("filecontent"),
        Capability::new("xml"),
        Capability::new("json"),
    ]
}

/// Filesystem-backed client bound to one source tree.
pub struct BuiltinClient {
    root: PathBuf,
}

impl BuiltinClient {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve the set of files a condition applies to.
    ///
    /// A `filepaths` scope (usually rendered from a chain template) wins over
    /// any glob; an empty scope yields no candidates, so a condition chained
    /// from an unmatched upstream naturally matches nothing. Without a scope
    /// the source tree is walked, filtered by `file_pattern` when given.
    /// Results are sorted for deterministic output.
    fn candidate_files(
        &self,
        cancel: &CancelToken,
        filepaths: Option<&[String]>,
        file_pattern: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let mut candidates = Vec::new();

        if let Some(paths) = filepaths {
            for raw in paths {
                let path = crate::types::uri_to_path(raw);
                let path = if path.is_absolute() {
                    path
                } else {
                    self.root.join(path)
                };
                if path.is_file() {
                    candidates.push(path);
                } else {
                    debug!(path = %path.display(), "chained filepath does not exist, skipping");
                }
            }
        } else {
            let matcher = file_pattern.map(compile_glob).transpose()?;
            for entry in WalkDir::new(&self.root).into_iter().filter_entry(not_hidden) {
                if cancel.is_cancelled() {
                    return Err(ProviderError::Cancelled);
                }
                let entry = entry.map_err(|e| {
                    ProviderError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::other("walkdir error")
                    }))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                match &matcher {
                    Some(m) if !matches_path(m, entry.path(), &self.root) => continue,
                    _ => candidates.push(entry.into_path()),
                }
            }
        }

        candidates.sort();
        Ok(candidates)
    }
}

#[async_trait]
impl ServiceClient for BuiltinClient {
    fn capabilities(&self) -> Vec<Capability> {
        builtin_capabilities()
    }

    async fn evaluate(
        &self,
        cancel: &CancelToken,
        capability: &str,
        payload: &serde_yaml::Value,
    ) -> Result<EvaluationResponse> {
        match capability {
            "file" => file::evaluate(self, cancel, decode(capability, payload)?),
            "filecontent" => content::evaluate(self, cancel, decode(capability, payload)?),
            "xml" => xml::evaluate(self, cancel, decode(capability, payload)?),
            "json" => json::evaluate(self, cancel, decode(capability, payload)?),
            other => Err(ProviderError::UnknownCapability {
                provider: PROVIDER_NAME.to_string(),
                capability: other.to_string(),
            }),
        }
    }

    async fn get_dependencies(&self, _cancel: &CancelToken) -> Result<Vec<Dependency>> {
        // The builtin provider has no notion of a dependency graph.
        Ok(Vec::new())
    }
}

/// Decode an opaque condition payload into a capability-specific shape.
fn decode<T: serde::de::DeserializeOwned>(capability: &str, payload: &serde_yaml::Value) -> Result<T> {
    serde_yaml::from_value(payload.clone()).map_err(|e| ProviderError::InvalidPayload {
        capability: capability.to_string(),
        message: e.to_string(),
    })
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)?.compile_matcher())
}

/// Match a glob against the file name, or against the root-relative path
/// when the pattern itself contains a separator.
fn matches_path(matcher: &GlobMatcher, path: &std::path::Path, root: &std::path::Path) -> bool {
    if matcher.glob().glob().contains('/') {
        path.strip_prefix(root)
            .map(|rel| matcher.is_match(rel))
            .unwrap_or(false)
    } else {
        path.file_name().map(|n| matcher.is_match(n)).unwrap_or(false)
    }
}

fn not_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() == 0
        || entry
            .file_name()
            .to_str()
            .map(|n| !n.starts_with('.'))
            .unwrap_or(true)
}

/// Accept `filepaths` as either a YAML sequence or a whitespace-separated
/// string (the form a chain placeholder renders to when embedded in text).
pub(crate) fn de_filepaths<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Many(Vec<String>),
        One(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Many(paths)) => Some(paths),
        Some(Raw::One(s)) => Some(s.split_whitespace().map(str::to_string).collect()),
    })
}
