//! Exchange types shared between the engine and backend providers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A named operation a provider advertises and implements.
///
/// Conditions reference capabilities as `<provider>.<capability>`; a
/// condition naming a capability its provider never advertised is rejected
/// at rule-load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capability {
    pub name: String,
    /// Shape of the template context this capability publishes for chaining,
    /// as an example/schema value. Empty mapping if it publishes none.
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub template_context: serde_yaml::Value,
}

impl Capability {
    /// A capability that publishes no template context beyond filepaths.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_context: serde_yaml::Value::Null,
        }
    }
}

/// One concrete occurrence of a matched pattern at a specific file/line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentContext {
    /// Location of the match as a `file://` URI.
    pub uri: String,
    /// 1-based line number, when the capability can determine one.
    #[serde(rename = "lineNumber", skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Provider-specific variables (e.g. the matching text) used for
    /// message templating and custom-variable extraction.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, serde_yaml::Value>,
    /// Source excerpt around the match, attached by the engine up to its
    /// snippet budget.
    #[serde(rename = "codeSnip", skip_serializing_if = "Option::is_none")]
    pub code_snip: Option<String>,
}

impl IncidentContext {
    /// Incident at a file with no line information.
    pub fn for_file(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            line_number: None,
            message: String::new(),
            variables: BTreeMap::new(),
            code_snip: None,
        }
    }

    /// Incident at a specific line.
    pub fn at_line(uri: impl Into<String>, line: u32) -> Self {
        Self {
            line_number: Some(line),
            ..Self::for_file(uri)
        }
    }
}

/// A project dependency reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// Result of evaluating one leaf condition against a provider.
#[derive(Debug, Clone, Default)]
pub struct EvaluationResponse {
    pub matched: bool,
    pub incidents: Vec<IncidentContext>,
    /// Extra keys published for chain-template substitution, beyond the
    /// filepaths the engine derives from `incidents`.
    pub template_context: BTreeMap<String, serde_yaml::Value>,
}

impl EvaluationResponse {
    /// Response with matched-ness derived from the incident list.
    pub fn from_incidents(incidents: Vec<IncidentContext>) -> Self {
        Self {
            matched: !incidents.is_empty(),
            incidents,
            template_context: BTreeMap::new(),
        }
    }
}

/// Configuration handed to a provider at init time.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Root of the source tree under analysis.
    pub location: PathBuf,
}

// ── URI helpers ─────────────────────────────────────────────────────

/// Render a filesystem path as a `file://` URI.
pub fn path_to_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Strip the `file://` scheme from a URI, returning a filesystem path.
///
/// Paths without the scheme are passed through unchanged.
pub fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}
