//! `filecontent` capability: regex search over file contents.

use std::fs;

use regex::Regex;
use serde::Deserialize;

use crate::cancel::CancelToken;
use crate::error::{ProviderError, Result};
use crate::types::{path_to_uri, EvaluationResponse, IncidentContext};

use super::{de_filepaths, BuiltinClient};

/// Payload shape for `builtin.filecontent`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct FileContentCondition {
    /// Regex applied line by line.
    pub pattern: String,
    /// Glob narrowing which files are searched.
    #[serde(rename = "filePattern", default)]
    pub file_pattern: Option<String>,
    #[serde(default, deserialize_with = "de_filepaths")]
    pub filepaths: Option<Vec<String>>,
}

pub(super) fn evaluate(
    client: &BuiltinClient,
    cancel: &CancelToken,
    cond: FileContentCondition,
) -> Result<EvaluationResponse> {
    let regex = Regex::new(&cond.pattern)?;
    let candidates =
        client.candidate_files(cancel, cond.filepaths.as_deref(), cond.file_pattern.as_deref())?;

    let mut incidents = Vec::new();
    for path in candidates {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        // Binary or unreadable files are not an error for a content search.
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        let uri = path_to_uri(&path);
        for (idx, line) in contents.lines().enumerate() {
            if let Some(found) = regex.find(line) {
                let mut incident = IncidentContext::at_line(&uri, idx as u32 + 1);
                incident.variables.insert(
                    "matchingText".to_string(),
                    serde_yaml::Value::String(found.as_str().to_string()),
                );
                incidents.push(incident);
            }
        }
    }

    Ok(EvaluationResponse::from_incidents(incidents))
}
