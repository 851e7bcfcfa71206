//! `json` capability: dotted key-path query over JSON documents.

use std::fs;

use serde::Deserialize;
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::error::{ProviderError, Result};
use crate::types::{path_to_uri, EvaluationResponse, IncidentContext};

use super::{de_filepaths, BuiltinClient};

/// Payload shape for `builtin.json`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct JsonCondition {
    /// Dotted key path, e.g. `dependencies.name`. Arrays are traversed
    /// element-wise.
    pub keypath: String,
    #[serde(rename = "filePattern", default)]
    pub file_pattern: Option<String>,
    #[serde(default, deserialize_with = "de_filepaths")]
    pub filepaths: Option<Vec<String>>,
}

pub(super) fn evaluate(
    client: &BuiltinClient,
    cancel: &CancelToken,
    cond: JsonCondition,
) -> Result<EvaluationResponse> {
    let segments: Vec<&str> = cond.keypath.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(ProviderError::InvalidPayload {
            capability: "json".to_string(),
            message: "keypath must not be empty".to_string(),
        });
    }

    let file_pattern = cond.file_pattern.as_deref().unwrap_or("*.json");
    let candidates = client.candidate_files(cancel, cond.filepaths.as_deref(), Some(file_pattern))?;

    let mut incidents = Vec::new();
    for path in candidates {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(doc) = serde_json::from_str::<Value>(&contents) else {
            continue;
        };

        let uri = path_to_uri(&path);
        let mut found = Vec::new();
        collect(&doc, &segments, &mut found);
        for value in found {
            let mut incident = IncidentContext::for_file(&uri);
            if let Ok(v) = serde_yaml::to_value(&value) {
                incident.variables.insert("value".to_string(), v);
            }
            incidents.push(incident);
        }
    }

    Ok(EvaluationResponse::from_incidents(incidents))
}

/// Collect values reachable by the key path, descending through arrays.
fn collect<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a Value>) {
    match (value, path) {
        (v, []) => out.push(v),
        (Value::Array(items), _) => {
            for item in items {
                collect(item, path, out);
            }
        }
        (Value::Object(map), [head, rest @ ..]) => {
            if let Some(next) = map.get(*head) {
                collect(next, rest, out);
            }
        }
        _ => {}
    }
}
