//! `file` capability: glob match over paths in the source tree.

use serde::Deserialize;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::types::{path_to_uri, EvaluationResponse, IncidentContext};

use super::{compile_glob, de_filepaths, matches_path, BuiltinClient};

/// Payload shape for `builtin.file`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct FileCondition {
    /// Glob matched against file names, or against root-relative paths when
    /// the pattern contains a separator.
    pub pattern: String,
    /// Optional scope, usually rendered from a chain template.
    #[serde(default, deserialize_with = "de_filepaths")]
    pub filepaths: Option<Vec<String>>,
}

pub(super) fn evaluate(
    client: &BuiltinClient,
    cancel: &CancelToken,
    cond: FileCondition,
) -> Result<EvaluationResponse> {
    let matcher = compile_glob(&cond.pattern)?;

    // Scoped invocations still apply the pattern; unscoped walks are
    // filtered inside candidate_files already.
    let candidates = match cond.filepaths {
        Some(paths) => client
            .candidate_files(cancel, Some(&paths), None)?
            .into_iter()
            .filter(|p| matches_path(&matcher, p, &client.root))
            .collect(),
        None => client.candidate_files(cancel, None, Some(&cond.pattern))?,
    };

    let incidents = candidates
        .iter()
        .map(|path| IncidentContext::for_file(path_to_uri(path)))
        .collect();

    Ok(EvaluationResponse::from_incidents(incidents))
}
