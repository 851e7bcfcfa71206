//! `xml` capability: element-path query over XML documents.
//!
//! Supports the element-path subset of XPath: `//a/b` matches any element
//! whose ancestry ends in `a/b`, `/a/b` matches from the document root.
//! Attribute and text predicates are not supported.

use std::fs;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::cancel::CancelToken;
use crate::error::{ProviderError, Result};
use crate::types::{path_to_uri, EvaluationResponse, IncidentContext};

use super::{de_filepaths, BuiltinClient};

/// Payload shape for `builtin.xml`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct XmlCondition {
    /// Element path, e.g. `//dependencies/dependency`.
    pub xpath: String,
    #[serde(rename = "filePattern", default)]
    pub file_pattern: Option<String>,
    #[serde(default, deserialize_with = "de_filepaths")]
    pub filepaths: Option<Vec<String>>,
}

pub(super) fn evaluate(
    client: &BuiltinClient,
    cancel: &CancelToken,
    cond: XmlCondition,
) -> Result<EvaluationResponse> {
    let query = ElementPath::parse(&cond.xpath).ok_or_else(|| ProviderError::InvalidPayload {
        capability: "xml".to_string(),
        message: format!("unsupported element path '{}'", cond.xpath),
    })?;

    // Without an explicit scope, search every XML document in the tree.
    let file_pattern = cond.file_pattern.as_deref().unwrap_or("*.xml");
    let candidates = client.candidate_files(cancel, cond.filepaths.as_deref(), Some(file_pattern))?;

    let mut incidents = Vec::new();
    for path in candidates {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let uri = path_to_uri(&path);
        query
            .matches_in(&contents, &uri, &mut incidents)
            .map_err(|e| ProviderError::Xml {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
    }

    Ok(EvaluationResponse::from_incidents(incidents))
}

/// Parsed element path.
struct ElementPath {
    segments: Vec<String>,
    /// `/a/b` anchors at the root; `//a/b` matches any suffix.
    anchored: bool,
}

impl ElementPath {
    fn parse(expr: &str) -> Option<Self> {
        let (anchored, rest) = if let Some(rest) = expr.strip_prefix("//") {
            (false, rest)
        } else if let Some(rest) = expr.strip_prefix('/') {
            (true, rest)
        } else {
            (false, expr)
        };

        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty() || s.contains(['[', '@'])) {
            return None;
        }
        Some(Self { segments, anchored })
    }

    fn matches_stack(&self, stack: &[String]) -> bool {
        if self.anchored {
            stack == self.segments.as_slice()
        } else {
            stack.ends_with(&self.segments)
        }
    }

    /// Scan one document, appending an incident per matching element.
    fn matches_in(
        &self,
        contents: &str,
        uri: &str,
        incidents: &mut Vec<IncidentContext>,
    ) -> std::result::Result<(), quick_xml::Error> {
        let mut reader = Reader::from_str(contents);
        let mut stack: Vec<String> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let offset = reader.buffer_position() as usize;
                    stack.push(local_name(e.name().as_ref()));
                    if self.matches_stack(&stack) {
                        incidents
                            .push(IncidentContext::at_line(uri, line_of_offset(contents, offset)));
                    }
                }
                Event::Empty(e) => {
                    let offset = reader.buffer_position() as usize;
                    stack.push(local_name(e.name().as_ref()));
                    if self.matches_stack(&stack) {
                        incidents
                            .push(IncidentContext::at_line(uri, line_of_offset(contents, offset)));
                    }
                    stack.pop();
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }
}

fn local_name(qname: &[u8]) -> String {
    let name = String::from_utf8_lossy(qname);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

/// 1-based line number of a byte offset.
fn line_of_offset(contents: &str, offset: usize) -> u32 {
    let end = offset.min(contents.len());
    contents[..end].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}
