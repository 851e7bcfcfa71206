//! Code snippet extraction for incidents.

use std::fs;

use sieve_provider::uri_to_path;

/// Source of code excerpts attached to incidents.
///
/// The engine consumes this behind a budget counter; the filesystem
/// implementation below suits in-process analysis, remote providers can
/// supply their own.
pub trait SnippetSource: Send + Sync {
    /// Excerpt around the given location, or `None` if unavailable.
    fn snippet(&self, uri: &str, line: Option<u32>) -> Option<String>;
}

/// Reads snippets straight from the analyzed source tree.
pub struct FsSnippetSource {
    context_lines: usize,
}

impl FsSnippetSource {
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }
}

impl SnippetSource for FsSnippetSource {
    fn snippet(&self, uri: &str, line: Option<u32>) -> Option<String> {
        let path = uri_to_path(uri);
        let contents = fs::read_to_string(path).ok()?;
        let lines: Vec<&str> = contents.lines().collect();
        if lines.is_empty() {
            return None;
        }

        let center = line.unwrap_or(1).max(1) as usize;
        let start = center.saturating_sub(self.context_lines + 1);
        let end = (center + self.context_lines).min(lines.len());
        if start >= end {
            return None;
        }

        let excerpt: Vec<String> = lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{:>4}  {}", start + i + 1, text))
            .collect();
        Some(excerpt.join("\n"))
    }
}
