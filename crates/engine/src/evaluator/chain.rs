//! Chain templates: match context produced by `as` and consumed by `from`.
//!
//! A condition tagged `as: name` publishes the distinct file paths of its
//! incidents (plus any provider-returned extras) under that name. Sibling
//! conditions tagged `from: name` have `{{name.filepaths}}` and
//! `{{name.<extraKey>}}` placeholders rendered into their payload before
//! dispatch. Templates live only for one rule's evaluation run.

use std::collections::{BTreeMap, HashMap};

use sieve_provider::IncidentContext;

/// Context published by one `as`-tagged condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainTemplate {
    pub filepaths: Vec<String>,
    pub extras: BTreeMap<String, serde_yaml::Value>,
}

impl ChainTemplate {
    /// Build from a condition's incidents: distinct file URIs in first-seen
    /// order, plus provider-returned template context.
    pub fn from_incidents(
        incidents: &[IncidentContext],
        extras: BTreeMap<String, serde_yaml::Value>,
    ) -> Self {
        let mut filepaths = Vec::new();
        for incident in incidents {
            if !filepaths.contains(&incident.uri) {
                filepaths.push(incident.uri.clone());
            }
        }
        Self { filepaths, extras }
    }

    fn lookup(&self, key: &str) -> serde_yaml::Value {
        if key == "filepaths" {
            serde_yaml::Value::Sequence(
                self.filepaths
                    .iter()
                    .cloned()
                    .map(serde_yaml::Value::String)
                    .collect(),
            )
        } else {
            self.extras.get(key).cloned().unwrap_or_default()
        }
    }
}

/// Render all `{{name.key}}` placeholders in a payload's string values.
///
/// A string that is exactly one placeholder is replaced by the template
/// value with its type preserved (so `filepaths` stays a sequence); a
/// placeholder embedded in longer text renders inline, sequences joined
/// with spaces. A name that was never populated renders as an empty value,
/// so a condition chained from an unmatched upstream matches nothing
/// rather than erroring.
pub(crate) fn render_payload(
    payload: &serde_yaml::Value,
    templates: &HashMap<String, ChainTemplate>,
) -> serde_yaml::Value {
    match payload {
        serde_yaml::Value::String(s) => render_string(s, templates),
        serde_yaml::Value::Sequence(items) => serde_yaml::Value::Sequence(
            items.iter().map(|v| render_payload(v, templates)).collect(),
        ),
        serde_yaml::Value::Mapping(map) => serde_yaml::Value::Mapping(
            map.iter()
                .map(|(k, v)| (k.clone(), render_payload(v, templates)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_string(s: &str, templates: &HashMap<String, ChainTemplate>) -> serde_yaml::Value {
    let trimmed = s.trim();
    if let Some(inner) = exact_placeholder(trimmed) {
        return resolve(inner, templates);
    }

    if !s.contains("{{") {
        return serde_yaml::Value::String(s.to_string());
    }

    let mut out = String::new();
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                out.push_str(&scalar_text(&resolve(after[..end].trim(), templates)));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder: emit as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    serde_yaml::Value::String(out)
}

/// If the whole string is a single `{{ ... }}` placeholder, return its body.
fn exact_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn resolve(reference: &str, templates: &HashMap<String, ChainTemplate>) -> serde_yaml::Value {
    let (name, key) = match reference.split_once('.') {
        Some((name, key)) => (name, key),
        None => (reference, "filepaths"),
    };
    match templates.get(name) {
        Some(template) => template.lookup(key),
        // Never populated: empty list for filepaths, empty string otherwise.
        None if key == "filepaths" => serde_yaml::Value::Sequence(Vec::new()),
        None => serde_yaml::Value::String(String::new()),
    }
}

fn scalar_text(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(" "),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates(filepaths: &[&str]) -> HashMap<String, ChainTemplate> {
        let mut extras = BTreeMap::new();
        extras.insert(
            "groupId".to_string(),
            serde_yaml::Value::String("io.vendor".to_string()),
        );
        let mut map = HashMap::new();
        map.insert(
            "poms".to_string(),
            ChainTemplate {
                filepaths: filepaths.iter().map(|s| s.to_string()).collect(),
                extras,
            },
        );
        map
    }

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn exact_placeholder_preserves_sequence_type() {
        let payload = yaml("filepaths: \"{{poms.filepaths}}\"\nxpath: //x");
        let rendered = render_payload(&payload, &templates(&["file:///a/pom.xml"]));
        assert_eq!(
            rendered,
            yaml("filepaths: [\"file:///a/pom.xml\"]\nxpath: //x")
        );
    }

    #[test]
    fn embedded_placeholder_joins_with_spaces() {
        let payload = yaml("pattern: \"search in {{poms.filepaths}}\"");
        let rendered = render_payload(&payload, &templates(&["a.xml", "b.xml"]));
        assert_eq!(rendered, yaml("pattern: \"search in a.xml b.xml\""));
    }

    #[test]
    fn extras_render_by_key() {
        let payload = yaml("group: \"{{poms.groupId}}\"");
        let rendered = render_payload(&payload, &templates(&[]));
        assert_eq!(rendered, yaml("group: \"io.vendor\""));
    }

    #[test]
    fn unpopulated_template_renders_empty_list() {
        let payload = yaml("filepaths: \"{{ghost.filepaths}}\"");
        let rendered = render_payload(&payload, &HashMap::new());
        assert_eq!(rendered, yaml("filepaths: []"));
    }

    #[test]
    fn strings_without_placeholders_untouched() {
        let payload = yaml("pattern: \"*.go\"\ncount: 3");
        assert_eq!(render_payload(&payload, &HashMap::new()), payload);
    }

    #[test]
    fn nested_mappings_are_rendered() {
        let payload = yaml("outer:\n  inner: \"{{poms.filepaths}}\"");
        let rendered = render_payload(&payload, &templates(&["x.xml"]));
        assert_eq!(rendered, yaml("outer:\n  inner: [\"x.xml\"]"));
    }

    #[test]
    fn from_incidents_dedups_preserving_order() {
        let incidents = vec![
            IncidentContext::at_line("file:///b.xml", 3),
            IncidentContext::at_line("file:///a.xml", 1),
            IncidentContext::at_line("file:///b.xml", 9),
        ];
        let template = ChainTemplate::from_incidents(&incidents, BTreeMap::new());
        assert_eq!(template.filepaths, vec!["file:///b.xml", "file:///a.xml"]);
    }
}
