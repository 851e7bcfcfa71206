//! Output structures and incident aggregation.
//!
//! Workers produce per-rule results in arbitrary completion order; this
//! module owns the final shape: violations keyed by rule ID, incidents
//! deduplicated and sorted, rule sets sorted by name, so repeated runs
//! over unchanged input serialize byte-identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sieve_provider::IncidentContext;

use crate::schema::{Category, Link, Rule, RuleSet};

/// Aggregated result for one rule that matched at least once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default)]
    pub incidents: Vec<IncidentContext>,
}

/// Evaluation results for one rule set.
///
/// `violations`, `errors`, `unmatched`, and `skipped` partition the set's
/// rules so a reader can tell "didn't match" from "couldn't be evaluated"
/// from "was intentionally skipped".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSetResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub violations: BTreeMap<String, Violation>,
    /// Per-rule evaluation failures. A failure here never aborts the set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl RuleSetResult {
    /// Empty result scaffold carrying a set's metadata.
    pub fn scaffold(set: &RuleSet) -> Self {
        Self {
            name: set.name.clone(),
            description: set.description.clone(),
            labels: set.labels.clone(),
            tags: set.tags.clone(),
            violations: BTreeMap::new(),
            errors: BTreeMap::new(),
            unmatched: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Build the violation entry for a matched rule.
pub(crate) fn build_violation(rule: &Rule, incidents: Vec<IncidentContext>) -> Violation {
    Violation {
        description: rule.description.clone().unwrap_or_default(),
        category: rule.category,
        labels: rule.labels.clone(),
        tags: rule.tag.clone(),
        effort: rule.effort,
        links: rule.links.clone(),
        incidents,
    }
}

/// Sort incidents by location and drop structural duplicates.
///
/// Guards against a rule's OR branches each rediscovering the same
/// incident.
pub(crate) fn dedup_incidents(mut incidents: Vec<IncidentContext>) -> Vec<IncidentContext> {
    incidents.sort_by(|a, b| {
        (&a.uri, a.line_number, &a.message).cmp(&(&b.uri, b.line_number, &b.message))
    });
    incidents.dedup();
    incidents
}

/// Substitute `{{key}}` placeholders from incident variables.
pub(crate) fn render_message(
    template: &str,
    variables: &BTreeMap<String, serde_yaml::Value>,
) -> String {
    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match variables.get(key) {
                    Some(serde_yaml::Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(
                        serde_yaml::to_string(other)
                            .map(|s| s.trim_end().to_string())
                            .unwrap_or_default()
                            .as_str(),
                    ),
                    None => {}
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Serialize results to YAML.
pub fn to_yaml(results: &[RuleSetResult]) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(results)
}

/// Serialize results to pretty JSON.
pub fn to_json(results: &[RuleSetResult]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_drops_structural_duplicates_only() {
        let a = IncidentContext::at_line("file:///a.go", 3);
        let b = IncidentContext::at_line("file:///a.go", 9);
        let c = IncidentContext::at_line("file:///b.go", 3);

        let deduped = dedup_incidents(vec![b.clone(), a.clone(), a.clone(), c.clone()]);
        assert_eq!(deduped, vec![a, b, c]);
    }

    #[test]
    fn dedup_keeps_same_location_different_variables() {
        let mut a = IncidentContext::at_line("file:///a.go", 3);
        a.variables
            .insert("v".to_string(), serde_yaml::Value::String("1".to_string()));
        let mut b = IncidentContext::at_line("file:///a.go", 3);
        b.variables
            .insert("v".to_string(), serde_yaml::Value::String("2".to_string()));

        assert_eq!(dedup_incidents(vec![a, b]).len(), 2);
    }

    #[test]
    fn message_rendering_resolves_variables() {
        let mut vars = BTreeMap::new();
        vars.insert(
            "matchingText".to_string(),
            serde_yaml::Value::String("net/http".to_string()),
        );
        assert_eq!(
            render_message("replace {{matchingText}} here", &vars),
            "replace net/http here"
        );
        assert_eq!(render_message("no vars", &vars), "no vars");
        assert_eq!(render_message("{{missing}} gone", &vars), " gone");
    }

    #[test]
    fn serialized_output_skips_empty_sections() {
        let result = RuleSetResult {
            name: "empty".to_string(),
            description: None,
            labels: Vec::new(),
            tags: Vec::new(),
            violations: BTreeMap::new(),
            errors: BTreeMap::new(),
            unmatched: Vec::new(),
            skipped: Vec::new(),
        };
        let yaml = to_yaml(&[result]).unwrap();
        assert!(yaml.contains("name: empty"));
        assert!(!yaml.contains("violations"));
        assert!(!yaml.contains("errors"));
    }
}
