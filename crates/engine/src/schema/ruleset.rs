//! Rule set container: a named, independently-namespaced collection of rules.

use serde::Deserialize;

use super::Rule;

/// A loaded rule set. Rule IDs are unique within a set; distinct sets are
/// independent namespaces.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Set-level metadata carried by a `ruleset.yaml` file in a rule directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSetMeta {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
