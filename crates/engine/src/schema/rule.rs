//! Rule and related metadata types.

use serde::{Deserialize, Serialize};

use super::Condition;

/// One migration/compliance rule. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    /// Unique within its rule set; non-empty, no newline or semicolon.
    #[serde(rename = "ruleID")]
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub effort: Option<u32>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Named regex captures extracted from each incident's matching text.
    #[serde(rename = "customVariables", default)]
    pub custom_variables: Vec<CustomVariable>,
    /// Message attached to each incident of a violation. Supports
    /// `{{variable}}` placeholders resolved from incident variables.
    #[serde(default)]
    pub message: Option<String>,
    /// Tags attached to the violation. At least one of `message`/`tag`
    /// must be set.
    #[serde(default)]
    pub tag: Vec<String>,
    pub when: Condition,
}

/// Severity category of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Mandatory,
    Potential,
    Information,
}

/// External reference attached to a violation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A named value extracted from an incident's matching text by regex.
///
/// The first capture group wins (the whole match if the pattern has no
/// groups); `defaultValue` fills in when the pattern does not match.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CustomVariable {
    pub pattern: String,
    pub name: String,
    #[serde(rename = "defaultValue", default)]
    pub default_value: Option<String>,
}
