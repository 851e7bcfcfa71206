//! Boolean condition tree types and their YAML decoding.
//!
//! A condition mapping carries exactly one operation key (`and:`, `or:`,
//! or a `<provider>.<capability>` leaf) plus the optional chain/negation
//! modifiers `as:`, `from:`, `not:`, `ignore:`. Decoding is driven by the
//! explicit discriminator keys rather than untagged guessing, so malformed
//! shapes fail with a usable message at load time.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer};

/// One node of a rule's condition tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub kind: ConditionKind,
    /// Chain name this node publishes its matches under.
    pub as_name: Option<String>,
    /// Chain name this node consumes; its payload is template-rendered
    /// from the named sibling's matches before dispatch.
    pub from: Option<String>,
    /// Invert matched-ness; a negated node contributes no incidents.
    pub not: bool,
    /// Never fails a parent AND on its own mismatch; exists to publish
    /// chain context. Its incidents stay out of the parent's result.
    pub ignorable: bool,
}

/// Operation carried by a condition node.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Provider(ProviderCondition),
}

/// A leaf condition dispatched to a backend provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCondition {
    pub provider: String,
    pub capability: String,
    /// Opaque payload passed to the provider unmodified (after chain
    /// rendering when `from` is set).
    pub payload: serde_yaml::Value,
}

impl Condition {
    /// All provider leaves of this subtree, in declaration order.
    pub fn leaves(&self) -> Vec<&ProviderCondition> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ProviderCondition>) {
        match &self.kind {
            ConditionKind::Provider(leaf) => out.push(leaf),
            ConditionKind::And(children) | ConditionKind::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Distinct provider names referenced anywhere in this subtree.
    pub fn providers(&self) -> BTreeSet<&str> {
        self.leaves().iter().map(|l| l.provider.as_str()).collect()
    }

    /// Whether every leaf is a dependency check. Such rules can be
    /// disabled wholesale before scheduling.
    pub fn is_dependency_only(&self) -> bool {
        let leaves = self.leaves();
        !leaves.is_empty() && leaves.iter().all(|l| l.capability == "dependency")
    }

    fn from_value(value: serde_yaml::Value) -> Result<Self, String> {
        let serde_yaml::Value::Mapping(map) = value else {
            return Err("condition must be a mapping".to_string());
        };

        let mut kind: Option<ConditionKind> = None;
        let mut as_name = None;
        let mut from = None;
        let mut not = false;
        let mut ignorable = false;

        for (key, value) in map {
            let key = key
                .as_str()
                .ok_or_else(|| "condition keys must be strings".to_string())?
                .to_string();
            match key.as_str() {
                "as" => as_name = Some(expect_string(&key, value)?),
                "from" => from = Some(expect_string(&key, value)?),
                "not" => not = expect_bool(&key, value)?,
                "ignore" => ignorable = expect_bool(&key, value)?,
                "and" | "or" => {
                    let children = expect_children(&key, value)?;
                    let block = if key == "and" {
                        ConditionKind::And(children)
                    } else {
                        ConditionKind::Or(children)
                    };
                    set_kind(&mut kind, block)?;
                }
                other => match other.split_once('.') {
                    Some((provider, capability)) if !provider.is_empty() && !capability.is_empty() => {
                        set_kind(
                            &mut kind,
                            ConditionKind::Provider(ProviderCondition {
                                provider: provider.to_string(),
                                capability: capability.to_string(),
                                payload: value,
                            }),
                        )?;
                    }
                    _ => {
                        return Err(format!(
                            "unrecognized condition key '{other}' (expected 'and', 'or', or '<provider>.<capability>')"
                        ));
                    }
                },
            }
        }

        let kind = kind.ok_or_else(|| {
            "condition must specify 'and', 'or', or a '<provider>.<capability>' key".to_string()
        })?;

        Ok(Condition {
            kind,
            as_name,
            from,
            not,
            ignorable,
        })
    }
}

fn set_kind(slot: &mut Option<ConditionKind>, kind: ConditionKind) -> Result<(), String> {
    if slot.is_some() {
        return Err("condition carries more than one operation key".to_string());
    }
    *slot = Some(kind);
    Ok(())
}

fn expect_string(key: &str, value: serde_yaml::Value) -> Result<String, String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        other => Err(format!("'{key}' must be a string, got {other:?}")),
    }
}

fn expect_bool(key: &str, value: serde_yaml::Value) -> Result<bool, String> {
    match value {
        serde_yaml::Value::Bool(b) => Ok(b),
        other => Err(format!("'{key}' must be a boolean, got {other:?}")),
    }
}

fn expect_children(key: &str, value: serde_yaml::Value) -> Result<Vec<Condition>, String> {
    let serde_yaml::Value::Sequence(items) = value else {
        return Err(format!("'{key}' must be a sequence of conditions"));
    };
    items.into_iter().map(Condition::from_value).collect()
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        Condition::from_value(value).map_err(serde::de::Error::custom)
    }
}
