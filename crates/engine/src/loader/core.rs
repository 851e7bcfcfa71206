//! Core [`RuleLoader`]: filesystem-backed rule set loading and validation.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use sieve_provider::ProviderRegistry;

use crate::evaluator::dependency_order;
use crate::schema::{Condition, ConditionKind, Rule, RuleSet, RuleSetMeta};

use super::error::{LoadError, Result};

const RULESET_META_FILES: [&str; 2] = ["ruleset.yaml", "ruleset.yml"];

/// Loads rule sets from files and directories.
///
/// A YAML file is one rule set: either a bare array of rules or an
/// envelope with `name`/`description`/`labels`/`tags`/`rules`. A directory
/// containing a `ruleset.yaml` metadata file is one rule set built from
/// all rule files beneath it; any other directory contributes one set per
/// file, recursing into subdirectories.
///
/// Every set is validated structurally before it is admitted; a bad rule
/// rejects its whole set. Conditions naming a capability their provider
/// never advertised are caught here, turning a class of runtime errors
/// into load-time errors. Providers absent from the registry entirely are
/// allowed through; the engine skips their rules at run time.
pub struct RuleLoader<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> RuleLoader<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Load rule sets from several paths (files or directories).
    pub fn load_paths(&self, paths: &[PathBuf]) -> Result<Vec<RuleSet>> {
        let mut sets = Vec::new();
        for path in paths {
            sets.extend(self.load_path(path)?);
        }
        Ok(sets)
    }

    /// Load rule sets from one path.
    pub fn load_path(&self, path: &Path) -> Result<Vec<RuleSet>> {
        if path.is_dir() {
            self.load_dir(path)
        } else {
            Ok(vec![self.load_file(path)?])
        }
    }

    /// Load a single rule file as one rule set.
    pub fn load_file(&self, path: &Path) -> Result<RuleSet> {
        let contents = fs::read_to_string(path)?;
        let mut set = decode_rule_set(&contents)?;
        if set.name.is_empty() {
            set.name = file_stem(path);
        }
        self.validate_set(path, &set)?;
        info!(name = %set.name, rules = set.rules.len(), path = %path.display(), "loaded rule set");
        Ok(set)
    }

    fn load_dir(&self, dir: &Path) -> Result<Vec<RuleSet>> {
        if let Some(meta_path) = RULESET_META_FILES
            .iter()
            .map(|f| dir.join(f))
            .find(|p| p.is_file())
        {
            return Ok(vec![self.load_ruleset_dir(dir, &meta_path)?]);
        }

        let mut sets = Vec::new();
        for entry in sorted_entries(dir)? {
            if entry.is_dir() {
                sets.extend(self.load_dir(&entry)?);
            } else if is_yaml(&entry) {
                sets.push(self.load_file(&entry)?);
            } else {
                debug!(path = %entry.display(), "skipping non-YAML file");
            }
        }
        Ok(sets)
    }

    /// A directory with `ruleset.yaml` is one named set spanning all rule
    /// files beneath it; duplicate IDs across those files reject the set.
    fn load_ruleset_dir(&self, dir: &Path, meta_path: &Path) -> Result<RuleSet> {
        let meta: RuleSetMeta = serde_yaml::from_str(&fs::read_to_string(meta_path)?)?;

        let mut set = RuleSet {
            name: if meta.name.is_empty() {
                file_stem(dir)
            } else {
                meta.name
            },
            description: meta.description,
            labels: meta.labels,
            tags: meta.tags,
            rules: Vec::new(),
        };

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_yaml(p) && p != meta_path)
            .collect();
        files.sort();

        for file in files {
            let contents = fs::read_to_string(&file)?;
            let file_set = decode_rule_set(&contents)?;
            set.rules.extend(file_set.rules);
        }

        self.validate_set(dir, &set)?;
        info!(name = %set.name, rules = set.rules.len(), path = %dir.display(), "loaded rule set directory");
        Ok(set)
    }

    // ── Validation ──────────────────────────────────────────────────

    fn validate_set(&self, origin: &Path, set: &RuleSet) -> Result<()> {
        let fail = |message: String| {
            Err(LoadError::Validation(format!(
                "{}: {}",
                origin.display(),
                message
            )))
        };

        if set.rules.is_empty() {
            return fail("rule set contains no rules".to_string());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for rule in &set.rules {
            if !seen.insert(&rule.id) {
                return fail(format!("duplicated rule id: {}", rule.id));
            }
            if let Err(message) = self.validate_rule(rule) {
                return fail(format!("rule '{}': {}", rule.id, message));
            }
        }
        Ok(())
    }

    fn validate_rule(&self, rule: &Rule) -> std::result::Result<(), String> {
        if rule.id.is_empty() {
            return Err("ruleID must not be empty".to_string());
        }
        if rule.id.contains('\n') || rule.id.contains(';') {
            return Err("ruleID must not contain newlines or semicolons".to_string());
        }
        if rule.message.is_none() && rule.tag.is_empty() {
            return Err("rule must set at least one of message or tag".to_string());
        }
        self.validate_condition(&rule.when)
    }

    fn validate_condition(&self, condition: &Condition) -> std::result::Result<(), String> {
        if let (Some(as_name), Some(from)) = (&condition.as_name, &condition.from) {
            if !as_name.is_empty() && as_name == from {
                return Err(format!("condition chains to itself via '{as_name}'"));
            }
        }

        match &condition.kind {
            ConditionKind::Provider(leaf) => {
                if self.registry.has_provider(&leaf.provider)
                    && !self.registry.has_capability(&leaf.provider, &leaf.capability)
                {
                    return Err(format!(
                        "provider '{}' does not advertise capability '{}'",
                        leaf.provider, leaf.capability
                    ));
                }
                Ok(())
            }
            ConditionKind::And(children) | ConditionKind::Or(children) => {
                if children.is_empty() {
                    return Err("condition block has no conditions".to_string());
                }
                for child in children {
                    self.validate_condition(child)?;
                }
                // Duplicate `as`, dangling `from`, and chain cycles all
                // surface here instead of mid-evaluation.
                dependency_order(children).map_err(|e| e.to_string())?;
                Ok(())
            }
        }
    }
}

/// Decode a rule file: bare rule array or envelope mapping.
fn decode_rule_set(contents: &str) -> Result<RuleSet> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
    match value {
        serde_yaml::Value::Sequence(_) => {
            let rules: Vec<Rule> = serde_yaml::from_value(value)?;
            Ok(RuleSet {
                rules,
                ..RuleSet::default()
            })
        }
        serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
        _ => Err(LoadError::Validation(
            "rule file must be a rule array or a rule set mapping".to_string(),
        )),
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| !n.starts_with('.'))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();
    Ok(entries)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("rules")
        .to_string()
}
