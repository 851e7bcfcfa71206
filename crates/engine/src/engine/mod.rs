//! Rule engine: schedules rule evaluation onto a bounded worker pool.
//!
//! Each selected `(rule set, rule)` pair becomes one job. Jobs run
//! concurrently up to the configured pool size; one rule's failure or
//! panic never aborts the others. The scheduler drains its own join set,
//! so per-rule-set aggregation happens on a single consumer and repeated
//! runs over unchanged input produce byte-identical output.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use sieve_provider::{CancelToken, Dependency, IncidentContext, ProviderRegistry};

use crate::evaluator::{ConditionEvaluator, EvalContext, EvalError};
use crate::output::{self, RuleSetResult};
use crate::schema::{Rule, RuleSet};
use crate::selector::LabelSelector;
use crate::snippet::SnippetSource;

/// Default worker pool size.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Default per-rule incident cap.
pub const DEFAULT_INCIDENT_LIMIT: usize = 1500;
/// Default global code-snippet budget.
pub const DEFAULT_SNIPPET_LIMIT: usize = 20;

/// Tunables for a rule engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size; also bounds peak concurrent provider calls.
    pub concurrency: usize,
    /// Per-rule incident cap; excess incidents are truncated. 0 = unlimited.
    pub incident_limit: usize,
    /// How many incidents get a code snippet attached. 0 = unlimited.
    pub snippet_limit: usize,
    /// Skip rules whose every leaf is a dependency check.
    pub no_dependency_rules: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            incident_limit: DEFAULT_INCIDENT_LIMIT,
            snippet_limit: DEFAULT_SNIPPET_LIMIT,
            no_dependency_rules: false,
        }
    }
}

/// Outcome of one rule's evaluation job.
enum JobResult {
    Evaluated {
        matched: bool,
        incidents: Vec<IncidentContext>,
        errors: Vec<String>,
    },
    Failed(String),
    Cancelled,
}

/// Schedules rules across rule sets onto a bounded worker pool.
pub struct RuleEngine {
    registry: Arc<ProviderRegistry>,
    config: EngineConfig,
    snippets: Option<Arc<dyn SnippetSource>>,
    dep_selector: Option<LabelSelector>,
}

impl RuleEngine {
    pub fn new(registry: Arc<ProviderRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            snippets: None,
            dep_selector: None,
        }
    }

    /// Attach a snippet source; incidents get excerpts up to the budget.
    pub fn with_snippets(mut self, snippets: Arc<dyn SnippetSource>) -> Self {
        self.snippets = Some(snippets);
        self
    }

    /// Attach a dependency exclusion selector.
    pub fn with_dependency_selector(mut self, selector: LabelSelector) -> Self {
        self.dep_selector = Some(selector);
        self
    }

    /// Evaluate all selected rules, returning results sorted by set name.
    ///
    /// On cancellation the scheduler stops dispatching; rules that never
    /// ran are recorded as per-rule errors, collected violations are kept.
    pub async fn run(
        &self,
        rule_sets: &[RuleSet],
        selector: Option<&LabelSelector>,
        cancel: &CancelToken,
    ) -> Vec<RuleSetResult> {
        let mut results: Vec<RuleSetResult> =
            rule_sets.iter().map(RuleSetResult::scaffold).collect();

        let evaluator = Arc::new(ConditionEvaluator::new(Arc::clone(&self.registry)));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut join_set: JoinSet<(usize, Rule, JobResult)> = JoinSet::new();
        let mut task_meta: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();

        for (set_idx, set) in rule_sets.iter().enumerate() {
            for rule in &set.rules {
                if let Some(reason) = self.skip_reason(set, rule, selector) {
                    debug!(rule_id = %rule.id, reason = %reason, "skipping rule");
                    results[set_idx].skipped.push(rule.id.clone());
                    continue;
                }

                let rule = rule.clone();
                let rule_id = rule.id.clone();
                let evaluator = Arc::clone(&evaluator);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let incident_limit = self.config.incident_limit;
                let handle = join_set.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("worker semaphore closed");
                    // Jobs queued behind the pool are "not yet dispatched":
                    // after cancellation they report instead of evaluating.
                    if cancel.is_cancelled() {
                        return (set_idx, rule, JobResult::Cancelled);
                    }

                    let mut ctx = EvalContext::new(cancel);
                    let job = match evaluator.evaluate(&rule.when, &mut ctx).await {
                        Ok(result) => JobResult::Evaluated {
                            matched: result.matched,
                            incidents: finish_incidents(&rule, result.incidents, incident_limit),
                            errors: ctx.take_errors(),
                        },
                        Err(EvalError::Cancelled) => JobResult::Cancelled,
                        Err(e) => JobResult::Failed(e.to_string()),
                    };
                    (set_idx, rule, job)
                });
                task_meta.insert(handle.id(), (set_idx, rule_id));
            }
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((task_id, (set_idx, rule, job))) => {
                    task_meta.remove(&task_id);
                    apply_job(&mut results[set_idx], &rule, job);
                }
                Err(join_err) => {
                    // A worker panic is isolated to its rule.
                    if let Some((set_idx, rule_id)) = task_meta.remove(&join_err.id()) {
                        warn!(rule_id = %rule_id, error = %join_err, "rule evaluation panicked");
                        results[set_idx]
                            .errors
                            .insert(rule_id, format!("rule evaluation panicked: {join_err}"));
                    }
                }
            }
        }

        for result in &mut results {
            result.unmatched.sort();
            result.skipped.sort();
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(snippets) = &self.snippets {
            self.attach_snippets(&mut results, snippets.as_ref());
        }

        let violations: usize = results.iter().map(|r| r.violations.len()).sum();
        let errors: usize = results.iter().map(|r| r.errors.len()).sum();
        info!(rule_sets = results.len(), violations, errors, "rule evaluation complete");
        results
    }

    /// Why a rule must not be scheduled, if any.
    fn skip_reason(
        &self,
        set: &RuleSet,
        rule: &Rule,
        selector: Option<&LabelSelector>,
    ) -> Option<&'static str> {
        if let Some(selector) = selector {
            // Rules inherit their set's labels for selection.
            let mut labels = rule.labels.clone();
            labels.extend(set.labels.iter().cloned());
            if !selector.matches(&labels) {
                return Some("excluded by label selector");
            }
        }
        if self.config.no_dependency_rules && rule.when.is_dependency_only() {
            return Some("dependency rules disabled");
        }
        if rule
            .when
            .providers()
            .iter()
            .any(|p| !self.registry.has_provider(p))
        {
            return Some("provider not available");
        }
        None
    }

    /// Attach code snippets in presentation order up to the budget.
    fn attach_snippets(&self, results: &mut [RuleSetResult], snippets: &dyn SnippetSource) {
        let mut remaining = if self.config.snippet_limit == 0 {
            usize::MAX
        } else {
            self.config.snippet_limit
        };
        for result in results.iter_mut() {
            for violation in result.violations.values_mut() {
                for incident in &mut violation.incidents {
                    if remaining == 0 {
                        return;
                    }
                    if let Some(snip) = snippets.snippet(&incident.uri, incident.line_number) {
                        incident.code_snip = Some(snip);
                        remaining -= 1;
                    }
                }
            }
        }
    }

    /// Fetch dependencies from every provider, applying the exclusion
    /// selector. Providers that fail are logged and omitted.
    pub async fn dependencies(&self, cancel: &CancelToken) -> BTreeMap<String, Vec<Dependency>> {
        let mut out = BTreeMap::new();
        for (name, client) in self.registry.iter() {
            match client.get_dependencies(cancel).await {
                Ok(deps) => {
                    let deps = match &self.dep_selector {
                        Some(selector) => deps
                            .into_iter()
                            .filter(|d| !selector.matches_entity(d))
                            .collect(),
                        None => deps,
                    };
                    out.insert(name.to_string(), deps);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "failed to fetch dependencies");
                }
            }
        }
        out
    }
}

/// Record one job's outcome on its rule set.
fn apply_job(result: &mut RuleSetResult, rule: &Rule, job: JobResult) {
    match job {
        JobResult::Evaluated {
            matched,
            incidents,
            errors,
        } => {
            if !errors.is_empty() {
                result.errors.insert(rule.id.clone(), errors.join("; "));
            }
            if matched {
                result
                    .violations
                    .insert(rule.id.clone(), output::build_violation(rule, incidents));
            } else {
                result.unmatched.push(rule.id.clone());
            }
        }
        JobResult::Failed(message) => {
            result.errors.insert(rule.id.clone(), message);
        }
        JobResult::Cancelled => {
            result
                .errors
                .insert(rule.id.clone(), "evaluation cancelled".to_string());
        }
    }
}

/// Per-rule incident post-processing: dedup, custom variables, message
/// templating, then the incident cap.
fn finish_incidents(
    rule: &Rule,
    incidents: Vec<IncidentContext>,
    incident_limit: usize,
) -> Vec<IncidentContext> {
    let mut incidents = output::dedup_incidents(incidents);

    apply_custom_variables(rule, &mut incidents);
    if let Some(message) = &rule.message {
        for incident in &mut incidents {
            incident.message = output::render_message(message, &incident.variables);
        }
    }

    if incident_limit > 0 && incidents.len() > incident_limit {
        debug!(
            rule_id = %rule.id,
            total = incidents.len(),
            limit = incident_limit,
            "truncating incidents"
        );
        incidents.truncate(incident_limit);
    }
    incidents
}

/// Extract custom variables from each incident's matching text.
fn apply_custom_variables(rule: &Rule, incidents: &mut [IncidentContext]) {
    if rule.custom_variables.is_empty() {
        return;
    }

    let compiled: Vec<(Regex, &crate::schema::CustomVariable)> = rule
        .custom_variables
        .iter()
        .filter_map(|cv| match Regex::new(&cv.pattern) {
            Ok(regex) => Some((regex, cv)),
            Err(e) => {
                warn!(rule_id = %rule.id, pattern = %cv.pattern, error = %e, "invalid custom variable pattern");
                None
            }
        })
        .collect();

    for incident in incidents.iter_mut() {
        let text = incident
            .variables
            .get("matchingText")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        for (regex, cv) in &compiled {
            let value = regex
                .captures(&text)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| m.as_str().trim().to_string())
                .or_else(|| cv.default_value.clone());
            if let Some(value) = value {
                incident
                    .variables
                    .insert(cv.name.clone(), serde_yaml::Value::String(value));
            }
        }
    }
}
