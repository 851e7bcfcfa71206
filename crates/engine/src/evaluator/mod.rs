//! Condition tree evaluator with dependency-ordered chain propagation.
//!
//! Evaluates AND/OR/NOT expression trees where leaf nodes dispatch to
//! backend providers. Within a block, chained conditions (`as`/`from`)
//! run in dependency order regardless of declaration order; every child
//! executes (no short-circuit) so downstream chain consumers always see
//! their producer's context.

pub mod chain;
mod order;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use sieve_provider::{
    CancelToken, IncidentContext, ProviderError, ProviderRegistry,
};

use crate::schema::{Condition, ConditionKind, ProviderCondition};

use chain::{render_payload, ChainTemplate};
pub use order::OrderError;
pub(crate) use order::dependency_order;

/// Errors that abort one rule's evaluation.
///
/// Provider evaluation failures do not land here: a failed leaf is simply
/// unmatched, with the error recorded on the [`EvalContext`] so the engine
/// can attach it to the rule without failing the rule set.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("provider '{0}' is not in the registry")]
    ProviderNotFound(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

/// Outcome of evaluating a condition subtree.
#[derive(Debug, Clone, Default)]
pub struct EvalResult {
    pub matched: bool,
    pub incidents: Vec<IncidentContext>,
}

/// Per-rule evaluation state: cancellation, chain templates, leaf errors.
///
/// Created fresh for every rule evaluation run and discarded after, so
/// chain context never leaks across rules.
pub struct EvalContext {
    cancel: CancelToken,
    templates: HashMap<String, ChainTemplate>,
    errors: Vec<String>,
}

impl EvalContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            templates: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Provider errors recorded while evaluating leaves, drained.
    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    #[cfg(test)]
    pub(crate) fn template(&self, name: &str) -> Option<&ChainTemplate> {
        self.templates.get(name)
    }
}

/// Evaluates condition trees against a provider registry.
pub struct ConditionEvaluator {
    registry: Arc<ProviderRegistry>,
}

type NodeFuture<'a> = Pin<Box<dyn Future<Output = Result<EvalResult, EvalError>> + Send + 'a>>;

impl ConditionEvaluator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Evaluate a rule's condition tree.
    pub async fn evaluate(
        &self,
        condition: &Condition,
        ctx: &mut EvalContext,
    ) -> Result<EvalResult, EvalError> {
        self.eval_node(condition, ctx).await
    }

    fn eval_node<'a>(&'a self, cond: &'a Condition, ctx: &'a mut EvalContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let (mut result, extras) = match &cond.kind {
                ConditionKind::Provider(leaf) => self.eval_leaf(leaf, cond.from.as_deref(), ctx).await?,
                ConditionKind::And(children) => {
                    (self.eval_block(children, ctx, true).await?, BTreeMap::new())
                }
                ConditionKind::Or(children) => {
                    (self.eval_block(children, ctx, false).await?, BTreeMap::new())
                }
            };

            // Publish chain context from the raw incidents, before negation
            // drops them from the result.
            if let Some(name) = cond.as_name.as_deref().filter(|n| !n.is_empty()) {
                let template = ChainTemplate::from_incidents(&result.incidents, extras);
                debug!(name = %name, filepaths = template.filepaths.len(), "stored chain template");
                ctx.templates.insert(name.to_string(), template);
            }

            if cond.not {
                result.matched = !result.matched;
                result.incidents.clear();
            }

            Ok(result)
        })
    }

    /// Dispatch one leaf to its provider.
    ///
    /// A provider evaluation error leaves the leaf unmatched and records
    /// the failure on the context.
    async fn eval_leaf(
        &self,
        leaf: &ProviderCondition,
        from: Option<&str>,
        ctx: &mut EvalContext,
    ) -> Result<(EvalResult, BTreeMap<String, serde_yaml::Value>), EvalError> {
        if ctx.cancel.is_cancelled() {
            return Err(EvalError::Cancelled);
        }

        let client = self
            .registry
            .get(&leaf.provider)
            .ok_or_else(|| EvalError::ProviderNotFound(leaf.provider.clone()))?;

        let payload = if from.is_some() {
            render_payload(&leaf.payload, &ctx.templates)
        } else {
            leaf.payload.clone()
        };

        match client.evaluate(&ctx.cancel, &leaf.capability, &payload).await {
            Ok(response) => Ok((
                EvalResult {
                    matched: response.matched,
                    incidents: response.incidents,
                },
                response.template_context,
            )),
            Err(ProviderError::Cancelled) => Err(EvalError::Cancelled),
            Err(e) => {
                warn!(
                    provider = %leaf.provider,
                    capability = %leaf.capability,
                    error = %e,
                    "leaf condition failed, treating as unmatched"
                );
                ctx.errors
                    .push(format!("{}.{}: {}", leaf.provider, leaf.capability, e));
                Ok((EvalResult::default(), BTreeMap::new()))
            }
        }
    }

    /// Evaluate a block's children in dependency order and combine.
    ///
    /// `conjunctive` selects AND (all non-ignorable children must match)
    /// versus OR (any non-ignorable child suffices). Incidents are unioned
    /// from children that matched and are neither negated nor ignorable.
    async fn eval_block(
        &self,
        children: &[Condition],
        ctx: &mut EvalContext,
        conjunctive: bool,
    ) -> Result<EvalResult, EvalError> {
        let order = dependency_order(children)?;

        let mut matched = conjunctive;
        let mut incidents = Vec::new();
        for idx in order {
            let child = &children[idx];
            let result = self.eval_node(child, ctx).await?;

            if !child.ignorable {
                matched = if conjunctive {
                    matched && result.matched
                } else {
                    matched || result.matched
                };
            }
            if result.matched && !child.not && !child.ignorable {
                incidents.extend(result.incidents);
            }
        }

        Ok(EvalResult { matched, incidents })
    }
}

#[cfg(test)]
mod tests;
