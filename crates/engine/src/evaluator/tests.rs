//! Tests for the condition evaluator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sieve_provider::{
    CancelToken, Capability, Dependency, EvaluationResponse, IncidentContext, ProviderError,
    ProviderRegistry, ServiceClient,
};

use super::*;

/// Scripted provider client: fixed response per capability, records calls.
struct MockClient {
    responses: HashMap<String, EvaluationResponse>,
    calls: Mutex<Vec<(String, serde_yaml::Value)>>,
}

impl MockClient {
    fn new(responses: Vec<(&str, EvaluationResponse)>) -> Arc<Self> {
        Arc::new(Self {
            responses: responses
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, serde_yaml::Value)> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl ServiceClient for MockClient {
    fn capabilities(&self) -> Vec<Capability> {
        self.responses.keys().map(Capability::new).collect()
    }

    async fn evaluate(
        &self,
        _cancel: &CancelToken,
        capability: &str,
        payload: &serde_yaml::Value,
    ) -> sieve_provider::Result<EvaluationResponse> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push((capability.to_string(), payload.clone()));
        if capability == "boom" {
            return Err(ProviderError::InvalidPayload {
                capability: capability.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(self.responses.get(capability).cloned().unwrap_or_default())
    }

    async fn get_dependencies(&self, _cancel: &CancelToken) -> sieve_provider::Result<Vec<Dependency>> {
        Ok(Vec::new())
    }
}

fn incidents(uris: &[&str]) -> Vec<IncidentContext> {
    uris.iter().map(|u| IncidentContext::for_file(*u)).collect()
}

fn matched(uris: &[&str]) -> EvaluationResponse {
    EvaluationResponse::from_incidents(incidents(uris))
}

fn unmatched() -> EvaluationResponse {
    EvaluationResponse::default()
}

fn condition(yaml: &str) -> Condition {
    serde_yaml::from_str(yaml).expect("parse condition fixture")
}

fn setup(client: Arc<MockClient>) -> (ConditionEvaluator, EvalContext) {
    let mut registry = ProviderRegistry::new();
    registry.insert("mock", client);
    (
        ConditionEvaluator::new(Arc::new(registry)),
        EvalContext::new(CancelToken::new()),
    )
}

#[tokio::test]
async fn and_matches_when_all_children_match() {
    let client = MockClient::new(vec![
        ("file", matched(&["file:///a.go"])),
        ("content", matched(&["file:///b.go"])),
    ]);
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
and:
  - mock.file: {}
  - mock.content: {}
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(result.matched);
    assert_eq!(result.incidents.len(), 2);
}

#[tokio::test]
async fn and_fails_when_one_child_fails() {
    let client = MockClient::new(vec![
        ("file", matched(&["file:///a.go"])),
        ("content", unmatched()),
    ]);
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
and:
  - mock.file: {}
  - mock.content: {}
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(!result.matched);
}

#[tokio::test]
async fn or_matches_when_any_child_matches() {
    let client = MockClient::new(vec![
        ("file", unmatched()),
        ("content", matched(&["file:///b.go"])),
    ]);
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
or:
  - mock.file: {}
  - mock.content: {}
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(result.matched);
    // Only the matched child contributes incidents.
    assert_eq!(result.incidents.len(), 1);
    assert_eq!(result.incidents[0].uri, "file:///b.go");
}

#[tokio::test]
async fn or_fails_when_all_children_fail() {
    let client = MockClient::new(vec![("file", unmatched()), ("content", unmatched())]);
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
or:
  - mock.file: {}
  - mock.content: {}
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(!result.matched);
}

#[tokio::test]
async fn not_inverts_match_and_drops_incidents() {
    let client = MockClient::new(vec![("file", matched(&["file:///a.go"]))]);
    let (evaluator, mut ctx) = setup(client.clone());

    let inverted_match = condition("mock.file: {}\nnot: true");
    let result = evaluator.evaluate(&inverted_match, &mut ctx).await.unwrap();
    assert!(!result.matched);
    assert!(result.incidents.is_empty());

    // Negation of "no match" is a match with zero incidents.
    let client = MockClient::new(vec![("file", unmatched())]);
    let (evaluator, mut ctx) = setup(client);
    let result = evaluator.evaluate(&inverted_match, &mut ctx).await.unwrap();
    assert!(result.matched);
    assert!(result.incidents.is_empty());
}

#[tokio::test]
async fn negated_child_contributes_no_incidents_to_parent() {
    let client = MockClient::new(vec![
        ("file", matched(&["file:///a.go"])),
        ("content", unmatched()),
    ]);
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
and:
  - mock.file: {}
  - mock.content: {}
    not: true
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(result.matched);
    assert_eq!(result.incidents.len(), 1);
    assert_eq!(result.incidents[0].uri, "file:///a.go");
}

#[tokio::test]
async fn ignorable_mismatch_does_not_fail_and() {
    let client = MockClient::new(vec![
        ("file", unmatched()),
        ("content", matched(&["file:///b.go"])),
    ]);
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
and:
  - mock.file: {}
    ignore: true
  - mock.content: {}
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(result.matched);
}

#[tokio::test]
async fn ignorable_match_still_publishes_chain_context() {
    let client = MockClient::new(vec![
        ("file", matched(&["file:///pom.xml"])),
        ("xml", matched(&["file:///pom.xml"])),
    ]);
    let (evaluator, mut ctx) = setup(client.clone());

    let cond = condition(
        r#"
and:
  - mock.file: {}
    as: poms
    ignore: true
  - mock.xml:
      filepaths: "{{poms.filepaths}}"
    from: poms
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(result.matched);
    // The ignorable producer's own incidents stay out of the result.
    assert_eq!(result.incidents.len(), 1);

    let template = ctx.template("poms").expect("template stored");
    assert_eq!(template.filepaths, vec!["file:///pom.xml"]);
}

#[tokio::test]
async fn chain_renders_payload_before_dispatch() {
    let client = MockClient::new(vec![
        ("file", matched(&["file:///repo/pom.xml"])),
        ("xml", matched(&["file:///repo/pom.xml"])),
    ]);
    let (evaluator, mut ctx) = setup(client.clone());

    let cond = condition(
        r#"
and:
  - mock.file:
      pattern: pom.xml
    as: poms
  - mock.xml:
      xpath: //dependencies/dependency
      filepaths: "{{poms.filepaths}}"
    from: poms
"#,
    );
    evaluator.evaluate(&cond, &mut ctx).await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "file");
    assert_eq!(calls[1].0, "xml");
    let rendered: serde_yaml::Value =
        serde_yaml::from_str("xpath: //dependencies/dependency\nfilepaths: [\"file:///repo/pom.xml\"]")
            .unwrap();
    assert_eq!(calls[1].1, rendered);
}

#[tokio::test]
async fn chain_result_is_declaration_order_independent() {
    let in_order = condition(
        r#"
or:
  - mock.file: {}
    as: poms
  - mock.xml:
      filepaths: "{{poms.filepaths}}"
    from: poms
"#,
    );
    let out_of_order = condition(
        r#"
or:
  - mock.xml:
      filepaths: "{{poms.filepaths}}"
    from: poms
  - mock.file: {}
    as: poms
"#,
    );

    let mut outcomes = Vec::new();
    for cond in [&in_order, &out_of_order] {
        let client = MockClient::new(vec![
            ("file", matched(&["file:///repo/pom.xml"])),
            ("xml", matched(&["file:///repo/pom.xml", "file:///repo/pom.xml"])),
        ]);
        let (evaluator, mut ctx) = setup(client.clone());
        let result = evaluator.evaluate(cond, &mut ctx).await.unwrap();

        // The producer runs first either way.
        let calls = client.calls();
        assert_eq!(calls[0].0, "file");
        assert_eq!(calls[1].0, "xml");
        outcomes.push((result.matched, result.incidents.len()));
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn unpopulated_chain_renders_empty_not_error() {
    // Producer matches nothing, so the consumer sees an empty scope.
    let client = MockClient::new(vec![("file", unmatched()), ("xml", unmatched())]);
    let (evaluator, mut ctx) = setup(client.clone());

    let cond = condition(
        r#"
and:
  - mock.file: {}
    as: poms
    ignore: true
  - mock.xml:
      filepaths: "{{poms.filepaths}}"
    from: poms
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(!result.matched);
    assert!(ctx.take_errors().is_empty());

    let calls = client.calls();
    let empty: serde_yaml::Value = serde_yaml::from_str("filepaths: []").unwrap();
    assert_eq!(calls[1].1, empty);
}

#[tokio::test]
async fn nested_block_publishes_chain_for_siblings() {
    let client = MockClient::new(vec![
        ("file", matched(&["file:///a.xml", "file:///b.xml"])),
        ("content", matched(&["file:///a.xml"])),
        ("xml", matched(&["file:///a.xml"])),
    ]);
    let (evaluator, mut ctx) = setup(client.clone());

    let cond = condition(
        r#"
and:
  - or:
      - mock.file: {}
      - mock.content: {}
    as: sources
  - mock.xml:
      filepaths: "{{sources.filepaths}}"
    from: sources
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    assert!(result.matched);

    let template = ctx.template("sources").expect("block template stored");
    assert_eq!(
        template.filepaths,
        vec!["file:///a.xml", "file:///b.xml"]
    );
}

#[tokio::test]
async fn provider_error_is_unmatched_and_recorded() {
    let client = MockClient::new(vec![("file", matched(&["file:///a.go"]))]);
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
or:
  - mock.boom: {}
  - mock.file: {}
"#,
    );
    let result = evaluator.evaluate(&cond, &mut ctx).await.unwrap();
    // The healthy branch still matches.
    assert!(result.matched);

    let errors = ctx.take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("mock.boom"));
}

#[tokio::test]
async fn missing_provider_is_an_error() {
    let client = MockClient::new(Vec::new());
    let (evaluator, mut ctx) = setup(client);

    let cond = condition("ghost.file: {}");
    let err = evaluator.evaluate(&cond, &mut ctx).await.unwrap_err();
    assert!(matches!(err, EvalError::ProviderNotFound(p) if p == "ghost"));
}

#[tokio::test]
async fn chain_cycle_is_an_error() {
    let client = MockClient::new(Vec::new());
    let (evaluator, mut ctx) = setup(client);

    let cond = condition(
        r#"
and:
  - mock.file: {}
    as: a
    from: b
  - mock.file: {}
    as: b
    from: a
"#,
    );
    let err = evaluator.evaluate(&cond, &mut ctx).await.unwrap_err();
    assert!(matches!(err, EvalError::Order(OrderError::Cycle(_))));
}

#[tokio::test]
async fn cancelled_context_stops_evaluation() {
    let client = MockClient::new(vec![("file", matched(&["file:///a.go"]))]);
    let (evaluator, _) = setup(client);

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut ctx = EvalContext::new(cancel);

    let cond = condition("mock.file: {}");
    let err = evaluator.evaluate(&cond, &mut ctx).await.unwrap_err();
    assert!(matches!(err, EvalError::Cancelled));
}
