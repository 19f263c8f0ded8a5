//! End-to-end scenarios across the three agents.

use std::sync::Arc;

use serde_json::{json, Value};

use verdict_approvals::{
    ApprovalRule, Approver, AutoApproveConditions, Requester, RoutingRequest,
};
use verdict_config::Config;
use verdict_policy::{
    Action, Condition, EvaluationContext, EvaluationRequest, Policy, PolicyError, PolicyRule,
    PolicyStatus, RiskLevel, Severity,
};
use verdict_runtime::{ExecutionContext, InMemoryRecordSink, PolicyDecisionPoint};
use verdict_solver::{
    AppliedConstraint, ConflictType, ConstraintScope, ConstraintSolver, ConstraintType,
    ResolutionStrategy, SolverOutcome,
};

fn execution() -> ExecutionContext {
    ExecutionContext::new("exec-scenarios", "ext-span-1")
}

fn token_limit_policy() -> Policy {
    Policy::builder("P1")
        .name("Token Limit")
        .namespace("llm-ops")
        .priority(100)
        .status(PolicyStatus::Active)
        .rule(PolicyRule::new(
            "R1",
            "deny oversized requests",
            Condition::greater_than("llm.maxTokens", 1000i64),
            Action::deny("Request exceeds token limit"),
        ))
        .build()
}

fn provider_policy() -> Policy {
    Policy::builder("P2")
        .name("Provider Allow")
        .namespace("llm-ops")
        .priority(10)
        .status(PolicyStatus::Active)
        .rule(PolicyRule::new(
            "R2",
            "allow openai",
            Condition::equals("llm.provider", "openai"),
            Action::allow(),
        ))
        .build()
}

fn llm_context(max_tokens: u32) -> EvaluationContext {
    EvaluationContext::builder()
        .provider("openai")
        .model("gpt-4")
        .max_tokens(max_tokens)
        .build()
}

#[tokio::test]
async fn scenario_a_token_limit_deny() {
    let pdp = PolicyDecisionPoint::new(Config::default());
    pdp.create_policy(token_limit_policy(), "tests", None)
        .await
        .unwrap();

    let response = pdp
        .enforce(&execution(), EvaluationRequest::new("req-a", llm_context(2000)))
        .await;

    assert!(response.success);
    let event = response.data.unwrap();
    assert_eq!(event.outputs["outcome"], "policy_deny");
    assert_eq!(event.outputs["allowed"], false);
    assert_eq!(event.outputs["matched_policies"], json!(["P1"]));
    assert_eq!(event.outputs["matched_rules"], json!(["R1"]));
    assert!(event.outputs["reason"]
        .as_str()
        .unwrap()
        .contains("token limit"));
    assert!(event.confidence > 0.0);
}

#[tokio::test]
async fn scenario_b_allow_default_path() {
    let pdp = PolicyDecisionPoint::new(Config::default());
    pdp.create_policy(token_limit_policy(), "tests", None)
        .await
        .unwrap();
    pdp.create_policy(provider_policy(), "tests", None)
        .await
        .unwrap();

    let response = pdp
        .enforce(&execution(), EvaluationRequest::new("req-b", llm_context(500)))
        .await;

    let event = response.data.unwrap();
    assert_eq!(event.outputs["outcome"], "policy_allow");
    assert_eq!(event.outputs["allowed"], true);
    let matched_rules = event.outputs["matched_rules"].as_array().unwrap();
    assert!(matched_rules.contains(&json!("R2")));
    assert!(!matched_rules.contains(&json!("R1")));
}

#[tokio::test]
async fn scenario_c_no_matching_policy() {
    let pdp = PolicyDecisionPoint::new(Config::default());

    let response = pdp
        .enforce(
            &execution(),
            EvaluationRequest::new("req-c", EvaluationContext::new()),
        )
        .await;

    let event = response.data.unwrap();
    assert_eq!(event.outputs["outcome"], "policy_allow");
    assert_eq!(event.outputs["matched_policies"], json!([]));
    assert!((event.confidence - 0.8).abs() < 1e-9);
    assert!(event.outputs["evaluation_time_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn scenario_d_governance_rejection() {
    let pdp = PolicyDecisionPoint::new(Config::default());
    let policy = Policy::builder("P-cred")
        .name("Credential deny")
        .namespace("llm-ops")
        .status(PolicyStatus::Active)
        .rule(PolicyRule::new(
            "R-cred",
            "deny credential reads",
            Condition::exists("user.password_hash"),
            Action::deny("credential access is forbidden"),
        ))
        .build();

    let err = pdp
        .create_policy(policy, "tests", None)
        .await
        .expect_err("governance must reject");

    match &err {
        PolicyError::GovernanceRejected { violations, .. } => {
            let codes: Vec<&str> = violations.iter().map(|v| v.code.as_str()).collect();
            assert!(codes.contains(&"DENY_WITHOUT_SCOPE"));
            assert!(codes.contains(&"CRITICAL_RESOURCE_DENY"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Fail-closed: nothing published, nothing audited.
    assert_eq!(pdp.engine().policy_count(), 0);
    assert!(pdp.audit_store().is_empty());

    // The validator report itself carries the critical risk level.
    let report = verdict_policy::GovernanceValidator::new().validate(
        &Policy::builder("P-cred")
            .name("Credential deny")
            .namespace("llm-ops")
            .status(PolicyStatus::Active)
            .rule(PolicyRule::new(
                "R-cred",
                "deny credential reads",
                Condition::exists("user.password_hash"),
                Action::deny("credential access is forbidden"),
            ))
            .build(),
    );
    assert!(!report.valid);
    assert_eq!(report.risk_level, RiskLevel::Critical);
}

#[test]
fn scenario_e_solver_resolves_mixed_severities() {
    let constraints = vec![
        AppliedConstraint {
            id: "budget-cap".into(),
            name: "budget cap".into(),
            constraint_type: ConstraintType::BudgetLimit,
            severity: Severity::Critical,
            scope: ConstraintScope::Project,
            satisfied: true,
            reason: None,
        },
        AppliedConstraint {
            id: "rate-guard".into(),
            name: "rate guard".into(),
            constraint_type: ConstraintType::RateLimit,
            severity: Severity::Warning,
            scope: ConstraintScope::Project,
            satisfied: false,
            reason: Some("burst exceeded".into()),
        },
    ];

    let output = ConstraintSolver::new().solve(constraints);

    assert_eq!(output.strategy, Some(ResolutionStrategy::MostRestrictive));
    assert_eq!(output.conflicts.len(), 1);
    assert_eq!(
        output.conflicts[0].conflict_type,
        ConflictType::PriorityConflict
    );
    assert_eq!(output.conflicts_resolved, 1);
    assert_eq!(output.outcome, SolverOutcome::ConstraintsResolved);
}

#[tokio::test]
async fn scenario_f_auto_approval_by_role() {
    let mut rule = ApprovalRule::new(
        "AR1",
        "Gate policy mutations",
        vec![Approver::new("lead")],
    );
    rule.conditions = vec![Condition::equals("resource_type", "policy")];
    rule.auto_approve = Some(AutoApproveConditions {
        allowed_roles: vec!["platform-admin".into()],
        ..AutoApproveConditions::default()
    });

    let pdp = PolicyDecisionPoint::new(Config::default()).with_approval_rules(vec![rule]);
    let context =
        EvaluationContext::from_value(json!({"resource_type": "policy", "operation": "update"}))
            .unwrap();
    let request = RoutingRequest::new(
        context,
        Requester::new("admin-1", vec!["platform-admin".into()]),
    );

    let response = pdp.route(&execution(), request).await;
    let event = response.data.unwrap();

    assert_eq!(event.outputs["outcome"], "auto_approved");
    assert_eq!(event.outputs["approval_chain"], json!([]));
    assert_eq!(event.outputs["rules_matched"], json!(["AR1"]));
    assert!(event.confidence >= 0.95);
}

#[tokio::test]
async fn scenario_g_cache_coherence_across_mutation() {
    let pdp = PolicyDecisionPoint::new(Config::default());
    pdp.create_policy(token_limit_policy(), "tests", None)
        .await
        .unwrap();

    let e1 = pdp
        .enforce(&execution(), EvaluationRequest::new("req-g1", llm_context(2000)))
        .await
        .data
        .unwrap();
    assert_eq!(e1.outputs["outcome"], "policy_deny");

    let mut relaxed = token_limit_policy();
    relaxed.rules[0].condition = Condition::greater_than("llm.maxTokens", 100_000i64);
    pdp.update_policy(relaxed, "tests", None).await.unwrap();

    let e2 = pdp
        .enforce(&execution(), EvaluationRequest::new("req-g2", llm_context(2000)))
        .await
        .data
        .unwrap();

    assert_eq!(e2.outputs["outcome"], "policy_allow");
    assert_ne!(e1.event_id, e2.event_id);
    assert_ne!(e1.outputs["outcome"], e2.outputs["outcome"]);
}

#[tokio::test]
async fn fingerprints_ignore_key_order() {
    let pdp = PolicyDecisionPoint::new(Config::default());
    pdp.create_policy(token_limit_policy(), "tests", None)
        .await
        .unwrap();

    let a = EvaluationContext::from_value(json!({
        "llm": {"provider": "openai", "maxTokens": 2000, "model": "gpt-4"},
    }))
    .unwrap();
    let b = EvaluationContext::from_value(json!({
        "llm": {"model": "gpt-4", "provider": "openai", "maxTokens": 2000},
    }))
    .unwrap();

    let ea = pdp
        .enforce(&execution(), EvaluationRequest::new("req-1", a))
        .await
        .data
        .unwrap();
    let eb = pdp
        .enforce(&execution(), EvaluationRequest::new("req-2", b))
        .await
        .data
        .unwrap();

    assert_eq!(ea.inputs_hash, eb.inputs_hash);
}

#[tokio::test]
async fn every_response_carries_an_agent_span() {
    let pdp = PolicyDecisionPoint::new(Config::default());

    let enforce = pdp
        .enforce(
            &execution(),
            EvaluationRequest::new("req-1", EvaluationContext::new()),
        )
        .await;
    assert!(!enforce.execution.agent_spans.is_empty());

    let resolve = pdp
        .resolve(
            &execution(),
            EvaluationRequest::new("req-2", EvaluationContext::new()),
        )
        .await;
    assert!(!resolve.execution.agent_spans.is_empty());

    let route = pdp
        .route(
            &execution(),
            RoutingRequest::new(EvaluationContext::new(), Requester::default()),
        )
        .await;
    assert!(!route.execution.agent_spans.is_empty());

    // Agent spans hang off the repo span, which hangs off the external
    // parent.
    let repo = &route.execution.repo_span;
    assert_eq!(repo.parent_span_id, "ext-span-1");
    assert_eq!(
        route.execution.agent_spans[0].parent_span_id,
        repo.span_id.to_string()
    );
}

#[tokio::test]
async fn audit_trail_survives_and_verifies() {
    let sink = Arc::new(InMemoryRecordSink::new());
    let pdp = PolicyDecisionPoint::new(Config::default()).with_record_sink(sink.clone());

    pdp.create_policy(token_limit_policy(), "tests", None)
        .await
        .unwrap();
    let mut updated = token_limit_policy();
    updated.description = Some("tightened".into());
    pdp.update_policy(updated, "tests", None).await.unwrap();
    pdp.set_policy_status("P1", PolicyStatus::Deprecated, "tests", None)
        .await
        .unwrap();

    let report = pdp.audit_store().verify("P1");
    assert!(report.intact);
    assert_eq!(report.entries, 3);
    assert_eq!(sink.audit_entries().len(), 3);

    // Hashes chain: each entry starts where the previous one ended.
    let entries = pdp.audit_store().entries_for("P1");
    assert_eq!(entries[0].before_hash, "null");
    assert_eq!(entries[0].after_hash, entries[1].before_hash);
    assert_eq!(entries[1].after_hash, entries[2].before_hash);
}

#[tokio::test]
async fn disabled_rule_never_appears_in_matches() {
    let pdp = PolicyDecisionPoint::new(Config::default());
    let mut policy = token_limit_policy();
    policy.rules[0].enabled = false;
    policy.rules.push(PolicyRule::new(
        "R-open",
        "allow everything",
        Condition::exists("llm.provider"),
        Action::allow(),
    ));
    pdp.create_policy(policy, "tests", None).await.unwrap();

    let event = pdp
        .enforce(&execution(), EvaluationRequest::new("req-1", llm_context(2000)))
        .await
        .data
        .unwrap();

    let matched: Vec<Value> = event.outputs["matched_rules"].as_array().unwrap().clone();
    assert!(!matched.contains(&json!("R1")));
    assert!(matched.contains(&json!("R-open")));
}
