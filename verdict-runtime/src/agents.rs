//! The three Verdict agents over the shared substrate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use verdict_approvals::{ApprovalRouter, ApprovalRule, RoutingRequest};
use verdict_cache::{cache_key, context_fingerprint, DecisionCache};
use verdict_config::Config;
use verdict_events::{
    AuditEntry, AuditStore, DecisionEvent, DecisionEventBuilder, DecisionType, ExecutionRef,
    ExecutionSpan, InMemoryAuditStore,
};
use verdict_policy::{
    CapacityThresholds, Decision, DecisionOutcome, EvaluationRequest, GovernanceValidator,
    MutationRecord, Policy, PolicyEngine, PolicyResult, PolicyStatus,
};
use verdict_primitives::TraceId;
use verdict_solver::{AppliedConstraint, ConstraintSolver};

use crate::execution::ExecutionContext;
use crate::facade::{
    InMemoryRecordSink, RecordPayload, RecordSink, TelemetrySink, TracingTelemetrySink,
};
use crate::registration::AgentRegistration;
use crate::response::{AgentResponse, ErrorBody, ExecutionReport};

/// Closed outcome set of the policy enforcement agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEnforcementOutcome {
    /// The request is allowed unchanged.
    PolicyAllow,
    /// The request is denied.
    PolicyDeny,
    /// The request needs approval before proceeding.
    ApprovalRequired,
    /// The request is allowed with warnings or modifications attached.
    ConditionalAllow,
    /// Constraints on the request are violated.
    ConstraintViolation,
}

impl PolicyEnforcementOutcome {
    /// Maps an engine decision to the agent's outcome set.
    #[must_use]
    pub const fn from_decision(outcome: DecisionOutcome) -> Self {
        match outcome {
            DecisionOutcome::Allow => Self::PolicyAllow,
            DecisionOutcome::Deny => Self::PolicyDeny,
            DecisionOutcome::Warn | DecisionOutcome::Modify => Self::ConditionalAllow,
        }
    }

    /// Returns the wire label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PolicyAllow => "policy_allow",
            Self::PolicyDeny => "policy_deny",
            Self::ApprovalRequired => "approval_required",
            Self::ConditionalAllow => "conditional_allow",
            Self::ConstraintViolation => "constraint_violation",
        }
    }
}

const REPO_NAME: &str = "verdict";

/// The policy decision point hosting all three agents.
pub struct PolicyDecisionPoint {
    engine: Arc<PolicyEngine>,
    solver: ConstraintSolver,
    router: ApprovalRouter,
    cache: DecisionCache<DecisionEvent>,
    config: Config,
    record_sink: Arc<dyn RecordSink>,
    telemetry: Arc<dyn TelemetrySink>,
    audit: Arc<dyn AuditStore>,
}

impl PolicyDecisionPoint {
    /// Creates a decision point with in-memory sinks (tests, CLI).
    #[must_use]
    pub fn new(config: Config) -> Self {
        let cache = DecisionCache::new(config.cache.ttl(), config.cache.max_entries);
        let governance = GovernanceValidator::new().with_capacity(CapacityThresholds {
            max_policies_per_namespace: config.governance.max_policies_per_namespace,
            warning_threshold_percent: config.governance.warning_threshold_percent,
            critical_threshold_percent: config.governance.critical_threshold_percent,
        });
        Self {
            engine: Arc::new(PolicyEngine::new().with_governance(governance)),
            solver: ConstraintSolver::new(),
            router: ApprovalRouter::new(Vec::new())
                .with_utc_offset(config.approvals.utc_offset_hours),
            cache,
            config,
            record_sink: Arc::new(InMemoryRecordSink::new()),
            telemetry: Arc::new(TracingTelemetrySink),
            audit: Arc::new(InMemoryAuditStore::new()),
        }
    }

    /// Replaces the record sink.
    #[must_use]
    pub fn with_record_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.record_sink = sink;
        self
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Replaces the audit store.
    #[must_use]
    pub fn with_audit_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.audit = store;
        self
    }

    /// Installs the approval rules the routing agent matches against.
    #[must_use]
    pub fn with_approval_rules(mut self, rules: Vec<ApprovalRule>) -> Self {
        self.router = ApprovalRouter::new(rules)
            .with_utc_offset(self.config.approvals.utc_offset_hours);
        self
    }

    /// Returns the underlying policy engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Returns the audit store.
    #[must_use]
    pub fn audit_store(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }

    /// Creates a policy, appending to the audit chain on success.
    ///
    /// # Errors
    ///
    /// Propagates engine validation and governance failures; nothing is
    /// recorded on failure.
    pub async fn create_policy(
        &self,
        policy: Policy,
        actor: &str,
        correlation_id: Option<String>,
    ) -> PolicyResult<MutationRecord> {
        let record = self.engine.create(policy, actor)?;
        self.record_mutation(&record, correlation_id).await;
        Ok(record)
    }

    /// Updates a policy, appending to the audit chain on success.
    ///
    /// # Errors
    ///
    /// Propagates engine validation and governance failures.
    pub async fn update_policy(
        &self,
        policy: Policy,
        actor: &str,
        correlation_id: Option<String>,
    ) -> PolicyResult<MutationRecord> {
        let record = self.engine.update(policy, actor)?;
        self.record_mutation(&record, correlation_id).await;
        Ok(record)
    }

    /// Changes a policy's status, appending to the audit chain on success.
    ///
    /// # Errors
    ///
    /// Propagates engine validation and governance failures.
    pub async fn set_policy_status(
        &self,
        id: &str,
        status: PolicyStatus,
        actor: &str,
        correlation_id: Option<String>,
    ) -> PolicyResult<MutationRecord> {
        let record = self.engine.set_status(id, status, actor)?;
        self.record_mutation(&record, correlation_id).await;
        Ok(record)
    }

    async fn record_mutation(&self, record: &MutationRecord, correlation_id: Option<String>) {
        let entry = AuditEntry::from_mutation(record, correlation_id);
        self.audit.append(entry.clone());
        self.persist_best_effort(RecordPayload::Audit(entry)).await;
    }

    /// Synchronises the engine from a policy source (startup, reload).
    /// Every admitted policy passes through the same governance gate and
    /// audit chain as a direct mutation.
    ///
    /// # Errors
    ///
    /// Stops at the first policy the engine or governance rejects.
    pub async fn reload_from_source(
        &self,
        source: &dyn crate::facade::PolicySource,
        actor: &str,
    ) -> PolicyResult<usize> {
        let mut loaded = 0;
        for policy in source.list_active().await {
            let record = if self.engine.get(&policy.id).is_some() {
                self.engine.update(policy, actor)?
            } else {
                self.engine.create(policy, actor)?
            };
            self.record_mutation(&record, None).await;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Registers every hosted agent with the record sink.
    pub async fn register(&self) {
        for registration in AgentRegistration::all() {
            self.persist_best_effort(RecordPayload::Registration(registration))
                .await;
        }
    }

    /// Policy enforcement agent: evaluates the corpus over the context
    /// and returns the primary decision event.
    pub async fn enforce(
        &self,
        execution: &ExecutionContext,
        request: EvaluationRequest,
    ) -> AgentResponse {
        let agent = AgentRegistration::enforcement();
        let repo_span = ExecutionSpan::repo(REPO_NAME, execution.parent_span_id.clone());
        let mut agent_span = ExecutionSpan::agent(REPO_NAME, &agent.agent_id, &repo_span);
        let execution_ref = self.execution_ref(&request.request_id, execution, &agent_span);

        let inputs = json!({
            "context": request.context.to_value(),
            "policy_ids": &request.policy_ids,
        });

        let cacheable = !request.trace && !request.dry_run;
        let computed = AtomicBool::new(false);
        let mut event = if cacheable {
            let key = cache_key(
                &context_fingerprint(&request.context.to_value()),
                &request
                    .policy_ids
                    .clone()
                    .unwrap_or_else(|| self.engine.active_ids()),
            );
            self.cache
                .get_or_compute(&key, self.engine.generation(), || {
                    computed.store(true, Ordering::SeqCst);
                    let event = self.build_enforcement_event(&request, &inputs, &execution_ref);
                    async move { event }
                })
                .await
        } else {
            computed.store(true, Ordering::SeqCst);
            self.build_enforcement_event(&request, &inputs, &execution_ref)
        };

        let cached = !computed.load(Ordering::SeqCst);
        if cached {
            event
                .metadata
                .insert("cached".into(), Value::Bool(true));
        }

        self.finish(event, repo_span, &mut agent_span, request.dry_run)
            .await
    }

    fn build_enforcement_event(
        &self,
        request: &EvaluationRequest,
        inputs: &Value,
        execution_ref: &ExecutionRef,
    ) -> DecisionEvent {
        let agent = AgentRegistration::enforcement();
        let decision = self.engine.evaluate(request);
        let builder = DecisionEventBuilder::new(
            agent.agent_id,
            agent.version,
            DecisionType::PolicyEnforcementDecision,
        )
        .inputs(inputs);

        // A matched policy can vanish between the evaluation snapshot and
        // the constraint lookup; the caller still gets a well-formed
        // (error) event rather than a crashed request.
        let constraints = match self.derive_constraints(&decision) {
            Ok(constraints) => constraints,
            Err(message) => {
                return builder
                    .outputs(json!({
                        "outcome": PolicyEnforcementOutcome::PolicyDeny.as_str(),
                        "allowed": false,
                        "reason": &message,
                    }))
                    .error(message)
                    .build(execution_ref.clone());
            }
        };

        let outcome = PolicyEnforcementOutcome::from_decision(decision.outcome);
        let outputs = json!({
            "outcome": outcome.as_str(),
            "allowed": decision.allowed,
            "matched_policies": &decision.matched_policies,
            "matched_rules": &decision.matched_rules,
            "reason": &decision.reason,
            "modifications": &decision.modifications,
            "evaluation_time_ms": decision.evaluation_time_ms,
            "trace": &decision.trace,
        });

        builder
            .outputs(outputs)
            .constraints(constraints)
            .no_policy_match(decision.matched_policies.is_empty())
            .outcome_label(decision.outcome.as_str())
            .build(execution_ref.clone())
    }

    /// Constraint solver agent: evaluates the corpus, reifies matched
    /// rules as constraints, and resolves conflicts between them.
    pub async fn resolve(
        &self,
        execution: &ExecutionContext,
        request: EvaluationRequest,
    ) -> AgentResponse {
        let agent = AgentRegistration::solver();
        let repo_span = ExecutionSpan::repo(REPO_NAME, execution.parent_span_id.clone());
        let mut agent_span = ExecutionSpan::agent(REPO_NAME, &agent.agent_id, &repo_span);
        let execution_ref = self.execution_ref(&request.request_id, execution, &agent_span);

        // Conflict resolution always wants full provenance.
        let request = request.with_trace(true);
        let inputs = json!({
            "context": request.context.to_value(),
            "policy_ids": &request.policy_ids,
        });

        let decision = self.engine.evaluate(&request);
        let constraints = match self.derive_constraints(&decision) {
            Ok(constraints) => constraints,
            Err(message) => {
                let event = DecisionEventBuilder::new(
                    agent.agent_id,
                    agent.version,
                    DecisionType::ConstraintResolution,
                )
                .inputs(&inputs)
                .outputs(json!({
                    "outcome": "constraints_violated",
                    "reason": &message,
                }))
                .error(message)
                .build(execution_ref);
                return self
                    .finish(event, repo_span, &mut agent_span, request.dry_run)
                    .await;
            }
        };
        let output = self.solver.solve(constraints);

        let outputs = json!({
            "outcome": output.outcome.as_str(),
            "strategy": output.strategy,
            "conflicts": &output.conflicts,
            "conflicts_resolved": output.conflicts_resolved,
            "effective_constraints": output
                .effective
                .iter()
                .map(|constraint| constraint.id.clone())
                .collect::<Vec<_>>(),
        });

        let event = DecisionEventBuilder::new(
            agent.agent_id,
            agent.version,
            DecisionType::ConstraintResolution,
        )
        .inputs(&inputs)
        .outputs(outputs)
        .constraints(output.constraints)
        .no_policy_match(decision.matched_policies.is_empty())
        .build(execution_ref);

        self.finish(event, repo_span, &mut agent_span, request.dry_run)
            .await
    }

    /// Approval routing agent: decides whether the action needs approval
    /// and constructs the chain.
    pub async fn route(
        &self,
        execution: &ExecutionContext,
        request: RoutingRequest,
    ) -> AgentResponse {
        let agent = AgentRegistration::routing();
        let repo_span = ExecutionSpan::repo(REPO_NAME, execution.parent_span_id.clone());
        let mut agent_span = ExecutionSpan::agent(REPO_NAME, &agent.agent_id, &repo_span);
        let execution_ref = self.execution_ref(&execution.execution_id, execution, &agent_span);

        let inputs = json!({
            "context": request.context.to_value(),
            "requester": &request.requester,
            "priority": request.priority,
            "rule_filter": &request.rule_filter,
        });

        let output = self.router.route(&request);
        let outputs = json!({
            "outcome": output.outcome.as_str(),
            "approval_chain": &output.chain,
            "escalation": &output.escalation,
            "rules_matched": &output.rules_matched,
            "total_timeout_seconds": output.total_timeout_seconds,
            "justification_required": output.justification_required,
            "risk_score": output.risk_score,
        });

        let event = DecisionEventBuilder::new(
            agent.agent_id,
            agent.version,
            DecisionType::ApprovalRoutingDecision,
        )
        .inputs(&inputs)
        .outputs(outputs)
        .no_policy_match(output.rules_matched.is_empty())
        .build(execution_ref);

        self.finish(event, repo_span, &mut agent_span, false).await
    }

    fn derive_constraints(&self, decision: &Decision) -> Result<Vec<AppliedConstraint>, String> {
        decision
            .matched_policies
            .iter()
            .zip(decision.matched_rules.iter())
            .map(|(policy_id, rule_id)| {
                let policy = self.engine.get(policy_id).ok_or_else(|| {
                    format!("matched policy `{policy_id}` is no longer in the corpus")
                })?;
                let rule = policy
                    .rules
                    .iter()
                    .find(|rule| rule.id == *rule_id)
                    .ok_or_else(|| {
                        format!("matched rule `{rule_id}` is missing from policy `{policy_id}`")
                    })?;
                Ok(AppliedConstraint::from_matched_rule(&policy, rule))
            })
            .collect()
    }

    fn execution_ref(
        &self,
        request_id: &str,
        execution: &ExecutionContext,
        agent_span: &ExecutionSpan,
    ) -> ExecutionRef {
        ExecutionRef {
            request_id: request_id.to_owned(),
            trace_id: execution
                .correlation_id
                .parse()
                .unwrap_or_else(|_| TraceId::random()),
            span_id: agent_span.span_id,
            environment: self.config.env,
            session_id: execution.session_id.clone(),
        }
    }

    async fn finish(
        &self,
        event: DecisionEvent,
        mut repo_span: ExecutionSpan,
        agent_span: &mut ExecutionSpan,
        dry_run: bool,
    ) -> AgentResponse {
        if agent_span
            .attach_artifact("decision_event", event.event_id.to_string())
            .is_err()
        {
            warn!(span_id = %agent_span.span_id, "artifact attached after finalisation");
        }

        let finalise_agent = if event.is_error() {
            agent_span.fail(
                event.outputs["error"]
                    .as_str()
                    .unwrap_or("agent invocation failed"),
            )
        } else {
            agent_span.complete()
        };
        if let Err(err) = finalise_agent {
            warn!(error = %err, "agent span finalisation failed");
        }
        if let Err(err) = repo_span.complete() {
            warn!(error = %err, "repo span finalisation failed");
        }

        if !dry_run {
            self.persist_best_effort(RecordPayload::Decision(event.clone()))
                .await;
        }
        if self.config.telemetry.enabled {
            self.telemetry.emit_event(&event);
            self.telemetry.emit_span(agent_span);
            self.telemetry.emit_span(&repo_span);
        }

        let execution = ExecutionReport {
            repo_span,
            agent_spans: vec![agent_span.clone()],
        };
        AgentResponse::success(event, execution)
    }

    async fn persist_best_effort(&self, payload: RecordPayload) {
        let write = self.record_sink.persist(payload);
        match tokio::time::timeout(self.config.record_sink.timeout(), write).await {
            Ok(ack) if !ack.accepted => {
                warn!(reason = ?ack.reason, "record sink rejected a record");
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.record_sink.timeout_ms,
                    "record sink write timed out"
                );
            }
            Ok(_) => {}
        }
    }

    /// Builds a failure response for a request that never reached an
    /// agent (for example a missing execution header).
    #[must_use]
    pub fn context_failure(parent_span_id: &str, error: ErrorBody) -> AgentResponse {
        let mut repo_span = ExecutionSpan::repo(REPO_NAME, parent_span_id.to_owned());
        if let Err(err) = repo_span.fail(error.message.clone()) {
            warn!(error = %err, "repo span finalisation failed");
        }
        AgentResponse::failure(
            error,
            ExecutionReport {
                repo_span,
                agent_spans: Vec::new(),
            },
        )
    }
}
