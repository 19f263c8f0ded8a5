//! Typed policy corpus model.

mod action;
mod condition;
mod document;
mod rule;
mod violation;

pub use action::Action;
pub use condition::{Condition, ConditionOperator, ConditionValue};
pub use document::PolicyDocument;
pub use rule::PolicyRule;
pub use violation::{Severity, Violation};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use verdict_primitives::policy_content_hash;

/// Lifecycle status of a policy within the corpus.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// Authored but not yet eligible for evaluation.
    #[default]
    Draft,
    /// Evaluated against incoming requests.
    Active,
    /// No longer evaluated; scheduled for archival.
    Deprecated,
    /// Retained for audit only; never evaluated.
    Archived,
}

impl PolicyStatus {
    /// Returns the wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
        }
    }

    /// Returns `true` when policies in this status participate in evaluation.
    #[must_use]
    pub const fn is_evaluated(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A named bundle of rules governing permissible actions in a namespace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    /// Unique identifier within the corpus.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semantic version of the policy content.
    #[serde(default = "default_version")]
    pub version: String,
    /// Namespace the policy governs.
    #[serde(default)]
    pub namespace: String,
    /// Classification and routing tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Evaluation priority; higher values are evaluated first.
    #[serde(default)]
    pub priority: i32,
    /// Lifecycle status.
    #[serde(default)]
    pub status: PolicyStatus,
    /// Ordered rule list; the first matching enabled rule contributes.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Identity that created the policy, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Creation timestamp; part of the deterministic evaluation order.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Monotonic mutation counter, bumped on every change.
    #[serde(default)]
    pub internal_version: u64,
}

fn default_version() -> String {
    "1.0.0".to_owned()
}

impl Policy {
    /// Starts building a policy with the supplied identifier.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> PolicyBuilder {
        PolicyBuilder::new(id)
    }

    /// Returns the enabled rules in declaration order.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().filter(|rule| rule.enabled)
    }

    /// Returns the content hash committing to the audited identity of the
    /// policy (id, name, version, namespace, status, rules).
    #[must_use]
    pub fn content_hash(&self) -> String {
        let rules = serde_json::to_value(&self.rules).unwrap_or(Value::Null);
        policy_content_hash(Some((
            &self.id,
            &self.name,
            &self.version,
            &self.namespace,
            self.status.as_str(),
            &rules,
        )))
    }

    /// Validates the structural schema, collecting every violation rather
    /// than stopping at the first.
    #[must_use]
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.id.trim().is_empty() {
            violations.push(Violation::error("EMPTY_ID", "policy id cannot be empty", "id"));
        }
        if self.name.trim().is_empty() {
            violations.push(Violation::error(
                "EMPTY_NAME",
                "policy name cannot be empty",
                "name",
            ));
        }
        if self.version.trim().is_empty() {
            violations.push(Violation::error(
                "EMPTY_VERSION",
                "policy version cannot be empty",
                "version",
            ));
        }
        if self.namespace.trim().is_empty() {
            violations.push(Violation::error(
                "EMPTY_NAMESPACE",
                "policy namespace cannot be empty",
                "namespace",
            ));
        }
        if self.rules.is_empty() {
            violations.push(Violation::error(
                "NO_RULES",
                "policy must contain at least one rule",
                "rules",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for (index, rule) in self.rules.iter().enumerate() {
            let path = format!("rules[{index}]");
            if !seen.insert(rule.id.as_str()) {
                violations.push(Violation::error(
                    "DUPLICATE_RULE_ID",
                    format!("rule id `{}` appears more than once", rule.id),
                    &path,
                ));
            }
            rule.validate_into(&path, &mut violations);
        }

        violations
    }
}

/// Builder for [`Policy`].
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    id: String,
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
    namespace: Option<String>,
    tags: Vec<String>,
    priority: i32,
    status: PolicyStatus,
    rules: Vec<PolicyRule>,
    created_by: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl PolicyBuilder {
    /// Creates a builder for the given policy id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the semantic version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds a single tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds multiple tags.
    #[must_use]
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the evaluation priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the lifecycle status.
    #[must_use]
    pub fn status(mut self, status: PolicyStatus) -> Self {
        self.status = status;
        self
    }

    /// Appends a rule in declaration order.
    #[must_use]
    pub fn rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Records the creating identity.
    #[must_use]
    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }

    /// Pins the creation timestamp (tests and replays).
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Builds the policy.
    #[must_use]
    pub fn build(self) -> Policy {
        Policy {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            description: self.description,
            version: self.version.unwrap_or_else(default_version),
            namespace: self.namespace.unwrap_or_else(|| "default".to_owned()),
            tags: self.tags,
            priority: self.priority,
            status: self.status,
            rules: self.rules,
            created_by: self.created_by,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            internal_version: 1,
        }
    }
}
