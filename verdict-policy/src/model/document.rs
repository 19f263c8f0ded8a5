//! Policy document ingest: JSON and YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Policy, Violation};
use crate::error::{PolicyError, PolicyResult};

/// A document bundling one or more policies for loading.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Document format version.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Document kind discriminator.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Policies defined in this document.
    #[serde(default)]
    pub policies: Vec<Policy>,
}

fn default_api_version() -> String {
    "verdict.dev/v1".to_owned()
}

fn default_kind() -> String {
    "PolicyDocument".to_owned()
}

impl PolicyDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            policies: Vec::new(),
        }
    }

    /// Creates a document holding the supplied policies.
    #[must_use]
    pub fn with_policies(policies: Vec<Policy>) -> Self {
        Self {
            policies,
            ..Self::new()
        }
    }

    /// Parses a document from JSON. A bare policy object is accepted and
    /// wrapped into a single-policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] when the text is neither a document
    /// nor a policy.
    pub fn from_json(json: &str) -> PolicyResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|err| PolicyError::parse(err.to_string()))?;
        Self::from_value(value)
    }

    /// Parses a document from YAML, with the same bare-policy fallback as
    /// [`Self::from_json`].
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] when the text is neither a document
    /// nor a policy.
    pub fn from_yaml(yaml: &str) -> PolicyResult<Self> {
        let value: serde_json::Value =
            serde_yaml::from_str(yaml).map_err(|err| PolicyError::parse(err.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> PolicyResult<Self> {
        if value.get("policies").is_some() {
            return serde_json::from_value(value).map_err(|err| PolicyError::parse(err.to_string()));
        }
        let policy: Policy =
            serde_json::from_value(value).map_err(|err| PolicyError::parse(err.to_string()))?;
        Ok(Self::with_policies(vec![policy]))
    }

    /// Loads a document from a file, choosing the parser by extension and
    /// falling back to YAML-then-JSON for unknown extensions.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Io`] on read failure or [`PolicyError::Parse`]
    /// when neither parser accepts the content.
    pub fn from_file(path: impl AsRef<Path>) -> PolicyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Self::from_yaml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    /// Serialises the document to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] if serialisation fails.
    pub fn to_json(&self) -> PolicyResult<String> {
        serde_json::to_string_pretty(self).map_err(|err| PolicyError::parse(err.to_string()))
    }

    /// Serialises the document to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] if serialisation fails.
    pub fn to_yaml(&self) -> PolicyResult<String> {
        serde_yaml::to_string(self).map_err(|err| PolicyError::parse(err.to_string()))
    }

    /// Validates every policy, returning the combined violation list.
    #[must_use]
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for policy in &self.policies {
            if !policy.id.is_empty() && !seen.insert(policy.id.as_str()) {
                violations.push(Violation::error(
                    "DUPLICATE_POLICY_ID",
                    format!("policy id `{}` appears more than once", policy.id),
                    &policy.id,
                ));
            }
            violations.extend(policy.validate());
        }
        violations
    }

    /// Finds a policy by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Policy> {
        self.policies.iter().find(|policy| policy.id == id)
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Condition, PolicyRule, PolicyStatus};

    fn sample_policy() -> Policy {
        Policy::builder("doc-policy")
            .name("Doc Policy")
            .namespace("llm-ops")
            .status(PolicyStatus::Active)
            .rule(PolicyRule::new(
                "r-1",
                "allow openai",
                Condition::equals("llm.provider", "openai"),
                Action::allow(),
            ))
            .build()
    }

    #[test]
    fn json_round_trip_preserves_policies() {
        let doc = PolicyDocument::with_policies(vec![sample_policy()]);
        let json = doc.to_json().unwrap();
        let parsed = PolicyDocument::from_json(&json).unwrap();
        assert_eq!(parsed.policies.len(), 1);
        assert_eq!(parsed.policies[0].rules, doc.policies[0].rules);
    }

    #[test]
    fn yaml_round_trip_preserves_policies() {
        let doc = PolicyDocument::with_policies(vec![sample_policy()]);
        let yaml = doc.to_yaml().unwrap();
        let parsed = PolicyDocument::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.policies[0].id, "doc-policy");
        assert_eq!(parsed.policies[0].rules, doc.policies[0].rules);
    }

    #[test]
    fn bare_policy_is_wrapped() {
        let json = serde_json::to_string(&sample_policy()).unwrap();
        let parsed = PolicyDocument::from_json(&json).unwrap();
        assert_eq!(parsed.policies.len(), 1);
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = PolicyDocument::from_json("{not json").unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
    }

    #[test]
    fn duplicate_policy_ids_are_reported() {
        let doc = PolicyDocument::with_policies(vec![sample_policy(), sample_policy()]);
        let violations = doc.validate();
        assert!(violations.iter().any(|v| v.code == "DUPLICATE_POLICY_ID"));
    }
}
