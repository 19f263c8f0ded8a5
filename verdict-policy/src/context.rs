//! Evaluation context: the open bag of request fields policies inspect.
//!
//! The context is a JSON object with conventional branches (`llm`, `user`,
//! `team`, `project`, `request`, `metadata`) but unknown fields are kept
//! verbatim so fingerprints commit to the full caller-supplied input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Context supplied for one policy evaluation. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationContext {
    root: Map<String, Value>,
}

impl EvaluationContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a context with the conventional branch helpers.
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Wraps an existing JSON object as a context. Non-object values are
    /// rejected because field paths cannot resolve into them.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(root) => Some(Self { root }),
            _ => None,
        }
    }

    /// Resolves a dotted field path (`a.b.c`). Returns `None` (the
    /// undefined sentinel) when any component is missing or descent hits
    /// a non-object before the path is exhausted.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns `true` when the path resolves to a defined, non-null value.
    #[must_use]
    pub fn is_defined(&self, path: &str) -> bool {
        self.resolve(path).is_some_and(|value| !value.is_null())
    }

    /// Returns the context as a JSON value (for fingerprinting).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Returns `true` when the context carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

/// Builder assembling a context from the conventional platform branches.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    root: Map<String, Value>,
}

impl ContextBuilder {
    fn branch(&mut self, name: &str) -> &mut Map<String, Value> {
        self.root
            .entry(name.to_owned())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .expect("branch initialised as object")
    }

    /// Sets `llm.provider`.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.branch("llm")
            .insert("provider".into(), Value::String(provider.into()));
        self
    }

    /// Sets `llm.model`.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.branch("llm")
            .insert("model".into(), Value::String(model.into()));
        self
    }

    /// Sets `llm.maxTokens`.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.branch("llm")
            .insert("maxTokens".into(), Value::from(max_tokens));
        self
    }

    /// Sets `llm.temperature`.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.branch("llm")
            .insert("temperature".into(), Value::from(temperature));
        self
    }

    /// Sets `user.id`, `user.roles`, and `user.permissions`.
    #[must_use]
    pub fn user(
        mut self,
        id: impl Into<String>,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Self {
        let user = self.branch("user");
        user.insert("id".into(), Value::String(id.into()));
        user.insert("roles".into(), Value::from(roles));
        user.insert("permissions".into(), Value::from(permissions));
        self
    }

    /// Sets `team.id` and optionally `team.tier`.
    #[must_use]
    pub fn team(mut self, id: impl Into<String>, tier: Option<String>) -> Self {
        let team = self.branch("team");
        team.insert("id".into(), Value::String(id.into()));
        if let Some(tier) = tier {
            team.insert("tier".into(), Value::String(tier));
        }
        self
    }

    /// Sets `project.id` and optionally `project.environment`.
    #[must_use]
    pub fn project(mut self, id: impl Into<String>, environment: Option<String>) -> Self {
        let project = self.branch("project");
        project.insert("id".into(), Value::String(id.into()));
        if let Some(environment) = environment {
            project.insert("environment".into(), Value::String(environment));
        }
        self
    }

    /// Sets `request.id`.
    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.branch("request")
            .insert("id".into(), Value::String(id.into()));
        self
    }

    /// Inserts a key under the open `metadata` branch.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.branch("metadata").insert(key.into(), value);
        self
    }

    /// Inserts an arbitrary top-level field, preserving unknown branches.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.root.insert(key.into(), value);
        self
    }

    /// Builds the immutable context.
    #[must_use]
    pub fn build(self) -> EvaluationContext {
        EvaluationContext { root: self.root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_dotted_paths() {
        let ctx = EvaluationContext::builder()
            .provider("openai")
            .model("gpt-4")
            .max_tokens(2000)
            .build();

        assert_eq!(ctx.resolve("llm.provider"), Some(&json!("openai")));
        assert_eq!(ctx.resolve("llm.maxTokens"), Some(&json!(2000)));
        assert_eq!(ctx.resolve("llm.missing"), None);
        assert_eq!(ctx.resolve("user.id"), None);
    }

    #[test]
    fn descent_through_scalar_is_undefined() {
        let ctx = EvaluationContext::builder().model("gpt-4").build();
        assert_eq!(ctx.resolve("llm.model.sub"), None);
    }

    #[test]
    fn null_is_defined_for_resolve_but_not_exists() {
        let ctx = EvaluationContext::from_value(json!({"a": {"b": null}})).unwrap();
        assert!(ctx.resolve("a.b").is_some());
        assert!(!ctx.is_defined("a.b"));
    }

    #[test]
    fn unknown_fields_survive_round_trips() {
        let value = json!({"custom": {"deep": [1, 2]}, "llm": {"model": "gpt-4"}});
        let ctx = EvaluationContext::from_value(value.clone()).unwrap();
        assert_eq!(ctx.to_value(), value);

        let json_text = serde_json::to_string(&ctx).unwrap();
        let reparsed: EvaluationContext = serde_json::from_str(&json_text).unwrap();
        assert_eq!(reparsed, ctx);
    }

    #[test]
    fn non_object_value_is_rejected() {
        assert!(EvaluationContext::from_value(json!([1, 2])).is_none());
    }
}
