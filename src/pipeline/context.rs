//! Per-request context accumulated by middleware units.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

/// Fields a unit (or a static binding) contributes to the context.
///
/// # Example
///
/// ```rust
/// use request_pipeline::pipeline::ContextFragment;
///
/// let fragment = ContextFragment::new()
///     .with("tenant", "acme")
///     .with("attempt", 1);
/// assert_eq!(fragment.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextFragment {
    fields: Map<String, Value>,
}

impl ContextFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any earlier value for `key` in this fragment.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl From<Map<String, Value>> for ContextFragment {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContextFragment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Context threaded through a chain and handed to the handler.
///
/// Grows by additive merges only; no operation removes a field. Writing a key
/// that already exists is a caller error: the later value wins and a warning
/// is logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RequestContext {
    fields: Map<String, Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `fragment` into the context. Returns the keys that were overwritten.
    pub fn merge(&mut self, fragment: ContextFragment) -> Vec<String> {
        let mut overwritten = Vec::new();
        for (key, value) in fragment.fields {
            if self.fields.contains_key(&key) {
                warn!(key = %key, "Context key written twice; keeping the later value");
                overwritten.push(key.clone());
            }
            self.fields.insert(key, value);
        }
        overwritten
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Deserialize a field into `T`. `None` if absent or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.fields
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_additive() {
        let mut ctx = RequestContext::new();
        ctx.merge(ContextFragment::new().with("a", 1));
        ctx.merge(ContextFragment::new().with("b", "two"));

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get_str("b"), Some("two"));
    }

    #[test]
    fn test_repeated_key_last_write_wins() {
        let mut ctx = RequestContext::new();
        ctx.merge(ContextFragment::new().with("user", "alice"));
        let overwritten = ctx.merge(ContextFragment::new().with("user", "bob").with("x", 1));

        assert_eq!(overwritten, vec!["user".to_string()]);
        assert_eq!(ctx.get_str("user"), Some("bob"));
        assert!(ctx.contains("x"));
    }

    #[test]
    fn test_empty_merge_changes_nothing() {
        let mut ctx = RequestContext::new();
        ctx.merge(ContextFragment::new().with("a", 1));
        let before = ctx.clone();
        assert!(ctx.merge(ContextFragment::new()).is_empty());
        assert_eq!(ctx, before);
    }

    #[test]
    fn test_get_as() {
        let mut ctx = RequestContext::new();
        ctx.merge(ContextFragment::new().with("ids", json!([1, 2, 3])));

        assert_eq!(ctx.get_as::<Vec<u32>>("ids"), Some(vec![1, 2, 3]));
        assert_eq!(ctx.get_as::<String>("ids"), None);
        assert_eq!(ctx.get_as::<String>("missing"), None);
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let mut ctx = RequestContext::new();
        ctx.merge(ContextFragment::from_iter([("k", "v")]));
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({"k": "v"}));
    }
}
