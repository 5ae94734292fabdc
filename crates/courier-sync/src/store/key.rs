//! Cache key type.

use serde::{Deserialize, Serialize};

/// Identifier for one cached resource instance.
///
/// A key is a resource name plus optional parameters, rendered canonically as
/// `resource:params` (or just `resource` for list-form keys). Prefix
/// invalidation matches on the resource name alone, so invalidating
/// `campaign` covers `campaign:1`, `campaign:2`, and the bare `campaign` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    /// Resource name, e.g. `campaigns` or `campaign-status`.
    pub resource: String,
    /// Optional parameterization, e.g. a campaign id or a lookback window.
    pub params: Option<String>,
}

impl QueryKey {
    /// Key for a list-form resource with no parameters.
    pub fn resource(name: impl Into<String>) -> Self {
        Self {
            resource: name.into(),
            params: None,
        }
    }

    /// Key for a specific parameterization of a resource.
    pub fn item(name: impl Into<String>, params: impl ToString) -> Self {
        Self {
            resource: name.into(),
            params: Some(params.to_string()),
        }
    }

    /// Whether this key belongs to the given resource name.
    pub fn matches_resource(&self, resource: &str) -> bool {
        self.resource == resource
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.params {
            Some(params) => write!(f, "{}:{}", self.resource, params),
            None => write!(f, "{}", self.resource),
        }
    }
}
