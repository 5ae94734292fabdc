//! Mutation execution and the mutation-to-invalidation cascade.
//!
//! A mutation runs against the transport's mutator; on success the
//! coordinator applies a rule-defined set of invalidation targets against
//! the shared store, exactly once, and hands the mutator's result back
//! unchanged. A mutator failure never touches the cache. A failure while
//! applying the rule is reported to the operational log but does not
//! downgrade the mutation's success.

use crate::error::Result;
use crate::query::Mutator;
use crate::store::{CacheStore, QueryKey};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// One cache region a mutation renders stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// A single key.
    Key(QueryKey),
    /// Every key of a resource, regardless of parameters.
    Resource(String),
}

/// Maps a successful mutation's result to the cache targets it invalidates.
///
/// Rules may derive targets from the mutation result (for example the id of
/// a newly created campaign); a rule that cannot — say the result is missing
/// the field it needs — fails with an invalidation error.
pub trait InvalidationRule: Send + Sync {
    /// The targets to invalidate for this mutation result.
    fn targets(&self, result: &Value) -> Result<Vec<InvalidationTarget>>;
}

/// A fixed set of targets, independent of the mutation result.
pub struct StaticTargets(pub Vec<InvalidationTarget>);

impl InvalidationRule for StaticTargets {
    fn targets(&self, _result: &Value) -> Result<Vec<InvalidationTarget>> {
        Ok(self.0.clone())
    }
}

/// A rule computed from the mutation result by a closure.
pub struct RuleFn<F>(pub F);

impl<F> InvalidationRule for RuleFn<F>
where
    F: Fn(&Value) -> Result<Vec<InvalidationTarget>> + Send + Sync,
{
    fn targets(&self, result: &Value) -> Result<Vec<InvalidationTarget>> {
        (self.0)(result)
    }
}

/// Executes mutations and applies their invalidation rules.
pub struct MutationCoordinator {
    store: Arc<CacheStore>,
}

impl MutationCoordinator {
    /// Create a coordinator over a shared store.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Run a mutation and, on success, apply its invalidation rule.
    ///
    /// The mutator's result is returned unchanged so callers can extract
    /// identifiers for follow-up (navigation, polling). The mutator's error
    /// is propagated with its cause intact and no cache change. An
    /// invalidation failure after a successful mutation is logged and the
    /// success is still reported.
    pub async fn execute(
        &self,
        mutator: &Arc<dyn Mutator>,
        input: Value,
        rule: &dyn InvalidationRule,
    ) -> Result<Value> {
        let result = mutator.mutate(input).await?;

        match rule.targets(&result) {
            Ok(targets) => self.apply_targets(&targets),
            Err(err) => {
                // Stale reads are now possible for the affected keys; make
                // that diagnosable without failing the mutation.
                error!(error = %err, "invalidation rule failed after successful mutation");
            }
        }

        Ok(result)
    }

    fn apply_targets(&self, targets: &[InvalidationTarget]) {
        for target in targets {
            match target {
                InvalidationTarget::Key(key) => {
                    self.store.invalidate(key);
                }
                InvalidationTarget::Resource(resource) => {
                    self.store.invalidate_resource(resource);
                }
            }
        }
        debug!(count = targets.len(), "invalidation pass applied");
    }
}
