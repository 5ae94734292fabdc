//! Transport contracts.
//!
//! The HTTP layer (request construction, auth, wire serialization) is an
//! external collaborator. The sync core consumes it through two narrow async
//! contracts: a fetcher that resolves a key to data, and a mutator that
//! applies a write. Payloads cross the seam as JSON values; typed models
//! live with the resource definitions.

use crate::error::Result;
use crate::store::QueryKey;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Async read operation supplied by the transport layer.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current server-side value for a key.
    async fn fetch(&self, key: &QueryKey) -> Result<Value>;
}

/// Async write operation supplied by the transport layer.
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Apply the write and return the server's result payload.
    async fn mutate(&self, input: Value) -> Result<Value>;
}

type BoxedFetchFuture = BoxFuture<'static, Result<Value>>;

/// Adapter so plain async closures can serve as fetchers.
pub struct FetcherFn<F>(pub F);

#[async_trait]
impl<F> Fetcher for FetcherFn<F>
where
    F: Fn(QueryKey) -> BoxedFetchFuture + Send + Sync,
{
    async fn fetch(&self, key: &QueryKey) -> Result<Value> {
        (self.0)(key.clone()).await
    }
}

/// Wrap an async closure as a shareable [`Fetcher`].
pub fn fetcher_fn<F, Fut>(f: F) -> Arc<dyn Fetcher>
where
    F: Fn(QueryKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FetcherFn(move |key: QueryKey| f(key).boxed()))
}

/// Adapter so plain async closures can serve as mutators.
pub struct MutatorFn<F>(pub F);

#[async_trait]
impl<F> Mutator for MutatorFn<F>
where
    F: Fn(Value) -> BoxedFetchFuture + Send + Sync,
{
    async fn mutate(&self, input: Value) -> Result<Value> {
        (self.0)(input).await
    }
}

/// Wrap an async closure as a shareable [`Mutator`].
pub fn mutator_fn<F, Fut>(f: F) -> Arc<dyn Mutator>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(MutatorFn(move |input: Value| f(input).boxed()))
}
