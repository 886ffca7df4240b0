//! Endpoint sources
//!
//! An [`EndpointSource`] produces the ordered list of endpoints to verify.
//! The checker calls it fresh on every pass and never caches the result.

use crate::error::SourceError;

/// Produces the current ordered sequence of endpoint authorities.
///
/// Implementations must be safe to call repeatedly and concurrently.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait EndpointSource: Send + Sync {
    /// Current endpoints, in the order they should be reported
    async fn endpoints(&self) -> Result<Vec<String>, SourceError>;
}

#[async_trait::async_trait]
impl<S: EndpointSource + ?Sized> EndpointSource for std::sync::Arc<S> {
    async fn endpoints(&self) -> Result<Vec<String>, SourceError> {
        (**self).endpoints().await
    }
}

/// Adapts a synchronous list function into an [`EndpointSource`].
pub struct FnSource<F> {
    list_fn: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Result<Vec<String>, SourceError> + Send + Sync,
{
    /// Wrap a list function
    pub fn new(list_fn: F) -> Self {
        Self { list_fn }
    }
}

impl<F> std::fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<F> EndpointSource for FnSource<F>
where
    F: Fn() -> Result<Vec<String>, SourceError> + Send + Sync,
{
    async fn endpoints(&self) -> Result<Vec<String>, SourceError> {
        (self.list_fn)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_source_returns_list() {
        let source = FnSource::new(|| Ok(vec!["a".to_string(), "b".to_string()]));
        let endpoints = source.endpoints().await.expect("list should succeed");
        assert_eq!(endpoints, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fn_source_propagates_error() {
        let source = FnSource::new(|| Err("some error".into()));
        let err = source.endpoints().await.expect_err("list should fail");
        assert_eq!(err.to_string(), "some error");
    }

    #[tokio::test]
    async fn test_arc_source_delegates() {
        let source: Arc<dyn EndpointSource> =
            Arc::new(FnSource::new(|| Ok(vec!["shared".to_string()])));
        let endpoints = source.endpoints().await.expect("list should succeed");
        assert_eq!(endpoints, vec!["shared"]);
    }
}
