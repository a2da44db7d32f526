//! Capability traits for the authoritative store.

use crate::BastionResult;
use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;

/// Read-only lookup of one entity by identifier.
///
/// This is the cache layer's only view of the backing store. Implementations
/// must not mutate the store; `Ok(None)` means the store confirmed the entity
/// does not exist, while `Err` means the store could not be asked.
#[async_trait]
pub trait Loader<I, V>: Send + Sync
where
    I: Send + Sync,
    V: Send,
{
    /// Loads the entity with the given identifier.
    async fn load(&self, id: &I) -> BastionResult<Option<V>>;
}

/// Bound for identifiers that can be embedded in cache keys.
pub trait CacheId: Display + Clone + Send + Sync + 'static {}

impl<T> CacheId for T where T: Display + Clone + Send + Sync + 'static {}

/// Adapts an async closure into a [`Loader`].
///
/// ```ignore
/// let loader = FnLoader::new(|id: u64| async move { repo.find_by_id(id).await });
/// ```
pub struct FnLoader<I, V, F> {
    f: F,
    _marker: PhantomData<fn(I) -> V>,
}

impl<I, V, F> FnLoader<I, V, F> {
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<I, V, F, Fut> Loader<I, V> for FnLoader<I, V, F>
where
    I: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = BastionResult<Option<V>>> + Send,
{
    async fn load(&self, id: &I) -> BastionResult<Option<V>> {
        (self.f)(id.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BastionError;

    #[tokio::test]
    async fn test_fn_loader_returns_value() {
        let loader = FnLoader::new(|id: u64| async move { Ok(Some(format!("shop-{}", id))) });
        let value = loader.load(&7).await.unwrap();
        assert_eq!(value.as_deref(), Some("shop-7"));
    }

    #[tokio::test]
    async fn test_fn_loader_propagates_errors() {
        let loader = FnLoader::new(|_id: u64| async move {
            Err::<Option<String>, _>(BastionError::store("database down"))
        });
        let err = loader.load(&1).await.unwrap_err();
        assert!(matches!(err, BastionError::StoreUnavailable(_)));
    }
}
