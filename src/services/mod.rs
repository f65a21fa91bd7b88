//! Business logic services

pub mod catalog;
pub mod reconciler;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    repository::BookStore,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub reconciler: reconciler::ReconcilerService,
}

impl Services {
    /// Create all services over the given store. Every store call is bounded by `store_timeout`.
    pub fn new(store: Arc<dyn BookStore>, store_timeout: Duration) -> Self {
        Self {
            catalog: catalog::CatalogService::new(store.clone(), store_timeout),
            reconciler: reconciler::ReconcilerService::new(store, store_timeout),
        }
    }
}

/// Run a store call, failing with `AppError::Timeout` once `limit` elapses
pub(crate) async fn with_timeout<T, F>(limit: Duration, operation: &str, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AppError::Timeout(format!("{} exceeded {:?}", operation, limit)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_store_calls_time_out() {
        let result: AppResult<()> = with_timeout(Duration::from_millis(10), "ping", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }
}
