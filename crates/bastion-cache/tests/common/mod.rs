//! Common test infrastructure for cache integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bastion_cache::{BastionError, BastionResult, Loader};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Entity used across the tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: u64,
    pub name: String,
}

impl Shop {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// In-memory authoritative store that counts every load.
#[derive(Default)]
pub struct ShopRepository {
    shops: Mutex<HashMap<u64, Shop>>,
    loads: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
}

impl ShopRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_shops(shops: impl IntoIterator<Item = Shop>) -> Arc<Self> {
        let repo = Self::default();
        repo.shops
            .lock()
            .extend(shops.into_iter().map(|shop| (shop.id, shop)));
        Arc::new(repo)
    }

    /// Makes every load take `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Makes every load fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn upsert(&self, shop: Shop) {
        self.shops.lock().insert(shop.id, shop);
    }

    pub fn remove(&self, id: u64) {
        self.shops.lock().remove(&id);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader<u64, Shop> for ShopRepository {
    async fn load(&self, id: &u64) -> BastionResult<Option<Shop>> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(BastionError::store("database down"));
        }
        Ok(self.shops.lock().get(id).cloned())
    }
}
