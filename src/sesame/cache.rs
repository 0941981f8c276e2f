//! Short-lived cache of public account data, keyed by account id.
//!
//! Entries are display data only; authentication always reads the store.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::sesame::store::AccountInfo;

#[derive(Debug)]
pub struct AccountCache {
    ttl: Duration,
    entries: RwLock<HashMap<i64, (Instant, AccountInfo)>>,
}

impl AccountCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: i64) -> Option<AccountInfo> {
        self.get_at(id, Instant::now()).await
    }

    pub async fn get_at(&self, id: i64, now: Instant) -> Option<AccountInfo> {
        let entries = self.entries.read().await;
        entries
            .get(&id)
            .filter(|(stored_at, _)| now.saturating_duration_since(*stored_at) < self.ttl)
            .map(|(_, info)| info.clone())
    }

    pub async fn put(&self, info: AccountInfo) {
        self.put_at(info, Instant::now()).await;
    }

    pub async fn put_at(&self, info: AccountInfo, now: Instant) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| now.saturating_duration_since(*stored_at) < self.ttl);
        entries.insert(info.id, (now, info));
    }

    pub async fn invalidate(&self, id: i64) {
        self.entries.write().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn info(id: i64) -> AccountInfo {
        AccountInfo {
            id,
            username: format!("user{id:04}"),
            email: format!("user{id}@example.com"),
            phone_number: None,
            is_active: true,
            is_verified: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = AccountCache::new(Duration::from_secs(30));
        let now = Instant::now();
        let stored = info(1);
        cache.put_at(stored.clone(), now).await;

        assert_eq!(
            cache.get_at(1, now + Duration::from_secs(29)).await,
            Some(stored)
        );
        assert!(cache.get_at(1, now + Duration::from_secs(30)).await.is_none());
        assert!(cache.get_at(2, now).await.is_none());
    }

    #[tokio::test]
    async fn put_replaces_and_evicts_stale_entries() {
        let cache = AccountCache::new(Duration::from_secs(30));
        let now = Instant::now();
        cache.put_at(info(1), now).await;

        let later = now + Duration::from_secs(40);
        let mut renamed = info(2);
        renamed.username = "renamed".to_string();
        cache.put_at(renamed, later).await;

        assert_eq!(cache.entries.read().await.len(), 1);
        assert_eq!(
            cache.get_at(2, later).await.map(|i| i.username),
            Some("renamed".to_string())
        );
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = AccountCache::new(Duration::from_secs(30));
        cache.put(info(3)).await;
        assert!(cache.get(3).await.is_some());
        cache.invalidate(3).await;
        assert!(cache.get(3).await.is_none());
    }
}
