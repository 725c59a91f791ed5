//! TTL cache for suggestion source results.
//!
//! The backend is chosen from configuration at startup:
//!
//! - [`SuggestionCache::memory`] keeps entries in a process-local map guarded
//!   by a `tokio::sync::RwLock`, evicting expired entries first and then the
//!   oldest insertion once full.
//! - [`SuggestionCache::key_value`] stores JSON-encoded results in a
//!   [`KeyValueStore`], so instances share entries.
//!
//! Cache failures never fail a fetch: reads fall through to the source and
//! writes are dropped with a warning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SuggestionFetcher;
use crate::config::CacheBackendKind;
use crate::domain::{Suggestion, SuggestionQuery, SuggestionSource};
use crate::error::{SourceError, StoreError};
use crate::persistence::KeyValueStore;

/// Default capacity of the in-memory backend.
pub const DEFAULT_MEMORY_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<Suggestion>,
    inserted_at: Instant,
}

#[derive(Debug)]
enum Backend {
    Memory {
        entries: RwLock<HashMap<String, MemoryEntry>>,
        capacity: usize,
    },
    KeyValue(Arc<dyn KeyValueStore>),
}

/// Cache of source results keyed by [`SuggestionQuery::cache_key`].
#[derive(Debug)]
pub struct SuggestionCache {
    backend: Backend,
    ttl: Duration,
}

impl SuggestionCache {
    /// Creates an in-memory cache holding at most `capacity` entries.
    #[must_use]
    pub fn memory(ttl: Duration, capacity: usize) -> Self {
        Self {
            backend: Backend::Memory {
                entries: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
            },
            ttl,
        }
    }

    /// Creates a cache backed by a key-value store.
    #[must_use]
    pub fn key_value(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            backend: Backend::KeyValue(store),
            ttl,
        }
    }

    /// Creates the cache selected by `kind`, using `store` for the key-value
    /// backend.
    #[must_use]
    pub fn from_kind(kind: CacheBackendKind, store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        match kind {
            CacheBackendKind::Memory => Self::memory(ttl, DEFAULT_MEMORY_CAPACITY),
            CacheBackendKind::KeyValue => Self::key_value(store, ttl),
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value of `key`, if present and fresh.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the key-value backend fails or holds an
    /// entry that cannot be decoded.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<Suggestion>>, StoreError> {
        match &self.backend {
            Backend::Memory { entries, .. } => {
                let entries = entries.read().await;
                Ok(entries
                    .get(key)
                    .filter(|e| e.inserted_at.elapsed() < self.ttl)
                    .map(|e| e.value.clone()))
            }
            Backend::KeyValue(store) => match store.get_value(key).await? {
                Some(raw) => serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|e| StoreError::Corrupt(format!("cache entry {key}: {e}"))),
                None => Ok(None),
            },
        }
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the key-value backend fails.
    pub async fn put(&self, key: &str, value: &[Suggestion]) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory { entries, capacity } => {
                let mut entries = entries.write().await;
                if entries.len() >= *capacity && !entries.contains_key(key) {
                    entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
                }
                if entries.len() >= *capacity && !entries.contains_key(key) {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, e)| e.inserted_at)
                        .map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        entries.remove(&oldest);
                    }
                }
                entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: value.to_vec(),
                        inserted_at: Instant::now(),
                    },
                );
                Ok(())
            }
            Backend::KeyValue(store) => {
                let raw = serde_json::to_string(value)
                    .map_err(|e| StoreError::Corrupt(format!("cache entry {key}: {e}")))?;
                store.put_value(key, &raw, self.ttl).await
            }
        }
    }
}

/// A [`SuggestionFetcher`] that consults a [`SuggestionCache`] first.
#[derive(Debug)]
pub struct CachedFetcher {
    inner: Arc<dyn SuggestionFetcher>,
    cache: Arc<SuggestionCache>,
}

impl CachedFetcher {
    /// Wraps `inner` with `cache`.
    #[must_use]
    pub fn new(inner: Arc<dyn SuggestionFetcher>, cache: Arc<SuggestionCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl SuggestionFetcher for CachedFetcher {
    fn kind(&self) -> SuggestionSource {
        self.inner.kind()
    }

    async fn fetch(&self, query: &SuggestionQuery) -> Result<Vec<Suggestion>, SourceError> {
        let source = self.inner.kind();
        let key = query.cache_key(source);

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                tracing::debug!(%source, "suggestion cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%source, error = %e, "suggestion cache read failed"),
        }

        let fresh = self.inner.fetch(query).await?;
        if let Err(e) = self.cache.put(&key, &fresh).await {
            tracing::warn!(%source, error = %e, "suggestion cache write failed");
        }
        Ok(fresh)
    }
}
