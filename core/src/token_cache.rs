/*
    swipetune | Swipe-to-like music discovery client core.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::models::TokenPair;
use crate::store::{KeyValueStore, StoreError};
use futures::stream::{self, Stream};
use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

pub const ACCESS_TOKEN_KEY: &str = "spotify_access_token";
pub const REFRESH_TOKEN_KEY: &str = "spotify_refresh_token";

#[derive(Error, Debug)]
pub enum TokenCacheError {
    #[error("Token cache used before initialize() was called")]
    Uninitialized,
    #[error("Failed to persist provider tokens: {0}")]
    Store(#[from] StoreError),
    #[error("Token cache write task failed: {0}")]
    Aborted(String),
}

struct Inner {
    store: Mutex<Option<Arc<dyn KeyValueStore>>>,
    access: watch::Sender<Option<String>>,
    refresh: watch::Sender<Option<String>>,
}

/// Cloneable handle to one token cache. Clones share state.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<Inner>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    /// Creates an empty, unbound cache. Call [`TokenCache::initialize`] before writing.
    pub fn new() -> Self {
        let (access, _) = watch::channel(None);
        let (refresh, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(None),
                access,
                refresh,
            }),
        }
    }

    /// Binds the durable backing store.
    ///
    /// Re-initializing with the same store instance is a no-op; a different
    /// instance replaces the binding.
    pub async fn initialize(&self, store: Arc<dyn KeyValueStore>) {
        let mut bound = self.inner.store.lock().await;
        if let Some(current) = bound.as_ref() {
            if std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(&store)) {
                debug!("Token cache already bound to this store");
                return;
            }
            info!("Rebinding token cache to a new store");
        }
        *bound = Some(store);
    }

    /// Restores the persisted pair into memory.
    ///
    /// Returns `false` when the cache is unbound or the store read fails.
    pub async fn load_from_store(&self) -> bool {
        let bound = self.inner.store.lock().await;
        let Some(store) = bound.as_ref() else {
            warn!("load_from_store called before initialize");
            return false;
        };

        let loaded = async {
            let access = store.get(ACCESS_TOKEN_KEY).await?;
            let refresh = store.get(REFRESH_TOKEN_KEY).await?;
            Ok::<_, StoreError>((access, refresh))
        }
        .await;

        match loaded {
            Ok((access, refresh)) => {
                debug!(
                    "Loaded provider tokens from store (access present: {})",
                    access.is_some()
                );
                self.inner.access.send_replace(access);
                self.inner.refresh.send_replace(refresh);
                true
            }
            Err(e) => {
                warn!("Failed to load provider tokens: {}", e);
                false
            }
        }
    }

    /// Writes both tokens to memory and then to the durable store, atomically.
    ///
    /// The write runs on its own task: once started, it completes even if the
    /// caller's future is dropped.
    pub async fn set_tokens(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<(), TokenCacheError> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.write(access_token, refresh_token).await })
            .await
            .map_err(|e| TokenCacheError::Aborted(e.to_string()))?
    }

    pub async fn set_pair(&self, pair: TokenPair) -> Result<(), TokenCacheError> {
        self.set_tokens(pair.access_token, pair.refresh_token).await
    }

    /// Removes both tokens from memory and from the durable store.
    pub async fn clear(&self) -> Result<(), TokenCacheError> {
        self.set_tokens(None, None).await
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.access.borrow().clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.refresh.borrow().clone()
    }

    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
        }
    }

    /// True iff a non-empty access token is cached.
    pub fn has_token(&self) -> bool {
        self.inner
            .access
            .borrow()
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    pub fn subscribe_access_token(&self) -> watch::Receiver<Option<String>> {
        self.inner.access.subscribe()
    }

    pub fn subscribe_refresh_token(&self) -> watch::Receiver<Option<String>> {
        self.inner.refresh.subscribe()
    }

    /// Yields the current access token, then every later change.
    pub fn access_token_stream(&self) -> impl Stream<Item = Option<String>> + Send + 'static {
        watch_stream(self.subscribe_access_token())
    }

    /// Yields the current refresh token, then every later change.
    pub fn refresh_token_stream(&self) -> impl Stream<Item = Option<String>> + Send + 'static {
        watch_stream(self.subscribe_refresh_token())
    }
}

impl Inner {
    async fn write(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<(), TokenCacheError> {
        let bound = self.store.lock().await;
        let store = bound.as_ref().ok_or(TokenCacheError::Uninitialized)?;

        let previous_access = self.access.send_replace(access_token.clone());
        let previous_refresh = self.refresh.send_replace(refresh_token.clone());

        let persisted = async {
            persist(store.as_ref(), ACCESS_TOKEN_KEY, access_token.as_deref()).await?;
            persist(store.as_ref(), REFRESH_TOKEN_KEY, refresh_token.as_deref()).await
        }
        .await;

        if let Err(e) = persisted {
            warn!("Provider token write failed, restoring previous pair: {}", e);
            let restored = async {
                persist(store.as_ref(), ACCESS_TOKEN_KEY, previous_access.as_deref()).await?;
                persist(store.as_ref(), REFRESH_TOKEN_KEY, previous_refresh.as_deref()).await
            }
            .await;

            match restored {
                Ok(()) => {
                    self.access.send_replace(previous_access);
                    self.refresh.send_replace(previous_refresh);
                }
                Err(rollback) => {
                    warn!("Restoring provider tokens failed, resyncing from store: {}", rollback);
                    self.resync(store.as_ref()).await;
                }
            }
            return Err(e.into());
        }

        debug!(
            "Provider tokens updated (access present: {})",
            access_token.is_some()
        );
        Ok(())
    }

    /// Makes memory mirror whatever the store holds. Caller holds the store lock.
    async fn resync(&self, store: &dyn KeyValueStore) {
        let access = store.get(ACCESS_TOKEN_KEY).await;
        let refresh = store.get(REFRESH_TOKEN_KEY).await;
        match (access, refresh) {
            (Ok(access), Ok(refresh)) => {
                self.access.send_replace(access);
                self.refresh.send_replace(refresh);
            }
            (Err(e), _) | (_, Err(e)) => {
                // Durable state unknown.
                error!("Provider token store unreadable, clearing memory: {}", e);
                self.access.send_replace(None);
                self.refresh.send_replace(None);
            }
        }
    }
}

async fn persist(
    store: &dyn KeyValueStore,
    key: &str,
    value: Option<&str>,
) -> Result<(), StoreError> {
    match value {
        Some(value) => store.set(key, value).await,
        None => store.remove(key).await,
    }
}

fn watch_stream(
    rx: watch::Receiver<Option<String>>,
) -> impl Stream<Item = Option<String>> + Send + 'static {
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    })
}
