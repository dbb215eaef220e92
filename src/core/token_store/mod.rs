use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use yenwallet_utils::*;

use crate::external::Storage;
use crate::models::{TokenPair, TokenUpdate};

const STORAGE_TOKENS: &str = "__auth__tokens";

/// Persisted access/refresh token pair.
///
/// Keeps an in-memory copy of the record so that request headers can be
/// built without a storage round trip.
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    /// `None` until the persisted record has been read
    tokens: RwLock<Option<TokenPair>>,
    /// Bumped on every `clear`
    generation: AtomicU64,
    /// Serializes `save` and `clear` so that the record matches memory
    write_lock: tokio::sync::Mutex<()>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            tokens: RwLock::new(None),
            generation: AtomicU64::new(0),
            write_lock: Default::default(),
        }
    }

    /// Reads persisted tokens. Returns an empty pair on missing or invalid data
    pub async fn load(&self) -> TokenPair {
        let pair = match self.storage.get(STORAGE_TOKENS).await {
            Ok(Some(data)) => match serde_json::from_str::<TokenPair>(&data) {
                Ok(pair) => pair.normalized(),
                Err(e) => {
                    log::warn!("Ignoring malformed token record: {}", e);
                    TokenPair::default()
                }
            },
            Ok(None) => TokenPair::default(),
            Err(e) => {
                log::warn!("Failed to read token record: {:?}", e);
                TokenPair::default()
            }
        };

        *self.tokens.write() = Some(pair.clone());
        pair
    }

    /// Last loaded or saved tokens
    pub fn current(&self) -> TokenPair {
        self.tokens.read().clone().unwrap_or_default()
    }

    /// Number of `clear` calls so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Merges the update into the current pair and persists the result.
    ///
    /// In-memory state is updated even if persisting fails.
    pub async fn save(&self, update: TokenUpdate) -> Result<TokenPair> {
        let _guard = self.write_lock.lock().await;
        self.merge_and_persist(update).await
    }

    /// Same as [`TokenStore::save`], but does nothing and returns `None`
    /// if the store was cleared after `generation` was observed.
    pub async fn save_unless_cleared(
        &self,
        generation: u64,
        update: TokenUpdate,
    ) -> Result<Option<TokenPair>> {
        let _guard = self.write_lock.lock().await;
        if self.generation() != generation {
            return Ok(None);
        }
        self.merge_and_persist(update).await.map(Some)
    }

    /// Forgets tokens and removes the persisted record
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.tokens.write() = Some(TokenPair::default());
        self.storage.remove(STORAGE_TOKENS).await
    }

    async fn merge_and_persist(&self, update: TokenUpdate) -> Result<TokenPair> {
        if self.tokens.read().is_none() {
            self.load().await;
        }

        let pair = {
            let mut tokens = self.tokens.write();
            let pair = tokens.get_or_insert_with(Default::default);
            pair.merge(update);
            pair.clone()
        };

        let data = serde_json::to_string(&pair).trust_me();
        self.storage.set(STORAGE_TOKENS, &data).await?;
        Ok(pair)
    }
}
