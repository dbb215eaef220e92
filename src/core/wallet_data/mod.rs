use std::sync::Arc;

use futures_util::future;
use futures_util::StreamExt;
use parking_lot::RwLock;
use quick_cache::sync::Cache as QuickCache;

use crate::core::parsing::{parse_address, parse_assets, parse_balance};
use crate::models::{ApiError, AssetImage, AssetRecord, WalletConfig, WalletSnapshot};
use crate::transport::endpoints;
use crate::transport::models::ApiRequest;
use crate::transport::Transport;

/// Read side of the wallet.
///
/// Balance, address and asset list are published together as a
/// [`WalletSnapshot`]. Asset images are loaded separately and a failure
/// only degrades the affected record.
pub struct WalletDataAggregator {
    transport: Arc<dyn Transport>,
    snapshot: RwLock<Option<WalletSnapshot>>,
    images: ImageCache,
    image_concurrency: usize,
}

impl WalletDataAggregator {
    pub fn new(transport: Arc<dyn Transport>, config: &WalletConfig) -> Self {
        Self {
            transport,
            snapshot: RwLock::new(None),
            images: ImageCache::with_capacity(config.image_cache_capacity),
            image_concurrency: config.image_concurrency.max(1),
        }
    }

    /// Last successfully loaded snapshot
    pub fn snapshot(&self) -> Option<WalletSnapshot> {
        self.snapshot.read().clone()
    }

    /// Reads balance, address and assets concurrently.
    ///
    /// Either all three reads succeed and the result is published, or the
    /// first error is returned and the published snapshot stays untouched.
    pub async fn load_snapshot(&self) -> Result<WalletSnapshot, ApiError> {
        let (balance_satoshis, address, mut assets) =
            future::try_join3(self.fetch_balance(), self.fetch_address(), self.fetch_assets())
                .await
                .map_err(|e| {
                    log::warn!("Failed to load wallet snapshot: {}", e);
                    e
                })?;

        self.images.apply(&mut assets);

        let snapshot = WalletSnapshot {
            balance_satoshis,
            address,
            assets,
        };
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Fetches images of all not yet loaded assets.
    ///
    /// Never fails. Returns the number of assets left without an image.
    pub async fn load_images(&self, assets: &mut [AssetRecord]) -> usize {
        let outcomes = futures_util::stream::iter(
            assets
                .iter()
                .enumerate()
                .filter(|(_, asset)| !asset.image.is_loaded())
                .map(|(index, asset)| {
                    let origin_id = asset.origin_id.clone();
                    async move { (index, self.fetch_image(&origin_id).await) }
                }),
        )
        .buffer_unordered(self.image_concurrency)
        .collect::<Vec<_>>()
        .await;

        let mut degraded = 0;
        for (index, image) in outcomes {
            if matches!(image, AssetImage::Unavailable { .. }) {
                degraded += 1;
            }
            assets[index].image = image;
        }
        degraded
    }

    /// Loads images for the published snapshot and writes them back.
    ///
    /// Returns `None` if nothing has been published yet.
    pub async fn load_gallery_images(&self) -> Option<WalletSnapshot> {
        let mut assets = self.snapshot.read().as_ref()?.assets.clone();
        let degraded = self.load_images(&mut assets).await;
        if degraded > 0 {
            log::warn!("{} of {} asset images are unavailable", degraded, assets.len());
        }

        let mut snapshot = self.snapshot.write();
        let snapshot = snapshot.as_mut()?;
        for asset in &mut snapshot.assets {
            // the list could have been replaced while images were loading
            if let Some(loaded) = assets.iter().find(|item| item.origin_id == asset.origin_id) {
                if !asset.image.is_loaded() {
                    asset.image = loaded.image.clone();
                }
            }
        }
        Some(snapshot.clone())
    }

    /// Re-reads only the balance of the published snapshot
    pub async fn refresh_balance(&self) -> Result<u64, ApiError> {
        let balance = self.fetch_balance().await?;
        if let Some(snapshot) = &mut *self.snapshot.write() {
            snapshot.balance_satoshis = balance;
        }
        Ok(balance)
    }

    /// Re-reads only the asset list of the published snapshot.
    ///
    /// Assets which are still present keep their loaded images.
    pub async fn refresh_assets(&self) -> Result<Vec<AssetRecord>, ApiError> {
        let mut assets = self.fetch_assets().await?;
        self.images.apply(&mut assets);

        let mut snapshot = self.snapshot.write();
        if let Some(snapshot) = &mut *snapshot {
            for asset in &mut assets {
                if asset.image.is_loaded() {
                    continue;
                }
                if let Some(previous) = snapshot.asset(&asset.origin_id) {
                    asset.image = previous.image.clone();
                }
            }
            snapshot.assets = assets.clone();
        }
        Ok(assets)
    }

    async fn fetch_balance(&self) -> Result<u64, ApiError> {
        let payload = self
            .transport
            .request(ApiRequest::get(endpoints::BALANCE))
            .await?;
        parse_balance(payload)
    }

    async fn fetch_address(&self) -> Result<String, ApiError> {
        let payload = self
            .transport
            .request(ApiRequest::get(endpoints::LEGACY_ADDRESS))
            .await?;
        parse_address(payload)
    }

    async fn fetch_assets(&self) -> Result<Vec<AssetRecord>, ApiError> {
        let payload = self
            .transport
            .request(ApiRequest::get(endpoints::NFTS_INFO))
            .await?;
        parse_assets(payload)
    }

    async fn fetch_image(&self, origin_id: &str) -> AssetImage {
        if let Some(data) = self.images.get(origin_id) {
            return AssetImage::Loaded(data);
        }

        let path = endpoints::nft_data(origin_id);
        let result = self
            .transport
            .request(ApiRequest::get(&path))
            .await
            .and_then(|payload| payload.into_bytes(&path));

        match result {
            Ok(data) if data.is_empty() => {
                log::warn!("Empty image for asset {}", origin_id);
                AssetImage::Unavailable {
                    reason: "Empty image".to_owned(),
                }
            }
            Ok(data) => {
                let data: Arc<[u8]> = data.into();
                self.images.insert(origin_id, data.clone());
                AssetImage::Loaded(data)
            }
            Err(e) => {
                log::warn!("Failed to load image for asset {}: {}", origin_id, e);
                AssetImage::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Bounded cache of loaded image bytes, keyed by asset origin
struct ImageCache {
    images: QuickCache<String, Arc<[u8]>>,
}

impl ImageCache {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            images: QuickCache::new(capacity.max(1)),
        }
    }

    fn get(&self, origin_id: &str) -> Option<Arc<[u8]>> {
        self.images.get(origin_id)
    }

    fn insert(&self, origin_id: &str, data: Arc<[u8]>) {
        self.images.insert(origin_id.to_owned(), data)
    }

    fn apply(&self, assets: &mut [AssetRecord]) {
        for asset in assets {
            if let Some(data) = self.get(&asset.origin_id) {
                asset.image = AssetImage::Loaded(data);
            }
        }
    }
}
