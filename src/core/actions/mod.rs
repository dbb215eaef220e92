use std::sync::Arc;

use serde::Serialize;

use yenwallet_utils::*;

use crate::core::wallet_data::WalletDataAggregator;
use crate::models::{ApiError, AssetFile};
use crate::transport::endpoints;
use crate::transport::models::{ApiPayload, ApiRequest, MultipartPart};
use crate::transport::Transport;

/// Mutating wallet commands.
///
/// Every successful command re-reads the part of the published snapshot
/// it could have changed.
pub struct ActionDispatcher {
    transport: Arc<dyn Transport>,
    wallet_data: Arc<WalletDataAggregator>,
    app_name: String,
}

impl ActionDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        wallet_data: Arc<WalletDataAggregator>,
        app_name: String,
    ) -> Self {
        Self {
            transport,
            wallet_data,
            app_name,
        }
    }

    /// Sends satoshis to a paymail address
    pub async fn send_funds(
        &self,
        recipient: &str,
        amount_satoshis: u64,
    ) -> Result<ApiPayload, ApiError> {
        #[derive(Serialize)]
        struct SendFunds<'a> {
            recipient_paymail: &'a str,
            #[serde(with = "serde_u64")]
            amount_satoshis: u64,
        }

        let recipient_paymail = validate_recipient(recipient)?;
        if amount_satoshis == 0 {
            return Err(ApiError::InvalidInput("amount must be positive"));
        }

        let ack = self
            .transport
            .request(ApiRequest::post_json(
                endpoints::BSV_PAYMAIL_SEND,
                &SendFunds {
                    recipient_paymail,
                    amount_satoshis,
                },
            ))
            .await?;

        if let Err(e) = self.wallet_data.refresh_balance().await {
            log::warn!("Failed to refresh balance after transfer: {}", e);
        }
        Ok(ack)
    }

    /// Transfers an owned asset to a paymail address
    pub async fn send_asset(
        &self,
        recipient: &str,
        origin_id: &str,
    ) -> Result<ApiPayload, ApiError> {
        #[derive(Serialize)]
        struct SendAsset<'a> {
            recipient_paymail: &'a str,
            nft_origin: &'a str,
        }

        let recipient_paymail = validate_recipient(recipient)?;
        let nft_origin = origin_id
            .non_empty_trimmed()
            .ok_or(ApiError::InvalidInput("asset origin is required"))?;

        let ack = self
            .transport
            .request(ApiRequest::post_json(
                endpoints::NFT_PAYMAIL_SEND,
                &SendAsset {
                    recipient_paymail,
                    nft_origin,
                },
            ))
            .await?;

        self.invalidate_assets().await;
        Ok(ack)
    }

    /// Uploads a file and mints a new asset from it
    pub async fn create_asset(&self, name: &str, file: AssetFile) -> Result<ApiPayload, ApiError> {
        let name = name
            .non_empty_trimmed()
            .ok_or(ApiError::InvalidInput("asset name is required"))?;
        if file.data.is_empty() {
            return Err(ApiError::InvalidInput("file is empty"));
        }

        let parts = vec![
            MultipartPart::text("name", name),
            MultipartPart::file("file", file.file_name, file.content_type, file.data),
            MultipartPart::text("app", self.app_name.as_str()),
        ];

        let ack = self
            .transport
            .request(ApiRequest::post_multipart(endpoints::NFT_CREATE, parts))
            .await?;

        self.invalidate_assets().await;
        Ok(ack)
    }

    async fn invalidate_assets(&self) {
        if let Err(e) = self.wallet_data.refresh_assets().await {
            log::warn!("Failed to refresh assets after update: {}", e);
        }
    }
}

fn validate_recipient(recipient: &str) -> Result<&str, ApiError> {
    recipient
        .non_empty_trimmed()
        .ok_or(ApiError::InvalidInput("recipient paymail is required"))
}
