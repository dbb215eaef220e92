use async_trait::async_trait;

pub use self::fetcher::AuthenticatedFetcher;
use self::models::*;
use crate::models::ApiError;

pub mod endpoints;
pub mod fetcher;
pub mod models;

/// Authenticated access to the wallet service api
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<ApiPayload, ApiError>;
}
