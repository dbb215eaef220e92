//! Normalization of wallet service responses.
//!
//! The service has changed field names and shapes between releases. Every
//! known variant is mapped onto a single internal representation, anything
//! else is rejected with [`ApiError::Schema`].

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{ApiError, AssetRecord, TokenPair, TokenUpdate};
use crate::transport::endpoints;
use crate::transport::models::ApiPayload;

pub fn parse_login_response(payload: ApiPayload) -> Result<TokenPair, ApiError> {
    #[derive(Deserialize)]
    struct LoginResponse {
        access: String,
        refresh: String,
    }

    let response: LoginResponse = decode_object(endpoints::JWT_TOKEN, payload)?;
    let pair = TokenPair::new(response.access, response.refresh).normalized();
    match (&pair.access, &pair.refresh) {
        (Some(_), Some(_)) => Ok(pair),
        _ => Err(ApiError::schema(endpoints::JWT_TOKEN, "empty token")),
    }
}

/// Refresh returns a new access token and, with rotation enabled, a new refresh token
pub fn parse_refresh_response(payload: ApiPayload) -> Result<TokenUpdate, ApiError> {
    #[derive(Deserialize)]
    struct RefreshResponse {
        access: String,
        #[serde(default)]
        refresh: Option<String>,
    }

    let response: RefreshResponse = decode_object(endpoints::REFRESH, payload)?;
    if response.access.is_empty() {
        return Err(ApiError::schema(endpoints::REFRESH, "empty access token"));
    }

    Ok(TokenUpdate {
        access: Some(response.access),
        refresh: response.refresh,
    })
}

pub fn parse_balance(payload: ApiPayload) -> Result<u64, ApiError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BalanceResponse {
        V1 { balance: u64 },
        V2 { total_balance: u64 },
    }

    Ok(match decode_object(endpoints::BALANCE, payload)? {
        BalanceResponse::V1 { balance } => balance,
        BalanceResponse::V2 { total_balance } => total_balance,
    })
}

pub fn parse_address(payload: ApiPayload) -> Result<String, ApiError> {
    #[derive(Deserialize)]
    struct AddressResponse {
        #[serde(rename = "Address")]
        address: AddressField,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AddressField {
        Single(String),
        List(Vec<String>),
    }

    let response: AddressResponse = decode_object(endpoints::LEGACY_ADDRESS, payload)?;
    let address = match response.address {
        AddressField::Single(address) => address,
        AddressField::List(mut list) if list.len() == 1 => list.remove(0),
        AddressField::List(list) => {
            return Err(ApiError::schema(
                endpoints::LEGACY_ADDRESS,
                format!("expected exactly one address, got {}", list.len()),
            ))
        }
    };

    if address.trim().is_empty() {
        return Err(ApiError::schema(endpoints::LEGACY_ADDRESS, "empty address"));
    }
    Ok(address)
}

pub fn parse_assets(payload: ApiPayload) -> Result<Vec<AssetRecord>, ApiError> {
    #[derive(Deserialize)]
    struct AssetInfo {
        name: String,
        nft_origin: String,
    }

    let assets: Vec<AssetInfo> = decode(endpoints::NFTS_INFO, payload)?;

    let mut seen = HashSet::with_capacity(assets.len());
    assets
        .into_iter()
        .map(|asset| {
            if !is_valid_origin(&asset.nft_origin) {
                return Err(ApiError::schema(
                    endpoints::NFTS_INFO,
                    format!("invalid asset origin {:?}", asset.nft_origin),
                ));
            }
            if !seen.insert(asset.nft_origin.clone()) {
                return Err(ApiError::schema(
                    endpoints::NFTS_INFO,
                    format!("duplicate asset origin {}", asset.nft_origin),
                ));
            }
            Ok(AssetRecord::new(asset.nft_origin, asset.name))
        })
        .collect()
}

/// Extracts a human readable message from an error response body.
///
/// `detail` has priority over `error`. Falls back to a generic message
/// with the status code.
pub fn parse_error_message(status: u16, body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        detail: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    }

    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| {
            body.detail
                .and_then(message_text)
                .or_else(|| body.error.and_then(message_text))
        })
        .unwrap_or_else(|| format!("HTTP error! status: {}", status))
}

fn message_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Origins are embedded into a url path segment
fn is_valid_origin(origin: &str) -> bool {
    !origin.is_empty()
        && origin
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn decode<T>(endpoint: &str, payload: ApiPayload) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let value = payload.into_json(endpoint)?;
    serde_json::from_value(value).map_err(|e| ApiError::schema(endpoint, e))
}

/// Same as [`decode`] but rejects non-object documents, which serde
/// would otherwise accept for structs in sequence form
fn decode_object<T>(endpoint: &str, payload: ApiPayload) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    match payload.into_json(endpoint)? {
        value @ Value::Object(_) => decode(endpoint, ApiPayload::Json(value)),
        _ => Err(ApiError::schema(endpoint, "expected a JSON object")),
    }
}
