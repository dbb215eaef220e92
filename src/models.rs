use std::sync::Arc;

use serde::{Deserialize, Serialize};

use yenwallet_utils::*;

/// Persisted bearer credentials.
///
/// Stored as a single JSON record `{"access": .., "refresh": ..}`. Absent
/// fields are omitted from the record.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl TokenPair {
    pub fn new<A, R>(access: A, refresh: R) -> Self
    where
        A: Into<String>,
        R: Into<String>,
    {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }

    /// Whether requests can be authenticated with this pair
    pub fn is_authenticated(&self) -> bool {
        self.access.is_some()
    }

    /// Applies a partial update. Fields missing in the update keep their values
    pub fn merge(&mut self, update: TokenUpdate) {
        if let Some(access) = non_empty(update.access) {
            self.access = Some(access);
        }
        if let Some(refresh) = non_empty(update.refresh) {
            self.refresh = Some(refresh);
        }
    }

    /// Drops empty strings which some storages produce instead of `null`
    pub(crate) fn normalized(self) -> Self {
        Self {
            access: non_empty(self.access),
            refresh: non_empty(self.refresh),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &self.access.as_ref().map(|_| "***"))
            .field("refresh", &self.refresh.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Partial token pair update
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl TokenUpdate {
    pub fn access<A: Into<String>>(access: A) -> Self {
        Self {
            access: Some(access.into()),
            refresh: None,
        }
    }
}

impl std::fmt::Debug for TokenUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenUpdate")
            .field("access", &self.access.as_ref().map(|_| "***"))
            .field("refresh", &self.refresh.as_ref().map(|_| "***"))
            .finish()
    }
}

impl From<TokenPair> for TokenUpdate {
    fn from(pair: TokenPair) -> Self {
        Self {
            access: pair.access,
            refresh: pair.refresh,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// Login form input. Never persisted
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U, P>(username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated { username: String },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSnapshot {
    pub balance_satoshis: u64,
    pub address: String,
    pub assets: Vec<AssetRecord>,
}

impl WalletSnapshot {
    pub fn asset(&self, origin_id: &str) -> Option<&AssetRecord> {
        self.assets.iter().find(|asset| asset.origin_id == origin_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub origin_id: String,
    pub display_name: String,
    pub image: AssetImage,
}

impl AssetRecord {
    pub fn new<O, N>(origin_id: O, display_name: N) -> Self
    where
        O: Into<String>,
        N: Into<String>,
    {
        Self {
            origin_id: origin_id.into(),
            display_name: display_name.into(),
            image: AssetImage::Unloaded,
        }
    }

    /// Image could not be fetched. The record itself stays usable
    pub fn is_degraded(&self) -> bool {
        matches!(self.image, AssetImage::Unavailable { .. })
    }

    /// Renders loaded image as a `data:` url
    pub fn image_data_url(&self) -> Option<String> {
        match &self.image {
            AssetImage::Loaded(data) => Some(encode_data_url(sniff_image_mime(data), data)),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum AssetImage {
    Unloaded,
    Loaded(Arc<[u8]>),
    Unavailable { reason: String },
}

impl AssetImage {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

impl std::fmt::Debug for AssetImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => f.write_str("Unloaded"),
            Self::Loaded(data) => write!(f, "Loaded({} bytes)", data.len()),
            Self::Unavailable { reason } => write!(f, "Unavailable({})", reason),
        }
    }
}

/// File attached to an asset creation request
#[derive(Clone)]
pub struct AssetFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl AssetFile {
    pub fn new<F: Into<String>>(file_name: F, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data,
        }
    }

    pub fn with_content_type<C: Into<String>>(mut self, content_type: C) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl std::fmt::Debug for AssetFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Value of the `app` field sent with asset creation requests
    pub app_name: String,
    /// Maximum number of asset images fetched at the same time. Default: `4`
    pub image_concurrency: usize,
    /// Number of decoded images kept in memory. Default: `64`
    pub image_cache_capacity: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            app_name: "yenwallet".to_owned(),
            image_concurrency: 4,
            image_cache_capacity: 64,
        }
    }
}

/// Classified failure of a top-level wallet operation.
///
/// `Display` produces the message shown to the user.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never reached the server
    #[error("Network error: {0}")]
    Transport(String),
    /// Server answered with a non-2xx status
    #[error("{message}")]
    Http { status: u16, message: String },
    /// Server rejected credentials and they could not be refreshed
    #[error("Session expired, please log in again")]
    AuthExpired,
    /// Response shape is not one of the known variants
    #[error("Unrecognized response from {endpoint}: {reason}")]
    Schema { endpoint: String, reason: String },
    /// Request was rejected locally before being sent
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    pub(crate) fn schema<E, R>(endpoint: E, reason: R) -> Self
    where
        E: Into<String>,
        R: std::fmt::Display,
    {
        Self::Schema {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
