use serde::Serialize;
use serde_json::Value;

use yenwallet_utils::*;

pub use crate::external::{HttpBody, HttpMethod, MultipartPart};
use crate::models::ApiError;

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const APPLICATION_JSON: &str = "application/json";

/// How the fetcher treats credentials of the request
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AuthMode {
    /// Attach the stored access token and recover from its expiration
    Bearer,
    /// Send as is. Used by the login and refresh calls
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: HttpBody,
    pub auth: AuthMode,
}

impl ApiRequest {
    pub fn get<P: Into<String>>(path: P) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            headers: Vec::new(),
            body: HttpBody::Empty,
            auth: AuthMode::Bearer,
        }
    }

    pub fn post_json<P, T>(path: P, body: &T) -> Self
    where
        P: Into<String>,
        T: Serialize,
    {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            headers: Vec::new(),
            body: HttpBody::Json(serde_json::to_string(body).trust_me()),
            auth: AuthMode::Bearer,
        }
    }

    pub fn post_multipart<P: Into<String>>(path: P, parts: Vec<MultipartPart>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            headers: Vec::new(),
            body: HttpBody::Multipart(parts),
            auth: AuthMode::Bearer,
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.auth = AuthMode::Anonymous;
        self
    }

    pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Whether the fetcher injects the bearer token and handles its expiration
    pub fn is_credentials_managed(&self) -> bool {
        self.auth == AuthMode::Bearer && !self.has_header(AUTHORIZATION)
    }
}

/// Successful response body
#[derive(Debug, Clone, PartialEq)]
pub enum ApiPayload {
    Json(Value),
    Bytes(Vec<u8>),
}

impl ApiPayload {
    pub fn into_json(self, endpoint: &str) -> Result<Value, ApiError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Bytes(_) => Err(ApiError::schema(endpoint, "expected a JSON body")),
        }
    }

    pub fn into_bytes(self, endpoint: &str) -> Result<Vec<u8>, ApiError> {
        match self {
            Self::Bytes(data) => Ok(data),
            Self::Json(_) => Err(ApiError::schema(endpoint, "expected a binary body")),
        }
    }
}
