use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use yenwallet_utils::*;

use crate::core::parsing::parse_login_response;
use crate::core::token_store::TokenStore;
use crate::external::Storage;
use crate::models::{ApiError, Credentials, SessionState, TokenUpdate};
use crate::transport::endpoints;
use crate::transport::models::ApiRequest;
use crate::transport::Transport;

const STORAGE_USERNAME: &str = "__auth__username";

/// Login state of the wallet user.
///
/// The state is derived from the token store on every call, so an expired
/// session observed by any request is immediately reported as anonymous.
pub struct WalletSession {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    storage: Arc<dyn Storage>,
    username: RwLock<Option<String>>,
}

impl WalletSession {
    /// Restores the session persisted by a previous run
    pub async fn restore(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenStore>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        tokens.load().await;

        let username = match storage.get(STORAGE_USERNAME).await {
            Ok(username) => username,
            Err(e) => {
                log::warn!("Failed to read remembered username: {:?}", e);
                None
            }
        };

        Self {
            transport,
            tokens,
            storage,
            username: RwLock::new(username),
        }
    }

    pub fn state(&self) -> SessionState {
        if !self.tokens.current().is_authenticated() {
            return SessionState::Anonymous;
        }

        SessionState::Authenticated {
            username: self.username.read().clone().unwrap_or_default(),
        }
    }

    /// Exchanges credentials for a token pair.
    ///
    /// Credentials are dropped as soon as the request is built.
    pub async fn login(&self, credentials: Credentials) -> Result<SessionState, ApiError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            username: &'a str,
            password: &'a str,
        }

        let (username, request) = {
            let username = credentials
                .username
                .non_empty_trimmed()
                .ok_or(ApiError::InvalidInput("username is required"))?;
            let password = credentials
                .password
                .non_empty_trimmed()
                .ok_or(ApiError::InvalidInput("password is required"))?;

            let request =
                ApiRequest::post_json(endpoints::JWT_TOKEN, &LoginRequest { username, password })
                    .anonymous();
            (username.to_owned(), request)
        };
        drop(credentials);

        let payload = self.transport.request(request).await.map_err(|e| {
            log::warn!("Login failed: {}", e);
            e
        })?;
        let pair = parse_login_response(payload)?;

        if let Err(e) = self.tokens.save(TokenUpdate::from(pair)).await {
            log::warn!("Failed to persist tokens: {:?}", e);
        }
        if let Err(e) = self.storage.set(STORAGE_USERNAME, &username).await {
            log::warn!("Failed to remember username: {:?}", e);
        }
        *self.username.write() = Some(username.clone());

        log::info!("Logged in as {}", username);
        Ok(SessionState::Authenticated { username })
    }

    /// Forgets tokens and the remembered username
    pub async fn logout(&self) {
        if let Err(e) = self.tokens.clear().await {
            log::warn!("Failed to clear tokens: {:?}", e);
        }

        self.username.write().take();
        if let Err(e) = self.storage.remove(STORAGE_USERNAME).await {
            log::warn!("Failed to forget username: {:?}", e);
        }
    }
}
