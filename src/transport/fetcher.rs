use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{AbortRegistration, Abortable};
use serde::Serialize;

use super::endpoints;
use super::models::*;
use super::Transport;
use crate::core::parsing::{parse_error_message, parse_refresh_response};
use crate::core::token_store::TokenStore;
use crate::external::{HttpConnection, HttpRequest, HttpResponse};
use crate::models::ApiError;

const UNAUTHORIZED: u16 = 401;

/// Sends api requests on behalf of the current session.
///
/// Every logical request is sent at most twice: once with the stored access
/// token and, if the server answers `401`, once more after a single token
/// refresh. Refreshes are serialized so that concurrently expired requests
/// share one refresh call.
pub struct AuthenticatedFetcher {
    connection: Arc<dyn HttpConnection>,
    tokens: Arc<TokenStore>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AuthenticatedFetcher {
    pub fn new(connection: Arc<dyn HttpConnection>, tokens: Arc<TokenStore>) -> Self {
        Self {
            connection,
            tokens,
            refresh_lock: Default::default(),
        }
    }

    pub async fn request(&self, request: ApiRequest) -> Result<ApiPayload, ApiError> {
        if !request.is_credentials_managed() {
            let response = self.send(&request, None).await?;
            return classify(&request.path, response);
        }

        let access = self.tokens.current().access;
        let response = self.send(&request, access.as_deref()).await?;
        if response.status != UNAUTHORIZED {
            return classify(&request.path, response);
        }

        log::debug!("{} {} is unauthorized", request.method, request.path);
        let access = self.refresh_access(access.as_deref()).await?;

        // The retried response is final, even if it is `401` again
        let response = self.send(&request, Some(&access)).await?;
        classify(&request.path, response)
    }

    /// Same as [`request`](Self::request), but resolves with
    /// [`ApiError::Cancelled`] as soon as the paired `AbortHandle` is triggered
    pub async fn request_abortable(
        &self,
        request: ApiRequest,
        registration: AbortRegistration,
    ) -> Result<ApiPayload, ApiError> {
        Abortable::new(self.request(request), registration)
            .await
            .unwrap_or(Err(ApiError::Cancelled))
    }

    /// Returns an access token to retry with, refreshing it if no other
    /// request has done it since `rejected` was sent
    async fn refresh_access(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let generation = self.tokens.generation();
        let current = self.tokens.current();
        if let Some(access) = current.access.filter(|access| Some(access.as_str()) != rejected) {
            log::debug!("Access token was refreshed by a concurrent request");
            return Ok(access);
        }

        let refresh = match current.refresh {
            Some(refresh) => refresh,
            None => return Err(self.expire("no refresh token").await),
        };

        #[derive(Serialize)]
        struct RefreshRequest<'a> {
            refresh: &'a str,
        }

        let request =
            ApiRequest::post_json(endpoints::REFRESH, &RefreshRequest { refresh: &refresh })
                .anonymous();

        let update = match self
            .send(&request, None)
            .await
            .and_then(|response| classify(endpoints::REFRESH, response))
            .and_then(parse_refresh_response)
        {
            Ok(update) => update,
            Err(e) => return Err(self.expire(&e.to_string()).await),
        };

        let pair = match self.tokens.save_unless_cleared(generation, update).await {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                log::debug!("Tokens were cleared during refresh");
                return Err(ApiError::AuthExpired);
            }
            Err(e) => {
                // The new token is already in memory and usable for this session
                log::warn!("Failed to persist refreshed tokens: {:?}", e);
                self.tokens.current()
            }
        };

        match pair.access {
            Some(access) => {
                log::debug!("Access token refreshed");
                Ok(access)
            }
            None => Err(self.expire("refreshed token was lost").await),
        }
    }

    async fn expire(&self, reason: &str) -> ApiError {
        log::error!("Session expired: {}", reason);
        if let Err(e) = self.tokens.clear().await {
            log::warn!("Failed to clear tokens: {:?}", e);
        }
        ApiError::AuthExpired
    }

    async fn send(
        &self,
        request: &ApiRequest,
        access: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let http_request = build_http_request(request, access);
        self.connection.send(http_request).await.map_err(|e| {
            log::warn!("{} {} failed: {:#}", request.method, request.path, e);
            ApiError::Transport(format!("{:#}", e))
        })
    }
}

#[async_trait]
impl Transport for AuthenticatedFetcher {
    async fn request(&self, request: ApiRequest) -> Result<ApiPayload, ApiError> {
        AuthenticatedFetcher::request(self, request).await
    }
}

fn build_http_request(request: &ApiRequest, access: Option<&str>) -> HttpRequest {
    let mut headers = request.headers.clone();

    if let Some(access) = access {
        headers.push((AUTHORIZATION.to_owned(), format!("Bearer {}", access)));
    }

    if matches!(request.body, HttpBody::Json(_)) && !request.has_header(CONTENT_TYPE) {
        headers.push((CONTENT_TYPE.to_owned(), APPLICATION_JSON.to_owned()));
    }

    HttpRequest {
        method: request.method,
        path: request.path.clone(),
        headers,
        body: request.body.clone(),
    }
}

fn classify(path: &str, response: HttpResponse) -> Result<ApiPayload, ApiError> {
    if !response.is_success() {
        let message = parse_error_message(response.status, &response.body);
        log::warn!("{} responded with {}: {}", path, response.status, message);
        return Err(ApiError::Http {
            status: response.status,
            message,
        });
    }

    if !is_json(response.content_type()) {
        return Ok(ApiPayload::Bytes(response.body));
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ApiPayload::Json(serde_json::Value::Null));
    }

    serde_json::from_slice(&response.body)
        .map(ApiPayload::Json)
        .map_err(|e| ApiError::schema(path, e))
}

fn is_json(content_type: Option<&str>) -> bool {
    let mime = match content_type {
        Some(content_type) => content_type.split(';').next().unwrap_or_default().trim(),
        None => return false,
    };
    mime.eq_ignore_ascii_case(APPLICATION_JSON)
        || mime.to_ascii_lowercase().ends_with("+json")
}

#[cfg(test)]
mod tests {
    use futures_util::future::AbortHandle;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::external::HttpMethod;
    use crate::models::{TokenPair, TokenUpdate};
    use crate::tests_utils::*;

    async fn make_fetcher(
        connection: Arc<dyn HttpConnection>,
        tokens: Option<TokenPair>,
    ) -> (AuthenticatedFetcher, Arc<TokenStore>) {
        let store = Arc::new(TokenStore::new(Arc::new(TestStorage::default())));
        store.load().await;
        if let Some(tokens) = tokens {
            store.save(TokenUpdate::from(tokens)).await.unwrap();
        }
        (AuthenticatedFetcher::new(connection, store.clone()), store)
    }

    fn balance_handler(
        valid_token: &'static str,
    ) -> impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static {
        move |request: &HttpRequest| match request.path.as_str() {
            endpoints::REFRESH => Reply::Json(200, json!({ "access": valid_token })),
            _ if bearer(request) == Some(valid_token) => Reply::Json(200, json!({ "balance": 1 })),
            _ => Reply::Json(401, json!({ "detail": "Token is invalid or expired" })),
        }
    }

    #[tokio::test]
    async fn attaches_bearer_token() {
        let connection = ScriptedConnection::new(|_| Reply::Json(200, json!({ "balance": 5 })));
        let (fetcher, _) = make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let payload = fetcher.request(ApiRequest::get(endpoints::BALANCE)).await.unwrap();
        assert_eq!(payload, ApiPayload::Json(json!({ "balance": 5 })));

        let requests = connection.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].header("Authorization"), Some("Bearer A1"));
        assert!(requests[0].header("Content-Type").is_none());
    }

    #[tokio::test]
    async fn explicit_authorization_is_kept() {
        let connection = ScriptedConnection::new(|_| Reply::Json(401, json!({})));
        let (fetcher, store) =
            make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let result = fetcher
            .request(ApiRequest::get(endpoints::BALANCE).with_header("Authorization", "Token xyz"))
            .await;
        assert_eq!(result.unwrap_err().status(), Some(401));

        let requests = connection.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("authorization"), Some("Token xyz"));
        assert_eq!(connection.count(endpoints::REFRESH), 0);
        assert_eq!(store.current(), TokenPair::new("A1", "R1"));
    }

    #[tokio::test]
    async fn content_type_depends_on_body() {
        let connection = ScriptedConnection::new(|_| Reply::Json(200, json!({})));
        let (fetcher, _) = make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        fetcher
            .request(ApiRequest::post_json(endpoints::BSV_PAYMAIL_SEND, &json!({ "a": 1 })))
            .await
            .unwrap();
        fetcher
            .request(ApiRequest::post_multipart(
                endpoints::NFT_CREATE,
                vec![MultipartPart::text("name", "X")],
            ))
            .await
            .unwrap();

        let requests = connection.requests();
        assert_eq!(requests[0].header("content-type"), Some(APPLICATION_JSON));
        assert!(requests[1].header("content-type").is_none());
        assert_eq!(requests[1].header("authorization"), Some("Bearer A1"));
    }

    #[tokio::test]
    async fn refreshes_once_and_retries_once() {
        let connection = ScriptedConnection::new(balance_handler("A2"));
        let (fetcher, store) =
            make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let payload = fetcher.request(ApiRequest::get(endpoints::BALANCE)).await.unwrap();
        assert_eq!(payload, ApiPayload::Json(json!({ "balance": 1 })));

        let requests = connection.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].header("authorization"), Some("Bearer A1"));
        assert_eq!(requests[1].path, endpoints::REFRESH);
        assert!(requests[1].header("authorization").is_none());
        assert_eq!(
            requests[1].body,
            HttpBody::Json(r#"{"refresh":"R1"}"#.to_owned())
        );
        assert_eq!(requests[2].header("authorization"), Some("Bearer A2"));

        assert_eq!(store.current(), TokenPair::new("A2", "R1"));
    }

    #[tokio::test]
    async fn failed_retry_is_final() {
        let connection = ScriptedConnection::new(|request| match request.path.as_str() {
            endpoints::REFRESH => Reply::Json(200, json!({ "access": "A2" })),
            _ if bearer(request) == Some("A2") => {
                Reply::Json(500, json!({ "error": "Wallet backend unavailable" }))
            }
            _ => Reply::Json(401, json!({})),
        });
        let (fetcher, store) =
            make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let error = fetcher
            .request(ApiRequest::get(endpoints::BALANCE))
            .await
            .unwrap_err();
        assert_eq!(
            error,
            ApiError::Http {
                status: 500,
                message: "Wallet backend unavailable".to_owned()
            }
        );
        assert_eq!(connection.count(endpoints::REFRESH), 1);
        assert_eq!(connection.count(endpoints::BALANCE), 2);
        assert!(store.current().is_authenticated());
    }

    #[tokio::test]
    async fn second_unauthorized_does_not_refresh_again() {
        let connection = ScriptedConnection::new(|request| match request.path.as_str() {
            endpoints::REFRESH => Reply::Json(200, json!({ "access": "A2" })),
            _ => Reply::Json(401, json!({ "detail": "Not allowed" })),
        });
        let (fetcher, _) = make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let error = fetcher
            .request(ApiRequest::post_json(endpoints::NFT_PAYMAIL_SEND, &json!({})))
            .await
            .unwrap_err();
        assert_eq!(error.status(), Some(401));
        assert_eq!(connection.count(endpoints::REFRESH), 1);
        assert_eq!(connection.count(endpoints::NFT_PAYMAIL_SEND), 2);
    }

    #[tokio::test]
    async fn failed_refresh_expires_session() {
        let connection = ScriptedConnection::new(|request| match request.path.as_str() {
            endpoints::REFRESH => Reply::Json(401, json!({ "detail": "Token is blacklisted" })),
            _ => Reply::Json(401, json!({})),
        });
        let (fetcher, store) =
            make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let error = fetcher
            .request(ApiRequest::get(endpoints::BALANCE))
            .await
            .unwrap_err();
        assert_eq!(error, ApiError::AuthExpired);
        assert!(store.current().is_empty());
        assert!(store.load().await.is_empty());
        assert_eq!(connection.count(endpoints::BALANCE), 1);
    }

    #[tokio::test]
    async fn unreachable_refresh_expires_session() {
        let connection = ScriptedConnection::new(|request| match request.path.as_str() {
            endpoints::REFRESH => Reply::Unreachable,
            _ => Reply::Json(401, json!({})),
        });
        let (fetcher, store) = make_fetcher(connection, Some(TokenPair::new("A1", "R1"))).await;

        let error = fetcher
            .request(ApiRequest::get(endpoints::BALANCE))
            .await
            .unwrap_err();
        assert_eq!(error, ApiError::AuthExpired);
        assert!(store.current().is_empty());
    }

    #[tokio::test]
    async fn missing_refresh_token_expires_session() {
        let connection = ScriptedConnection::new(|_| Reply::Json(401, json!({})));
        let (fetcher, store) = make_fetcher(connection.clone(), None).await;
        store.save(TokenUpdate::access("A1")).await.unwrap();

        let error = fetcher
            .request(ApiRequest::get(endpoints::BALANCE))
            .await
            .unwrap_err();
        assert_eq!(error, ApiError::AuthExpired);
        assert_eq!(connection.count(endpoints::REFRESH), 0);
        assert!(store.current().is_empty());
    }

    #[tokio::test]
    async fn anonymous_unauthorized_is_http_error() {
        let connection = ScriptedConnection::new(|_| {
            Reply::Json(
                401,
                json!({ "detail": "No active account found with the given credentials" }),
            )
        });
        let (fetcher, store) =
            make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let error = fetcher
            .request(ApiRequest::post_json(endpoints::JWT_TOKEN, &json!({})).anonymous())
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "No active account found with the given credentials"
        );
        assert!(connection.requests()[0].header("authorization").is_none());
        assert_eq!(connection.count(endpoints::REFRESH), 0);
        assert!(store.current().is_authenticated());
    }

    #[tokio::test]
    async fn concurrent_unauthorized_share_one_refresh() {
        let connection = ScriptedConnection::new(balance_handler("A2"));
        let (fetcher, store) =
            make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let (first, second, third) = futures_util::join!(
            fetcher.request(ApiRequest::get(endpoints::BALANCE)),
            fetcher.request(ApiRequest::get(endpoints::BALANCE)),
            fetcher.request(ApiRequest::get(endpoints::BALANCE)),
        );
        assert!(first.is_ok() && second.is_ok() && third.is_ok());

        assert_eq!(connection.count(endpoints::REFRESH), 1);
        assert_eq!(connection.count(endpoints::BALANCE), 6);
        assert_eq!(store.current(), TokenPair::new("A2", "R1"));
    }

    #[tokio::test]
    async fn concurrent_unauthorized_after_failed_refresh() {
        let connection = ScriptedConnection::new(|request| match request.path.as_str() {
            endpoints::REFRESH => Reply::Json(400, json!({})),
            _ => Reply::Json(401, json!({})),
        });
        let (fetcher, _) = make_fetcher(connection.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let (first, second) = futures_util::join!(
            fetcher.request(ApiRequest::get(endpoints::BALANCE)),
            fetcher.request(ApiRequest::get(endpoints::LEGACY_ADDRESS)),
        );
        assert_eq!(first.unwrap_err(), ApiError::AuthExpired);
        assert_eq!(second.unwrap_err(), ApiError::AuthExpired);
        assert_eq!(connection.count(endpoints::REFRESH), 1);
    }

    #[tokio::test]
    async fn error_messages_are_classified() {
        let connection = ScriptedConnection::new(|request| match request.path.as_str() {
            endpoints::BALANCE => Reply::Json(400, json!({ "detail": "Bad request" })),
            endpoints::LEGACY_ADDRESS => Reply::Bytes(503, b"<html></html>".to_vec()),
            _ => Reply::Unreachable,
        });
        let (fetcher, _) = make_fetcher(connection, Some(TokenPair::new("A1", "R1"))).await;

        assert_eq!(
            fetcher.request(ApiRequest::get(endpoints::BALANCE)).await,
            Err(ApiError::Http {
                status: 400,
                message: "Bad request".to_owned()
            })
        );
        assert_eq!(
            fetcher.request(ApiRequest::get(endpoints::LEGACY_ADDRESS)).await,
            Err(ApiError::Http {
                status: 503,
                message: "HTTP error! status: 503".to_owned()
            })
        );
        assert!(matches!(
            fetcher.request(ApiRequest::get(endpoints::NFTS_INFO)).await,
            Err(ApiError::Transport(_))
        ));
    }

    /// Holds refresh calls until released
    struct HeldRefresh {
        inner: Arc<ScriptedConnection>,
        refresh_started: Notify,
        release_refresh: Notify,
    }

    #[async_trait]
    impl HttpConnection for HeldRefresh {
        async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
            if request.path == endpoints::REFRESH {
                self.refresh_started.notify_one();
                self.release_refresh.notified().await;
            }
            self.inner.send(request).await
        }
    }

    #[tokio::test]
    async fn clear_during_refresh_is_not_undone() {
        let connection = ScriptedConnection::new(balance_handler("A2"));
        let held = Arc::new(HeldRefresh {
            inner: connection.clone(),
            refresh_started: Notify::new(),
            release_refresh: Notify::new(),
        });
        let (fetcher, store) = make_fetcher(held.clone(), Some(TokenPair::new("A1", "R1"))).await;

        let (result, _) = tokio::join!(
            fetcher.request(ApiRequest::post_json(endpoints::NFT_PAYMAIL_SEND, &json!({}))),
            async {
                held.refresh_started.notified().await;
                store.clear().await.unwrap();
                held.release_refresh.notify_one();
            }
        );

        assert_eq!(result, Err(ApiError::AuthExpired));
        assert!(store.current().is_empty());
        assert!(store.load().await.is_empty());
        assert_eq!(connection.count(endpoints::REFRESH), 1);
        assert_eq!(connection.count(endpoints::NFT_PAYMAIL_SEND), 1);
    }

    #[tokio::test]
    async fn binary_bodies_are_returned_raw() {
        let connection = ScriptedConnection::new(|_| Reply::Bytes(200, b"\x89PNG".to_vec()));
        let (fetcher, _) = make_fetcher(connection, Some(TokenPair::new("A1", "R1"))).await;

        let payload = fetcher
            .request(ApiRequest::get(endpoints::nft_data("o1")))
            .await
            .unwrap();
        assert_eq!(payload, ApiPayload::Bytes(b"\x89PNG".to_vec()));
    }

    #[tokio::test]
    async fn aborted_request_is_cancelled() {
        let connection = ScriptedConnection::new(|_| Reply::Json(200, json!({})));
        let (fetcher, _) = make_fetcher(connection, Some(TokenPair::new("A1", "R1"))).await;

        let (handle, registration) = AbortHandle::new_pair();
        handle.abort();

        let result = fetcher
            .request_abortable(ApiRequest::get(endpoints::BALANCE), registration)
            .await;
        assert_eq!(result, Err(ApiError::Cancelled));
    }

    #[test]
    fn json_content_types() {
        assert!(is_json(Some("application/json")));
        assert!(is_json(Some("Application/JSON; charset=utf-8")));
        assert!(is_json(Some("application/problem+json")));
        assert!(!is_json(Some("image/png")));
        assert!(!is_json(Some("text/html")));
        assert!(!is_json(None));
    }
}
