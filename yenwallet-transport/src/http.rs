use std::convert::TryInto;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use yenwallet::external::{
    HttpBody, HttpConnection, HttpMethod, HttpRequest, HttpResponse, MultipartPart,
    MultipartValue,
};
use yenwallet_utils::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base url of the wallet service, e.g. `https://wallet.yenpoint.jp`.
    /// Hosts without a scheme use `https`
    pub endpoint: String,
    /// Timeout of a single request, including reading the body. Default: `30000`
    #[serde(with = "serde_duration_ms")]
    pub request_timeout: Duration,
    /// Overrides the default `yenwallet/<version>` user agent
    pub user_agent: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(settings: ClientSettings) -> Result<Arc<Self>> {
        if settings.endpoint.trim().is_empty() {
            return Err(HttpClientError::NoEndpointSpecified.into());
        }

        let base_url = expand_address(&settings.endpoint);
        let _: Url = base_url
            .as_str()
            .try_into()
            .with_context(|| format!("failed to parse endpoint: {}", settings.endpoint))?;

        let user_agent = settings
            .user_agent
            .unwrap_or_else(|| format!("yenwallet/{}", env!("CARGO_PKG_VERSION")));

        let client = reqwest::ClientBuilder::new()
            .timeout(settings.request_timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build http client")?;

        Ok(Arc::new(Self { client, base_url }))
    }

    fn url(&self, path: &str) -> Result<Url> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        url.as_str()
            .try_into()
            .with_context(|| format!("invalid request url: {}", url))
    }
}

#[async_trait::async_trait]
impl HttpConnection for HttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, self.url(&request.path)?);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            HttpBody::Empty => builder,
            HttpBody::Json(data) => builder.body(data),
            HttpBody::Multipart(parts) => builder.multipart(make_form(parts)?),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        log::debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.path,
            status,
            body.len()
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn make_form(parts: Vec<MultipartPart>) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match part.value {
            MultipartValue::Text(text) => form.text(part.name, text),
            MultipartValue::File {
                file_name,
                content_type,
                data,
            } => {
                let mut file = Part::bytes(data).file_name(file_name);
                if let Some(content_type) = content_type {
                    file = file
                        .mime_str(&content_type)
                        .with_context(|| format!("invalid content type: {}", content_type))?;
                }
                form.part(part.name, file)
            }
        };
    }
    Ok(form)
}

fn expand_address(base_url: &str) -> String {
    match base_url.trim().trim_end_matches('/') {
        url if url.starts_with("http://") || url.starts_with("https://") => url.to_owned(),
        url if is_local(url) => format!("http://{}", url),
        url => format!("https://{}", url),
    }
}

fn is_local(host: &str) -> bool {
    let host = host.split(':').next().unwrap_or_default();
    matches!(host, "localhost" | "127.0.0.1")
}

#[derive(thiserror::Error, Debug)]
enum HttpClientError {
    #[error("no endpoint specified")]
    NoEndpointSpecified,
}
