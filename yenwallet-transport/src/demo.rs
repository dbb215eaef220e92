use anyhow::Result;
use serde_json::{json, Value};
use yenwallet::external::{HttpConnection, HttpMethod, HttpRequest, HttpResponse};
use yenwallet::transport::endpoints;

const DEMO_ACCESS: &str = "demo-access";
const DEMO_REFRESH: &str = "demo-refresh";

const DEMO_ASSETS: [(&str, &str); 3] = [
    ("Demo NFT 1", "mock_origin_1"),
    ("Cool Cat", "mock_origin_2"),
    ("My Artwork", "mock_origin_3"),
];

/// Offline stand-in for the wallet service.
///
/// Accepts any credentials, serves a fixed wallet and refuses every
/// mutation with `403`.
#[derive(Default)]
pub struct DemoConnection;

#[async_trait::async_trait]
impl HttpConnection for DemoConnection {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        log::debug!("Demo call: {} {}", request.method, request.path);

        let path = request.path.as_str();
        Ok(match (request.method, path) {
            (HttpMethod::Post, endpoints::JWT_TOKEN) => {
                json_response(200, json!({ "access": DEMO_ACCESS, "refresh": DEMO_REFRESH }))
            }
            (HttpMethod::Post, endpoints::REFRESH) => {
                json_response(200, json!({ "access": DEMO_ACCESS }))
            }
            (HttpMethod::Get, endpoints::BALANCE) => {
                json_response(200, json!({ "balance": 1234567 }))
            }
            (HttpMethod::Get, endpoints::LEGACY_ADDRESS) => {
                json_response(200, json!({ "Address": "1MockAddressForDemoPurposeOnly" }))
            }
            (HttpMethod::Get, endpoints::NFTS_INFO) => json_response(
                200,
                DEMO_ASSETS
                    .iter()
                    .map(|(name, origin)| json!({ "name": name, "nft_origin": origin }))
                    .collect(),
            ),
            (HttpMethod::Get, path) => match path
                .strip_prefix(endpoints::NFT_DATA_PREFIX)
                .and_then(|origin| DEMO_ASSETS.iter().find(|(_, item)| *item == origin))
            {
                Some((name, _)) => HttpResponse {
                    status: 200,
                    headers: vec![("Content-Type".to_owned(), "image/svg+xml".to_owned())],
                    body: placeholder_image(name).into_bytes(),
                },
                None => json_response(404, json!({ "detail": "Not found." })),
            },
            (HttpMethod::Post, _) => json_response(
                403,
                json!({ "detail": "Functionality disabled in demo mode." }),
            ),
        })
    }
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
        body: body.to_string().into_bytes(),
    }
}

fn placeholder_image(name: &str) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="150" height="150"><rect width="150" height="150" fill="#cccccc"/><text x="75" y="80" font-size="14" text-anchor="middle">{}</text></svg>"##,
        name
    )
}
