use pinsync_core::PinningService;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.pinata.cloud";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),

    #[error("pinata api url '{0}' is not a valid base url")]
    InvalidApiUrl(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    HttpInvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct PinataConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub jwt: String,
    /// Multiaddrs Pinata should try first when fetching content.
    #[serde(default)]
    pub host_nodes: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_owned()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl PinataConfig {
    pub fn new(jwt: impl Into<String>) -> Self {
        Self {
            api_url: default_api_url(),
            jwt: jwt.into(),
            host_nodes: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PinByHashReq<'a> {
    hash_to_pin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pinata_options: Option<PinataOptions<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PinataOptions<'a> {
    host_nodes: &'a [String],
}

/// `PinningService` backed by Pinata's pin-by-hash API.
///
/// Pinata allows about 3 requests per second; callers are expected to
/// throttle through a shared `RateLimiter`.
#[derive(Debug, Clone)]
pub struct PinataClient {
    pin_by_hash_url: reqwest::Url,
    host_nodes: Vec<String>,
    http_client: reqwest::Client,
}

impl PinataClient {
    pub fn create(config: PinataConfig) -> Result<Self, Error> {
        let base = config.api_url.trim_end_matches('/');
        let pin_by_hash_url = reqwest::Url::parse(&format!("{base}/pinning/pinByHash"))
            .map_err(|_| Error::InvalidApiUrl(config.api_url.clone()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.jwt))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            pin_by_hash_url,
            host_nodes: config.host_nodes,
            http_client,
        })
    }

    pub async fn pin_by_hash(&self, cid: &str) -> Result<(), Error> {
        let req = PinByHashReq {
            hash_to_pin: cid,
            pinata_options: (!self.host_nodes.is_empty()).then(|| PinataOptions {
                host_nodes: &self.host_nodes,
            }),
        };
        let res = self
            .http_client
            .post(self.pin_by_hash_url.clone())
            .json(&req)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::HttpFailWithBody(status.as_u16(), body));
        }
        log::debug!("pinata accepted {cid}");
        Ok(())
    }
}

#[async_trait::async_trait]
impl PinningService for PinataClient {
    async fn pin(&self, cid: &str) -> anyhow::Result<()> {
        Ok(self.pin_by_hash(cid).await?)
    }
}
