use crate::Error;
use crate::config::ClusterConfig;
use crate::wire::parse_pins_body;
use pinsync_core::{ClusterApi, ClusterFeatures, PinInfo};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::time::Duration;

/// `ClusterApi` over the cluster's HTTP API.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    pins_url: reqwest::Url,
    http_client: reqwest::Client,
    features: ClusterFeatures,
}

impl ClusterClient {
    pub fn create(config: ClusterConfig) -> Result<Self, Error> {
        let base = config.api_url.trim_end_matches('/');
        let pins_url = reqwest::Url::parse(&format!("{base}/pins"))
            .map_err(|_| Error::InvalidApiUrl(config.api_url.clone()))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.basic_auth_token {
            let mut value = HeaderValue::from_str(&format!("Basic {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            pins_url,
            http_client,
            features: ClusterFeatures {
                supports_multi_cid: config.supports_multi_cid,
                max_cids_per_request: config.max_cids_per_request,
            },
        })
    }

    async fn fetch_pins(&self, cids: &[String]) -> Result<Vec<PinInfo>, Error> {
        let res = self
            .http_client
            .get(self.pins_url.clone())
            .query(&[("cids", cids.join(","))])
            .send()
            .await?;

        let status = res.status();
        let body = res.bytes().await?;
        if !status.is_success() {
            return Err(Error::HttpFailWithBody(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        let infos = parse_pins_body(&body)?;
        log::debug!(
            "cluster reported {} of {} requested cids",
            infos.len(),
            cids.len()
        );
        Ok(infos)
    }
}

#[async_trait::async_trait]
impl ClusterApi for ClusterClient {
    fn features(&self) -> ClusterFeatures {
        self.features
    }

    async fn status_all(&self, cids: &[String]) -> anyhow::Result<Vec<PinInfo>> {
        if cids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.fetch_pins(cids).await?)
    }
}
