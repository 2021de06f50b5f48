use crate::Error;
use crate::config::PostgrestConfig;
use crate::rows::{
    IdRow, PIN_REQUEST_SELECT, PIN_SYNC_REQUEST_SELECT, PinRequestRow, PinSyncRequestRow,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use pinsync_core::{
    PinId, PinRequest, PinRequestId, PinStatus, PinStatusUpdate, PinSyncRequest, PinSyncRequestId,
    store::{PinStore, StoreError, StoreFeatures, StoreResult, SyncRequestPage, SyncRequestQuery},
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// `PinStore` over a PostgREST endpoint exposing the `pin_request`,
/// `pin_sync_request`, `pin` and `pin_location` tables.
#[derive(Debug, Clone)]
pub struct PostgrestPinStore {
    base_url: reqwest::Url,
    http_client: reqwest::Client,
    max_page_size: usize,
}

impl PostgrestPinStore {
    pub fn create(config: PostgrestConfig) -> Result<Self, Error> {
        let base = format!("{}/", config.url.trim_end_matches('/'));
        let base_url =
            reqwest::Url::parse(&base).map_err(|_| Error::InvalidUrl(config.url.clone()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.jwt))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            http_client,
            max_page_size: config.max_page_size,
        })
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, Error> {
        self.base_url
            .join(path)
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, Error> {
        let res = req.send().await?;
        let status = res.status();
        let body = res.bytes().await?;
        if !status.is_success() {
            return Err(Error::HttpFailWithBody(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }
        Ok(body.to_vec())
    }

    async fn fetch<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, Error> {
        let body = self.send(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn check_page_size(&self, size: usize) -> StoreResult<()> {
        if size > self.max_page_size {
            return Err(StoreError::PageTooLarge {
                requested: size,
                max: self.max_page_size,
            }
            .into());
        }
        Ok(())
    }

    /// Ids of `pin_ids` that have no row in `pin`.
    async fn missing_pins(&self, pin_ids: &[&PinId]) -> Result<Vec<PinId>, Error> {
        let found: Vec<IdRow> = self
            .fetch(
                self.http_client
                    .get(self.url("pin")?)
                    .query(&[("select", "id".to_owned()), ("id", in_filter(pin_ids))]),
            )
            .await?;
        let found: BTreeSet<String> = found.into_iter().map(|r| r.id.into_string()).collect();
        Ok(pin_ids
            .iter()
            .filter(|id| !found.contains(id.as_str()))
            .map(|id| (*id).clone())
            .collect())
    }
}

/// PostgREST `in.(..)` filter value.
fn in_filter<I: fmt::Display>(ids: impl IntoIterator<Item = I>) -> String {
    let joined = ids
        .into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl PinStore for PostgrestPinStore {
    fn features(&self) -> StoreFeatures {
        StoreFeatures {
            max_page_size: self.max_page_size,
        }
    }

    async fn find_all_pin_requests(&self, size: usize) -> StoreResult<Vec<PinRequest>> {
        self.check_page_size(size)?;
        let rows: Vec<PinRequestRow> = self
            .fetch(self.http_client.get(self.url("pin_request")?).query(&[
                ("select", PIN_REQUEST_SELECT.to_owned()),
                ("order", "id.asc".to_owned()),
                ("limit", size.to_string()),
            ]))
            .await?;
        Ok(rows.into_iter().map(PinRequest::from).collect())
    }

    async fn delete_pin_requests(&self, ids: &[PinRequestId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.send(
            self.http_client
                .delete(self.url("pin_request")?)
                .query(&[("id", in_filter(ids))]),
        )
        .await?;
        log::debug!("deleted {} pin requests", ids.len());
        Ok(())
    }

    async fn increment_pin_request_attempts(&self, ids: &[PinRequestId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.send(
            self.http_client
                .post(self.url("rpc/increment_pin_request_attempts")?)
                .json(&json!({ "ids": ids })),
        )
        .await?;
        Ok(())
    }

    async fn find_pin_sync_requests(
        &self,
        query: SyncRequestQuery,
    ) -> StoreResult<SyncRequestPage> {
        self.check_page_size(query.size)?;
        if query.size == 0 {
            return Ok(SyncRequestPage::default());
        }

        let mut params = vec![
            ("select", PIN_SYNC_REQUEST_SELECT.to_owned()),
            ("order", "id.asc".to_owned()),
            ("limit", query.size.to_string()),
        ];
        if let Some(from) = query.from {
            params.push(("inserted_at", format!("gte.{}", timestamp(from))));
        }
        if let Some(to) = query.to {
            params.push(("inserted_at", format!("lte.{}", timestamp(to))));
        }
        if let Some(after) = &query.after {
            if after.parse::<i64>().is_err() {
                return Err(anyhow::anyhow!("invalid pin sync request cursor '{after}'"));
            }
            params.push(("id", format!("gt.{after}")));
        }

        let rows: Vec<PinSyncRequestRow> = self
            .fetch(
                self.http_client
                    .get(self.url("pin_sync_request")?)
                    .query(&params),
            )
            .await?;

        // A full page may have a successor; an empty follow-up page ends paging.
        let data: Vec<PinSyncRequest> = rows.into_iter().map(Into::into).collect();
        let after = if data.len() == query.size {
            data.last().map(|req| req.id.to_string())
        } else {
            None
        };
        Ok(SyncRequestPage { data, after })
    }

    async fn update_pins(&self, updates: &[PinStatusUpdate]) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut by_status: BTreeMap<&'static str, (PinStatus, Vec<&PinId>)> = BTreeMap::new();
        for update in updates {
            by_status
                .entry(update.status.as_str())
                .or_insert_with(|| (update.status, Vec::new()))
                .1
                .push(&update.pin_id);
        }

        let all: Vec<&PinId> = updates.iter().map(|u| &u.pin_id).collect();
        if let Some(missing) = self.missing_pins(&all).await?.into_iter().next() {
            return Err(StoreError::MissingPin(missing).into());
        }

        let now = timestamp(Utc::now());
        for (status, ids) in by_status.values() {
            self.send(
                self.http_client
                    .patch(self.url("pin")?)
                    .query(&[("id", in_filter(ids))])
                    .json(&json!({ "status": status, "updated_at": now })),
            )
            .await?;
        }
        log::debug!("updated {} pins", updates.len());
        Ok(())
    }

    async fn delete_pin_sync_requests(&self, ids: &[PinSyncRequestId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.send(
            self.http_client
                .delete(self.url("pin_sync_request")?)
                .query(&[("id", in_filter(ids))]),
        )
        .await?;
        Ok(())
    }

    async fn create_pin_sync_requests(&self, pin_ids: &[PinId]) -> StoreResult<()> {
        if pin_ids.is_empty() {
            return Ok(());
        }

        let refs: Vec<&PinId> = pin_ids.iter().collect();
        if let Some(missing) = self.missing_pins(&refs).await?.into_iter().next() {
            return Err(StoreError::MissingPin(missing).into());
        }

        // A bulk insert is a single statement, so it lands entirely or not at all.
        let rows: Vec<_> = pin_ids.iter().map(|id| json!({ "pin_id": id })).collect();
        self.send(
            self.http_client
                .post(self.url("pin_sync_request")?)
                .json(&rows),
        )
        .await?;
        Ok(())
    }
}
