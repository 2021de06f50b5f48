//! Row shapes as returned by PostgREST.

use chrono::{DateTime, Utc};
use pinsync_core::{
    Content, Pin, PinId, PinLocation, PinLocationId, PinRequest, PinRequestId, PinStatus,
    PinSyncRequest, PinSyncRequestId,
};
use serde::Deserialize;

/// Primary keys are `bigint` in the schema but may come back as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawId {
    Num(i64),
    Str(String),
}

impl RawId {
    pub(crate) fn into_string(self) -> String {
        match self {
            RawId::Num(n) => n.to_string(),
            RawId::Str(s) => s,
        }
    }
}

pub(crate) const PIN_REQUEST_SELECT: &str = "id,content_cid,attempts,inserted_at,updated_at";

pub(crate) const PIN_SYNC_REQUEST_SELECT: &str = "id,inserted_at,\
pin:pin_id(id,status,content_cid,inserted_at,updated_at,\
content:content_cid(dag_size),\
location:pin_location_id(id,peer_id,peer_name,region))";

#[derive(Debug, Deserialize)]
pub(crate) struct PinRequestRow {
    id: RawId,
    content_cid: String,
    #[serde(default)]
    attempts: Option<u32>,
    inserted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PinRequestRow> for PinRequest {
    fn from(row: PinRequestRow) -> Self {
        PinRequest {
            id: PinRequestId(row.id.into_string()),
            cid: row.content_cid,
            attempts: row.attempts.unwrap_or(0),
            created: row.inserted_at,
            updated: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PinSyncRequestRow {
    pub(crate) id: RawId,
    inserted_at: DateTime<Utc>,
    pin: PinRow,
}

#[derive(Debug, Deserialize)]
struct PinRow {
    id: RawId,
    status: PinStatus,
    content_cid: String,
    inserted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    content: Option<ContentRow>,
    location: LocationRow,
}

#[derive(Debug, Deserialize)]
struct ContentRow {
    #[serde(default)]
    dag_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    id: RawId,
    peer_id: String,
    #[serde(default)]
    peer_name: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

impl From<PinSyncRequestRow> for PinSyncRequest {
    fn from(row: PinSyncRequestRow) -> Self {
        let pin = row.pin;
        PinSyncRequest {
            id: PinSyncRequestId(row.id.into_string()),
            created: row.inserted_at,
            pin: Pin {
                id: PinId(pin.id.into_string()),
                content: Content {
                    cid: pin.content_cid,
                    dag_size: pin.content.and_then(|c| c.dag_size),
                },
                location: PinLocation {
                    id: PinLocationId(pin.location.id.into_string()),
                    peer_id: pin.location.peer_id,
                    peer_name: pin.location.peer_name,
                    region: pin.location.region,
                },
                status: pin.status,
                created: pin.inserted_at,
                updated: pin.updated_at,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdRow {
    pub(crate) id: RawId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_request_row_embeds_pin_and_location() {
        let row: PinSyncRequestRow = serde_json::from_value(json!({
            "id": 7,
            "inserted_at": "2021-09-01T10:00:00.123456+00:00",
            "pin": {
                "id": "3",
                "status": "Pinning",
                "content_cid": "bafy1",
                "inserted_at": "2021-09-01T09:00:00+00:00",
                "updated_at": "2021-09-01T09:30:00+00:00",
                "content": { "dag_size": 42 },
                "location": { "id": 1, "peer_id": "peer-a", "peer_name": null, "region": "eu" }
            }
        }))
        .unwrap();

        let req = PinSyncRequest::from(row);
        assert_eq!(req.id.as_str(), "7");
        assert_eq!(req.pin.id.as_str(), "3");
        assert_eq!(req.pin.status, PinStatus::Pinning);
        assert_eq!(req.pin.content.dag_size, Some(42));
        assert_eq!(req.pin.location.peer_id, "peer-a");
        assert_eq!(req.pin.location.region.as_deref(), Some("eu"));
    }

    #[test]
    fn missing_attempts_reads_as_zero() {
        let row: PinRequestRow = serde_json::from_value(json!({
            "id": 1,
            "content_cid": "bafy1",
            "inserted_at": "2021-09-01T10:00:00Z",
            "updated_at": "2021-09-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(PinRequest::from(row).attempts, 0);
    }
}
