use pinsync_core::{PeerPinInfo, PinInfo};
use serde::Deserialize;
use std::collections::HashMap;

use crate::Error;

#[derive(Debug, Deserialize)]
struct ClusterPinRes {
    cid: ClusterCid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    peer_map: HashMap<String, ClusterPeerRes>,
}

/// Older cluster versions encode CIDs as IPLD links.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClusterCid {
    Plain(String),
    Link {
        #[serde(rename = "/")]
        link: String,
    },
}

#[derive(Debug, Deserialize)]
struct ClusterPeerRes {
    #[serde(default)]
    peername: Option<String>,
    status: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<ClusterPinRes> for PinInfo {
    fn from(res: ClusterPinRes) -> Self {
        let cid = match res.cid {
            ClusterCid::Plain(cid) => cid,
            ClusterCid::Link { link } => link,
        };
        let peer_map = res
            .peer_map
            .into_iter()
            .map(|(peer_id, peer)| {
                (
                    peer_id,
                    PeerPinInfo {
                        peer_name: peer.peername,
                        status: peer.status,
                        timestamp: peer.timestamp,
                        error: peer.error.filter(|e| !e.is_empty()),
                    },
                )
            })
            .collect();
        PinInfo {
            cid,
            name: res.name.filter(|n| !n.is_empty()),
            peer_map,
        }
    }
}

/// Parses a `/pins` response body.
///
/// Accepts a JSON array as well as the newline-delimited stream of objects
/// the cluster emits when streaming.
pub(crate) fn parse_pins_body(body: &[u8]) -> Result<Vec<PinInfo>, Error> {
    let body = body.trim_ascii_start();
    let raw: Vec<ClusterPinRes> = if body.starts_with(b"[") {
        serde_json::from_slice(body)?
    } else {
        serde_json::Deserializer::from_slice(body)
            .into_iter::<ClusterPinRes>()
            .collect::<Result<_, _>>()?
    };
    Ok(raw.into_iter().map(PinInfo::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinsync_core::PinStatus;

    #[test]
    fn parses_array_with_link_cids() {
        let body = br#"[
            {"cid": {"/": "bafy1"}, "name": "test-pin-name", "peer_map": {
                "test-peer-id": {"peername": "test-peer-name", "ipfs_peer_id": "x", "status": "pinned", "timestamp": "2021-01-01T00:00:00Z"},
                "test-peer-id-2": {"peername": "test-peer-name-2", "status": "pinning", "timestamp": "2021-01-01T00:00:00Z", "error": ""}
            }}
        ]"#;
        let infos = parse_pins_body(body).unwrap();

        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.cid, "bafy1");
        assert_eq!(info.name.as_deref(), Some("test-pin-name"));
        assert_eq!(info.status_at("test-peer-id"), Some(PinStatus::Pinned));
        assert_eq!(info.status_at("test-peer-id-2"), Some(PinStatus::Pinning));
        assert_eq!(info.peer_map["test-peer-id-2"].error, None);
    }

    #[test]
    fn parses_newline_delimited_objects() {
        let body = b"{\"cid\":\"bafy1\",\"peer_map\":{\"p\":{\"status\":\"queued\"}}}\n\
                     {\"cid\":\"bafy2\",\"peer_map\":{\"p\":{\"status\":\"pin_error\",\"error\":\"context deadline exceeded\"}}}\n";
        let infos = parse_pins_body(body).unwrap();

        let cids: Vec<_> = infos.iter().map(|i| i.cid.as_str()).collect();
        assert_eq!(cids, vec!["bafy1", "bafy2"]);
        assert_eq!(infos[0].status_at("p"), Some(PinStatus::PinQueued));
        assert_eq!(infos[1].status_at("p"), Some(PinStatus::PinError));
        assert_eq!(
            infos[1].peer_map["p"].error.as_deref(),
            Some("context deadline exceeded")
        );
    }

    #[test]
    fn empty_body_is_no_pins() {
        assert!(parse_pins_body(b"").unwrap().is_empty());
        assert!(parse_pins_body(b"  []").unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_pins_body(b"<html>bad gateway</html>").is_err());
    }
}
