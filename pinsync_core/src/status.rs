use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a single pin.
///
/// The variant names double as the values stored by the data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinStatus {
    PinQueued,
    Pinning,
    Pinned,
    PinError,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown pin status '{0}'")]
pub struct UnknownPinStatus(pub String);

impl PinStatus {
    pub const ALL: [PinStatus; 4] = [
        PinStatus::PinQueued,
        PinStatus::Pinning,
        PinStatus::Pinned,
        PinStatus::PinError,
    ];

    /// Maps a status string reported by the cluster to a `PinStatus`.
    ///
    /// Total over all inputs: anything outside the known vocabulary
    /// (`pinned`, `pinning`, `queued`, `pin_queued`) is `PinError`.
    pub fn from_cluster_status(raw: &str) -> Self {
        match raw {
            "pinned" => PinStatus::Pinned,
            "pinning" => PinStatus::Pinning,
            "queued" | "pin_queued" => PinStatus::PinQueued,
            _ => PinStatus::PinError,
        }
    }

    /// Terminal pins need no further status checks.
    pub fn is_terminal(self) -> bool {
        matches!(self, PinStatus::Pinned)
    }

    /// Returns the status a pin recorded as `self` ends up with after
    /// observing `observed` on the cluster.
    ///
    /// A `Pinned` pin only ever moves to `PinError` (the replica was lost);
    /// every other observation leaves it `Pinned`.
    pub fn advance(self, observed: PinStatus) -> PinStatus {
        match (self, observed) {
            (PinStatus::Pinned, PinStatus::PinError) => PinStatus::PinError,
            (PinStatus::Pinned, _) => PinStatus::Pinned,
            (_, observed) => observed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PinStatus::PinQueued => "PinQueued",
            PinStatus::Pinning => "Pinning",
            PinStatus::Pinned => "Pinned",
            PinStatus::PinError => "PinError",
        }
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinStatus {
    type Err = UnknownPinStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PinStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownPinStatus(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_vocabulary_maps_to_statuses() {
        assert_eq!(PinStatus::from_cluster_status("pinned"), PinStatus::Pinned);
        assert_eq!(PinStatus::from_cluster_status("pinning"), PinStatus::Pinning);
        assert_eq!(PinStatus::from_cluster_status("queued"), PinStatus::PinQueued);
        assert_eq!(
            PinStatus::from_cluster_status("pin_queued"),
            PinStatus::PinQueued
        );
    }

    #[test]
    fn unknown_cluster_status_is_an_error_status() {
        for raw in ["unpinned", "pin_error", "remote", "", "PINNED", "cluster_error"] {
            assert_eq!(PinStatus::from_cluster_status(raw), PinStatus::PinError, "{raw}");
        }
    }

    #[test]
    fn only_pinned_is_terminal() {
        let terminal: Vec<_> = PinStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![PinStatus::Pinned]);
    }

    #[test]
    fn pinned_only_regresses_to_error() {
        assert_eq!(PinStatus::Pinned.advance(PinStatus::Pinning), PinStatus::Pinned);
        assert_eq!(PinStatus::Pinned.advance(PinStatus::PinQueued), PinStatus::Pinned);
        assert_eq!(PinStatus::Pinned.advance(PinStatus::PinError), PinStatus::PinError);
        assert_eq!(PinStatus::Pinning.advance(PinStatus::PinQueued), PinStatus::PinQueued);
        assert_eq!(PinStatus::PinError.advance(PinStatus::Pinned), PinStatus::Pinned);
    }

    #[test]
    fn store_names_parse_back() {
        for status in PinStatus::ALL {
            assert_eq!(status.as_str().parse::<PinStatus>(), Ok(status));
        }
        assert!("pinned".parse::<PinStatus>().is_err());
    }
}
