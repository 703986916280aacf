//! Wire-level vote representation shared by ingestion, the store adapter, and the dead-letter
//! publisher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single vote event as it appears on the ingress log topic.
///
/// `timestamp` is producer-assigned and never interpreted by this crate; it rides along so the
/// dead-letter copy preserves the original frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "poll_id")]
    pub poll_id: String,
    #[serde(rename = "user_id")]
    pub user_id: String,
    #[serde(rename = "option_id")]
    pub option_id: String,
    pub timestamp: String,
}

impl Vote {
    /// Canonical JSON encoding used both for the ingress wire format and the dead-letter copy.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Per-poll tally, `optionID -> count`. `BTreeMap` gives a deterministic broadcast encoding,
/// which keeps S3-style ordering assertions in tests stable.
pub type Tally = BTreeMap<String, u64>;

/// Canonical broadcast encoding for a tally snapshot: `{"<optionID>": <count>, ...}`, no framing
/// envelope, one WebSocket text frame per broadcast.
pub fn encode_tally(tally: &Tally) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_roundtrips_through_json() {
        let vote = Vote {
            poll_id: "p1".into(),
            user_id: "u1".into(),
            option_id: "A".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
        };
        let bytes = vote.to_json_bytes().unwrap();
        assert_eq!(Vote::from_json_bytes(&bytes).unwrap(), vote);
    }

    #[test]
    fn garbage_frame_fails_to_decode() {
        assert!(Vote::from_json_bytes(b"not json").is_err());
    }

    #[test]
    fn tally_encodes_canonically() {
        let mut tally = Tally::new();
        tally.insert("A".into(), 2);
        tally.insert("B".into(), 1);
        assert_eq!(encode_tally(&tally).unwrap(), br#"{"A":2,"B":1}"#);
    }
}
