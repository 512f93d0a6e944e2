//! Ledger event model and the protobuf state-delta codec.
//!
//! A batch delivered by the ledger's event subscription is a list of
//! [`Event`]s. Two event types matter here:
//!
//! - `sawtooth/block-commit`: attributes `block_num` and `block_id`
//! - `sawtooth/state-delta`: `data` holds a protobuf `StateChangeList`

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::types::StateChange;

/// Event type announcing a committed block.
pub const BLOCK_COMMIT: &str = "sawtooth/block-commit";

/// Event type carrying the block's state changes.
pub const STATE_DELTA: &str = "sawtooth/state-delta";

/// A key/value attribute attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// One event from a subscription batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
    /// Opaque payload, hex-encoded in JSON.
    #[serde(default, with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl Event {
    /// Build a block-commit event.
    pub fn block_commit(block_num: u64, block_id: impl Into<String>) -> Self {
        Self {
            event_type: BLOCK_COMMIT.into(),
            attributes: vec![
                EventAttribute {
                    key: "block_num".into(),
                    value: block_num.to_string(),
                },
                EventAttribute {
                    key: "block_id".into(),
                    value: block_id.into(),
                },
            ],
            data: vec![],
        }
    }

    /// Build a state-delta event from ordered changes.
    pub fn state_delta(changes: &[StateChange]) -> Self {
        Self {
            event_type: STATE_DELTA.into(),
            attributes: vec![],
            data: encode_state_changes(changes),
        }
    }

    /// Value of the first attribute named `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

// ─── Protobuf wire types ─────────────────────────────────────────────────────

/// Wire form of `StateChangeList`.
#[derive(Clone, PartialEq, Message)]
pub struct StateChangeList {
    #[prost(message, repeated, tag = "1")]
    pub state_changes: Vec<StateChangeMessage>,
}

/// Wire form of `StateChange`.
#[derive(Clone, PartialEq, Message)]
pub struct StateChangeMessage {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
    #[prost(enumeration = "ChangeType", tag = "3")]
    pub r#type: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ChangeType {
    TypeUnset = 0,
    Set = 1,
    Delete = 2,
}

/// Encode changes as a `StateChangeList`, preserving order.
///
/// An empty value is encoded as a delete.
pub fn encode_state_changes(changes: &[StateChange]) -> Vec<u8> {
    let list = StateChangeList {
        state_changes: changes
            .iter()
            .map(|c| StateChangeMessage {
                address: c.address.clone(),
                value: c.value.clone(),
                r#type: if c.value.is_empty() {
                    ChangeType::Delete as i32
                } else {
                    ChangeType::Set as i32
                },
            })
            .collect(),
    };
    list.encode_to_vec()
}

/// Decode a `StateChangeList` blob in emission order.
pub fn decode_state_changes(data: &[u8]) -> Result<Vec<StateChange>, MirrorError> {
    let list = StateChangeList::decode(data)
        .map_err(|e| MirrorError::Ingest(format!("invalid state delta: {e}")))?;
    Ok(list
        .state_changes
        .into_iter()
        .map(|c| StateChange {
            address: c.address,
            value: c.value,
        })
        .collect())
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(address: &str, value: &[u8]) -> StateChange {
        StateChange {
            address: address.into(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn state_changes_keep_emission_order() {
        let changes = vec![change("c", b"3"), change("a", b"1"), change("b", b"2")];
        let decoded = decode_state_changes(&encode_state_changes(&changes)).unwrap();
        let addresses: Vec<_> = decoded.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["c", "a", "b"]);
    }

    #[test]
    fn garbage_delta_is_ingest_error() {
        let err = decode_state_changes(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, MirrorError::Ingest(_)));
    }

    #[test]
    fn block_commit_attributes() {
        let ev = Event::block_commit(42, "abc123");
        assert!(ev.is(BLOCK_COMMIT));
        assert_eq!(ev.attribute("block_num"), Some("42"));
        assert_eq!(ev.attribute("block_id"), Some("abc123"));
        assert_eq!(ev.attribute("state_root_hash"), None);
    }

    #[test]
    fn event_json_uses_hex_data() {
        let ev = Event {
            event_type: STATE_DELTA.into(),
            attributes: vec![],
            data: vec![0xde, 0xad],
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["data"], "dead");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn event_json_data_is_optional() {
        let ev: Event = serde_json::from_str(
            r#"{"event_type":"sawtooth/block-commit","attributes":[{"key":"block_num","value":"7"}]}"#,
        )
        .unwrap();
        assert!(ev.data.is_empty());
        assert_eq!(ev.attribute("block_num"), Some("7"));
    }
}
