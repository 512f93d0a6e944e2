//! Decoder contract: raw state values → structured records.
//!
//! The mirror does not know the byte layout of domain payloads. A
//! [`StateDecoder`] maps an `(address, value)` pair to the address space it
//! belongs to and the records it contains. [`JsonStateDecoder`] is a
//! reference implementation for JSON-encoded state.

use serde_json::Value;

use crate::address::{selector_space, AddressSpace};
use crate::error::MirrorError;
use crate::types::{EntityKind, Record};

/// Output of a [`StateDecoder`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedState {
    pub space: AddressSpace,
    /// Records in the order they appear in the value.
    pub records: Vec<Record>,
}

/// Decodes raw state values into records.
pub trait StateDecoder: Send + Sync {
    fn decode(&self, address: &str, value: &[u8]) -> Result<DecodedState, MirrorError>;
}

/// Decodes state stored as a JSON object or an array of objects.
///
/// The address space comes from the address infix; the namespace prefix is
/// not checked here, since the ingestor already filtered on the mirror's own
/// namespace. Every object must carry
/// its kind's natural key field (see [`EntityKind::key_field`]); the whole
/// object becomes the payload.
#[derive(Debug, Default, Clone)]
pub struct JsonStateDecoder;

impl JsonStateDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl StateDecoder for JsonStateDecoder {
    fn decode(&self, address: &str, value: &[u8]) -> Result<DecodedState, MirrorError> {
        let space = selector_space(address);
        let kind = match EntityKind::try_from(space) {
            Ok(kind) => kind,
            Err(space) => {
                return Ok(DecodedState {
                    space,
                    records: vec![],
                })
            }
        };

        if value.is_empty() {
            return Ok(DecodedState {
                space,
                records: vec![],
            });
        }

        let json: Value = serde_json::from_slice(value)
            .map_err(|e| MirrorError::decode(address, e.to_string()))?;
        let objects = match json {
            Value::Array(items) => items,
            obj @ Value::Object(_) => vec![obj],
            other => {
                return Err(MirrorError::decode(
                    address,
                    format!("expected object or array, got {other}"),
                ))
            }
        };

        let records = objects
            .into_iter()
            .map(|payload| record_from(kind, address, payload))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DecodedState { space, records })
    }
}

fn record_from(kind: EntityKind, address: &str, payload: Value) -> Result<Record, MirrorError> {
    let field = kind.key_field();
    let key = match payload.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(MirrorError::decode(
                address,
                format!("{field} must be a string or number"),
            ))
        }
        None => return Err(MirrorError::decode(address, format!("missing {field}"))),
    };
    Ok(Record { key, payload })
}
