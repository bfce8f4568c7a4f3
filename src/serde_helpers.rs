//! Shared serde helpers for types that don't have a native JSON shape.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Serialize an `Option<Duration>` as milliseconds, matching how the wire
/// protocol and config files express timeouts.
pub mod duration_millis_opt {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}
