//! Serde helpers for maps of RFC 3339 timestamps, keeping sub-second precision.

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serializer};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn serialize<S>(map: &BTreeMap<String, OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (key, ts) in map {
        let formatted = ts.format(&Rfc3339).map_err(S::Error::custom)?;
        out.serialize_entry(key, &formatted)?;
    }
    out.end()
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, String>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, raw)| {
            OffsetDateTime::parse(&raw, &Rfc3339)
                .map(|ts| (key, ts))
                .map_err(D::Error::custom)
        })
        .collect()
}
