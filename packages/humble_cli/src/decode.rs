use crate::models::{Item, ProductKey};

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Formats tried, in order, before falling back to RFC 3339.
///
/// The API never sends a zone offset and usually includes microseconds.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Error)]
#[error("cannot parse time {raw:?}")]
pub struct TimeFormatError {
    pub raw: String,
}

/// Creation time of a bundle.
///
/// Absent values (`null` or an empty string) decode to the Unix epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HumbleTime(NaiveDateTime);

impl HumbleTime {
    pub fn parse(raw: &str) -> Result<Self, TimeFormatError> {
        let value = raw.trim().trim_matches('"');
        if value.is_empty() || value == "null" {
            return Ok(Self::default());
        }

        for format in NAIVE_FORMATS {
            if let Ok(time) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(Self(time));
            }
        }

        DateTime::parse_from_rfc3339(value)
            .map(|time| Self(time.naive_utc()))
            .map_err(|_| TimeFormatError {
                raw: raw.to_owned(),
            })
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for HumbleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl<'de> Deserialize<'de> for HumbleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => Self::parse(&raw).map_err(serde::de::Error::custom),
            None => Ok(Self::default()),
        }
    }
}

/// Decodes every element of a raw item array, skipping the ones that don't fit.
///
/// Each skipped element is reported to `on_drop` with its position in `raw`.
pub fn decode_items<F>(raw: Vec<Value>, mut on_drop: F) -> Vec<Item>
where
    F: FnMut(usize, &serde_json::Error),
{
    let mut items = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<Item>(value) {
            Ok(item) => items.push(item),
            Err(e) => on_drop(index, &e),
        }
    }
    items
}

/// One entry of `tpkd_dict.all_tpks`. Any field may be missing.
#[derive(Deserialize)]
struct RawKey {
    #[serde(default)]
    human_name: Option<Value>,
    #[serde(default)]
    redeemed_key_val: Option<Value>,
}

/// Reads the redeemable keys out of a bundle's key dictionary.
///
/// A missing `all_tpks` entry, or one that is not an array, yields no keys.
/// Entries that are not objects are ignored.
pub fn decode_product_keys(tpkd_dict: &Map<String, Value>) -> Vec<ProductKey> {
    let Some(Value::Array(entries)) = tpkd_dict.get("all_tpks") else {
        return vec![];
    };

    entries
        .iter()
        .filter(|entry| entry.is_object())
        .filter_map(|entry| RawKey::deserialize(entry).ok())
        .map(|key| ProductKey {
            human_name: match key.human_name {
                Some(Value::String(name)) => name,
                _ => String::new(),
            },
            redeemed: matches!(key.redeemed_key_val, Some(Value::String(_))),
        })
        .collect()
}
