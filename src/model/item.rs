use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Identifier issued by the remote source. Ids are assumed unique and
/// monotonically increasing; nothing here enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(i64);

impl ItemId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// Id immediately after this one, or `None` at `i64::MAX`.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ItemId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        value
            .parse::<i64>()
            .map(Self)
            .with_context(|| format!("invalid item id {value:?}"))
    }
}

/// A fetched item together with the metadata recorded at fetch time.
///
/// The raw payload is kept exactly as received and there is no way to change it
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    created_at: i64,
    processed_at: DateTime<Utc>,
    api_version: String,
    raw: String,
}

impl Item {
    /// Builds an item from a raw JSON payload, stamping `processed_at` with the
    /// current time.
    pub fn from_payload(
        id: ItemId,
        api_version: impl Into<String>,
        raw: impl Into<String>,
    ) -> Result<Self> {
        Self::from_payload_at(id, api_version, raw, Utc::now())
    }

    /// Same as [`Item::from_payload`] with an explicit fetch instant.
    ///
    /// The payload must be a JSON object carrying a numeric `time` field holding
    /// the creation instant in epoch seconds. Fractional values are truncated.
    pub fn from_payload_at(
        id: ItemId,
        api_version: impl Into<String>,
        raw: impl Into<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let raw = raw.into();
        let created_at = parse_created_at(&raw)
            .with_context(|| format!("failed to parse payload for item {id}"))?;

        Ok(Self {
            id,
            created_at,
            processed_at,
            api_version: api_version.into(),
            raw,
        })
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Creation instant reported by the source, in epoch seconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

fn parse_created_at(raw: &str) -> Result<i64> {
    let value: Value = serde_json::from_str(raw).context("payload is not valid JSON")?;
    let Some(object) = value.as_object() else {
        bail!("payload is not a JSON object");
    };
    let time = object
        .get("time")
        .ok_or_else(|| anyhow!("payload has no `time` field"))?;
    let seconds = time
        .as_f64()
        .ok_or_else(|| anyhow!("payload `time` field is not numeric: {time}"))?;
    if !seconds.is_finite() || seconds < i64::MIN as f64 || seconds > i64::MAX as f64 {
        bail!("payload `time` field is out of range: {seconds}");
    }
    Ok(seconds as i64)
}
