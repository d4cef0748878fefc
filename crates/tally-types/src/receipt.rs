use std::borrow::Cow;

use serde::de::{self, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::hash::ContentHash;
use crate::records::{
    AnchorRecord, AnomalyRecord, CompactionRecord, IngestRecord, RollupRecord, VerifyRecord,
};
use crate::timestamp::Timestamp;

pub const INGEST: &str = "ingest";
pub const ANCHOR: &str = "anchor";
pub const COMPACTION: &str = "compaction";
pub const ANOMALY: &str = "anomaly";
pub const VERIFY: &str = "verify";
pub const ROLLUP_SUFFIX: &str = "_rollup";

/// Fields every ledger line must carry.
pub const ENVELOPE_FIELDS: [&str; 4] = ["receipt_type", "ts", "tenant_id", "payload_hash"];

/// Type-specific payload of a receipt.
#[derive(Clone, Debug, PartialEq)]
pub enum ReceiptBody {
    Ingest(IngestRecord),
    Anchor(AnchorRecord),
    Compaction(CompactionRecord),
    Rollup(RollupRecord),
    Anomaly(AnomalyRecord),
    Verify(VerifyRecord),
    /// Any receipt type this crate does not model, kept field-for-field.
    Opaque {
        receipt_type: String,
        fields: Map<String, Value>,
    },
}

impl ReceiptBody {
    /// The `receipt_type` string this payload is stored under.
    pub fn receipt_type(&self) -> Cow<'_, str> {
        match self {
            Self::Ingest(_) => Cow::Borrowed(INGEST),
            Self::Anchor(_) => Cow::Borrowed(ANCHOR),
            Self::Compaction(_) => Cow::Borrowed(COMPACTION),
            Self::Rollup(r) => Cow::Owned(format!("{}{ROLLUP_SUFFIX}", r.source_type)),
            Self::Anomaly(_) => Cow::Borrowed(ANOMALY),
            Self::Verify(_) => Cow::Borrowed(VERIFY),
            Self::Opaque { receipt_type, .. } => Cow::Borrowed(receipt_type),
        }
    }

    /// The payload as a JSON object (no envelope fields).
    pub fn to_fields(&self) -> Result<Map<String, Value>, TypeError> {
        let value = match self {
            Self::Ingest(r) => to_json(r)?,
            Self::Anchor(r) => to_json(r)?,
            Self::Compaction(r) => to_json(r)?,
            Self::Rollup(r) => to_json(r)?,
            Self::Anomaly(r) => to_json(r)?,
            Self::Verify(r) => to_json(r)?,
            Self::Opaque { fields, .. } => return Ok(fields.clone()),
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(TypeError::NotAnObject(json_kind(&other))),
        }
    }

    /// Interpret payload fields stored under `receipt_type`.
    ///
    /// Never fails: fields that do not match the modelled shape for a known
    /// type are kept as [`ReceiptBody::Opaque`].
    pub fn from_fields(receipt_type: &str, fields: Map<String, Value>) -> Self {
        let typed = match receipt_type {
            INGEST => from_json(&fields).map(Self::Ingest),
            ANCHOR => from_json(&fields).map(Self::Anchor),
            COMPACTION => from_json(&fields).map(Self::Compaction),
            ANOMALY => from_json(&fields).map(Self::Anomaly),
            VERIFY => from_json(&fields).map(Self::Verify),
            other => match other.strip_suffix(ROLLUP_SUFFIX) {
                Some(source) if !source.is_empty() => {
                    from_json::<RollupRecord>(&fields).map(|mut r| {
                        r.source_type = source.to_owned();
                        Self::Rollup(r)
                    })
                }
                _ => None,
            },
        };
        typed.unwrap_or_else(|| Self::Opaque {
            receipt_type: receipt_type.to_owned(),
            fields,
        })
    }
}

/// An immutable, tenant-scoped fact record.
///
/// The envelope (`ts`, `tenant_id`, `payload_hash`) is fixed; the payload is
/// one of the [`ReceiptBody`] variants. On the wire both are flattened into
/// a single JSON object with keys in sorted order.
#[derive(Clone, Debug, PartialEq)]
pub struct Receipt {
    pub ts: Timestamp,
    pub tenant_id: String,
    pub payload_hash: ContentHash,
    pub body: ReceiptBody,
}

impl Receipt {
    pub fn new(
        ts: Timestamp,
        tenant_id: impl Into<String>,
        payload_hash: ContentHash,
        body: ReceiptBody,
    ) -> Self {
        Self {
            ts,
            tenant_id: tenant_id.into(),
            payload_hash,
            body,
        }
    }

    pub fn receipt_type(&self) -> Cow<'_, str> {
        self.body.receipt_type()
    }

    /// The object the payload hash is computed over: the payload fields plus
    /// `tenant_id`.
    pub fn hashed_fields(tenant_id: &str, body: &ReceiptBody) -> Result<Value, TypeError> {
        let mut fields = body.to_fields()?;
        fields.insert("tenant_id".into(), Value::String(tenant_id.to_owned()));
        Ok(Value::Object(fields))
    }

    /// Flatten envelope and payload into one JSON object.
    pub fn to_value(&self) -> Result<Value, TypeError> {
        let mut map = self.body.to_fields()?;
        map.insert(
            "receipt_type".into(),
            Value::String(self.receipt_type().into_owned()),
        );
        map.insert("ts".into(), to_json(&self.ts)?);
        map.insert("tenant_id".into(), Value::String(self.tenant_id.clone()));
        map.insert(
            "payload_hash".into(),
            Value::String(self.payload_hash.as_str().to_owned()),
        );
        Ok(Value::Object(map))
    }

    /// Parse one ledger line.
    ///
    /// Permissive: missing or mistyped envelope fields become empty values.
    /// Only a non-object value is rejected.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => return Err(TypeError::NotAnObject(json_kind(&other))),
        };
        let receipt_type = take_string(&mut map, "receipt_type");
        let tenant_id = take_string(&mut map, "tenant_id");
        let payload_hash = ContentHash::from_raw(take_string(&mut map, "payload_hash"));
        let ts = map
            .remove("ts")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Ok(Self {
            ts,
            tenant_id,
            payload_hash,
            body: ReceiptBody::from_fields(&receipt_type, map),
        })
    }

    /// Look up any field by name, envelope or payload.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self.to_value().ok()? {
            Value::Object(mut map) => map.remove(name),
            _ => None,
        }
    }

    pub fn as_ingest(&self) -> Option<&IngestRecord> {
        match &self.body {
            ReceiptBody::Ingest(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_anchor(&self) -> Option<&AnchorRecord> {
        match &self.body {
            ReceiptBody::Anchor(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_compaction(&self) -> Option<&CompactionRecord> {
        match &self.body {
            ReceiptBody::Compaction(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_rollup(&self) -> Option<&RollupRecord> {
        match &self.body {
            ReceiptBody::Rollup(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_anomaly(&self) -> Option<&AnomalyRecord> {
        match &self.body {
            ReceiptBody::Anomaly(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_verify(&self) -> Option<&VerifyRecord> {
        match &self.body {
            ReceiptBody::Verify(r) => Some(r),
            _ => None,
        }
    }
}

impl Serialize for Receipt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Receipt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, TypeError> {
    serde_json::to_value(value).map_err(|e| TypeError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(fields: &Map<String, Value>) -> Option<T> {
    serde_json::from_value(Value::Object(fields.clone())).ok()
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> String {
    match map.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
