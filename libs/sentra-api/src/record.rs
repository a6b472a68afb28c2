use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FeedError;

// ════════════════════════════════════════════════════════════════
//  Update Record
// ════════════════════════════════════════════════════════════════

/// Canonical price/stock update flowing through the pipeline.
///
/// Serialized as flat JSON on the log:
/// `{"sku":"SKU-1","price":101.0,"stock":49,"timestamp_ms":1000}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub sku: String,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient::i32")]
    pub stock: i32,
    /// Epoch milliseconds. Older producers wrote this field as `ts_ms`,
    /// sometimes as a decimal string.
    #[serde(alias = "ts_ms", deserialize_with = "lenient::timestamp")]
    pub timestamp_ms: i64,
}

impl UpdateRecord {
    pub fn new(sku: impl Into<String>, price: f64, stock: i32, timestamp_ms: i64) -> Self {
        Self { sku: sku.into(), price, stock, timestamp_ms }
    }

    /// Serialize as the log record value.
    pub fn encode(&self) -> Result<Vec<u8>, FeedError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a log record value. A missing payload, a missing/empty `sku`
    /// or a missing/non-numeric `timestamp_ms` is a format error; `price`
    /// and `stock` are best-effort and fall back to 0.
    pub fn decode(payload: Option<&[u8]>) -> Result<Self, FeedError> {
        let payload = payload.ok_or_else(|| FeedError::format_err("empty payload"))?;
        let record: UpdateRecord = serde_json::from_slice(payload)?;
        if record.sku.is_empty() {
            return Err(FeedError::format_err("empty sku"));
        }
        Ok(record)
    }
}

// ════════════════════════════════════════════════════════════════
//  Incoming update + admission
// ════════════════════════════════════════════════════════════════

/// An update as the caller sent it, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingUpdate {
    pub sku: String,
    pub price: f64,
    pub stock: i32,
    pub timestamp_ms: Option<i64>,
}

/// Why an incoming update was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum RejectReason {
    #[error("missing sku")]
    MissingSku,
    #[error("missing timestamp_ms")]
    MissingTimestamp,
}

/// Per-item admission result of the ingest front.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Accepted(UpdateRecord),
    Rejected { reason: RejectReason },
}

impl IncomingUpdate {
    /// An update is ingestable iff `sku` is non-empty and `timestamp_ms`
    /// is present. Nothing else is validated.
    pub fn admit(self) -> Admission {
        if self.sku.is_empty() {
            return Admission::Rejected { reason: RejectReason::MissingSku };
        }
        match self.timestamp_ms {
            Some(ts) => Admission::Accepted(UpdateRecord::new(self.sku, self.price, self.stock, ts)),
            None => Admission::Rejected { reason: RejectReason::MissingTimestamp },
        }
    }
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ════════════════════════════════════════════════════════════════
//  Lenient numeric decoding
// ════════════════════════════════════════════════════════════════

mod lenient {
    use super::*;
    use serde_json::Value;

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(as_f64(&value).unwrap_or_default())
    }

    pub fn i32<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(as_i64(&value)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or_default())
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(d)?;
        as_i64(&value).ok_or_else(|| serde::de::Error::custom(format!("timestamp_ms is not a number: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn admission_requires_sku_and_timestamp() {
        let ok = IncomingUpdate { sku: "SKU-1".into(), price: 101.0, stock: 49, timestamp_ms: Some(1000) };
        assert_eq!(ok.admit(), Admission::Accepted(UpdateRecord::new("SKU-1", 101.0, 49, 1000)));

        let no_sku = IncomingUpdate { sku: String::new(), price: 5.0, stock: 5, timestamp_ms: Some(1) };
        assert_eq!(no_sku.admit(), Admission::Rejected { reason: RejectReason::MissingSku });

        let no_ts = IncomingUpdate { sku: "SKU-2".into(), ..Default::default() };
        assert_eq!(no_ts.admit(), Admission::Rejected { reason: RejectReason::MissingTimestamp });
    }

    #[test]
    fn negative_stock_is_accepted() {
        let update = IncomingUpdate { sku: "SKU-9".into(), price: 1.5, stock: -3, timestamp_ms: Some(7) };
        match update.admit() {
            Admission::Accepted(record) => assert_eq!(record.stock, -3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_legacy_producer_payload() {
        // ts_ms as string, as written by clients that stringify 64-bit ints.
        let raw = br#"{"sku":"SKU-1","price":101,"stock":49,"ts_ms":"1717000000000"}"#;
        let record = UpdateRecord::decode(Some(raw)).unwrap();
        assert_eq!(record, UpdateRecord::new("SKU-1", 101.0, 49, 1_717_000_000_000));
    }

    #[test]
    fn missing_price_and_stock_are_tolerated() {
        let raw = br#"{"sku":"SKU-3","timestamp_ms":12,"stock":"n/a"}"#;
        let record = UpdateRecord::decode(Some(raw)).unwrap();
        assert_eq!(record.price, 0.0);
        assert_eq!(record.stock, 0);
        assert_eq!(record.timestamp_ms, 12);
    }

    #[test]
    fn malformed_payloads_are_format_errors() {
        for raw in [
            &b"not json"[..],
            br#"{"price":1,"timestamp_ms":1}"#,
            br#"{"sku":"","timestamp_ms":1}"#,
            br#"{"sku":"SKU-1","timestamp_ms":"soon"}"#,
        ] {
            let err = UpdateRecord::decode(Some(raw)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "payload {:?}", String::from_utf8_lossy(raw));
        }
        assert_eq!(UpdateRecord::decode(None).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn encoded_value_is_flat_json() {
        let value: serde_json::Value =
            serde_json::from_slice(&UpdateRecord::new("SKU-1", 102.0, 48, 1001).encode().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"sku": "SKU-1", "price": 102.0, "stock": 48, "timestamp_ms": 1001}));
    }
}
