//! Wire messages of `proto/sentra.proto`.

use sentra_api::{IncomingUpdate, UpdateRecord};

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Ack {
    #[prost(bool, tag = "1")]
    pub ok: bool,
    #[prost(string, tag = "2")]
    pub msg: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PriceUpdate {
    #[prost(string, tag = "1")]
    pub sku: String,
    #[prost(double, tag = "2")]
    pub price: f64,
    #[prost(int32, tag = "3")]
    pub stock: i32,
    /// Unset means "no timestamp"; such updates are not ingested.
    #[prost(int64, optional, tag = "4")]
    pub ts_ms: Option<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PriceQuery {
    #[prost(string, tag = "1")]
    pub sku: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PriceData {
    #[prost(string, tag = "1")]
    pub sku: String,
    #[prost(double, tag = "2")]
    pub price: f64,
    #[prost(int32, tag = "3")]
    pub stock: i32,
    #[prost(int64, tag = "4")]
    pub ts_ms: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PriceReply {
    #[prost(bool, tag = "1")]
    pub ok: bool,
    #[prost(message, optional, tag = "2")]
    pub data: Option<PriceData>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HistoryQuery {
    #[prost(string, tag = "1")]
    pub sku: String,
    #[prost(int64, optional, tag = "2")]
    pub from_ms: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub to_ms: Option<i64>,
    #[prost(uint32, optional, tag = "4")]
    pub limit: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HistoryReply {
    #[prost(message, repeated, tag = "1")]
    pub rows: Vec<PriceData>,
}

impl Ack {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self { ok: true, msg: msg.into() }
    }
}

impl From<PriceUpdate> for IncomingUpdate {
    fn from(u: PriceUpdate) -> Self {
        IncomingUpdate { sku: u.sku, price: u.price, stock: u.stock, timestamp_ms: u.ts_ms }
    }
}

impl From<UpdateRecord> for PriceData {
    fn from(r: UpdateRecord) -> Self {
        PriceData { sku: r.sku, price: r.price, stock: r.stock, ts_ms: r.timestamp_ms }
    }
}

impl From<HistoryQuery> for sentra_api::HistoryQuery {
    fn from(q: HistoryQuery) -> Self {
        sentra_api::HistoryQuery {
            sku: q.sku,
            from_ms: q.from_ms,
            to_ms: q.to_ms,
            limit: q.limit.map(|l| l as usize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn unset_timestamp_survives_the_wire() {
        let update = PriceUpdate { sku: "SKU-1".into(), price: 5.0, stock: 5, ts_ms: None };
        let decoded = PriceUpdate::decode(update.encode_to_vec().as_slice()).unwrap();
        assert_eq!(IncomingUpdate::from(decoded).timestamp_ms, None);

        let zero = PriceUpdate { ts_ms: Some(0), ..update };
        let decoded = PriceUpdate::decode(zero.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.ts_ms, Some(0));
    }
}
