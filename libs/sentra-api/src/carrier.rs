//! Trace carrier: the flat string map that moves trace context across the
//! log boundary as record headers.

use std::collections::BTreeMap;

use opentelemetry::propagation::{Extractor, Injector};

/// String-keyed header map carrying serialized trace context.
///
/// Keys are stored verbatim so the key set survives a round trip through
/// the log unchanged. Lookup falls back to ASCII case-insensitive matching
/// for headers written by producers that normalize case differently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceCarrier {
    entries: BTreeMap<String, String>,
}

impl TraceCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a carrier from raw log headers. Binary values are decoded as
    /// (lossy) UTF-8; a header without a value becomes an empty string.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
    {
        let entries = headers
            .into_iter()
            .map(|(key, value)| {
                let value = value
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .unwrap_or_default();
                (key.to_string(), value)
            })
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(v) = self.entries.get(key) {
            return Some(v.as_str());
        }
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Injector for TraceCarrier {
    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }
}

impl Extractor for TraceCarrier {
    fn get(&self, key: &str) -> Option<&str> {
        TraceCarrier::get(self, key)
    }

    fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TraceCarrier {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bytes_decode_to_strings() {
        let headers: Vec<(&str, Option<&[u8]>)> = vec![
            ("traceparent", Some(&b"00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"[..])),
            ("tracestate", None),
        ];
        let carrier = TraceCarrier::from_headers(headers);
        assert_eq!(carrier.len(), 2);
        assert_eq!(
            carrier.get("traceparent"),
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
        );
        assert_eq!(carrier.get("tracestate"), Some(""));
    }

    #[test]
    fn lookup_is_case_insensitive_but_keys_are_verbatim() {
        let carrier: TraceCarrier = [("TraceParent", "x")].into_iter().collect();
        assert_eq!(carrier.get("traceparent"), Some("x"));
        assert_eq!(Extractor::keys(&carrier), vec!["TraceParent"]);
    }

    #[test]
    fn round_trips_through_header_pairs() {
        let mut carrier = TraceCarrier::new();
        carrier.insert("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01");
        carrier.insert("baggage", "tenant=acme");

        let wire: Vec<(String, Vec<u8>)> = carrier
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        let back = TraceCarrier::from_headers(wire.iter().map(|(k, v)| (k.as_str(), Some(v.as_slice()))));
        assert_eq!(back, carrier);
    }
}
