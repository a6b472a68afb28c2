//! gRPC surface of the gateway: prost messages plus tonic client and
//! server stubs for `sentra.Ingest` and `sentra.Query`.

mod messages;

pub use messages::*;

pub mod ingest {
    include!(concat!(env!("OUT_DIR"), "/sentra.Ingest.rs"));
}

pub mod query {
    include!(concat!(env!("OUT_DIR"), "/sentra.Query.rs"));
}

pub use ingest::ingest_client::IngestClient;
pub use ingest::ingest_server::{Ingest, IngestServer};
pub use query::query_client::QueryClient;
pub use query::query_server::{Query, QueryServer};
