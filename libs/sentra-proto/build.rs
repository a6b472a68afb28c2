//! Service stubs are generated from the Rust description below; the
//! messages are plain prost structs in `src/messages.rs`, so no `protoc`
//! is needed. Keep both in sync with `proto/sentra.proto`.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::MethodBuilder {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::{input}"))
        .output_type(format!("crate::{output}"))
        .codec_path(CODEC)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/sentra.proto");

    let ingest = Service::builder()
        .name("Ingest")
        .package("sentra")
        .method(method("health", "Health", "Empty", "Ack").build())
        .method(
            method("stream_updates", "StreamUpdates", "PriceUpdate", "Ack")
                .client_streaming()
                .build(),
        )
        .build();

    let query = Service::builder()
        .name("Query")
        .package("sentra")
        .method(method("get_price", "GetPrice", "PriceQuery", "PriceReply").build())
        .method(method("get_history", "GetHistory", "HistoryQuery", "HistoryReply").build())
        .build();

    Builder::new().compile(&[ingest, query]);
}
