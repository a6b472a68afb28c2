use sentra_api::now_ms;
use sentra_proto::{Empty, HistoryQuery, IngestClient, PriceQuery, QueryClient};

use super::domain::{fixed_batch, RandomWalk};
use super::error::SendError;

pub struct SendOptions {
    pub count: usize,
    pub random: bool,
    pub skus: usize,
    pub seed: i64,
}

/// Stream one batch of updates on a single call and print the ack.
pub async fn send(addr: &str, opts: &SendOptions) -> Result<(), SendError> {
    if opts.count == 0 {
        return Err(SendError::Config("--count must be at least 1".into()));
    }
    let now = now_ms();
    let updates = if opts.random {
        RandomWalk::new(opts.skus, opts.seed).batch(opts.count, now)
    } else {
        fixed_batch(opts.count, now)
    };

    let mut client = IngestClient::connect(addr.to_string()).await?;
    tracing::info!(%addr, count = updates.len(), random = opts.random, "streaming updates");
    let ack = client.stream_updates(tokio_stream::iter(updates)).await?.into_inner();
    println!("Ack: ok={} msg={:?}", ack.ok, ack.msg);
    Ok(())
}

pub async fn health(addr: &str) -> Result<(), SendError> {
    let mut client = IngestClient::connect(addr.to_string()).await?;
    let ack = client.health(Empty {}).await?.into_inner();
    println!("Health: ok={} msg={:?}", ack.ok, ack.msg);
    Ok(())
}

pub async fn get(addr: &str, sku: &str) -> Result<(), SendError> {
    let mut client = QueryClient::connect(addr.to_string()).await?;
    let reply = client.get_price(PriceQuery { sku: sku.to_string() }).await?.into_inner();
    match reply.data {
        Some(d) => println!("{} price={} stock={} ts_ms={}", d.sku, d.price, d.stock, d.ts_ms),
        None => println!("{sku}: no data"),
    }
    Ok(())
}

pub async fn history(addr: &str, query: HistoryQuery) -> Result<(), SendError> {
    let mut client = QueryClient::connect(addr.to_string()).await?;
    let reply = client.get_history(query).await?.into_inner();
    for row in &reply.rows {
        println!("{} {} price={} stock={}", row.ts_ms, row.sku, row.price, row.stock);
    }
    println!("{} rows", reply.rows.len());
    Ok(())
}
