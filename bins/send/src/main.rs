mod cmd;

use clap::{Args, Parser, Subcommand};

use cmd::error::SendError;
use cmd::send::SendOptions;
use sentra_proto::HistoryQuery;

#[derive(Parser)]
#[command(name = "sentra-send", about = "Test client for the sentra gateway")]
struct Cli {
    /// Gateway endpoint
    #[arg(long, global = true, default_value = "http://localhost:50051", env = "GATEWAY_ADDR")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a batch of updates on one call
    Send(SendArgs),
    /// Call Ingest/Health
    Health,
    /// Current price and stock of one SKU
    Get { sku: String },
    /// Stored rows of one SKU, oldest first
    History(HistoryArgs),
}

#[derive(Args)]
struct SendArgs {
    /// Number of updates
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Random walk over `--skus` products instead of the fixed batch
    #[arg(long)]
    random: bool,

    #[arg(long, default_value_t = 3)]
    skus: usize,

    /// Seed for the random walk (0 = current time)
    #[arg(long, default_value_t = 0)]
    seed: i64,
}

#[derive(Args)]
struct HistoryArgs {
    sku: String,

    /// Inclusive lower bound, ms since epoch
    #[arg(long)]
    from: Option<i64>,

    /// Exclusive upper bound, ms since epoch
    #[arg(long)]
    to: Option<i64>,

    #[arg(long)]
    limit: Option<u32>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SendError> {
    sentra_observability::init_logging()?;

    match cli.command {
        Commands::Send(args) => {
            let opts = SendOptions { count: args.count, random: args.random, skus: args.skus, seed: args.seed };
            cmd::send::send(&cli.addr, &opts).await
        }
        Commands::Health => cmd::send::health(&cli.addr).await,
        Commands::Get { sku } => cmd::send::get(&cli.addr, &sku).await,
        Commands::History(args) => {
            let query = HistoryQuery { sku: args.sku, from_ms: args.from, to_ms: args.to, limit: args.limit };
            cmd::send::history(&cli.addr, query).await
        }
    }
}
