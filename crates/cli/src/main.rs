use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};
use tradegate_core::Timeframe;
use tradegate_gateway::{ExchangeGateway, GatewayConfig};

const DEFAULT_CONFIG_PATH: &str = "tradegate.toml";

#[derive(Parser)]
#[command(name = "tradegate")]
#[command(about = "Unified HTTP gateway for exchange market data and trading")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file. `tradegate.toml` is used when present.
    #[arg(short, long, env = "TRADEGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Server {
        /// Bind address (defaults to `[server] bind`)
        #[arg(short, long, env = "TRADEGATE_BIND")]
        bind: Option<String>,
    },

    /// List supported exchanges
    Exchanges,

    /// Print a ticker snapshot
    Price {
        #[arg(short, long)]
        exchange: String,

        /// Base asset (e.g. "BTC")
        #[arg(short, long)]
        base: String,

        /// Quote asset (e.g. "USDT")
        #[arg(short, long)]
        quote: String,
    },

    /// Print recent candles, oldest first
    Ohlcv {
        #[arg(short, long)]
        exchange: String,

        #[arg(short, long)]
        base: String,

        #[arg(short, long)]
        quote: String,

        /// Candle width (e.g. "1m", "4h", "1d")
        #[arg(short, long, default_value = "1m")]
        timeframe: Timeframe,

        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            GatewayConfig::load(Path::new(DEFAULT_CONFIG_PATH))
                .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH))
        }
        None => Ok(GatewayConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let gateway =
        ExchangeGateway::from_config(&config).context("Failed to set up exchange clients")?;

    match cli.command {
        Commands::Server { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            tracing::info!(
                exchanges = ?gateway.registry().supported(),
                timeout_ms = gateway.timeout().as_millis() as u64,
                cache_clients = gateway.caching_enabled(),
                "Starting gateway"
            );
            tradegate_api::start_server(gateway, &bind).await?;
        }
        Commands::Exchanges => {
            println!("Supported exchanges:");
            for id in gateway.registry().supported() {
                println!("  {}", id);
            }
        }
        Commands::Price {
            exchange,
            base,
            quote,
        } => {
            let summary = gateway
                .get_price(&exchange, &base, &quote)
                .await
                .context("Price lookup failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Ohlcv {
            exchange,
            base,
            quote,
            timeframe,
            limit,
        } => {
            let candles = gateway
                .get_ohlcv(&exchange, &base, &quote, timeframe, limit)
                .await
                .context("Candle lookup failed")?;
            println!(
                "{:<14} {:>14} {:>14} {:>14} {:>14} {:>16}",
                "timestamp", "open", "high", "low", "close", "volume"
            );
            for c in candles {
                println!(
                    "{:<14} {:>14} {:>14} {:>14} {:>14} {:>16}",
                    c.timestamp, c.open, c.high, c.low, c.close, c.volume
                );
            }
        }
    }

    Ok(())
}
