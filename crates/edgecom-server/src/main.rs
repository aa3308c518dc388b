use anyhow::Result;
use clap::Parser;
use edgecom_server::config::{AppConfig, ConfigOverrides};
use edgecom_server::logging::init_logging;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (defaults to ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port
    #[arg(long)]
    port: Option<u16>,

    /// Response cache capacity
    #[arg(long)]
    cache_size: Option<usize>,

    /// Sustained request rate (requests per second)
    #[arg(long)]
    rate_limit: Option<f64>,

    /// Rate limiter burst size
    #[arg(long)]
    rate_limit_burst: Option<u32>,

    /// Database connection string
    #[arg(long)]
    conn_string: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            cache_size: self.cache_size,
            rate_limit: self.rate_limit,
            rate_limit_burst: self.rate_limit_burst,
            conn_string: self.conn_string.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?.apply_overrides(args.overrides());
    config.validate()?;
    init_logging(&config.logging)?;

    tracing::info!(
        port = config.server.port,
        cache_capacity = config.cache.capacity,
        rate = config.rate_limit.rate,
        burst = config.rate_limit.burst,
        "Starting EdgeCom time-series service"
    );

    let signal = edgecom_server::run(config).await?;
    let exit_code = signal.exit_code();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
