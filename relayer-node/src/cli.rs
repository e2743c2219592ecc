use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Cross-chain atomic-swap resolver.
#[derive(Parser, Debug)]
#[command(name = "relayer-node", version, about)]
pub struct Args {
    /// Path to the TOML service configuration (spec.md §6.2).
    #[arg(long, default_value = "relayer.toml")]
    pub config: PathBuf,

    /// Directory for the sled-backed ingestion cursor database.
    #[arg(long, default_value = "relayer-data")]
    pub cursor_db: PathBuf,

    /// Bind address for the `/healthz` and `/metrics` endpoints.
    #[arg(long, default_value = "127.0.0.1:9100")]
    pub health_addr: SocketAddr,
}

impl Args {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
