use clap::Parser;
use std::path::PathBuf;

/// Server configuration parsed from command line arguments and environment
/// variables.
#[derive(Parser, Debug)]
#[command(name = "podsync-server")]
#[command(author, version, about = "Control-plane server for the podsync engine")]
pub struct ServerConfig {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Path to credentials.toml (API keys and quotas)
    #[arg(long, env = "PODSYNC_CREDENTIALS")]
    pub credentials_config: Option<PathBuf>,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bearer token protecting the mutating control endpoints.
    /// When unset, those endpoints are disabled.
    #[arg(long, env = "PODSYNC_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// Allowed CORS origins, comma separated ("*" for any)
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Rate limit: sustained requests per second per client
    #[arg(long, env = "RATE_LIMIT_RPS", default_value = "10")]
    pub rate_limit_rps: u32,

    /// Rate limit: burst size per client
    #[arg(long, env = "RATE_LIMIT_BURST", default_value = "30")]
    pub rate_limit_burst: u32,
}
