use std::path::PathBuf;

use clap::Parser;

/// Keeps a git working copy in sync with its remote branch, driven by GitHub
/// push webhooks.
#[derive(Debug, Parser)]
#[command(version)]
pub struct CliArgs {
    /// Directory under which the repository is checked out
    pub path: Option<PathBuf>,
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
    /// Port to listen on [default: 9090]
    #[arg(short = 'P', long)]
    pub port: Option<u16>,
    /// Address to listen on [default: localhost]
    #[arg(short = 'H', long)]
    pub host: Option<String>,
    /// Url of the repository to keep in sync
    #[arg(short, long)]
    pub repo_url: Option<String>,
    /// Branch or commit to check out [default: master]
    #[arg(short = 'b', long)]
    pub repo_branch: Option<String>,
    /// Shared secret used to verify webhook signatures
    #[arg(short = 'S', long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
    /// Path of the webhook endpoint [default: /postreceive]
    #[arg(short, long)]
    pub endpoint: Option<String>,
    /// Command to run after every push to the tracked branch
    #[arg(short, long)]
    pub command: Option<String>,
    /// Comma separated host:port list of instances to relay webhooks to
    #[arg(short = 'B', long, value_delimiter = ',')]
    pub broadcast: Vec<String>,
    /// Timeout in seconds of each relayed request [default: 10]
    #[arg(long)]
    pub forward_timeout: Option<u64>,
    /// TOML config file
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,
}
