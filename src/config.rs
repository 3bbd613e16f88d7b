use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::bail;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{
    cli::args::CliArgs,
    webhook::{forward::DEFAULT_FORWARD_TIMEOUT, DEFAULT_ENDPOINT},
};

const DEFAULT_VERSION: &str = "master";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 9090;

/// Effective settings, after merging command line, environment and config file.
#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    pub repo_url: String,
    pub version: String,
    /// Directory the working copy is created under.
    pub path: PathBuf,
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub secret: Option<String>,
    pub broadcast: Vec<String>,
    pub forward_timeout: Duration,
    pub command: Option<String>,
}

impl Settings {
    pub fn load(args: &CliArgs) -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(args.config.as_deref(), None)?;
        Self::merge(args, raw_config)
    }

    fn merge(args: &CliArgs, raw_config: RawConfig) -> anyhow::Result<Self> {
        let RawConfig {
            repo,
            server,
            webhook,
            action,
        } = raw_config;

        let Some(repo_url) = args.repo_url.clone().or(repo.url) else {
            bail!("No repository url given, use --repo-url or HOOKSYNC_REPO_URL");
        };
        let Some(path) = args.path.clone().or(repo.path) else {
            bail!("No local path given, pass it as an argument or use HOOKSYNC_REPO_PATH");
        };

        let broadcast = if args.broadcast.is_empty() {
            webhook.broadcast.map(Peers::into_vec).unwrap_or_default()
        } else {
            args.broadcast.clone()
        };

        Ok(Self {
            repo_url,
            version: args
                .repo_branch
                .clone()
                .or(repo.version)
                .unwrap_or_else(|| DEFAULT_VERSION.to_owned()),
            path,
            host: args
                .host
                .clone()
                .or(server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: args.port.or(server.port).unwrap_or(DEFAULT_PORT),
            endpoint: args
                .endpoint
                .clone()
                .or(webhook.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
            secret: args
                .secret
                .clone()
                .or(webhook.secret)
                .filter(|secret| !secret.is_empty()),
            broadcast,
            forward_timeout: args
                .forward_timeout
                .or(webhook.timeout)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FORWARD_TIMEOUT),
            command: args.command.clone().or(action.command),
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    repo: RepoConfig,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    webhook: WebhookConfig,
    #[serde(default)]
    action: ActionConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RepoConfig {
    url: Option<String>,
    version: Option<String>,
    path: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ServerConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct WebhookConfig {
    endpoint: Option<String>,
    secret: Option<String>,
    broadcast: Option<Peers>,
    /// Seconds.
    timeout: Option<u64>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ActionConfig {
    command: Option<String>,
}

/// A TOML list, or a comma separated string when coming from the environment.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
enum Peers {
    List(Vec<String>),
    Joined(String),
}

impl Peers {
    fn into_vec(self) -> Vec<String> {
        match self {
            Peers::List(peers) => peers,
            Peers::Joined(peers) => peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl RawConfig {
    fn load(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml));
        }
        builder
            .add_source(
                Environment::with_prefix("HOOKSYNC")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
