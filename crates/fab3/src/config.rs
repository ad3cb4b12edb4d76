//! Command line and network profile configuration of the gateway.

use std::{
    collections::HashMap,
    fs,
    net::{
        Ipv4Addr,
        SocketAddr,
    },
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use fabric_protos::{
    certificate_to_address,
    serialize_identity,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;

use crate::{
    client::InProcessLedger,
    eth::EthService,
    filters::FilterRegistry,
    server::{
        Fab3Server,
        Gateway,
    },
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Ethereum JSON-RPC gateway for the EVM chaincode", long_about = None)]
pub struct Config {
    /// Path to the network profile
    #[arg(short = 'c', long = "config", env = "FAB3_CONFIG")]
    pub config: Option<PathBuf>,
    /// User identity submitting transactions
    #[arg(short = 'u', long, env = "FAB3_USER")]
    pub user: Option<String>,
    /// Organization of the user
    #[arg(short = 'o', long, env = "FAB3_ORG")]
    pub org: Option<String>,
    /// Channel hosting the EVM chaincode
    #[arg(short = 'C', long, env = "FAB3_CHANNEL")]
    pub channel: Option<String>,
    /// Chaincode id of the EVM chaincode
    #[arg(short = 'i', long, env = "FAB3_CCID", default_value = "evmcc")]
    pub ccid: String,
    /// Port the JSON-RPC server listens on
    #[arg(short = 'p', long, env = "FAB3_PORT", default_value = "5000")]
    pub port: u16,
    /// Seconds an unpolled filter survives, at least one
    #[arg(
        long,
        env = "FAB3_FILTER_TTL_SECS",
        default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub filter_ttl_secs: u64,
    /// Log level, `RUST_LOG` takes precedence
    #[arg(long, env = "FAB3_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

/// Required settings, checked after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub config: PathBuf,
    pub user: String,
    pub org: String,
    pub channel: String,
    pub ccid: String,
    pub port: u16,
    pub filter_ttl: Duration,
}

impl Config {
    /// Checks that every required value was given by flag or environment.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        Ok(ValidatedConfig {
            config: required(self.config.clone(), "config")?,
            user: required(self.user.clone(), "user")?,
            org: required(self.org.clone(), "org")?,
            channel: required(self.channel.clone(), "channel")?,
            ccid: self.ccid.clone(),
            port: self.port,
            filter_ttl: Duration::from_secs(self.filter_ttl_secs),
        })
    }
}

impl ValidatedConfig {
    /// Loads the identity, opens the ledger and binds the listener.
    pub async fn build(self) -> anyhow::Result<Fab3Server> {
        let profile = NetworkProfile::from_file(&self.config)?;
        let creator = profile.identity(&self.org, &self.user)?;
        tracing::info!(org = %self.org, user = %self.user, "Loaded identity");

        let ledger = Arc::new(InProcessLedger::new(
            self.channel.as_str(),
            self.ccid.as_str(),
            creator,
        )?);
        let eth = EthService::new(
            ledger.clone(),
            ledger,
            self.ccid,
            FilterRegistry::new(self.filter_ttl),
        );

        let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let listener = TcpListener::bind(listen_addr).await?;
        tracing::info!(%listen_addr, channel = %self.channel, "Listening on address");

        Ok(Fab3Server {
            listener,
            gateway: Gateway::new(eth),
        })
    }
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing(name))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {0}. Please use flag --{0} or set FAB3_{upper}", upper = .0.to_uppercase())]
    Missing(&'static str),
    #[error("{0}")]
    ReadError(String),
    #[error("{0}")]
    ParseError(String),
    #[error("organization {0} not found in the network profile")]
    UnknownOrg(String),
    #[error("user {user} not found in organization {org}")]
    UnknownUser { org: String, user: String },
    #[error("user {0} has neither certificate nor certificatePath")]
    MissingCertificate(String),
    #[error("unusable certificate for user {user}: {source}")]
    Identity {
        user: String,
        #[source]
        source: fabric_protos::IdentityError,
    },
}

/// Network profile naming the organizations and users the gateway may act as.
///
/// ```json
/// {
///   "organizations": {
///     "Org1": {
///       "mspid": "Org1MSP",
///       "users": {
///         "User1": { "certificatePath": "users/User1/cert.pem" }
///       }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkProfile {
    #[serde(default)]
    pub organizations: HashMap<String, Organization>,
    /// Directory relative certificate paths resolve against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub mspid: String,
    #[serde(default)]
    pub users: HashMap<String, User>,
}

/// A user certificate, inline PEM or a path to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub certificate: Option<String>,
    pub certificate_path: Option<PathBuf>,
}

impl NetworkProfile {
    /// Load a profile from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadError(format!("Failed to read {}: {e}", path.display()))
        })?;

        let mut profile: Self = serde_json::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("Failed to parse {}: {e}", path.display()))
        })?;
        profile.base_dir = path.parent().map(Path::to_path_buf);
        Ok(profile)
    }

    /// Serialized identity of `user` in `org`, the creator of every
    /// transaction the gateway submits.
    pub fn identity(&self, org: &str, user: &str) -> Result<Vec<u8>, ConfigError> {
        let organization = self
            .organizations
            .get(org)
            .ok_or_else(|| ConfigError::UnknownOrg(org.to_string()))?;
        let entry = organization
            .users
            .get(user)
            .ok_or_else(|| {
                ConfigError::UnknownUser {
                    org: org.to_string(),
                    user: user.to_string(),
                }
            })?;

        let pem = match (&entry.certificate, &entry.certificate_path) {
            (Some(pem), _) => pem.clone().into_bytes(),
            (None, Some(path)) => {
                let path = match &self.base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.clone(),
                };
                fs::read(&path).map_err(|e| {
                    ConfigError::ReadError(format!("Failed to read {}: {e}", path.display()))
                })?
            }
            (None, None) => return Err(ConfigError::MissingCertificate(user.to_string())),
        };

        certificate_to_address(&pem).map_err(|source| {
            ConfigError::Identity {
                user: user.to_string(),
                source,
            }
        })?;
        Ok(serialize_identity(&organization.mspid, &pem))
    }
}

impl FromStr for NetworkProfile {
    type Err = ConfigError;

    /// Load a profile from a JSON string
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {e}")))
    }
}
