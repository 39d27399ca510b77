use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("read {path:?} failed, {err}")]
    Read { path: PathBuf, err: std::io::Error },

    #[error("decode config failed, {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("decode password file failed, {0}")]
    PasswordFile(#[from] serde_json::Error),

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid log format {0:?}, txt or json expected")]
    LogFormat(String),

    #[error("invalid listen address {0:?}")]
    ListenAddress(String),

    #[error("metrics path must start with '/' and must not be reserved, got {0:?}")]
    MetricsPath(String),

    #[error("{0} certificate and key must be set together")]
    TlsIdentity(&'static str),
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    #[serde(alias = "text")]
    Txt,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "txt" | "text" => Ok(LogFormat::Txt),
            "json" => Ok(LogFormat::Json),
            _ => Err(Error::LogFormat(s.to_string())),
        }
    }
}

pub const DEFAULT_ADDR: &str = "kvrocks://localhost:6666";
pub const DEFAULT_NAMESPACE: &str = "kvrocks";
pub const DEFAULT_LISTEN_ADDRESS: &str = ":9121";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_CONFIG_COMMAND: &str = "CONFIG";
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

const fn default_connection_timeout() -> Duration {
    DEFAULT_CONNECTION_TIMEOUT
}

const fn default_true() -> bool {
    true
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_string()
}

fn default_config_command() -> String {
    DEFAULT_CONFIG_COMMAND.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address of the kvrocks instance to scrape
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Password of the kvrocks instance
    #[serde(default)]
    pub password: Option<String>,

    /// JSON file with passwords per address, e.g. `{"redis://host:6666": "secret"}`
    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// Prefix of every metric name
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Address to listen on for web interface and telemetry
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path under which to expose metrics
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Name of the CONFIG command, some deployments rename it
    #[serde(default = "default_config_command")]
    pub config_command: String,

    /// Timeout for connection to kvrocks instance, and every command
    /// executed on it
    #[serde(
        default = "default_connection_timeout",
        with = "humanize::duration::serde"
    )]
    pub connection_timeout: Duration,

    #[serde(default = "default_true")]
    pub set_client_name: bool,

    #[serde(default)]
    pub ping_on_connect: bool,

    #[serde(default)]
    pub include_system_metrics: bool,

    #[serde(default)]
    pub export_client_list: bool,

    /// Add the port of clients to `connected_client_details`, this makes
    /// the cardinality a lot higher
    #[serde(default)]
    pub export_client_port: bool,

    /// Skip the build info of the exporter
    #[serde(default)]
    pub kvrocks_metrics_only: bool,

    /// Client certificate presented to `rediss://` targets
    #[serde(default)]
    pub tls_client_cert_file: Option<PathBuf>,

    #[serde(default)]
    pub tls_client_key_file: Option<PathBuf>,

    /// CA bundle to verify `rediss://` targets with, the system roots are
    /// used if not set
    #[serde(default)]
    pub tls_ca_cert_file: Option<PathBuf>,

    /// Serve the web interface over TLS when both are set
    #[serde(default)]
    pub tls_server_cert_file: Option<PathBuf>,

    #[serde(default)]
    pub tls_server_key_file: Option<PathBuf>,

    /// Accept any certificate the target presents
    #[serde(default)]
    pub skip_tls_verification: bool,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: default_addr(),
            password: None,
            password_file: None,
            namespace: default_namespace(),
            listen_address: default_listen_address(),
            metrics_path: default_metrics_path(),
            config_command: default_config_command(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            set_client_name: true,
            ping_on_connect: false,
            include_system_metrics: false,
            export_client_list: false,
            export_client_port: false,
            kvrocks_metrics_only: false,
            tls_client_cert_file: None,
            tls_client_key_file: None,
            tls_ca_cert_file: None,
            tls_server_cert_file: None,
            tls_server_key_file: None,
            skip_tls_verification: false,
            log_format: LogFormat::Txt,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        let content = std::fs::read_to_string(path).map_err(|err| Error::Read {
            path: path.to_path_buf(),
            err,
        })?;

        let mut config = serde_yaml::from_str::<Config>(&content)?;
        config.normalize();

        Ok(config)
    }

    /// Empty values fall back to defaults.
    pub fn normalize(&mut self) {
        if self.config_command.is_empty() {
            self.config_command = default_config_command();
        }

        if self.metrics_path.is_empty() {
            self.metrics_path = default_metrics_path();
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.metrics_path.starts_with('/')
            || matches!(self.metrics_path.as_str(), "/" | "/scrape" | "/health")
        {
            return Err(Error::MetricsPath(self.metrics_path.clone()));
        }

        self.listen_addr()?;

        if self.tls_client_cert_file.is_some() != self.tls_client_key_file.is_some() {
            return Err(Error::TlsIdentity("client"));
        }
        if self.tls_server_cert_file.is_some() != self.tls_server_key_file.is_some() {
            return Err(Error::TlsIdentity("server"));
        }

        Ok(())
    }

    /// Both the server certificate and key, if the web interface is served
    /// over TLS.
    pub fn tls_server_identity(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_server_cert_file, &self.tls_server_key_file) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    /// `:9121` listens on all interfaces.
    pub fn listen_addr(&self) -> Result<SocketAddr, Error> {
        let addr = if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        };

        addr.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| Error::ListenAddress(self.listen_address.clone()))
    }

    pub fn load_password_map(&self) -> Result<BTreeMap<String, String>, Error> {
        let Some(path) = &self.password_file else {
            return Ok(BTreeMap::new());
        };

        let content = std::fs::read(path).map_err(|err| Error::Read {
            path: path.clone(),
            err,
        })?;

        serde_json::from_slice(&content).map_err(Into::into)
    }
}
