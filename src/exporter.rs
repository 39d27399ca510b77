use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use resp::Connection;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::sync::Mutex;
use url::Url;

use crate::built_info::{BUILD_DATE, GIT_HASH, PKG_VERSION, RUSTC_VERSION};
use crate::clients::client_list_metrics;
use crate::config::Config;
use crate::info::{self, extract_info_metrics};
use crate::metric::Metric;
use crate::server_config::extract_config_metrics;
use crate::slowlog::slowlog_metrics;
use crate::tags;
use crate::tls;

const DEFAULT_PORT: u16 = 6666;
const CLIENT_NAME: &str = "kvrocks_exporter";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid address, {0}")]
    InvalidAddress(#[from] url::ParseError),

    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("host is required")]
    MissingHost,

    #[error("invalid tls server name {0:?}")]
    InvalidServerName(String),

    #[error(transparent)]
    Tls(#[from] tls::Error),

    #[error("invalid config reply, {0} elements is not a list of pairs")]
    InvalidConfig(usize),

    #[error(transparent)]
    Resp(#[from] resp::Error),
}

/// Where to scrape, credentials are kept apart from the uri so the uri can
/// be logged safely.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// the address without credentials
    pub uri: String,
    /// `rediss://`
    pub tls: bool,
}

impl Target {
    /// Addresses without a scheme are treated as `redis://`, `kvrocks://`
    /// is accepted as well and `rediss://` connects over TLS. The port
    /// defaults to 6666.
    pub fn parse(addr: &str) -> Result<Target, Error> {
        let mut url = if addr.contains("://") {
            Url::parse(addr)?
        } else {
            Url::parse(&format!("redis://{addr}"))?
        };

        let tls = match url.scheme() {
            "redis" | "kvrocks" => false,
            "rediss" => true,
            scheme => return Err(Error::UnsupportedScheme(scheme.to_string())),
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string(),
            _ => return Err(Error::MissingHost),
        };
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let username = Some(url.username())
            .filter(|name| !name.is_empty())
            .map(ToString::to_string);
        let password = url.password().map(ToString::to_string);

        // both fail only for cannot-be-a-base urls, which have no host
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Ok(Target {
            host,
            port,
            username,
            password,
            uri: url.to_string(),
            tls,
        })
    }
}

#[derive(Debug, Default)]
struct ScrapeDurations {
    count: u64,
    sum: f64,
}

pub struct Exporter {
    target: Target,
    config: Arc<Config>,
    password_map: Arc<BTreeMap<String, String>>,
    /// set for `rediss://` targets only
    client_tls: Option<Arc<ClientConfig>>,

    durations: Mutex<ScrapeDurations>,
    scrapes: AtomicU64,
    target_scrape_request_errors: AtomicU64,
}

impl Exporter {
    pub fn new(
        addr: &str,
        config: Arc<Config>,
        password_map: Arc<BTreeMap<String, String>>,
    ) -> Result<Self, Error> {
        Exporter::build(addr, config, password_map, None)
    }

    /// A fresh exporter for another target, sharing the options of this one
    pub fn with_target(&self, addr: &str) -> Result<Self, Error> {
        Exporter::build(
            addr,
            Arc::clone(&self.config),
            Arc::clone(&self.password_map),
            self.client_tls.clone(),
        )
    }

    fn build(
        addr: &str,
        config: Arc<Config>,
        password_map: Arc<BTreeMap<String, String>>,
        client_tls: Option<Arc<ClientConfig>>,
    ) -> Result<Self, Error> {
        let target = Target::parse(addr)?;
        let client_tls = if target.tls {
            match client_tls {
                Some(client_tls) => Some(client_tls),
                None => Some(Arc::new(tls::client_config(&config)?)),
            }
        } else {
            None
        };

        Ok(Exporter {
            target,
            config,
            password_map,
            client_tls,
            durations: Mutex::new(ScrapeDurations::default()),
            scrapes: AtomicU64::new(0),
            target_scrape_request_errors: AtomicU64::new(0),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn inc_target_scrape_request_errors(&self) {
        self.target_scrape_request_errors
            .fetch_add(1, Ordering::Relaxed);
    }

    /// The uri userinfo wins over the password file, which wins over the
    /// global password.
    fn password(&self) -> Option<&str> {
        if let Some(password) = &self.target.password {
            return Some(password);
        }

        let fallback = self.target.uri.replacen("kvrocks://", "redis://", 1);
        self.password_map
            .get(&self.target.uri)
            .or_else(|| self.password_map.get(&fallback))
            .map(String::as_str)
            .or(self.config.password.as_deref())
            .filter(|password| !password.is_empty())
    }

    /// Scrape the target once. Scrapes never fail, errors end up in `up` and
    /// `exporter_last_scrape_error`.
    pub async fn scrape(&self) -> Vec<Metric> {
        // one scrape at a time
        let mut durations = self.durations.lock().await;
        let scrapes = self.scrapes.fetch_add(1, Ordering::Relaxed) + 1;

        let start = Instant::now();
        let mut metrics = Vec::with_capacity(256);
        let (up, err) = match self.scrape_target(&mut metrics).await {
            Ok(()) => (1, String::new()),
            Err(err) => {
                warn!(
                    message = "scrape kvrocks failed",
                    target = %self.target.uri,
                    %err,
                );

                (0, err.to_string())
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        durations.count += 1;
        durations.sum += elapsed;

        metrics.extend([
            Metric::gauge_with_tags(
                "exporter_last_scrape_error",
                "The last scrape error status.",
                up == 0,
                tags!(
                    "err" => err,
                ),
            ),
            Metric::gauge("up", "Information about the kvrocks instance", up),
            Metric::gauge(
                "exporter_last_scrape_duration_seconds",
                "exporter_last_scrape_duration_seconds metric",
                elapsed,
            ),
            Metric::sum(
                "exporter_scrapes_total",
                "Current total kvrocks scrapes.",
                scrapes,
            ),
            Metric::summary(
                "exporter_scrape_duration_seconds",
                "Durations of scrapes by the exporter",
                durations.count,
                durations.sum,
                vec![],
            ),
            Metric::sum(
                "target_scrape_request_errors_total",
                "Errors in requests to the exporter",
                self.target_scrape_request_errors.load(Ordering::Relaxed),
            ),
        ]);

        if !self.config.kvrocks_metrics_only {
            metrics.push(Metric::gauge_with_tags(
                "exporter_build_info",
                "kvrocks exporter build_info",
                1,
                tags!(
                    "version" => PKG_VERSION,
                    "commit_sha" => GIT_HASH,
                    "build_date" => BUILD_DATE,
                    "rustc_version" => RUSTC_VERSION,
                ),
            ));
        }

        if !self.config.namespace.is_empty() {
            metrics.iter_mut().for_each(|m| {
                m.set_name(format!("{}_{}", self.config.namespace, m.name()));
            });
        }

        metrics
    }

    async fn scrape_target(&self, metrics: &mut Vec<Metric>) -> Result<(), Error> {
        let timeout = self.config.connection_timeout;

        let addr = (self.target.host.as_str(), self.target.port);
        let start = Instant::now();
        let result = match &self.client_tls {
            Some(client_tls) => {
                let server_name = ServerName::try_from(self.target.host.clone())
                    .map_err(|_err| Error::InvalidServerName(self.target.host.clone()))?;

                Connection::connect_tls(addr, server_name, Arc::clone(client_tls), timeout).await
            }
            None => Connection::connect(addr, timeout).await,
        };
        metrics.push(Metric::gauge(
            "exporter_last_scrape_connect_time_seconds",
            "exporter_last_scrape_connect_time_seconds metric",
            start.elapsed(),
        ));
        let mut conn = result?;

        debug!(
            message = "connected to kvrocks",
            target = %self.target.uri,
            elapsed = ?start.elapsed(),
        );

        if let Some(password) = self.password() {
            conn.auth(self.target.username.as_deref(), password).await?;
        }

        if self.config.ping_on_connect {
            let start = Instant::now();
            match conn.execute::<String>(&["PING"]).await {
                Ok(_) => metrics.push(Metric::gauge(
                    "exporter_last_scrape_ping_time_seconds",
                    "exporter_last_scrape_ping_time_seconds metric",
                    start.elapsed(),
                )),
                Err(err) => warn!(message = "PING kvrocks failed", %err),
            }
        }

        if self.config.set_client_name {
            if let Err(err) = conn.execute::<()>(&["CLIENT", "SETNAME", CLIENT_NAME]).await {
                warn!(message = "set client name failed", %err);
            }
        }

        let databases = match conn
            .execute::<Vec<String>>(&[self.config.config_command.as_str(), "GET", "*"])
            .await
        {
            Ok(config) => {
                let config = extract_config_metrics(&config)?;
                metrics.extend(config.metrics);
                config.databases
            }
            Err(err) => {
                debug!(
                    message = "get kvrocks config failed",
                    command = %self.config.config_command,
                    %err,
                );

                1
            }
        };

        let report = match conn.execute::<String>(&["INFO", "ALL"]).await {
            Ok(report) if !report.is_empty() => report,
            result => {
                if let Err(err) = result {
                    debug!(message = "INFO ALL failed, fallback to INFO", %err);
                }

                conn.execute::<String>(&["INFO"]).await?
            }
        };

        let options = info::Options {
            include_system_metrics: self.config.include_system_metrics,
        };
        metrics.extend(extract_info_metrics(
            &report,
            databases,
            &options,
            Utc::now(),
        ));

        match slowlog_metrics(&mut conn).await {
            Ok(partial) => metrics.extend(partial),
            Err(err) => warn!(message = "collect slowlog metrics failed", %err),
        }

        if self.config.export_client_list {
            match client_list_metrics(&mut conn, Utc::now(), self.config.export_client_port).await {
                Ok(partial) => metrics.extend(partial),
                Err(err) => warn!(message = "collect client list failed", %err),
            }
        }

        Ok(())
    }
}
