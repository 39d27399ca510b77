use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use argh::FromArgs;
use exitcode::ExitCode;
use kvrocks_exporter::built_info::{GIT_HASH, PKG_VERSION, RUSTC_VERSION};
use kvrocks_exporter::config::{self, Config, LogFormat};
use kvrocks_exporter::exporter::Exporter;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    Some(value).filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Unparsable values fall back to the default.
fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => true,
            "0" | "f" | "false" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[derive(FromArgs)]
#[argh(
    description = "Prometheus exporter for kvrocks metrics",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'c',
        long = "config",
        description = "read configuration from a yaml file, flags are ignored when it is set"
    )]
    config: Option<PathBuf>,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_ADDR\", config::DEFAULT_ADDR)",
        description = "address of the kvrocks instance to scrape"
    )]
    addr: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_PASSWORD\", \"\")",
        description = "password of the kvrocks instance to scrape"
    )]
    password: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_PASSWORD_FILE\", \"\")",
        description = "json file with passwords per address"
    )]
    password_file: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_NAMESPACE\", config::DEFAULT_NAMESPACE)",
        description = "namespace for metrics"
    )]
    namespace: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_WEB_LISTEN_ADDRESS\", config::DEFAULT_LISTEN_ADDRESS)",
        description = "address to listen on for web interface and telemetry"
    )]
    web_listen_address: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_WEB_TELEMETRY_PATH\", config::DEFAULT_METRICS_PATH)",
        description = "path under which to expose metrics"
    )]
    web_telemetry_path: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_CONFIG_COMMAND\", config::DEFAULT_CONFIG_COMMAND)",
        description = "what to use for the CONFIG command"
    )]
    config_command: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_CONNECTION_TIMEOUT\", \"15s\")",
        description = "timeout for connection to kvrocks instance"
    )]
    connection_timeout: String,

    #[argh(
        option,
        default = "env_bool(\"KVROCKS_EXPORTER_SET_CLIENT_NAME\", true)",
        description = "whether to set client name to kvrocks_exporter"
    )]
    set_client_name: bool,

    #[argh(
        option,
        default = "env_bool(\"KVROCKS_EXPORTER_PING_ON_CONNECT\", false)",
        description = "whether to ping the kvrocks instance after connecting"
    )]
    ping_on_connect: bool,

    #[argh(
        option,
        default = "env_bool(\"KVROCKS_EXPORTER_INCL_SYSTEM_METRICS\", false)",
        description = "whether to include system metrics like total_system_memory_bytes"
    )]
    include_system_metrics: bool,

    #[argh(
        option,
        default = "env_bool(\"KVROCKS_EXPORTER_EXPORT_CLIENT_LIST\", false)",
        description = "whether to scrape CLIENT LIST specific metrics"
    )]
    export_client_list: bool,

    #[argh(
        option,
        default = "env_bool(\"KVROCKS_EXPORTER_EXPORT_CLIENT_PORT\", false)",
        description = "whether to include the client's port when exporting the client list"
    )]
    export_client_port: bool,

    #[argh(
        option,
        default = "env_bool(\"KVROCKS_EXPORTER_KVROCKS_METRICS_ONLY\", false)",
        description = "whether to skip the exporter's own build info"
    )]
    kvrocks_metrics_only: bool,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_TLS_CLIENT_KEY_FILE\", \"\")",
        description = "name of the client key file (including full path) if the server requires TLS client authentication"
    )]
    tls_client_key_file: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_TLS_CLIENT_CERT_FILE\", \"\")",
        description = "name of the client certificate file (including full path) if the server requires TLS client authentication"
    )]
    tls_client_cert_file: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_TLS_CA_CERT_FILE\", \"\")",
        description = "name of the CA certificate file (including full path) if the server requires TLS client authentication"
    )]
    tls_ca_cert_file: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_TLS_SERVER_KEY_FILE\", \"\")",
        description = "name of the server key file (including full path) if the web interface and telemetry should use TLS"
    )]
    tls_server_key_file: String,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_TLS_SERVER_CERT_FILE\", \"\")",
        description = "name of the server certificate file (including full path) if the web interface and telemetry should use TLS"
    )]
    tls_server_cert_file: String,

    #[argh(
        option,
        default = "env_bool(\"KVROCKS_EXPORTER_SKIP_TLS_VERIFICATION\", false)",
        description = "whether to skip TLS verification"
    )]
    skip_tls_verification: bool,

    #[argh(
        option,
        default = "env_or(\"KVROCKS_EXPORTER_LOG_FORMAT\", \"txt\")",
        description = "log format, txt or json"
    )]
    log_format: String,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level, KVROCKS_EXPORTER_LOG overrides it"
    )]
    log_level: String,

    #[argh(
        switch,
        description = "output verbose debug information, same as --log-level debug"
    )]
    debug: bool,
}

impl RootCommand {
    #![allow(clippy::print_stdout)]
    fn show_version(&self) {
        println!("kvrocks_exporter {} -- {}", PKG_VERSION, GIT_HASH);
        println!("rustc  {}", RUSTC_VERSION);
    }

    fn build_config(&self) -> Result<Config, config::Error> {
        if let Some(path) = &self.config {
            return Config::load(path);
        }

        let connection_timeout = humanize::duration::parse_duration(&self.connection_timeout)
            .map_err(|_err| config::Error::Duration(self.connection_timeout.clone()))?;
        let log_format = self.log_format.parse::<LogFormat>()?;
        let log_level = if self.debug || env_bool("KVROCKS_EXPORTER_DEBUG", false) {
            "debug".to_string()
        } else {
            self.log_level.clone()
        };

        let mut config = Config {
            addr: self.addr.clone(),
            password: Some(self.password.clone()).filter(|s| !s.is_empty()),
            password_file: non_empty_path(&self.password_file),
            namespace: self.namespace.clone(),
            listen_address: self.web_listen_address.clone(),
            metrics_path: self.web_telemetry_path.clone(),
            config_command: self.config_command.clone(),
            connection_timeout,
            set_client_name: self.set_client_name,
            ping_on_connect: self.ping_on_connect,
            include_system_metrics: self.include_system_metrics,
            export_client_list: self.export_client_list,
            export_client_port: self.export_client_port,
            kvrocks_metrics_only: self.kvrocks_metrics_only,
            tls_client_cert_file: non_empty_path(&self.tls_client_cert_file),
            tls_client_key_file: non_empty_path(&self.tls_client_key_file),
            tls_ca_cert_file: non_empty_path(&self.tls_ca_cert_file),
            tls_server_cert_file: non_empty_path(&self.tls_server_cert_file),
            tls_server_key_file: non_empty_path(&self.tls_server_key_file),
            skip_tls_verification: self.skip_tls_verification,
            log_format,
            log_level,
        };
        config.normalize();

        Ok(config)
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        let color = std::io::stdout().is_terminal();
        let config = match self.build_config() {
            Ok(config) => config,
            Err(err) => {
                kvrocks_exporter::trace::init(color, LogFormat::Txt, "info");
                return Err(handle_config_error(err));
            }
        };

        let log_level = std::env::var("KVROCKS_EXPORTER_LOG").unwrap_or(config.log_level.clone());
        kvrocks_exporter::trace::init(color, config.log_format, &log_level);

        config.validate().map_err(handle_config_error)?;
        let listen_addr = config.listen_addr().map_err(handle_config_error)?;
        let password_map = config.load_password_map().map_err(handle_config_error)?;

        let exporter = Exporter::new(&config.addr, Arc::new(config.clone()), Arc::new(password_map))
            .map_err(|err| {
                error!(message = "invalid kvrocks address", addr = %config.addr, %err);
                exitcode::CONFIG
            })?;

        // `/scrape` may ask for a rediss target at any time
        if config.tls_client_cert_file.is_some() || config.tls_ca_cert_file.is_some() {
            kvrocks_exporter::tls::client_config(&config).map_err(|err| {
                error!(message = "load client tls config failed", %err);
                exitcode::CONFIG
            })?;
        }

        let acceptor = match config.tls_server_identity() {
            Some((cert, key)) => {
                let server_config =
                    kvrocks_exporter::tls::server_config(cert, key).map_err(|err| {
                        error!(message = "load server tls config failed", %err);
                        exitcode::CONFIG
                    })?;

                Some(TlsAcceptor::from(Arc::new(server_config)))
            }
            None => None,
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("kvrocks-exporter-worker")
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build tokio runtime failed", %err);
                exitcode::OSERR
            })?;

        let result = runtime.block_on(async move {
            let listener = TcpListener::bind(listen_addr).await.map_err(|err| {
                error!(message = "bind listen address failed", %listen_addr, %err);
                exitcode::UNAVAILABLE
            })?;

            info!(
                message = "start kvrocks exporter",
                version = PKG_VERSION,
                commit = GIT_HASH,
                %listen_addr,
                metrics_path = %config.metrics_path,
                target = %exporter.target().uri,
                tls = acceptor.is_some(),
            );

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let server = tokio::spawn(kvrocks_exporter::http::serve(
                listener,
                acceptor,
                Arc::new(exporter),
                shutdown_rx,
            ));

            wait_for_signal().await;
            info!(message = "shutdown signal received");

            let _ = shutdown_tx.send(true);
            if let Err(err) = server.await {
                error!(message = "http server crashed", %err);
            }

            Ok::<(), ExitCode>(())
        });

        runtime.shutdown_timeout(Duration::from_secs(5));

        result
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!(message = "install SIGTERM handler failed", %err);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn handle_config_error(err: config::Error) -> ExitCode {
    error!(message = "configuration error", %err);

    exitcode::CONFIG
}
