use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kvrocks_exporter::config::Config;
use kvrocks_exporter::encoding::encode;
use kvrocks_exporter::exporter::Exporter;
use kvrocks_exporter::tls;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

const INFO: &str = include_str!("kvrocks/info.txt");
const PASSWORD: &str = "secret";

fn bulk(s: &str) -> String {
    format!("${}\r\n{}\r\n", s.len(), s)
}

fn array(items: &[&str]) -> String {
    let mut out = format!("*{}\r\n", items.len());
    for item in items {
        out.push_str(&bulk(item));
    }
    out
}

/// Pop one complete command from the front of `buf`.
fn take_command(buf: &mut Vec<u8>) -> Option<Vec<String>> {
    let text = std::str::from_utf8(buf).ok()?;
    let mut lines = text.split("\r\n");

    let count = lines.next()?.strip_prefix('*')?.parse::<usize>().ok()?;
    let mut consumed = text.find("\r\n")? + 2;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let len = lines.next()?.strip_prefix('$')?.parse::<usize>().ok()?;
        let arg = lines.next()?;
        if arg.len() != len {
            return None;
        }

        consumed += len.to_string().len() + 3 + len + 2;
        args.push(arg.to_string());
    }

    // the trailing CRLF of the last argument is not here yet
    if consumed > buf.len() {
        return None;
    }

    buf.drain(..consumed);
    Some(args)
}

fn reply(args: &[String], authed: &mut bool) -> String {
    let upper = args.iter().map(|s| s.to_uppercase()).collect::<Vec<_>>();
    let upper = upper.iter().map(String::as_str).collect::<Vec<_>>();

    if let ["AUTH", ..] = upper.as_slice() {
        return if args.last().map(String::as_str) == Some(PASSWORD) {
            *authed = true;
            "+OK\r\n".to_string()
        } else {
            "-ERR invalid password\r\n".to_string()
        };
    }

    if !*authed {
        return "-NOAUTH Authentication required.\r\n".to_string();
    }

    match upper.as_slice() {
        ["PING"] => "+PONG\r\n".to_string(),
        ["CLIENT", "SETNAME", _] => "+OK\r\n".to_string(),
        ["CLIENT", "LIST"] => bulk(
            "id=3 addr=127.0.0.1:51234 fd=9 name=kvrocks_exporter age=2 idle=0 flags=N namespace=__namespace qbuf=26 obuf=0 cmd=client\n\
             id=7 addr=10.0.0.8:40100 fd=10 name= age=120 idle=3 flags=N namespace=__namespace qbuf=0 obuf=0 cmd=get\n",
        ),
        ["CONFIG", "GET", "*"] => array(&["maxclients", "10000", "databases", "2", "dir", "/data"]),
        ["INFO", "ALL"] => "$-1\r\n".to_string(),
        ["INFO"] => bulk(INFO),
        ["SLOWLOG", "LEN"] => ":3\r\n".to_string(),
        ["SLOWLOG", "GET", "1"] => format!(
            "*1\r\n*6\r\n:14\r\n:1309448221\r\n:1500\r\n{}{}{}",
            array(&["ping"]),
            bulk("127.0.0.1:58217"),
            bulk(""),
        ),
        _ => format!("-ERR unknown command '{}'\r\n", args[0]),
    }
}

async fn serve_conn<S: AsyncRead + AsyncWrite + Unpin>(mut conn: S) {
    let mut authed = false;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match conn.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        while let Some(args) = take_command(&mut buf) {
            let resp = reply(&args, &mut authed);
            if conn.write_all(resp.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

async fn fake_kvrocks() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((conn, _peer)) = listener.accept().await {
            tokio::spawn(serve_conn(conn));
        }
    });

    addr
}

fn tls_fixture(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/tls")
        .join(name)
}

/// Like `fake_kvrocks`, but every connection has to complete a TLS
/// handshake first.
async fn fake_kvrocks_tls(server_config: ServerConfig) -> SocketAddr {
    let acceptor = TlsAcceptor::from(Arc::new(server_config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((conn, _peer)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(conn) = acceptor.accept(conn).await {
                    serve_conn(conn).await;
                }
            });
        }
    });

    addr
}

fn tls_server_config() -> ServerConfig {
    tls::server_config(&tls_fixture("server.crt"), &tls_fixture("server.key")).unwrap()
}

/// Requires a client certificate signed by the test CA
fn mutual_tls_server_config() -> ServerConfig {
    use rustls::RootCertStore;
    use rustls::server::WebPkiClientVerifier;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = RootCertStore::empty();
    for cert in tls::load_certs(&tls_fixture("ca.crt")).unwrap() {
        roots.add(cert).unwrap();
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()
        .unwrap();

    ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(
            tls::load_certs(&tls_fixture("server.crt")).unwrap(),
            tls::load_private_key(&tls_fixture("server.key")).unwrap(),
        )
        .unwrap()
}

fn scrape_config() -> Config {
    Config {
        connection_timeout: Duration::from_secs(5),
        ping_on_connect: true,
        export_client_list: true,
        ..Default::default()
    }
}

async fn scrape_text(exporter: &Exporter) -> String {
    let metrics = exporter.scrape().await;
    let mut text = String::new();
    encode(&mut text, &metrics).unwrap();
    text
}

#[tokio::test]
async fn scrape_fake_kvrocks() {
    let addr = fake_kvrocks().await;
    let exporter = Exporter::new(
        &format!("redis://:{PASSWORD}@{addr}"),
        Arc::new(scrape_config()),
        Arc::new(BTreeMap::new()),
    )
    .unwrap();

    let text = scrape_text(&exporter).await;
    for want in [
        "kvrocks_up 1\n",
        "kvrocks_exporter_last_scrape_error{err=\"\"} 0\n",
        "kvrocks_config_maxclients 10000\n",
        "kvrocks_connected_clients 3\n",
        "kvrocks_memory_used_bytes 20971520\n",
        "kvrocks_commands_processed_total 9841\n",
        "kvrocks_db_keys{db=\"db0\"} 1024\n",
        "kvrocks_db_keys{db=\"db1\"} 0\n",
        "kvrocks_db_avg_ttl_seconds{db=\"db0\"} 36\n",
        "kvrocks_connected_slave_offset_bytes{slave_ip=\"10.0.0.12\",slave_port=\"6666\",slave_state=\"online\"} 4521\n",
        "kvrocks_commands_total{cmd=\"get\"} 1192\n",
        "kvrocks_commands_duration_seconds_bucket{cmd=\"get\",le=\"0.00001\"} 1191\n",
        "kvrocks_commands_duration_seconds_bucket{cmd=\"get\",le=\"+Inf\"} 1192\n",
        "kvrocks_commands_duration_seconds_count{cmd=\"get\"} 1192\n",
        "kvrocks_estimate_keys{column_family=\"metadata\"} 1024\n",
        "kvrocks_block_cache_usage{column_family=\"-\"} 8388608\n",
        "kvrocks_slowlog_length 3\n",
        "kvrocks_slowlog_last_id 14\n",
        "kvrocks_last_slow_execution_duration_seconds 0.0015\n",
        "kvrocks_exporter_scrapes_total 1\n",
        "# TYPE kvrocks_exporter_scrape_duration_seconds summary\n",
        "kvrocks_exporter_scrape_duration_seconds_count 1\n",
    ] {
        assert!(text.contains(want), "{want:?} not found in\n{text}");
    }

    assert!(text.contains("# TYPE kvrocks_exporter_last_scrape_ping_time_seconds gauge\n"));
    assert!(text.contains("kvrocks_instance_info{role=\"master\",version=\"2.8.0\""));
    assert_eq!(
        text.matches("kvrocks_connected_client_details{").count(),
        2,
        "{text}"
    );
    assert!(!text.contains("port=\"51234\""));

    // system metrics are excluded by default
    assert!(!text.contains("total_system_memory"));

    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_exporter_scrapes_total 2\n"));
    assert!(text.contains("kvrocks_exporter_scrape_duration_seconds_count 2\n"));
}

#[tokio::test]
async fn password_from_file_map() {
    let addr = fake_kvrocks().await;
    let mut map = BTreeMap::new();
    map.insert(format!("redis://{addr}"), PASSWORD.to_string());

    let exporter = Exporter::new(
        &addr.to_string(),
        Arc::new(scrape_config()),
        Arc::new(map),
    )
    .unwrap();

    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_up 1\n"), "{text}");
}

#[tokio::test]
async fn wrong_password() {
    let addr = fake_kvrocks().await;
    let config = Config {
        password: Some("nope".to_string()),
        namespace: "kv".to_string(),
        kvrocks_metrics_only: true,
        ..scrape_config()
    };
    let exporter = Exporter::new(&addr.to_string(), Arc::new(config), Arc::new(BTreeMap::new()))
        .unwrap();

    let text = scrape_text(&exporter).await;
    assert!(text.contains("kv_up 0\n"), "{text}");
    assert!(text.contains("kv_exporter_last_scrape_error{err=\"server error ERR invalid password\"} 1\n"), "{text}");
    assert!(!text.contains("kv_exporter_build_info"));
}

#[tokio::test]
async fn scrape_over_tls() {
    let addr = fake_kvrocks_tls(tls_server_config()).await;
    let target = format!("rediss://:{PASSWORD}@localhost:{}", addr.port());

    let config = Config {
        tls_ca_cert_file: Some(tls_fixture("ca.crt")),
        ..scrape_config()
    };
    let exporter = Exporter::new(&target, Arc::new(config), Arc::new(BTreeMap::new())).unwrap();
    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_up 1\n"), "{text}");
    assert!(text.contains("kvrocks_db_keys{db=\"db0\"} 1024\n"), "{text}");

    // the test CA is not among the system roots
    let exporter = Exporter::new(&target, Arc::new(scrape_config()), Arc::new(BTreeMap::new()))
        .unwrap();
    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_up 0\n"), "{text}");

    let config = Config {
        skip_tls_verification: true,
        ..scrape_config()
    };
    let exporter = Exporter::new(&target, Arc::new(config), Arc::new(BTreeMap::new())).unwrap();
    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_up 1\n"), "{text}");
}

#[tokio::test]
async fn plain_target_against_tls_server() {
    let addr = fake_kvrocks_tls(tls_server_config()).await;
    let config = Config {
        connection_timeout: Duration::from_millis(500),
        ..scrape_config()
    };
    let exporter = Exporter::new(
        &format!("redis://:{PASSWORD}@{addr}"),
        Arc::new(config),
        Arc::new(BTreeMap::new()),
    )
    .unwrap();

    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_up 0\n"), "{text}");
}

#[tokio::test]
async fn scrape_with_client_certificate() {
    let addr = fake_kvrocks_tls(mutual_tls_server_config()).await;
    let target = format!("rediss://:{PASSWORD}@localhost:{}", addr.port());

    let config = Config {
        tls_ca_cert_file: Some(tls_fixture("ca.crt")),
        tls_client_cert_file: Some(tls_fixture("client.crt")),
        tls_client_key_file: Some(tls_fixture("client.key")),
        ..scrape_config()
    };
    let exporter = Exporter::new(&target, Arc::new(config), Arc::new(BTreeMap::new())).unwrap();
    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_up 1\n"), "{text}");

    let config = Config {
        tls_ca_cert_file: Some(tls_fixture("ca.crt")),
        connection_timeout: Duration::from_millis(500),
        ..scrape_config()
    };
    let exporter = Exporter::new(&target, Arc::new(config), Arc::new(BTreeMap::new())).unwrap();
    let text = scrape_text(&exporter).await;
    assert!(text.contains("kvrocks_up 0\n"), "{text}");
}
