use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderValue};
use http::request::Parts;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::built_info::PKG_VERSION;
use crate::encoding::encode;
use crate::exporter::Exporter;
use crate::metric::Metric;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Accept connections until `shutdown` changes, connections in flight
/// finish their current request before they are closed. With an `acceptor`
/// every connection is served over TLS.
pub async fn serve(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    exporter: Arc<Exporter>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (conn, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            result = listener.accept() => match result {
                Ok((conn, peer)) => (conn, peer),
                Err(err) => {
                    error!(
                        message = "accept new connection failed",
                        %err
                    );

                    continue;
                }
            }
        };

        let exporter = Arc::clone(&exporter);
        let shutdown = shutdown.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(conn).await {
                    Ok(conn) => serve_connection(conn, peer, exporter, shutdown).await,
                    Err(err) => {
                        debug!(
                            message = "tls handshake failed",
                            %peer,
                            %err
                        );
                    }
                },
                None => serve_connection(conn, peer, exporter, shutdown).await,
            }
        });
    }

    info!(message = "http server shutdown successful");
}

async fn serve_connection<IO>(
    io: IO,
    peer: SocketAddr,
    exporter: Arc<Exporter>,
    mut shutdown: watch::Receiver<bool>,
) where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let exporter = Arc::clone(&exporter);

        async move { Ok::<_, Infallible>(handle(req, exporter).await) }
    });

    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    trace!(
                        message = "failed to serve http connection",
                        %peer,
                        %err
                    );
                }

                break;
            }
            _ = shutdown.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

pub async fn handle<B>(req: Request<B>, exporter: Arc<Exporter>) -> Response<Full<Bytes>> {
    // the body is never read
    let (parts, _) = req.into_parts();
    let path = parts.uri.path();

    if path == exporter.config().metrics_path {
        let metrics = exporter.scrape().await;
        return metrics_response(&metrics, &parts.headers);
    }

    match path {
        "/scrape" => scrape(&parts, &exporter).await,
        "/health" => response(StatusCode::OK, TEXT_PLAIN, Bytes::from_static(b"ok")),
        "/" => response(
            StatusCode::OK,
            TEXT_HTML,
            Bytes::from(index_page(&exporter.config().metrics_path)),
        ),
        _ => response(
            StatusCode::NOT_FOUND,
            TEXT_PLAIN,
            Bytes::from_static(b"404 page not found\n"),
        ),
    }
}

/// Scrape the instance named by the `target` query parameter, credentials
/// in the target never make it into labels or logs.
async fn scrape(parts: &Parts, exporter: &Exporter) -> Response<Full<Bytes>> {
    let target = parts.uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "target")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    });

    let Some(target) = target else {
        exporter.inc_target_scrape_request_errors();
        return response(
            StatusCode::BAD_REQUEST,
            TEXT_PLAIN,
            Bytes::from_static(b"'target' parameter must be specified\n"),
        );
    };

    match exporter.with_target(&target) {
        Ok(exporter) => {
            debug!(message = "scrape target", target = %exporter.target().uri);

            let metrics = exporter.scrape().await;
            metrics_response(&metrics, &parts.headers)
        }
        Err(err) => {
            exporter.inc_target_scrape_request_errors();
            response(
                StatusCode::BAD_REQUEST,
                TEXT_PLAIN,
                Bytes::from(format!("Invalid 'target' parameter, parse err: {err}\n")),
            )
        }
    }
}

fn index_page(metrics_path: &str) -> String {
    format!(
        "<html>\n<head><title>Kvrocks Exporter {PKG_VERSION}</title></head>\n<body>\n<h1>Kvrocks Exporter {PKG_VERSION}</h1>\n<p><a href='{metrics_path}'>Metrics</a></p>\n</body>\n</html>\n"
    )
}

fn metrics_response(metrics: &[Metric], headers: &HeaderMap) -> Response<Full<Bytes>> {
    let mut buf = String::with_capacity(16 * 1024);
    if let Err(err) = encode(&mut buf, metrics) {
        error!(message = "encode metrics failed", %err);

        return response(
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_PLAIN,
            Bytes::from_static(b"encode metrics failed\n"),
        );
    }

    if !should_compress(headers) {
        return response(StatusCode::OK, PROMETHEUS_TEXT, Bytes::from(buf));
    }

    match gzip(buf.as_bytes()) {
        Ok(body) => {
            let mut resp = response(StatusCode::OK, PROMETHEUS_TEXT, body);
            resp.headers_mut()
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            resp
        }
        Err(err) => {
            warn!(message = "gzip metrics failed, send them uncompressed", %err);

            response(StatusCode::OK, PROMETHEUS_TEXT, Bytes::from(buf))
        }
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder =
        flate2::write::GzEncoder::new(BytesMut::new().writer(), flate2::Compression::default());
    encoder.write_all(data)?;

    Ok(encoder.finish()?.into_inner().freeze())
}

fn should_compress(headers: &HeaderMap) -> bool {
    match headers.get(http::header::ACCEPT_ENCODING) {
        Some(value) => match value.to_str() {
            Ok(value) => value.contains("gzip"),
            Err(_err) => false,
        },
        None => false,
    }
}

fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));

    resp
}
