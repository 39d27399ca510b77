use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
    ServerName, UnixTime,
};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use rustls_native_certs::CertificateResult;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("read {note} file {path:?} failed, {err}")]
    Read {
        note: &'static str,
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("parse PEM file {path:?} failed, {err}")]
    Pem { path: PathBuf, err: pem::PemError },

    #[error("no certificate found in {0:?}")]
    MissingCertificate(PathBuf),

    #[error("no private key found in {0:?}, PKCS8, PKCS1 or SEC1 expected")]
    MissingPrivateKey(PathBuf),

    #[error("client certificate and key must be set together")]
    IncompleteClientIdentity,

    #[error("build tls config failed, {0}")]
    Build(#[from] rustls::Error),
}

#[inline]
fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// TLS settings for connecting to `rediss://` targets.
///
/// Without a CA file the system roots are trusted. A client certificate is
/// presented when both the certificate and the key are configured.
pub fn client_config(config: &Config) -> Result<ClientConfig, Error> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let builder = if config.skip_tls_verification {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
    } else {
        builder.with_root_certificates(root_store(config.tls_ca_cert_file.as_deref())?)
    };

    let client_config = match (&config.tls_client_cert_file, &config.tls_client_key_file) {
        (Some(cert), Some(key)) => {
            builder.with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => return Err(Error::IncompleteClientIdentity),
    };

    Ok(client_config)
}

/// TLS settings of the web listener.
pub fn server_config(cert: &Path, key: &Path) -> Result<ServerConfig, Error> {
    let mut server_config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(load_certs(cert)?, load_private_key(key)?)?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(server_config)
}

fn root_store(ca: Option<&Path>) -> Result<RootCertStore, Error> {
    let mut store = RootCertStore::empty();

    match ca {
        Some(path) => {
            for cert in load_certs(path)? {
                store.add(cert)?;
            }
        }
        None => {
            let CertificateResult { certs, errors, .. } = rustls_native_certs::load_native_certs();
            for err in errors {
                warn!(message = "load native certificate failed", %err);
            }

            let (added, ignored) = store.add_parsable_certificates(certs);
            debug!(message = "native root certificates loaded", added, ignored);
        }
    }

    Ok(store)
}

fn read_pem(note: &'static str, path: &Path) -> Result<Vec<pem::Pem>, Error> {
    let data = std::fs::read(path).map_err(|err| Error::Read {
        note,
        path: path.to_path_buf(),
        err,
    })?;

    pem::parse_many(data).map_err(|err| Error::Pem {
        path: path.to_path_buf(),
        err,
    })
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let certs = read_pem("certificate", path)?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| CertificateDer::from(p.into_contents()))
        .collect::<Vec<_>>();

    if certs.is_empty() {
        return Err(Error::MissingCertificate(path.to_path_buf()));
    }

    Ok(certs)
}

/// The first private key in the file wins.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    read_pem("private key", path)?
        .into_iter()
        .find_map(|p| match p.tag() {
            "PRIVATE KEY" => Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                p.into_contents(),
            ))),
            "RSA PRIVATE KEY" => Some(PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(
                p.into_contents(),
            ))),
            "EC PRIVATE KEY" => Some(PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(
                p.into_contents(),
            ))),
            _ => None,
        })
        .ok_or_else(|| Error::MissingPrivateKey(path.to_path_buf()))
}

/// Accepts any server certificate, handshake signatures are still checked.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/tls")
            .join(name)
    }

    #[test]
    fn load_fixtures() {
        assert_eq!(load_certs(&fixture("server.crt")).unwrap().len(), 1);
        assert!(matches!(
            load_private_key(&fixture("server.key")).unwrap(),
            PrivateKeyDer::Pkcs8(_)
        ));
    }

    #[test]
    fn load_errors() {
        assert!(matches!(
            load_certs(&fixture("missing.crt")),
            Err(Error::Read { note: "certificate", .. })
        ));
        // a key file holds no certificate
        assert!(matches!(
            load_certs(&fixture("server.key")),
            Err(Error::MissingCertificate(_))
        ));
        assert!(matches!(
            load_private_key(&fixture("ca.crt")),
            Err(Error::MissingPrivateKey(_))
        ));
    }

    #[test]
    fn client_configs() {
        use rustls::client::ResolvesClientCert;

        // system roots only
        client_config(&Config::default()).unwrap();

        let config = Config {
            tls_ca_cert_file: Some(fixture("ca.crt")),
            tls_client_cert_file: Some(fixture("client.crt")),
            tls_client_key_file: Some(fixture("client.key")),
            ..Default::default()
        };
        let client = client_config(&config).unwrap();
        assert!(client.client_auth_cert_resolver.has_certs());

        let config = Config {
            skip_tls_verification: true,
            ..Default::default()
        };
        let client = client_config(&config).unwrap();
        assert!(!client.client_auth_cert_resolver.has_certs());

        let config = Config {
            tls_client_cert_file: Some(fixture("client.crt")),
            ..Default::default()
        };
        assert!(matches!(
            client_config(&config),
            Err(Error::IncompleteClientIdentity)
        ));

        let config = Config {
            tls_ca_cert_file: Some(fixture("missing.crt")),
            ..Default::default()
        };
        assert!(matches!(client_config(&config), Err(Error::Read { .. })));
    }

    #[test]
    fn server_configs() {
        let server = server_config(&fixture("server.crt"), &fixture("server.key")).unwrap();
        assert_eq!(server.alpn_protocols, vec![b"http/1.1".to_vec()]);

        assert!(matches!(
            server_config(&fixture("server.crt"), &fixture("server.crt")),
            Err(Error::MissingPrivateKey(_))
        ));
    }
}
