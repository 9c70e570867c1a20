//! TLS acceptor for `wss://` listeners.

use crate::config::TlsConfig;
use crate::error::ServerError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Loads the server certificate and key and builds an acceptor.
///
/// With `require_client_cert`, clients must present a certificate signed by
/// one of the CAs in `client_ca_path`.
pub fn create_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let cert_path = config
        .cert_path
        .as_ref()
        .ok_or_else(|| ServerError::TlsConfig("cert_path not set".into()))?;
    let key_path = config
        .key_path
        .as_ref()
        .ok_or_else(|| ServerError::TlsConfig("key_path not set".into()))?;
    let client_ca_path = match (config.require_client_cert, &config.client_ca_path) {
        (false, _) => None,
        (true, Some(path)) => Some(path),
        (true, None) => {
            return Err(ServerError::TlsConfig(
                "client_ca_path not set for mTLS".into(),
            ))
        }
    };

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let builder = match client_ca_path {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|e| {
                    ServerError::TlsConfig(format!("invalid client CA cert: {}", e))
                })?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| {
                    ServerError::TlsConfig(format!("failed to build client verifier: {}", e))
                })?;
            rustls::ServerConfig::builder().with_client_cert_verifier(verifier)
        }
        None => rustls::ServerConfig::builder().with_no_client_auth(),
    };

    let server_config = builder
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::TlsConfig(format!("invalid server cert/key: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e)))?;

    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsConfig(format!("cannot open key file {:?}: {}", path, e)))?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ServerError::TlsConfig(format!("invalid key file {:?}: {}", path, e)))?
        .ok_or_else(|| ServerError::TlsConfig(format!("no private key found in {:?}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tls_config(cert: Option<&str>, key: Option<&str>, mtls: bool) -> TlsConfig {
        TlsConfig {
            enabled: true,
            cert_path: cert.map(Into::into),
            key_path: key.map(Into::into),
            require_client_cert: mtls,
            client_ca_path: None,
        }
    }

    fn expect_error(config: &TlsConfig, needle: &str) {
        match create_tls_acceptor(config) {
            Err(e) => assert!(e.to_string().contains(needle), "{}", e),
            Ok(_) => panic!("expected error containing {:?}", needle),
        }
    }

    #[test]
    fn test_load_invalid_paths() {
        let err = load_certs(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert!(err.to_string().contains("cannot open"));

        let err = load_private_key(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_empty_key_file() {
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(b"not a valid key").unwrap();

        let err = load_private_key(key_file.path()).unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }

    #[test]
    fn test_missing_settings() {
        expect_error(
            &tls_config(None, Some("/some/key.pem"), false),
            "cert_path not set",
        );
        expect_error(
            &tls_config(Some("/some/cert.pem"), None, false),
            "key_path not set",
        );
        // Checked before any file is opened.
        expect_error(
            &tls_config(Some("/nonexistent/cert.pem"), Some("/nonexistent/key.pem"), true),
            "client_ca_path not set",
        );
    }
}
