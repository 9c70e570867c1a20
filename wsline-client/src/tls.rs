//! TLS connector for `wss://` connections.

use crate::connection::TlsClientConfig;
use crate::error::ClientError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Builds a connector and the name to present for SNI and verification.
///
/// Without a CA file the bundled web PKI roots are trusted.
pub fn create_tls_connector(
    config: &TlsClientConfig,
    host: &str,
) -> Result<(TlsConnector, ServerName<'static>), ClientError> {
    let builder = if config.insecure {
        tracing::warn!("TLS certificate verification disabled");
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
    } else {
        rustls::ClientConfig::builder().with_root_certificates(root_store(config)?)
    };

    let client_config = match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ClientError::TlsConfig(format!("invalid client cert/key: {}", e)))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(ClientError::TlsConfig(
                "client certificate and key must be given together".into(),
            ))
        }
    };

    let name = config.server_name.as_deref().unwrap_or(host);
    let server_name = ServerName::try_from(name.to_string())
        .map_err(|_| ClientError::TlsConfig(format!("invalid server name: {}", name)))?;

    Ok((TlsConnector::from(Arc::new(client_config)), server_name))
}

fn root_store(config: &TlsClientConfig) -> Result<RootCertStore, ClientError> {
    let mut store = RootCertStore::empty();
    match &config.ca_cert_path {
        Some(path) => {
            for cert in load_certs(path)? {
                store
                    .add(cert)
                    .map_err(|e| ClientError::TlsConfig(format!("invalid CA cert: {}", e)))?;
            }
        }
        None => store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(store)
}

/// Accepts any server certificate. Development only.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        use SignatureScheme::*;
        vec![
            ECDSA_NISTP256_SHA256,
            ECDSA_NISTP384_SHA384,
            ECDSA_NISTP521_SHA512,
            ED25519,
            RSA_PSS_SHA256,
            RSA_PSS_SHA384,
            RSA_PSS_SHA512,
            RSA_PKCS1_SHA256,
            RSA_PKCS1_SHA384,
            RSA_PKCS1_SHA512,
        ]
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))?;

    if certs.is_empty() {
        return Err(ClientError::TlsConfig(format!(
            "no certificates found in {:?}",
            path
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open key file {:?}: {}", path, e)))?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ClientError::TlsConfig(format!("invalid key file {:?}: {}", path, e)))?
        .ok_or_else(|| ClientError::TlsConfig(format!("no private key found in {:?}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_files_reported() {
        let err = load_certs(Path::new("/nonexistent/ca.pem")).unwrap_err();
        assert!(err.to_string().contains("cannot open"));

        let err = load_private_key(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn test_empty_pem_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let err = load_certs(file.path()).unwrap_err();
        assert!(err.to_string().contains("no certificates"));

        let err = load_private_key(file.path()).unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }

    #[test]
    fn test_half_configured_mtls_rejected() {
        let config = TlsClientConfig {
            client_cert_path: Some("/tmp/cert.pem".into()),
            ..TlsClientConfig::default()
        };
        match create_tls_connector(&config, "localhost") {
            Err(err) => assert!(err.to_string().contains("together")),
            Ok(_) => panic!("half-configured mTLS accepted"),
        }
    }

    #[test]
    fn test_default_roots_and_sni_override() {
        let config = TlsClientConfig::new().with_server_name("ws.example.com");
        let (_, name) = create_tls_connector(&config, "127.0.0.1").unwrap();
        assert!(matches!(name, ServerName::DnsName(ref dns) if dns.as_ref() == "ws.example.com"));
    }
}
