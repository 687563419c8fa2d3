//! TLS configuration and certificate loading.
//!
//! The resulting [`TlsAcceptor`] holds an `Arc<ServerConfig>`; it is built once at
//! startup and shared read-only by every connection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificate found in pem")]
    MissingCertificate,

    #[error("no private key found in pem")]
    MissingPrivateKey,

    #[error("malformed pem: {0}")]
    Pem(#[source] io::Error),

    #[error("invalid certificate or key: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

/// Loads a PEM certificate chain and private key from disk.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let read = |path: &Path| fs::read(path).map_err(|source| TlsError::Io { path: path.to_path_buf(), source });
    acceptor_from_pem(&read(cert_path)?, &read(key_path)?)
}

pub fn acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor, TlsError> {
    let certs = rustls_pemfile::certs(&mut &cert_pem[..]).collect::<Result<Vec<CertificateDer<'static>>, _>>().map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::MissingCertificate);
    }

    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut &key_pem[..]).map_err(TlsError::Pem)?.ok_or(TlsError::MissingPrivateKey)?;

    let mut config = ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}
