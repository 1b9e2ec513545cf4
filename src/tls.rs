use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {kind} '{}': {source}", .path.display())]
    Read {
        kind: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no PEM certificates found in '{}'", .0.display())]
    NoCerts(PathBuf),
    #[error("no PEM private key found in '{}'", .0.display())]
    NoKey(PathBuf),
    #[error("failed to build TLS config: {0}")]
    Rustls(#[from] rustls::Error),
}

fn read_pem(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read_pem("certificate", path)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            kind: "certificate",
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCerts(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let pem = read_pem("private key", path)?;
    rustls_pemfile::private_key(&mut BufReader::new(pem.as_slice()))
        .map_err(|source| TlsError::Read {
            kind: "private key",
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoKey(path.to_path_buf()))
}

/// Builds the acceptor terminating TLS for the webhook listener from the
/// PEM files mounted into the pod.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rcgen::{CertifiedKey, generate_simple_self_signed};
    use tempfile::NamedTempFile;

    use super::*;

    fn pem_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn self_signed() -> (NamedTempFile, NamedTempFile) {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["sidecar-injector.default.svc".to_string()]).unwrap();
        (pem_file(&cert.pem()), pem_file(&key_pair.serialize_pem()))
    }

    #[test]
    fn loads_self_signed_pair() {
        let (cert, key) = self_signed();
        assert!(load_acceptor(cert.path(), key.path()).is_ok());
    }

    #[test]
    fn missing_cert_file_is_reported() {
        let (_, key) = self_signed();
        let err = load_acceptor(Path::new("/nonexistent/tls.crt"), key.path())
            .err()
            .expect("missing certificate file fails to load");
        assert!(matches!(err, TlsError::Read { kind: "certificate", .. }), "{err}");
    }

    #[test]
    fn file_without_certs_is_rejected() {
        let (_, key) = self_signed();
        let empty = pem_file("");
        let err = load_acceptor(empty.path(), key.path())
            .err()
            .expect("empty certificate file fails to load");
        assert!(matches!(err, TlsError::NoCerts(_)), "{err}");
    }

    #[test]
    fn key_file_without_key_is_rejected() {
        let (cert, _) = self_signed();
        let err = load_acceptor(cert.path(), cert.path())
            .err()
            .expect("certificate used as key fails to load");
        assert!(matches!(err, TlsError::NoKey(_)), "{err}");
    }
}
