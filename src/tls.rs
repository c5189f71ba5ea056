//! TLS material loading

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustls::{Certificate, PrivateKey, ServerConfig as RustlsServerConfig};
use rustls_pemfile::{certs, Item};
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// Build a TLS acceptor from a PEM certificate chain and a PEM private key
/// (PKCS#8, RSA or SEC1 EC).
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let cert_file = File::open(cert_path)
        .with_context(|| format!("Failed to open certificate: {:?}", cert_path))?;
    let cert_chain: Vec<Certificate> = certs(&mut BufReader::new(cert_file))
        .with_context(|| format!("Failed to parse certificate: {:?}", cert_path))?
        .into_iter()
        .map(Certificate)
        .collect();
    if cert_chain.is_empty() {
        return Err(anyhow!("No certificate found in {:?}", cert_path));
    }

    let private_key = load_private_key(key_path)?;

    let config = RustlsServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .context("Failed to build TLS config")?;

    info!("TLS enabled with certificate: {:?}", cert_path);
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_private_key(key_path: &Path) -> Result<PrivateKey> {
    let key_file = File::open(key_path)
        .with_context(|| format!("Failed to open private key: {:?}", key_path))?;
    let mut reader = BufReader::new(key_file);
    loop {
        let item = rustls_pemfile::read_one(&mut reader)
            .with_context(|| format!("Failed to parse private key: {:?}", key_path))?;
        match item {
            Some(Item::PKCS8Key(key)) | Some(Item::RSAKey(key)) | Some(Item::ECKey(key)) => {
                return Ok(PrivateKey(key));
            }
            Some(_) => continue,
            None => return Err(anyhow!("No private key found in {:?}", key_path)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use tokio_rustls::TlsConnector;

    /// Write a fresh self-signed certificate for `localhost` into `dir`.
    pub fn write_self_signed(dir: &Path) -> (PathBuf, PathBuf) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, cert.serialize_pem().unwrap()).unwrap();
        std::fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();
        (cert_path, key_path)
    }

    /// A client connector that trusts exactly the certificate at `cert_path`.
    pub fn connector_trusting(cert_path: &Path) -> TlsConnector {
        let pem = std::fs::read(cert_path).unwrap();
        let mut roots = rustls::RootCertStore::empty();
        for der in rustls_pemfile::certs(&mut pem.as_slice()).unwrap() {
            roots.add(&rustls::Certificate(der)).unwrap();
        }
        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }
}
