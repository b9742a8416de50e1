//! Client-certificate TLS setup for AMQPS connections.
//!
//! The certificate directory follows the interchange convention:
//! `<user>.crt` and `<user>.key` for the client identity, `truststore.pem`
//! for the broker CA.

use anyhow::Context;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

pub fn client_tls_connector(cert_dir: &Path, user: &str) -> anyhow::Result<TlsConnector> {
    let ca_path = cert_dir.join("truststore.pem");
    let cert_path = cert_dir.join(format!("{user}.crt"));
    let key_path = cert_dir.join(format!("{user}.key"));

    let mut roots = rustls::RootCertStore::empty();
    let ca_file = File::open(&ca_path)
        .with_context(|| format!("cannot open CA bundle {}", ca_path.display()))?;
    for cert in rustls_pemfile::certs(&mut BufReader::new(ca_file)) {
        roots.add(cert?)?;
    }

    let cert_file = File::open(&cert_path)
        .with_context(|| format!("cannot open client certificate {}", cert_path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("cannot parse client certificate {}", cert_path.display()))?;

    let key_file = File::open(&key_path)
        .with_context(|| format!("cannot open client key {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)?;

    Ok(TlsConnector::from(Arc::new(config)))
}
