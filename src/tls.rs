use monoio::net::TcpStream;
use monoio_rustls::{ClientTlsStream, TlsConnector};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, OnceLock};

#[derive(thiserror::Error, Debug)]
pub enum TlsError {
    #[error("{0:?} is not a valid TLS server name")]
    ServerName(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rustls(#[from] monoio_rustls::TlsError),
}

static GLOBAL_CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();

/// Process-wide connector trusting the `webpki-roots` CA set.
pub fn default_connector() -> &'static TlsConnector {
    GLOBAL_CONNECTOR.get_or_init(|| {
        // Another component may already have picked a provider.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let cfg = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(cfg))
    })
}

/// Wrap an already connected TCP stream in TLS for `host`.
pub async fn handshake(
    tcp: TcpStream,
    host: &str,
    connector: &TlsConnector,
) -> Result<ClientTlsStream<TcpStream>, TlsError> {
    let name =
        ServerName::try_from(host.to_owned()).map_err(|_| TlsError::ServerName(host.to_owned()))?;
    let tls = connector.connect(name, tcp).await?;
    tracing::debug!(host, "tls session established");
    Ok(tls)
}
