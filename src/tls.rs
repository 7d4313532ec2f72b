//! Mutual TLS smoke test over the issued material.
//!
//! A server accepts one connection, reads a line and echoes it back; a client
//! dials, writes a line and reads the reply. Both sides trust only the
//! bootstrap CA. Built on rustls with the ring provider, blocking I/O.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{
    ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection, StreamOwned,
};
use tracing::{debug, info};

use crate::cert::Certificate;
use crate::error::{PkiError, Result};
use crate::key::KeyPair;

/// Whether the server insists on a client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    Required,
    Optional,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_error(context: &str, err: impl std::fmt::Display) -> PkiError {
    PkiError::TlsError(format!("{context}: {err}"))
}

fn root_store(ca: &Certificate) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.add(CertificateDer::from(ca.to_der()?))?;
    Ok(roots)
}

type Identity = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

fn identity(cert: &Certificate, key: &KeyPair) -> Result<Identity> {
    let chain = vec![CertificateDer::from(cert.to_der()?)];
    let key = PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(key.to_pkcs1_der()?));
    Ok((chain, key))
}

/// Server side configuration trusting `ca` for client certificates.
pub fn server_config(
    ca: &Certificate,
    cert: &Certificate,
    key: &KeyPair,
    client_auth: ClientAuth,
) -> Result<Arc<ServerConfig>> {
    let provider = provider();
    let builder =
        WebPkiClientVerifier::builder_with_provider(Arc::new(root_store(ca)?), provider.clone());
    let verifier = match client_auth {
        ClientAuth::Required => builder.build(),
        ClientAuth::Optional => builder.allow_unauthenticated().build(),
    }
    .map_err(|e| tls_error("client verifier", e))?;

    let (chain, key) = identity(cert, key)?;
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)?;
    Ok(Arc::new(config))
}

/// Client side configuration trusting `ca`, optionally presenting a certificate.
pub fn client_config(
    ca: &Certificate,
    client_identity: Option<(&Certificate, &KeyPair)>,
) -> Result<Arc<ClientConfig>> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store(ca)?);
    let config = match client_identity {
        Some((cert, key)) => {
            let (chain, key) = identity(cert, key)?;
            builder.with_client_auth_cert(chain, key)?
        }
        None => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

/// Accepts one connection, reads one line, echoes it back and returns it.
pub fn serve_once(listener: &TcpListener, config: Arc<ServerConfig>) -> Result<String> {
    let (tcp, peer) = listener.accept().map_err(|e| tls_error("accept", e))?;
    debug!(%peer, "accepted connection");

    let conn = ServerConnection::new(config)?;
    let mut stream = StreamOwned::new(conn, tcp);

    let mut line = String::new();
    BufReader::new(&mut stream)
        .read_line(&mut line)
        .map_err(|e| tls_error("read", e))?;
    info!(%peer, line = line.trim_end(), "received");

    stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| tls_error("write", e))?;
    stream.conn.send_close_notify();
    // the peer may already be gone; the exchange itself succeeded
    let _ = stream.flush();
    Ok(line)
}

/// Dials `addr` as `server_name`, writes `line` and returns the reply line.
pub fn exchange_line(
    addr: impl ToSocketAddrs,
    server_name: &str,
    config: Arc<ClientConfig>,
    line: &str,
) -> Result<String> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| tls_error("server name", e))?;
    let tcp = TcpStream::connect(addr).map_err(|e| tls_error("connect", e))?;
    let conn = ClientConnection::new(config, name)?;
    let mut stream = StreamOwned::new(conn, tcp);

    stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| tls_error("write", e))?;

    let mut reply = String::new();
    BufReader::new(&mut stream)
        .read_line(&mut reply)
        .map_err(|e| tls_error("read", e))?;
    Ok(reply)
}
