//! TLS over TCP with rustls.
//!
//! Roots come from the configured `cafile`; there is no fallback to system
//! roots. A caller-supplied `ssl_context` is used as is.

use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConnection, RootCertStore, StreamOwned};

use crate::config::TlsConfig;
use crate::error::ClientError;

fn certificate_error(path: &Path, reason: impl ToString) -> ClientError {
    ClientError::Certificate {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let file = File::open(path).map_err(|e| certificate_error(path, e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| certificate_error(path, e))?;
    if certs.is_empty() {
        return Err(certificate_error(path, "no PEM certificates found"));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ClientError> {
    let file = File::open(path).map_err(|e| certificate_error(path, e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| certificate_error(path, e))?
        .ok_or_else(|| certificate_error(path, "no PEM private key found"))
}

/// Builds the rustls configuration described by `tls`.
///
/// # Errors
///
/// `ClientError::Certificate` for unreadable or empty PEM files,
/// `ClientError::Tls` when rustls rejects the material.
pub fn client_config(tls: &TlsConfig) -> Result<Arc<rustls::ClientConfig>, ClientError> {
    if let Some(context) = &tls.ssl_context {
        return Ok(Arc::clone(context));
    }

    let mut roots = RootCertStore::empty();
    if let Some(cafile) = &tls.cafile {
        for cert in load_certs(cafile)? {
            roots.add(cert)?;
        }
    }

    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots);

    let config = match &tls.certfile {
        Some(certfile) => {
            let chain = load_certs(certfile)?;
            let key = load_key(tls.keyfile.as_deref().unwrap_or(certfile))?;
            builder.with_client_auth_cert(chain, key)?
        }
        None => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

/// Runs the TLS handshake over `tcp` before returning, so certificate and
/// protocol failures surface at connect time rather than on the first call.
///
/// # Errors
///
/// Configuration errors as for [`client_config`]; `InvalidServerName` for a
/// name rustls cannot verify against; `Transport` for handshake failures.
pub fn connect(
    mut tcp: TcpStream,
    host: &str,
    tls: &TlsConfig,
) -> Result<StreamOwned<ClientConnection, TcpStream>, ClientError> {
    let config = client_config(tls)?;
    let name = tls.server_name.clone().unwrap_or_else(|| host.to_string());
    let server_name =
        ServerName::try_from(name.clone()).map_err(|_| ClientError::InvalidServerName(name))?;

    let mut connection = ClientConnection::new(config, server_name)?;
    while connection.is_handshaking() {
        connection.complete_io(&mut tcp)?;
    }
    tracing::debug!(host, "TLS handshake complete");
    Ok(StreamOwned::new(connection, tcp))
}
