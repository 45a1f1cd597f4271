//! Client configuration and its validation.
//!
//! A [`ClientConfig`] is plain data; [`ClientConfig::validate`] turns it into
//! an [`Endpoint`] or a [`ConfigError`] without touching the network.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;

/// Construction-time options for a tracing client connection.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Identity broadcast to the server on every upgraded call.
    pub client_id: String,
    /// Remote host; requires `port`. Mutually exclusive with `unix_socket`.
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Path of a Unix domain socket. Mutually exclusive with `host`/`port`.
    pub unix_socket: Option<PathBuf>,
    /// TLS settings; only valid with `host`/`port`.
    pub tls: Option<TlsConfig>,
    /// Applied to connecting, reading and writing. `None` blocks indefinitely.
    pub timeout: Option<Duration>,
}

/// TLS client settings.
///
/// TLS is enabled by either a `cafile` (PEM roots to trust) or a prebuilt
/// `ssl_context`; the latter takes precedence and makes the file options
/// irrelevant.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub cafile: Option<PathBuf>,
    /// PEM client certificate chain. May also hold the private key.
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub ssl_context: Option<Arc<rustls::ClientConfig>>,
    /// Name used for SNI and certificate verification. Defaults to the host.
    pub server_name: Option<String>,
}

/// Validated connection target.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Tcp {
        host: String,
        port: u16,
        tls: Option<TlsConfig>,
    },
    Unix {
        path: PathBuf,
    },
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Checks the configuration and resolves the connection target.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: an empty client id, a missing
    /// or doubly specified target, a port-less host, TLS over a Unix socket,
    /// or incomplete TLS settings.
    pub fn validate(&self) -> Result<Endpoint, ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingClientId);
        }

        if let Some(path) = &self.unix_socket {
            if self.host.is_some() || self.port.is_some() {
                return Err(ConfigError::ConflictingTargets);
            }
            if self.tls.is_some() {
                return Err(ConfigError::TlsOverUnixSocket);
            }
            return Ok(Endpoint::Unix { path: path.clone() });
        }

        let Some(host) = &self.host else {
            return Err(ConfigError::MissingTarget);
        };
        let port = self.port.ok_or(ConfigError::MissingPort)?;
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(Endpoint::Tcp {
            host: host.clone(),
            port,
            tls: self.tls.clone(),
        })
    }
}

impl TlsConfig {
    /// Trust the PEM roots in `cafile`.
    pub fn from_cafile(cafile: impl Into<PathBuf>) -> Self {
        Self {
            cafile: Some(cafile.into()),
            ..Self::default()
        }
    }

    /// Use a fully built rustls configuration.
    #[must_use]
    pub fn from_context(ssl_context: Arc<rustls::ClientConfig>) -> Self {
        Self {
            ssl_context: Some(ssl_context),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_client_cert(mut self, certfile: impl Into<PathBuf>, keyfile: Option<PathBuf>) -> Self {
        self.certfile = Some(certfile.into());
        self.keyfile = keyfile;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cafile.is_none() && self.ssl_context.is_none() {
            return Err(ConfigError::IncompleteTls);
        }
        if self.keyfile.is_some() && self.certfile.is_none() {
            return Err(ConfigError::KeyWithoutCertificate);
        }
        Ok(())
    }
}
