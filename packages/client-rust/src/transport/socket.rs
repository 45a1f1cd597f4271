//! Opening the raw stream for an [`Endpoint`].

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use rustls::{ClientConnection, StreamOwned};

use crate::config::Endpoint;
use crate::error::ClientError;

use super::tls;

/// An open connection to the server.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Self::Unix(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

/// Connects to `endpoint`, completing the TLS handshake when configured.
///
/// `timeout` bounds the connect attempt and every later read and write.
///
/// # Errors
///
/// `ClientError::Transport` for socket failures; TLS setup and handshake
/// failures as reported by [`tls::connect`].
pub fn open(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Stream, ClientError> {
    match endpoint {
        Endpoint::Tcp { host, port, tls } => {
            let tcp = connect_tcp(host, *port, timeout)?;
            match tls {
                Some(tls) => Ok(Stream::Tls(Box::new(tls::connect(tcp, host, tls)?))),
                None => Ok(Stream::Tcp(tcp)),
            }
        }
        Endpoint::Unix { path } => open_unix(path, timeout),
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                tracing::debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(err) => {
                tracing::debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{host}:{port} resolved to no addresses"),
        )
    }))
}

#[cfg(unix)]
fn open_unix(path: &std::path::Path, timeout: Option<Duration>) -> Result<Stream, ClientError> {
    let stream = UnixStream::connect(path)?;
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    tracing::debug!(path = %path.display(), "connected");
    Ok(Stream::Unix(stream))
}

#[cfg(not(unix))]
fn open_unix(path: &std::path::Path, _timeout: Option<Duration>) -> Result<Stream, ClientError> {
    Err(ClientError::Transport(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("unix sockets are not supported here: {}", path.display()),
    )))
}
