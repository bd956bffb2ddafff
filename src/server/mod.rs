//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and runs one task per connection. Each task reads
//! a single request with [`Request::from_reader`], then hands the request and
//! a fresh [`ResponseWriter`] over the same stream to the handler. The
//! connection is closed once the handler returns.
//!
//! Requests that fail to parse never reach the handler. Oversized requests
//! are answered with `413 Payload Too Large` or
//! `431 Request Header Fields Too Large`, anything else with `400 Bad Request`.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::http::{
    ParseError, ReadOptions, Request, ResponseWriter, StatusCode, WriteError, default_headers,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// The writer type handlers receive.
pub type Writer = ResponseWriter<TcpStream>;

/// The httpwire server.
///
/// # Examples
///
/// ```rust,no_run
/// use httpwire::http::{Request, StatusCode, default_headers};
/// use httpwire::server::{Server, Writer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:42069").await?;
///     server
///         .run(|mut w: Writer, _req: Request| async move {
///             w.write_status_line(StatusCode::Ok).await?;
///             w.write_headers(&default_headers(6)).await?;
///             w.write_body(b"Hello!").await
///         })
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    read_options: ReadOptions,
}

impl Server {
    /// Binds the server to the given TCP address with default read options.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            read_options: ReadOptions::default(),
        })
    }

    /// Binds to `config.addr()` and applies its read buffer policy.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let mut server = Self::bind(config.addr()).await?;
        server.read_options = config.read_options();
        Ok(server)
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever. See [`run_until`](Self::run_until).
    ///
    /// # Errors
    ///
    /// Never returns under normal operation.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Writer, Request) -> F + Send + Sync + 'static,
        F: Future<Output = Result<(), WriteError>> + Send + 'static,
    {
        self.run_until(handler, future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// The handler receives the parsed [`Request`] and a [`Writer`] and must
    /// drive the writer through its states in order. Requests that fail to
    /// parse are answered with an error status before the handler is ever
    /// called. Connections already being served keep running after shutdown.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept failures are logged and skipped.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Writer, Request) -> F + Send + Sync + 'static,
        F: Future<Output = Result<(), WriteError>> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        let read_options = self.read_options;
        info!(address = %self.local_addr, "httpwire listening");

        tokio::pin!(shutdown);
        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down listener");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, read_options).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Serves the single request carried by one connection.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    read_options: ReadOptions,
) -> Result<(), WriteError>
where
    H: Fn(Writer, Request) -> F + Send + Sync + 'static,
    F: Future<Output = Result<(), WriteError>> + Send + 'static,
{
    let request = match Request::from_reader(&mut stream, &read_options).await {
        Ok(request) => request,
        Err(ParseError::Io(e)) => return Err(e.into()),
        Err(e) => {
            let status = rejection_status(&e);
            warn!(peer = %peer_addr, error = %e, status = status.as_u16(), "rejecting request");
            let mut writer = ResponseWriter::new(stream);
            return write_error(&mut writer, status, &e.to_string()).await;
        }
    };

    debug!(
        peer = %peer_addr,
        method = %request.method(),
        target = %request.target(),
        "dispatching request"
    );

    handler(ResponseWriter::new(stream), request).await
}

/// Maps a parse failure to the status sent back to the client.
fn rejection_status(err: &ParseError) -> StatusCode {
    match err {
        ParseError::PayloadTooLarge { .. } => StatusCode::PayloadTooLarge,
        ParseError::HeadTooLarge { .. } | ParseError::BufferLimitExceeded { .. } => {
            StatusCode::RequestHeaderFieldsTooLarge
        }
        _ => StatusCode::BadRequest,
    }
}

/// Writes a complete plain-text response carrying `message`.
async fn write_error(
    writer: &mut Writer,
    status: StatusCode,
    message: &str,
) -> Result<(), WriteError> {
    writer.write_status_line(status).await?;
    writer.write_headers(&default_headers(message.len())).await?;
    writer.write_body(message.as_bytes()).await
}
