//! # httpwire
//!
//! A minimal HTTP/1.1 message engine built directly on byte streams.
//!
//! - [`http::RequestParser`] turns bytes arriving in arbitrary chunks into a
//!   [`http::Request`] without ever parsing a byte twice.
//! - [`http::ResponseWriter`] serializes a status line, headers, and a plain or
//!   chunked body with trailers, rejecting calls made out of order.
//! - [`server::Server`] is a thin Tokio accept loop around both.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use httpwire::http::{Request, StatusCode, default_headers};
//! use httpwire::server::{Server, Writer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:42069").await?;
//!     server.run(|mut w: Writer, req: Request| async move {
//!         let body = format!("you asked for {}\n", req.target());
//!         w.write_status_line(StatusCode::Ok).await?;
//!         w.write_headers(&default_headers(body.len())).await?;
//!         w.write_body(body.as_bytes()).await
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod http;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::ServerConfig;
pub use http::{Headers, Method, ParseError, Request, ResponseWriter, StatusCode, WriteError};
pub use server::{Server, ServerError};
