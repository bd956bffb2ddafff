//! Demo server: HTML status pages plus a chunked echo endpoint with trailers.
//!
//! ```text
//! cargo run --example httpserver
//! curl -v http://127.0.0.1:42069/yourproblem
//! curl --raw -d 'hello world' http://127.0.0.1:42069/echo
//! ```

use httpwire::http::{Headers, Request, StatusCode, default_headers};
use httpwire::server::{Server, Writer};
use httpwire::{ServerConfig, WriteError};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Payload bytes per chunk on `/echo`.
const ECHO_CHUNK_SIZE: usize = 32;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let server = Server::from_config(&config).await?;
    info!(address = %server.local_addr(), "demo server started");

    server
        .run_until(route, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await?;

    info!("server gracefully stopped");
    Ok(())
}

async fn route(w: Writer, req: Request) -> Result<(), WriteError> {
    match req.path() {
        "/yourproblem" => {
            html(
                w,
                StatusCode::BadRequest,
                "Bad Request",
                "Your request honestly kinda sucked.",
            )
            .await
        }
        "/myproblem" => {
            html(
                w,
                StatusCode::InternalServerError,
                "Internal Server Error",
                "Okay, you know what? This one is on me.",
            )
            .await
        }
        "/echo" => echo(w, req).await,
        _ => html(w, StatusCode::Ok, "Success!", "Your request was an absolute banger.").await,
    }
}

async fn html(
    mut w: Writer,
    status: StatusCode,
    heading: &str,
    text: &str,
) -> Result<(), WriteError> {
    let body = format!(
        "<html>\n<head>\n<title>{status}</title>\n</head>\n<body>\n<h1>{heading}</h1>\n<p>{text}</p>\n</body>\n</html>\n"
    );
    let mut headers = default_headers(body.len());
    headers.replace("Content-Type", "text/html");

    w.write_status_line(status).await?;
    w.write_headers(&headers).await?;
    w.write_body(body.as_bytes()).await
}

/// Streams the request body back chunk by chunk, then reports its length and
/// SHA-256 in trailers.
async fn echo(mut w: Writer, req: Request) -> Result<(), WriteError> {
    let mut headers = default_headers(0);
    headers.remove("Content-Length");
    headers.replace("Transfer-Encoding", "chunked");
    headers.set("Trailer", "X-Content-Sha256");
    headers.set("Trailer", "X-Content-Length");

    w.write_status_line(StatusCode::Ok).await?;
    w.write_headers(&headers).await?;

    let mut hasher = Sha256::new();
    let mut length = 0;
    for piece in req.body().chunks(ECHO_CHUNK_SIZE) {
        length += w.write_chunk(piece).await?;
        hasher.update(piece);
    }
    w.write_chunk_terminator().await?;

    let mut trailers = Headers::new();
    trailers.set("X-Content-Sha256", &format!("{:x}", hasher.finalize()));
    trailers.set("X-Content-Length", &length.to_string());
    w.write_trailers(&trailers).await
}
