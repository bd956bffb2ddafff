//! Prints each request that arrives on a raw TCP listener, without the server.
//!
//! ```text
//! cargo run --example tcplistener
//! curl -d 'hello' http://127.0.0.1:42069/coffee
//! ```

use httpwire::ServerConfig;
use httpwire::http::Request;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let options = config.read_options();
    let listener = TcpListener::bind(config.addr()).await?;
    info!(address = %listener.local_addr()?, "listening");

    loop {
        let (mut stream, peer) = listener.accept().await?;
        info!(%peer, "connection accepted");

        let request = match Request::from_reader(&mut stream, &options).await {
            Ok(request) => request,
            Err(e) => {
                warn!(%peer, error = %e, "failed to read request");
                continue;
            }
        };

        println!("Request line:");
        println!("- Method: {}", request.method());
        println!("- Target: {}", request.target());
        println!("- Version: {}", request.version().as_str());
        println!("Headers:");
        for (name, value) in request.headers().iter() {
            println!("- {name}: {value}");
        }
        println!("Body:");
        println!("{}", String::from_utf8_lossy(request.body()));

        info!(%peer, "connection closed");
    }
}
