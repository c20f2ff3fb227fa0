use clap::Parser;
use log::{error, info};
use server::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Request path for the WebSocket upgrade
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Milliseconds between game ticks
    #[arg(short, long, default_value = "1000")]
    tick_ms: u64,

    /// Side length of the game grid (6 to 1000)
    #[arg(short, long, default_value = "20")]
    grid_size: i32,

    /// Letters in a generated room code
    #[arg(long, default_value = "5")]
    code_length: usize,

    /// Outbound messages buffered per client before new ones are dropped
    #[arg(long, default_value = "32")]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        listen_addr: format!("{}:{}", args.host, args.port),
        ws_path: args.path,
        tick_period: Duration::from_millis(args.tick_ms),
        grid_size: args.grid_size,
        code_length: args.code_length,
        queue_capacity: args.queue_capacity,
    };

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
