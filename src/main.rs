use crate::server::ServerConfig;
use anyhow::Result;
use clap::Parser;
use std::time::Duration;

mod cli;
mod logs;
mod server;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = cli::Cli::parse();
    // Run the specified command
    match cli.command {
        cli::Commands::Start {
            bind_address,
            socket_path,
            fallback_path,
            rate_limit_rps,
            rate_limit_burst,
            request_timeout,
            log_format,
        } => {
            // Create the server config
            let config = ServerConfig {
                bind_address,
                socket_path,
                fallback_path,
                rate_limit_rps,
                rate_limit_burst,
                request_timeout: Duration::from_secs(request_timeout),
                log_format,
            };
            server::start_server(config).await
        }
    }
}
