use clap::{Parser, Subcommand};

use crate::logs::LogFormat;
use crate::server::http::DEFAULT_FALLBACK_PATH;

#[derive(Parser)]
#[command(name = "chat-fallback")]
#[command(about = "Fallback responder for an unavailable chat service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the fallback server
    Start {
        /// The HTTP bind address (host:port), defaults to 0.0.0.0:8080
        #[arg(long, env = "CHAT_FALLBACK_BIND_ADDRESS", group = "server")]
        bind_address: Option<String>,
        /// The Unix socket path to serve on instead of TCP
        #[arg(long, env = "CHAT_FALLBACK_SOCKET_PATH", group = "server")]
        socket_path: Option<String>,
        /// The path the fallback response is served at
        #[arg(long, env = "CHAT_FALLBACK_PATH", default_value = DEFAULT_FALLBACK_PATH)]
        fallback_path: String,
        /// Requests per second allowed per client, rate limiting is off when unset
        #[arg(
            long,
            env = "CHAT_FALLBACK_RATE_LIMIT_RPS",
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        rate_limit_rps: Option<u32>,
        /// Burst size per client when rate limiting is enabled
        #[arg(
            long,
            env = "CHAT_FALLBACK_RATE_LIMIT_BURST",
            default_value_t = 50,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        rate_limit_burst: u32,
        /// Maximum time in seconds spent handling a request
        #[arg(long, env = "CHAT_FALLBACK_REQUEST_TIMEOUT", default_value_t = 10)]
        request_timeout: u64,
        /// The log line format
        #[arg(long, env = "CHAT_FALLBACK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_defaults() {
        let cli = Cli::try_parse_from(["chat-fallback", "start"]).unwrap();
        let Commands::Start {
            bind_address,
            socket_path,
            fallback_path,
            rate_limit_rps,
            rate_limit_burst,
            request_timeout,
            log_format,
        } = cli.command;
        assert!(bind_address.is_none());
        assert!(socket_path.is_none());
        assert_eq!(fallback_path, "/fallback");
        assert!(rate_limit_rps.is_none());
        assert_eq!(rate_limit_burst, 50);
        assert_eq!(request_timeout, 10);
        assert_eq!(log_format, LogFormat::Text);
    }

    #[test]
    fn test_start_with_arguments() {
        let cli = Cli::try_parse_from([
            "chat-fallback",
            "start",
            "--bind-address",
            "127.0.0.1:9000",
            "--fallback-path",
            "/chat/fallback",
            "--rate-limit-rps",
            "20",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Commands::Start {
            bind_address,
            fallback_path,
            rate_limit_rps,
            log_format,
            ..
        } = cli.command;
        assert_eq!(bind_address.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(fallback_path, "/chat/fallback");
        assert_eq!(rate_limit_rps, Some(20));
        assert_eq!(log_format, LogFormat::Json);
    }

    #[test]
    fn test_bind_address_conflicts_with_socket_path() {
        let result = Cli::try_parse_from([
            "chat-fallback",
            "start",
            "--bind-address",
            "127.0.0.1:9000",
            "--socket-path",
            "/tmp/chat-fallback.sock",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let result = Cli::try_parse_from(["chat-fallback", "start", "--rate-limit-rps", "0"]);
        assert!(result.is_err());
    }
}
