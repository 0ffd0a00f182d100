use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// SIP signaling server
#[derive(Debug, Parser)]
#[command(name = "siphon", version, about)]
pub struct Args {
    /// TOML configuration file; `SIPHON__*` environment variables override it
    #[arg(short, long, env = "SIPHON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:5060", env = "SIPHON_BIND")]
    pub bind: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Capacity of the inbound event channel
    #[arg(long)]
    pub channel_capacity: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["siphon"]);
        assert_eq!(args.bind, "0.0.0.0:5060".parse().unwrap());
        assert_eq!(args.log_level, "info");
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "siphon",
            "--bind",
            "127.0.0.1:5080",
            "--config",
            "siphon.toml",
            "--json-logs",
            "-l",
            "debug",
        ]);
        assert_eq!(args.bind.port(), 5080);
        assert_eq!(args.config, Some(PathBuf::from("siphon.toml")));
        assert!(args.json_logs);
        assert_eq!(args.log_level, "debug");
    }
}
