//! siphon server binary

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Instrument, Level};

use siphon::{Args, DefaultHandler};
use siphon_dialog_core::{CoreConfig, SipServer};
use siphon_infra_common::logging::{log_welcome, parse_log_level, setup_logging, LogContext, LoggingConfig};
use siphon_sip_transport::UdpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "siphon");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;
    log_welcome("siphon", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::load(args.config.as_deref()).context("loading configuration")?;
    let context = LogContext::with_operation("server", "run").with_field("bind", args.bind.to_string());

    run(args, config).instrument(context.span(Level::INFO)).await
}

async fn run(args: Args, config: CoreConfig) -> anyhow::Result<()> {
    let (transport, events) = UdpTransport::bind(args.bind, args.channel_capacity)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    let server = SipServer::new(config, Arc::new(transport), events, Arc::new(DefaultHandler))?;
    server.start()?;
    info!(local_addr = %server.local_addr()?, "Listening");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");
    server.shutdown().await?;
    Ok(())
}
