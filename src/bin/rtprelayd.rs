//! Thin CLI entry point: loads configuration, wires up a `RelayService`,
//! and runs it until Ctrl-C. The real SIP signaling plane is out of scope; this
//! binary exists so the crate is a runnable, testable artifact on its own.

use std::sync::Arc;

use clap::Parser;
use rtprelay::backend::{DisabledBackend, LoggingFirewallController, MasqueradeBackend, RelayBackend, UserspaceBackend};
use rtprelay::{RelayConfig, RelayMode, RelayService};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rtprelayd", about = "RTP/RTCP media relay for a SIP proxy")]
struct Args {
    /// Path to a TOML configuration file. Falls back to built-in defaults.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter.clone()))
        .init();

    let backend: Arc<dyn RelayBackend> = match config.rtp_proxy_enable {
        RelayMode::Userspace => Arc::new(UserspaceBackend::new()),
        RelayMode::Masquerade => Arc::new(MasqueradeBackend::new(Box::new(LoggingFirewallController))),
        RelayMode::Disabled => Arc::new(DisabledBackend::new()),
    };

    tracing::info!(mode = ?config.rtp_proxy_enable, "starting rtprelayd");
    let service = RelayService::new(config, backend);
    service.spawn_relay_loop();

    tokio::signal::ctrl_c().await?;
    service.shutdown().await;
    Ok(())
}
