//! probe-relay: the responder half of a connectivity probe
//!
//! Given a target endpoint and a nonce, the relay:
//! - connects to the target over TCP, or opens a UDP socket towards it
//! - sends the nonce as the first payload
//! - echoes everything the target sends until it closes (TCP) or goes
//!   quiet for the idle timeout (UDP)
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod error;
mod relay;
mod request;

use config::Config;
use request::ProbeRequest;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let request = ProbeRequest::new(
        &config.protocol,
        &config.address,
        config.port,
        config.nonce.as_bytes(),
    )?;

    info!(
        protocol = %config.protocol,
        transport = %request.transport(),
        target = %request.target(),
        nonce_len = request.token().len(),
        datagram_idle_timeout_ms = config.settings.datagram_idle_timeout.as_millis() as u64,
        "Starting probe-relay"
    );

    relay::run(&request, &config.settings).await?;
    Ok(())
}
