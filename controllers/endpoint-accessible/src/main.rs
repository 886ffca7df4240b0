//! Endpoint Accessibility Controller
//!
//! Reports whether the endpoints published by a set of Ingress objects are
//! reachable. Every sync interval it lists the Ingress hosts, probes
//! `https://<host>/healthz` for each of them and publishes one aggregate
//! status:
//! - `/status` and `/readyz` on the status server
//! - Prometheus metrics on `/metrics`
//! - Kubernetes Events when the degraded state flips

mod config;
mod controller;
mod error;
mod metrics;
mod server;
mod source;
mod startup;
mod status;
mod trigger;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Endpoint Accessibility Controller");

    // Both kube and reqwest use rustls; pin the ring provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    let config = Config::from_env()?;
    config.log();

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
