// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use seedkeeper::config::Config;
use seedkeeper::webhook::controller::ShootWebhookController;
use seedkeeper::webhook::reconciler::CertificateReconciler;
use seedkeeper::webhook::{build_webhook_configs, Webhook};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Seedkeeper");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: extension={} type={} namespace={}",
        config.extension_name, config.extension_type, config.extension_namespace
    );

    let raw = std::fs::read_to_string(&config.webhook_config_file).with_context(|| {
        format!("failed to read webhook config {}", config.webhook_config_file.display())
    })?;
    let webhooks: Vec<Webhook> =
        serde_yaml::from_str(&raw).context("failed to parse webhook config")?;
    let configs = build_webhook_configs(
        &webhooks,
        &config.extension_name,
        &config.extension_namespace,
        &config.server_mode,
    );
    info!("Loaded {} webhooks", webhooks.len());

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let options = config.reconciler_options();
    let reconciler = CertificateReconciler::new(client.clone(), options.clone(), configs);
    let controller =
        ShootWebhookController::new(client, options, reconciler.shoot_webhook_config());

    info!("Starting certificate reconciler and cluster controller...");
    tokio::try_join!(reconciler.run(), controller.run())?;

    warn!("Seedkeeper stopped unexpectedly");
    Ok(())
}
