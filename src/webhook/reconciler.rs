// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic reconciliation of the webhook certificates and of every object
//! that carries the CA bundle.

use crate::clock::{Clock, SystemClock};
use crate::constants::labels;
use crate::error::Result;
use crate::kubernetes::apply;
use crate::types::cluster::Cluster;
use crate::webhook::certificates::{CertificateAuthority, ServerCertificate};
use crate::webhook::shoot::reconcile_webhook_config;
use crate::webhook::{extension_service_name, inject_ca_bundle, ServerMode, WebhookConfigs};
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};
use url::Host;

/// The shoot webhook configuration with the current CA bundle, shared with other tasks
pub type SharedWebhookConfig = Arc<RwLock<Option<MutatingWebhookConfiguration>>>;

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub extension_name: String,
    pub extension_namespace: String,
    pub server_mode: ServerMode,
    /// Port the webhook server listens on, opened towards shoot API servers
    pub server_port: i32,
    pub cert_dir: PathBuf,
    pub shoot_webhook_managed_resource_name: String,
    /// Labels a namespace needs (besides the shoot role) to receive the shoot webhooks
    pub shoot_namespace_selector: BTreeMap<String, String>,
    pub sync_period: Duration,
}

impl ReconcilerOptions {
    /// Labels a namespace must carry to receive the shoot webhooks
    pub fn shoot_namespace_labels(&self) -> BTreeMap<String, String> {
        let mut selector = self.shoot_namespace_selector.clone();
        selector.insert(labels::SHOOT_ROLE.to_string(), "shoot".to_string());
        selector
    }

    /// Label selector matching the shoot namespaces to reconcile
    pub fn shoot_namespace_label_selector(&self) -> String {
        self.shoot_namespace_labels()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Name of the secret the webhook CA is persisted in
pub fn ca_secret_name(extension_name: &str) -> String {
    format!("ca-{}-webhook", extension_name)
}

pub struct CertificateReconciler {
    client: Client,
    options: ReconcilerOptions,
    clock: Arc<dyn Clock>,
    seed_config: Option<MutatingWebhookConfiguration>,
    shoot_config: Option<MutatingWebhookConfiguration>,
    shoot_webhook_config: SharedWebhookConfig,
    ca: Option<CertificateAuthority>,
    server_certificate: Option<ServerCertificate>,
}

impl CertificateReconciler {
    pub fn new(client: Client, options: ReconcilerOptions, configs: WebhookConfigs) -> Self {
        Self {
            client,
            options,
            clock: Arc::new(SystemClock),
            seed_config: configs.seed,
            shoot_config: configs.shoot,
            shoot_webhook_config: Arc::new(RwLock::new(None)),
            ca: None,
            server_certificate: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle to the shoot webhook configuration; `None` until the first reconciliation
    pub fn shoot_webhook_config(&self) -> SharedWebhookConfig {
        self.shoot_webhook_config.clone()
    }

    fn dns_names(&self) -> Vec<String> {
        let service = extension_service_name(&self.options.extension_name);
        match &self.options.server_mode {
            ServerMode::Service => {
                let namespaced = format!("{}.{}", service, self.options.extension_namespace);
                vec![
                    service,
                    namespaced.clone(),
                    format!("{}.svc", namespaced),
                    format!("{}.svc.cluster.local", namespaced),
                ]
            }
            ServerMode::Url(url) => match url.host() {
                Some(Host::Ipv6(addr)) => vec![addr.to_string()],
                Some(host) => vec![host.to_string()],
                None => Vec::new(),
            },
        }
    }

    /// The CA kept from the last pass, else the persisted one, else a new one.
    /// The flag tells whether the CA is already persisted.
    async fn current_ca(&mut self, secrets: &Api<Secret>) -> Result<(CertificateAuthority, bool)> {
        if let Some(ca) = self.ca.take() {
            return Ok((ca, true));
        }

        let common_name = extension_service_name(&self.options.extension_name);
        let name = ca_secret_name(&self.options.extension_name);
        if let Some(secret) = secrets.get_opt(&name).await? {
            if let Some(ca) = CertificateAuthority::from_secret(&secret, &common_name)? {
                info!("Loaded webhook CA from secret {}", name);
                return Ok((ca, true));
            }
        }

        Ok((CertificateAuthority::generate(&common_name, self.clock.now())?, false))
    }

    /// Bring certificates, certificate files and webhook configurations up to date
    #[instrument(skip(self), fields(extension = %self.options.extension_name))]
    pub async fn reconcile(&mut self) -> Result<()> {
        let now = self.clock.now();
        let secrets: Api<Secret> =
            Api::namespaced(self.client.clone(), &self.options.extension_namespace);

        let (mut ca, persisted) = self.current_ca(&secrets).await?;
        let changed = ca.rotate_if_needed(now)?;
        if !persisted || changed {
            let name = ca_secret_name(&self.options.extension_name);
            apply(
                &secrets,
                &name,
                &ca.to_secret(&name, &self.options.extension_namespace),
            )
            .await?;
            debug!("Persisted webhook CA in secret {}", name);
        }

        let renew = self
            .server_certificate
            .as_ref()
            .map_or(true, |cert| cert.needs_renewal(&ca, now));
        if renew {
            let cert = ca.sign_server_certificate(self.dns_names(), now)?;
            cert.write_to_dir(&self.options.cert_dir)?;
            info!("Issued webhook server certificate");
            self.server_certificate = Some(cert);
        }

        let bundle = ca.bundle(now);
        self.ca = Some(ca);

        if let Some(template) = &self.seed_config {
            let mut config = template.clone();
            inject_ca_bundle(&mut config, bundle.as_bytes());
            let configs: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
            apply(&configs, &config.name_any(), &config).await?;
        }

        if let Some(template) = &self.shoot_config {
            let mut config = template.clone();
            inject_ca_bundle(&mut config, bundle.as_bytes());
            *self.shoot_webhook_config.write().await = Some(config.clone());
            self.reconcile_shoot_namespaces(&config).await?;
        }

        Ok(())
    }

    async fn reconcile_shoot_namespaces(&self, config: &MutatingWebhookConfiguration) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let clusters: Api<Cluster> = Api::all(self.client.clone());
        let selector = self.options.shoot_namespace_label_selector();

        for namespace in namespaces.list(&ListParams::default().labels(&selector)).await? {
            let name = namespace.name_any();
            if clusters.get_opt(&name).await?.is_none() {
                debug!("Skipping namespace {} without cluster", name);
                continue;
            }

            reconcile_webhook_config(
                &self.client,
                &name,
                &self.options.extension_namespace,
                &self.options.extension_name,
                &self.options.shoot_webhook_managed_resource_name,
                self.options.server_port,
                config,
            )
            .await?;
        }

        Ok(())
    }

    /// Reconcile once per sync period. Failures are logged and retried on the next tick.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            "Starting certificate reconciler with sync period {:?}",
            self.options.sync_period
        );
        let mut interval = tokio::time::interval(self.options.sync_period);

        loop {
            interval.tick().await;
            if let Err(e) = self.reconcile().await {
                error!("Certificate reconciliation failed: {}", e);
            }
        }
    }
}
