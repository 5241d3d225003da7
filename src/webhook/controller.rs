// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster controller - pushes the shoot webhook configuration into shoot
//! namespaces as soon as their `Cluster` object appears.

use crate::error::{Result, SeedkeeperError};
use crate::types::cluster::Cluster;
use crate::webhook::reconciler::{ReconcilerOptions, SharedWebhookConfig};
use crate::webhook::shoot::reconcile_webhook_config;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    runtime::{controller::Action, watcher::Config as WatcherConfig, Controller},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How long to wait for the first certificate reconciliation
const CONFIG_PENDING_REQUEUE: Duration = Duration::from_secs(10);

pub struct ShootWebhookController {
    client: Client,
    options: ReconcilerOptions,
    config: SharedWebhookConfig,
}

impl ShootWebhookController {
    pub fn new(client: Client, options: ReconcilerOptions, config: SharedWebhookConfig) -> Self {
        Self {
            client,
            options,
            config,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let clusters: Api<Cluster> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(clusters, WatcherConfig::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled cluster: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<ShootWebhookController>) -> Result<Action> {
    // Clusters are named after their shoot namespace
    let namespace_name = cluster.name_any();

    let Some(config) = ctx.config.read().await.clone() else {
        debug!("Shoot webhook config not ready yet, requeueing {}", namespace_name);
        return Ok(Action::requeue(CONFIG_PENDING_REQUEUE));
    };

    let namespaces: Api<Namespace> = Api::all(ctx.client.clone());
    let Some(namespace) = namespaces.get_opt(&namespace_name).await? else {
        debug!("Namespace {} does not exist, skipping", namespace_name);
        return Ok(Action::await_change());
    };

    if !matches_selector(namespace.labels(), &ctx.options.shoot_namespace_labels()) {
        debug!("Namespace {} does not match the shoot selector", namespace_name);
        return Ok(Action::await_change());
    }

    reconcile_webhook_config(
        &ctx.client,
        &namespace_name,
        &ctx.options.extension_namespace,
        &ctx.options.extension_name,
        &ctx.options.shoot_webhook_managed_resource_name,
        ctx.options.server_port,
        &config,
    )
    .await?;

    Ok(Action::await_change())
}

fn error_policy(
    _cluster: Arc<Cluster>,
    error: &SeedkeeperError,
    _ctx: Arc<ShootWebhookController>,
) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(60))
}
