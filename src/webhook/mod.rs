// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admission webhook registration for the seed and for shoot clusters.

use crate::constants::webhook::{NAME_PREFIX, NAME_SUFFIX, SERVICE_PORT, TIMEOUT_SECONDS};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde::Deserialize;
use url::Url;

pub mod certificates;
pub mod controller;
pub mod reconciler;
pub mod shoot;

/// Which cluster's API server calls the webhook
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Seed,
    Shoot,
}

/// A resource the webhook intercepts
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct WebhookType {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

/// A webhook served by the extension
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Webhook {
    pub name: String,
    pub path: String,
    pub provider: String,
    pub types: Vec<WebhookType>,
    pub target: Target,
}

/// How the seed API server reaches the webhook server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMode {
    Service,
    Url(Url),
}

/// Webhook configurations to register, one per target that has webhooks
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WebhookConfigs {
    pub seed: Option<MutatingWebhookConfiguration>,
    pub shoot: Option<MutatingWebhookConfiguration>,
}

/// Name of the extension's service and of its seed webhook configuration
pub fn extension_service_name(extension_name: &str) -> String {
    format!("{}{}", NAME_PREFIX, extension_name)
}

/// Name of the webhook configuration registered in shoot clusters
pub fn shoot_webhook_config_name(extension_name: &str) -> String {
    format!("{}-shoot", extension_service_name(extension_name))
}

fn url_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Build the seed and shoot webhook configurations for the given webhooks
pub fn build_webhook_configs(
    webhooks: &[Webhook],
    extension_name: &str,
    namespace: &str,
    mode: &ServerMode,
) -> WebhookConfigs {
    let service_name = extension_service_name(extension_name);
    let short_name = extension_name.trim_start_matches("provider-");

    let seed_webhooks: Vec<MutatingWebhook> = webhooks
        .iter()
        .filter(|w| w.target == Target::Seed)
        .map(|w| {
            let client_config = match mode {
                ServerMode::Service => WebhookClientConfig {
                    service: Some(ServiceReference {
                        name: service_name.clone(),
                        namespace: namespace.to_string(),
                        path: Some(url_path(&w.path)),
                        port: Some(SERVICE_PORT),
                    }),
                    ..Default::default()
                },
                ServerMode::Url(base) => WebhookClientConfig {
                    url: Some(format!("{}{}", base.as_str().trim_end_matches('/'), url_path(&w.path))),
                    ..Default::default()
                },
            };
            mutating_webhook(w, format!("{}.{}.{}", w.name, short_name, NAME_SUFFIX), client_config)
        })
        .collect();

    let shoot_webhooks: Vec<MutatingWebhook> = webhooks
        .iter()
        .filter(|w| w.target == Target::Shoot)
        .map(|w| {
            let client_config = WebhookClientConfig {
                url: Some(format!(
                    "https://{}.{}:{}{}",
                    service_name,
                    namespace,
                    SERVICE_PORT,
                    url_path(&w.path)
                )),
                ..Default::default()
            };
            mutating_webhook(w, format!("{}.{}.{}", w.name, w.provider, NAME_SUFFIX), client_config)
        })
        .collect();

    WebhookConfigs {
        seed: (!seed_webhooks.is_empty()).then(|| configuration(service_name.clone(), seed_webhooks)),
        shoot: (!shoot_webhooks.is_empty())
            .then(|| configuration(shoot_webhook_config_name(extension_name), shoot_webhooks)),
    }
}

fn configuration(name: String, webhooks: Vec<MutatingWebhook>) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}

fn mutating_webhook(
    webhook: &Webhook,
    name: String,
    client_config: WebhookClientConfig,
) -> MutatingWebhook {
    let rules = webhook
        .types
        .iter()
        .map(|t| RuleWithOperations {
            api_groups: Some(vec![t.group.clone()]),
            api_versions: Some(vec![t.version.clone()]),
            resources: Some(vec![t.resource.clone()]),
            operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
            scope: Some("*".to_string()),
        })
        .collect();

    MutatingWebhook {
        name,
        admission_review_versions: vec!["v1".to_string(), "v1beta1".to_string()],
        client_config,
        failure_policy: Some("Fail".to_string()),
        match_policy: Some("Exact".to_string()),
        namespace_selector: Some(LabelSelector::default()),
        object_selector: Some(LabelSelector::default()),
        reinvocation_policy: Some("Never".to_string()),
        rules: Some(rules),
        side_effects: "None".to_string(),
        timeout_seconds: Some(TIMEOUT_SECONDS),
        ..Default::default()
    }
}

/// Set the CA bundle on every webhook of the configuration
pub fn inject_ca_bundle(config: &mut MutatingWebhookConfiguration, bundle: &[u8]) {
    for webhook in config.webhooks.iter_mut().flatten() {
        webhook.client_config.ca_bundle = Some(ByteString(bundle.to_vec()));
    }
}
