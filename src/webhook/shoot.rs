// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Propagation of the shoot webhook configuration into shoot namespaces.
//!
//! The configuration is stored as a YAML payload in a secret that a
//! `ManagedResource` references; the resource manager applies it to the shoot.

use crate::constants::labels;
use crate::error::Result;
use crate::kubernetes::apply;
use crate::types::managed_resource::{ManagedResource, ManagedResourceSpec, SecretRef};
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Name of the secret holding the payload of a managed resource
pub fn managed_resource_secret_name(managed_resource_name: &str) -> String {
    format!("managedresource-{}", managed_resource_name)
}

/// Key of the webhook configuration inside the managed resource secret
pub fn webhook_config_key(config_name: &str) -> String {
    format!("mutatingwebhookconfiguration____{}.yaml", config_name)
}

/// Allows the shoot's kube-apiserver to reach the extension's webhook server
fn network_policy(
    shoot_namespace: &str,
    extension_namespace: &str,
    extension_name: &str,
    server_port: i32,
) -> Result<NetworkPolicy> {
    let name = super::extension_service_name(extension_name);
    Ok(serde_json::from_value(serde_json::json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": {
            "name": name,
            "namespace": shoot_namespace,
            "annotations": {
                "gardener.cloud/description": format!(
                    "Allows the kube-apiserver to reach the webhook server of {}",
                    name
                )
            }
        },
        "spec": {
            "podSelector": {
                "matchLabels": {"app": "kubernetes", "role": "apiserver"}
            },
            "egress": [{
                "to": [{
                    "namespaceSelector": {
                        "matchLabels": {"kubernetes.io/metadata.name": extension_namespace}
                    },
                    "podSelector": {
                        "matchLabels": {"app.kubernetes.io/name": name}
                    }
                }],
                "ports": [{"protocol": "TCP", "port": server_port}]
            }],
            "policyTypes": ["Egress"]
        }
    }))?)
}

/// Apply the webhook configuration to a shoot namespace through a managed resource
#[instrument(skip(client, config))]
pub async fn reconcile_webhook_config(
    client: &Client,
    shoot_namespace: &str,
    extension_namespace: &str,
    extension_name: &str,
    managed_resource_name: &str,
    server_port: i32,
    config: &MutatingWebhookConfiguration,
) -> Result<()> {
    let policy = network_policy(shoot_namespace, extension_namespace, extension_name, server_port)?;
    let policies: Api<NetworkPolicy> = Api::namespaced(client.clone(), shoot_namespace);
    apply(&policies, &super::extension_service_name(extension_name), &policy).await?;

    let config_name = config.metadata.name.clone().unwrap_or_default();
    let secret_name = managed_resource_secret_name(managed_resource_name);
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.clone()),
            namespace: Some(shoot_namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            webhook_config_key(&config_name),
            ByteString(serde_yaml::to_string(config)?.into_bytes()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    let secrets: Api<Secret> = Api::namespaced(client.clone(), shoot_namespace);
    apply(&secrets, &secret_name, &secret).await?;

    let mut managed_resource = ManagedResource::new(
        managed_resource_name,
        ManagedResourceSpec {
            secret_refs: vec![SecretRef { name: secret_name }],
            class: None,
            inject_labels: Some(BTreeMap::from([(
                labels::NO_CLEANUP.to_string(),
                "true".to_string(),
            )])),
            keep_objects: Some(false),
        },
    );
    managed_resource.metadata.namespace = Some(shoot_namespace.to_string());
    managed_resource.metadata.labels = Some(BTreeMap::from([(
        labels::ORIGIN.to_string(),
        "gardener".to_string(),
    )]));
    let managed_resources: Api<ManagedResource> = Api::namespaced(client.clone(), shoot_namespace);
    apply(&managed_resources, managed_resource_name, &managed_resource).await?;

    info!("Reconciled shoot webhook config in namespace {}", shoot_namespace);
    Ok(())
}

/// Read the webhook configuration back from the managed resource of a shoot namespace
#[instrument(skip(client))]
pub async fn get_shoot_webhook_config(
    client: &Client,
    namespace: &str,
    managed_resource_name: &str,
    config_name: &str,
) -> Result<Option<MutatingWebhookConfiguration>> {
    let managed_resources: Api<ManagedResource> = Api::namespaced(client.clone(), namespace);
    let Some(managed_resource) = managed_resources.get_opt(managed_resource_name).await? else {
        debug!("Managed resource {} not found", managed_resource_name);
        return Ok(None);
    };

    let Some(secret_name) = managed_resource.first_secret_name() else {
        return Ok(None);
    };

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let Some(secret) = secrets.get_opt(secret_name).await? else {
        return Ok(None);
    };

    let payload = secret
        .data
        .as_ref()
        .and_then(|d| d.get(&webhook_config_key(config_name)));
    match payload {
        Some(payload) => Ok(Some(serde_yaml::from_slice(&payload.0)?)),
        None => Ok(None),
    }
}
