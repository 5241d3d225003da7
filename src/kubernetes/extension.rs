// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle helpers shared by all extension resources: health checks, waiting,
//! migration, deletion and state restoration.

use crate::clock::Clock;
use crate::constants::{annotations, operations, OPERATOR_NAME};
use crate::error::{is_not_found, Result, SeedkeeperError};
use crate::kubernetes::objects::delete_ignore_not_found;
use crate::kubernetes::retry::{attempts_within, minor_or_severe, until_timeout, Attempt, RetryError};
use crate::types::extension::{DefaultStatus, LastOperationState, LastOperationType};
use crate::types::shoot_state::ShootState;
use crate::types::worker::Worker;
use chrono::SecondsFormat;
use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind, TypeMeta},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A namespaced resource reconciled by an extension controller
pub trait ExtensionObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn extension_status(&self) -> Option<&DefaultStatus>;

    /// Distinguishes several objects of the same kind for one shoot
    fn purpose(&self) -> Option<&str> {
        None
    }
}

impl ExtensionObject for Worker {
    fn extension_status(&self) -> Option<&DefaultStatus> {
        self.status.as_ref().map(|s| &s.default_status)
    }
}

/// Why an object is not healthy yet
#[derive(Debug, Clone, PartialEq)]
pub struct HealthError {
    pub message: String,
    /// The extension controller reported this error in `lastError`
    pub reported: bool,
    pub retriable: bool,
}

impl HealthError {
    /// The object is still being processed
    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reported: false,
            retriable: true,
        }
    }

    /// An error the extension controller reported
    pub fn reported(message: impl Into<String>, retriable: bool) -> Self {
        Self {
            message: message.into(),
            reported: true,
            retriable,
        }
    }
}

impl fmt::Display for HealthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Check whether the extension controller has successfully reconciled the latest spec
pub fn check_extension_object<K: ExtensionObject>(obj: &K) -> std::result::Result<(), HealthError> {
    let status = obj.extension_status();

    if let Some(last_error) = status.and_then(|s| s.last_error.as_ref()) {
        return Err(HealthError::reported(
            format!("error during reconciliation: {}", last_error.description),
            last_error.is_retriable(),
        ));
    }

    let generation = obj.meta().generation.unwrap_or_default();
    let observed = status.and_then(|s| s.observed_generation).unwrap_or_default();
    if observed != generation {
        return Err(HealthError::pending(format!(
            "observed generation outdated ({}/{})",
            observed, generation
        )));
    }

    if let Some(op) = obj.annotations().get(annotations::OPERATION) {
        return Err(HealthError::pending(format!(
            "gardener operation {:?} is not yet picked up by extension controller",
            op
        )));
    }

    let Some(last_operation) = status.and_then(|s| s.last_operation.as_ref()) else {
        return Err(HealthError::pending(
            "extension did not record a last operation yet",
        ));
    };

    if last_operation.state != LastOperationState::Succeeded {
        return Err(HealthError::pending(format!(
            "extension state is not succeeded but {:?}",
            last_operation.state
        )));
    }

    Ok(())
}

fn describe<K: ExtensionObject>(name: &str) -> String {
    format!("{} {}", K::kind(&()), name)
}

/// Poll the object until `health` passes. Errors reported by the extension become
/// severe once polling lasted longer than `severe_threshold`, non-retriable ones stop
/// immediately. Everything else is retried until `timeout`.
#[instrument(skip(api, health), fields(kind = %K::kind(&())))]
pub async fn wait_until_object_ready_with_health_function<K, H>(
    api: &Api<K>,
    name: &str,
    interval: Duration,
    severe_threshold: Duration,
    timeout: Duration,
    health: H,
) -> Result<K>
where
    K: ExtensionObject,
    H: Fn(&K) -> std::result::Result<(), HealthError> + Send + Sync,
{
    let threshold = attempts_within(severe_threshold, interval);
    let attempts = AtomicU32::new(0);
    let attempts = &attempts;
    let health = &health;

    let result = until_timeout(interval, timeout, move || {
        let api = api.clone();
        async move {
            let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;

            let obj = match api.get(name).await {
                Ok(obj) => obj,
                Err(e) if is_not_found(&e) => return Attempt::Minor(e.to_string()),
                Err(e) => return Attempt::Severe(e.to_string()),
            };

            match health(&obj) {
                Ok(()) => Attempt::Done(obj),
                Err(e) => {
                    debug!("Object did not get ready yet: {}", e);
                    match (e.reported, e.retriable) {
                        (_, false) => Attempt::Severe(e.message),
                        (true, true) => minor_or_severe(count, threshold, e.message),
                        (false, true) => Attempt::Minor(e.message),
                    }
                }
            }
        }
    })
    .await;

    let what = describe::<K>(name);
    match result {
        Ok(obj) => {
            info!("{} is ready", what);
            Ok(obj)
        }
        Err(RetryError::Severe(e)) => Err(SeedkeeperError::WaitFailed(format!(
            "{} to become ready: {}",
            what, e
        ))),
        Err(RetryError::Timeout(last)) => Err(SeedkeeperError::Timeout(format!(
            "{} to become ready: {}",
            what,
            last.unwrap_or_else(|| "no status observed".to_string())
        ))),
    }
}

/// Wait until the extension controller reports a successful reconciliation
pub async fn wait_until_extension_object_ready<K: ExtensionObject>(
    api: &Api<K>,
    name: &str,
    interval: Duration,
    severe_threshold: Duration,
    timeout: Duration,
) -> Result<K> {
    wait_until_object_ready_with_health_function(
        api,
        name,
        interval,
        severe_threshold,
        timeout,
        check_extension_object::<K>,
    )
    .await
}

/// Wait until the object reports a successful migration or is gone
#[instrument(skip(api), fields(kind = %K::kind(&())))]
pub async fn wait_until_extension_object_migrated<K: ExtensionObject>(
    api: &Api<K>,
    name: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let result = until_timeout(interval, timeout, || {
        let api = api.clone();
        async move {
            let obj = match api.get_opt(name).await {
                Ok(Some(obj)) => obj,
                Ok(None) => return Attempt::Done(()),
                Err(e) => return Attempt::Severe(e.to_string()),
            };

            let migrated = obj
                .extension_status()
                .and_then(|s| s.last_operation.as_ref())
                .is_some_and(|op| {
                    op.operation_type == LastOperationType::Migrate
                        && op.state == LastOperationState::Succeeded
                });

            if migrated {
                Attempt::Done(())
            } else {
                Attempt::Minor("extension object has not been migrated yet".to_string())
            }
        }
    })
    .await;

    finish_wait(result, describe::<K>(name), "to be migrated")
}

/// Wait until the object is gone
#[instrument(skip(api), fields(kind = %K::kind(&())))]
pub async fn wait_until_extension_object_deleted<K: ExtensionObject>(
    api: &Api<K>,
    name: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let result = until_timeout(interval, timeout, || {
        let api = api.clone();
        async move {
            let obj = match api.get_opt(name).await {
                Ok(Some(obj)) => obj,
                Ok(None) => return Attempt::Done(()),
                Err(e) => return Attempt::Severe(e.to_string()),
            };

            match obj.extension_status().and_then(|s| s.last_error.as_ref()) {
                Some(last_error) => Attempt::Minor(format!(
                    "still present, last error: {}",
                    last_error.description
                )),
                None => Attempt::Minor("still present".to_string()),
            }
        }
    })
    .await;

    finish_wait(result, describe::<K>(name), "to be deleted")
}

fn finish_wait(
    result: std::result::Result<(), RetryError<String>>,
    what: String,
    goal: &str,
) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(RetryError::Severe(e)) => Err(SeedkeeperError::WaitFailed(format!(
            "{} {}: {}",
            what, goal, e
        ))),
        Err(RetryError::Timeout(last)) => Err(SeedkeeperError::Timeout(format!(
            "{} {}: {}",
            what,
            goal,
            last.unwrap_or_default()
        ))),
    }
}

fn timestamp(clock: &dyn Clock) -> String {
    clock.now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Set the operation annotation (and a fresh timestamp) on the object
#[instrument(skip(api, clock), fields(kind = %K::kind(&())))]
pub async fn annotate_object_with_operation<K: ExtensionObject>(
    api: &Api<K>,
    name: &str,
    operation: &str,
    clock: &dyn Clock,
) -> Result<K> {
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                (annotations::OPERATION): operation,
                (annotations::TIMESTAMP): timestamp(clock),
            }
        }
    });

    Ok(api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?)
}

/// Ask the extension controller to migrate the object; a missing object needs no migration
pub async fn migrate_extension_object<K: ExtensionObject>(
    api: &Api<K>,
    name: &str,
    clock: &dyn Clock,
) -> Result<()> {
    match annotate_object_with_operation(api, name, operations::MIGRATE, clock).await {
        Ok(_) => Ok(()),
        Err(SeedkeeperError::KubeError(e)) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Confirm the deletion of the object and delete it; a missing object is fine
#[instrument(skip(api, clock), fields(kind = %K::kind(&())))]
pub async fn delete_extension_object<K: ExtensionObject>(
    api: &Api<K>,
    name: &str,
    clock: &dyn Clock,
) -> Result<()> {
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                (annotations::CONFIRM_DELETION): "true",
                (annotations::TIMESTAMP): timestamp(clock),
            }
        }
    });

    match api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => {}
        Err(e) if is_not_found(&e) => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    delete_ignore_not_found(api, name).await
}

/// Copy the persisted extension state into the object's status and recreate the
/// resources it references from the resource data of the shoot state.
#[instrument(skip(client, api, shoot_state, obj), fields(kind = %K::kind(&()), name = %obj.name_any()))]
pub async fn restore_extension_object_state<K: ExtensionObject>(
    client: &Client,
    api: &Api<K>,
    shoot_state: &ShootState,
    obj: &K,
) -> Result<()> {
    let name = obj.name_any();
    let kind = K::kind(&());

    let Some(state) = shoot_state
        .spec
        .extension_state(&kind, Some(&name), obj.purpose())
    else {
        debug!("No persisted state for {} {}", kind, name);
        return Ok(());
    };

    let patch = serde_json::json!({
        "status": {
            "state": state.state,
            "resources": state.resources,
        }
    });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    info!("Restored state of {} {}", kind, name);

    let namespace = obj.namespace().unwrap_or_default();
    for resource in &state.resources {
        match shoot_state.spec.resource_data(&resource.resource_ref) {
            Some(data) => {
                restore_resource(client, &namespace, &resource.resource_ref, &data.data).await?
            }
            None => warn!(
                "No resource data persisted for {} {}",
                resource.resource_ref.kind, resource.resource_ref.name
            ),
        }
    }

    Ok(())
}

/// Create or update the referenced object from its persisted data
async fn restore_resource(
    client: &Client,
    namespace: &str,
    reference: &CrossVersionObjectReference,
    data: &RawExtension,
) -> Result<()> {
    let api_version = reference.api_version.clone().unwrap_or_else(|| "v1".to_string());
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version.as_str()),
    };
    let gvk = GroupVersionKind::gvk(group, version, &reference.kind);
    let ar = ApiResource::from_gvk(&gvk);

    let mut obj: DynamicObject = serde_json::from_value(data.0.clone())?;
    obj.types = Some(TypeMeta {
        api_version: api_version.clone(),
        kind: reference.kind.clone(),
    });
    obj.metadata.name = Some(reference.name.clone());
    obj.metadata.namespace = Some(namespace.to_string());
    obj.metadata.resource_version = None;
    obj.metadata.uid = None;

    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
    api.patch(
        &reference.name,
        &PatchParams::apply(OPERATOR_NAME).force(),
        &Patch::Apply(&obj),
    )
    .await?;

    info!("Restored {} {}/{}", reference.kind, namespace, reference.name);
    Ok(())
}
