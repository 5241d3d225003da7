// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deploys the Worker extension resource of a shoot and drives its lifecycle.

use crate::clock::{Clock, SystemClock};
use crate::component::DeployMigrateWaiter;
use crate::constants::{
    annotations, labels, operations, DATA_TYPE_MACHINE_STATE, SECRET_NAME_CLOUD_PROVIDER,
};
use crate::error::{Result, SeedkeeperError};
use crate::kubernetes::extension::{
    annotate_object_with_operation, delete_extension_object, migrate_extension_object,
    restore_extension_object_state, wait_until_extension_object_deleted,
    wait_until_extension_object_migrated, wait_until_extension_object_ready,
    wait_until_object_ready_with_health_function,
};
use crate::kubernetes::{get_and_create_or_merge_patch, HealthError};
use crate::types::shoot::{
    find_machine_type_by_name, MachineType, OperatingSystemConfigs, ShootWorkerPool,
};
use crate::types::shoot_state::{decompress_machine_state, ExtensionResourceState, ShootState};
use crate::types::worker::{
    DataVolume, MachineDeployment, MachineImage, NodeTemplate, Volume, Worker, WorkerPool,
    WorkerSpec, WORKER_RESOURCE,
};
use async_trait::async_trait;
use chrono::SecondsFormat;
use k8s_openapi::api::core::v1::SecretReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Interval between two status checks
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
/// How long polling may go on before an error reported by the extension aborts waiting
pub const DEFAULT_SEVERE_THRESHOLD: Duration = Duration::from_secs(30);
/// Maximum time to wait for the Worker
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Everything needed to render the Worker resource of a shoot
#[derive(Debug, Clone, Default)]
pub struct Values {
    pub namespace: String,
    pub name: String,
    pub worker_type: String,
    pub region: String,
    pub workers: Vec<ShootWorkerPool>,
    pub kubernetes_version: String,
    pub machine_types: Vec<MachineType>,
    pub ssh_public_key: Vec<u8>,
    pub infrastructure_provider_status: Option<RawExtension>,
    pub worker_name_to_operating_system_configs_map: HashMap<String, OperatingSystemConfigs>,
    pub node_local_dns_enabled: bool,
}

pub struct WorkerDeployer {
    client: Client,
    values: Values,
    clock: Arc<dyn Clock>,
    wait_interval: Duration,
    wait_severe_threshold: Duration,
    wait_timeout: Duration,

    machine_deployments: Vec<MachineDeployment>,
    machine_deployments_last_update_time: Option<Time>,
}

impl WorkerDeployer {
    pub fn new(
        client: Client,
        values: Values,
        wait_interval: Duration,
        wait_severe_threshold: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            client,
            values,
            clock: Arc::new(SystemClock),
            wait_interval,
            wait_severe_threshold,
            wait_timeout,
            machine_deployments: Vec::new(),
            machine_deployments_last_update_time: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_ssh_public_key(&mut self, key: Vec<u8>) {
        self.values.ssh_public_key = key;
    }

    pub fn set_infrastructure_provider_status(&mut self, status: Option<RawExtension>) {
        self.values.infrastructure_provider_status = status;
    }

    pub fn set_worker_name_to_operating_system_configs_map(
        &mut self,
        configs: HashMap<String, OperatingSystemConfigs>,
    ) {
        self.values.worker_name_to_operating_system_configs_map = configs;
    }

    /// Machine deployments reported by the Worker after the last successful
    /// `wait_until_worker_status_machine_deployments_updated`
    pub fn machine_deployments(&self) -> &[MachineDeployment] {
        &self.machine_deployments
    }

    fn api(&self) -> Api<Worker> {
        Api::namespaced(self.client.clone(), &self.values.namespace)
    }

    fn template(&self) -> Worker {
        Worker {
            metadata: ObjectMeta {
                name: Some(self.values.name.clone()),
                namespace: Some(self.values.namespace.clone()),
                ..Default::default()
            },
            spec: WorkerSpec::default(),
            status: None,
        }
    }

    #[instrument(skip(self), fields(namespace = %self.values.namespace, name = %self.values.name))]
    async fn deploy_with_operation(&mut self, operation: &str) -> Result<Worker> {
        let api = self.api();
        let existing = api.get_opt(&self.values.name).await?;

        let spec = WorkerSpec {
            worker_type: self.values.worker_type.clone(),
            region: self.values.region.clone(),
            secret_ref: SecretReference {
                name: Some(SECRET_NAME_CLOUD_PROVIDER.to_string()),
                namespace: Some(self.values.namespace.clone()),
            },
            infrastructure_provider_status: self.values.infrastructure_provider_status.clone(),
            pools: build_pools(&self.values, existing.as_ref())?,
            ssh_public_key: (!self.values.ssh_public_key.is_empty())
                .then(|| ByteString(self.values.ssh_public_key.clone())),
        };

        // Needed later to tell whether the status machine deployments were refreshed
        self.machine_deployments_last_update_time = existing
            .as_ref()
            .and_then(|w| w.machine_deployments_last_update_time())
            .cloned();

        let timestamp = self.clock.now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        let (worker, result) =
            get_and_create_or_merge_patch(&api, &self.values.name, self.template(), |worker| {
                let meta = worker.annotations_mut();
                meta.insert(annotations::OPERATION.to_string(), operation.to_string());
                meta.insert(annotations::TIMESTAMP.to_string(), timestamp);
                worker.spec = spec;
            })
            .await?;

        info!("Deployed Worker with operation {:?}: {:?}", operation, result);
        Ok(worker)
    }

    /// Wait until the Worker reports machine deployments newer than the ones seen at the last deploy
    #[instrument(skip(self), fields(namespace = %self.values.namespace, name = %self.values.name))]
    pub async fn wait_until_worker_status_machine_deployments_updated(&mut self) -> Result<()> {
        let previous = self.machine_deployments_last_update_time.clone();

        let worker = wait_until_object_ready_with_health_function(
            &self.api(),
            &self.values.name,
            self.wait_interval,
            self.wait_severe_threshold,
            self.wait_timeout,
            move |worker: &Worker| check_machine_deployments_updated(worker, previous.as_ref()),
        )
        .await?;

        self.machine_deployments = worker
            .status
            .and_then(|s| s.machine_deployments)
            .unwrap_or_default();
        Ok(())
    }
}

fn check_machine_deployments_updated(
    worker: &Worker,
    previous: Option<&Time>,
) -> std::result::Result<(), HealthError> {
    match (worker.machine_deployments_last_update_time(), previous) {
        (Some(_), None) => Ok(()),
        (Some(current), Some(previous)) if current.0 > previous.0 => Ok(()),
        _ => Err(HealthError::pending(
            "worker status machineDeployments has not been updated",
        )),
    }
}

#[async_trait]
impl DeployMigrateWaiter for WorkerDeployer {
    async fn deploy(&mut self) -> Result<()> {
        self.deploy_with_operation(operations::RECONCILE).await?;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        delete_extension_object(&self.api(), &self.values.name, self.clock.as_ref()).await
    }

    async fn wait(&mut self) -> Result<()> {
        wait_until_extension_object_ready(
            &self.api(),
            &self.values.name,
            self.wait_interval,
            self.wait_severe_threshold,
            self.wait_timeout,
        )
        .await?;
        Ok(())
    }

    async fn wait_cleanup(&mut self) -> Result<()> {
        wait_until_extension_object_deleted(
            &self.api(),
            &self.values.name,
            self.wait_interval,
            self.wait_timeout,
        )
        .await
    }

    #[instrument(skip(self, shoot_state), fields(namespace = %self.values.namespace, name = %self.values.name))]
    async fn restore(&mut self, shoot_state: &ShootState) -> Result<()> {
        let mut shoot_state = shoot_state.clone();

        let machine_state = match shoot_state
            .spec
            .gardener_data(DATA_TYPE_MACHINE_STATE)
            .filter(|d| d.data_type == DATA_TYPE_MACHINE_STATE)
        {
            Some(data) => Some(decompress_machine_state(&data.data)?),
            None => None,
        };

        if let Some(state) = machine_state {
            debug!("Moving persisted machine state into the Worker state");
            shoot_state.spec.upsert_extension_state(ExtensionResourceState {
                kind: WORKER_RESOURCE.to_string(),
                name: Some(self.values.name.clone()),
                purpose: None,
                state: state.map(RawExtension),
                resources: vec![],
            });
        }

        let worker = self.deploy_with_operation(operations::WAIT_FOR_STATE).await?;
        let api = self.api();
        restore_extension_object_state(&self.client, &api, &shoot_state, &worker).await?;
        annotate_object_with_operation(&api, &worker.name_any(), operations::RESTORE, self.clock.as_ref())
            .await?;
        Ok(())
    }

    async fn migrate(&mut self) -> Result<()> {
        migrate_extension_object(&self.api(), &self.values.name, self.clock.as_ref()).await
    }

    async fn wait_migrate(&mut self) -> Result<()> {
        wait_until_extension_object_migrated(
            &self.api(),
            &self.values.name,
            self.wait_interval,
            self.wait_timeout,
        )
        .await
    }
}

/// Render the Worker pools from the shoot's worker pools. Node templates of
/// `existing` are kept as long as the pool's machine type did not change.
fn build_pools(values: &Values, existing: Option<&Worker>) -> Result<Vec<WorkerPool>> {
    values
        .workers
        .iter()
        .map(|pool| {
            let version = pool.machine.image.version.clone().ok_or_else(|| {
                SeedkeeperError::InvalidWorker(format!(
                    "worker pool {} has no machine image version",
                    pool.name
                ))
            })?;

            let kubernetes_version = pool
                .kubernetes
                .as_ref()
                .and_then(|k| k.version.clone())
                .unwrap_or_else(|| values.kubernetes_version.clone());

            let user_data = values
                .worker_name_to_operating_system_configs_map
                .get(&pool.name)
                .map(|osc| ByteString(osc.downloader.content.clone().into_bytes()));

            let volume = pool.volume.as_ref().map(|v| Volume {
                name: v.name.clone(),
                volume_type: v.volume_type.clone(),
                size: v.volume_size.clone(),
                encrypted: v.encrypted,
            });

            let data_volumes = (!pool.data_volumes.is_empty()).then(|| {
                pool.data_volumes
                    .iter()
                    .map(|v| DataVolume {
                        name: v.name.clone(),
                        volume_type: v.volume_type.clone(),
                        size: v.volume_size.clone(),
                        encrypted: v.encrypted,
                    })
                    .collect()
            });

            Ok(WorkerPool {
                name: pool.name.clone(),
                minimum: pool.minimum,
                maximum: pool.maximum,
                max_surge: pool.max_surge.clone().unwrap_or(IntOrString::Int(1)),
                max_unavailable: pool.max_unavailable.clone().unwrap_or(IntOrString::Int(0)),
                annotations: pool.annotations.clone(),
                labels: Some(node_labels_for_worker_pool(pool, values.node_local_dns_enabled)),
                taints: pool.taints.clone(),
                machine_type: pool.machine.machine_type.clone(),
                machine_image: MachineImage {
                    name: pool.machine.image.name.clone(),
                    version,
                },
                node_template: node_template(values, existing, pool),
                provider_config: pool.provider_config.clone(),
                user_data,
                volume,
                data_volumes,
                kubelet_data_volume_name: pool.kubelet_data_volume_name.clone(),
                kubernetes_version: Some(kubernetes_version),
                zones: pool.zones.clone(),
                machine_controller_manager_settings: pool.machine_controller_manager_settings.clone(),
                architecture: pool.machine.architecture.clone(),
            })
        })
        .collect()
}

fn node_template(
    values: &Values,
    existing: Option<&Worker>,
    pool: &ShootWorkerPool,
) -> Option<NodeTemplate> {
    let current = existing.and_then(|w| w.pool(&pool.name));
    if let Some(current) = current {
        if current.node_template.is_some() && current.machine_type == pool.machine.machine_type {
            return current.node_template.clone();
        }
    }

    find_machine_type_by_name(&values.machine_types, &pool.machine.machine_type).map(NodeTemplate::from)
}

/// Labels every node of the pool carries, on top of the pool's own labels
pub fn node_labels_for_worker_pool(
    pool: &ShootWorkerPool,
    node_local_dns_enabled: bool,
) -> BTreeMap<String, String> {
    let mut node_labels = pool.labels.clone().unwrap_or_default();

    node_labels.insert(labels::NODE_ROLE.to_string(), "node".to_string());
    node_labels.insert(
        labels::NODE_LOCAL_DNS.to_string(),
        node_local_dns_enabled.to_string(),
    );
    node_labels.insert(labels::WORKER_POOL.to_string(), pool.name.clone());
    node_labels.insert(labels::WORKER_POOL_DEPRECATED.to_string(), pool.name.clone());

    if pool.system_components_allowed() {
        node_labels.insert(labels::SYSTEM_COMPONENTS.to_string(), "true".to_string());
    }

    if let Some(cri) = &pool.cri {
        node_labels.insert(labels::CRI_NAME.to_string(), cri.name.clone());
        for runtime in &cri.container_runtimes {
            node_labels.insert(
                format!("{}{}", labels::CONTAINER_RUNTIME_PREFIX, runtime.runtime_type),
                "true".to_string(),
            );
        }
    }

    node_labels
}

impl From<&MachineType> for NodeTemplate {
    fn from(machine: &MachineType) -> Self {
        NodeTemplate {
            capacity: BTreeMap::from([
                ("cpu".to_string(), machine.cpu.clone()),
                ("gpu".to_string(), machine.gpu.clone()),
                ("memory".to_string(), machine.memory.clone()),
            ]),
        }
    }
}
