// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::extension::DefaultStatus;
use k8s_openapi::api::core::v1::{SecretReference, Taint};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind name of the Worker extension resource
pub const WORKER_RESOURCE: &str = "Worker";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(group = "extensions.gardener.cloud", version = "v1alpha1", kind = "Worker")]
#[kube(namespaced)]
#[kube(status = "WorkerStatus")]
#[kube(schema = "disabled")]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    #[serde(rename = "type")]
    pub worker_type: String,
    pub region: String,
    pub secret_ref: SecretReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure_provider_status: Option<RawExtension>,
    #[serde(default)]
    pub pools: Vec<WorkerPool>,
    #[serde(rename = "sshPublicKey", skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<ByteString>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPool {
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub max_surge: IntOrString,
    pub max_unavailable: IntOrString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taints: Option<Vec<Taint>>,
    pub machine_type: String,
    pub machine_image: MachineImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_template: Option<NodeTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<RawExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<ByteString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_volumes: Option<Vec<DataVolume>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubelet_data_volume_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(
        rename = "machineControllerManager",
        skip_serializing_if = "Option::is_none"
    )]
    pub machine_controller_manager_settings: Option<MachineControllerManagerSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct MachineImage {
    pub name: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct NodeTemplate {
    pub capacity: BTreeMap<String, Quantity>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Volume {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DataVolume {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineControllerManagerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_drain_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_health_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_creation_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_evict_retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_conditions: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    #[serde(flatten)]
    pub default_status: DefaultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_deployments: Option<Vec<MachineDeployment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_deployments_last_update_time: Option<Time>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MachineDeployment {
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
}

impl Worker {
    /// The pool with the given name in the current spec, if any
    pub fn pool(&self, name: &str) -> Option<&WorkerPool> {
        self.spec.pools.iter().find(|p| p.name == name)
    }

    pub fn machine_deployments_last_update_time(&self) -> Option<&Time> {
        self.status
            .as_ref()
            .and_then(|s| s.machine_deployments_last_update_time.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_status_flattens_default_status() {
        let worker: Worker = serde_json::from_value(serde_json::json!({
            "apiVersion": "extensions.gardener.cloud/v1alpha1",
            "kind": "Worker",
            "metadata": {"name": "foo", "namespace": "shoot--bar--foo", "generation": 2},
            "spec": {
                "type": "aws",
                "region": "eu-west-1",
                "secretRef": {"name": "cloudprovider", "namespace": "shoot--bar--foo"},
                "pools": []
            },
            "status": {
                "observedGeneration": 2,
                "machineDeployments": [{"name": "pool-a-z1", "minimum": 1, "maximum": 3}],
                "machineDeploymentsLastUpdateTime": "2026-01-01T10:00:00Z"
            }
        }))
        .unwrap();

        let status = worker.status.as_ref().unwrap();
        assert_eq!(status.default_status.observed_generation, Some(2));
        assert_eq!(status.machine_deployments.as_ref().unwrap()[0].name, "pool-a-z1");
        assert!(worker.machine_deployments_last_update_time().is_some());
    }

    #[test]
    fn test_worker_spec_serializes_type_and_ssh_key() {
        let spec = WorkerSpec {
            worker_type: "aws".to_string(),
            region: "eu-west-1".to_string(),
            ssh_public_key: Some(ByteString(b"ssh-rsa AAA".to_vec())),
            ..Default::default()
        };

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["type"], "aws");
        assert_eq!(value["sshPublicKey"], "c3NoLXJzYSBBQUE=");
        assert!(value.get("infrastructureProviderStatus").is_none());
    }
}
