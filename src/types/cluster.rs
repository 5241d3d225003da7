// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Seed-side copy of the shoot, seed and cloud profile an extension works for.
/// There is one per shoot namespace, named like the namespace.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(group = "extensions.gardener.cloud", version = "v1alpha1", kind = "Cluster")]
#[kube(schema = "disabled")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub cloud_profile: RawExtension,
    pub seed: RawExtension,
    pub shoot: RawExtension,
}
