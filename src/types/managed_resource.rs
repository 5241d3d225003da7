// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A set of objects, stored as encoded secret payloads, that the resource manager
/// applies to a target cluster.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(group = "resources.gardener.cloud", version = "v1alpha1", kind = "ManagedResource")]
#[kube(namespaced)]
#[kube(schema = "disabled")]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceSpec {
    #[serde(default)]
    pub secret_refs: Vec<SecretRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inject_labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_objects: Option<bool>,
}

impl ManagedResource {
    /// Name of the first referenced secret
    pub fn first_secret_name(&self) -> Option<&str> {
        self.spec
            .secret_refs
            .first()
            .map(|r| r.name.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SecretRef {
    pub name: String,
}
