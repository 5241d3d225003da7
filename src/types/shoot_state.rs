// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{Result, SeedkeeperError};
use crate::types::extension::NamedResourceReference;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use k8s_openapi::ByteString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Persisted state of a shoot's control plane, used to restore it in another seed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "ShootState")]
#[kube(namespaced)]
#[kube(schema = "disabled")]
#[serde(rename_all = "camelCase")]
pub struct ShootStateSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gardener: Vec<GardenerResourceData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionResourceState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceData>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GardenerResourceData {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub data: RawExtension,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExtensionResourceState {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RawExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<NamedResourceReference>,
}

impl ExtensionResourceState {
    fn matches(&self, kind: &str, name: Option<&str>, purpose: Option<&str>) -> bool {
        self.kind == kind && self.name.as_deref() == name && self.purpose.as_deref() == purpose
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResourceData {
    #[serde(flatten)]
    pub resource_ref: CrossVersionObjectReference,
    pub data: RawExtension,
}

impl ShootStateSpec {
    /// Gardener data entry with the given name
    pub fn gardener_data(&self, name: &str) -> Option<&GardenerResourceData> {
        self.gardener.iter().find(|d| d.name == name)
    }

    /// Extension state entry identified by kind, name and purpose
    pub fn extension_state(
        &self,
        kind: &str,
        name: Option<&str>,
        purpose: Option<&str>,
    ) -> Option<&ExtensionResourceState> {
        self.extensions.iter().find(|e| e.matches(kind, name, purpose))
    }

    /// Replace the matching extension state entry or append a new one
    pub fn upsert_extension_state(&mut self, state: ExtensionResourceState) {
        let existing = self.extensions.iter_mut().find(|e| {
            e.matches(&state.kind, state.name.as_deref(), state.purpose.as_deref())
        });

        match existing {
            Some(e) => *e = state,
            None => self.extensions.push(state),
        }
    }

    /// Resource data saved for the given object reference
    pub fn resource_data(&self, reference: &CrossVersionObjectReference) -> Option<&ResourceData> {
        self.resources.iter().find(|r| {
            r.resource_ref.kind == reference.kind
                && r.resource_ref.name == reference.name
                && r.resource_ref.api_version == reference.api_version
        })
    }
}

#[derive(Serialize, Deserialize)]
struct CompressedMachineState {
    state: ByteString,
}

/// Unpack machine state stored as `{"state": base64(gzip(json))}`.
/// Returns `None` if nothing was stored.
pub fn decompress_machine_state(data: &RawExtension) -> Result<Option<serde_json::Value>> {
    if data.0.is_null() {
        return Ok(None);
    }

    let compressed: CompressedMachineState = serde_json::from_value(data.0.clone())?;
    if compressed.state.0.is_empty() {
        return Ok(None);
    }

    let mut decompressed = Vec::new();
    GzDecoder::new(compressed.state.0.as_slice())
        .read_to_end(&mut decompressed)
        .map_err(|e| {
            SeedkeeperError::MachineStateError(format!("failed to decompress machine state: {}", e))
        })?;

    Ok(Some(serde_json::from_slice(&decompressed)?))
}

/// Pack machine state into the format read by `decompress_machine_state`
pub fn compress_machine_state(state: &serde_json::Value) -> Result<RawExtension> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serde_json::to_vec(state)?)?;
    let compressed = encoder.finish()?;

    Ok(RawExtension(serde_json::to_value(CompressedMachineState {
        state: ByteString(compressed),
    })?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_state_survives_compression() {
        let state = serde_json::json!({"machineDeployments": {"pool-z1": {"replicas": 2}}});

        let compressed = compress_machine_state(&state).unwrap();
        assert!(compressed.0["state"].is_string());

        assert_eq!(decompress_machine_state(&compressed).unwrap(), Some(state));
    }

    #[test]
    fn test_decompress_machine_state_without_data() {
        assert_eq!(
            decompress_machine_state(&RawExtension(serde_json::Value::Null)).unwrap(),
            None
        );
    }

    #[test]
    fn test_decompress_machine_state_rejects_plain_bytes() {
        let data = RawExtension(serde_json::json!({"state": "bm90IGd6aXA="}));
        assert!(matches!(
            decompress_machine_state(&data),
            Err(SeedkeeperError::MachineStateError(_))
        ));
    }

    fn make_state(kind: &str, name: &str, state: serde_json::Value) -> ExtensionResourceState {
        ExtensionResourceState {
            kind: kind.to_string(),
            name: Some(name.to_string()),
            purpose: None,
            state: Some(RawExtension(state)),
            resources: vec![],
        }
    }

    #[test]
    fn test_upsert_extension_state_appends_new_entry() {
        let mut spec = ShootStateSpec::default();
        spec.upsert_extension_state(make_state("Worker", "foo", serde_json::json!({"a": 1})));
        spec.upsert_extension_state(make_state("Infrastructure", "foo", serde_json::json!({})));

        assert_eq!(spec.extensions.len(), 2);
    }

    #[test]
    fn test_upsert_extension_state_replaces_matching_entry() {
        let mut spec = ShootStateSpec::default();
        spec.upsert_extension_state(make_state("Worker", "foo", serde_json::json!({"a": 1})));
        spec.upsert_extension_state(make_state("Worker", "foo", serde_json::json!({"a": 2})));

        assert_eq!(spec.extensions.len(), 1);
        let state = spec.extension_state("Worker", Some("foo"), None).unwrap();
        assert_eq!(state.state.as_ref().unwrap().0["a"], 2);
    }

    #[test]
    fn test_resource_data_matches_flattened_reference() {
        let spec: ShootStateSpec = serde_json::from_value(serde_json::json!({
            "resources": [{
                "apiVersion": "v1",
                "kind": "Secret",
                "name": "machine-credentials",
                "data": {"foo": "bar"}
            }]
        }))
        .unwrap();

        let reference = CrossVersionObjectReference {
            api_version: Some("v1".to_string()),
            kind: "Secret".to_string(),
            name: "machine-credentials".to_string(),
        };

        assert_eq!(spec.resource_data(&reference).unwrap().data.0["foo"], "bar");
    }
}
