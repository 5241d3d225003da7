// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Generic object create/patch/delete helpers

use crate::constants::OPERATOR_NAME;
use crate::error::{is_not_found, Result};
use crate::kubernetes::patch::{is_empty_patch, merge_patch_diff};
use kube::{
    api::{DeleteParams, Patch, PatchParams, PostParams},
    Api, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{debug, info, instrument};

/// What `get_and_create_or_merge_patch` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Delete an object, treating "not found" as success
#[instrument(skip(api))]
pub async fn delete_ignore_not_found<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            debug!("Deleted {}", name);
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            debug!("{} already gone", name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetch the object and create it if missing, or merge-patch the difference introduced
/// by `mutate`. The patch carries no resource version, so arrays are replaced as a whole.
#[instrument(skip(api, template, mutate))]
pub async fn get_and_create_or_merge_patch<K, F>(
    api: &Api<K>,
    name: &str,
    template: K,
    mutate: F,
) -> Result<(K, OperationResult)>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
    F: FnOnce(&mut K),
{
    let Some(existing) = api.get_opt(name).await? else {
        let mut obj = template;
        mutate(&mut obj);
        let created = api.create(&PostParams::default(), &obj).await?;
        info!("Created {}", name);
        return Ok((created, OperationResult::Created));
    };

    let before = serde_json::to_value(&existing)?;
    let mut desired = existing.clone();
    mutate(&mut desired);
    let patch = merge_patch_diff(&before, &serde_json::to_value(&desired)?);

    if is_empty_patch(&patch) {
        debug!("{} is up to date", name);
        return Ok((existing, OperationResult::Unchanged));
    }

    let patched = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    info!("Patched {}", name);
    Ok((patched, OperationResult::Updated))
}

/// Create or update an object with server-side apply
pub async fn apply<K>(api: &Api<K>, name: &str, obj: &K) -> Result<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let pp = PatchParams::apply(OPERATOR_NAME).force();
    Ok(api.patch(name, &pp, &Patch::Apply(obj)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{not_found_json, MockService};
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map_json(data: &[(&str, &str)]) -> String {
        let data: BTreeMap<_, _> = data.iter().cloned().collect();
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm", "namespace": "default", "resourceVersion": "1"},
            "data": data
        })
        .to_string()
    }

    fn template() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cm".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn set_data(cm: &mut ConfigMap) {
        cm.data = Some(BTreeMap::from([("key".to_string(), "new".to_string())]));
    }

    #[tokio::test]
    async fn test_delete_ignore_not_found() {
        let mock = MockService::new().on_delete(
            "/api/v1/namespaces/default/configmaps/cm",
            404,
            &not_found_json("configmaps", "cm"),
        );
        let api: Api<ConfigMap> = Api::namespaced(mock.clone().into_client(), "default");

        delete_ignore_not_found(&api, "cm").await.unwrap();
        assert_eq!(mock.requests_for("DELETE").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_propagates_other_errors() {
        let mock = MockService::new().on_delete(
            "/api/v1/namespaces/default/configmaps/cm",
            403,
            r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"forbidden","reason":"Forbidden","code":403}"#,
        );
        let api: Api<ConfigMap> = Api::namespaced(mock.into_client(), "default");

        assert!(delete_ignore_not_found(&api, "cm").await.is_err());
    }

    #[tokio::test]
    async fn test_get_and_create_or_merge_patch_creates_missing_object() {
        let mock = MockService::new()
            .on_get(
                "/api/v1/namespaces/default/configmaps/cm",
                404,
                &not_found_json("configmaps", "cm"),
            )
            .on_post(
                "/api/v1/namespaces/default/configmaps",
                201,
                &config_map_json(&[("key", "new")]),
            );
        let api: Api<ConfigMap> = Api::namespaced(mock.clone().into_client(), "default");

        let (_, result) = get_and_create_or_merge_patch(&api, "cm", template(), set_data)
            .await
            .unwrap();

        assert_eq!(result, OperationResult::Created);
        let posted = &mock.requests_for("POST")[0];
        assert_eq!(posted.json()["data"]["key"], "new");
    }

    #[tokio::test]
    async fn test_get_and_create_or_merge_patch_patches_difference() {
        let mock = MockService::new()
            .on_get(
                "/api/v1/namespaces/default/configmaps/cm",
                200,
                &config_map_json(&[("key", "old"), ("other", "x")]),
            )
            .on_patch(
                "/api/v1/namespaces/default/configmaps/cm",
                200,
                &config_map_json(&[("key", "new")]),
            );
        let api: Api<ConfigMap> = Api::namespaced(mock.clone().into_client(), "default");

        let (_, result) = get_and_create_or_merge_patch(&api, "cm", template(), set_data)
            .await
            .unwrap();

        assert_eq!(result, OperationResult::Updated);
        let patch = mock.requests_for("PATCH")[0].json();
        assert_eq!(
            patch,
            serde_json::json!({"data": {"key": "new", "other": null}})
        );
    }

    #[tokio::test]
    async fn test_get_and_create_or_merge_patch_skips_unchanged() {
        let mock = MockService::new().on_get(
            "/api/v1/namespaces/default/configmaps/cm",
            200,
            &config_map_json(&[("key", "new")]),
        );
        let api: Api<ConfigMap> = Api::namespaced(mock.clone().into_client(), "default");

        let (_, result) = get_and_create_or_merge_patch(&api, "cm", template(), set_data)
            .await
            .unwrap();

        assert_eq!(result, OperationResult::Unchanged);
        assert!(mock.requests_for("PATCH").is_empty());
    }
}
