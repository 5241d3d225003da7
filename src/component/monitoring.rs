// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cleanup of the legacy per-shoot alertmanager.

use crate::error::Result;
use crate::kubernetes::delete_ignore_not_found;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client};
use tracing::{info, instrument};

pub const STATEFUL_SET_NAME: &str = "alertmanager";
pub const INGRESS_NAME: &str = "alertmanager";
pub const SERVICE_NAMES: [&str; 2] = ["alertmanager-client", "alertmanager"];
pub const SECRET_NAMES: [&str; 2] = ["alertmanager-basic-auth", "alertmanager-config"];
pub const PVC_NAME: &str = "alertmanager-db-alertmanager-0";

/// Delete all alertmanager objects of the namespace. Objects that are already gone are skipped.
#[instrument(skip(client))]
pub async fn delete_alertmanager(client: &Client, namespace: &str) -> Result<()> {
    let stateful_sets: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let ingresses: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);

    delete_ignore_not_found(&stateful_sets, STATEFUL_SET_NAME).await?;
    delete_ignore_not_found(&ingresses, INGRESS_NAME).await?;
    for name in SERVICE_NAMES {
        delete_ignore_not_found(&services, name).await?;
    }
    for name in SECRET_NAMES {
        delete_ignore_not_found(&secrets, name).await?;
    }
    delete_ignore_not_found(&pvcs, PVC_NAME).await?;

    info!("Deleted alertmanager in namespace {}", namespace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{status_success_json, MockService};

    const NS: &str = "shoot--foo--bar";

    #[tokio::test]
    async fn test_delete_alertmanager_deletes_all_objects() {
        let mock = MockService::new()
            .on_delete(
                &format!("/apis/apps/v1/namespaces/{}/statefulsets/alertmanager", NS),
                200,
                &status_success_json(),
            )
            .on_delete(
                &format!("/api/v1/namespaces/{}/services", NS),
                200,
                &status_success_json(),
            )
            .on_delete(
                &format!("/api/v1/namespaces/{}/secrets", NS),
                200,
                &status_success_json(),
            );

        delete_alertmanager(&mock.clone().into_client(), NS)
            .await
            .unwrap();

        let paths: Vec<String> = mock
            .requests_for("DELETE")
            .into_iter()
            .map(|r| r.path)
            .collect();

        assert_eq!(
            paths,
            vec![
                format!("/apis/apps/v1/namespaces/{}/statefulsets/alertmanager", NS),
                format!("/apis/networking.k8s.io/v1/namespaces/{}/ingresses/alertmanager", NS),
                format!("/api/v1/namespaces/{}/services/alertmanager-client", NS),
                format!("/api/v1/namespaces/{}/services/alertmanager", NS),
                format!("/api/v1/namespaces/{}/secrets/alertmanager-basic-auth", NS),
                format!("/api/v1/namespaces/{}/secrets/alertmanager-config", NS),
                format!(
                    "/api/v1/namespaces/{}/persistentvolumeclaims/alertmanager-db-alertmanager-0",
                    NS
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_alertmanager_when_nothing_exists() {
        // Unregistered paths answer 404
        let mock = MockService::new();

        delete_alertmanager(&mock.clone().into_client(), NS)
            .await
            .unwrap();

        assert_eq!(mock.requests_for("DELETE").len(), 7);
    }

    #[tokio::test]
    async fn test_delete_alertmanager_propagates_errors() {
        let mock = MockService::new().on_delete(
            &format!("/apis/apps/v1/namespaces/{}/statefulsets/alertmanager", NS),
            500,
            r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"etcd unavailable","reason":"InternalError","code":500}"#,
        );

        let result = delete_alertmanager(&mock.clone().into_client(), NS).await;

        assert!(result.is_err());
        assert_eq!(mock.requests_for("DELETE").len(), 1);
    }
}
