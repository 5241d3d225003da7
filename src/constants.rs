// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Annotation keys understood by extension controllers
pub mod annotations {
    /// Operation the extension controller should perform on the next reconciliation
    pub const OPERATION: &str = "gardener.cloud/operation";
    /// Time at which the operation annotation was set
    pub const TIMESTAMP: &str = "gardener.cloud/timestamp";
    /// Must be "true" before an extension object may be deleted
    pub const CONFIRM_DELETION: &str = "confirmation.gardener.cloud/deletion";
}

/// Values of the operation annotation
pub mod operations {
    pub const RECONCILE: &str = "reconcile";
    pub const MIGRATE: &str = "migrate";
    pub const RESTORE: &str = "restore";
    pub const WAIT_FOR_STATE: &str = "wait-for-state";
}

/// Node labels written onto worker pools
pub mod labels {
    pub const NODE_ROLE: &str = "node.kubernetes.io/role";
    pub const NODE_LOCAL_DNS: &str = "networking.gardener.cloud/node-local-dns-enabled";
    pub const WORKER_POOL: &str = "worker.gardener.cloud/pool";
    pub const WORKER_POOL_DEPRECATED: &str = "worker.garden.sapcloud.io/group";
    pub const SYSTEM_COMPONENTS: &str = "worker.gardener.cloud/system-components";
    pub const CRI_NAME: &str = "worker.gardener.cloud/cri-name";
    /// Prefix; the container runtime type is appended
    pub const CONTAINER_RUNTIME_PREFIX: &str = "containerruntime.worker.gardener.cloud/";
    pub const SHOOT_ROLE: &str = "gardener.cloud/role";
    pub const NO_CLEANUP: &str = "shoot.gardener.cloud/no-cleanup";
    pub const ORIGIN: &str = "origin";
}

/// Name of the secret holding the cloud provider credentials of a shoot namespace
pub const SECRET_NAME_CLOUD_PROVIDER: &str = "cloudprovider";

/// Gardener resource data name and type under which machine state is persisted
pub const DATA_TYPE_MACHINE_STATE: &str = "machine-state";

/// The operator name used for server-side apply
pub const OPERATOR_NAME: &str = "seedkeeper";

/// Webhook certificate settings
pub mod certificates {
    /// Validity of the generated webhook CA in days
    pub const CA_VALIDITY_DAYS: i64 = 30;
    /// Validity of the generated server certificate in days
    pub const SERVER_CERT_VALIDITY_DAYS: i64 = 30;
    /// Fraction of the validity after which a certificate is renewed
    pub const RENEWAL_THRESHOLD: f64 = 0.80;
    /// How long a rotated CA stays in the bundle
    pub const OLD_CA_GRACE_HOURS: i64 = 24;
    /// Default interval between certificate reconciliations
    pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 30 * 60;

    pub const CA_CERT_KEY: &str = "ca.crt";
    pub const CA_KEY_KEY: &str = "ca.key";
    pub const CA_PREVIOUS_CERT_KEY: &str = "ca-previous.crt";
    pub const ISSUED_AT_ANNOTATION: &str = "secrets-manager.gardener.cloud/issued-at-time";
    pub const ROTATED_AT_ANNOTATION: &str =
        "secrets-manager.gardener.cloud/last-rotation-initiation-time";

    pub const SERVER_CERT_FILE: &str = "tls.crt";
    pub const SERVER_KEY_FILE: &str = "tls.key";
}

/// Extension webhook settings
pub mod webhook {
    pub const NAME_PREFIX: &str = "gardener-extension-";
    pub const NAME_SUFFIX: &str = "extensions.gardener.cloud";
    pub const SERVICE_PORT: i32 = 443;
    pub const TIMEOUT_SECONDS: i32 = 10;
    pub const DEFAULT_SERVER_PORT: i32 = 10250;
}
