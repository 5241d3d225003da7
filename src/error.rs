// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedkeeperError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Error while waiting for {0}")]
    WaitFailed(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Machine state error: {0}")]
    MachineStateError(String),

    #[error("Invalid worker configuration: {0}")]
    InvalidWorker(String),

    #[error("Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SeedkeeperError>;

/// Returns true if the error is a Kubernetes API "not found" response
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
