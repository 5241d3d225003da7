// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for object lifecycle, merge patches and polling.

pub mod extension;
pub mod objects;
pub mod patch;
pub mod retry;

pub use extension::{check_extension_object, ExtensionObject, HealthError};
pub use objects::{apply, delete_ignore_not_found, get_and_create_or_merge_patch, OperationResult};
