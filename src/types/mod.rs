// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources and shoot-side inputs owned by the platform.

pub mod cluster;
pub mod extension;
pub mod managed_resource;
pub mod shoot;
pub mod shoot_state;
pub mod worker;
