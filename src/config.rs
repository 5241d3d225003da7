// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::certificates::DEFAULT_SYNC_PERIOD_SECS;
use crate::constants::webhook::DEFAULT_SERVER_PORT;
use crate::webhook::reconciler::ReconcilerOptions;
use crate::webhook::ServerMode;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub extension_name: String,
    pub extension_namespace: String,
    /// Provider type handled by the extension, e.g. `aws`
    pub extension_type: String,
    /// YAML file listing the webhooks the extension serves
    pub webhook_config_file: PathBuf,
    pub cert_dir: PathBuf,
    pub server_mode: ServerMode,
    pub server_port: i32,
    pub shoot_webhook_managed_resource_name: String,
    pub shoot_namespace_selector: BTreeMap<String, String>,
    pub cert_sync_period: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).with_context(|| format!("{} environment variable not set", key))
        };

        let extension_name = required("EXTENSION_NAME")?;
        let extension_namespace = required("EXTENSION_NAMESPACE")?;
        let extension_type = required("EXTENSION_TYPE")?;
        let webhook_config_file = PathBuf::from(required("WEBHOOK_CONFIG_FILE")?);
        let cert_dir = PathBuf::from(
            lookup("WEBHOOK_CERT_DIR").unwrap_or_else(|| "/tmp/seedkeeper-certs".to_string()),
        );

        let server_mode = match lookup("WEBHOOK_SERVER_MODE").as_deref() {
            None | Some("service") => ServerMode::Service,
            Some("url") => {
                let url = required("WEBHOOK_SERVER_URL")?;
                let parsed = Url::parse(&url)
                    .with_context(|| format!("invalid WEBHOOK_SERVER_URL {:?}", url))?;
                if parsed.host().is_none() {
                    bail!("WEBHOOK_SERVER_URL {:?} has no host", url);
                }
                ServerMode::Url(parsed)
            }
            Some(other) => bail!("unknown WEBHOOK_SERVER_MODE {:?}, expected service or url", other),
        };

        let server_port = match lookup("WEBHOOK_SERVICE_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("invalid WEBHOOK_SERVICE_PORT {:?}", port))?,
            None => DEFAULT_SERVER_PORT,
        };

        let shoot_webhook_managed_resource_name = lookup("SHOOT_WEBHOOK_MANAGED_RESOURCE_NAME")
            .unwrap_or_else(|| format!("extension-{}-shoot-webhooks", extension_name));

        let shoot_namespace_selector = match lookup("SHOOT_NAMESPACE_SELECTOR") {
            Some(selector) => parse_selector(&selector)?,
            None => BTreeMap::new(),
        };

        let cert_sync_period = match lookup("CERT_SYNC_PERIOD_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .with_context(|| format!("invalid CERT_SYNC_PERIOD_SECS {:?}", secs))?,
            ),
            None => Duration::from_secs(DEFAULT_SYNC_PERIOD_SECS),
        };

        Ok(Config {
            extension_name,
            extension_namespace,
            extension_type,
            webhook_config_file,
            cert_dir,
            server_mode,
            server_port,
            shoot_webhook_managed_resource_name,
            shoot_namespace_selector,
            cert_sync_period,
        })
    }

    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            extension_name: self.extension_name.clone(),
            extension_namespace: self.extension_namespace.clone(),
            server_mode: self.server_mode.clone(),
            server_port: self.server_port,
            cert_dir: self.cert_dir.clone(),
            shoot_webhook_managed_resource_name: self.shoot_webhook_managed_resource_name.clone(),
            shoot_namespace_selector: self.shoot_namespace_selector.clone(),
            sync_period: self.cert_sync_period,
        }
    }
}

/// Parse a `key=value,key=value` label selector
fn parse_selector(selector: &str) -> Result<BTreeMap<String, String>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
            _ => bail!("invalid SHOOT_NAMESPACE_SELECTOR entry {:?}", pair),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: [(&str, &str); 4] = [
        ("EXTENSION_NAME", "provider-test"),
        ("EXTENSION_NAMESPACE", "extension-provider-test"),
        ("EXTENSION_TYPE", "test"),
        ("WEBHOOK_CONFIG_FILE", "/etc/seedkeeper/webhooks.yaml"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(&BASE).unwrap();

        assert_eq!(config.server_mode, ServerMode::Service);
        assert_eq!(config.server_port, 10250);
        assert_eq!(config.cert_sync_period, Duration::from_secs(1800));
        assert_eq!(
            config.shoot_webhook_managed_resource_name,
            "extension-provider-test-shoot-webhooks"
        );
        assert!(config.shoot_namespace_selector.is_empty());
    }

    #[test]
    fn test_missing_required_variable() {
        let err = load(&BASE[..3]).unwrap_err();
        assert!(err.to_string().contains("WEBHOOK_CONFIG_FILE"));
    }

    #[test]
    fn test_url_mode_requires_url() {
        let mut vars = BASE.to_vec();
        vars.push(("WEBHOOK_SERVER_MODE", "url"));
        assert!(load(&vars).is_err());

        vars.push(("WEBHOOK_SERVER_URL", "https://10.0.0.1:9443"));
        let config = load(&vars).unwrap();
        assert_eq!(
            config.server_mode,
            ServerMode::Url(Url::parse("https://10.0.0.1:9443").unwrap())
        );
    }

    #[test]
    fn test_url_mode_rejects_invalid_url() {
        let mut vars = BASE.to_vec();
        vars.push(("WEBHOOK_SERVER_MODE", "url"));
        vars.push(("WEBHOOK_SERVER_URL", "10.0.0.1:9443/webhooks"));

        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("invalid WEBHOOK_SERVER_URL"));
    }

    #[test]
    fn test_unknown_server_mode() {
        let mut vars = BASE.to_vec();
        vars.push(("WEBHOOK_SERVER_MODE", "ingress"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_reconciler_options() {
        let mut vars = BASE.to_vec();
        vars.push(("WEBHOOK_SERVICE_PORT", "9443"));
        vars.push(("SHOOT_NAMESPACE_SELECTOR", "team=blue, tier=prod"));
        vars.push(("CERT_SYNC_PERIOD_SECS", "60"));

        let options = load(&vars).unwrap().reconciler_options();

        assert_eq!(options.server_port, 9443);
        assert_eq!(options.sync_period, Duration::from_secs(60));
        assert_eq!(
            options.shoot_namespace_label_selector(),
            "gardener.cloud/role=shoot,team=blue,tier=prod"
        );
    }

    #[test]
    fn test_invalid_selector() {
        assert!(parse_selector("team").is_err());
        assert!(parse_selector("=blue").is_err());
        assert!(parse_selector("").unwrap().is_empty());
    }
}
