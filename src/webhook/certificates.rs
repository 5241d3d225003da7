// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Webhook CA and server certificate issuance and rotation.
//!
//! A CA is renewed once 80% of its validity has elapsed. The replaced CA stays
//! in the bundle for a grace period after the rotation.

use crate::constants::certificates::{
    CA_CERT_KEY, CA_KEY_KEY, CA_PREVIOUS_CERT_KEY, CA_VALIDITY_DAYS, ISSUED_AT_ANNOTATION,
    OLD_CA_GRACE_HOURS, RENEWAL_THRESHOLD, ROTATED_AT_ANNOTATION, SERVER_CERT_FILE,
    SERVER_CERT_VALIDITY_DAYS, SERVER_KEY_FILE,
};
use crate::error::{Result, SeedkeeperError};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::collections::BTreeMap;
use std::path::Path;
use time::OffsetDateTime;
use tracing::{debug, info};

fn cert_error(context: &'static str) -> impl Fn(rcgen::Error) -> SeedkeeperError {
    move |e| SeedkeeperError::CertificateError(format!("{}: {}", context, e))
}

fn to_offset(at: DateTime<Utc>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| SeedkeeperError::CertificateError(format!("invalid timestamp: {}", e)))
}

fn renewal_due(issued_at: DateTime<Utc>, validity: Duration, now: DateTime<Utc>) -> bool {
    let threshold = Duration::seconds((validity.num_seconds() as f64 * RENEWAL_THRESHOLD) as i64);
    now >= issued_at + threshold
}

#[derive(Clone, Debug, PartialEq)]
struct PreviousCa {
    cert_pem: String,
    rotated_at: DateTime<Utc>,
}

/// The webhook CA, plus the CA it replaced while that one is still trusted
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateAuthority {
    common_name: String,
    cert_pem: String,
    key_pem: String,
    issued_at: DateTime<Utc>,
    previous: Option<PreviousCa>,
}

impl CertificateAuthority {
    /// Create a new self-signed CA valid from `now`
    pub fn generate(common_name: &str, now: DateTime<Utc>) -> Result<Self> {
        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(cert_error("failed to create CA parameters"))?;
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.not_before = to_offset(now)?;
        params.not_after = to_offset(now + Duration::days(CA_VALIDITY_DAYS))?;

        let key = KeyPair::generate().map_err(cert_error("failed to generate CA key"))?;
        let cert = params
            .self_signed(&key)
            .map_err(cert_error("failed to create CA certificate"))?;

        info!("Generated webhook CA {}", common_name);
        Ok(Self {
            common_name: common_name.to_string(),
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            issued_at: now,
            previous: None,
        })
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        renewal_due(self.issued_at, Duration::days(CA_VALIDITY_DAYS), now)
    }

    /// Renew the CA when due and drop a previous CA whose grace period is over.
    /// Returns whether anything changed.
    pub fn rotate_if_needed(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let mut changed = false;

        if let Some(previous) = &self.previous {
            if now >= previous.rotated_at + Duration::hours(OLD_CA_GRACE_HOURS) {
                debug!("Dropping previous webhook CA from bundle");
                self.previous = None;
                changed = true;
            }
        }

        if self.needs_renewal(now) {
            let next = Self::generate(&self.common_name, now)?;
            let previous = std::mem::replace(self, next);
            self.previous = Some(PreviousCa {
                cert_pem: previous.cert_pem,
                rotated_at: now,
            });
            info!("Rotated webhook CA {}", self.common_name);
            changed = true;
        }

        Ok(changed)
    }

    /// PEM bundle API servers should trust: the previous CA during its grace period, then the current one
    pub fn bundle(&self, now: DateTime<Utc>) -> String {
        match &self.previous {
            Some(previous) if now < previous.rotated_at + Duration::hours(OLD_CA_GRACE_HOURS) => {
                format!("{}{}", previous.cert_pem, self.cert_pem)
            }
            _ => self.cert_pem.clone(),
        }
    }

    /// Issue a server certificate for the given DNS names, signed by the current CA
    pub fn sign_server_certificate(
        &self,
        dns_names: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<ServerCertificate> {
        let ca_key =
            KeyPair::from_pem(&self.key_pem).map_err(cert_error("failed to load CA key"))?;
        let issuer = CertificateParams::from_ca_cert_pem(&self.cert_pem)
            .map_err(cert_error("failed to parse CA certificate"))?
            .self_signed(&ca_key)
            .map_err(cert_error("failed to load CA certificate"))?;

        let common_name = dns_names.first().cloned().unwrap_or_default();
        let mut params = CertificateParams::new(dns_names)
            .map_err(cert_error("failed to create server certificate parameters"))?;
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.not_before = to_offset(now)?;
        params.not_after = to_offset(now + Duration::days(SERVER_CERT_VALIDITY_DAYS))?;

        let key = KeyPair::generate().map_err(cert_error("failed to generate server key"))?;
        let cert = params
            .signed_by(&key, &issuer, &ca_key)
            .map_err(cert_error("failed to sign server certificate"))?;

        Ok(ServerCertificate {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            issued_at: now,
            ca_cert_pem: self.cert_pem.clone(),
        })
    }

    /// Secret holding the CA so it survives restarts
    pub fn to_secret(&self, name: &str, namespace: &str) -> Secret {
        let mut annotations = BTreeMap::from([(
            ISSUED_AT_ANNOTATION.to_string(),
            self.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )]);
        let mut data = BTreeMap::from([
            (CA_CERT_KEY.to_string(), ByteString(self.cert_pem.clone().into_bytes())),
            (CA_KEY_KEY.to_string(), ByteString(self.key_pem.clone().into_bytes())),
        ]);

        if let Some(previous) = &self.previous {
            annotations.insert(
                ROTATED_AT_ANNOTATION.to_string(),
                previous.rotated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
            data.insert(
                CA_PREVIOUS_CERT_KEY.to_string(),
                ByteString(previous.cert_pem.clone().into_bytes()),
            );
        }

        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        }
    }

    /// Load a CA persisted with `to_secret`. Returns `None` if the secret holds no CA.
    pub fn from_secret(secret: &Secret, common_name: &str) -> Result<Option<Self>> {
        let data = secret.data.clone().unwrap_or_default();
        let (Some(cert), Some(key)) = (data.get(CA_CERT_KEY), data.get(CA_KEY_KEY)) else {
            return Ok(None);
        };

        let annotations = secret.metadata.annotations.clone().unwrap_or_default();
        let issued_at = parse_time(annotations.get(ISSUED_AT_ANNOTATION), ISSUED_AT_ANNOTATION)?;

        let previous = match data.get(CA_PREVIOUS_CERT_KEY) {
            Some(previous) => Some(PreviousCa {
                cert_pem: pem_string(previous)?,
                rotated_at: parse_time(annotations.get(ROTATED_AT_ANNOTATION), ROTATED_AT_ANNOTATION)?,
            }),
            None => None,
        };

        Ok(Some(Self {
            common_name: common_name.to_string(),
            cert_pem: pem_string(cert)?,
            key_pem: pem_string(key)?,
            issued_at,
            previous,
        }))
    }
}

fn pem_string(bytes: &ByteString) -> Result<String> {
    String::from_utf8(bytes.0.clone())
        .map_err(|e| SeedkeeperError::CertificateError(format!("invalid PEM data: {}", e)))
}

fn parse_time(value: Option<&String>, annotation: &str) -> Result<DateTime<Utc>> {
    let value = value.ok_or_else(|| {
        SeedkeeperError::CertificateError(format!("missing annotation {}", annotation))
    })?;
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            SeedkeeperError::CertificateError(format!("invalid annotation {}: {}", annotation, e))
        })
}

/// The webhook server's serving certificate
#[derive(Clone, Debug, PartialEq)]
pub struct ServerCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub issued_at: DateTime<Utc>,
    ca_cert_pem: String,
}

impl ServerCertificate {
    /// Due when signed by another CA than the current one, or 80% of its validity elapsed
    pub fn needs_renewal(&self, ca: &CertificateAuthority, now: DateTime<Utc>) -> bool {
        self.ca_cert_pem != ca.cert_pem()
            || renewal_due(self.issued_at, Duration::days(SERVER_CERT_VALIDITY_DAYS), now)
    }

    /// Write `tls.crt` and `tls.key` into `dir`, creating it if needed
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(SERVER_CERT_FILE), &self.cert_pem)?;
        std::fs::write(dir.join(SERVER_KEY_FILE), &self.key_pem)?;
        debug!("Wrote server certificate to {}", dir.display());
        Ok(())
    }
}
