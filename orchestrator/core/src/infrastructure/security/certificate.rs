// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! X.509 Certificates
//!
//! Owned, parsed view of an identity certificate. Only the DER bytes are
//! stored; the identity fields are extracted once at construction so the
//! rest of the crate never has to deal with borrowed parser types.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Certificate parsing, chain verification and RSA signature checks

use std::fmt;
use std::path::Path;

use pem::{EncodeConfig, LineEnding, Pem};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::Sha256;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

use crate::domain::hash::checksum_bytes;
use crate::infrastructure::security::SecurityError;

const PEM_TAG: &str = "CERTIFICATE";

/// Upper bound on intermediates walked when verifying a chain.
const MAX_CHAIN_DEPTH: usize = 8;

#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    common_name: String,
    dns_names: Vec<String>,
}

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, SecurityError> {
        let der = der.into();
        let (common_name, dns_names) = {
            let cert = parse(&der)?;

            let common_name = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or_default()
                .to_string();

            let mut dns_names = Vec::new();
            if let Ok(Some(san)) = cert.subject_alternative_name() {
                for name in &san.value.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        dns_names.push(dns.to_string());
                    }
                }
            }

            (common_name, dns_names)
        };

        Ok(Self {
            der,
            common_name,
            dns_names,
        })
    }

    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(data: &[u8]) -> Result<Self, SecurityError> {
        Self::chain_from_pem(data)?.into_iter().next().ok_or_else(|| {
            SecurityError::Certificate("no CERTIFICATE block found in PEM data".to_string())
        })
    }

    /// Parse every `CERTIFICATE` block of a PEM document, leaf first.
    pub fn chain_from_pem(data: &[u8]) -> Result<Vec<Self>, SecurityError> {
        let blocks = pem::parse_many(data)
            .map_err(|e| SecurityError::Certificate(format!("failed to parse PEM: {}", e)))?;

        blocks
            .into_iter()
            .filter(|block| block.tag() == PEM_TAG)
            .map(|block| Self::from_der(block.into_contents()))
            .collect()
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, SecurityError> {
        let data = std::fs::read(path).map_err(|e| {
            SecurityError::Certificate(format!("could not read certificate {:?}: {}", path, e))
        })?;
        Self::from_pem(&data)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        let block = Pem::new(PEM_TAG, self.der.clone());
        pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
    }

    /// Lowercase hex SHA-256 of the DER encoding.
    pub fn fingerprint(&self) -> String {
        hex::encode(checksum_bytes(&self.der))
    }

    /// Subject Common Name, empty when the certificate carries none.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    /// True when `name` equals the Common Name or one of the DNS SANs.
    pub fn matches_name(&self, name: &str) -> bool {
        (!self.common_name.is_empty() && self.common_name == name)
            || self.dns_names.iter().any(|dns| dns == name)
    }

    pub fn rsa_public_key(&self) -> Result<RsaPublicKey, SecurityError> {
        let cert = parse(&self.der)?;
        RsaPublicKey::from_public_key_der(cert.public_key().raw).map_err(|e| {
            SecurityError::Certificate(format!(
                "certificate for '{}' does not hold an RSA public key: {}",
                self.common_name, e
            ))
        })
    }

    /// Check a SHA-256 PKCS#1 v1.5 signature made by this certificate's key.
    pub fn verify_signature(&self, data: &[u8], signature: &[u8]) -> Result<(), SecurityError> {
        let key = self.rsa_public_key()?;
        key.verify(Pkcs1v15Sign::new::<Sha256>(), &checksum_bytes(data), signature)
            .map_err(|e| SecurityError::Verification(e.to_string()))
    }

    /// Verify that this certificate chains to one of `anchors`, walking
    /// through `intermediates` when the issuer is not an anchor itself.
    ///
    /// Every intermediate must be a CA allowed to sign certificates, and no
    /// issuer's path length constraint may be exceeded.
    pub fn verify_chain(
        &self,
        intermediates: &[Certificate],
        anchors: &[Certificate],
    ) -> Result<(), SecurityError> {
        let mut current = parse(&self.der)?;

        for below in 0..MAX_CHAIN_DEPTH {
            if !current.validity().is_valid() {
                return Err(SecurityError::Verification(format!(
                    "certificate '{}' is outside its validity period",
                    subject_label(&current)
                )));
            }

            let mut rejected = None;

            for anchor in anchors {
                let issuer = parse(&anchor.der)?;
                if issued_by(&current, &issuer) {
                    match check_issuer(&issuer, below, Trust::Anchor) {
                        Ok(()) => return Ok(()),
                        Err(e) => rejected = Some(e),
                    }
                }
            }

            let mut next = None;
            for intermediate in intermediates {
                let candidate = parse(&intermediate.der)?;
                if candidate.subject().as_raw() == current.subject().as_raw()
                    || !issued_by(&current, &candidate)
                {
                    continue;
                }
                match check_issuer(&candidate, below, Trust::Intermediate) {
                    Ok(()) => {
                        next = Some(candidate);
                        break;
                    }
                    Err(e) => rejected = Some(e),
                }
            }

            match next {
                Some(issuer) => current = issuer,
                None => {
                    return Err(rejected.unwrap_or_else(|| {
                        SecurityError::Verification(format!(
                            "certificate '{}' is not signed by a trusted CA",
                            subject_label(&current)
                        ))
                    }))
                }
            }
        }

        Err(SecurityError::Verification(format!(
            "certificate chain for '{}' is deeper than {} certificates",
            self.common_name, MAX_CHAIN_DEPTH
        )))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.common_name)
            .field("dns_names", &self.dns_names)
            .finish()
    }
}

/// Load every CA certificate from a PEM bundle.
pub fn load_ca_certificates(path: &Path) -> Result<Vec<Certificate>, SecurityError> {
    let data = std::fs::read(path).map_err(|e| {
        SecurityError::Certificate(format!("could not read CA file {:?}: {}", path, e))
    })?;
    let certs = Certificate::chain_from_pem(&data)?;
    if certs.is_empty() {
        return Err(SecurityError::Certificate(format!(
            "no CA certificates found in {:?}",
            path
        )));
    }
    Ok(certs)
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, SecurityError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| SecurityError::Certificate(format!("failed to parse certificate: {}", e)))
}

fn issued_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    cert.issuer().as_raw() == issuer.subject().as_raw()
        && cert.verify_signature(Some(issuer.public_key())).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trust {
    Anchor,
    Intermediate,
}

/// Check that `issuer` may sign certificates with `below` intermediates
/// already between it and the leaf.
///
/// Anchors are trusted by configuration, so an anchor without a basic
/// constraints extension is accepted. An intermediate must assert `CA:TRUE`.
fn check_issuer(
    issuer: &X509Certificate<'_>,
    below: usize,
    trust: Trust,
) -> Result<(), SecurityError> {
    let reject = |reason: &str| {
        SecurityError::Verification(format!(
            "certificate '{}' cannot act as an issuer: {}",
            subject_label(issuer),
            reason
        ))
    };

    match issuer.basic_constraints() {
        Ok(Some(constraints)) => {
            if !constraints.value.ca {
                return Err(reject("it is not a CA"));
            }
            if let Some(limit) = constraints.value.path_len_constraint {
                if below > limit as usize {
                    return Err(reject(&format!(
                        "path length constraint {} exceeded by {} intermediates",
                        limit, below
                    )));
                }
            }
        }
        Ok(None) if trust == Trust::Anchor => {}
        Ok(None) => return Err(reject("it has no basic constraints")),
        Err(e) => return Err(reject(&format!("invalid basic constraints: {}", e))),
    }

    match issuer.key_usage() {
        Ok(Some(usage)) if !usage.value.key_cert_sign() => {
            Err(reject("key usage does not allow certificate signing"))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(reject(&format!("invalid key usage: {}", e))),
    }
}

fn subject_label(cert: &X509Certificate<'_>) -> String {
    cert.subject().to_string()
}
