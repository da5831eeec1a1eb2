// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Security Provider Contract
//!
//! One trait for every backend. A backend supplies its active identity (the
//! certificate plus a signer bound to its private key), the shared
//! [`CertificateCache`] and its capability markers; signing, verification,
//! caching and TLS material are provided on top of those.
//!
//! Verification methods never fail: they return `false` and log the cause.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Identity, signing and verification contract for all backends

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::domain::hash::{self, CONTENT_DIGEST};
use crate::domain::identity;
use crate::infrastructure::security::cache::CertificateCache;
use crate::infrastructure::security::certificate::Certificate;
use crate::infrastructure::security::signer::{Padding, PrivateKeySigner};
use crate::infrastructure::security::tls::{build_http_client, build_tls_config, TlsConfig};
use crate::infrastructure::security::SecurityError;

/// The certificate and private key signer a provider currently acts as.
/// Replaced as a whole on re-authentication.
#[derive(Debug)]
pub struct ActiveIdentity {
    pub certificate: Certificate,
    pub signer: Arc<dyn PrivateKeySigner>,
}

/// Callback invoked while an enrollment waits for a certificate.
pub type EnrollProgress<'a> = &'a mut dyn FnMut(&str, u32);

pub trait SecurityProvider: Send + Sync {
    /// Short backend name, e.g. `file` or `pkcs11`.
    fn provider(&self) -> &'static str;

    /// The active identity, or [`SecurityError::NotAuthenticated`] before
    /// the backend has loaded its certificate.
    fn active_identity(&self) -> Result<Arc<ActiveIdentity>, SecurityError>;

    fn trust_store(&self) -> &CertificateCache;

    /// Whether peer verification is disabled for TLS.
    fn insecure_tls(&self) -> bool;

    /// Non-fatal self check. Returns every problem found and whether there
    /// were none.
    fn validate(&self) -> (Vec<String>, bool);

    /// Request a certificate for this identity and wait for it.
    fn enroll(
        &self,
        wait: std::time::Duration,
        progress: EnrollProgress<'_>,
    ) -> Result<(), SecurityError>;

    /// Have a remote signer sign `request` on our behalf.
    fn remote_sign_request(&self, request: &[u8]) -> Result<Vec<u8>, SecurityError>;

    fn is_remote_signing(&self) -> bool;

    /// Common Name of the active certificate.
    fn identity(&self) -> Result<String, SecurityError> {
        Ok(self.active_identity()?.certificate.common_name().to_string())
    }

    fn public_cert(&self) -> Result<Certificate, SecurityError> {
        Ok(self.active_identity()?.certificate.clone())
    }

    fn public_cert_pem(&self) -> Result<String, SecurityError> {
        Ok(self.active_identity()?.certificate.to_pem())
    }

    fn checksum_bytes(&self, data: &[u8]) -> Vec<u8> {
        hash::checksum_bytes(data)
    }

    fn checksum_string(&self, data: &str) -> Vec<u8> {
        self.checksum_bytes(data.as_bytes())
    }

    /// Sign `data` with SHA-256 and PKCS#1 v1.5 padding.
    fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let identity = self.active_identity()?;
        let digest = self.checksum_bytes(data);
        identity
            .signer
            .sign_digest(CONTENT_DIGEST, &digest, Padding::Pkcs1v15)
    }

    fn sign_string(&self, data: &str) -> Result<Vec<u8>, SecurityError> {
        self.sign_bytes(data.as_bytes())
    }

    /// Check that `signature` over `data` was made by `identity`, whose
    /// certificate is read from the cache. Without an identity, or with an
    /// empty one, the active certificate is used.
    fn verify_byte_signature(
        &self,
        data: &[u8],
        signature: &[u8],
        identity: Option<&str>,
    ) -> bool {
        let (cert, source) = match identity.filter(|i| !i.is_empty()) {
            Some(identity) => {
                let path = self.trust_store().cache_path(identity);
                debug!("Attempting to verify signature for {} using {:?}", identity, path);
                match self.trust_store().load_cached(identity) {
                    Ok(cert) => (cert, format!("{:?}", path)),
                    Err(e) => {
                        error!("Could not load cached certificate for {}: {}", identity, e);
                        return false;
                    }
                }
            }
            None => match self.active_identity() {
                Ok(active) => (
                    active.certificate.clone(),
                    format!("{} certificate", self.provider()),
                ),
                Err(e) => {
                    error!("Cannot verify signature without an active certificate: {}", e);
                    return false;
                }
            },
        };

        match cert.verify_signature(data, signature) {
            Ok(()) => {
                debug!("Verified signature from {:?} using {}", identity, source);
                true
            }
            Err(e) => {
                error!("Signature verification using {} failed: {}", source, e);
                false
            }
        }
    }

    fn verify_string_signature(
        &self,
        data: &str,
        signature: &[u8],
        identity: Option<&str>,
    ) -> bool {
        self.verify_byte_signature(data.as_bytes(), signature, identity)
    }

    /// Accept a signature from the claimed `identity` or from any cached
    /// privileged identity. The claimed identity is tried first, then
    /// privileged identities in lexicographic order.
    fn privileged_verify_byte_signature(
        &self,
        data: &[u8],
        signature: &[u8],
        identity: &str,
    ) -> bool {
        for candidate in self.trust_store().privileged_candidates(identity) {
            if self.verify_byte_signature(data, signature, Some(&candidate)) {
                debug!("Allowing certificate {} to act as {}", candidate, identity);
                return true;
            }
        }

        false
    }

    fn privileged_verify_string_signature(
        &self,
        data: &str,
        signature: &[u8],
        identity: &str,
    ) -> bool {
        self.privileged_verify_byte_signature(data.as_bytes(), signature, identity)
    }

    /// Caller name of the active identity, `aegis=<identity>`.
    fn caller_name(&self) -> Result<String, SecurityError> {
        Ok(identity::caller_name(&self.identity()?))
    }

    fn caller_identity(&self, caller: &str) -> Result<String, SecurityError> {
        Ok(identity::caller_identity(caller)?)
    }

    fn cache_public_data(&self, pem: &[u8], identity: &str) -> Result<(), SecurityError> {
        self.trust_store().cache_public_data(pem, identity)
    }

    fn cached_public_data(&self, identity: &str) -> Result<Vec<u8>, SecurityError> {
        self.trust_store().cached_public_data(identity)
    }

    /// Verify `pem` chains to the configured CA and, when `name` is given,
    /// that it was issued to `name`.
    fn verify_certificate(&self, pem: &[u8], name: Option<&str>) -> Result<(), SecurityError> {
        self.trust_store().verify_certificate(pem, name).map(|_| ())
    }

    fn tls_config(&self) -> Result<TlsConfig, SecurityError> {
        let identity = self.active_identity()?;
        build_tls_config(&identity, self.trust_store().ca_file(), self.insecure_tls())
    }

    fn client_tls_config(&self) -> Result<TlsConfig, SecurityError> {
        self.tls_config()
    }

    /// HTTP client, TLS-wrapped with this identity when `secure` is set.
    fn http_client(&self, secure: bool) -> Result<reqwest::Client, SecurityError> {
        if !secure {
            return build_http_client(None);
        }

        let tls = self.client_tls_config().map_err(|e| {
            warn!("{}: could not set up HTTP connection: {}", self.provider(), e);
            e
        })?;
        build_http_client(Some(&tls))
    }
}
