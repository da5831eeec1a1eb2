// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Private Key Signers
//!
//! A [`PrivateKeySigner`] signs an already computed digest. Key material never
//! leaves the implementation: the file backend holds an in-memory RSA key,
//! the PKCS#11 backend forwards to the token.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Backend independent signing capability used by providers and TLS

use std::fmt;
use std::path::Path;

use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};

use crate::domain::hash::HashAlgorithm;
use crate::infrastructure::security::SecurityError;

/// Signature padding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Pkcs1v15,
    Pss,
}

pub trait PrivateKeySigner: Send + Sync + fmt::Debug {
    /// Sign `digest`, which must already be the output of `hash`.
    fn sign_digest(
        &self,
        hash: HashAlgorithm,
        digest: &[u8],
        padding: Padding,
    ) -> Result<Vec<u8>, SecurityError>;

    /// Whether [`Padding::Pss`] is available. Tokens driven through
    /// `CKM_RSA_PKCS` only do PKCS#1 v1.5.
    fn supports_pss(&self) -> bool {
        false
    }
}

/// Software RSA key loaded from a PEM file.
pub struct RsaKeySigner {
    key: RsaPrivateKey,
}

impl RsaKeySigner {
    /// Parse a PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, SecurityError> {
        let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                SecurityError::Configuration(format!(
                    "private key is neither PKCS#8 ({}) nor PKCS#1 ({})",
                    pkcs8_err, pkcs1_err
                ))
            })?,
        };

        Ok(Self { key })
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, SecurityError> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            SecurityError::Configuration(format!("could not read private key {:?}: {}", path, e))
        })?;
        Self::from_pem(&pem)
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }
}

impl PrivateKeySigner for RsaKeySigner {
    fn sign_digest(
        &self,
        hash: HashAlgorithm,
        digest: &[u8],
        padding: Padding,
    ) -> Result<Vec<u8>, SecurityError> {
        match padding {
            Padding::Pkcs1v15 => {
                let encoded = hash.encode_digest_info(digest)?;
                self.key
                    .sign(Pkcs1v15Sign::new_unprefixed(), &encoded)
                    .map_err(|e| SecurityError::Signing(e.to_string()))
            }
            Padding::Pss => {
                let scheme = match hash {
                    HashAlgorithm::Sha256 => Pss::new::<Sha256>(),
                    HashAlgorithm::Sha384 => Pss::new::<Sha384>(),
                    HashAlgorithm::Sha512 => Pss::new::<Sha512>(),
                    other => {
                        return Err(SecurityError::Unsupported(format!(
                            "PSS signing is not supported with {:?}",
                            other
                        )))
                    }
                };
                self.key
                    .sign_with_rng(&mut OsRng, scheme, digest)
                    .map_err(|e| SecurityError::Signing(e.to_string()))
            }
        }
    }

    fn supports_pss(&self) -> bool {
        true
    }
}

impl fmt::Debug for RsaKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeySigner")
            .field("key", &"<redacted>")
            .finish()
    }
}
