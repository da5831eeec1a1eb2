// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PKCS#1 v1.5 Digest Codec
//!
//! Maps a digest algorithm to the DER encoded `DigestInfo` prefix that
//! PKCS#1 v1.5 signatures wrap around a raw hash. Hardware tokens only expose
//! the bare `CKM_RSA_PKCS` mechanism, so the prefix has to be prepended by us
//! before the token pads and signs.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure, stateless hash/prefix mapping

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use thiserror::Error;

/// Digest used for every content signature produced by a security provider.
pub const CONTENT_DIGEST: HashAlgorithm = HashAlgorithm::Sha256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("digest length {actual} does not match {algorithm:?} ({expected} bytes)")]
    DigestLength {
        algorithm: HashAlgorithm,
        expected: usize,
        actual: usize,
    },
}

/// Digest algorithms a signer may be asked to sign for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    /// Concatenated MD5 and SHA-1 digests, signed without a DigestInfo wrapper.
    Md5Sha1,
    Ripemd160,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 8] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Md5Sha1,
        HashAlgorithm::Ripemd160,
    ];

    /// ASN.1 `DigestInfo` header for this algorithm.
    pub const fn digest_info_prefix(self) -> &'static [u8] {
        match self {
            HashAlgorithm::Md5 => &[
                0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05,
                0x05, 0x00, 0x04, 0x10,
            ],
            HashAlgorithm::Sha1 => &[
                0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04,
                0x14,
            ],
            HashAlgorithm::Sha224 => &[
                0x30, 0x2d, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x04, 0x05, 0x00, 0x04, 0x1c,
            ],
            HashAlgorithm::Sha256 => &[
                0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x01, 0x05, 0x00, 0x04, 0x20,
            ],
            HashAlgorithm::Sha384 => &[
                0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x02, 0x05, 0x00, 0x04, 0x30,
            ],
            HashAlgorithm::Sha512 => &[
                0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x03, 0x05, 0x00, 0x04, 0x40,
            ],
            HashAlgorithm::Md5Sha1 => &[],
            HashAlgorithm::Ripemd160 => &[
                0x30, 0x20, 0x30, 0x08, 0x06, 0x06, 0x28, 0xcf, 0x06, 0x03, 0x00, 0x31, 0x04, 0x14,
            ],
        }
    }

    /// Output size of the raw digest in bytes.
    pub const fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 | HashAlgorithm::Ripemd160 => 20,
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Md5Sha1 => 36,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Hash `data` with this algorithm.
    ///
    /// Returns `None` for the legacy algorithms we only know how to sign for
    /// (MD5, MD5+SHA1, RIPEMD-160); callers of those hand in their own digest.
    pub fn digest(self, data: &[u8]) -> Option<Vec<u8>> {
        match self {
            HashAlgorithm::Sha1 => Some(Sha1::digest(data).to_vec()),
            HashAlgorithm::Sha224 => Some(Sha224::digest(data).to_vec()),
            HashAlgorithm::Sha256 => Some(Sha256::digest(data).to_vec()),
            HashAlgorithm::Sha384 => Some(Sha384::digest(data).to_vec()),
            HashAlgorithm::Sha512 => Some(Sha512::digest(data).to_vec()),
            HashAlgorithm::Md5 | HashAlgorithm::Md5Sha1 | HashAlgorithm::Ripemd160 => None,
        }
    }

    /// Build the `DigestInfo` structure (prefix followed by the raw digest)
    /// that goes into PKCS#1 v1.5 padding.
    pub fn encode_digest_info(self, digest: &[u8]) -> Result<Vec<u8>, HashError> {
        if digest.len() != self.digest_len() {
            return Err(HashError::DigestLength {
                algorithm: self,
                expected: self.digest_len(),
                actual: digest.len(),
            });
        }

        let prefix = self.digest_info_prefix();
        let mut encoded = Vec::with_capacity(prefix.len() + digest.len());
        encoded.extend_from_slice(prefix);
        encoded.extend_from_slice(digest);
        Ok(encoded)
    }
}

/// SHA-256 checksum of `data`, the content digest used across all providers.
pub fn checksum_bytes(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}
