// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Security Providers
//!
//! Pluggable identity backends behind [`SecurityProvider`]: [`FileSecurity`]
//! for a PEM keypair on disk and [`Pkcs11Security`] for a hardware token.
//! Both share [`CertificateCache`] for trust decisions about other
//! identities.

pub mod cache;
pub mod certificate;
pub mod error;
pub mod file;
pub mod pkcs11;
pub mod provider;
pub mod signer;
pub mod tls;

pub use cache::CertificateCache;
pub use certificate::Certificate;
pub use error::SecurityError;
pub use file::FileSecurity;
pub use pkcs11::{Pkcs11Security, TokenError};
pub use provider::{ActiveIdentity, SecurityProvider};
pub use signer::{Padding, PrivateKeySigner, RsaKeySigner};
pub use tls::TlsConfig;
