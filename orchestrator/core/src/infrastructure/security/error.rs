// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

use crate::domain::hash::HashError;
use crate::domain::identity::MatcherError;
use crate::infrastructure::security::pkcs11::TokenError;

/// Errors raised on the construction and signing paths of a security provider.
///
/// Verification paths never surface these; they log and return `false`.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("not authenticated: no certificate has been loaded or the token is logged out")]
    NotAuthenticated,

    #[error("{0}")]
    Unsupported(String),

    #[error("certificate cache error: {0}")]
    Cache(String),

    #[error("certificate verification failed: {0}")]
    Verification(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Digest(#[from] HashError),

    #[error(transparent)]
    Identity(#[from] MatcherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
