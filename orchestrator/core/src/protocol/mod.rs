// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wire Protocol
//!
//! Versioned documents exchanged between fleet nodes. Every payload that
//! enters the bus is a signed request or reply wrapped in a transport
//! envelope; see [`v1`].
//!
//! # Architecture
//!
//! - **Layer:** Protocol Layer
//! - **Purpose:** Envelope and signed document formats with schema validation

use thiserror::Error;

use crate::infrastructure::security::SecurityError;

pub mod v1;

/// Protocol tag of a version 1 transport envelope.
pub const TRANSPORT_V1: &str = "aegis:transport:1";

/// Protocol tag of a version 1 signed request.
pub const SECURE_REQUEST_V1: &str = "aegis:secure:request:1";

/// Protocol tag of a version 1 signed reply.
pub const SECURE_REPLY_V1: &str = "aegis:secure:reply:1";

/// Whether documents are checked against their JSON schema when encoded
/// and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaValidation {
    #[default]
    Strict,
    Disabled,
}

impl SchemaValidation {
    pub fn is_strict(self) -> bool {
        self == SchemaValidation::Strict
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("could not JSON encode the {document} structure: {source}")]
    Encode {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not parse {document} JSON data: {source}")]
    Decode {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not base64 decode data received on the transport: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("transport data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("supplied JSON document is not a valid {document} message: {errors}")]
    SchemaValidation {
        document: &'static str,
        errors: String,
    },

    #[error("could not load the {0} schema: {1}")]
    Schema(&'static str, String),

    #[error("unsupported protocol '{actual}', expected '{expected}'")]
    UnsupportedVersion {
        expected: &'static str,
        actual: String,
    },

    #[error("untrusted message: {0}")]
    Untrusted(String),

    #[error(transparent)]
    Security(#[from] SecurityError),
}
