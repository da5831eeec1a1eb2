// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Protocol version 1
//!
//! - [`TransportMessage`]: the envelope routed by brokers, carrying headers
//!   and a base64 payload.
//! - [`SecureRequest`] / [`SecureReply`]: the signed documents placed in
//!   that payload.
//!
//! JSON schemas for all three are embedded in the binary and compiled once.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde_json::Value;

use crate::protocol::ProtocolError;

pub mod secure;
pub mod transport;

pub use secure::{SecureReply, SecureRequest};
pub use transport::{FederationHeader, NetworkHop, TransportHeaders, TransportMessage};

const TRANSPORT_SCHEMA: &str = include_str!("schemas/transport.json");
const REQUEST_SCHEMA: &str = include_str!("schemas/request.json");
const REPLY_SCHEMA: &str = include_str!("schemas/reply.json");

/// Documents with an embedded schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Document {
    Transport,
    Request,
    Reply,
}

impl Document {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Document::Transport => "Transport",
            Document::Request => "Request",
            Document::Reply => "Reply",
        }
    }

    fn validator(self) -> &'static Result<Validator, String> {
        match self {
            Document::Transport => &*TRANSPORT_VALIDATOR,
            Document::Request => &*REQUEST_VALIDATOR,
            Document::Reply => &*REPLY_VALIDATOR,
        }
    }
}

type CompiledSchema = LazyLock<Result<Validator, String>>;

static TRANSPORT_VALIDATOR: CompiledSchema = LazyLock::new(|| compile(TRANSPORT_SCHEMA));
static REQUEST_VALIDATOR: CompiledSchema = LazyLock::new(|| compile(REQUEST_SCHEMA));
static REPLY_VALIDATOR: CompiledSchema = LazyLock::new(|| compile(REPLY_SCHEMA));

fn compile(source: &str) -> Result<Validator, String> {
    let schema: Value = serde_json::from_str(source).map_err(|e| e.to_string())?;
    Validator::new(&schema).map_err(|e| e.to_string())
}

/// Check `instance` against the schema of `document`, reporting every
/// violated rule in one error.
pub(crate) fn validate(document: Document, instance: &Value) -> Result<(), ProtocolError> {
    let validator = document
        .validator()
        .as_ref()
        .map_err(|e| ProtocolError::Schema(document.name(), e.clone()))?;

    let errors: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        return Ok(());
    }

    Err(ProtocolError::SchemaValidation {
        document: document.name(),
        errors: errors.join(", "),
    })
}

/// Parse `json` and validate it against the schema of `document`.
pub(crate) fn validate_str(document: Document, json: &str) -> Result<(), ProtocolError> {
    let instance: Value = serde_json::from_str(json).map_err(|source| ProtocolError::Decode {
        document: document.name(),
        source,
    })?;
    validate(document, &instance)
}
