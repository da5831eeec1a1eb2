// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Transport Envelope
//!
//! The unit routed by brokers and federation gateways. The payload is always
//! a base64 encoded [`SecureRequest`] or [`SecureReply`]; the headers carry
//! the sender, reply subject, the hops the envelope has passed through and an
//! optional federation block.
//!
//! All state sits behind one mutex per envelope, so an envelope can be
//! shared through an `Arc` between the connector and its workers. The lock
//! is held for the duration of a single accessor only.
//!
//! # Architecture
//!
//! - **Layer:** Protocol Layer
//! - **Purpose:** Wire envelope for signed fleet messages

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::v1::{validate_str, Document, SecureReply, SecureRequest};
use crate::protocol::{ProtocolError, SchemaValidation, TRANSPORT_V1};

/// One hop of an envelope: where it came in, who handled it, where it left.
/// Encoded as a `[in, via, out]` triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[String; 3]", into = "[String; 3]")]
pub struct NetworkHop {
    pub inbound: String,
    pub processor: String,
    pub outbound: String,
}

impl From<[String; 3]> for NetworkHop {
    fn from([inbound, processor, outbound]: [String; 3]) -> Self {
        Self {
            inbound,
            processor,
            outbound,
        }
    }
}

impl From<NetworkHop> for [String; 3] {
    fn from(hop: NetworkHop) -> Self {
        [hop.inbound, hop.processor, hop.outbound]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationHeader {
    #[serde(rename = "req", default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,

    /// Where the federation gateway should send replies
    #[serde(rename = "reply-to", default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,

    /// Identities the envelope fans out to
    #[serde(rename = "target", default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportHeaders {
    #[serde(rename = "reply-to", default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,

    #[serde(rename = "mc_sender", default, skip_serializing_if = "String::is_empty")]
    pub sender: String,

    #[serde(rename = "seen-by", default, skip_serializing_if = "Vec::is_empty")]
    pub seen_by: Vec<NetworkHop>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation: Option<FederationHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TransportRecord {
    protocol: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    headers: TransportHeaders,
}

#[derive(Debug)]
pub struct TransportMessage {
    record: Mutex<TransportRecord>,
    validation: SchemaValidation,
}

impl TransportMessage {
    fn empty(sender: String) -> Self {
        Self {
            record: Mutex::new(TransportRecord {
                protocol: TRANSPORT_V1.to_string(),
                data: String::new(),
                headers: TransportHeaders {
                    sender,
                    ..TransportHeaders::default()
                },
            }),
            validation: SchemaValidation::default(),
        }
    }

    /// Envelope carrying `request`, sent by `sender`.
    pub fn from_request(
        request: &SecureRequest,
        sender: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let message = Self::empty(sender.into());
        message.set_request_data(request)?;
        Ok(message)
    }

    /// Envelope carrying `reply`, sent by `sender`.
    pub fn from_reply(
        reply: &SecureReply,
        sender: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let message = Self::empty(sender.into());
        message.set_reply_data(reply)?;
        Ok(message)
    }

    /// Decode an envelope received from the network, validating it against
    /// the transport schema.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Self::from_json_with(json, SchemaValidation::Strict)
    }

    pub fn from_json_with(json: &str, validation: SchemaValidation) -> Result<Self, ProtocolError> {
        if validation.is_strict() {
            Self::is_valid_json(json)?;
        }

        let record: TransportRecord =
            serde_json::from_str(json).map_err(|source| ProtocolError::Decode {
                document: Document::Transport.name(),
                source,
            })?;

        if record.protocol != TRANSPORT_V1 {
            return Err(ProtocolError::UnsupportedVersion {
                expected: TRANSPORT_V1,
                actual: record.protocol,
            });
        }

        Ok(Self {
            record: Mutex::new(record),
            validation,
        })
    }

    /// Check `json` against the transport schema, listing every violation.
    pub fn is_valid_json(json: &str) -> Result<(), ProtocolError> {
        validate_str(Document::Transport, json)
    }

    pub fn with_validation(mut self, validation: SchemaValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn validation(&self) -> SchemaValidation {
        self.validation
    }

    /// Encode the envelope. Validation runs after the lock is released.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let json = {
            let record = self.record.lock();
            serde_json::to_string(&*record).map_err(|source| ProtocolError::Encode {
                document: Document::Transport.name(),
                source,
            })?
        };

        if self.validation.is_strict() {
            Self::is_valid_json(&json)?;
        }

        Ok(json)
    }

    pub fn set_request_data(&self, request: &SecureRequest) -> Result<(), ProtocolError> {
        let json = request.to_json(self.validation)?;
        self.record.lock().data = STANDARD.encode(json);
        Ok(())
    }

    pub fn set_reply_data(&self, reply: &SecureReply) -> Result<(), ProtocolError> {
        let json = reply.to_json(self.validation)?;
        self.record.lock().data = STANDARD.encode(json);
        Ok(())
    }

    /// The decoded payload document.
    pub fn message(&self) -> Result<String, ProtocolError> {
        let data = self.record.lock().data.clone();
        Ok(String::from_utf8(STANDARD.decode(data)?)?)
    }

    pub fn secure_request(&self) -> Result<SecureRequest, ProtocolError> {
        SecureRequest::from_json(&self.message()?, self.validation)
    }

    pub fn secure_reply(&self) -> Result<SecureReply, ProtocolError> {
        SecureReply::from_json(&self.message()?, self.validation)
    }

    pub fn version(&self) -> String {
        self.record.lock().protocol.clone()
    }

    pub fn sender_id(&self) -> String {
        self.record.lock().headers.sender.clone()
    }

    pub fn set_sender(&self, sender: impl Into<String>) {
        self.record.lock().headers.sender = sender.into();
    }

    pub fn reply_to(&self) -> String {
        self.record.lock().headers.reply_to.clone()
    }

    pub fn set_reply_to(&self, reply_to: impl Into<String>) {
        self.record.lock().headers.reply_to = reply_to.into();
    }

    /// Append a hop. Hops are never removed or reordered.
    pub fn record_network_hop(
        &self,
        inbound: impl Into<String>,
        processor: impl Into<String>,
        outbound: impl Into<String>,
    ) {
        let hop = NetworkHop {
            inbound: inbound.into(),
            processor: processor.into(),
            outbound: outbound.into(),
        };
        debug!(
            "Recording network hop {} -> {} -> {}",
            hop.inbound, hop.processor, hop.outbound
        );
        self.record.lock().headers.seen_by.push(hop);
    }

    pub fn seen_by(&self) -> Vec<NetworkHop> {
        self.record.lock().headers.seen_by.clone()
    }

    pub fn is_federated(&self) -> bool {
        self.record.lock().headers.federation.is_some()
    }

    pub fn federation(&self) -> Option<FederationHeader> {
        self.record.lock().headers.federation.clone()
    }

    /// Federation request id, `None` when the envelope is not federated.
    pub fn federation_request_id(&self) -> Option<String> {
        self.read_federation(|f| f.request_id.clone())
    }

    pub fn federation_reply_to(&self) -> Option<String> {
        self.read_federation(|f| f.reply_to.clone())
    }

    pub fn federation_targets(&self) -> Option<Vec<String>> {
        self.read_federation(|f| f.targets.clone())
    }

    pub fn set_federation_request_id(&self, id: impl Into<String>) {
        let id = id.into();
        self.update_federation(|f| f.request_id = id);
    }

    pub fn set_federation_reply_to(&self, reply_to: impl Into<String>) {
        let reply_to = reply_to.into();
        self.update_federation(|f| f.reply_to = reply_to);
    }

    pub fn set_federation_targets(&self, targets: Vec<String>) {
        self.update_federation(|f| f.targets = targets);
    }

    /// Drop the federation block entirely.
    pub fn set_unfederated(&self) {
        self.record.lock().headers.federation = None;
    }

    pub fn headers(&self) -> TransportHeaders {
        self.record.lock().headers.clone()
    }

    fn read_federation<T>(&self, read: impl FnOnce(&FederationHeader) -> T) -> Option<T> {
        self.record.lock().headers.federation.as_ref().map(read)
    }

    fn update_federation(&self, update: impl FnOnce(&mut FederationHeader)) {
        let mut record = self.record.lock();
        update(record.headers.federation.get_or_insert_with(FederationHeader::default));
    }
}

impl Clone for TransportMessage {
    fn clone(&self) -> Self {
        Self {
            record: Mutex::new(self.record.lock().clone()),
            validation: self.validation,
        }
    }
}
