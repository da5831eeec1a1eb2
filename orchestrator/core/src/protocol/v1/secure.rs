// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Signed request and reply documents.
//!
//! A [`SecureRequest`] carries the caller's certificate so receivers can
//! cache it and check the signature against it. A [`SecureReply`] carries a
//! checksum of the reply plus the replying node's signature.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::infrastructure::security::{Certificate, SecurityProvider};
use crate::protocol::v1::{validate_str, Document};
use crate::protocol::{ProtocolError, SchemaValidation, SECURE_REPLY_V1, SECURE_REQUEST_V1};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureRequest {
    pub protocol: String,
    pub message: String,
    /// Base64 signature over `message`
    pub signature: String,
    /// PEM certificate of the signer
    pub pubcert: String,
}

impl SecureRequest {
    /// Sign `message` as the provider's active identity. Providers with a
    /// remote signer hand the message off and return the document it signed.
    pub fn sign(
        message: impl Into<String>,
        provider: &dyn SecurityProvider,
    ) -> Result<Self, ProtocolError> {
        let message = message.into();

        if provider.is_remote_signing() {
            debug!("Delegating request signing to the remote signer");
            let signed = provider.remote_sign_request(message.as_bytes())?;
            return Self::from_json(&String::from_utf8(signed)?, SchemaValidation::Strict);
        }

        let signature = provider.sign_string(&message)?;

        Ok(Self {
            protocol: SECURE_REQUEST_V1.to_string(),
            message,
            signature: STANDARD.encode(signature),
            pubcert: provider.public_cert_pem()?,
        })
    }

    pub fn from_json(json: &str, validation: SchemaValidation) -> Result<Self, ProtocolError> {
        if validation.is_strict() {
            validate_str(Document::Request, json)?;
        }

        let request: Self = serde_json::from_str(json).map_err(|source| ProtocolError::Decode {
            document: Document::Request.name(),
            source,
        })?;
        check_version(SECURE_REQUEST_V1, &request.protocol)?;

        Ok(request)
    }

    pub fn to_json(&self, validation: SchemaValidation) -> Result<String, ProtocolError> {
        let json = serde_json::to_string(self).map_err(|source| ProtocolError::Encode {
            document: Document::Request.name(),
            source,
        })?;

        if validation.is_strict() {
            validate_str(Document::Request, &json)?;
        }

        Ok(json)
    }

    /// Common Name of the embedded certificate.
    pub fn signer(&self) -> Result<String, ProtocolError> {
        Ok(Certificate::from_pem(self.pubcert.as_bytes())?.common_name().to_string())
    }

    /// Check the request was signed by `caller`, or by a privileged identity
    /// acting as `caller`. Without a claimed caller the certificate's own
    /// name is used. The embedded certificate must chain to the CA and is
    /// added to the cache. Returns the identity the request is accepted as.
    pub fn verify(
        &self,
        provider: &dyn SecurityProvider,
        caller: Option<&str>,
    ) -> Result<String, ProtocolError> {
        let identity = match caller {
            Some(caller) => caller.to_string(),
            None => self.signer()?,
        };

        provider.cache_public_data(self.pubcert.as_bytes(), &identity)?;

        let signature = STANDARD.decode(&self.signature)?;
        if !provider.privileged_verify_string_signature(&self.message, &signature, &identity) {
            warn!("Request signature from {} could not be verified", identity);
            return Err(ProtocolError::Untrusted(format!(
                "signature of request from {} could not be verified",
                identity
            )));
        }

        Ok(identity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureReply {
    pub protocol: String,
    pub message: String,
    /// Base64 SHA-256 checksum of `message`
    pub hash: String,
    pub signature: String,
}

impl SecureReply {
    pub fn sign(
        message: impl Into<String>,
        provider: &dyn SecurityProvider,
    ) -> Result<Self, ProtocolError> {
        let message = message.into();
        let hash = STANDARD.encode(provider.checksum_string(&message));
        let signature = STANDARD.encode(provider.sign_string(&message)?);

        Ok(Self {
            protocol: SECURE_REPLY_V1.to_string(),
            message,
            hash,
            signature,
        })
    }

    pub fn from_json(json: &str, validation: SchemaValidation) -> Result<Self, ProtocolError> {
        if validation.is_strict() {
            validate_str(Document::Reply, json)?;
        }

        let reply: Self = serde_json::from_str(json).map_err(|source| ProtocolError::Decode {
            document: Document::Reply.name(),
            source,
        })?;
        check_version(SECURE_REPLY_V1, &reply.protocol)?;

        Ok(reply)
    }

    pub fn to_json(&self, validation: SchemaValidation) -> Result<String, ProtocolError> {
        let json = serde_json::to_string(self).map_err(|source| ProtocolError::Encode {
            document: Document::Reply.name(),
            source,
        })?;

        if validation.is_strict() {
            validate_str(Document::Reply, &json)?;
        }

        Ok(json)
    }

    /// Check the checksum of the reply and, when `sender` is given, its
    /// signature against the sender's cached certificate.
    pub fn verify(
        &self,
        provider: &dyn SecurityProvider,
        sender: Option<&str>,
    ) -> Result<(), ProtocolError> {
        let expected = STANDARD.encode(provider.checksum_string(&self.message));
        if expected != self.hash {
            warn!("Received a reply with an invalid checksum");
            return Err(ProtocolError::Untrusted(
                "reply checksum does not match its message".to_string(),
            ));
        }

        let Some(sender) = sender else {
            return Ok(());
        };

        let signature = STANDARD.decode(&self.signature)?;
        if !provider.verify_string_signature(&self.message, &signature, Some(sender)) {
            return Err(ProtocolError::Untrusted(format!(
                "signature of reply from {} could not be verified",
                sender
            )));
        }

        Ok(())
    }
}

fn check_version(expected: &'static str, actual: &str) -> Result<(), ProtocolError> {
    if actual != expected {
        return Err(ProtocolError::UnsupportedVersion {
            expected,
            actual: actual.to_string(),
        });
    }
    Ok(())
}
