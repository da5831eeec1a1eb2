// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Signing and verification commands

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use aegis_trust::protocol::{SECURE_REPLY_V1, SECURE_REQUEST_V1, TRANSPORT_V1};
use aegis_trust::{SchemaValidation, SecureReply, SecureRequest, SecurityProvider, TransportMessage};

use super::{document_protocol, load_provider, read_input};

#[derive(Args)]
pub struct SignArgs {
    /// File holding the message to sign, `-` for stdin
    #[arg(value_name = "INPUT", default_value = "-")]
    pub input: PathBuf,

    /// Produce a signed reply instead of a signed request
    #[arg(long)]
    pub reply: bool,

    /// Wrap the signed document in a transport envelope
    #[arg(long)]
    pub envelope: bool,

    /// Reply subject to set on the envelope
    #[arg(long, value_name = "SUBJECT", requires = "envelope")]
    pub reply_to: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Signed request, signed reply or transport envelope, `-` for stdin
    #[arg(value_name = "INPUT", default_value = "-")]
    pub input: PathBuf,

    /// Identity the sender claims to be (default: envelope sender or certificate name)
    #[arg(long, value_name = "IDENTITY")]
    pub caller: Option<String>,

    /// Skip JSON schema validation
    #[arg(long)]
    pub no_validate: bool,
}

pub fn sign(config_path: &Path, args: SignArgs) -> Result<()> {
    let provider = load_provider(config_path)?;
    let message = read_input(&args.input)?;

    println!("{}", sign_message(provider.as_ref(), message, &args)?);

    Ok(())
}

/// Sign `message` as requested by `args` and return the JSON document.
pub fn sign_message(
    provider: &dyn SecurityProvider,
    message: String,
    args: &SignArgs,
) -> Result<String> {
    let sender = provider.identity()?;

    let envelope = if args.reply {
        let reply = SecureReply::sign(message, provider).context("Failed to sign reply")?;
        if !args.envelope {
            return Ok(reply.to_json(SchemaValidation::Strict)?);
        }
        TransportMessage::from_reply(&reply, sender)?
    } else {
        let request = SecureRequest::sign(message, provider).context("Failed to sign request")?;
        if !args.envelope {
            return Ok(request.to_json(SchemaValidation::Strict)?);
        }
        TransportMessage::from_request(&request, sender)?
    };

    if let Some(reply_to) = &args.reply_to {
        envelope.set_reply_to(reply_to.as_str());
    }

    Ok(envelope.to_json()?)
}

pub fn verify(config_path: &Path, args: VerifyArgs) -> Result<()> {
    let provider = load_provider(config_path)?;
    let json = read_input(&args.input)?;

    let outcome = verify_document(provider.as_ref(), &json, &args)?;
    println!("{}", format!("✓ {}", outcome).green());

    Ok(())
}

/// Verify a signed document, unwrapping a transport envelope first. Returns
/// a description of what was accepted.
pub fn verify_document(
    provider: &dyn SecurityProvider,
    json: &str,
    args: &VerifyArgs,
) -> Result<String> {
    let validation = if args.no_validate {
        SchemaValidation::Disabled
    } else {
        SchemaValidation::Strict
    };

    let (document, sender) = if document_protocol(json)? == TRANSPORT_V1 {
        let envelope = TransportMessage::from_json_with(json, validation)?;
        let sender = Some(envelope.sender_id()).filter(|s| !s.is_empty());
        (envelope.message()?, sender)
    } else {
        (json.to_string(), None)
    };
    let claimed = args.caller.clone().or(sender);

    match document_protocol(&document)?.as_str() {
        SECURE_REQUEST_V1 => {
            let request = SecureRequest::from_json(&document, validation)?;
            let identity = request
                .verify(provider, claimed.as_deref())
                .context("Request verification failed")?;
            Ok(format!("Request signature is valid, accepted as {}", identity))
        }
        SECURE_REPLY_V1 => {
            let reply = SecureReply::from_json(&document, validation)?;
            reply
                .verify(provider, claimed.as_deref())
                .context("Reply verification failed")?;
            match claimed {
                Some(sender) => Ok(format!(
                    "Reply checksum and signature from {} are valid",
                    sender
                )),
                None => Ok(
                    "Reply checksum is valid (signature not checked, no sender known)".to_string(),
                ),
            }
        }
        other => bail!("Unsupported document protocol {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_trust::domain::config::FileProviderConfig;
    use aegis_trust::{create_security_provider, SecurityConfig};
    use std::sync::Arc;
    use tempfile::TempDir;

    const FIXTURES: &str =
        concat!(env!("CARGO_MANIFEST_DIR"), "/../orchestrator/core/tests/fixtures");

    fn provider(cache: &TempDir, cert: &str, key: &str) -> Arc<dyn SecurityProvider> {
        let config = SecurityConfig {
            ca_file: Path::new(FIXTURES).join("ca.pem"),
            cert_cache_dir: cache.path().to_path_buf(),
            privileged_users: vec!["/^admin-.*$/".to_string()],
            allow_list: vec!["\\.fleet\\.example$".to_string()],
            file: Some(FileProviderConfig {
                certificate: Path::new(FIXTURES).join(cert),
                key: Path::new(FIXTURES).join(key),
            }),
            ..SecurityConfig::default()
        };
        create_security_provider(&config).unwrap()
    }

    fn sign_args(reply: bool, envelope: bool) -> SignArgs {
        SignArgs {
            input: PathBuf::from("-"),
            reply,
            envelope,
            reply_to: None,
        }
    }

    fn verify_args(caller: Option<&str>) -> VerifyArgs {
        VerifyArgs {
            input: PathBuf::from("-"),
            caller: caller.map(str::to_string),
            no_validate: false,
        }
    }

    #[test]
    fn test_signed_envelope_verifies() {
        let (signer_cache, verifier_cache) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let signer = provider(&signer_cache, "node1.pem", "node1-key.pem");
        let verifier = provider(&verifier_cache, "admin-01.pem", "admin-01-key.pem");

        let mut args = sign_args(false, true);
        args.reply_to = Some("_reply.cli".to_string());
        let json = sign_message(signer.as_ref(), "ping".to_string(), &args).unwrap();
        assert_eq!(TransportMessage::from_json(&json).unwrap().reply_to(), "_reply.cli");

        let outcome = verify_document(verifier.as_ref(), &json, &verify_args(None)).unwrap();
        assert!(outcome.contains("node1.fleet.example"), "{}", outcome);
    }

    #[test]
    fn test_bare_request_with_wrong_caller_fails() {
        let (signer_cache, verifier_cache) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let signer = provider(&signer_cache, "node1.pem", "node1-key.pem");
        let verifier = provider(&verifier_cache, "admin-01.pem", "admin-01-key.pem");

        let json =
            sign_message(signer.as_ref(), "ping".to_string(), &sign_args(false, false)).unwrap();
        let wrong_caller = verify_args(Some("node2.fleet.example"));

        assert!(verify_document(verifier.as_ref(), &json, &verify_args(None)).is_ok());
        assert!(verify_document(verifier.as_ref(), &json, &wrong_caller).is_err());
    }

    #[test]
    fn test_reply_without_sender_checks_checksum_only() {
        let cache = TempDir::new().unwrap();
        let signer = provider(&cache, "node1.pem", "node1-key.pem");

        let json =
            sign_message(signer.as_ref(), "pong".to_string(), &sign_args(true, false)).unwrap();
        let outcome = verify_document(signer.as_ref(), &json, &verify_args(None)).unwrap();

        assert!(outcome.contains("checksum is valid"), "{}", outcome);
    }

    #[test]
    fn test_unknown_document_is_rejected() {
        let cache = TempDir::new().unwrap();
        let verifier = provider(&cache, "node1.pem", "node1-key.pem");

        let json = r#"{"protocol":"other:1"}"#;
        let result = verify_document(verifier.as_ref(), json, &verify_args(None));

        assert!(result.is_err());
    }
}
