// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Transport envelope commands
//!
//! Commands: inspect

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aegis_trust::protocol::{SECURE_REPLY_V1, SECURE_REQUEST_V1};
use aegis_trust::{SchemaValidation, SecureReply, SecureRequest, TransportMessage};

use super::{document_protocol, read_input};

#[derive(Subcommand)]
pub enum EnvelopeCommand {
    /// Decode a transport envelope and show its headers and payload
    Inspect {
        /// Envelope JSON file, `-` for stdin
        #[arg(value_name = "INPUT", default_value = "-")]
        input: PathBuf,

        /// Skip JSON schema validation
        #[arg(long)]
        no_validate: bool,
    },
}

pub fn handle_command(command: EnvelopeCommand) -> Result<()> {
    match command {
        EnvelopeCommand::Inspect { input, no_validate } => {
            let validation = if no_validate {
                SchemaValidation::Disabled
            } else {
                SchemaValidation::Strict
            };
            let envelope = TransportMessage::from_json_with(&read_input(&input)?, validation)?;
            println!("{}", describe(&envelope)?);
            Ok(())
        }
    }
}

fn or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".dimmed().to_string()
    } else {
        value.to_string()
    }
}

/// Human readable rendering of an envelope.
pub fn describe(envelope: &TransportMessage) -> Result<String> {
    let mut out = Vec::new();

    out.push(format!("{}", "Envelope:".bold()));
    out.push(format!("  Protocol: {}", envelope.version()));
    out.push(format!("  Sender: {}", or_unset(&envelope.sender_id())));
    out.push(format!("  Reply to: {}", or_unset(&envelope.reply_to())));

    match envelope.federation() {
        Some(federation) => {
            out.push(format!("{}", "Federation:".bold()));
            out.push(format!("  Request ID: {}", or_unset(&federation.request_id)));
            out.push(format!("  Reply to: {}", or_unset(&federation.reply_to)));
            out.push(format!("  Targets: {}", federation.targets.len()));
            for target in &federation.targets {
                out.push(format!("    - {}", target));
            }
        }
        None => out.push(format!("Federation: {}", "(not federated)".dimmed())),
    }

    let hops = envelope.seen_by();
    out.push(format!("{} {}", "Seen by:".bold(), hops.len()));
    for (i, hop) in hops.iter().enumerate() {
        out.push(format!(
            "  {}. {} → {} → {}",
            i + 1,
            hop.inbound,
            hop.processor,
            hop.outbound
        ));
    }

    let payload = envelope.message()?;
    out.push(format!("{}", "Payload:".bold()));
    match document_protocol(&payload)?.as_str() {
        SECURE_REQUEST_V1 => {
            let request = SecureRequest::from_json(&payload, envelope.validation())?;
            let signer = request
                .signer()
                .unwrap_or_else(|e| format!("(unreadable certificate: {})", e));
            out.push("  Type: signed request".to_string());
            out.push(format!("  Signed by: {}", signer));
            out.push(format!("  Message: {}", request.message));
        }
        SECURE_REPLY_V1 => {
            let reply = SecureReply::from_json(&payload, envelope.validation())?;
            out.push("  Type: signed reply".to_string());
            out.push(format!("  Hash: {}", reply.hash));
            out.push(format!("  Message: {}", reply.message));
        }
        other => out.push(format!("  Type: {} {}", other, "(unknown)".yellow())),
    }

    Ok(out.join("\n"))
}
