// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the AEGIS trust CLI

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use aegis_trust::{create_security_provider, SecurityConfig, SecurityProvider};

pub mod envelope;
pub mod message;
pub mod provider;

pub use self::envelope::EnvelopeCommand;
pub use self::message::{SignArgs, VerifyArgs};

/// Load the configuration at `path` and construct its security provider.
pub fn load_provider(path: &Path) -> Result<Arc<dyn SecurityProvider>> {
    let config = SecurityConfig::from_yaml_file(path)?;
    debug!("Loaded security configuration from {:?} (provider {})", path, config.provider);

    let provider = create_security_provider(&config).context("Failed to create security provider")?;
    debug!("Using {} security provider", provider.provider());

    Ok(provider)
}

/// Read a whole input file, `-` meaning stdin.
pub fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        return Ok(buffer);
    }

    std::fs::read_to_string(input).with_context(|| format!("Failed to read {:?}", input))
}

/// The `protocol` field of a JSON document.
pub fn document_protocol(json: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("Input is not a JSON document")?;
    value
        .get("protocol")
        .and_then(|p| p.as_str())
        .map(str::to_string)
        .context("Input has no protocol field")
}
