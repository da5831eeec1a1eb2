// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Security provider commands
//!
//! Commands: validate, identity

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

use super::load_provider;

pub fn validate(config_path: &Path) -> Result<()> {
    println!("Validating security configuration {}...", config_path.display());

    let provider = load_provider(config_path)?;
    let (problems, ok) = provider.validate();

    if ok {
        println!(
            "{}",
            format!("✓ {} security provider is valid", provider.provider()).green()
        );
        return Ok(());
    }

    for problem in &problems {
        println!("  {} {}", "✗".red(), problem);
    }
    bail!(
        "{} problem(s) found with the {} security provider",
        problems.len(),
        provider.provider()
    )
}

pub fn identity(config_path: &Path) -> Result<()> {
    let provider = load_provider(config_path)?;
    let cert = provider.public_cert()?;
    let identity = cert.common_name();

    println!("{}", "Active identity:".bold());
    println!("  Identity: {}", identity.bold());
    println!("  Caller: {}", provider.caller_name()?);
    println!("  Provider: {}", provider.provider());
    println!("  Fingerprint (SHA-256): {}", cert.fingerprint());
    if cert.dns_names().is_empty() {
        println!("  DNS names: {}", "(none)".dimmed());
    } else {
        println!("  DNS names: {}", cert.dns_names().join(", "));
    }
    println!(
        "  Privileged: {}",
        if provider.trust_store().is_privileged(identity) {
            "yes".yellow()
        } else {
            "no".normal()
        }
    );
    println!(
        "  Remote signing: {}",
        if provider.is_remote_signing() { "yes" } else { "no" }
    );
    println!("  Certificate cache: {}", provider.trust_store().cache_dir().display());

    Ok(())
}
