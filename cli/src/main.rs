// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Fleet Trust CLI
//!
//! The `aegis-trust` binary exposes the node's security provider to
//! operators.
//!
//! ## Commands
//!
//! - `aegis-trust validate` - Check the security configuration and provider
//! - `aegis-trust identity` - Show the identity the provider acts as
//! - `aegis-trust sign` - Sign a request or reply, optionally wrapped in a transport envelope
//! - `aegis-trust verify` - Verify a signed document or envelope
//! - `aegis-trust envelope inspect` - Decode a transport envelope

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aegis_trust_cli::commands::{self, EnvelopeCommand, SignArgs, VerifyArgs};

/// AEGIS Fleet Trust - identity, signing and envelope tooling
#[derive(Parser)]
#[command(name = "aegis-trust")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the security configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "AEGIS_TRUST_CONFIG",
        value_name = "FILE",
        default_value = "/etc/aegis/trust/security.yaml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the security configuration and provider setup
    #[command(name = "validate")]
    Validate,

    /// Show the active identity
    #[command(name = "identity")]
    Identity,

    /// Sign a message
    #[command(name = "sign")]
    Sign(SignArgs),

    /// Verify a signed request, reply or transport envelope
    #[command(name = "verify")]
    Verify(VerifyArgs),

    /// Transport envelope tools
    #[command(name = "envelope")]
    Envelope {
        #[command(subcommand)]
        command: EnvelopeCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Validate) => commands::provider::validate(&cli.config),
        Some(Commands::Identity) => commands::provider::identity(&cli.config),
        Some(Commands::Sign(args)) => commands::message::sign(&cli.config, args),
        Some(Commands::Verify(args)) => commands::message::verify(&cli.config, args),
        Some(Commands::Envelope { command }) => commands::envelope::handle_command(command),
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
