// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Security Provider Factory - Application Layer
//!
//! Creates the concrete security provider selected by `SecurityConfig`.
//! Callers only ever see `Arc<dyn SecurityProvider>`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Backend selection for security providers

use std::sync::Arc;

use tracing::info;

use crate::domain::config::{ProviderKind, SecurityConfig};
use crate::infrastructure::security::pkcs11::{
    CryptokiLoader, PinPrompt, TerminalPinPrompt, TokenLoader,
};
use crate::infrastructure::security::{
    FileSecurity, Pkcs11Security, SecurityError, SecurityProvider,
};

/// Creates a SecurityProvider implementation based on the configured backend.
/// A PKCS#11 token without a configured PIN is logged in straight away,
/// prompting on the terminal.
pub fn create_security_provider(
    config: &SecurityConfig,
) -> Result<Arc<dyn SecurityProvider>, SecurityError> {
    create_security_provider_with(config, Arc::new(CryptokiLoader), Arc::new(TerminalPinPrompt))
}

/// Same as [`create_security_provider`] with an explicit token loader and
/// PIN source.
pub fn create_security_provider_with(
    config: &SecurityConfig,
    loader: Arc<dyn TokenLoader>,
    prompt: Arc<dyn PinPrompt>,
) -> Result<Arc<dyn SecurityProvider>, SecurityError> {
    info!("Creating {} security provider", config.provider);

    match config.provider {
        ProviderKind::File => Ok(Arc::new(FileSecurity::new(config)?)),
        ProviderKind::Pkcs11 => {
            let provider = Pkcs11Security::new(config, loader, prompt)?;
            if !provider.is_logged_in() {
                provider.login()?;
            }
            Ok(Arc::new(provider))
        }
    }
}
