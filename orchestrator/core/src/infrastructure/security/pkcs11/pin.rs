// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;

use dialoguer::Password;

use super::token::TokenError;

/// Source of the token PIN when none is configured.
pub trait PinPrompt: Send + Sync + fmt::Debug {
    fn read_pin(&self) -> Result<String, TokenError>;
}

/// Masked prompt on the controlling terminal. Blocks until the operator
/// answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPinPrompt;

impl PinPrompt for TerminalPinPrompt {
    fn read_pin(&self) -> Result<String, TokenError> {
        Password::new()
            .with_prompt("PIN")
            .allow_empty_password(true)
            .interact()
            .map_err(|e| TokenError::PinPrompt(e.to_string()))
    }
}

/// Fixed PIN, for tests and non-interactive callers.
#[derive(Clone)]
pub struct StaticPin(String);

impl StaticPin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }
}

impl PinPrompt for StaticPin {
    fn read_pin(&self) -> Result<String, TokenError> {
        Ok(self.0.clone())
    }
}

impl fmt::Debug for StaticPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticPin(<redacted>)")
    }
}
