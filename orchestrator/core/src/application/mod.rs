// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod provider_factory;

pub use provider_factory::{create_security_provider, create_security_provider_with};
