// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure building blocks of the trust core: digest codec, identity patterns,
//! configuration and the remote signer port.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** No filesystem, token or network access lives here

pub mod config;
pub mod hash;
pub mod identity;
pub mod remote_signer;
