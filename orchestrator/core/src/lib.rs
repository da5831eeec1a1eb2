// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Fleet Trust Core
//!
//! Identity, signing and transport primitives shared by every AEGIS node.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Security providers (file and PKCS#11 backed) plus the
//!   versioned transport envelope that carries signed requests and replies
//!   across the message bus.
//!
//! ```text
//! SecurityConfig ──► application::provider_factory ──► Arc<dyn SecurityProvider>
//!                                                         │ sign / verify
//!                                                         ▼
//!                        protocol::v1::SecureRequest / SecureReply
//!                                                         │ base64 + headers
//!                                                         ▼
//!                        protocol::v1::TransportMessage ──► bus connector
//! ```

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod protocol;

pub use application::provider_factory::create_security_provider;
pub use domain::config::{ProviderKind, SecurityConfig};
pub use infrastructure::security::{SecurityError, SecurityProvider};
pub use protocol::v1::{SecureReply, SecureRequest, TransportMessage};
pub use protocol::{ProtocolError, SchemaValidation};
