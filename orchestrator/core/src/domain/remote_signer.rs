// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Remote Signer Port
//!
//! Delegate that signs secure requests on behalf of a client whose key lives
//! elsewhere (for example a central AAA service). Only the file backed
//! provider forwards to it.

use std::fmt::Debug;

pub trait RemoteSigner: Send + Sync + Debug {
    /// Sign `request` remotely and return the signed secure request document.
    fn sign_request(&self, request: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}
