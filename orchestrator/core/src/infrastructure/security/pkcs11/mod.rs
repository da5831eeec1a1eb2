// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PKCS#11 Security Provider
//!
//! Identity backed by a hardware token: the certificate is read from the
//! token and every signature is made on it with `CKM_RSA_PKCS`. The private
//! key never leaves the device.
//!
//! # Login
//!
//! ```text
//! Uninitialized -> PinRequested -> SessionOpen -> LoggedIn -> KeyResolved
//!       ^                                                         |
//!       +------------------------ logout() -----------------------+
//! ```
//!
//! Any failure aborts the login with a [`TokenError`] and logs out a session
//! that was already opened. There is no retry and no automatic re-login.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Hardware token [`SecurityProvider`] backend

pub mod pin;
pub mod token;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub use pin::{PinPrompt, StaticPin, TerminalPinPrompt};
pub use token::{
    CryptokiLoader, ObjectKind, TokenError, TokenLoader, TokenModule, TokenObject, TokenSession,
};

use crate::domain::config::SecurityConfig;
use crate::domain::hash::HashAlgorithm;
use crate::infrastructure::security::cache::CertificateCache;
use crate::infrastructure::security::certificate::Certificate;
use crate::infrastructure::security::provider::{
    ActiveIdentity, EnrollProgress, SecurityProvider,
};
use crate::infrastructure::security::signer::{Padding, PrivateKeySigner};
use crate::infrastructure::security::SecurityError;

/// Progress of a token login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Uninitialized,
    PinRequested,
    SessionOpen,
    LoggedIn,
    KeyResolved,
}

/// Signs through a logged in token session.
pub struct TokenSigner {
    session: Mutex<Box<dyn TokenSession>>,
    key: TokenObject,
    // keeps the driver loaded for as long as the session lives
    _module: Box<dyn TokenModule>,
}

impl TokenSigner {
    fn logout(&self) -> Result<(), TokenError> {
        self.session.lock().logout()
    }
}

impl PrivateKeySigner for TokenSigner {
    fn sign_digest(
        &self,
        hash: HashAlgorithm,
        digest: &[u8],
        padding: Padding,
    ) -> Result<Vec<u8>, SecurityError> {
        if padding != Padding::Pkcs1v15 {
            return Err(SecurityError::Unsupported(
                "PKCS11 tokens only sign with PKCS#1 v1.5 padding".to_string(),
            ));
        }

        let input = hash.encode_digest_info(digest)?;
        Ok(self.session.lock().sign(self.key, &input)?)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("key", &self.key).finish()
    }
}

struct TokenLogin {
    identity: Arc<ActiveIdentity>,
    signer: Arc<TokenSigner>,
}

pub struct Pkcs11Security {
    driver_file: PathBuf,
    slot: u64,
    pin: Mutex<Option<String>>,
    cache: CertificateCache,
    insecure: bool,
    loader: Arc<dyn TokenLoader>,
    prompt: Arc<dyn PinPrompt>,
    state: Mutex<TokenState>,
    active: RwLock<Option<TokenLogin>>,
}

impl Pkcs11Security {
    /// Create the provider. When a PIN is configured the token is logged in
    /// right away; otherwise [`Pkcs11Security::login`] prompts for it.
    pub fn new(
        config: &SecurityConfig,
        loader: Arc<dyn TokenLoader>,
        prompt: Arc<dyn PinPrompt>,
    ) -> Result<Self, SecurityError> {
        let pkcs11 = config.pkcs11.as_ref().ok_or_else(|| {
            SecurityError::Configuration("pkcs11 provider requires 'pkcs11' settings".to_string())
        })?;
        if pkcs11.driver_file.as_os_str().is_empty() {
            return Err(SecurityError::Configuration(
                "pkcs11: driver_file option is required".to_string(),
            ));
        }
        if config.remote_signer.is_some() {
            warn!(
                "pkcs11: remote signing is not supported, ignoring the configured remote signer"
            );
        }

        let provider = Self {
            driver_file: pkcs11.driver_file.clone(),
            slot: pkcs11.slot,
            pin: Mutex::new(pkcs11.pin.clone()),
            cache: CertificateCache::new(config),
            insecure: config.disable_tls_verify,
            loader,
            prompt,
            state: Mutex::new(TokenState::Uninitialized),
            active: RwLock::new(None),
        };

        if pkcs11.pin.is_some() {
            provider.login()?;
        }

        Ok(provider)
    }

    pub fn state(&self) -> TokenState {
        *self.state.lock()
    }

    pub fn is_logged_in(&self) -> bool {
        self.active.read().is_some()
    }

    /// Log in to the token and resolve its key and certificate. Replaces
    /// any previous login atomically.
    pub fn login(&self) -> Result<(), SecurityError> {
        match self.try_login() {
            Ok(login) => {
                info!(
                    "Logged in to PKCS11 token as {}",
                    login.identity.certificate.common_name()
                );
                let previous = self.active.write().replace(login);
                *self.state.lock() = TokenState::KeyResolved;
                if let Some(previous) = previous {
                    if let Err(e) = previous.signer.logout() {
                        debug!("Logging out of the replaced PKCS11 session failed: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                // a failed re-login leaves the previous login in place
                *self.state.lock() = if self.is_logged_in() {
                    TokenState::KeyResolved
                } else {
                    TokenState::Uninitialized
                };
                Err(e)
            }
        }
    }

    /// End the token session. Signing fails with
    /// [`SecurityError::NotAuthenticated`] until the next [`login`](Self::login).
    pub fn logout(&self) -> Result<(), SecurityError> {
        let login = self.active.write().take();
        *self.state.lock() = TokenState::Uninitialized;

        match login {
            Some(login) => Ok(login.signer.logout()?),
            None => Err(SecurityError::NotAuthenticated),
        }
    }

    fn set_state(&self, state: TokenState) {
        debug!("PKCS11 token state: {:?}", state);
        *self.state.lock() = state;
    }

    fn try_login(&self) -> Result<TokenLogin, SecurityError> {
        let pin = self.resolve_pin()?;

        debug!("Attempting to open PKCS11 driver file {:?}", self.driver_file);
        let module = self.loader.load(&self.driver_file)?;

        debug!("Attempting to fetch PKCS11 driver slots");
        let slots = module.slots()?;
        for slot in &slots {
            debug!("Found slot {}", slot);
        }
        let slot = select_slot(&slots, self.slot)?;

        debug!("Attempting to open session for selected slot {}", slot);
        let session = module.open_session(slot)?;
        self.set_state(TokenState::SessionOpen);

        // logs the session out on every early return below
        let mut session = scopeguard::guard(session, |mut session| {
            if let Err(e) = session.logout() {
                debug!("Logging out of abandoned PKCS11 session: {}", e);
            }
        });

        match session.login(&pin) {
            Ok(()) => {}
            Err(TokenError::AlreadyLoggedIn) => debug!("PKCS11 user was already logged in"),
            Err(e) => return Err(e.into()),
        }
        self.set_state(TokenState::LoggedIn);

        debug!("Attempting to find private key object");
        let key = find_single(&mut **session, ObjectKind::PrivateKey)?;

        debug!("Attempting to find certificate object");
        let cert_object = find_single(&mut **session, ObjectKind::Certificate)?;
        let certificate = Certificate::from_der(session.value(cert_object)?)?;
        if certificate.common_name().is_empty() {
            return Err(SecurityError::Certificate(
                "cert on token must have valid CommonName".to_string(),
            ));
        }

        let signer = Arc::new(TokenSigner {
            session: Mutex::new(scopeguard::ScopeGuard::into_inner(session)),
            key,
            _module: module,
        });

        Ok(TokenLogin {
            identity: Arc::new(ActiveIdentity {
                certificate,
                signer: signer.clone(),
            }),
            signer,
        })
    }

    fn resolve_pin(&self) -> Result<String, SecurityError> {
        if let Some(pin) = self.pin.lock().clone() {
            return Ok(pin);
        }

        self.set_state(TokenState::PinRequested);
        let pin = self.prompt.read_pin()?;
        *self.pin.lock() = Some(pin.clone());
        Ok(pin)
    }
}

/// The configured slot, or the only slot when the configured one is absent.
fn select_slot(slots: &[u64], configured: u64) -> Result<u64, TokenError> {
    if slots.contains(&configured) {
        return Ok(configured);
    }

    match slots {
        [only] => {
            debug!("Slot {} not found, using the only available slot {}", configured, only);
            Ok(*only)
        }
        _ => Err(TokenError::SlotNotFound(configured)),
    }
}

fn find_single(
    session: &mut dyn TokenSession,
    kind: ObjectKind,
) -> Result<TokenObject, TokenError> {
    let objects = session.find_objects(kind)?;
    match objects.as_slice() {
        [object] => Ok(*object),
        [] => Err(TokenError::ObjectNotFound(kind)),
        _ => Err(TokenError::AmbiguousObject {
            kind,
            count: objects.len(),
        }),
    }
}

impl SecurityProvider for Pkcs11Security {
    fn provider(&self) -> &'static str {
        "pkcs11"
    }

    fn active_identity(&self) -> Result<Arc<ActiveIdentity>, SecurityError> {
        self.active
            .read()
            .as_ref()
            .map(|login| login.identity.clone())
            .ok_or(SecurityError::NotAuthenticated)
    }

    fn trust_store(&self) -> &CertificateCache {
        &self.cache
    }

    fn insecure_tls(&self) -> bool {
        self.insecure
    }

    fn validate(&self) -> (Vec<String>, bool) {
        let mut problems = Vec::new();
        self.cache.validate_paths(&mut problems);

        if !self.is_logged_in() {
            debug!("Attempting to login to token in validate()");
            if let Err(e) = self.login() {
                problems.push(format!("failed to login to token in validate(): {}", e));
            }
        }

        let ok = problems.is_empty();
        (problems, ok)
    }

    fn enroll(&self, _wait: Duration, _progress: EnrollProgress<'_>) -> Result<(), SecurityError> {
        Err(SecurityError::Unsupported(
            "pkcs11 security provider does not support enrollment".to_string(),
        ))
    }

    fn remote_sign_request(&self, _request: &[u8]) -> Result<Vec<u8>, SecurityError> {
        Err(SecurityError::Unsupported(
            "pkcs11 security provider does not support remote signing requests".to_string(),
        ))
    }

    fn is_remote_signing(&self) -> bool {
        false
    }
}
