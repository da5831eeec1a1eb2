// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PKCS#11 Token Access
//!
//! Narrow view of a PKCS#11 module: list slots, open a read-only session,
//! log in, find objects by class, read object values and sign with
//! `CKM_RSA_PKCS`. [`CryptokiLoader`] implements it on top of `cryptoki`;
//! tests substitute an in-memory token.

use std::fmt;
use std::path::{Path, PathBuf};

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::error::{Error as CryptokiError, RvError};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::types::AuthPin;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to open PKCS11 driver file {path:?}: {reason}")]
    DriverLoad { path: PathBuf, reason: String },

    #[error("failed to fetch PKCS11 driver slots: {0}")]
    Slots(String),

    #[error("failed to find slot {0}")]
    SlotNotFound(u64),

    #[error("failed to open PKCS11 session: {0}")]
    Session(String),

    #[error("user is already logged in")]
    AlreadyLoggedIn,

    #[error("failed to login with provided pin: {0}")]
    Login(String),

    #[error("failed to find {0} object")]
    ObjectNotFound(ObjectKind),

    #[error("found {count} {kind} objects, expected exactly one")]
    AmbiguousObject { kind: ObjectKind, count: usize },

    #[error("failed to read token object: {0}")]
    Attribute(String),

    #[error("token signing failed: {0}")]
    Sign(String),

    #[error("failed to logout: {0}")]
    Logout(String),

    #[error("failed to read PIN: {0}")]
    PinPrompt(String),
}

/// Object classes the provider looks up on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    PrivateKey,
    Certificate,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::PrivateKey => write!(f, "private key"),
            ObjectKind::Certificate => write!(f, "certificate"),
        }
    }
}

/// Handle to an object found in a [`TokenSession`], valid for that session only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenObject(pub usize);

/// Opens PKCS#11 driver libraries.
pub trait TokenLoader: Send + Sync {
    fn load(&self, driver: &Path) -> Result<Box<dyn TokenModule>, TokenError>;
}

pub trait TokenModule: Send + Sync {
    /// Ids of the slots that hold a token.
    fn slots(&self) -> Result<Vec<u64>, TokenError>;

    fn open_session(&self, slot: u64) -> Result<Box<dyn TokenSession>, TokenError>;
}

/// A single-threaded token session.
pub trait TokenSession: Send {
    /// Log in as the normal user. A token that reports the user as already
    /// logged in returns [`TokenError::AlreadyLoggedIn`].
    fn login(&mut self, pin: &str) -> Result<(), TokenError>;

    fn find_objects(&mut self, kind: ObjectKind) -> Result<Vec<TokenObject>, TokenError>;

    /// `CKA_VALUE` of an object, e.g. the DER bytes of a certificate.
    fn value(&mut self, object: TokenObject) -> Result<Vec<u8>, TokenError>;

    /// Raw `CKM_RSA_PKCS` signature over `input`, which must already be a
    /// DigestInfo structure.
    fn sign(&mut self, key: TokenObject, input: &[u8]) -> Result<Vec<u8>, TokenError>;

    fn logout(&mut self) -> Result<(), TokenError>;
}

/// Loads real PKCS#11 modules through `cryptoki`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptokiLoader;

impl TokenLoader for CryptokiLoader {
    fn load(&self, driver: &Path) -> Result<Box<dyn TokenModule>, TokenError> {
        let driver_load = |reason: String| TokenError::DriverLoad {
            path: driver.to_path_buf(),
            reason,
        };

        let context = Pkcs11::new(driver).map_err(|e| driver_load(e.to_string()))?;
        match context.initialize(CInitializeArgs::OsThreads) {
            Ok(()) => {}
            Err(CryptokiError::Pkcs11(RvError::CryptokiAlreadyInitialized, ..)) => {
                debug!("PKCS11 driver {:?} was already initialized", driver);
            }
            Err(e) => return Err(driver_load(e.to_string())),
        }

        Ok(Box::new(CryptokiModule { context }))
    }
}

struct CryptokiModule {
    context: Pkcs11,
}

impl TokenModule for CryptokiModule {
    fn slots(&self) -> Result<Vec<u64>, TokenError> {
        let slots = self
            .context
            .get_slots_with_token()
            .map_err(|e| TokenError::Slots(e.to_string()))?;
        Ok(slots.iter().map(|slot| slot.id()).collect())
    }

    fn open_session(&self, slot: u64) -> Result<Box<dyn TokenSession>, TokenError> {
        let slot = self
            .context
            .get_slots_with_token()
            .map_err(|e| TokenError::Slots(e.to_string()))?
            .into_iter()
            .find(|candidate| candidate.id() == slot)
            .ok_or(TokenError::SlotNotFound(slot))?;

        let session = self
            .context
            .open_ro_session(slot)
            .map_err(|e| TokenError::Session(e.to_string()))?;

        Ok(Box::new(CryptokiSession {
            session,
            objects: Vec::new(),
        }))
    }
}

struct CryptokiSession {
    session: Session,
    objects: Vec<ObjectHandle>,
}

impl CryptokiSession {
    fn handle(&self, object: TokenObject) -> Result<ObjectHandle, TokenError> {
        self.objects
            .get(object.0)
            .copied()
            .ok_or_else(|| TokenError::Attribute(format!("unknown object handle {}", object.0)))
    }
}

impl TokenSession for CryptokiSession {
    fn login(&mut self, pin: &str) -> Result<(), TokenError> {
        let pin = AuthPin::new(pin.into());
        match self.session.login(UserType::User, Some(&pin)) {
            Ok(()) => Ok(()),
            Err(CryptokiError::Pkcs11(RvError::UserAlreadyLoggedIn, ..)) => {
                Err(TokenError::AlreadyLoggedIn)
            }
            Err(e) => Err(TokenError::Login(e.to_string())),
        }
    }

    fn find_objects(&mut self, kind: ObjectKind) -> Result<Vec<TokenObject>, TokenError> {
        let class = match kind {
            ObjectKind::PrivateKey => ObjectClass::PRIVATE_KEY,
            ObjectKind::Certificate => ObjectClass::CERTIFICATE,
        };

        let handles = self
            .session
            .find_objects(&[Attribute::Class(class)])
            .map_err(|e| TokenError::Attribute(e.to_string()))?;

        Ok(handles
            .into_iter()
            .map(|handle| {
                self.objects.push(handle);
                TokenObject(self.objects.len() - 1)
            })
            .collect())
    }

    fn value(&mut self, object: TokenObject) -> Result<Vec<u8>, TokenError> {
        let handle = self.handle(object)?;
        let attributes = self
            .session
            .get_attributes(handle, &[AttributeType::Value])
            .map_err(|e| TokenError::Attribute(e.to_string()))?;

        attributes
            .into_iter()
            .find_map(|attribute| match attribute {
                Attribute::Value(value) => Some(value),
                _ => None,
            })
            .ok_or_else(|| TokenError::Attribute("object has no value".to_string()))
    }

    fn sign(&mut self, key: TokenObject, input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let handle = self.handle(key)?;
        self.session
            .sign(&Mechanism::RsaPkcs, handle, input)
            .map_err(|e| TokenError::Sign(e.to_string()))
    }

    fn logout(&mut self) -> Result<(), TokenError> {
        self.session
            .logout()
            .map_err(|e| TokenError::Logout(e.to_string()))
    }
}
