// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File Security Provider
//!
//! Identity backed by a PEM certificate and an RSA private key on disk
//! (PKCS#8 or PKCS#1). The key is loaded once at construction and can be
//! reloaded from the same paths with [`FileSecurity::reload`].
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Reference [`SecurityProvider`] backend

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::config::SecurityConfig;
use crate::domain::remote_signer::RemoteSigner;
use crate::infrastructure::security::cache::CertificateCache;
use crate::infrastructure::security::certificate::Certificate;
use crate::infrastructure::security::provider::{ActiveIdentity, EnrollProgress, SecurityProvider};
use crate::infrastructure::security::signer::RsaKeySigner;
use crate::infrastructure::security::SecurityError;

pub struct FileSecurity {
    certificate_path: PathBuf,
    key_path: PathBuf,
    cache: CertificateCache,
    insecure: bool,
    remote_signer: Option<Arc<dyn RemoteSigner>>,
    active: RwLock<Option<Arc<ActiveIdentity>>>,
}

impl FileSecurity {
    pub fn new(config: &SecurityConfig) -> Result<Self, SecurityError> {
        let file = config.file.as_ref().ok_or_else(|| {
            SecurityError::Configuration("file provider requires 'file' settings".to_string())
        })?;

        let provider = Self {
            certificate_path: file.certificate.clone(),
            key_path: file.key.clone(),
            cache: CertificateCache::new(config),
            insecure: config.disable_tls_verify,
            remote_signer: config.remote_signer.clone(),
            active: RwLock::new(None),
        };
        provider.reload()?;

        Ok(provider)
    }

    /// Load the certificate and key from disk and make them the active
    /// identity. On failure the previous identity stays in place.
    pub fn reload(&self) -> Result<(), SecurityError> {
        let certificate = Certificate::from_pem_file(&self.certificate_path)?;
        if certificate.common_name().is_empty() {
            return Err(SecurityError::Certificate(format!(
                "certificate {:?} has no Common Name",
                self.certificate_path
            )));
        }

        let signer = RsaKeySigner::from_pem_file(&self.key_path)?;
        if certificate.rsa_public_key()? != signer.public_key() {
            return Err(SecurityError::Configuration(format!(
                "private key {:?} does not belong to certificate {:?}",
                self.key_path, self.certificate_path
            )));
        }

        info!(
            "Loaded identity {} from {:?}",
            certificate.common_name(),
            self.certificate_path
        );

        *self.active.write() = Some(Arc::new(ActiveIdentity {
            certificate,
            signer: Arc::new(signer),
        }));

        Ok(())
    }
}

impl SecurityProvider for FileSecurity {
    fn provider(&self) -> &'static str {
        "file"
    }

    fn active_identity(&self) -> Result<Arc<ActiveIdentity>, SecurityError> {
        self.active.read().clone().ok_or(SecurityError::NotAuthenticated)
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

        let files = [
            ("certificate", &self.certificate_path),
            ("private key", &self.key_path),
        ];
        for (label, path) in files {
            if !path.is_file() {
                problems.push(format!(
                    "{} {:?} does not exist or is not a regular file",
                    label, path
                ));
            }
        }

        let ok = problems.is_empty();
        (problems, ok)
    }

    fn enroll(&self, _wait: Duration, _progress: EnrollProgress<'_>) -> Result<(), SecurityError> {
        Err(SecurityError::Unsupported(
            "the file security provider does not support enrollment, \
             provision the certificate and key out of band"
                .to_string(),
        ))
    }

    fn remote_sign_request(&self, request: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let signer = self.remote_signer.as_ref().ok_or_else(|| {
            SecurityError::Unsupported("remote signing is not configured".to_string())
        })?;

        debug!("Signing request using remote signer {}", signer.kind());
        signer.sign_request(request).map_err(|e| {
            SecurityError::Signing(format!("remote signer {} failed: {:#}", signer.kind(), e))
        })
    }

    fn is_remote_signing(&self) -> bool {
        self.remote_signer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::FileProviderConfig;
    use std::path::Path;
    use tempfile::TempDir;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

    #[derive(Debug)]
    struct EchoSigner;

    impl RemoteSigner for EchoSigner {
        fn sign_request(&self, request: &[u8]) -> anyhow::Result<Vec<u8>> {
            Ok([b"signed:".as_slice(), request].concat())
        }

        fn kind(&self) -> &'static str {
            "echo"
        }
    }

    fn config(cache: &TempDir, cert: &str, key: &str) -> SecurityConfig {
        SecurityConfig {
            ca_file: Path::new(FIXTURES).join("ca.pem"),
            cert_cache_dir: cache.path().to_path_buf(),
            privileged_users: vec!["/^admin-.*$/".to_string()],
            allow_list: vec!["\\.fleet\\.example$".to_string()],
            file: Some(FileProviderConfig {
                certificate: Path::new(FIXTURES).join(cert),
                key: Path::new(FIXTURES).join(key),
            }),
            ..SecurityConfig::default()
        }
    }

    fn provider(cache: &TempDir, cert: &str, key: &str) -> FileSecurity {
        FileSecurity::new(&config(cache, cert, key)).unwrap()
    }

    #[test]
    fn test_loads_identity() {
        let cache = TempDir::new().unwrap();
        let provider = provider(&cache, "node1.pem", "node1-key.pem");

        assert_eq!(provider.provider(), "file");
        assert_eq!(provider.identity().unwrap(), "node1.fleet.example");
        assert_eq!(provider.caller_name().unwrap(), "aegis=node1.fleet.example");
        assert!(provider.public_cert_pem().unwrap().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn test_pkcs1_key_is_accepted() {
        let cache = TempDir::new().unwrap();
        let provider = provider(&cache, "admin-01.pem", "admin-01-key.pem");

        assert_eq!(provider.identity().unwrap(), "admin-01");
    }

    #[test]
    fn test_mismatched_key_is_rejected() {
        let cache = TempDir::new().unwrap();
        let result = FileSecurity::new(&config(&cache, "node1.pem", "admin-02-key.pem"));

        assert!(matches!(result, Err(SecurityError::Configuration(_))));
    }

    #[test]
    fn test_certificate_without_common_name_is_rejected() {
        let cache = TempDir::new().unwrap();
        let result = FileSecurity::new(&config(&cache, "nocn.pem", "node1-key.pem"));

        assert!(matches!(result, Err(SecurityError::Certificate(_))));
    }

    #[test]
    fn test_sign_and_verify_with_active_certificate() {
        let cache = TempDir::new().unwrap();
        let provider = provider(&cache, "node1.pem", "node1-key.pem");

        let signature = provider.sign_string("hello fleet").unwrap();
        assert!(provider.verify_string_signature("hello fleet", &signature, None));
        assert!(!provider.verify_string_signature("hello fleet.", &signature, None));

        // PKCS#1 v1.5 is deterministic, so this matches the openssl signature
        let expected =
            std::fs::read_to_string(Path::new(FIXTURES).join("node1-hello.sig.b64")).unwrap();
        use base64::Engine;
        let expected = base64::engine::general_purpose::STANDARD.decode(expected.trim()).unwrap();
        assert_eq!(signature, expected);
    }

    #[test]
    fn test_empty_identity_verifies_with_active_certificate() {
        let cache = TempDir::new().unwrap();
        let provider = provider(&cache, "node1.pem", "node1-key.pem");

        let signature = provider.sign_bytes(b"payload").unwrap();

        assert!(provider.verify_byte_signature(b"payload", &signature, Some("")));
        assert!(!provider.verify_byte_signature(b"payload!", &signature, Some("")));
        assert!(!cache.path().join(".pem").exists());
    }

    #[test]
    fn test_verify_against_cached_identity() {
        let cache = TempDir::new().unwrap();
        let node = provider(&cache, "node1.pem", "node1-key.pem");
        let signature = node.sign_bytes(b"payload").unwrap();

        let verifier_cache = TempDir::new().unwrap();
        let verifier = provider(&verifier_cache, "admin-01.pem", "admin-01-key.pem");

        let node1 = Some("node1.fleet.example");
        assert!(!verifier.verify_byte_signature(b"payload", &signature, node1));

        verifier
            .cache_public_data(node.public_cert_pem().unwrap().as_bytes(), "node1.fleet.example")
            .unwrap();
        assert!(verifier.verify_byte_signature(b"payload", &signature, node1));
        assert!(!verifier.verify_byte_signature(b"payload", &signature, None));
    }

    #[test]
    fn test_privileged_identity_may_sign_for_others() {
        let cache = TempDir::new().unwrap();
        let verifier = provider(&cache, "node1.pem", "node1-key.pem");
        let admin_cache = TempDir::new().unwrap();
        let admin = provider(&admin_cache, "admin-02.pem", "admin-02-key.pem");

        let signature = admin.sign_bytes(b"rpc").unwrap();
        let node9 = "node9.fleet.example";
        assert!(!verifier.privileged_verify_byte_signature(b"rpc", &signature, node9));

        verifier
            .cache_public_data(admin.public_cert_pem().unwrap().as_bytes(), "node9.fleet.example")
            .unwrap();
        assert!(verifier.privileged_verify_byte_signature(b"rpc", &signature, node9));
        assert!(!verifier.privileged_verify_byte_signature(b"rpc!", &signature, node9));
    }

    #[test]
    fn test_validate_reports_missing_paths() {
        let cache = TempDir::new().unwrap();
        let mut config = config(&cache, "node1.pem", "node1-key.pem");
        let provider = FileSecurity::new(&config).unwrap();

        let (problems, ok) = provider.validate();
        assert!(ok, "{:?}", problems);

        config.cert_cache_dir = cache.path().join("missing");
        config.ca_file = cache.path().join("missing-ca.pem");
        let provider = FileSecurity::new(&config).unwrap();

        let (problems, ok) = provider.validate();
        assert_eq!(problems.len(), 2);
        assert!(!ok);
    }

    #[test]
    fn test_capability_markers() {
        let cache = TempDir::new().unwrap();
        let mut config = config(&cache, "node1.pem", "node1-key.pem");
        let provider = FileSecurity::new(&config).unwrap();

        assert!(!provider.is_remote_signing());
        assert!(provider.remote_sign_request(b"{}").is_err());
        assert!(matches!(
            provider.enroll(Duration::from_secs(1), &mut |_, _| {}),
            Err(SecurityError::Unsupported(_))
        ));

        config.remote_signer = Some(Arc::new(EchoSigner));
        let provider = FileSecurity::new(&config).unwrap();

        assert!(provider.is_remote_signing());
        assert_eq!(provider.remote_sign_request(b"{}").unwrap(), b"signed:{}".to_vec());
    }
}
