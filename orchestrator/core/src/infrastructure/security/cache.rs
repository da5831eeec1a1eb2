// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Certificate Cache
//!
//! Filesystem store of other identities' certificates, one PEM file per
//! identity at `<cert_cache_dir>/<identity>.pem`. Shared by every provider
//! backend, together with the CA trust checks and the privileged/allow-list
//! policy that decides what may be cached.
//!
//! The directory is rescanned on every call; entries are never deleted.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Certificate cache, CA verification and identity policy

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::config::SecurityConfig;
use crate::domain::identity::IdentityMatcher;
use crate::infrastructure::security::certificate::{load_ca_certificates, Certificate};
use crate::infrastructure::security::SecurityError;

const CACHE_EXTENSION: &str = ".pem";

#[derive(Debug, Clone)]
pub struct CertificateCache {
    cache_dir: PathBuf,
    ca_file: PathBuf,
    privileged: IdentityMatcher,
    allow_list: IdentityMatcher,
    always_overwrite: bool,
}

impl CertificateCache {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            cache_dir: config.cert_cache_dir.clone(),
            ca_file: config.ca_file.clone(),
            privileged: IdentityMatcher::new(&config.privileged_users),
            allow_list: IdentityMatcher::new(&config.allow_list),
            always_overwrite: config.always_overwrite_cache,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ca_file(&self) -> &Path {
        &self.ca_file
    }

    /// Location of the cached certificate for `identity`. The identity is
    /// joined as-is and must already be filesystem safe.
    pub fn cache_path(&self, identity: &str) -> PathBuf {
        self.cache_dir.join(format!("{}{}", identity, CACHE_EXTENSION))
    }

    pub fn cached_cert_exists(&self, identity: &str) -> bool {
        self.cache_path(identity).is_file()
    }

    pub fn is_privileged(&self, identity: &str) -> bool {
        self.privileged.is_match(identity)
    }

    pub fn is_allowed(&self, identity: &str) -> bool {
        self.allow_list.is_match(identity)
    }

    /// Cached identities matching the privileged patterns, sorted.
    ///
    /// Any error while walking the cache directory yields an empty list.
    pub fn privileged_certs(&self) -> Vec<String> {
        let mut certs = Vec::new();

        for entry in WalkDir::new(&self.cache_dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Could not enumerate certificate cache {:?}: {}", self.cache_dir, e);
                    return Vec::new();
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let identity = name.strip_suffix(CACHE_EXTENSION).unwrap_or(&name);
            if self.is_privileged(identity) {
                certs.push(identity.to_string());
            }
        }

        certs.sort();
        certs
    }

    /// Identities to try, in order, when checking a signature that claims
    /// to come from `identity`: the claimed identity if it is cached, then
    /// every privileged identity.
    pub fn privileged_candidates(&self, identity: &str) -> Vec<String> {
        let mut candidates = Vec::new();

        if !identity.is_empty() && self.cached_cert_exists(identity) {
            candidates.push(identity.to_string());
        }

        candidates.extend(self.privileged_certs());
        candidates
    }

    pub fn ca_certificates(&self) -> Result<Vec<Certificate>, SecurityError> {
        load_ca_certificates(&self.ca_file)
    }

    /// Verify `pem` chains to the configured CA and, when `name` is given,
    /// that its Common Name or a DNS SAN equals `name`.
    pub fn verify_certificate(
        &self,
        pem: &[u8],
        name: Option<&str>,
    ) -> Result<Certificate, SecurityError> {
        let chain = Certificate::chain_from_pem(pem)?;
        let (leaf, intermediates) = chain.split_first().ok_or_else(|| {
            SecurityError::Certificate("no CERTIFICATE block found in PEM data".to_string())
        })?;

        let anchors = self.ca_certificates()?;
        leaf.verify_chain(intermediates, &anchors)?;

        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if !leaf.matches_name(name) {
                return Err(SecurityError::Verification(format!(
                    "certificate '{}' does not match name '{}'",
                    leaf.common_name(),
                    name
                )));
            }
        }

        Ok(leaf.clone())
    }

    /// Store `pem` as the certificate of `identity`.
    ///
    /// The certificate must chain to the CA. A privileged certificate is
    /// stored under its own Common Name whatever `identity` claims; any other
    /// certificate must match the allow-list and carry `identity` as its
    /// Common Name or a DNS SAN. An existing entry is kept unless the cache
    /// is configured to always overwrite.
    pub fn cache_public_data(&self, pem: &[u8], identity: &str) -> Result<(), SecurityError> {
        let cert = self.verify_certificate(pem, None)?;

        let target = if self.is_privileged(cert.common_name()) {
            debug!(
                "Caching privileged certificate {} presented for {}",
                cert.common_name(),
                identity
            );
            cert.common_name().to_string()
        } else {
            if !self.is_allowed(identity) {
                return Err(SecurityError::Cache(format!(
                    "identity '{}' does not match the certificate allow-list",
                    identity
                )));
            }
            if !cert.matches_name(identity) {
                return Err(SecurityError::Cache(format!(
                    "certificate '{}' does not belong to identity '{}'",
                    cert.common_name(),
                    identity
                )));
            }
            identity.to_string()
        };

        if target.is_empty() {
            return Err(SecurityError::Cache(
                "refusing to cache a certificate without an identity".to_string(),
            ));
        }

        let path = self.cache_path(&target);
        if path.exists() && !self.always_overwrite {
            debug!("Certificate for {} already cached in {:?}, keeping it", target, path);
            return Ok(());
        }

        std::fs::write(&path, pem)
            .map_err(|e| SecurityError::Cache(format!("could not write {:?}: {}", path, e)))?;
        debug!("Cached certificate for {} in {:?}", target, path);

        Ok(())
    }

    pub fn cached_public_data(&self, identity: &str) -> Result<Vec<u8>, SecurityError> {
        let path = self.cache_path(identity);
        std::fs::read(&path).map_err(|e| {
            SecurityError::Cache(format!("could not read cached certificate {:?}: {}", path, e))
        })
    }

    pub fn load_cached(&self, identity: &str) -> Result<Certificate, SecurityError> {
        Certificate::from_pem(&self.cached_public_data(identity)?)
    }

    /// Append a problem for a missing cache directory or CA file.
    pub fn validate_paths(&self, problems: &mut Vec<String>) {
        match std::fs::metadata(&self.cache_dir) {
            Err(e) => problems.push(format!(
                "certificate cache directory {:?} is not accessible: {}",
                self.cache_dir, e
            )),
            Ok(meta) if !meta.is_dir() => problems.push(format!(
                "certificate cache {:?} is not a directory",
                self.cache_dir
            )),
            Ok(_) => {}
        }

        match std::fs::metadata(&self.ca_file) {
            Err(e) => problems.push(format!("CA file {:?} is not accessible: {}", self.ca_file, e)),
            Ok(meta) if !meta.is_file() => {
                problems.push(format!("CA file {:?} is not a regular file", self.ca_file))
            }
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(Path::new(FIXTURES).join(name)).unwrap()
    }

    fn cache(dir: &TempDir, overwrite: bool) -> CertificateCache {
        let config = SecurityConfig {
            ca_file: Path::new(FIXTURES).join("ca.pem"),
            cert_cache_dir: dir.path().to_path_buf(),
            privileged_users: vec!["/^admin-.*$/".to_string()],
            allow_list: vec!["\\.fleet\\.example$".to_string()],
            always_overwrite_cache: overwrite,
            ..SecurityConfig::default()
        };
        CertificateCache::new(&config)
    }

    #[test]
    fn test_cache_path_is_plain_join() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);

        assert_eq!(
            cache.cache_path("node1.fleet.example"),
            dir.path().join("node1.fleet.example.pem")
        );
    }

    #[test]
    fn test_first_cached_entry_wins_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);
        let node1 = fixture("node1.pem");
        let bundle = [fixture("node1.pem"), fixture("ca.pem")].concat();

        cache.cache_public_data(&node1, "node1.fleet.example").unwrap();
        cache.cache_public_data(&bundle, "node1.fleet.example").unwrap();

        assert_eq!(cache.cached_public_data("node1.fleet.example").unwrap(), node1);
    }

    #[test]
    fn test_overwrite_replaces_cached_entry() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, true);
        let node1 = fixture("node1.pem");
        let bundle = [fixture("node1.pem"), fixture("ca.pem")].concat();

        cache.cache_public_data(&node1, "node1.fleet.example").unwrap();
        cache.cache_public_data(&bundle, "node1.fleet.example").unwrap();

        assert_eq!(cache.cached_public_data("node1.fleet.example").unwrap(), bundle);
    }

    #[test]
    fn test_untrusted_certificate_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);

        assert!(cache.cache_public_data(&fixture("rogue.pem"), "node1.fleet.example").is_err());
        assert!(!cache.cached_cert_exists("node1.fleet.example"));
    }

    #[test]
    fn test_every_certificate_in_the_ca_file_is_trusted() {
        let dir = TempDir::new().unwrap();
        let ca_bundle = dir.path().join("bundle.pem");
        std::fs::write(&ca_bundle, [fixture("ca.pem"), fixture("rogue-ca.pem")].concat()).unwrap();
        let cache = CertificateCache::new(&SecurityConfig {
            ca_file: ca_bundle,
            cert_cache_dir: dir.path().to_path_buf(),
            ..SecurityConfig::default()
        });

        assert_eq!(cache.ca_certificates().unwrap().len(), 2);
        assert!(cache
            .verify_certificate(&fixture("rogue.pem"), Some("node1.fleet.example"))
            .is_ok());
        assert!(cache.verify_certificate(&fixture("node1.pem"), Some("")).is_ok());
        assert!(cache.verify_certificate(&fixture("node1.pem"), Some("node2")).is_err());
    }

    #[test]
    fn test_identity_must_match_certificate_and_allow_list() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);
        let node1 = fixture("node1.pem");

        let mismatch = cache.cache_public_data(&node1, "node2.fleet.example");
        assert!(matches!(mismatch, Err(SecurityError::Cache(_))));

        // "node1" is a SAN of the certificate but not on the allow-list
        let not_allowed = cache.cache_public_data(&node1, "node1");
        assert!(matches!(not_allowed, Err(SecurityError::Cache(_))));
    }

    #[test]
    fn test_privileged_certificate_is_cached_under_its_own_name() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);

        cache.cache_public_data(&fixture("admin-01.pem"), "node7.fleet.example").unwrap();

        assert!(cache.cached_cert_exists("admin-01"));
        assert!(!cache.cached_cert_exists("node7.fleet.example"));
    }

    #[test]
    fn test_admin_certificate_issued_by_a_leaf_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);
        let forged = [fixture("forged-admin.pem"), fixture("node1.pem")].concat();

        let result = cache.cache_public_data(&forged, "node9.fleet.example");

        assert!(matches!(result, Err(SecurityError::Verification(_))), "{:?}", result);
        assert!(!cache.cached_cert_exists("admin-99"));
        assert!(cache.privileged_certs().is_empty());
    }

    #[test]
    fn test_privileged_certs_are_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);
        for name in ["admin-02", "node1.fleet.example", "admin-01", "user-admin-01"] {
            std::fs::write(cache.cache_path(name), b"pem").unwrap();
        }
        std::fs::create_dir(dir.path().join("admin-03")).unwrap();

        assert_eq!(cache.privileged_certs(), vec!["admin-01", "admin-02"]);
        assert_eq!(
            cache.privileged_candidates("node1.fleet.example"),
            vec!["node1.fleet.example", "admin-01", "admin-02"]
        );
        assert_eq!(
            cache.privileged_candidates("node9.fleet.example"),
            vec!["admin-01", "admin-02"]
        );
    }

    #[test]
    fn test_missing_cache_dir_yields_no_privileged_certs() {
        let dir = TempDir::new().unwrap();
        let mut config = SecurityConfig::default();
        config.cert_cache_dir = dir.path().join("missing");
        config.privileged_users = vec![".".to_string()];

        assert!(CertificateCache::new(&config).privileged_certs().is_empty());
    }

    #[test]
    fn test_verify_certificate_name() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);
        let node1 = fixture("node1.pem");

        assert!(cache.verify_certificate(&node1, None).is_ok());
        assert!(cache.verify_certificate(&node1, Some("node1")).is_ok());
        assert!(cache.verify_certificate(&node1, Some("node2.fleet.example")).is_err());
    }

    #[test]
    fn test_validate_paths_reports_every_problem() {
        let dir = TempDir::new().unwrap();
        let mut config = SecurityConfig::default();
        config.cert_cache_dir = dir.path().join("no-cache");
        config.ca_file = dir.path().join("no-ca.pem");

        let mut problems = Vec::new();
        CertificateCache::new(&config).validate_paths(&mut problems);

        assert_eq!(problems.len(), 2);
    }
}
