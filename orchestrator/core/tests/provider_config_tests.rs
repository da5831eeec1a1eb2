// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Providers built from YAML configuration files.

use std::path::Path;

use aegis_trust::infrastructure::security::pkcs11::TokenError;
use aegis_trust::{create_security_provider, ProviderKind, SecurityConfig, SecurityError};
use tempfile::TempDir;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("security.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn file_yaml(cache: &Path, ca: &Path) -> String {
    format!(
        r#"
provider: file
ca_file: {ca}
cert_cache_dir: {cache}
privileged_users:
  - "/^admin-.*$/"
allow_list:
  - "\\.fleet\\.example$"
file:
  certificate: {fixtures}/node1.pem
  key: {fixtures}/node1-key.pem
"#,
        ca = ca.display(),
        cache = cache.display(),
        fixtures = FIXTURES,
    )
}

#[test]
fn test_file_provider_from_yaml() {
    let dir = TempDir::new().unwrap();
    let yaml = file_yaml(dir.path(), &Path::new(FIXTURES).join("ca.pem"));
    let config = SecurityConfig::from_yaml_file(write_config(&dir, &yaml)).unwrap();

    let provider = create_security_provider(&config).unwrap();

    assert_eq!(config.provider, ProviderKind::File);
    assert_eq!(provider.identity().unwrap(), "node1.fleet.example");

    let (problems, ok) = provider.validate();
    assert!(ok, "{:?}", problems);
    assert!(problems.is_empty());
}

#[test]
fn test_validate_lists_missing_paths() {
    let dir = TempDir::new().unwrap();
    let yaml = file_yaml(&dir.path().join("no-cache"), &dir.path().join("no-ca.pem"));
    let config = SecurityConfig::from_yaml_file(write_config(&dir, &yaml)).unwrap();

    let provider = create_security_provider(&config).unwrap();
    let (problems, ok) = provider.validate();

    assert!(!ok);
    assert_eq!(problems.len(), 2, "{:?}", problems);
}

#[test]
fn test_invalid_pattern_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let yaml = file_yaml(dir.path(), &Path::new(FIXTURES).join("ca.pem"))
        .replace("/^admin-.*$/", "/admin-(/");

    let err = SecurityConfig::from_yaml_file(write_config(&dir, &yaml)).unwrap_err();

    assert!(format!("{:#}", err).contains("privileged_users"), "{:#}", err);
}

#[test]
fn test_pkcs11_driver_that_does_not_exist() {
    let dir = TempDir::new().unwrap();
    let yaml = format!(
        r#"
provider: pkcs11
ca_file: {fixtures}/ca.pem
cert_cache_dir: {cache}
pkcs11:
  driver_file: {cache}/missing-driver.so
  slot: 0
  pin: "1234"
"#,
        fixtures = FIXTURES,
        cache = dir.path().display(),
    );
    let config = SecurityConfig::from_yaml_file(write_config(&dir, &yaml)).unwrap();

    let result = create_security_provider(&config);

    assert!(matches!(
        result,
        Err(SecurityError::Token(TokenError::DriverLoad { .. }))
    ));
}
