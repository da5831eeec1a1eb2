// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Security Provider Configuration
//
// Settings consumed by the security providers:
// - trust anchors (CA file) and the certificate cache directory
// - privileged identity patterns and the cache allow-list
// - backend selection (file keypair or PKCS#11 token) and backend settings
// - development toggles (TLS verification, cache overwrite)
//
// Discovery of the configuration file itself belongs to the host process;
// this module only parses and validates what it is handed.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::identity::IdentityMatcher;
use crate::domain::remote_signer::RemoteSigner;

/// Which security provider backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    File,
    Pkcs11,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::File => write!(f, "file"),
            ProviderKind::Pkcs11 => write!(f, "pkcs11"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Backend to use (file or pkcs11)
    #[serde(default)]
    pub provider: ProviderKind,

    /// File holding the trusted CA certificate(s)
    #[serde(default = "default_ca_file")]
    pub ca_file: PathBuf,

    /// Directory where certificates of other identities are cached
    #[serde(default = "default_cert_cache_dir")]
    pub cert_cache_dir: PathBuf,

    /// Patterns identifying identities that may sign on behalf of others
    #[serde(default)]
    pub privileged_users: Vec<String>,

    /// Patterns identifying identities whose certificates may be cached
    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,

    /// Disable TLS peer verification (development only)
    #[serde(default)]
    pub disable_tls_verify: bool,

    /// Replace existing cache entries instead of keeping the first one seen
    #[serde(default)]
    pub always_overwrite_cache: bool,

    /// File backend settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileProviderConfig>,

    /// PKCS#11 backend settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkcs11: Option<Pkcs11ProviderConfig>,

    /// Delegate used to sign requests remotely
    #[serde(skip)]
    pub remote_signer: Option<Arc<dyn RemoteSigner>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProviderConfig {
    /// PEM encoded public certificate
    pub certificate: PathBuf,

    /// PEM encoded RSA private key (PKCS#8 or PKCS#1)
    pub key: PathBuf,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Pkcs11ProviderConfig {
    /// Dynamic library implementing the PKCS#11 API (usually a .so file)
    pub driver_file: PathBuf,

    /// Slot of the device holding the key and certificate
    #[serde(default)]
    pub slot: u64,

    /// Token PIN; prompted for interactively when absent
    #[serde(default, skip_serializing)]
    pub pin: Option<String>,
}

impl std::fmt::Debug for Pkcs11ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkcs11ProviderConfig")
            .field("driver_file", &self.driver_file)
            .field("slot", &self.slot)
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_ca_file() -> PathBuf {
    PathBuf::from("/etc/aegis/trust/ca.pem")
}

fn default_cert_cache_dir() -> PathBuf {
    PathBuf::from("/var/lib/aegis/trust/certs")
}

fn default_allow_list() -> Vec<String> {
    vec!["\\.aegis$".to_string()]
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            ca_file: default_ca_file(),
            cert_cache_dir: default_cert_cache_dir(),
            privileged_users: Vec::new(),
            allow_list: default_allow_list(),
            disable_tls_verify: false,
            always_overwrite_cache: false,
            file: None,
            pkcs11: None,
            remote_signer: None,
        }
    }
}

impl SecurityConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read security configuration {:?}", path))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse security configuration {:?}", path))
    }

    /// Parse configuration from a YAML string and validate it
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let mut config: SecurityConfig = serde_yaml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_TRUST_DISABLE_TLS_VERIFY") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => {
                    tracing::warn!(
                        "Environment override: AEGIS_TRUST_DISABLE_TLS_VERIFY=true, \
                         TLS peer verification is off"
                    );
                    self.disable_tls_verify = true;
                }
                "false" | "0" | "no" => {
                    tracing::info!("Environment override: AEGIS_TRUST_DISABLE_TLS_VERIFY=false");
                    self.disable_tls_verify = false;
                }
                _ => {
                    tracing::warn!(
                        "Ignoring invalid AEGIS_TRUST_DISABLE_TLS_VERIFY value: {:?}",
                        val
                    );
                }
            }
        }

        if let Ok(pin) = std::env::var("AEGIS_TRUST_PKCS11_PIN") {
            if let Some(pkcs11) = self.pkcs11.as_mut() {
                tracing::info!("Environment override: AEGIS_TRUST_PKCS11_PIN is set");
                pkcs11.pin = Some(pin);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ca_file.as_os_str().is_empty() {
            anyhow::bail!("ca_file cannot be empty");
        }

        if self.cert_cache_dir.as_os_str().is_empty() {
            anyhow::bail!("cert_cache_dir cannot be empty");
        }

        IdentityMatcher::try_new(&self.privileged_users).context("Invalid privileged_users")?;
        IdentityMatcher::try_new(&self.allow_list).context("Invalid allow_list")?;

        match self.provider {
            ProviderKind::File => {
                let file = self.file.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("file provider selected but 'file' settings are missing")
                })?;
                if file.certificate.as_os_str().is_empty() {
                    anyhow::bail!("file.certificate cannot be empty");
                }
                if file.key.as_os_str().is_empty() {
                    anyhow::bail!("file.key cannot be empty");
                }
            }
            ProviderKind::Pkcs11 => {
                let pkcs11 = self.pkcs11.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("pkcs11 provider selected but 'pkcs11' settings are missing")
                })?;
                if pkcs11.driver_file.as_os_str().is_empty() {
                    anyhow::bail!("pkcs11.driver_file cannot be empty");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SecurityConfig::default();

        assert_eq!(config.provider, ProviderKind::File);
        assert!(!config.disable_tls_verify);
        assert!(!config.always_overwrite_cache);
        assert!(config.remote_signer.is_none());
    }

    #[test]
    fn test_parse_file_provider() {
        let yaml = r#"
provider: file
ca_file: /etc/aegis/trust/ca.pem
cert_cache_dir: /var/lib/aegis/trust/certs
privileged_users:
  - "/^admin-.*$/"
allow_list:
  - "\\.fleet\\.example$"
file:
  certificate: /etc/aegis/trust/node.pem
  key: /etc/aegis/trust/node-key.pem
"#;
        let config = SecurityConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.provider, ProviderKind::File);
        assert_eq!(config.privileged_users, vec!["/^admin-.*$/"]);
        assert_eq!(
            config.file.unwrap().key,
            PathBuf::from("/etc/aegis/trust/node-key.pem")
        );
    }

    #[test]
    fn test_parse_pkcs11_provider() {
        let yaml = r#"
provider: pkcs11
pkcs11:
  driver_file: /usr/lib/softhsm/libsofthsm2.so
  slot: 3
"#;
        let config: SecurityConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        let pkcs11 = config.pkcs11.unwrap();
        assert_eq!(pkcs11.slot, 3);
        assert!(pkcs11.pin.is_none());
    }

    #[test]
    fn test_pin_is_never_serialized() {
        let mut config = SecurityConfig::default();
        config.provider = ProviderKind::Pkcs11;
        config.pkcs11 = Some(Pkcs11ProviderConfig {
            driver_file: PathBuf::from("/usr/lib/libtoken.so"),
            slot: 0,
            pin: Some("123456".to_string()),
        });

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("123456"));
    }

    #[test]
    fn test_pin_is_redacted_from_debug_output() {
        let config = SecurityConfig {
            provider: ProviderKind::Pkcs11,
            pkcs11: Some(Pkcs11ProviderConfig {
                driver_file: PathBuf::from("/usr/lib/libtoken.so"),
                slot: 3,
                pin: Some("123456".to_string()),
            }),
            ..SecurityConfig::default()
        };

        let debug = format!("{:?}", config);

        assert!(!debug.contains("123456"), "{}", debug);
        assert!(debug.contains("<redacted>"), "{}", debug);
        assert!(debug.contains("libtoken.so"), "{}", debug);
        assert!(debug.contains("slot: 3"), "{}", debug);
    }

    #[test]
    fn test_validation() {
        let mut config = SecurityConfig::default();
        assert!(config.validate().is_err(), "file settings are required");

        config.file = Some(FileProviderConfig {
            certificate: PathBuf::from("node.pem"),
            key: PathBuf::from("node-key.pem"),
        });
        assert!(config.validate().is_ok());

        config.privileged_users = vec!["/admin[/".to_string()];
        assert!(config.validate().is_err());

        config.privileged_users.clear();
        config.provider = ProviderKind::Pkcs11;
        assert!(config.validate().is_err(), "pkcs11 settings are required");
    }
}
