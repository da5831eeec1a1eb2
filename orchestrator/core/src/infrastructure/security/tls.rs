// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! TLS and HTTP Configuration
//!
//! Builds rustls client/server configurations and reqwest clients from the
//! provider's active identity. The private key is never handed to rustls:
//! handshake signatures are routed through [`PrivateKeySigner`], so the same
//! code serves file keys and keys that never leave a hardware token.
//!
//! - Client certificate is always presented.
//! - The CA file is both the server root store and the client-auth root store.
//! - Minimum protocol version is TLS 1.2. TLS 1.3 is only offered when the
//!   signer can produce RSA-PSS signatures.
//! - `disable_tls_verify` swaps in a verifier that accepts any peer
//!   certificate; handshake signatures are still checked.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Transport security material for bus and HTTP connections

use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ResolvesClientCert;
use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::{CertifiedKey, Signer, SigningKey};
use rustls::{
    ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureAlgorithm,
    SignatureScheme, SupportedProtocolVersion,
};
use tracing::{debug, warn};

use crate::domain::hash::HashAlgorithm;
use crate::infrastructure::security::certificate::load_ca_certificates;
use crate::infrastructure::security::provider::ActiveIdentity;
use crate::infrastructure::security::signer::{Padding, PrivateKeySigner};
use crate::infrastructure::security::SecurityError;

/// Client and server TLS configuration for one identity.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub client: Arc<ClientConfig>,
    pub server: Arc<ServerConfig>,
}

/// Build TLS configuration for `identity`, trusting the CAs in `ca_file`.
pub fn build_tls_config(
    identity: &ActiveIdentity,
    ca_file: &Path,
    insecure: bool,
) -> Result<TlsConfig, SecurityError> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let versions = protocol_versions(identity.signer.as_ref());

    let mut roots = RootCertStore::empty();
    for ca in load_ca_certificates(ca_file)? {
        roots
            .add(CertificateDer::from(ca.der().to_vec()))
            .map_err(|e| {
                SecurityError::Tls(format!("invalid CA certificate in {:?}: {}", ca_file, e))
            })?;
    }
    let roots = Arc::new(roots);

    let resolver = Arc::new(StaticCertResolver::new(identity));

    let client_builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(versions)
        .map_err(|e| SecurityError::Tls(e.to_string()))?;
    let client = if insecure {
        warn!("TLS peer verification is disabled, do not use this outside development");
        client_builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureServerVerifier::new(
                provider.clone(),
            )))
            .with_client_cert_resolver(resolver.clone())
    } else {
        client_builder
            .with_root_certificates(roots.clone())
            .with_client_cert_resolver(resolver.clone())
    };

    let server_builder = ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(versions)
        .map_err(|e| SecurityError::Tls(e.to_string()))?;
    let server = if insecure {
        server_builder.with_no_client_auth().with_cert_resolver(resolver)
    } else {
        let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider)
            .build()
            .map_err(|e| SecurityError::Tls(e.to_string()))?;
        server_builder
            .with_client_cert_verifier(verifier)
            .with_cert_resolver(resolver)
    };

    debug!(
        "Built TLS configuration for {} (insecure: {})",
        identity.certificate.common_name(),
        insecure
    );

    Ok(TlsConfig {
        client: Arc::new(client),
        server: Arc::new(server),
    })
}

/// HTTP client, TLS-wrapped with `tls` when given.
pub fn build_http_client(tls: Option<&TlsConfig>) -> Result<reqwest::Client, SecurityError> {
    let builder = reqwest::Client::builder();
    let builder = match tls {
        Some(tls) => builder.use_preconfigured_tls(ClientConfig::clone(&tls.client)),
        None => builder,
    };

    builder
        .build()
        .map_err(|e| SecurityError::Tls(format!("could not set up HTTP client: {}", e)))
}

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];

fn protocol_versions(
    signer: &dyn PrivateKeySigner,
) -> &'static [&'static SupportedProtocolVersion] {
    // TLS 1.3 only allows RSA-PSS for handshake signatures
    if signer.supports_pss() {
        rustls::DEFAULT_VERSIONS
    } else {
        TLS12_ONLY
    }
}

/// Signature schemes in order of preference.
const SCHEMES: [(SignatureScheme, HashAlgorithm, Padding); 6] = [
    (SignatureScheme::RSA_PSS_SHA256, HashAlgorithm::Sha256, Padding::Pss),
    (SignatureScheme::RSA_PSS_SHA384, HashAlgorithm::Sha384, Padding::Pss),
    (SignatureScheme::RSA_PSS_SHA512, HashAlgorithm::Sha512, Padding::Pss),
    (SignatureScheme::RSA_PKCS1_SHA256, HashAlgorithm::Sha256, Padding::Pkcs1v15),
    (SignatureScheme::RSA_PKCS1_SHA384, HashAlgorithm::Sha384, Padding::Pkcs1v15),
    (SignatureScheme::RSA_PKCS1_SHA512, HashAlgorithm::Sha512, Padding::Pkcs1v15),
];

#[derive(Debug)]
struct IdentitySigningKey {
    signer: Arc<dyn PrivateKeySigner>,
}

impl SigningKey for IdentitySigningKey {
    fn choose_scheme(&self, offered: &[SignatureScheme]) -> Option<Box<dyn Signer>> {
        SCHEMES
            .iter()
            .filter(|(_, _, padding)| *padding == Padding::Pkcs1v15 || self.signer.supports_pss())
            .find(|(scheme, _, _)| offered.contains(scheme))
            .map(|&(scheme, hash, padding)| {
                Box::new(IdentitySigner {
                    signer: self.signer.clone(),
                    scheme,
                    hash,
                    padding,
                }) as Box<dyn Signer>
            })
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::RSA
    }
}

#[derive(Debug)]
struct IdentitySigner {
    signer: Arc<dyn PrivateKeySigner>,
    scheme: SignatureScheme,
    hash: HashAlgorithm,
    padding: Padding,
}

impl Signer for IdentitySigner {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, rustls::Error> {
        let digest = self
            .hash
            .digest(message)
            .ok_or_else(|| rustls::Error::General(format!("cannot hash with {:?}", self.hash)))?;
        self.signer
            .sign_digest(self.hash, &digest, self.padding)
            .map_err(|e| rustls::Error::General(e.to_string()))
    }

    fn scheme(&self) -> SignatureScheme {
        self.scheme
    }
}

/// Presents the active identity's certificate for every handshake, in both
/// the client and the server role.
#[derive(Debug)]
struct StaticCertResolver {
    key: Arc<CertifiedKey>,
}

impl StaticCertResolver {
    fn new(identity: &ActiveIdentity) -> Self {
        let chain = vec![CertificateDer::from(identity.certificate.der().to_vec())];
        let key = Arc::new(IdentitySigningKey {
            signer: identity.signer.clone(),
        });

        Self {
            key: Arc::new(CertifiedKey::new(chain, key)),
        }
    }
}

impl ResolvesClientCert for StaticCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(self.key.clone())
    }

    fn has_certs(&self) -> bool {
        true
    }
}

impl ResolvesServerCert for StaticCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.key.clone())
    }
}

/// Accepts any server certificate. Development only.
#[derive(Debug)]
struct InsecureServerVerifier {
    provider: Arc<CryptoProvider>,
}

impl InsecureServerVerifier {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for InsecureServerVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
