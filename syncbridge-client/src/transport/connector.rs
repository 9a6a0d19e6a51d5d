//! TLS setup for the hyper connector.
//!
//! # Feature Flags
//!
//! Verifying servers against public roots needs both a crypto provider and a
//! root certificate source:
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!
//! - **Root certificates** (choose one):
//!   - `tls-native-roots` - Use system root certificates (default with `tls` feature)
//!   - `tls-webpki-roots` - Use bundled Mozilla root certificates
//!
//! Without a feature-gated provider, a process-wide default installed through
//! `CryptoProvider::install_default()` is used. A CA file or disabled
//! verification works without any root certificate feature.

use std::path::Path;
use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use rustls::ClientConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use syncbridge_core::BridgeError;

use crate::options::{ClientCertKey, VerifyMode};

/// Check if public-root verification is available.
///
/// Returns true if both a crypto provider AND root certificates are compiled in.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

/// Get a config builder for the available crypto provider.
///
/// Priority:
/// 1. Feature-gated provider (tls-ring or tls-aws-lc)
/// 2. User-installed global default provider
fn crypto_provider_builder()
-> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>, BridgeError> {
    #[cfg(feature = "tls-ring")]
    let provider = Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    let provider = Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    let provider = rustls::crypto::CryptoProvider::get_default().cloned();

    let provider = provider.ok_or_else(|| {
        BridgeError::InvalidConfiguration(
            "TLS needs a crypto provider: enable `tls-ring` or `tls-aws-lc`, \
             or install one with `CryptoProvider::install_default()`"
                .into(),
        )
    })?;

    ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_error)
}

/// Build the root certificate store from enabled features.
#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn default_root_store() -> Result<rustls::RootCertStore, BridgeError> {
    let mut roots = rustls::RootCertStore::empty();

    // Prefer native over webpki if both enabled
    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!("errors loading native certs: {:?}", native_certs.errors);
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(roots)
}

#[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
fn default_root_store() -> Result<rustls::RootCertStore, BridgeError> {
    Err(BridgeError::InvalidConfiguration(
        "verifying against public roots needs `tls-native-roots` or `tls-webpki-roots`; \
         pass a CA file instead"
            .into(),
    ))
}

/// Load every certificate of a PEM file into a fresh root store.
fn ca_file_root_store(path: &Path) -> Result<rustls::RootCertStore, BridgeError> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(path).map_err(|e| pem_error(path, e))? {
        roots
            .add(cert.map_err(|e| pem_error(path, e))?)
            .map_err(tls_error)?;
    }

    if roots.is_empty() {
        return Err(BridgeError::InvalidConfiguration(format!(
            "no CA certificates found in {}",
            path.display()
        )));
    }
    Ok(roots)
}

/// Load the certificate chain and private key of a client certificate file.
fn client_identity(
    cert: &ClientCertKey,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), BridgeError> {
    if cert.passphrase.is_some() {
        return Err(BridgeError::InvalidConfiguration(
            "passphrase-protected client keys are not supported".into(),
        ));
    }

    let path = cert.path.as_path();
    let chain = CertificateDer::pem_file_iter(path)
        .map_err(|e| pem_error(path, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| pem_error(path, e))?;
    if chain.is_empty() {
        return Err(BridgeError::InvalidConfiguration(format!(
            "no client certificate found in {}",
            path.display()
        )));
    }

    let key = PrivateKeyDer::from_pem_file(path).map_err(|e| pem_error(path, e))?;
    Ok((chain, key))
}

/// Build the TLS client configuration for a verification mode and optional
/// client certificate.
pub fn build_tls_config(
    verify: &VerifyMode,
    client_cert: Option<&ClientCertKey>,
) -> Result<ClientConfig, BridgeError> {
    let builder = crypto_provider_builder()?;

    let builder = match verify {
        VerifyMode::Default => builder.with_root_certificates(default_root_store()?),
        VerifyMode::CaFile(path) => builder.with_root_certificates(ca_file_root_store(path)?),
        VerifyMode::Disabled => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousAcceptAnyCertVerifier)),
    };

    match client_cert {
        Some(cert) => {
            let (chain, key) = client_identity(cert)?;
            builder.with_client_auth_cert(chain, key).map_err(tls_error)
        }
        None => Ok(builder.with_no_client_auth()),
    }
}

/// Wrap a plain connector so `https://` destinations go through rustls.
///
/// Plain `http://` destinations pass through unchanged. With `http1_only`
/// no ALPN is offered, so servers cannot switch the connection to HTTP/2.
pub fn build_https_connector<C>(
    connector: C,
    config: ClientConfig,
    http1_only: bool,
) -> HttpsConnector<C> {
    let builder = HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http();
    if http1_only {
        builder.enable_http1().wrap_connector(connector)
    } else {
        builder.enable_all_versions().wrap_connector(connector)
    }
}

fn tls_error(err: rustls::Error) -> BridgeError {
    BridgeError::InvalidConfiguration(format!("TLS configuration: {err}"))
}

fn pem_error(path: &Path, err: rustls::pki_types::pem::Error) -> BridgeError {
    BridgeError::InvalidConfiguration(format!("reading {}: {err}", path.display()))
}

// ============================================================================
// Dangerous: Accept Invalid Certificates
// ============================================================================

/// A certificate verifier that accepts any certificate.
///
/// # Warning
///
/// Only used when verification is explicitly disabled. It makes the
/// connection vulnerable to man-in-the-middle attacks.
#[derive(Debug)]
pub struct DangerousAcceptAnyCertVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousAcceptAnyCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
