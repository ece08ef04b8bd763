//! Certificate material and the certificate credential construction fallbacks
//!
//! Credential constructors are picky about how a PKCS#12 blob is handed to
//! them, so construction tries three shapes in order: the base64 text as
//! fetched, the decoded bytes, and finally a short-lived file holding the
//! bytes. The file is removed right after the constructor returns, whatever
//! the outcome.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{CredentialError, Result};
use super::factory::CredentialFactory;
use super::token::TokenCredential;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateFormat {
    Pkcs12,
}

/// Certificate as fetched from the vault. Never persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMaterial {
    /// base64-encoded PKCS#12
    pub payload: String,
    pub password: Option<String>,
    pub format: CertificateFormat,
}

impl CertificateMaterial {
    pub fn pkcs12(payload: impl Into<String>, password: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            password,
            format: CertificateFormat::Pkcs12,
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        let compact: String = self.payload.split_whitespace().collect();
        STANDARD
            .decode(compact)
            .map_err(|e| CredentialError::InvalidCertificate(format!("payload is not base64: {e}")))
    }
}

impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("payload", &format_args!("<{} base64 chars>", self.payload.len()))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("format", &self.format)
            .finish()
    }
}

/// The shapes a certificate can be handed to a credential constructor in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// Text exactly as stored in the vault
    Encoded(String),
    /// Decoded PKCS#12 bytes
    Der(Vec<u8>),
    /// Path to a file holding the PKCS#12 bytes
    Path(PathBuf),
}

impl CertificateSource {
    pub fn kind(&self) -> &'static str {
        match self {
            CertificateSource::Encoded(_) => "string",
            CertificateSource::Der(_) => "buffer",
            CertificateSource::Path(_) => "file",
        }
    }
}

/// Who the certificate credential is issued for
#[derive(Debug, Clone)]
pub struct CertificateIdentity<'a> {
    pub tenant_id: &'a str,
    pub client_id: &'a str,
}

/// Try the string, buffer and file shapes in order; first constructor that
/// returns wins. All three failing yields one error carrying every sub-error.
pub fn construct_certificate_credential(
    factory: &dyn CredentialFactory,
    identity: &CertificateIdentity<'_>,
    material: &CertificateMaterial,
    temp_dir: &Path,
) -> Result<Arc<dyn TokenCredential>> {
    let password = material.password.as_deref();
    let mut errors: Vec<String> = Vec::with_capacity(3);

    let source = CertificateSource::Encoded(material.payload.clone());
    match factory.certificate(identity.tenant_id, identity.client_id, source, password) {
        Ok(cred) => return Ok(cred),
        Err(e) => {
            debug!(target: "credentials", error = %e, "Certificate string form rejected");
            errors.push(format!("string: {e}"));
        }
    }

    let bytes = match material.decode() {
        Ok(b) => b,
        Err(e) => {
            errors.push(format!("buffer: {e}"));
            errors.push(format!("file: {e}"));
            return Err(aggregate(errors));
        }
    };

    let source = CertificateSource::Der(bytes.clone());
    match factory.certificate(identity.tenant_id, identity.client_id, source, password) {
        Ok(cred) => return Ok(cred),
        Err(e) => {
            debug!(target: "credentials", error = %e, "Certificate buffer form rejected");
            errors.push(format!("buffer: {e}"));
        }
    }

    match with_temp_cert_file(&bytes, temp_dir, |path| {
        factory.certificate(
            identity.tenant_id,
            identity.client_id,
            CertificateSource::Path(path.to_path_buf()),
            password,
        )
    }) {
        Ok(cred) => Ok(cred),
        Err(e) => {
            debug!(target: "credentials", error = %e, "Certificate file form rejected");
            errors.push(format!("file: {e}"));
            Err(aggregate(errors))
        }
    }
}

fn aggregate(errors: Vec<String>) -> CredentialError {
    CredentialError::InvalidCertificate(errors.join("; "))
}

/// Write `bytes` to a uniquely named file, run `f` with its path, then remove
/// the file. Removal happens on every path out of this function, including
/// unwinding, because the file is owned by a `NamedTempFile` guard.
fn with_temp_cert_file<T>(
    bytes: &[u8],
    temp_dir: &Path,
    f: impl FnOnce(&Path) -> Result<T>,
) -> Result<T> {
    let mut file = tempfile::Builder::new()
        .prefix("relay-cert-")
        .suffix(".pfx")
        .tempfile_in(temp_dir)
        .map_err(|e| CredentialError::InvalidCertificate(format!("create temp file: {e}")))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| CredentialError::InvalidCertificate(format!("write temp file: {e}")))?;

    let result = f(file.path());

    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        warn!(target: "credentials", path = %path.display(), error = %e, "Failed to remove temporary certificate file");
    }
    result
}
