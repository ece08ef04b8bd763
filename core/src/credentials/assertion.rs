//! Signed client assertions for the certificate credential
//!
//! The token endpoint authenticates a certificate holder through a short-lived
//! RS256 JWT whose header carries the certificate's SHA-1 thumbprint (`x5t`).
//! The key and certificate come out of the PKCS#12 (or PEM bundle) fetched
//! from the vault and never leave memory.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use serde::Serialize;

use super::error::{CredentialError, Result};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const ASSERTION_LIFETIME_SECS: i64 = 600;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// RSA signing key paired with the thumbprint of its certificate
pub struct AssertionSigner {
    key: EncodingKey,
    thumbprint: String,
}

impl AssertionSigner {
    /// PKCS#12 DER bytes
    pub fn from_pkcs12(der: &[u8], password: Option<&str>) -> Result<Self> {
        let parsed = Pkcs12::from_der(der)
            .and_then(|p| p.parse2(password.unwrap_or("")))
            .map_err(|e| invalid(format!("PKCS#12: {e}")))?;
        let key = parsed
            .pkey
            .ok_or_else(|| invalid("PKCS#12 holds no private key".into()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| invalid("PKCS#12 holds no certificate".into()))?;
        Self::from_parts(&key, &cert)
    }

    /// Text as stored in the vault: base64 PKCS#12, or a PEM bundle with
    /// both the private key and the certificate
    pub fn from_text(text: &str, password: Option<&str>) -> Result<Self> {
        if text.contains("-----BEGIN") {
            return Self::from_pem(text.as_bytes(), password);
        }
        let compact: String = text.split_whitespace().collect();
        let der = STANDARD
            .decode(compact)
            .map_err(|e| invalid(format!("neither PEM nor base64 PKCS#12: {e}")))?;
        Self::from_pkcs12(&der, password)
    }

    fn from_pem(pem: &[u8], password: Option<&str>) -> Result<Self> {
        let key = match password {
            Some(p) => PKey::private_key_from_pem_passphrase(pem, p.as_bytes()),
            None => PKey::private_key_from_pem(pem),
        }
        .map_err(|e| invalid(format!("PEM private key: {e}")))?;
        let cert = X509::from_pem(pem).map_err(|e| invalid(format!("PEM certificate: {e}")))?;
        Self::from_parts(&key, &cert)
    }

    fn from_parts(key: &PKey<Private>, cert: &X509) -> Result<Self> {
        let der = key
            .rsa()
            .and_then(|rsa| rsa.private_key_to_der())
            .map_err(|e| invalid(format!("certificate key must be RSA: {e}")))?;
        let digest = cert
            .digest(MessageDigest::sha1())
            .map_err(|e| invalid(format!("certificate thumbprint: {e}")))?;
        Ok(Self {
            key: EncodingKey::from_rsa_der(&der),
            thumbprint: URL_SAFE_NO_PAD.encode(&*digest),
        })
    }

    /// base64url SHA-1 thumbprint, as sent in the `x5t` header
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Assertion for `client_id` addressed to the token endpoint `audience`
    pub fn sign(&self, client_id: &str, audience: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: audience,
            iss: client_id,
            sub: client_id,
            jti: new_jti()?,
            nbf: now,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.thumbprint.clone());
        encode(&header, &claims, &self.key)
            .map_err(|e| CredentialError::Token(format!("sign client assertion: {e}")))
    }
}

fn new_jti() -> Result<String> {
    let mut bytes = [0u8; 16];
    openssl::rand::rand_bytes(&mut bytes)
        .map_err(|e| CredentialError::Token(format!("assertion id: {e}")))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

fn invalid(message: String) -> CredentialError {
    CredentialError::InvalidCertificate(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::rsa::Rsa;
    use openssl::x509::X509NameBuilder;

    fn key_and_cert() -> (PKey<Private>, X509) {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "relay-test").unwrap();
        let name = name.build();
        let mut cert = X509::builder().unwrap();
        cert.set_version(2).unwrap();
        cert.set_subject_name(&name).unwrap();
        cert.set_issuer_name(&name).unwrap();
        cert.set_pubkey(&key).unwrap();
        cert.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        cert.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        cert.sign(&key, MessageDigest::sha256()).unwrap();
        (key, cert.build())
    }

    #[test]
    fn base64_pkcs12_and_pem_give_the_same_thumbprint() {
        let (key, cert) = key_and_cert();
        let pfx = Pkcs12::builder()
            .name("relay")
            .pkey(&key)
            .cert(&cert)
            .build2("pw")
            .unwrap()
            .to_der()
            .unwrap();

        let from_b64 = AssertionSigner::from_text(&STANDARD.encode(&pfx), Some("pw")).unwrap();
        let from_der = AssertionSigner::from_pkcs12(&pfx, Some("pw")).unwrap();

        let mut pem = key.private_key_to_pem_pkcs8().unwrap();
        pem.extend(cert.to_pem().unwrap());
        let from_pem = AssertionSigner::from_text(&String::from_utf8(pem).unwrap(), None).unwrap();

        let expected = URL_SAFE_NO_PAD.encode(&*cert.digest(MessageDigest::sha1()).unwrap());
        assert_eq!(from_b64.thumbprint(), expected);
        assert_eq!(from_der.thumbprint(), expected);
        assert_eq!(from_pem.thumbprint(), expected);
    }

    #[test]
    fn wrong_password_is_invalid_certificate() {
        let (key, cert) = key_and_cert();
        let pfx = Pkcs12::builder()
            .name("relay")
            .pkey(&key)
            .cert(&cert)
            .build2("pw")
            .unwrap()
            .to_der()
            .unwrap();
        assert!(matches!(
            AssertionSigner::from_pkcs12(&pfx, Some("nope")),
            Err(CredentialError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn assertion_header_carries_thumbprint() {
        let (key, cert) = key_and_cert();
        let mut pem = key.private_key_to_pem_pkcs8().unwrap();
        pem.extend(cert.to_pem().unwrap());
        let signer = AssertionSigner::from_text(&String::from_utf8(pem).unwrap(), None).unwrap();

        let jwt = signer.sign("client", "https://login.example.com/t/oauth2/v2.0/token").unwrap();
        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.x5t.as_deref(), Some(signer.thumbprint()));
    }
}
