use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::certificate::Certificate;
use crate::error::Error;

/// Prefix used by OkHttp-style pin strings.
pub const PIN_HEADER_PREFIX: &str = "sha256/";

/// Compute the pin of a certificate: base64 of the SHA-256 of its
/// DER-encoded SubjectPublicKeyInfo.
///
/// The pin depends only on the public key, so it survives re-issuance of a
/// certificate for the same key pair.
pub fn fingerprint(certificate: &Certificate) -> Result<String, Error> {
    match certificate {
        Certificate::X509(der) => spki_pin(der),
        Certificate::Unsupported { kind } => Err(Error::UnsupportedCertificateType(kind.clone())),
    }
}

/// Pin of a DER-encoded X.509 certificate.
pub fn spki_pin(cert_der: &[u8]) -> Result<String, Error> {
    let (_, cert) = X509Certificate::from_der(cert_der).map_err(|e| {
        Error::UnsupportedCertificateType(format!("not a DER X.509 certificate: {}", e))
    })?;
    Ok(BASE64.encode(sha256_hash(cert.public_key().raw)))
}

/// Format a pin as `sha256/<base64>`.
pub fn pin_header(pin: &str) -> String {
    format!("{}{}", PIN_HEADER_PREFIX, pin)
}

/// Accept either `sha256/<base64>` or a bare base64 pin. Returns the bare pin.
///
/// The decoded value must be exactly one SHA-256 digest.
pub fn parse_pin_header(value: &str) -> Option<String> {
    let bare = value.trim();
    let bare = bare.strip_prefix(PIN_HEADER_PREFIX).unwrap_or(bare);
    match BASE64.decode(bare) {
        Ok(bytes) if bytes.len() == 32 => Some(bare.to_string()),
        _ => None,
    }
}

/// SHA-256 hash of arbitrary bytes.
pub fn sha256_hash(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// SHA-256 hash as upper-case hex pairs separated by colons, the form most
/// browsers and `openssl x509 -fingerprint` display.
pub fn sha256_colon_hex(data: &[u8]) -> String {
    sha256_hash(data)
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(":")
}
