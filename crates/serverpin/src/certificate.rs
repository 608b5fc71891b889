//! Certificate chain entries and the read-only details shown when a trust
//! decision is put in front of the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::crypto;
use crate::error::Error;

/// One entry of a peer's certificate chain as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    /// DER-encoded X.509 certificate.
    X509(Vec<u8>),
    /// Any other certificate kind. Skipped during validation.
    Unsupported { kind: String },
}

impl Certificate {
    pub fn is_x509(&self) -> bool {
        matches!(self, Certificate::X509(_))
    }

    /// Parse every PEM block in `data`. `CERTIFICATE` blocks become X.509
    /// entries, anything else is kept as an unsupported entry.
    pub fn chain_from_pem(data: &[u8]) -> Result<Vec<Certificate>, Error> {
        let mut chain = Vec::new();
        for pem in Pem::iter_from_buffer(data) {
            let pem = pem.map_err(|e| {
                Error::UnsupportedCertificateType(format!("invalid PEM block: {}", e))
            })?;
            if pem.label == "CERTIFICATE" {
                chain.push(Certificate::X509(pem.contents));
            } else {
                chain.push(Certificate::Unsupported { kind: pem.label });
            }
        }
        if chain.is_empty() {
            return Err(Error::UnsupportedCertificateType(
                "no PEM blocks found".to_string(),
            ));
        }
        Ok(chain)
    }
}

/// Subject, issuer, validity and pins of one certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateDetails {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Base64 SHA-256 of the public key, the value stored as a pin.
    pub pin: String,
    /// Colon-separated SHA-256 of the whole certificate.
    pub sha256_fingerprint: String,
}

impl CertificateDetails {
    pub fn from_certificate(certificate: &Certificate) -> Result<Self, Error> {
        match certificate {
            Certificate::X509(der) => Self::from_der(der),
            Certificate::Unsupported { kind } => {
                Err(Error::UnsupportedCertificateType(kind.clone()))
            }
        }
    }

    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
            Error::UnsupportedCertificateType(format!("not a DER X.509 certificate: {}", e))
        })?;
        let validity = cert.validity();
        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: asn1_to_utc(validity.not_before)?,
            not_after: asn1_to_utc(validity.not_after)?,
            pin: crypto::spki_pin(der)?,
            sha256_fingerprint: crypto::sha256_colon_hex(der),
        })
    }

    pub fn is_within_validity(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

fn asn1_to_utc(time: ASN1Time) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or_else(|| {
        Error::UnsupportedCertificateType("validity date out of range".to_string())
    })
}
