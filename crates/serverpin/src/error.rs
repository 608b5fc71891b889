use thiserror::Error;

use crate::certificate::CertificateDetails;
use crate::types::pinning::PinRecord;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Certificate pin mismatch for {hostname}: observed {attempted_pins:?}")]
    PinMismatch {
        hostname: String,
        record: Box<PinRecord>,
        attempted_pins: Vec<String>,
        certificate: Option<Box<CertificateDetails>>,
    },

    #[error("Certificate pin for {hostname} has expired")]
    PinExpired {
        hostname: String,
        record: Box<PinRecord>,
        attempted_pins: Vec<String>,
        certificate: Option<Box<CertificateDetails>>,
    },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Unsupported certificate type: {0}")]
    UnsupportedCertificateType(String),

    #[error("Invalid hostname: {0:?}")]
    InvalidHostname(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::PinMismatch { .. } => ErrorCode::PinMismatch,
            Error::PinExpired { .. } => ErrorCode::PinExpired,
            Error::Storage(_) => ErrorCode::StorageFailure,
            Error::UnsupportedCertificateType(_) => ErrorCode::UnsupportedCertificateType,
            Error::InvalidHostname(_) => ErrorCode::InvalidHostname,
            Error::Json(_) => ErrorCode::EncodingFailed,
        }
    }

    /// Mismatch and expiry are surfaced to the user for a decision.
    /// Everything else should reject the connection outright.
    pub fn requires_user_decision(&self) -> bool {
        matches!(self, Error::PinMismatch { .. } | Error::PinExpired { .. })
    }

    /// The stored record involved in a mismatch or expiry.
    pub fn pin_record(&self) -> Option<&PinRecord> {
        match self {
            Error::PinMismatch { record, .. } | Error::PinExpired { record, .. } => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "PIN_MISMATCH")]
    PinMismatch,
    #[serde(rename = "PIN_EXPIRED")]
    PinExpired,
    #[serde(rename = "STORAGE_FAILURE")]
    StorageFailure,
    #[serde(rename = "UNSUPPORTED_CERTIFICATE_TYPE")]
    UnsupportedCertificateType,
    #[serde(rename = "INVALID_HOSTNAME")]
    InvalidHostname,
    #[serde(rename = "ENCODING_FAILED")]
    EncodingFailed,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::PinMismatch => "PIN_MISMATCH",
            ErrorCode::PinExpired => "PIN_EXPIRED",
            ErrorCode::StorageFailure => "STORAGE_FAILURE",
            ErrorCode::UnsupportedCertificateType => "UNSUPPORTED_CERTIFICATE_TYPE",
            ErrorCode::InvalidHostname => "INVALID_HOSTNAME",
            ErrorCode::EncodingFailed => "ENCODING_FAILED",
        };
        write!(f, "{}", s)
    }
}
