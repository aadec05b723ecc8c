//! phpIPAM client errors

use thiserror::Error;

/// Errors that can occur when interacting with phpIPAM
#[derive(Debug, Error)]
pub enum IpamError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// phpIPAM answered with a non-success envelope
    #[error("phpIPAM API error (code {code}): {message}")]
    Api {
        /// `code` field of the envelope
        code: i64,
        /// `message` field of the envelope
        message: String,
    },

    /// Response body could not be decoded into the expected model
    #[error("Decode error: {0}")]
    Decode(String),

    /// Token could not be obtained or was rejected after a refresh
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Address or subnet not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// No candidate subnet could provide an address
    #[error("Unable to reserve IP in zone {zone}: {reason}")]
    Exhausted {
        /// Zone the reservation was attempted in
        zone: String,
        /// Why the last candidate failed
        reason: String,
    },

    /// Invalid or incomplete configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
