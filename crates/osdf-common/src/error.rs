//! Error types for OSDF

use thiserror::Error;

/// OSDF error type
#[derive(Error, Debug)]
pub enum OsdfError {
    /// Policy not found
    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    /// Invalid policy
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Priority outside the accepted range
    #[error("priority {0} out of range [{min}, {max}]", min = crate::policy::MIN_PRIORITY, max = crate::policy::MAX_PRIORITY)]
    InvalidPriority(u32),

    /// Application name not in the catalog
    #[error("unknown application type: {0}")]
    UnknownApplication(String),

    /// Malformed host identifier
    #[error("invalid host id: {0}")]
    InvalidHostId(String),

    /// Malformed connect point
    #[error("invalid connect point: {0}")]
    InvalidConnectPoint(String),

    /// Malformed MAC address
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// A region is required but was not supplied
    #[error("region is required")]
    RegionMissing,

    /// Configuration error
    #[error("config error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for OSDF
pub type OsdfResult<T> = Result<T, OsdfError>;
