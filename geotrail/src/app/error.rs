//! Application error types.

use std::fmt;

use crate::store::TripStoreError;

/// Errors that can occur during application lifecycle.
#[derive(Debug)]
pub enum AppError {
    /// Failed to open the trip store backend.
    StoreOpen(TripStoreError),

    /// Failed to read the persisted trip id high-water mark.
    StoreProbe(TripStoreError),

    /// Configuration error.
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::StoreOpen(e) => {
                write!(f, "Failed to open trip store: {}", e)
            }
            AppError::StoreProbe(e) => {
                write!(f, "Failed to probe trip store: {}", e)
            }
            AppError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::StoreOpen(e) | AppError::StoreProbe(e) => Some(e),
            AppError::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config("bind address unset".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("bind address unset"));
    }

    #[test]
    fn test_store_error_has_source() {
        let err = AppError::StoreOpen(TripStoreError::Backend("disk gone".to_string()));
        assert!(std::error::Error::source(&err).is_some());
    }
}
