// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Engine error taxonomy

use thiserror::Error;

/// Errors surfaced by the engine's command interface
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Unknown device id
    #[error("device not found: {id}")]
    NotFound { id: String },

    /// Command rejected because of the device's current state
    #[error("device is {reason}")]
    Conflict { reason: String },

    /// Status string is not one of ok / fault / offline
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// Malformed command payload
    #[error("validation failed: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    pub fn offline() -> Self {
        Self::Conflict { reason: "offline".to_string() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(EngineError::not_found("abc").to_string(), "device not found: abc");
        assert_eq!(EngineError::offline().to_string(), "device is offline");
        assert!(EngineError::not_found("abc").is_not_found());
        assert!(!EngineError::offline().is_not_found());
    }
}
