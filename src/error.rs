//! Trust system error types with clear, actionable messages

use thiserror::Error;

/// Workspace trust specific errors
#[derive(Error, Debug)]
pub enum TrustError {
    /// A mutating operation was called before `initialize()`. This indicates
    /// a sequencing bug in the host application, not a runtime condition.
    #[error("workspace trust service is not initialized; call initialize() before mutating trust state")]
    NotInitialized,

    /// A trust transition participant failed; the transition was aborted and
    /// the trust-changed event was not fired.
    #[error("trust transition participant failed")]
    TransitionFailed(#[source] anyhow::Error),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML configuration error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrustError {
    /// Log security-relevant errors under the dedicated target
    pub fn log_if_security_relevant(&self) {
        if let TrustError::TransitionFailed(_) = self {
            tracing::error!(target: "trust", "trust transition aborted: {}", self);
        }
    }
}

pub type Result<T> = std::result::Result<T, TrustError>;
