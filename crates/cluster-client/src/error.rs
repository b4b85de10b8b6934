//! Cluster API errors

use thiserror::Error;

/// HTTP status the API server uses for an expired version token.
pub const GONE: u16 = 410;

/// Errors that can occur while listing or watching cluster resources
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The API server reported an error inside the watch stream
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// The resume version token is too old; a full relist is required
    #[error("version token expired: {0}")]
    Expired(String),

    /// Object could not be converted to a raw payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Builds the error for a status reported by the API server.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == GONE {
            Self::Expired(message)
        } else {
            Self::Api { code, message }
        }
    }

    /// True when the watch cannot be resumed and the caller must relist.
    pub fn is_expired(&self) -> bool {
        match self {
            Self::Expired(_) => true,
            Self::Api { code, .. } => *code == GONE,
            Self::Kube(kube::Error::Api(status)) => status.code == GONE,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_status_is_expired() {
        let err = ClusterError::from_status(410, "too old resource version: 100 (200)");
        assert!(matches!(err, ClusterError::Expired(_)));
        assert!(err.is_expired());
    }

    #[test]
    fn test_other_status_is_not_expired() {
        let err = ClusterError::from_status(500, "etcd leader changed");
        assert!(matches!(err, ClusterError::Api { code: 500, .. }));
        assert!(!err.is_expired());
    }
}
