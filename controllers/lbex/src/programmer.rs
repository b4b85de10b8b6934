//! External state programmer seam.
//!
//! The dispatcher hands every computed `DesiredState` to an
//! `ExternalStateProgrammer`. Implementations must be idempotent: being
//! handed the same state twice must not change anything the second time.

use crate::state::DesiredState;
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait ExternalStateProgrammer: Send + Sync {
    /// Programs the external load balancer to match `desired`.
    async fn program(&self, desired: &DesiredState) -> anyhow::Result<()>;
}

/// Programmer that only reports the state it is handed.
#[derive(Debug, Default)]
pub struct LoggingProgrammer;

#[async_trait]
impl ExternalStateProgrammer for LoggingProgrammer {
    async fn program(&self, desired: &DesiredState) -> anyhow::Result<()> {
        info!(
            services = desired.services.len(),
            backends = desired.backend_count(),
            nodes = desired.nodes.len(),
            "desired load balancer state"
        );
        debug!("desired state: {}", serde_json::to_string(desired)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_programmer_accepts_empty_state() {
        LoggingProgrammer.program(&DesiredState::default()).await.unwrap();
    }
}
