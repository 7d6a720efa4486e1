//! Outbound push delivery seam.

use crate::error::PushError;
use crate::types::PushMessage;
use async_trait::async_trait;

/// External HTTP push gateway.
///
/// Delivery is best-effort: callers in the fan-out engine log failures
/// and move on. Implementations must bound the call with a client-side
/// timeout so a slow gateway cannot block a request indefinitely.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError>;
}
