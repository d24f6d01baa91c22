pub mod dispatcher;
pub mod job;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ClassifiedError;
use crate::model::{GenerationRequest, StructuredResult};

/// The outermost boundary. main.rs only knows this trait.
/// Routing, validation and rate limiting wrap around it.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run one request to a normalized result or a classified error.
    async fn execute(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<StructuredResult, ClassifiedError>;
}
