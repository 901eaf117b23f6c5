//! The `ProviderAdapter` trait: the contract every provider must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::{CredentialBundle, ExecutionContext, OperationId, OperationResult, Provider};

/// Executes the operations of one provider.
///
/// Implementations must not panic or return early with an error: every
/// failure, including upstream HTTP errors, is reported through
/// `OperationResult { success: false, .. }`. Adapters never retry.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter serves; used as its registry key.
    fn provider(&self) -> Provider;

    /// Execute `operation` with an already-interpolated `config`.
    ///
    /// `credentials` is the bundle for [`ProviderAdapter::provider`], if the
    /// host supplied one. `ctx` is read-only: adapters return results and
    /// the scheduler records them.
    async fn execute(
        &self,
        operation: OperationId,
        config: Value,
        credentials: Option<&CredentialBundle>,
        ctx: &ExecutionContext,
    ) -> OperationResult;
}
