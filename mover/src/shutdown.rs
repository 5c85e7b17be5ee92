use tokio_util::sync::CancellationToken;

/// Cloneable handle that asks a running transfer to stop at its next check point.
///
/// Movers check it before every batch and before every queue of a registry. A batch
/// that is already being committed always completes.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            tracing::warn!("Transfer was already shutting down");
            return;
        }

        tracing::info!("Initiating graceful shutdown of transfer");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
