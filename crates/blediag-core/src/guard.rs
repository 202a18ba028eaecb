//! Connection guard.
//!
//! Every operation calls [`ConnectionSession::ensure`] first so that a link
//! that dropped between operations is re-established before the next GATT
//! call.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::Result;
use crate::session::ConnectionSession;

impl ConnectionSession {
    /// Make sure the GATT link is active.
    ///
    /// - No peripheral selected: returns immediately.
    /// - Link active: returns immediately.
    /// - Link inactive: reconnects, then waits `settle` so the peripheral can
    ///   finish its own connection setup before the first request.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn ensure(&self, settle: Duration) -> Result<()> {
        if !self.transport.has_link().await {
            debug!("No link established yet, nothing to guard");
            return Ok(());
        }
        if self.transport.is_connected().await {
            return Ok(());
        }

        info!("Link inactive, reconnecting");
        self.transport.connect().await?;
        if !settle.is_zero() {
            sleep(settle).await;
        }
        Ok(())
    }

    /// [`ensure`](Self::ensure) with the session's configured settle delay.
    pub async fn ensure_default(&self) -> Result<()> {
        self.ensure(self.config.settle).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::mock::MockTransport;

    #[tokio::test]
    async fn test_no_link_is_noop() {
        let mock = Arc::new(MockTransport::builder().linked(false).build());
        let session = ConnectionSession::new(mock.clone());

        session.ensure(Duration::from_millis(500)).await.unwrap();
        assert_eq!(mock.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_active_link_is_noop() {
        let mock = Arc::new(MockTransport::new());
        let session = ConnectionSession::new(mock.clone());

        session.ensure(Duration::from_millis(500)).await.unwrap();
        assert_eq!(mock.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_link_reconnects_and_settles() {
        let mock = Arc::new(MockTransport::builder().connected(false).build());
        let session = ConnectionSession::new(mock.clone());

        let start = tokio::time::Instant::now();
        session.ensure(Duration::from_millis(500)).await.unwrap();

        assert_eq!(mock.connect_count(), 1);
        assert!(mock.is_connected_now());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_reconnect_failure_propagates() {
        let mock = Arc::new(MockTransport::builder().connected(false).build());
        mock.set_connect_failures(1);
        let session = ConnectionSession::new(mock.clone());

        let result = session.ensure(Duration::ZERO).await;
        assert!(matches!(result, Err(Error::LinkInactive)));
    }
}
