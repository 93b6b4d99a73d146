//! Scanner session: the check-in reducer running in a `Store`.

use super::{CheckInAction, CheckInEnvironment, CheckInReducer, CheckInState, ScanStatus};
use campus_events_runtime::{Store, StoreError};
use std::time::Duration;
use tokio::sync::broadcast;

/// One organizer's scanner.
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct ScannerSession {
    store: Store<CheckInState, CheckInAction, CheckInEnvironment, CheckInReducer>,
    timeout: Duration,
}

impl ScannerSession {
    /// Start an idle session.
    ///
    /// `timeout` bounds how long [`ScannerSession::process_qr_code`] waits for
    /// the check-in to settle.
    #[must_use]
    pub fn new(environment: CheckInEnvironment, timeout: Duration) -> Self {
        Self {
            store: Store::new(CheckInState::new(), CheckInReducer::new(), environment),
            timeout,
        }
    }

    /// Feed scanned text in and wait for the resulting status.
    ///
    /// Returns `Processing` unchanged if another check-in is still in flight.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: the check-in didn't settle in time
    /// - [`StoreError::ShutdownInProgress`]: the session was shut down
    #[tracing::instrument(skip(self))]
    pub async fn process_qr_code(&self, text: &str) -> Result<ScanStatus, StoreError> {
        let mut handle = self
            .store
            .send(CheckInAction::QrScanned {
                text: text.to_string(),
            })
            .await?;
        handle.wait_with_timeout(self.timeout).await?;

        let status = self.status().await;
        tracing::debug!(status = status.label(), "Scan settled");
        Ok(status)
    }

    /// "Scan another code".
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownInProgress`] if the session was shut down.
    pub async fn reset(&self) -> Result<ScanStatus, StoreError> {
        self.store.send(CheckInAction::ScanAnother).await?;
        Ok(self.status().await)
    }

    /// Current status
    pub async fn status(&self) -> ScanStatus {
        self.store.state(|state| state.status.clone()).await
    }

    /// Snapshot of the whole session state
    pub async fn state(&self) -> CheckInState {
        self.store.state(Clone::clone).await
    }

    /// Observe check-in results as they arrive.
    #[must_use]
    pub fn subscribe_results(&self) -> broadcast::Receiver<CheckInAction> {
        self.store.subscribe_actions()
    }

    /// Stop accepting scans and wait for an in-flight check-in.
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownTimeout`] if the check-in is still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}
