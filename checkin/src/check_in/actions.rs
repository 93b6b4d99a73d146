//! Actions for the check-in reducer.

use super::types::CheckInReceipt;
use crate::error::CheckInError;

/// Inputs to the scanner state machine.
///
/// `QrScanned` and `ScanAnother` come from the organizer; the other two are
/// produced by the check-in effect.
#[derive(Clone, Debug, PartialEq)]
pub enum CheckInAction {
    /// The camera decoded some text.
    QrScanned {
        /// Raw decoded text
        text: String,
    },

    /// The check-in was recorded.
    CheckInSucceeded {
        /// What was written
        receipt: CheckInReceipt,
    },

    /// The check-in was rejected or the store failed.
    CheckInFailed {
        /// Why
        error: CheckInError,
    },

    /// "Scan another code": return to `Idle` from a result screen.
    ScanAnother,
}

impl CheckInAction {
    /// Whether this action ends a check-in attempt.
    #[must_use]
    pub const fn is_result(&self) -> bool {
        matches!(self, Self::CheckInSucceeded { .. } | Self::CheckInFailed { .. })
    }
}
