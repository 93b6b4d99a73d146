//! Reducer for the scanner state machine.

use super::{CheckInAction, CheckInEnvironment, CheckInState, ScanStatus};
use campus_events_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};

/// Pure transitions of a scanner session.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckInReducer;

impl CheckInReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for CheckInReducer {
    type State = CheckInState;
    type Action = CheckInAction;
    type Environment = CheckInEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CheckInAction::QrScanned { text } => {
                if state.status.is_processing() {
                    tracing::debug!("Scan ignored while a check-in is in flight");
                    return smallvec![Effect::None];
                }

                state.status = ScanStatus::Processing {
                    text: text.clone(),
                    started_at: env.clock().now(),
                };

                let service = env.service().clone();
                let organizer_id = env.organizer_id().clone();
                smallvec![Effect::future(async move {
                    Some(match service.check_in(&text, &organizer_id).await {
                        Ok(receipt) => CheckInAction::CheckInSucceeded { receipt },
                        Err(error) => CheckInAction::CheckInFailed { error },
                    })
                })]
            },

            CheckInAction::CheckInSucceeded { receipt } => {
                if state.status.is_processing() {
                    state.status = ScanStatus::Success(receipt);
                    state.checked_in += 1;
                }
                smallvec![Effect::None]
            },

            CheckInAction::CheckInFailed { error } => {
                if state.status.is_processing() {
                    state.status = ScanStatus::Error(error);
                    state.rejected += 1;
                }
                smallvec![Effect::None]
            },

            CheckInAction::ScanAnother => {
                if state.status.is_terminal() {
                    state.status = ScanStatus::Idle;
                }
                smallvec![Effect::None]
            },
        }
    }
}
