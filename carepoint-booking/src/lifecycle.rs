use carepoint_shared::Role;
use thiserror::Error;

use crate::models::AppointmentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Appointment is already {0}")]
    Terminal(AppointmentStatus),

    #[error("Cannot move appointment from {from} to {to}")]
    NotAllowed {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("A {actor} cannot move appointment from {from} to {to}")]
    WrongActor {
        from: AppointmentStatus,
        to: AppointmentStatus,
        actor: Role,
    },
}

/// User-initiated status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppointmentAction {
    Confirm,
    Decline,
    Cancel,
}

impl AppointmentAction {
    pub fn target(&self) -> AppointmentStatus {
        match self {
            AppointmentAction::Confirm => AppointmentStatus::Confirmed,
            AppointmentAction::Decline => AppointmentStatus::Declined,
            AppointmentAction::Cancel => AppointmentStatus::Cancelled,
        }
    }

    /// Last segment of `POST /appointments/{id}/{segment}`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            AppointmentAction::Confirm => "confirm",
            AppointmentAction::Decline => "decline",
            AppointmentAction::Cancel => "cancel",
        }
    }
}

const TRANSITIONS: [(AppointmentStatus, AppointmentStatus, Role); 4] = [
    (AppointmentStatus::Pending, AppointmentStatus::Confirmed, Role::Doctor),
    (AppointmentStatus::Pending, AppointmentStatus::Declined, Role::Doctor),
    (AppointmentStatus::Pending, AppointmentStatus::Cancelled, Role::Patient),
    (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled, Role::Patient),
];

/// Client-side transition rules. The backend re-checks every transition;
/// these checks only keep illegal requests off the network.
pub struct AppointmentStateMachine;

impl AppointmentStateMachine {
    /// Declined and cancelled appointments never change again.
    pub fn is_terminal(status: AppointmentStatus) -> bool {
        matches!(status, AppointmentStatus::Declined | AppointmentStatus::Cancelled)
    }

    /// Legal `(to, actor)` pairs out of `from`.
    pub fn valid_transitions(from: AppointmentStatus) -> Vec<(AppointmentStatus, Role)> {
        TRANSITIONS
            .iter()
            .filter(|(f, _, _)| *f == from)
            .map(|(_, to, actor)| (*to, *actor))
            .collect()
    }

    pub fn validate_transition(
        from: AppointmentStatus,
        to: AppointmentStatus,
        actor: Role,
    ) -> Result<(), TransitionError> {
        if Self::is_terminal(from) {
            return Err(TransitionError::Terminal(from));
        }

        match TRANSITIONS.iter().find(|(f, t, _)| *f == from && *t == to) {
            None => Err(TransitionError::NotAllowed { from, to }),
            Some((_, _, allowed)) if *allowed != actor => Err(TransitionError::WrongActor { from, to, actor }),
            Some(_) => Ok(()),
        }
    }

    /// Validate `action` and return the status it leads to.
    pub fn validate_action(
        from: AppointmentStatus,
        action: AppointmentAction,
        actor: Role,
    ) -> Result<AppointmentStatus, TransitionError> {
        let to = action.target();
        Self::validate_transition(from, to, actor)?;
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn test_table_is_exhaustive() {
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                for actor in [Role::Patient, Role::Doctor] {
                    let listed = TRANSITIONS.contains(&(from, to, actor));
                    let result = AppointmentStateMachine::validate_transition(from, to, actor);
                    assert_eq!(result.is_ok(), listed, "{} -> {} by {}", from, to, actor);
                }
            }
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AppointmentStateMachine::validate_transition(Declined, Confirmed, Role::Doctor),
            Err(TransitionError::Terminal(Declined))
        );
        assert_eq!(
            AppointmentStateMachine::validate_transition(Confirmed, Declined, Role::Doctor),
            Err(TransitionError::NotAllowed { from: Confirmed, to: Declined })
        );
        assert_eq!(
            AppointmentStateMachine::validate_transition(Pending, Confirmed, Role::Patient),
            Err(TransitionError::WrongActor { from: Pending, to: Confirmed, actor: Role::Patient })
        );
    }

    #[test]
    fn test_decline_then_confirm_rejected() {
        let status = AppointmentStateMachine::validate_action(Pending, AppointmentAction::Decline, Role::Doctor).unwrap();
        assert_eq!(status, Declined);

        let err = AppointmentStateMachine::validate_action(status, AppointmentAction::Confirm, Role::Doctor).unwrap_err();
        assert_eq!(err, TransitionError::Terminal(Declined));
    }

    #[test]
    fn test_valid_transitions() {
        assert_eq!(
            AppointmentStateMachine::valid_transitions(Confirmed),
            vec![(Cancelled, Role::Patient)]
        );
        assert_eq!(AppointmentStateMachine::valid_transitions(Pending).len(), 3);
        assert!(AppointmentStateMachine::valid_transitions(Cancelled).is_empty());
        assert_eq!(AppointmentAction::Decline.path_segment(), "decline");
    }
}
