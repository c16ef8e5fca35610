use carepoint_booking::{BookingError, ClientError, ViewEvent};
use carepoint_core::validation::ValidationErrors;
use carepoint_core::CoreError;
use thiserror::Error;

use crate::middleware::{GuardError, View};

#[derive(Debug, Error)]
pub enum PortalError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ClientError> for PortalError {
    fn from(err: ClientError) -> Self {
        PortalError::Booking(BookingError::Backend(err))
    }
}

impl PortalError {
    /// Text to show the user. Internal failures are logged and replaced with
    /// a generic message.
    pub fn user_message(&self) -> String {
        match self {
            PortalError::Guard(e) => e.to_string(),
            PortalError::Validation(errors) => errors
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "Please check the form".to_string()),
            PortalError::Booking(BookingError::Validation(_)) => "Complete the vitals form before booking".to_string(),
            PortalError::Booking(BookingError::Backend(ClientError::Decode(msg))) => {
                tracing::error!("Undecodable backend response: {}", msg);
                "Something went wrong. Please try again.".to_string()
            }
            PortalError::Booking(e) => e.to_string(),
            PortalError::Core(CoreError::IdentityError(msg)) | PortalError::Core(CoreError::ValidationError(msg)) => {
                msg.clone()
            }
            PortalError::Core(CoreError::StorageError(msg)) => {
                tracing::error!("Storage failure: {}", msg);
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Field-scoped errors to render next to their inputs, if any.
    pub fn field_errors(&self) -> Option<&ValidationErrors> {
        match self {
            PortalError::Validation(errors) | PortalError::Booking(BookingError::Validation(errors)) => Some(errors),
            _ => None,
        }
    }

    /// Where the user must be sent, if the failure ends the current view.
    pub fn redirect(&self) -> Option<View> {
        match self {
            PortalError::Guard(e) => Some(e.redirect()),
            PortalError::Booking(BookingError::Backend(ClientError::SessionExpired)) => Some(View::SignIn),
            PortalError::Booking(BookingError::Backend(ClientError::Rejected { status: 401, .. })) => Some(View::SignIn),
            _ => None,
        }
    }
}

/// Banner text for a background load failure, `None` for a refresh.
pub fn failure_message(event: &ViewEvent) -> Option<String> {
    match event {
        ViewEvent::Failed { error, .. } => Some(PortalError::from(error.clone()).user_message()),
        ViewEvent::Refreshed(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepoint_booking::{AppointmentStatus, TransitionError};

    #[test]
    fn test_redirects() {
        assert_eq!(PortalError::from(GuardError::Unauthorized).redirect(), Some(View::Landing));
        assert_eq!(PortalError::from(ClientError::SessionExpired).redirect(), Some(View::SignIn));
        assert_eq!(
            PortalError::from(ClientError::Rejected { status: 401, message: "Unauthorized".to_string() }).redirect(),
            Some(View::SignIn)
        );
        assert_eq!(
            PortalError::from(ClientError::Rejected { status: 409, message: "slot not available".to_string() })
                .redirect(),
            None
        );
    }

    #[test]
    fn test_user_messages() {
        let conflict = PortalError::from(ClientError::Rejected { status: 409, message: "slot not available".to_string() });
        assert_eq!(conflict.user_message(), "slot not available");

        let storage = PortalError::from(CoreError::StorageError("disk full".to_string()));
        assert_eq!(storage.user_message(), "Something went wrong. Please try again.");

        let terminal = PortalError::from(BookingError::from(TransitionError::Terminal(AppointmentStatus::Declined)));
        assert_eq!(terminal.user_message(), "Appointment is already DECLINED");

        let mut errors = ValidationErrors::new();
        errors.add("email", "Enter a valid email");
        let invalid = PortalError::from(errors);
        assert_eq!(invalid.user_message(), "Enter a valid email");
        assert_eq!(invalid.field_errors().map(|e| e.len()), Some(1));
    }
}
