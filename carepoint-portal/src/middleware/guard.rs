use carepoint_core::{Session, SessionStore};
use carepoint_shared::Role;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

/// Portal destinations a guard or flow can send the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    SignIn,
    Landing,
    PatientPortal,
    DoctorPortal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    #[error("This page is not available for your account")]
    Unauthorized,
}

impl GuardError {
    pub fn redirect(&self) -> View {
        match self {
            GuardError::SessionExpired => View::SignIn,
            GuardError::Unauthorized => View::Landing,
        }
    }
}

/// Role gate in front of the portal views.
///
/// Roles come from the unverified token payload, so this only decides what
/// to show. The backend authorizes every call on its own.
#[derive(Clone)]
pub struct AccessGuard {
    sessions: SessionStore,
}

impl AccessGuard {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    pub fn authorize(&self, allowed: &[Role]) -> Result<Session, GuardError> {
        self.authorize_at(allowed, Utc::now().timestamp())
    }

    /// The current session if it holds one of `allowed`.
    pub fn authorize_at(&self, allowed: &[Role], now: i64) -> Result<Session, GuardError> {
        let session = self.sessions.load_at(now).ok_or(GuardError::SessionExpired)?;

        if allowed.iter().any(|role| session.has_role(*role)) {
            debug!("Access granted to {}", session.email);
            Ok(session)
        } else {
            warn!("{} holds {:?}, needs one of {:?}", session.email, session.roles(), allowed);
            Err(GuardError::Unauthorized)
        }
    }
}

/// Where a freshly signed-in user lands. Patients first, then doctors.
pub fn landing_for(session: &Session) -> View {
    if session.has_role(Role::Patient) {
        View::PatientPortal
    } else if session.has_role(Role::Doctor) {
        View::DoctorPortal
    } else {
        View::Landing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepoint_core::MemoryStore;
    use std::sync::Arc;

    const NOW: i64 = 1_704_067_200;

    fn guard_with(groups: &[&str], expires_at: i64) -> (AccessGuard, Session) {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()));
        let session = Session {
            subject_id: Some("user-1".to_string()),
            email: "user@example.com".to_string(),
            id_token: "id".into(),
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            expires_at: Some(expires_at),
            given_name: None,
            family_name: None,
        };
        sessions.persist(&session).unwrap();
        (AccessGuard::new(sessions), session)
    }

    #[test]
    fn test_role_gate() {
        let (guard, session) = guard_with(&["DOCTOR", "beta-testers"], NOW + 60);

        assert_eq!(guard.authorize_at(&[Role::Doctor], NOW), Ok(session.clone()));
        assert_eq!(guard.authorize_at(&[Role::Patient, Role::Doctor], NOW), Ok(session));

        let err = guard.authorize_at(&[Role::Patient], NOW).unwrap_err();
        assert_eq!(err, GuardError::Unauthorized);
        assert_eq!(err.redirect(), View::Landing);
    }

    #[test]
    fn test_expired_session_redirects_to_sign_in() {
        let (guard, _) = guard_with(&["PATIENT"], NOW);
        let err = guard.authorize_at(&[Role::Patient], NOW).unwrap_err();
        assert_eq!(err, GuardError::SessionExpired);
        assert_eq!(err.redirect(), View::SignIn);
    }

    #[test]
    fn test_landing() {
        assert_eq!(landing_for(&guard_with(&["PATIENT", "DOCTOR"], NOW).1), View::PatientPortal);
        assert_eq!(landing_for(&guard_with(&["DOCTOR"], NOW).1), View::DoctorPortal);
        assert_eq!(landing_for(&guard_with(&["ADMIN"], NOW).1), View::Landing);
    }
}
