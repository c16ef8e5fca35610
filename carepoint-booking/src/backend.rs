use async_trait::async_trait;
use carepoint_schedule::{DoctorAvailability, DoctorQuery};
use thiserror::Error;

use crate::lifecycle::AppointmentAction;
use crate::models::{AppointmentRecord, AppointmentStatus, CreatedAppointment, HealthMetrics, NewAppointment};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No valid session to authenticate the call with. Nothing was sent.
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    /// Non-success response, with the backend's message or the status reason.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Unexpected response from the clinic service: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The backend refused because the record changed underneath us.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// The clinic backend REST API. Every call carries the session's bearer id
/// token; implementations fail with [`ClientError::SessionExpired`] before
/// sending anything when there is no valid session.
#[async_trait]
pub trait ClinicBackend: Send + Sync {
    /// `GET /doctors`
    async fn list_doctors(&self, query: &DoctorQuery) -> Result<Vec<DoctorAvailability>, ClientError>;

    /// `POST /appointments`
    async fn create_appointment(&self, request: &NewAppointment) -> Result<CreatedAppointment, ClientError>;

    /// `GET /appointments/patient`
    async fn list_patient_appointments(&self) -> Result<Vec<AppointmentRecord>, ClientError>;

    /// `GET /appointments/doctor[?status=]`
    async fn list_doctor_appointments(
        &self,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<AppointmentRecord>, ClientError>;

    /// `POST /appointments/{id}/{confirm|decline|cancel}`, returning the status
    /// the backend reports.
    async fn transition_appointment(
        &self,
        appointment_id: &str,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, ClientError>;

    /// `GET /patient-health/{subjectId}/latest[?appointmentId=]`
    async fn latest_health(
        &self,
        subject_id: &str,
        appointment_id: Option<&str>,
    ) -> Result<Option<HealthMetrics>, ClientError>;
}
