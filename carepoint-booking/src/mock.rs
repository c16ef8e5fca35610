use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use carepoint_core::{Session, SessionStore};
use carepoint_schedule::{DoctorAvailability, DoctorQuery};
use carepoint_shared::{parse_instant, Role};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{ClientError, ClinicBackend};
use crate::lifecycle::{AppointmentAction, AppointmentStateMachine};
use crate::models::{AppointmentRecord, AppointmentStatus, CreatedAppointment, HealthMetrics, NewAppointment};

#[derive(Default)]
struct MockState {
    doctors: Vec<DoctorAvailability>,
    appointments: Vec<AppointmentRecord>,
    metrics: HashMap<String, HealthMetrics>,
    fail_next: Option<ClientError>,
}

/// In-memory clinic backend for local runs and tests.
///
/// Identifies the caller from its session store the way the real backend
/// reads the bearer token, and enforces the same rules: one active
/// appointment per doctor slot, transitions checked against the current
/// stored status (first writer wins). Handles made with
/// [`for_session`](Self::for_session) share one set of records.
pub struct MockClinicBackend {
    sessions: SessionStore,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockClinicBackend {
    pub fn new(sessions: SessionStore) -> Self {
        Self {
            sessions,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Another caller over the same records.
    pub fn for_session(&self, sessions: SessionStore) -> Self {
        Self {
            sessions,
            shared: self.shared.clone(),
        }
    }

    pub async fn add_doctor(&self, doctor: DoctorAvailability) {
        self.shared.state.lock().await.doctors.push(doctor);
    }

    pub async fn set_metrics(&self, subject_id: &str, metrics: HealthMetrics) {
        self.shared.state.lock().await.metrics.insert(subject_id.to_string(), metrics);
    }

    /// Make the next call fail with `error`.
    pub async fn fail_next(&self, error: ClientError) {
        self.shared.state.lock().await.fail_next = Some(error);
    }

    /// Change a stored status directly, as another client would.
    pub async fn force_status(&self, appointment_id: &str, status: AppointmentStatus) {
        let mut state = self.shared.state.lock().await;
        if let Some(record) = state.appointments.iter_mut().find(|a| a.appointment_id == appointment_id) {
            record.status = status;
        }
    }

    pub async fn appointment(&self, appointment_id: &str) -> Option<AppointmentRecord> {
        self.shared
            .state
            .lock()
            .await
            .appointments
            .iter()
            .find(|a| a.appointment_id == appointment_id)
            .cloned()
    }

    /// Calls that reached the backend across all handles, including rejected
    /// ones.
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> Result<(Session, String), ClientError> {
        let session = self.sessions.load().ok_or(ClientError::SessionExpired)?;
        self.shared.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.shared.state.lock().await.fail_next.take() {
            return Err(error);
        }

        let subject = session.subject_id.clone().unwrap_or_else(|| session.email.clone());
        Ok((session, subject))
    }
}

fn rejected(status: u16, message: &str) -> ClientError {
    ClientError::Rejected {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl ClinicBackend for MockClinicBackend {
    async fn list_doctors(&self, query: &DoctorQuery) -> Result<Vec<DoctorAvailability>, ClientError> {
        self.begin().await?;
        let state = self.shared.state.lock().await;

        // Substring match, as loose as the real listing.
        let contains = |filter: &Option<String>, value: &Option<String>| match filter.as_deref() {
            None | Some("") => true,
            Some(wanted) => value
                .as_deref()
                .map(|v| v.to_lowercase().contains(&wanted.to_lowercase()))
                .unwrap_or(false),
        };

        Ok(state
            .doctors
            .iter()
            .filter(|d| contains(&query.specialty, &d.specialty) && contains(&query.location, &d.city))
            .cloned()
            .collect())
    }

    async fn create_appointment(&self, request: &NewAppointment) -> Result<CreatedAppointment, ClientError> {
        let (session, subject) = self.begin().await?;
        if !session.has_role(Role::Patient) {
            return Err(rejected(403, "Only patients can book appointments"));
        }

        let mut state = self.shared.state.lock().await;
        let taken = state.appointments.iter().any(|a| {
            a.doctor_id == request.doctor_id
                && a.slot_iso == request.slot_iso
                && !AppointmentStateMachine::is_terminal(a.status)
        });
        if taken {
            return Err(rejected(409, "slot not available"));
        }

        let doctor_name = state
            .doctors
            .iter_mut()
            .find(|d| d.doctor_id == request.doctor_id)
            .map(|d| {
                d.avail_slots.retain(|s| parse_instant(s) != Some(request.slot_iso));
                d.display_name()
            });

        let record = AppointmentRecord {
            appointment_id: Uuid::new_v4().to_string(),
            doctor_id: request.doctor_id.clone(),
            patient_id: subject,
            slot_iso: request.slot_iso,
            status: AppointmentStatus::Pending,
            reason_code: Some(request.reason_code.clone()),
            created_at: Some(Utc::now()),
            patient_email: Some(session.email.clone()),
            doctor_name,
        };
        state.appointments.push(record.clone());

        Ok(CreatedAppointment {
            appointment_id: record.appointment_id,
            status: Some(record.status),
            created_at: record.created_at,
        })
    }

    async fn list_patient_appointments(&self) -> Result<Vec<AppointmentRecord>, ClientError> {
        let (_, subject) = self.begin().await?;
        let state = self.shared.state.lock().await;
        Ok(state
            .appointments
            .iter()
            .filter(|a| a.patient_id == subject)
            .cloned()
            .collect())
    }

    async fn list_doctor_appointments(
        &self,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<AppointmentRecord>, ClientError> {
        let (session, subject) = self.begin().await?;
        if !session.has_role(Role::Doctor) {
            return Err(rejected(403, "Doctor role required"));
        }

        let state = self.shared.state.lock().await;
        Ok(state
            .appointments
            .iter()
            .filter(|a| a.doctor_id == subject && status.map_or(true, |s| a.status == s))
            .cloned()
            .collect())
    }

    async fn transition_appointment(
        &self,
        appointment_id: &str,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, ClientError> {
        let (session, subject) = self.begin().await?;
        let mut state = self.shared.state.lock().await;
        let record = state
            .appointments
            .iter_mut()
            .find(|a| a.appointment_id == appointment_id)
            .ok_or_else(|| rejected(404, "appointment not found"))?;

        let actor = if session.has_role(Role::Doctor) && record.doctor_id == subject {
            Role::Doctor
        } else if record.patient_id == subject {
            Role::Patient
        } else {
            return Err(rejected(403, "forbidden"));
        };

        let to = AppointmentStateMachine::validate_action(record.status, action, actor).map_err(|_| {
            rejected(409, &format!("cannot {} appointment in current state", action.path_segment()))
        })?;
        record.status = to;
        Ok(to)
    }

    async fn latest_health(
        &self,
        subject_id: &str,
        _appointment_id: Option<&str>,
    ) -> Result<Option<HealthMetrics>, ClientError> {
        self.begin().await?;
        Ok(self.shared.state.lock().await.metrics.get(subject_id).cloned())
    }
}
